//! Draw detection.

use crate::board::Board;
use tracing::instrument;

/// True when every cell is occupied.
///
/// Only meaningful once win detection has reported no win for the last
/// placement.
#[instrument(skip(board), fields(size = board.size()))]
pub fn is_draw(board: &Board, move_count: usize) -> bool {
    move_count == board.size() * board.size()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Piece, Position};

    #[test]
    fn test_empty_board_is_not_drawn() {
        assert!(!is_draw(&Board::new(15), 0));
    }

    #[test]
    fn test_full_board_is_drawn() {
        let mut board = Board::new(3);
        for idx in 0..9 {
            board.set(Position::from_index(idx, 3), Piece::White);
        }
        assert!(is_draw(&board, board.occupied()));
    }
}
