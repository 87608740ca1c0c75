//! Board storage and per-deployment rule constants.

use crate::error::RulesError;
use crate::types::{Piece, Position, Stone};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Default board edge length.
pub const DEFAULT_BOARD_SIZE: usize = 15;

/// Default run length needed to win.
pub const DEFAULT_WIN_LENGTH: usize = 5;

/// Largest supported edge length.
pub const MAX_BOARD_SIZE: usize = 1024;

/// Board size and win length, fixed for the lifetime of a deployment.
///
/// Both the board allocation and the win scan bound derive from this one
/// value, so changing it changes them identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Getters, Serialize)]
pub struct Rules {
    /// Edge length N of the N×N board.
    board_size: usize,
    /// Contiguous stones required to win.
    win_length: usize,
}

impl Rules {
    /// Creates validated rules.
    #[instrument]
    pub fn new(board_size: usize, win_length: usize) -> Result<Self, RulesError> {
        if board_size == 0 || board_size > MAX_BOARD_SIZE {
            return Err(RulesError::new(format!(
                "board size must be between 1 and {MAX_BOARD_SIZE}, got {board_size}"
            )));
        }
        if win_length == 0 || win_length > board_size {
            return Err(RulesError::new(format!(
                "win length must be between 1 and {board_size}, got {win_length}"
            )));
        }
        Ok(Self {
            board_size,
            win_length,
        })
    }

    /// Total number of cells (N²).
    pub fn cell_count(&self) -> usize {
        self.board_size * self.board_size
    }
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            board_size: DEFAULT_BOARD_SIZE,
            win_length: DEFAULT_WIN_LENGTH,
        }
    }
}

/// N×N grid of cells in row-major order.
///
/// Out-of-range reads yield [`Piece::Empty`] and out-of-range writes are
/// ignored, so callers never need a bounds check before touching a cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Board {
    size: usize,
    cells: Vec<Piece>,
}

impl Board {
    /// Creates an empty board.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            cells: vec![Piece::Empty; size * size],
        }
    }

    /// Edge length.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the piece at `pos`, `Empty` when off the board.
    pub fn get(&self, pos: Position) -> Piece {
        pos.to_index(self.size)
            .and_then(|idx| self.cells.get(idx).copied())
            .unwrap_or(Piece::Empty)
    }

    /// Writes `piece` at `pos`. Returns false (and does nothing) off the board.
    pub fn set(&mut self, pos: Position, piece: Piece) -> bool {
        match pos.to_index(self.size).and_then(|idx| self.cells.get_mut(idx)) {
            Some(cell) => {
                *cell = piece;
                true
            }
            None => false,
        }
    }

    /// True when the cell is on the board and unoccupied.
    pub fn is_empty(&self, pos: Position) -> bool {
        pos.in_bounds(self.size) && self.get(pos).is_empty()
    }

    /// Number of cells holding `piece`.
    pub fn count(&self, piece: Piece) -> usize {
        self.cells.iter().filter(|c| **c == piece).count()
    }

    /// Number of stones of `stone` on the board.
    pub fn stones(&self, stone: Stone) -> usize {
        self.count(stone.into())
    }

    /// Number of non-empty cells.
    pub fn occupied(&self) -> usize {
        self.cells.len() - self.count(Piece::Empty)
    }

    /// True when no empty cell remains.
    pub fn is_full(&self) -> bool {
        self.cells.iter().all(|c| !c.is_empty())
    }

    /// All cells in row-major order.
    pub fn cells(&self) -> &[Piece] {
        &self.cells
    }

    /// Formats the board as text, `.` for empty, `X` black, `O` white.
    pub fn display(&self) -> String {
        let mut out = String::with_capacity(self.size * (self.size * 2 + 1));
        for row in self.cells.chunks(self.size.max(1)) {
            let line: Vec<&str> = row
                .iter()
                .map(|piece| match piece {
                    Piece::Empty => ".",
                    Piece::Black => "X",
                    Piece::White => "O",
                })
                .collect();
            out.push_str(&line.join(" "));
            out.push('\n');
        }
        out
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new(DEFAULT_BOARD_SIZE)
    }
}
