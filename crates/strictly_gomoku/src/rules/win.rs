//! Win detection: line scan through the last placed stone.

use crate::board::Board;
use crate::types::{Piece, Position, Stone};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use tracing::{debug, instrument};

/// One of the four line directions through a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::EnumIter)]
#[serde(rename_all = "camelCase")]
pub enum Axis {
    /// West to east.
    Horizontal,
    /// North to south.
    Vertical,
    /// North-west to south-east.
    Diagonal,
    /// South-west to north-east.
    AntiDiagonal,
}

impl Axis {
    /// Unit step `(d_row, d_col)` in the positive direction.
    pub fn step(self) -> (i32, i32) {
        match self {
            Axis::Horizontal => (0, 1),
            Axis::Vertical => (1, 0),
            Axis::Diagonal => (1, 1),
            Axis::AntiDiagonal => (-1, 1),
        }
    }
}

/// The contiguous run that completed a win.
///
/// Positions are ordered from the negative end of the axis to the positive
/// end, so horizontal and diagonal runs read left to right and vertical runs
/// read top to bottom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinningLine {
    /// Axis the run lies on.
    pub axis: Axis,
    /// The stone that owns the run.
    pub stone: Stone,
    /// The run itself.
    pub positions: Vec<Position>,
}

impl WinningLine {
    /// Number of stones in the run.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Always false for a detected line; present for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Counts matching cells from `origin` along `(d_row, d_col)`, not counting
/// `origin` itself, stopping at the first mismatch or after `limit` steps.
fn run_length(
    board: &Board,
    origin: Position,
    d_row: i32,
    d_col: i32,
    piece: Piece,
    limit: usize,
) -> usize {
    (1..=limit as i32)
        .take_while(|step| board.get(origin.offset(d_row, d_col, *step)) == piece)
        .count()
}

/// Checks whether the stone just placed at `last` completes a run of at
/// least `win_length`.
///
/// Scans at most `win_length - 1` cells each way on every axis, so the cost
/// is independent of board size. Must only be called right after `stone`
/// was placed at `last`; returns `None` if that cell does not hold `stone`.
#[instrument(skip(board), fields(size = board.size()))]
pub fn check_win(
    board: &Board,
    last: Position,
    stone: Stone,
    win_length: usize,
) -> Option<WinningLine> {
    let piece = Piece::from(stone);
    if board.get(last) != piece || win_length == 0 {
        return None;
    }
    let limit = win_length - 1;

    for axis in Axis::iter() {
        let (d_row, d_col) = axis.step();
        let forward = run_length(board, last, d_row, d_col, piece, limit);
        let backward = run_length(board, last, -d_row, -d_col, piece, limit);
        let total = 1 + forward + backward;

        if total >= win_length {
            let start = last.offset(-d_row, -d_col, backward as i32);
            let positions = (0..total as i32)
                .map(|step| start.offset(d_row, d_col, step))
                .collect();
            debug!(?axis, total, %stone, "Winning run found");
            return Some(WinningLine {
                axis,
                stone,
                positions,
            });
        }
    }

    None
}
