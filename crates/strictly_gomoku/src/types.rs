//! Core domain types for five-in-a-row.

use serde::{Deserialize, Serialize};

/// Stone colour of a seated player.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
pub enum Stone {
    /// Black (always moves first).
    #[display("Black")]
    Black,
    /// White.
    #[display("White")]
    White,
}

impl Stone {
    /// Returns the opposing stone.
    pub fn opponent(self) -> Self {
        match self {
            Stone::Black => Stone::White,
            Stone::White => Stone::Black,
        }
    }
}

/// Contents of a single board cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Piece {
    /// Unoccupied.
    #[default]
    Empty,
    /// Occupied by black.
    Black,
    /// Occupied by white.
    White,
}

impl Piece {
    /// Returns the stone occupying the cell, if any.
    pub fn stone(self) -> Option<Stone> {
        match self {
            Piece::Empty => None,
            Piece::Black => Some(Stone::Black),
            Piece::White => Some(Stone::White),
        }
    }

    /// True for `Piece::Empty`.
    pub fn is_empty(self) -> bool {
        self == Piece::Empty
    }
}

impl From<Stone> for Piece {
    fn from(stone: Stone) -> Self {
        match stone {
            Stone::Black => Piece::Black,
            Stone::White => Piece::White,
        }
    }
}

/// A (row, col) coordinate.
///
/// Coordinates are signed so that positions read off the wire, or produced
/// by stepping past an edge, stay representable. Validity is always relative
/// to a board size; see [`Position::in_bounds`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_new::new,
)]
#[display("({row}, {col})")]
pub struct Position {
    /// Zero-based row.
    pub row: i32,
    /// Zero-based column.
    pub col: i32,
}

impl Position {
    /// Returns the position `steps` cells away along `(d_row, d_col)`.
    pub fn offset(self, d_row: i32, d_col: i32, steps: i32) -> Self {
        Self {
            row: self.row.saturating_add(d_row.saturating_mul(steps)),
            col: self.col.saturating_add(d_col.saturating_mul(steps)),
        }
    }

    /// True when the position lies on a `size`×`size` board.
    pub fn in_bounds(self, size: usize) -> bool {
        let size = size as i64;
        (0..size).contains(&(self.row as i64)) && (0..size).contains(&(self.col as i64))
    }

    /// Row-major cell index, or `None` if off the board.
    pub fn to_index(self, size: usize) -> Option<usize> {
        if self.in_bounds(size) {
            Some(self.row as usize * size + self.col as usize)
        } else {
            None
        }
    }

    /// Inverse of [`Position::to_index`].
    pub fn from_index(index: usize, size: usize) -> Self {
        Self {
            row: (index / size) as i32,
            col: (index % size) as i32,
        }
    }
}

/// A ply: one stone placed at one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_new::new)]
pub struct Move {
    /// The stone placed.
    pub stone: Stone,
    /// Where it was placed.
    pub position: Position,
}

impl std::fmt::Display for Move {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.stone, self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opponent_alternates() {
        assert_eq!(Stone::Black.opponent(), Stone::White);
        assert_eq!(Stone::White.opponent(), Stone::Black);
    }

    #[test]
    fn test_bounds_at_edges() {
        assert!(Position::new(0, 0).in_bounds(15));
        assert!(Position::new(14, 14).in_bounds(15));
        assert!(!Position::new(15, 0).in_bounds(15));
        assert!(!Position::new(0, -1).in_bounds(15));
        assert!(!Position::new(i32::MIN, 3).in_bounds(15));
    }

    #[test]
    fn test_index_mapping() {
        let pos = Position::new(2, 3);
        assert_eq!(pos.to_index(15), Some(33));
        assert_eq!(Position::from_index(33, 15), pos);
        assert_eq!(Position::new(-1, 0).to_index(15), None);
    }

    #[test]
    fn test_piece_serializes_lowercase() {
        let json = serde_json::to_string(&Piece::Black).unwrap();
        assert_eq!(json, "\"black\"");
        assert_eq!(Piece::from(Stone::White).stone(), Some(Stone::White));
    }
}
