//! Strictly Gomoku - pure five-in-a-row game logic.
//!
//! # Architecture
//!
//! - **Board**: N×N grid with forgiving out-of-range access
//! - **Rules**: win detection by line scan through the last stone, draw on a full board
//! - **MatchState**: the authoritative phase machine (waiting, in progress, terminal)
//! - **Invariants**: structural properties checked after every transition
//!
//! # Example
//!
//! ```
//! use strictly_gomoku::{MatchState, Placement, Position, Rules, Stone};
//!
//! let mut state = MatchState::new(Rules::default());
//! state.assign_seat("alice");
//! state.assign_seat("bob");
//! state.start(chrono::Utc::now()).unwrap();
//! assert_eq!(state.place(Stone::Black, Position::new(7, 7)).unwrap(), Placement::Continue);
//! assert_eq!(state.current_player(), Stone::White);
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod board;
mod error;
mod invariants;
pub mod rules;
mod state;
mod types;

pub use board::{Board, DEFAULT_BOARD_SIZE, DEFAULT_WIN_LENGTH, MAX_BOARD_SIZE, Rules};
pub use error::{MatchError, MatchErrorKind, RulesError};
pub use invariants::{
    AlternatingTurn, BalancedStones, HistoryConsistent, Invariant, InvariantSet, InvariantViolation,
    MatchInvariants, MoveCountMatchesBoard,
};
pub use rules::{Axis, WinningLine, check_win, is_draw};
pub use state::{MatchState, Phase, Placement, PlayerId};
pub use types::{Move, Piece, Position, Stone};
