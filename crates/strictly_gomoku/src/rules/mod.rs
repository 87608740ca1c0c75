//! Game rules for five-in-a-row.
//!
//! Pure functions over a board and the last placement. Rules are kept apart
//! from board storage so the match state machine can compose them.

pub mod draw;
pub mod win;

pub use draw::is_draw;
pub use win::{Axis, WinningLine, check_win};
