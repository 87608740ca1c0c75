//! Move suggestions.

use strictly_gomoku::{MatchError, MatchErrorKind, MatchState, Position, Stone};

/// Suggests a move for the player to act.
///
/// Providers receive a snapshot that is known to be `InProgress` with
/// `stone` to move.
pub trait HintProvider: std::fmt::Debug + Send + Sync {
    /// Proposes an empty, in-bounds position for `stone`.
    fn suggest(&self, state: &MatchState, stone: Stone) -> Result<Position, MatchError>;
}

/// Provider for servers that do not offer hints.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHints;

impl HintProvider for NoHints {
    fn suggest(&self, _state: &MatchState, _stone: Stone) -> Result<Position, MatchError> {
        let reason = "hints are not offered by this server".to_string();
        Err(MatchErrorKind::UnsupportedCommand(reason).into())
    }
}

/// Suggests the empty cell nearest the centre of the board.
///
/// Mostly useful for tests and demos.
#[derive(Debug, Clone, Copy, Default)]
pub struct CentreHint;

impl HintProvider for CentreHint {
    fn suggest(&self, state: &MatchState, _stone: Stone) -> Result<Position, MatchError> {
        let size = state.board().size();
        let centre = (size / 2) as i32;
        (0..size * size)
            .map(|idx| Position::from_index(idx, size))
            .filter(|pos| state.board().is_empty(*pos))
            .min_by_key(|pos| ((pos.row - centre).abs().max((pos.col - centre).abs()), *pos))
            .ok_or_else(|| {
                MatchErrorKind::InvalidState("no empty cell to suggest".to_string()).into()
            })
    }
}
