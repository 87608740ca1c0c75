//! First-class invariants for a match.
//!
//! Invariants are logical properties that hold after every accepted
//! transition. The match state checks them after an undo, and the session
//! checks them after every command before publishing the result.

use crate::state::MatchState;
use crate::types::{Piece, Stone};

/// A logical property that must hold for a given state.
pub trait Invariant<S> {
    /// Checks if the invariant holds for the given state.
    fn holds(state: &S) -> bool;

    /// Human-readable description of the invariant.
    fn description() -> &'static str;
}

/// Violation of an invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantViolation {
    /// Description of the violated invariant.
    pub description: String,
}

impl InvariantViolation {
    /// Creates a new invariant violation.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

/// A set of invariants that can be checked together.
pub trait InvariantSet<S> {
    /// Checks all invariants in the set, collecting every violation.
    fn check_all(state: &S) -> Result<(), Vec<InvariantViolation>>;
}

impl<S, I1, I2, I3, I4> InvariantSet<S> for (I1, I2, I3, I4)
where
    I1: Invariant<S>,
    I2: Invariant<S>,
    I3: Invariant<S>,
    I4: Invariant<S>,
{
    fn check_all(state: &S) -> Result<(), Vec<InvariantViolation>> {
        let checks = [
            (I1::holds(state), I1::description()),
            (I2::holds(state), I2::description()),
            (I3::holds(state), I3::description()),
            (I4::holds(state), I4::description()),
        ];
        let violations: Vec<_> = checks
            .iter()
            .filter(|(ok, _)| !ok)
            .map(|(_, description)| InvariantViolation::new(*description))
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

/// Black has as many stones as White, or exactly one more.
pub struct BalancedStones;

impl Invariant<MatchState> for BalancedStones {
    fn holds(state: &MatchState) -> bool {
        let black = state.board().stones(Stone::Black);
        let white = state.board().stones(Stone::White);
        black == white || black == white + 1
    }

    fn description() -> &'static str {
        "Black stones equal White stones or exceed them by one"
    }
}

/// The move counter equals the number of occupied cells.
pub struct MoveCountMatchesBoard;

impl Invariant<MatchState> for MoveCountMatchesBoard {
    fn holds(state: &MatchState) -> bool {
        state.move_count() == state.board().occupied()
            && state.move_count() == state.history().len()
    }

    fn description() -> &'static str {
        "Move count equals the occupied cell count"
    }
}

/// Players alternate, Black first, and the side to move follows parity.
pub struct AlternatingTurn;

impl Invariant<MatchState> for AlternatingTurn {
    fn holds(state: &MatchState) -> bool {
        let history = state.history();
        let alternates = history
            .iter()
            .enumerate()
            .all(|(i, m)| m.stone == if i % 2 == 0 { Stone::Black } else { Stone::White });
        if !alternates {
            return false;
        }

        match history.last() {
            Some(last) if state.phase().is_terminal() => state.current_player() == last.stone,
            _ => {
                let expected = if state.move_count() % 2 == 0 {
                    Stone::Black
                } else {
                    Stone::White
                };
                state.current_player() == expected
            }
        }
    }

    fn description() -> &'static str {
        "Players alternate turns (Black, White, Black, ...)"
    }
}

/// Every recorded move is on the board, and the last one is `last_move`.
pub struct HistoryConsistent;

impl Invariant<MatchState> for HistoryConsistent {
    fn holds(state: &MatchState) -> bool {
        let on_board = state
            .history()
            .iter()
            .all(|m| state.board().get(m.position) == Piece::from(m.stone));
        on_board && state.last_move() == state.history().last().map(|m| m.position)
    }

    fn description() -> &'static str {
        "Move history matches the board"
    }
}

/// Every invariant a match maintains.
pub type MatchInvariants = (
    BalancedStones,
    MoveCountMatchesBoard,
    AlternatingTurn,
    HistoryConsistent,
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Rules;
    use crate::types::Position;
    use chrono::Utc;

    fn started() -> MatchState {
        let mut state = MatchState::seated(Rules::default(), Some("a".into()), Some("b".into()));
        state.start(Utc::now()).unwrap();
        state
    }

    #[test]
    fn test_fresh_state_holds() {
        assert!(MatchInvariants::check_all(&MatchState::new(Rules::default())).is_ok());
    }

    #[test]
    fn test_sequence_holds() {
        let mut state = started();
        for (i, col) in [0, 0, 1, 1, 2, 2].iter().enumerate() {
            let stone = if i % 2 == 0 { Stone::Black } else { Stone::White };
            let row = if i % 2 == 0 { 0 } else { 5 };
            state.place(stone, Position::new(row, *col)).unwrap();
            assert!(MatchInvariants::check_all(&state).is_ok());
        }
    }

    #[test]
    fn test_terminal_state_holds() {
        let mut state = started();
        for col in 0..4 {
            state.place(Stone::Black, Position::new(0, col)).unwrap();
            state.place(Stone::White, Position::new(1, col)).unwrap();
        }
        state.place(Stone::Black, Position::new(0, 4)).unwrap();
        assert!(state.phase().is_terminal());
        assert!(MatchInvariants::check_all(&state).is_ok());
    }
}
