//! Error types for match validation.

use crate::types::{Position, Stone};
use derive_more::{Display, Error};
use tracing::instrument;

/// Why a command was rejected.
///
/// Every kind is non-fatal to the match: a rejected command leaves the
/// match state untouched.
#[derive(Debug, Clone, PartialEq, Eq, Display, strum::IntoStaticStr)]
pub enum MatchErrorKind {
    /// The command is not legal in the current phase.
    #[display("Invalid state: {_0}")]
    InvalidState(String),
    /// The requester's stone is not the one to move.
    #[display("Not your turn. Waiting for {_0}")]
    NotYourTurn(Stone),
    /// The position is off the board.
    #[display("Position {_0} is out of bounds")]
    OutOfBounds(Position),
    /// The target cell already holds a stone.
    #[display("Cell {_0} is already occupied")]
    CellOccupied(Position),
    /// The requester holds no seat in the match.
    #[display("Player {_0} is not a participant in this match")]
    NotParticipant(String),
    /// Both seats must be filled before the match can start.
    #[display("Two players are required to start the match")]
    InsufficientPlayers,
    /// The match has already left the waiting phase.
    #[display("Match has already started")]
    AlreadyStarted,
    /// The command is recognised but not served.
    #[display("Unsupported command: {_0}")]
    UnsupportedCommand(String),
    /// Unexpected fault while processing a command.
    #[display("Internal fault: {_0}")]
    InternalFault(String),
}

impl MatchErrorKind {
    /// Stable machine-readable code (the variant name).
    pub fn code(&self) -> &'static str {
        self.into()
    }

    /// Message safe to send to a remote participant.
    ///
    /// Internal fault details stay server-side.
    pub fn public_message(&self) -> String {
        match self {
            MatchErrorKind::InternalFault(_) => {
                "Internal error while processing the command".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Match error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("{} at {}:{}", kind, file, line)]
pub struct MatchError {
    /// What went wrong.
    pub kind: MatchErrorKind,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl MatchError {
    /// Creates a new match error with caller location tracking.
    #[track_caller]
    #[instrument(level = "debug")]
    pub fn new(kind: MatchErrorKind) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            line: loc.line(),
            file: loc.file(),
        }
    }

    /// The error kind.
    pub fn kind(&self) -> &MatchErrorKind {
        &self.kind
    }
}

impl From<MatchErrorKind> for MatchError {
    #[track_caller]
    fn from(kind: MatchErrorKind) -> Self {
        Self::new(kind)
    }
}

/// Invalid board size / win length combination.
#[derive(Debug, Clone, Display, Error)]
#[display("Rules error: {} at {}:{}", message, file, line)]
pub struct RulesError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl RulesError {
    /// Creates a new rules error with caller location tracking.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}
