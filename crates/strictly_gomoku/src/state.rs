//! Authoritative match state and its transitions.

use crate::board::{Board, Rules};
use crate::error::{MatchError, MatchErrorKind};
use crate::invariants::{Invariant, InvariantSet, MatchInvariants};
use crate::rules::{WinningLine, check_win, is_draw};
use crate::types::{Move, Position, Stone};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// Participant identity as carried on the wire.
pub type PlayerId = String;

/// Lifecycle phase of a match.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    /// Seats are being filled; no stones may be placed.
    #[default]
    #[display("WaitingForPlayers")]
    WaitingForPlayers,
    /// Stones are being placed.
    #[display("InProgress")]
    InProgress,
    /// Black completed a run.
    #[display("BlackWins")]
    BlackWins,
    /// White completed a run.
    #[display("WhiteWins")]
    WhiteWins,
    /// The board filled with no run.
    #[display("Draw")]
    Draw,
}

impl Phase {
    /// True for the absorbing end phases.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::BlackWins | Phase::WhiteWins | Phase::Draw)
    }

    /// Winning phase for `stone`.
    pub fn won_by(stone: Stone) -> Self {
        match stone {
            Stone::Black => Phase::BlackWins,
            Stone::White => Phase::WhiteWins,
        }
    }

    /// The winner, if the phase names one.
    pub fn winner(self) -> Option<Stone> {
        match self {
            Phase::BlackWins => Some(Stone::Black),
            Phase::WhiteWins => Some(Stone::White),
            _ => None,
        }
    }
}

/// What a successful placement did to the match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// The match continues; the turn has passed.
    Continue,
    /// The placement completed a run.
    Won(WinningLine),
    /// The placement filled the board.
    Draw,
}

/// Complete state of one match.
///
/// Only validated transitions mutate it; every rejected transition leaves
/// it exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchState {
    rules: Rules,
    phase: Phase,
    board: Board,
    current_player: Stone,
    player1_id: Option<PlayerId>,
    player2_id: Option<PlayerId>,
    move_count: usize,
    last_move: Option<Position>,
    started_at: Option<DateTime<Utc>>,
    history: Vec<Move>,
}

impl MatchState {
    /// Creates a fresh, unseated match.
    #[instrument]
    pub fn new(rules: Rules) -> Self {
        Self {
            rules,
            phase: Phase::WaitingForPlayers,
            board: Board::new(*rules.board_size()),
            current_player: Stone::Black,
            player1_id: None,
            player2_id: None,
            move_count: 0,
            last_move: None,
            started_at: None,
            history: Vec::new(),
        }
    }

    /// Creates a fresh match with the given seats already filled.
    #[instrument]
    pub fn seated(
        rules: Rules,
        player1_id: Option<PlayerId>,
        player2_id: Option<PlayerId>,
    ) -> Self {
        Self {
            player1_id,
            player2_id,
            ..Self::new(rules)
        }
    }

    /// Fresh instance with this match's seats, as used by a restart.
    pub fn fresh(&self) -> Self {
        Self::seated(self.rules, self.player1_id.clone(), self.player2_id.clone())
    }

    /// Board size and win length.
    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Stone to move next.
    pub fn current_player(&self) -> Stone {
        self.current_player
    }

    /// Black's seat.
    pub fn player1_id(&self) -> Option<&str> {
        self.player1_id.as_deref()
    }

    /// White's seat.
    pub fn player2_id(&self) -> Option<&str> {
        self.player2_id.as_deref()
    }

    /// Stones placed so far.
    pub fn move_count(&self) -> usize {
        self.move_count
    }

    /// Position of the most recent placement.
    pub fn last_move(&self) -> Option<Position> {
        self.last_move
    }

    /// When the match entered `InProgress`.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Placements in order.
    pub fn history(&self) -> &[Move] {
        &self.history
    }

    /// Seat holder for `stone`.
    pub fn player_for(&self, stone: Stone) -> Option<&str> {
        match stone {
            Stone::Black => self.player1_id(),
            Stone::White => self.player2_id(),
        }
    }

    /// Stone assigned to `player_id`, if seated.
    pub fn seat_of(&self, player_id: &str) -> Option<Stone> {
        if self.player1_id.as_deref() == Some(player_id) {
            Some(Stone::Black)
        } else if self.player2_id.as_deref() == Some(player_id) {
            Some(Stone::White)
        } else {
            None
        }
    }

    /// True when both seats are filled.
    pub fn is_full(&self) -> bool {
        self.player1_id.is_some() && self.player2_id.is_some()
    }

    /// Seats `player_id` in the first free seat, Black first.
    ///
    /// Idempotent: an already-seated player keeps their stone. Returns `None`
    /// when both seats belong to others.
    #[instrument(skip(self), fields(phase = %self.phase))]
    pub fn assign_seat(&mut self, player_id: &str) -> Option<Stone> {
        if let Some(stone) = self.seat_of(player_id) {
            return Some(stone);
        }
        if self.player1_id.is_none() {
            self.player1_id = Some(player_id.to_string());
            info!(player_id, stone = %Stone::Black, "Seat assigned");
            Some(Stone::Black)
        } else if self.player2_id.is_none() {
            self.player2_id = Some(player_id.to_string());
            info!(player_id, stone = %Stone::White, "Seat assigned");
            Some(Stone::White)
        } else {
            None
        }
    }

    /// Moves from `WaitingForPlayers` to `InProgress`.
    #[instrument(skip(self), fields(phase = %self.phase))]
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), MatchError> {
        if self.phase != Phase::WaitingForPlayers {
            return Err(MatchErrorKind::AlreadyStarted.into());
        }
        if !self.is_full() {
            return Err(MatchErrorKind::InsufficientPlayers.into());
        }
        self.phase = Phase::InProgress;
        self.started_at = Some(now);
        info!("Match started");
        Ok(())
    }

    /// Validates a placement without applying it.
    ///
    /// Checks run in a fixed order: phase, turn, bounds, occupancy.
    pub fn validate_placement(&self, stone: Stone, position: Position) -> Result<(), MatchError> {
        if self.phase != Phase::InProgress {
            return Err(MatchErrorKind::InvalidState(format!(
                "cannot place a stone while the match is {}",
                self.phase
            ))
            .into());
        }
        if stone != self.current_player {
            return Err(MatchErrorKind::NotYourTurn(self.current_player).into());
        }
        if !position.in_bounds(*self.rules.board_size()) {
            return Err(MatchErrorKind::OutOfBounds(position).into());
        }
        if !self.board.get(position).is_empty() {
            return Err(MatchErrorKind::CellOccupied(position).into());
        }
        Ok(())
    }

    /// Places `stone` at `position` and resolves the consequences.
    #[instrument(skip(self), fields(phase = %self.phase, move_count = self.move_count))]
    pub fn place(&mut self, stone: Stone, position: Position) -> Result<Placement, MatchError> {
        self.validate_placement(stone, position)?;

        self.board.set(position, stone.into());
        self.history.push(Move::new(stone, position));
        self.move_count += 1;
        self.last_move = Some(position);

        if let Some(line) = check_win(&self.board, position, stone, *self.rules.win_length()) {
            self.phase = Phase::won_by(stone);
            info!(%stone, %position, run = line.len(), "Winning placement");
            return Ok(Placement::Won(line));
        }

        if is_draw(&self.board, self.move_count) {
            self.phase = Phase::Draw;
            info!(move_count = self.move_count, "Board full, match drawn");
            return Ok(Placement::Draw);
        }

        self.current_player = stone.opponent();
        debug!(%stone, %position, next = %self.current_player, "Stone placed");
        Ok(Placement::Continue)
    }

    /// Takes back the last placement made by `stone`.
    ///
    /// Legal only while `InProgress`, only when there is a placement to take
    /// back, and only for the player who made it. The restored position is
    /// re-checked as if the undone move never happened; a terminal verdict
    /// there means the state was already inconsistent and is reported as an
    /// internal fault, leaving the state untouched.
    #[instrument(skip(self), fields(phase = %self.phase, move_count = self.move_count))]
    pub fn undo(&mut self, stone: Stone) -> Result<Move, MatchError> {
        if self.phase != Phase::InProgress {
            return Err(MatchErrorKind::InvalidState(format!(
                "cannot undo while the match is {}",
                self.phase
            ))
            .into());
        }
        let Some(&last) = self.history.last() else {
            return Err(MatchErrorKind::InvalidState("no move to undo".to_string()).into());
        };
        if last.stone != stone {
            return Err(MatchErrorKind::NotYourTurn(last.stone).into());
        }

        let mut reverted = self.clone();
        reverted.board.set(last.position, crate::types::Piece::Empty);
        reverted.history.pop();
        reverted.move_count -= 1;
        reverted.last_move = reverted.history.last().map(|m| m.position);
        reverted.current_player = last.stone;

        let win_length = *self.rules.win_length();
        if let Some(previous) = reverted.history.last()
            && check_win(&reverted.board, previous.position, previous.stone, win_length).is_some()
        {
            warn!(%previous, "Restored position already contains a win");
            return Err(MatchErrorKind::InternalFault(
                "restored position is terminal".to_string(),
            )
            .into());
        }
        if is_draw(&reverted.board, reverted.move_count) {
            return Err(MatchErrorKind::InternalFault(
                "restored position is a full board".to_string(),
            )
            .into());
        }
        reverted.verify()?;

        *self = reverted;
        info!(undone = %last, next = %self.current_player, "Move taken back");
        Ok(last)
    }

    /// Vacates the seat held by `stone`.
    pub fn vacate(&mut self, stone: Stone) {
        match stone {
            Stone::Black => self.player1_id = None,
            Stone::White => self.player2_id = None,
        }
    }

    /// Checks every structural invariant, reporting violations as an
    /// internal fault.
    #[instrument(skip(self))]
    pub fn verify(&self) -> Result<(), MatchError> {
        MatchInvariants::check_all(self).map_err(|violations| {
            let descriptions = violations
                .iter()
                .map(|v| v.description.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            warn!(%descriptions, "Invariant violation");
            MatchErrorKind::InternalFault(format!("invariant violation: {descriptions}")).into()
        })
    }

    /// True when the balanced-stones invariant holds.
    pub fn is_balanced(&self) -> bool {
        crate::invariants::BalancedStones::holds(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> MatchState {
        let mut state =
            MatchState::seated(Rules::default(), Some("alice".into()), Some("bob".into()));
        state.start(Utc::now()).unwrap();
        state
    }

    #[test]
    fn test_fresh_state() {
        let state = MatchState::new(Rules::default());
        assert_eq!(state.phase(), Phase::WaitingForPlayers);
        assert_eq!(state.move_count(), 0);
        assert_eq!(state.current_player(), Stone::Black);
        assert_eq!(state.board().occupied(), 0);
    }

    #[test]
    fn test_seats_fill_black_then_white() {
        let mut state = MatchState::new(Rules::default());
        assert_eq!(state.assign_seat("alice"), Some(Stone::Black));
        assert_eq!(state.assign_seat("bob"), Some(Stone::White));
        assert_eq!(state.assign_seat("carol"), None);
        assert_eq!(state.assign_seat("alice"), Some(Stone::Black));
    }

    #[test]
    fn test_start_requires_two_players() {
        let mut state = MatchState::seated(Rules::default(), Some("alice".into()), None);
        let err = state.start(Utc::now()).unwrap_err();
        assert_eq!(err.kind(), &MatchErrorKind::InsufficientPlayers);
        assert_eq!(state.phase(), Phase::WaitingForPlayers);
    }

    #[test]
    fn test_start_twice_rejected() {
        let mut state = started();
        let err = state.start(Utc::now()).unwrap_err();
        assert_eq!(err.kind(), &MatchErrorKind::AlreadyStarted);
    }

    #[test]
    fn test_validation_order_phase_first() {
        let state = MatchState::new(Rules::default());
        let err = state.validate_placement(Stone::White, Position::new(99, 99)).unwrap_err();
        assert!(matches!(err.kind(), MatchErrorKind::InvalidState(_)));
    }

    #[test]
    fn test_validation_order_turn_before_bounds() {
        let state = started();
        let err = state.validate_placement(Stone::White, Position::new(99, 99)).unwrap_err();
        assert_eq!(err.kind(), &MatchErrorKind::NotYourTurn(Stone::Black));
    }

    #[test]
    fn test_place_toggles_turn() {
        let mut state = started();
        assert_eq!(state.place(Stone::Black, Position::new(7, 7)).unwrap(), Placement::Continue);
        assert_eq!(state.current_player(), Stone::White);
        assert_eq!(state.last_move(), Some(Position::new(7, 7)));
        assert!(state.verify().is_ok());
    }

    #[test]
    fn test_undo_restores_previous_position() {
        let mut state = started();
        state.place(Stone::Black, Position::new(7, 7)).unwrap();
        let before = state.clone();
        state.place(Stone::White, Position::new(8, 8)).unwrap();

        let undone = state.undo(Stone::White).unwrap();
        assert_eq!(undone, Move::new(Stone::White, Position::new(8, 8)));
        assert_eq!(state, before);
    }

    #[test]
    fn test_undo_by_opponent_rejected() {
        let mut state = started();
        state.place(Stone::Black, Position::new(7, 7)).unwrap();
        let err = state.undo(Stone::White).unwrap_err();
        assert_eq!(err.kind(), &MatchErrorKind::NotYourTurn(Stone::Black));
        assert_eq!(state.move_count(), 1);
    }

    #[test]
    fn test_undo_with_empty_history_rejected() {
        let mut state = started();
        let err = state.undo(Stone::Black).unwrap_err();
        assert!(matches!(err.kind(), MatchErrorKind::InvalidState(_)));
    }

    #[test]
    fn test_fresh_keeps_seats_only() {
        let mut state = started();
        state.place(Stone::Black, Position::new(0, 0)).unwrap();
        let fresh = state.fresh();
        assert_eq!(
            fresh,
            MatchState::seated(Rules::default(), Some("alice".into()), Some("bob".into()))
        );
    }
}
