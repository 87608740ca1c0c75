//! Match session management.
//!
//! A [`MatchSession`] owns one match: the authoritative [`MatchState`], the
//! roster of connected participants, and the rules for turning inbound
//! requests into outbound events. It is synchronous and single-owner; the
//! actor in [`crate::actor`] provides the serialisation.

use crate::config::DisconnectPolicy;
use crate::hint::{HintProvider, NoHints};
use crate::protocol::{
    ClientRequest, ErrorEvent, HintResponse, MatchOver, ParticipantJoined, ServerEvent, StateUpdate,
    decode_request,
};
use chrono::Utc;
use derive_getters::Getters;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use strictly_gomoku::{
    MatchError, MatchErrorKind, MatchState, Phase, Piece, Placement, PlayerId, Position, Rules,
    Stone,
};
use tracing::{debug, error, info, instrument, warn};

/// Unique identifier for a match.
pub type MatchId = String;

/// Deployment-wide settings applied to every match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Getters, derive_new::new)]
pub struct MatchSettings {
    /// Board size and win length.
    rules: Rules,
    /// What a departure does to the match.
    disconnect_policy: DisconnectPolicy,
}

/// A connected participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Participant's unique ID.
    pub player_id: PlayerId,
    /// Name shown to others.
    pub display_name: String,
    /// Stone held, `None` for observers.
    pub seat: Option<Stone>,
}

/// An event addressed to its recipients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// For one participant only.
    Unicast {
        /// Recipient.
        to: PlayerId,
        /// Event to deliver.
        event: ServerEvent,
    },
    /// For every connected participant.
    Broadcast(ServerEvent),
}

impl Outbound {
    /// The event being delivered.
    pub fn event(&self) -> &ServerEvent {
        match self {
            Outbound::Unicast { event, .. } | Outbound::Broadcast(event) => event,
        }
    }
}

/// One match and its roster.
#[derive(Debug)]
pub struct MatchSession {
    id: MatchId,
    settings: MatchSettings,
    state: MatchState,
    roster: Vec<Participant>,
    hints: Arc<dyn HintProvider>,
}

impl MatchSession {
    /// Creates a match waiting for players.
    #[instrument(skip(settings))]
    pub fn new(id: MatchId, settings: MatchSettings) -> Self {
        info!(match_id = %id, board_size = settings.rules.board_size(), "Creating new match");
        Self {
            id,
            state: MatchState::new(settings.rules),
            settings,
            roster: Vec::new(),
            hints: Arc::new(NoHints),
        }
    }

    /// Replaces the hint provider.
    pub fn with_hints(mut self, hints: Arc<dyn HintProvider>) -> Self {
        self.hints = hints;
        self
    }

    /// Match ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Authoritative state.
    pub fn state(&self) -> &MatchState {
        &self.state
    }

    /// Connected participants in join order.
    pub fn roster(&self) -> &[Participant] {
        &self.roster
    }

    /// Looks up a connected participant.
    pub fn participant(&self, player_id: &str) -> Option<&Participant> {
        self.roster.iter().find(|p| p.player_id == player_id)
    }

    fn snapshot(&self) -> ServerEvent {
        ServerEvent::StateUpdate(StateUpdate::from_state(&self.state, Utc::now()))
    }

    #[track_caller]
    fn seat_of(&self, requester: &str) -> Result<Stone, MatchError> {
        self.state
            .seat_of(requester)
            .ok_or_else(|| MatchErrorKind::NotParticipant(requester.to_string()).into())
    }

    /// Adds a participant to the roster.
    ///
    /// The first two distinct ids take Black then White; later ids observe.
    /// Registering an id that is already connected changes nothing and only
    /// resends the snapshot to that participant.
    #[instrument(skip(self), fields(match_id = %self.id))]
    pub fn register_participant(&mut self, player_id: &str, display_name: &str) -> Vec<Outbound> {
        let resync = Outbound::Unicast {
            to: player_id.to_string(),
            event: self.snapshot(),
        };
        if self.participant(player_id).is_some() {
            debug!(player_id, "Participant already registered");
            return vec![resync];
        }

        let seat = self.state.assign_seat(player_id);
        match seat {
            Some(stone) => info!(player_id, %stone, "Participant seated"),
            None => info!(player_id, "Participant joined as observer"),
        }
        self.roster.push(Participant {
            player_id: player_id.to_string(),
            display_name: display_name.to_string(),
            seat,
        });

        let joined = ServerEvent::ParticipantJoined(ParticipantJoined {
            player_id: player_id.to_string(),
            display_name: display_name.to_string(),
            assigned_piece: seat.map(Piece::from).unwrap_or_default(),
        });
        // Seat assignment shows up in the snapshot, so everyone gets one.
        vec![Outbound::Broadcast(joined), Outbound::Broadcast(self.snapshot())]
    }

    /// Begins play once both seats are filled.
    #[instrument(skip(self), fields(match_id = %self.id))]
    pub fn start_match(&mut self, requester: &str) -> Result<Vec<Outbound>, MatchError> {
        self.state.start(Utc::now())?;
        info!(requester, "Match in progress");
        Ok(vec![Outbound::Broadcast(self.snapshot())])
    }

    /// Places the requester's stone.
    ///
    /// Checks run in order: phase, seat, turn, bounds, occupancy.
    #[instrument(
        skip(self),
        fields(match_id = %self.id, row = position.row, col = position.col)
    )]
    pub fn place_stone(
        &mut self,
        requester: &str,
        position: Position,
    ) -> Result<Vec<Outbound>, MatchError> {
        if self.state.phase() != Phase::InProgress {
            return Err(MatchErrorKind::InvalidState(format!(
                "cannot place a stone while the match is {}",
                self.state.phase()
            ))
            .into());
        }
        let stone = self.seat_of(requester)?;

        let outcome = self.state.place(stone, position)?;
        let mut outbound = vec![Outbound::Broadcast(self.snapshot())];
        match outcome {
            Placement::Continue => {}
            Placement::Won(line) => {
                info!(requester, %stone, "Match won");
                outbound.push(Outbound::Broadcast(ServerEvent::MatchOver(MatchOver::from_state(
                    &self.state,
                    Some(&line),
                    Utc::now(),
                ))));
            }
            Placement::Draw => {
                info!("Match drawn");
                outbound.push(Outbound::Broadcast(ServerEvent::MatchOver(MatchOver::from_state(
                    &self.state,
                    None,
                    Utc::now(),
                ))));
            }
        }
        Ok(outbound)
    }

    /// Replaces the match with a fresh one, keeping seat assignments.
    #[instrument(skip(self), fields(match_id = %self.id))]
    pub fn restart_match(&mut self, requester: &str) -> Result<Vec<Outbound>, MatchError> {
        self.seat_of(requester)?;
        self.state = self.state.fresh();
        info!(requester, "Match restarted");
        Ok(vec![Outbound::Broadcast(self.snapshot())])
    }

    /// Takes back the requester's last placement.
    #[instrument(skip(self), fields(match_id = %self.id))]
    pub fn undo(&mut self, requester: &str) -> Result<Vec<Outbound>, MatchError> {
        let stone = self.seat_of(requester)?;
        self.state.undo(stone)?;
        Ok(vec![Outbound::Broadcast(self.snapshot())])
    }

    /// Asks the hint provider for a move, answering the requester only.
    #[instrument(skip(self), fields(match_id = %self.id))]
    pub fn hint(&mut self, requester: &str) -> Result<Vec<Outbound>, MatchError> {
        let stone = self.seat_of(requester)?;
        if self.state.phase() != Phase::InProgress {
            return Err(MatchErrorKind::InvalidState(format!(
                "hints are only available while the match is in progress, not {}",
                self.state.phase()
            ))
            .into());
        }
        if self.state.current_player() != stone {
            return Err(MatchErrorKind::NotYourTurn(self.state.current_player()).into());
        }

        let position = self.hints.suggest(&self.state, stone)?;
        let board = self.state.board();
        if !position.in_bounds(board.size()) || !board.is_empty(position) {
            return Err(MatchErrorKind::InternalFault(format!(
                "hint provider suggested unplayable cell {position}"
            ))
            .into());
        }
        debug!(requester, %position, "Hint suggested");
        Ok(vec![Outbound::Unicast {
            to: requester.to_string(),
            event: ServerEvent::Hint(HintResponse {
                player_id: requester.to_string(),
                row: position.row,
                col: position.col,
            }),
        }])
    }

    /// Removes a participant from the roster.
    ///
    /// Under [`DisconnectPolicy::AbandonMatch`] a seated player leaving an
    /// unfinished match resets it with their seat vacated.
    #[instrument(
        skip(self),
        fields(match_id = %self.id, policy = %self.settings.disconnect_policy)
    )]
    pub fn disconnect(&mut self, player_id: &str) -> Vec<Outbound> {
        let Some(index) = self.roster.iter().position(|p| p.player_id == player_id) else {
            debug!(player_id, "Disconnect for unknown participant");
            return Vec::new();
        };
        let leaver = self.roster.remove(index);
        info!(player_id, remaining = self.roster.len(), "Participant left");

        match (self.settings.disconnect_policy, self.state.seat_of(player_id)) {
            (DisconnectPolicy::AbandonMatch, Some(stone)) if !self.state.phase().is_terminal() => {
                let mut fresh = self.state.fresh();
                fresh.vacate(stone);
                self.state = fresh;
                warn!(
                    player_id,
                    display_name = %leaver.display_name,
                    %stone,
                    "Seat vacated, match reset"
                );
                vec![Outbound::Broadcast(self.snapshot())]
            }
            _ => Vec::new(),
        }
    }

    /// Decodes and executes one inbound frame from `player_id`.
    ///
    /// Unknown message types are ignored. Undecodable frames and requests
    /// claiming another identity are answered with an error.
    #[instrument(skip(self, bytes), fields(match_id = %self.id, len = bytes.len()))]
    pub fn handle(&mut self, player_id: &str, bytes: &[u8]) -> Vec<Outbound> {
        let request = match decode_request(bytes) {
            Ok(Some(request)) => request,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(player_id, error = %e, "Undecodable request");
                let err = MatchError::new(MatchErrorKind::UnsupportedCommand(
                    "request could not be decoded".to_string(),
                ));
                return vec![error_to(player_id, &err)];
            }
        };
        if request.player_id() != player_id {
            warn!(player_id, claimed = request.player_id(), "Request identity mismatch");
            let kind = MatchErrorKind::NotParticipant(request.player_id().to_string());
            let err = MatchError::new(kind);
            return vec![error_to(player_id, &err)];
        }
        self.execute(&request)
    }

    /// Executes a decoded request.
    ///
    /// On any rejection the state is exactly what it was before, and only
    /// the requester hears about it. Panics and post-command invariant
    /// failures surface as `InternalFault`.
    #[instrument(skip(self, request), fields(match_id = %self.id, kind = %request.kind()))]
    pub fn execute(&mut self, request: &ClientRequest) -> Vec<Outbound> {
        let requester = request.player_id().to_string();
        let backup = self.state.clone();

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(request)))
            .unwrap_or_else(|payload| {
                let detail = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                let detail = format!("panic while handling request: {detail}");
                Err(MatchErrorKind::InternalFault(detail).into())
            })
            .and_then(|outbound| {
                self.state.verify()?;
                Ok(outbound)
            });

        match result {
            Ok(outbound) => outbound,
            Err(err) => {
                self.state = backup;
                match err.kind() {
                    MatchErrorKind::InternalFault(_) => error!(
                        requester = %requester,
                        error = %err,
                        "Command failed internally, state restored"
                    ),
                    _ => debug!(requester = %requester, error = %err, "Command rejected"),
                }
                vec![error_to(&requester, &err)]
            }
        }
    }

    fn dispatch(&mut self, request: &ClientRequest) -> Result<Vec<Outbound>, MatchError> {
        match request {
            ClientRequest::PlaceStone(req) => self.place_stone(&req.player_id, req.position()),
            ClientRequest::Start(req) => self.start_match(&req.player_id),
            ClientRequest::Restart(req) => self.restart_match(&req.player_id),
            ClientRequest::Undo(req) => self.undo(&req.player_id),
            ClientRequest::Hint(req) => self.hint(&req.player_id),
        }
    }
}

fn error_to(player_id: &str, err: &MatchError) -> Outbound {
    Outbound::Unicast {
        to: player_id.to_string(),
        event: ServerEvent::Error(ErrorEvent::from_error(err, player_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ParticipantRequest, PlaceStoneRequest};

    fn session() -> MatchSession {
        MatchSession::new("m1".into(), MatchSettings::default())
    }

    fn place(player: &str, row: i64, col: i64) -> ClientRequest {
        ClientRequest::PlaceStone(PlaceStoneRequest {
            row,
            col,
            player_id: player.into(),
        })
    }

    fn error_code(outbound: &[Outbound]) -> Option<&str> {
        match outbound {
            [Outbound::Unicast { event: ServerEvent::Error(e), .. }] => Some(e.code.as_str()),
            _ => None,
        }
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut s = session();
        let first = s.register_participant("alice", "Alice");
        assert!(matches!(first[0], Outbound::Broadcast(ServerEvent::ParticipantJoined(_))));
        let again = s.register_participant("alice", "Alice");
        assert_eq!(again.len(), 1);
        assert!(matches!(again[0], Outbound::Unicast { .. }));
        assert_eq!(s.roster().len(), 1);
        assert_eq!(s.state().player2_id(), None);
    }

    #[test]
    fn test_third_participant_observes() {
        let mut s = session();
        s.register_participant("a", "A");
        s.register_participant("b", "B");
        let out = s.register_participant("c", "C");
        let Outbound::Broadcast(ServerEvent::ParticipantJoined(joined)) = &out[0] else {
            panic!("expected join broadcast");
        };
        assert_eq!(joined.assigned_piece, Piece::Empty);
        assert_eq!(s.participant("c").unwrap().seat, None);
    }

    #[test]
    fn test_place_before_start_is_invalid_state() {
        let mut s = session();
        s.register_participant("a", "A");
        let out = s.execute(&place("a", 0, 0));
        assert_eq!(error_code(&out), Some("InvalidState"));
    }

    #[test]
    fn test_spoofed_identity_rejected() {
        let mut s = session();
        s.register_participant("a", "A");
        s.register_participant("b", "B");
        s.start_match("a").unwrap();
        let frame = crate::protocol::encode_request(&place("a", 7, 7)).unwrap();
        let out = s.handle("b", frame.as_bytes());
        assert_eq!(error_code(&out), Some("NotParticipant"));
        assert_eq!(s.state().move_count(), 0);
    }

    #[test]
    fn test_restart_requires_seat() {
        let mut s = session();
        s.register_participant("a", "A");
        let out = s.execute(&ClientRequest::Restart(ParticipantRequest {
            player_id: "ghost".into(),
        }));
        assert_eq!(error_code(&out), Some("NotParticipant"));
    }

    #[test]
    fn test_abandon_policy_vacates_seat() {
        let settings = MatchSettings::new(Rules::default(), DisconnectPolicy::AbandonMatch);
        let mut s = MatchSession::new("m1".into(), settings);
        s.register_participant("a", "A");
        s.register_participant("b", "B");
        s.start_match("a").unwrap();
        s.place_stone("a", Position::new(7, 7)).unwrap();

        let out = s.disconnect("b");
        assert_eq!(out.len(), 1);
        assert_eq!(s.state().phase(), Phase::WaitingForPlayers);
        assert_eq!(s.state().player1_id(), Some("a"));
        assert_eq!(s.state().player2_id(), None);
        assert_eq!(s.state().board().occupied(), 0);
    }

    #[test]
    fn test_keep_policy_leaves_match() {
        let mut s = session();
        s.register_participant("a", "A");
        s.register_participant("b", "B");
        s.start_match("a").unwrap();
        s.place_stone("a", Position::new(7, 7)).unwrap();
        let before = s.state().clone();

        assert!(s.disconnect("b").is_empty());
        assert_eq!(s.state(), &before);
        assert!(s.disconnect("b").is_empty());

        // Same id resumes with the same stone.
        s.register_participant("b", "B");
        assert_eq!(s.participant("b").unwrap().seat, Some(Stone::White));
        assert!(s.place_stone("b", Position::new(8, 8)).is_ok());
    }
}
