//! Remote viewer mirror.
//!
//! A [`ClientView`] never computes game logic. It keeps whatever the server
//! last said as its whole truth and turns user actions into requests.

use crate::protocol::{
    ClientRequest, ErrorEvent, HintResponse, MatchOver, ParticipantJoined, ParticipantRequest,
    PlaceStoneRequest, ProtocolError, ServerEvent, StateUpdate, decode_event, encode_request,
};
use strictly_gomoku::{Phase, PlayerId, Position, Stone};
use tracing::{debug, instrument};

/// What a viewer knows about its match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientView {
    player_id: PlayerId,
    snapshot: Option<StateUpdate>,
    match_over: Option<MatchOver>,
    last_error: Option<ErrorEvent>,
    last_hint: Option<HintResponse>,
    participants: Vec<ParticipantJoined>,
}

impl ClientView {
    /// Creates an empty mirror for `player_id`.
    pub fn new(player_id: impl Into<PlayerId>) -> Self {
        Self {
            player_id: player_id.into(),
            snapshot: None,
            match_over: None,
            last_error: None,
            last_hint: None,
            participants: Vec::new(),
        }
    }

    /// Identity this viewer acts as.
    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    /// Latest snapshot.
    pub fn snapshot(&self) -> Option<&StateUpdate> {
        self.snapshot.as_ref()
    }

    /// Result of the current match, once over.
    pub fn match_over(&self) -> Option<&MatchOver> {
        self.match_over.as_ref()
    }

    /// Most recent rejection of one of this viewer's requests.
    pub fn last_error(&self) -> Option<&ErrorEvent> {
        self.last_error.as_ref()
    }

    /// Most recent suggestion.
    pub fn last_hint(&self) -> Option<&HintResponse> {
        self.last_hint.as_ref()
    }

    /// Everyone announced so far.
    pub fn participants(&self) -> &[ParticipantJoined] {
        &self.participants
    }

    /// Decodes a frame and applies it. Returns `false` for ignored frames.
    #[instrument(skip(self, bytes), fields(player_id = %self.player_id))]
    pub fn apply(&mut self, bytes: &[u8]) -> Result<bool, ProtocolError> {
        match decode_event(bytes)? {
            Some(event) => {
                self.apply_event(event);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Applies a decoded event.
    pub fn apply_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::StateUpdate(update) => {
                if !update.phase.is_terminal() {
                    self.match_over = None;
                }
                if update.phase == Phase::WaitingForPlayers {
                    self.last_hint = None;
                }
                self.snapshot = Some(update);
            }
            ServerEvent::MatchOver(over) => self.match_over = Some(over),
            ServerEvent::ParticipantJoined(joined) => {
                self.participants.retain(|p| p.player_id != joined.player_id);
                self.participants.push(joined);
            }
            ServerEvent::Error(err) => {
                debug!(code = %err.code, message = %err.message, "Request rejected");
                self.last_error = Some(err);
            }
            ServerEvent::Hint(hint) => self.last_hint = Some(hint),
        }
    }

    /// This viewer's stone, if seated.
    pub fn my_stone(&self) -> Option<Stone> {
        let snapshot = self.snapshot.as_ref()?;
        if snapshot.player1_id.as_deref() == Some(self.player_id.as_str()) {
            Some(Stone::Black)
        } else if snapshot.player2_id.as_deref() == Some(self.player_id.as_str()) {
            Some(Stone::White)
        } else {
            None
        }
    }

    /// True when the latest snapshot says this viewer is to move.
    pub fn is_my_turn(&self) -> bool {
        match (&self.snapshot, self.my_stone()) {
            (Some(snapshot), Some(stone)) => {
                snapshot.phase == Phase::InProgress && snapshot.current_player == stone
            }
            _ => false,
        }
    }

    fn participant(&self) -> ParticipantRequest {
        ParticipantRequest {
            player_id: self.player_id.clone(),
        }
    }

    /// Encodes a placement at `position`.
    pub fn request_place_stone(&self, position: Position) -> Result<String, ProtocolError> {
        encode_request(&ClientRequest::PlaceStone(PlaceStoneRequest {
            row: position.row.into(),
            col: position.col.into(),
            player_id: self.player_id.clone(),
        }))
    }

    /// Encodes a start request.
    pub fn request_start(&self) -> Result<String, ProtocolError> {
        encode_request(&ClientRequest::Start(self.participant()))
    }

    /// Encodes a restart request.
    pub fn request_restart(&self) -> Result<String, ProtocolError> {
        encode_request(&ClientRequest::Restart(self.participant()))
    }

    /// Encodes an undo request.
    pub fn request_undo(&self) -> Result<String, ProtocolError> {
        encode_request(&ClientRequest::Undo(self.participant()))
    }

    /// Encodes a hint request.
    pub fn request_hint(&self) -> Result<String, ProtocolError> {
        encode_request(&ClientRequest::Hint(self.participant()))
    }
}
