//! Versioned wire protocol between the match server and remote viewers.
//!
//! Every frame is a JSON envelope:
//!
//! ```text
//! { "v": 1, "type": "PlaceStone", "payload": { "row": 7, "col": 7, "playerId": "alice" } }
//! ```
//!
//! `type` names the message; `payload` is a record with stable camelCase
//! field names. Optional fields default when absent, and receivers ignore
//! frames whose `type` they do not know, so new message types and new
//! fields can be added without breaking older peers.

use chrono::{DateTime, Utc};
use derive_more::{Display, Error};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strictly_gomoku::{MatchError, MatchState, Phase, Piece, PlayerId, Position, Stone, WinningLine};
use tracing::{debug, instrument};

/// Version written into every outgoing envelope.
pub const PROTOCOL_VERSION: u16 = 1;

/// Message discriminant carried in the envelope's `type` field.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
pub enum MessageKind {
    /// Request: place a stone.
    PlaceStone,
    /// Broadcast: full match snapshot.
    StateUpdate,
    /// Broadcast: the match reached a terminal phase.
    MatchOver,
    /// Request: replace the match with a fresh one.
    Restart,
    /// Broadcast: someone joined the match.
    ParticipantJoined,
    /// Unicast: a request was rejected.
    Error,
    /// Request: take back the last placement.
    Undo,
    /// Request, or unicast reply carrying a suggestion.
    Hint,
    /// Request: begin play.
    Start,
}

/// Payload of a `PlaceStone` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceStoneRequest {
    /// Target row.
    pub row: i64,
    /// Target column.
    pub col: i64,
    /// Requesting participant.
    pub player_id: PlayerId,
}

impl PlaceStoneRequest {
    /// Target position.
    ///
    /// Coordinates too large for the board's index type saturate, so they
    /// stay off the board instead of wrapping onto it.
    pub fn position(&self) -> Position {
        Position::new(saturate(self.row), saturate(self.col))
    }
}

fn saturate(coordinate: i64) -> i32 {
    i32::try_from(coordinate).unwrap_or(if coordinate < 0 { i32::MIN } else { i32::MAX })
}

/// Payload of requests that carry nothing but the requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRequest {
    /// Requesting participant.
    pub player_id: PlayerId,
}

/// A request from a viewer to the match server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
    /// Place a stone.
    PlaceStone(PlaceStoneRequest),
    /// Start the match.
    Start(ParticipantRequest),
    /// Restart the match.
    Restart(ParticipantRequest),
    /// Take back the last placement.
    Undo(ParticipantRequest),
    /// Ask for a suggested move.
    Hint(ParticipantRequest),
}

impl ClientRequest {
    /// Envelope discriminant for this request.
    pub fn kind(&self) -> MessageKind {
        match self {
            ClientRequest::PlaceStone(_) => MessageKind::PlaceStone,
            ClientRequest::Start(_) => MessageKind::Start,
            ClientRequest::Restart(_) => MessageKind::Restart,
            ClientRequest::Undo(_) => MessageKind::Undo,
            ClientRequest::Hint(_) => MessageKind::Hint,
        }
    }

    /// Identity the request claims to come from.
    pub fn player_id(&self) -> &str {
        match self {
            ClientRequest::PlaceStone(req) => &req.player_id,
            ClientRequest::Start(req)
            | ClientRequest::Restart(req)
            | ClientRequest::Undo(req)
            | ClientRequest::Hint(req) => &req.player_id,
        }
    }
}

/// Full snapshot of a match. Never a delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdate {
    /// Edge length of the board.
    pub board_size: usize,
    /// Every cell in row-major order.
    pub board: Vec<Piece>,
    /// Lifecycle phase.
    pub phase: Phase,
    /// Stone to move next.
    pub current_player: Stone,
    /// Black's seat.
    #[serde(default)]
    pub player1_id: Option<PlayerId>,
    /// White's seat.
    #[serde(default)]
    pub player2_id: Option<PlayerId>,
    /// Stones placed so far.
    pub move_count: usize,
    /// Most recent placement.
    #[serde(default)]
    pub last_move: Option<Position>,
    /// Server time of the snapshot, milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: i64,
}

impl StateUpdate {
    /// Snapshots `state` as of `now`.
    #[instrument(skip(state), fields(phase = %state.phase(), move_count = state.move_count()))]
    pub fn from_state(state: &MatchState, now: DateTime<Utc>) -> Self {
        Self {
            board_size: state.board().size(),
            board: state.board().cells().to_vec(),
            phase: state.phase(),
            current_player: state.current_player(),
            player1_id: state.player1_id().map(str::to_string),
            player2_id: state.player2_id().map(str::to_string),
            move_count: state.move_count(),
            last_move: state.last_move(),
            timestamp: now.timestamp_millis(),
        }
    }

    /// Piece at `pos`, `Empty` when off the board.
    pub fn piece_at(&self, pos: Position) -> Piece {
        pos.to_index(self.board_size)
            .and_then(|idx| self.board.get(idx).copied())
            .unwrap_or(Piece::Empty)
    }
}

/// Final result of a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOver {
    /// Terminal phase reached.
    pub phase: Phase,
    /// Seat holder of the winning stone; absent on a draw.
    #[serde(default)]
    pub winner_id: Option<PlayerId>,
    /// Completing run, ordered; empty on a draw.
    #[serde(default)]
    pub winning_line: Vec<Position>,
    /// Stones placed in the match.
    pub total_moves: usize,
    /// Milliseconds from start to finish.
    #[serde(default, rename = "duration")]
    pub duration_ms: u64,
}

impl MatchOver {
    /// Summarises a terminal `state`.
    #[instrument(skip(state, line), fields(phase = %state.phase()))]
    pub fn from_state(state: &MatchState, line: Option<&WinningLine>, now: DateTime<Utc>) -> Self {
        let duration_ms = state
            .started_at()
            .map(|start| (now - start).num_milliseconds().max(0) as u64)
            .unwrap_or_default();
        Self {
            phase: state.phase(),
            winner_id: state
                .phase()
                .winner()
                .and_then(|stone| state.player_for(stone))
                .map(str::to_string),
            winning_line: line.map(|l| l.positions.clone()).unwrap_or_default(),
            total_moves: state.move_count(),
            duration_ms,
        }
    }
}

/// A rejected request, reported to the requester only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    /// Machine-readable error code.
    #[serde(default)]
    pub code: String,
    /// Human-readable description.
    pub message: String,
    /// The requester.
    pub player_id: PlayerId,
}

impl ErrorEvent {
    /// Builds the wire form of `err` for `player_id`.
    pub fn from_error(err: &MatchError, player_id: &str) -> Self {
        Self {
            code: err.kind().code().to_string(),
            message: err.kind().public_message(),
            player_id: player_id.to_string(),
        }
    }
}

/// Announcement of a new participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantJoined {
    /// The participant.
    pub player_id: PlayerId,
    /// Name to show for them.
    pub display_name: String,
    /// Their stone; `empty` for observers.
    pub assigned_piece: Piece,
}

/// A suggested move, sent only to the player who asked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HintResponse {
    /// The requester.
    pub player_id: PlayerId,
    /// Suggested row.
    pub row: i32,
    /// Suggested column.
    pub col: i32,
}

/// An event from the match server to viewers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Full snapshot.
    StateUpdate(StateUpdate),
    /// Terminal result.
    MatchOver(MatchOver),
    /// New participant.
    ParticipantJoined(ParticipantJoined),
    /// Rejected request.
    Error(ErrorEvent),
    /// Suggested move.
    Hint(HintResponse),
}

impl ServerEvent {
    /// Envelope discriminant for this event.
    pub fn kind(&self) -> MessageKind {
        match self {
            ServerEvent::StateUpdate(_) => MessageKind::StateUpdate,
            ServerEvent::MatchOver(_) => MessageKind::MatchOver,
            ServerEvent::ParticipantJoined(_) => MessageKind::ParticipantJoined,
            ServerEvent::Error(_) => MessageKind::Error,
            ServerEvent::Hint(_) => MessageKind::Hint,
        }
    }
}

/// Protocol error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Protocol error: {} at {}:{}", message, file, line)]
pub struct ProtocolError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ProtocolError {
    /// Creates a new protocol error with caller location tracking.
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

impl From<serde_json::Error> for ProtocolError {
    #[track_caller]
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("JSON error: {}", err))
    }
}

#[derive(Serialize)]
struct Envelope<'a, T> {
    v: u16,
    #[serde(rename = "type")]
    kind: &'static str,
    payload: &'a T,
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    v: u16,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
}

fn frame<T: Serialize>(kind: MessageKind, payload: &T) -> Result<String, ProtocolError> {
    let envelope = Envelope {
        v: PROTOCOL_VERSION,
        kind: kind.into(),
        payload,
    };
    Ok(serde_json::to_string(&envelope)?)
}

fn payload<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, ProtocolError> {
    Ok(serde_json::from_value(value)?)
}

/// Splits a frame into its discriminant and payload.
///
/// Returns `None` for a discriminant this build does not know.
fn open(bytes: &[u8]) -> Result<Option<(MessageKind, serde_json::Value)>, ProtocolError> {
    let raw: RawEnvelope = serde_json::from_slice(bytes)?;
    match MessageKind::from_str(&raw.kind) {
        Ok(kind) => Ok(Some((kind, raw.payload))),
        Err(_) => {
            debug!(kind = %raw.kind, version = raw.v, "Ignoring unknown message type");
            Ok(None)
        }
    }
}

/// Encodes a request.
pub fn encode_request(request: &ClientRequest) -> Result<String, ProtocolError> {
    match request {
        ClientRequest::PlaceStone(req) => frame(MessageKind::PlaceStone, req),
        ClientRequest::Start(req)
        | ClientRequest::Restart(req)
        | ClientRequest::Undo(req)
        | ClientRequest::Hint(req) => frame(request.kind(), req),
    }
}

/// Decodes a request. `Ok(None)` means the frame should be ignored.
#[instrument(skip(bytes), fields(len = bytes.len()))]
pub fn decode_request(bytes: &[u8]) -> Result<Option<ClientRequest>, ProtocolError> {
    let Some((kind, value)) = open(bytes)? else {
        return Ok(None);
    };
    let request = match kind {
        MessageKind::PlaceStone => ClientRequest::PlaceStone(payload(value)?),
        MessageKind::Start => ClientRequest::Start(payload(value)?),
        MessageKind::Restart => ClientRequest::Restart(payload(value)?),
        MessageKind::Undo => ClientRequest::Undo(payload(value)?),
        MessageKind::Hint => ClientRequest::Hint(payload(value)?),
        other => {
            return Err(ProtocolError::new(format!(
                "{other} is a server message and cannot be sent as a request"
            )));
        }
    };
    Ok(Some(request))
}

/// Encodes an event.
pub fn encode_event(event: &ServerEvent) -> Result<String, ProtocolError> {
    match event {
        ServerEvent::StateUpdate(e) => frame(MessageKind::StateUpdate, e),
        ServerEvent::MatchOver(e) => frame(MessageKind::MatchOver, e),
        ServerEvent::ParticipantJoined(e) => frame(MessageKind::ParticipantJoined, e),
        ServerEvent::Error(e) => frame(MessageKind::Error, e),
        ServerEvent::Hint(e) => frame(MessageKind::Hint, e),
    }
}

/// Decodes an event. `Ok(None)` means the frame should be ignored.
#[instrument(skip(bytes), fields(len = bytes.len()))]
pub fn decode_event(bytes: &[u8]) -> Result<Option<ServerEvent>, ProtocolError> {
    let Some((kind, value)) = open(bytes)? else {
        return Ok(None);
    };
    let event = match kind {
        MessageKind::StateUpdate => ServerEvent::StateUpdate(payload(value)?),
        MessageKind::MatchOver => ServerEvent::MatchOver(payload(value)?),
        MessageKind::ParticipantJoined => ServerEvent::ParticipantJoined(payload(value)?),
        MessageKind::Error => ServerEvent::Error(payload(value)?),
        MessageKind::Hint => ServerEvent::Hint(payload(value)?),
        other => {
            return Err(ProtocolError::new(format!(
                "{other} is a request and cannot be received as an event"
            )));
        }
    };
    Ok(Some(event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strictly_gomoku::Rules;

    #[test]
    fn test_place_stone_wire_shape() {
        let request = ClientRequest::PlaceStone(PlaceStoneRequest {
            row: 7,
            col: 8,
            player_id: "alice".into(),
        });
        let encoded = encode_request(&request).unwrap();
        let json: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(json["v"], 1);
        assert_eq!(json["type"], "PlaceStone");
        assert_eq!(json["payload"]["row"], 7);
        assert_eq!(json["payload"]["col"], 8);
        assert_eq!(json["payload"]["playerId"], "alice");
    }

    #[test]
    fn test_huge_coordinates_stay_off_board() {
        let frame = serde_json::json!({
            "v": 1,
            "type": "PlaceStone",
            "payload": { "row": 4_294_967_296_i64, "col": -4_294_967_296_i64, "playerId": "a" }
        })
        .to_string();
        let Some(ClientRequest::PlaceStone(request)) = decode_request(frame.as_bytes()).unwrap()
        else {
            panic!("expected a PlaceStone request");
        };
        assert_eq!(request.position(), Position::new(i32::MAX, i32::MIN));
        assert!(!request.position().in_bounds(15));
    }

    #[test]
    fn test_unknown_type_is_ignored() {
        let frame = br#"{"v":3,"type":"Emote","payload":{"playerId":"a","emoji":"wave"}}"#;
        assert_eq!(decode_request(frame).unwrap(), None);
        assert_eq!(decode_event(frame).unwrap(), None);
    }

    #[test]
    fn test_extra_fields_and_missing_version_tolerated() {
        let frame = br#"{"type":"Start","payload":{"playerId":"bob","color":"red"}}"#;
        assert_eq!(
            decode_request(frame).unwrap(),
            Some(ClientRequest::Start(ParticipantRequest {
                player_id: "bob".into()
            }))
        );
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        assert!(decode_request(br#"{"v":1,"type":"PlaceStone","payload":{"row":"x"}}"#).is_err());
        assert!(decode_request(b"not json").is_err());
    }

    #[test]
    fn test_server_kinds_rejected_as_requests() {
        let frame = br#"{"v":1,"type":"StateUpdate","payload":{}}"#;
        assert!(decode_request(frame).is_err());
    }

    #[test]
    fn test_snapshot_covers_every_cell() {
        let state = MatchState::new(Rules::default());
        let update = StateUpdate::from_state(&state, Utc::now());
        assert_eq!(update.board.len(), 225);
        assert_eq!(update.phase, Phase::WaitingForPlayers);

        let encoded = encode_event(&ServerEvent::StateUpdate(update.clone())).unwrap();
        let json: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(json["payload"]["phase"], "waitingForPlayers");
        assert_eq!(json["payload"]["currentPlayer"], "black");
        assert_eq!(json["payload"]["board"][0], "empty");
        assert_eq!(
            decode_event(encoded.as_bytes()).unwrap(),
            Some(ServerEvent::StateUpdate(update))
        );
    }

    #[test]
    fn test_match_over_duration_field_name() {
        let over = MatchOver {
            phase: Phase::Draw,
            winner_id: None,
            winning_line: Vec::new(),
            total_moves: 225,
            duration_ms: 1500,
        };
        let encoded = encode_event(&ServerEvent::MatchOver(over)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(json["payload"]["duration"], 1500);
        assert_eq!(json["payload"]["totalMoves"], 225);
    }
}
