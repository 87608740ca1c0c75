//! Strictly Gomoku server - authoritative matches over WebSocket.
//!
//! # Architecture
//!
//! - **Protocol**: versioned JSON envelopes, unknown message types ignored
//! - **Session**: one match, its roster, and request validation
//! - **Actor**: a tokio task per match so commands apply one at a time
//! - **Registry**: creates matches on demand and drops them once empty
//! - **Host**: axum router upgrading `/matches/{id}/ws` to a WebSocket
//! - **Client**: a mirror that holds the last snapshot and builds requests

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod actor;
mod cli;
mod client;
mod config;
mod hint;
mod host;
mod protocol;
mod registry;
mod session;

pub use actor::{ConnectionId, Frame, FrameSink, MatchClosed, MatchHandle};
pub use cli::{Cli, Command};
pub use client::ClientView;
pub use config::{ConfigError, DisconnectPolicy, ServerConfig};
pub use hint::{CentreHint, HintProvider, NoHints};
pub use host::{ConnectParams, router};
pub use protocol::{
    ClientRequest, ErrorEvent, HintResponse, MatchOver, MessageKind, PROTOCOL_VERSION,
    ParticipantJoined, ParticipantRequest, PlaceStoneRequest, ProtocolError, ServerEvent,
    StateUpdate, decode_event, decode_request, encode_event, encode_request,
};
pub use registry::MatchRegistry;
pub use session::{MatchId, MatchSession, MatchSettings, Outbound, Participant};
