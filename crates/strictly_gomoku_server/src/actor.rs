//! Single-writer task that owns a match.
//!
//! Every hook on a [`MatchHandle`] becomes a command on the match's queue,
//! so commands for one match are applied strictly one at a time. Outbound
//! events are encoded once and pushed to per-connection sinks without
//! waiting on them.

use crate::protocol::encode_event;
use crate::session::{MatchId, MatchSession, Outbound};
use derive_more::{Display, Error};
use std::collections::HashMap;
use std::sync::Arc;
use strictly_gomoku::{MatchState, PlayerId};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// One encoded outbound frame, shared between recipients.
pub type Frame = Arc<str>;

/// Where a connection receives its frames.
pub type FrameSink = mpsc::UnboundedSender<Frame>;

/// Identifies one connection of a participant within a match.
///
/// A participant that connects again gets a new ID, and disconnects still
/// carrying the old one are ignored.
pub type ConnectionId = u64;

enum MatchCommand {
    Connect {
        player_id: PlayerId,
        display_name: String,
        sink: FrameSink,
        ack: oneshot::Sender<ConnectionId>,
    },
    Disconnect {
        player_id: PlayerId,
        connection: ConnectionId,
    },
    Receive {
        player_id: PlayerId,
        bytes: Vec<u8>,
    },
    Snapshot {
        reply: oneshot::Sender<MatchState>,
    },
}

/// The match task has stopped.
#[derive(Debug, Clone, Display, Error)]
#[display("Match {} is closed", match_id)]
pub struct MatchClosed {
    /// The closed match.
    pub match_id: MatchId,
}

/// Cloneable handle to a running match.
#[derive(Debug, Clone)]
pub struct MatchHandle {
    id: MatchId,
    tx: mpsc::Sender<MatchCommand>,
}

impl std::fmt::Debug for MatchCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchCommand::Connect { player_id, .. } => write!(f, "Connect({player_id})"),
            MatchCommand::Disconnect {
                player_id,
                connection,
            } => write!(f, "Disconnect({player_id}, #{connection})"),
            MatchCommand::Receive { player_id, bytes } => {
                write!(f, "Receive({player_id}, {} bytes)", bytes.len())
            }
            MatchCommand::Snapshot { .. } => write!(f, "Snapshot"),
        }
    }
}

impl MatchHandle {
    /// Spawns the task for `session`.
    ///
    /// When the last participant leaves and no command is waiting, the task
    /// stops and, if `on_empty` is given, reports the match ID there.
    #[instrument(skip(session, on_empty), fields(match_id = %session.id()))]
    pub fn spawn(
        session: MatchSession,
        queue_capacity: usize,
        on_empty: Option<mpsc::UnboundedSender<MatchId>>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let id = session.id().to_string();
        let task = tokio::spawn(run(session, rx, on_empty));
        info!("Match task spawned");
        (Self { id, tx }, task)
    }

    /// Match ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// True once the task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn closed(&self) -> MatchClosed {
        MatchClosed {
            match_id: self.id.clone(),
        }
    }

    async fn send(&self, command: MatchCommand) -> Result<(), MatchClosed> {
        self.tx.send(command).await.map_err(|_| self.closed())
    }

    /// Registers a connection and the sink its frames go to.
    ///
    /// Returns once the match has applied the connection. A connection
    /// that raced with the match closing yields [`MatchClosed`].
    #[instrument(skip(self, sink), fields(match_id = %self.id))]
    pub async fn connect(
        &self,
        player_id: &str,
        display_name: &str,
        sink: FrameSink,
    ) -> Result<ConnectionId, MatchClosed> {
        let (ack, applied) = oneshot::channel();
        self.send(MatchCommand::Connect {
            player_id: player_id.to_string(),
            display_name: display_name.to_string(),
            sink,
            ack,
        })
        .await?;
        applied.await.map_err(|_| self.closed())
    }

    /// Drops a connection.
    ///
    /// Ignored when `player_id` has connected again since `connection`.
    #[instrument(skip(self), fields(match_id = %self.id))]
    pub async fn disconnect(
        &self,
        player_id: &str,
        connection: ConnectionId,
    ) -> Result<(), MatchClosed> {
        self.send(MatchCommand::Disconnect {
            player_id: player_id.to_string(),
            connection,
        })
        .await
    }

    /// Delivers raw bytes received from a connection.
    #[instrument(skip(self, bytes), fields(match_id = %self.id, len = bytes.len()))]
    pub async fn receive(&self, player_id: &str, bytes: Vec<u8>) -> Result<(), MatchClosed> {
        self.send(MatchCommand::Receive {
            player_id: player_id.to_string(),
            bytes,
        })
        .await
    }

    /// Current state, after every command queued before this call.
    pub async fn snapshot(&self) -> Result<MatchState, MatchClosed> {
        let (reply, rx) = oneshot::channel();
        self.send(MatchCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| self.closed())
    }
}

async fn run(
    mut session: MatchSession,
    mut rx: mpsc::Receiver<MatchCommand>,
    on_empty: Option<mpsc::UnboundedSender<MatchId>>,
) {
    let mut sinks: HashMap<PlayerId, (ConnectionId, FrameSink)> = HashMap::new();
    let mut next_connection: ConnectionId = 0;

    while let Some(command) = rx.recv().await {
        debug!(match_id = %session.id(), ?command, "Processing command");
        let outbound = match command {
            MatchCommand::Connect {
                player_id,
                display_name,
                sink,
                ack,
            } => {
                next_connection += 1;
                if ack.send(next_connection).is_ok() {
                    sinks.insert(player_id.clone(), (next_connection, sink));
                    session.register_participant(&player_id, &display_name)
                } else {
                    debug!(match_id = %session.id(), %player_id, "Connect abandoned by caller");
                    Vec::new()
                }
            }
            MatchCommand::Disconnect {
                player_id,
                connection,
            } => match sinks.get(&player_id) {
                Some((current, _)) if *current == connection => {
                    sinks.remove(&player_id);
                    session.disconnect(&player_id)
                }
                _ => {
                    debug!(
                        match_id = %session.id(),
                        %player_id,
                        connection,
                        "Stale disconnect ignored"
                    );
                    Vec::new()
                }
            },
            MatchCommand::Receive { player_id, bytes } => {
                if !sinks.contains_key(&player_id) {
                    warn!(
                        match_id = %session.id(),
                        %player_id,
                        "Frame from unconnected participant"
                    );
                }
                session.handle(&player_id, &bytes)
            }
            MatchCommand::Snapshot { reply } => {
                let _ = reply.send(session.state().clone());
                Vec::new()
            }
        };
        deliver(session.id(), &sinks, outbound);

        if session.roster().is_empty() && rx.is_empty() {
            info!(match_id = %session.id(), "Roster empty, closing match");
            break;
        }
    }

    // Anything that slipped in after the last check is dropped, which
    // fails pending connects so their callers look the match up again.
    rx.close();
    while let Some(command) = rx.recv().await {
        debug!(match_id = %session.id(), ?command, "Dropping command for closed match");
    }

    if let Some(on_empty) = on_empty
        && on_empty.send(session.id().to_string()).is_err()
    {
        debug!(match_id = %session.id(), "Registry gone before match closed");
    }
}

fn deliver(
    match_id: &str,
    sinks: &HashMap<PlayerId, (ConnectionId, FrameSink)>,
    outbound: Vec<Outbound>,
) {
    for item in outbound {
        let frame: Frame = match encode_event(item.event()) {
            Ok(text) => text.into(),
            Err(e) => {
                error!(match_id, error = %e, "Failed to encode event");
                continue;
            }
        };
        match item {
            Outbound::Unicast { to, .. } => match sinks.get(&to) {
                Some((_, sink)) => push(match_id, &to, sink, frame),
                None => debug!(match_id, player_id = %to, "No sink for unicast recipient"),
            },
            Outbound::Broadcast(_) => {
                for (player_id, (_, sink)) in sinks {
                    push(match_id, player_id, sink, frame.clone());
                }
            }
        }
    }
}

fn push(match_id: &str, player_id: &str, sink: &FrameSink, frame: Frame) {
    if sink.send(frame).is_err() {
        debug!(match_id, player_id, "Sink closed, frame dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ServerEvent, decode_event};
    use crate::session::MatchSettings;

    fn spawn() -> (MatchHandle, JoinHandle<()>) {
        MatchHandle::spawn(
            MatchSession::new("m1".into(), MatchSettings::default()),
            8,
            None,
        )
    }

    fn kind(frame: &Frame) -> Option<ServerEvent> {
        decode_event(frame.as_bytes()).unwrap()
    }

    #[tokio::test]
    async fn test_connect_delivers_join_and_snapshot() {
        let (handle, _task) = spawn();
        let (tx, mut rx) = mpsc::unbounded_channel();
        handle.connect("alice", "Alice", tx).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert!(matches!(
            decode_event(first.as_bytes()).unwrap(),
            Some(ServerEvent::ParticipantJoined(_))
        ));
        let second = rx.recv().await.unwrap();
        assert!(matches!(
            decode_event(second.as_bytes()).unwrap(),
            Some(ServerEvent::StateUpdate(_))
        ));
        assert_eq!(handle.snapshot().await.unwrap().player1_id(), Some("alice"));
    }

    #[tokio::test]
    async fn test_task_stops_when_roster_empties() {
        let (report_tx, mut report_rx) = mpsc::unbounded_channel();
        let (handle, task) = MatchHandle::spawn(
            MatchSession::new("m2".into(), MatchSettings::default()),
            8,
            Some(report_tx),
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        let connection = handle.connect("alice", "Alice", tx).await.unwrap();
        handle.disconnect("alice", connection).await.unwrap();

        task.await.unwrap();
        assert_eq!(report_rx.recv().await.as_deref(), Some("m2"));
        assert!(handle.is_closed());
        assert!(handle.snapshot().await.is_err());
    }

    #[tokio::test]
    async fn test_dropped_sink_does_not_stop_match() {
        let (handle, _task) = spawn();
        let (gone_tx, gone_rx) = mpsc::unbounded_channel();
        drop(gone_rx);
        handle.connect("alice", "Alice", gone_tx).await.unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        handle.connect("bob", "Bob", tx).await.unwrap();
        assert_eq!(handle.snapshot().await.unwrap().player2_id(), Some("bob"));
    }

    #[tokio::test]
    async fn test_stale_disconnect_keeps_reconnected_player() {
        let (handle, _task) = spawn();
        let (first_tx, mut first_rx) = mpsc::unbounded_channel();
        let first = handle.connect("alice", "Alice", first_tx).await.unwrap();
        let (bob_tx, _bob_rx) = mpsc::unbounded_channel();
        handle.connect("bob", "Bob", bob_tx).await.unwrap();
        let (second_tx, mut second_rx) = mpsc::unbounded_channel();
        let second = handle.connect("alice", "Alice", second_tx).await.unwrap();
        assert_ne!(first, second);

        // The replaced sink is released, ending the old connection.
        while first_rx.recv().await.is_some() {}

        handle.disconnect("alice", first).await.unwrap();
        let state = handle.snapshot().await.unwrap();
        assert_eq!(state.player1_id(), Some("alice"));

        // The live connection still gets broadcasts.
        let (carol_tx, _carol_rx) = mpsc::unbounded_channel();
        handle.connect("carol", "Carol", carol_tx).await.unwrap();
        handle.snapshot().await.unwrap();
        let mut joined = Vec::new();
        while let Ok(frame) = second_rx.try_recv() {
            if let Some(ServerEvent::ParticipantJoined(j)) = kind(&frame) {
                joined.push(j.player_id);
            }
        }
        assert!(joined.contains(&"carol".to_string()));
        assert!(!second_rx.is_closed());
    }

    #[tokio::test]
    async fn test_connect_queued_behind_last_disconnect_is_applied() {
        let (report_tx, mut report_rx) = mpsc::unbounded_channel();
        let (handle, task) = MatchHandle::spawn(
            MatchSession::new("m3".into(), MatchSettings::default()),
            8,
            Some(report_tx),
        );
        let (alice_tx, _alice_rx) = mpsc::unbounded_channel();
        let alice = handle.connect("alice", "Alice", alice_tx).await.unwrap();

        // Both commands are queued before the task sees either of them.
        let (bob_tx, mut bob_rx) = mpsc::unbounded_channel();
        let (left, joined) = tokio::join!(
            handle.disconnect("alice", alice),
            handle.connect("bob", "Bob", bob_tx)
        );
        left.unwrap();
        joined.unwrap();

        let first = bob_rx.recv().await.unwrap();
        assert!(matches!(
            kind(&first),
            Some(ServerEvent::ParticipantJoined(j)) if j.player_id == "bob"
        ));
        assert!(!handle.is_closed());
        assert!(!task.is_finished());
        assert!(report_rx.try_recv().is_err());
    }
}
