//! Directory of running matches.

use crate::actor::{ConnectionId, FrameSink, MatchClosed, MatchHandle};
use crate::hint::{HintProvider, NoHints};
use crate::session::{MatchId, MatchSession, MatchSettings};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, instrument};

/// Creates match actors on demand and forgets them once they close.
#[derive(Debug, Clone)]
pub struct MatchRegistry {
    matches: Arc<RwLock<HashMap<MatchId, MatchHandle>>>,
    settings: MatchSettings,
    queue_capacity: usize,
    hints: Arc<dyn HintProvider>,
    closed_tx: mpsc::UnboundedSender<MatchId>,
}

impl MatchRegistry {
    /// Creates an empty registry.
    ///
    /// Must be called inside a tokio runtime; a background task removes
    /// matches whose roster has emptied.
    #[instrument(skip(settings))]
    pub fn new(settings: MatchSettings, queue_capacity: usize) -> Self {
        let matches: Arc<RwLock<HashMap<MatchId, MatchHandle>>> = Arc::default();
        let (closed_tx, mut closed_rx) = mpsc::unbounded_channel::<MatchId>();

        let reaped = Arc::clone(&matches);
        tokio::spawn(async move {
            while let Some(match_id) = closed_rx.recv().await {
                let mut matches = reaped.write().await;
                // A replacement may already be registered under the same id.
                if matches.get(&match_id).is_some_and(MatchHandle::is_closed) {
                    matches.remove(&match_id);
                    info!(%match_id, "Closed match removed");
                }
            }
        });

        info!("Creating match registry");
        Self {
            matches,
            settings,
            queue_capacity,
            hints: Arc::new(NoHints),
            closed_tx,
        }
    }

    /// Replaces the hint provider for matches created from now on.
    pub fn with_hints(mut self, hints: Arc<dyn HintProvider>) -> Self {
        self.hints = hints;
        self
    }

    /// Settings applied to new matches.
    pub fn settings(&self) -> &MatchSettings {
        &self.settings
    }

    /// Returns the running match, starting one if needed.
    #[instrument(skip(self))]
    pub async fn get_or_create(&self, match_id: &str) -> MatchHandle {
        if let Some(handle) = self.get(match_id).await {
            return handle;
        }

        let mut matches = self.matches.write().await;
        if let Some(handle) = matches.get(match_id).filter(|h| !h.is_closed()) {
            return handle.clone();
        }
        let session = MatchSession::new(match_id.to_string(), self.settings)
            .with_hints(Arc::clone(&self.hints));
        let (handle, _task) =
            MatchHandle::spawn(session, self.queue_capacity, Some(self.closed_tx.clone()));
        matches.insert(match_id.to_string(), handle.clone());
        info!(match_id, total = matches.len(), "Match created");
        handle
    }

    /// Returns the running match, if any.
    #[instrument(skip(self))]
    pub async fn get(&self, match_id: &str) -> Option<MatchHandle> {
        let handle = self
            .matches
            .read()
            .await
            .get(match_id)
            .filter(|h| !h.is_closed())
            .cloned();
        if handle.is_none() {
            debug!(match_id, "Match not found");
        }
        handle
    }

    /// Connects a participant, creating the match if needed.
    ///
    /// Retries once when the match closes between lookup and connect. The
    /// returned ID is what the connection later disconnects with.
    #[instrument(skip(self, sink))]
    pub async fn join(
        &self,
        match_id: &str,
        player_id: &str,
        display_name: &str,
        sink: FrameSink,
    ) -> Result<(MatchHandle, ConnectionId), MatchClosed> {
        let handle = self.get_or_create(match_id).await;
        match handle.connect(player_id, display_name, sink.clone()).await {
            Ok(connection) => Ok((handle, connection)),
            Err(_) => {
                debug!(match_id, "Match closed during join, retrying");
                self.forget_closed(match_id).await;
                let handle = self.get_or_create(match_id).await;
                let connection = handle.connect(player_id, display_name, sink).await?;
                Ok((handle, connection))
            }
        }
    }

    async fn forget_closed(&self, match_id: &str) {
        let mut matches = self.matches.write().await;
        if matches.get(match_id).is_some_and(MatchHandle::is_closed) {
            matches.remove(match_id);
        }
    }

    /// IDs of running matches, sorted.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Vec<MatchId> {
        let mut ids: Vec<_> = self
            .matches
            .read()
            .await
            .iter()
            .filter(|(_, h)| !h.is_closed())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        debug!(count = ids.len(), "Listed matches");
        ids
    }

    /// Forgets a match. Its task stops once its connections are gone.
    #[instrument(skip(self))]
    pub async fn remove(&self, match_id: &str) -> Option<MatchHandle> {
        self.matches.write().await.remove(match_id)
    }
}
