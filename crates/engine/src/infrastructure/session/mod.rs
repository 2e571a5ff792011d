//! Session management for active game connections.
//!
//! Each WebSocket connection owns exactly one `GameSession`. The manager
//! is the only cross-connection state: a concurrent registry keyed by
//! connection id, with explicit create/lookup/destroy lifecycle hooks and
//! a staleness sweep that force-closes idle connections.

mod conversation;
mod game_session;

pub use conversation::{ConversationTurn, Role};
pub use game_session::{GameSession, XpGrant};

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Registry entry for one live connection.
#[derive(Clone)]
pub struct SessionHandle {
    /// One mutex per session: all mutation is short and synchronous, and
    /// the lock is never held across the provider call.
    pub session: Arc<Mutex<GameSession>>,
    /// Cancelling this token makes the connection task shut down.
    pub cancel: CancellationToken,
}

/// Connection id -> session registry.
pub struct SessionManager {
    sessions: DashMap<Uuid, SessionHandle>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Register a session for a connection, replacing any previous one
    /// (a client may re-`init` on the same connection).
    pub fn create(
        &self,
        connection_id: Uuid,
        session: GameSession,
        cancel: CancellationToken,
    ) -> Arc<Mutex<GameSession>> {
        let session = Arc::new(Mutex::new(session));
        self.sessions.insert(
            connection_id,
            SessionHandle {
                session: session.clone(),
                cancel,
            },
        );
        tracing::info!(connection_id = %connection_id, "Session created");
        session
    }

    pub fn lookup(&self, connection_id: Uuid) -> Option<Arc<Mutex<GameSession>>> {
        self.sessions
            .get(&connection_id)
            .map(|handle| handle.session.clone())
    }

    /// Remove a session, returning it so the caller can flush rewards.
    pub fn destroy(&self, connection_id: Uuid) -> Option<Arc<Mutex<GameSession>>> {
        self.sessions.remove(&connection_id).map(|(_, handle)| {
            tracing::info!(connection_id = %connection_id, "Session destroyed");
            handle.session
        })
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Cancel the connection of every session idle past the staleness
    /// threshold. Cleanup itself (XP flush, registry removal) runs in the
    /// cancelled connection task; this only reads `last_activity`.
    pub async fn sweep_stale(&self) -> usize {
        self.sweep_stale_at(std::time::Instant::now()).await
    }

    async fn sweep_stale_at(&self, now: std::time::Instant) -> usize {
        // Snapshot handles first: holding a DashMap guard across an await
        // point can deadlock with concurrent inserts.
        let handles: Vec<(Uuid, SessionHandle)> = self
            .sessions
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let mut closed = 0;
        for (connection_id, handle) in handles {
            let stale = handle.session.lock().await.is_stale_at(now);
            if stale {
                tracing::info!(connection_id = %connection_id, "Closing stale session");
                handle.cancel.cancel();
                closed += 1;
            }
        }
        closed
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
