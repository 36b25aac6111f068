//! Session registry
//!
//! Owns the set of live negotiation sessions. Handles are unique, removal is
//! idempotent: teardown can be triggered by the explicit failure path and by
//! the engine's own disconnect notification, and must not double-fail.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info};

use crate::engine::NegotiationEngine;
use crate::error::{EchoError, Result};

/// Negotiation progress of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    RemoteSet,
    AnswerCreated,
    LocalSet,
    GatheringComplete,
    Connected,
    Failed,
    Closed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Failed | SessionState::Closed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Created => write!(f, "created"),
            SessionState::RemoteSet => write!(f, "remote_set"),
            SessionState::AnswerCreated => write!(f, "answer_created"),
            SessionState::LocalSet => write!(f, "local_set"),
            SessionState::GatheringComplete => write!(f, "gathering_complete"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::Failed => write!(f, "failed"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// One WebRTC negotiation attempt and the engine connection backing it.
pub struct Session {
    pub id: String,
    pub created_at: Instant,
    engine: Arc<dyn NegotiationEngine>,
    state_tx: watch::Sender<SessionState>,
    state_rx: watch::Receiver<SessionState>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Session {
    fn new(engine: Arc<dyn NegotiationEngine>) -> Self {
        let (state_tx, state_rx) = watch::channel(SessionState::Created);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Instant::now(),
            engine,
            state_tx,
            state_rx,
        }
    }

    pub fn engine(&self) -> &Arc<dyn NegotiationEngine> {
        &self.engine
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Advance the state machine. Terminal states are one-way: a transition
    /// out of Failed or Closed is ignored.
    pub fn advance(&self, next: SessionState) {
        self.state_tx.send_if_modified(|current| {
            if current.is_terminal() || *current == next {
                return false;
            }
            debug!(session = %self.id, from = %current, to = %next, "session state");
            *current = next;
            true
        });
    }

    /// Subscribe to state changes
    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }
}

/// Point-in-time view of a session, for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub state: SessionState,
    pub age_secs: u64,
}

/// Thread-safe owner of all live sessions.
pub struct ConnectionRegistry {
    max_sessions: usize,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl ConnectionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            max_sessions,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a fresh session wrapping `engine`. Fails when the cap is hit.
    pub async fn create(&self, engine: Arc<dyn NegotiationEngine>) -> Result<Arc<Session>> {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.max_sessions {
            return Err(EchoError::SessionLimit(sessions.len()));
        }

        let session = Arc::new(Session::new(engine));
        sessions.insert(session.id.clone(), Arc::clone(&session));
        info!(session = %session.id, "session created");
        Ok(session)
    }

    /// Remove a session and close its engine connection. Removing an unknown
    /// or already-removed id is a no-op.
    pub async fn remove(&self, id: &str) {
        let removed = self.sessions.write().await.remove(id);
        if let Some(session) = removed {
            info!(session = %session.id, state = %session.state(), "session removed");
            session.engine().close().await;
        }
    }

    /// Snapshot all live sessions, for diagnostics only.
    pub async fn list(&self) -> Vec<SessionSnapshot> {
        let sessions = self.sessions.read().await;
        sessions
            .values()
            .map(|s| SessionSnapshot {
                session_id: s.id.clone(),
                state: s.state(),
                age_secs: s.created_at.elapsed().as_secs(),
            })
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Close every live session (shutdown path).
    pub async fn close_all(&self) {
        let drained: Vec<_> = self
            .sessions
            .write()
            .await
            .drain()
            .map(|(_, session)| session)
            .collect();
        for session in drained {
            session.advance(SessionState::Closed);
            session.engine().close().await;
        }
    }
}
