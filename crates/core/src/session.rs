//! Session Registry
//!
//! Holds every active call. Each entry owns its history, its activity clock,
//! its speaking flag and its interrupt flag, so removing an entry removes all
//! of them at once.
//!
//! Locking is two-level: an `RwLock` over the key set and a `Mutex` per
//! session around its mutable state. The key-set lock is always taken first
//! and never acquired while a session lock is held.

use crate::interrupt::InterruptFlag;
use crate::turn::Turn;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

pub type SessionId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Session '{0}' not found")]
    NotFound(SessionId),
    #[error("Session '{0}' is already responding to a turn")]
    Busy(SessionId),
}

/// Lifecycle state of a live session, as seen by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Speaking,
}

/// A point-in-time copy of a session.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub history: Vec<Turn>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: Instant,
    pub speaking: bool,
}

impl Session {
    pub fn status(&self) -> SessionStatus {
        if self.speaking {
            SessionStatus::Speaking
        } else {
            SessionStatus::Idle
        }
    }
}

struct SessionState {
    history: Vec<Turn>,
    last_activity: Instant,
    interrupt: InterruptFlag,
}

pub(crate) struct SessionEntry {
    id: SessionId,
    created_at: DateTime<Utc>,
    state: Mutex<SessionState>,
    speaking: AtomicBool,
}

/// Exclusive right to run one relay for a session.
///
/// Obtained from [`SessionStore::begin_turn`]; dropping it returns the
/// session to `Idle` on every exit path.
pub struct TurnGuard {
    entry: Arc<SessionEntry>,
    interrupt: InterruptFlag,
}

impl TurnGuard {
    pub fn session_id(&self) -> SessionId {
        self.entry.id
    }

    pub fn interrupt(&self) -> &InterruptFlag {
        &self.interrupt
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.entry.speaking.store(false, Ordering::Release);
        debug!(session_id = %self.entry.id, "Session returned to idle");
    }
}

#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Arc<SessionEntry>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new idle session and returns its id.
    pub async fn create(&self) -> SessionId {
        let mut sessions = self.sessions.write().await;
        let mut id = Uuid::new_v4();
        while sessions.contains_key(&id) {
            id = Uuid::new_v4();
        }
        sessions.insert(
            id,
            Arc::new(SessionEntry {
                id,
                created_at: Utc::now(),
                state: Mutex::new(SessionState {
                    history: Vec::new(),
                    last_activity: Instant::now(),
                    interrupt: InterruptFlag::default(),
                }),
                speaking: AtomicBool::new(false),
            }),
        );
        info!(session_id = %id, active = sessions.len(), "Call session started");
        id
    }

    async fn entry(&self, id: SessionId) -> Result<Arc<SessionEntry>, SessionError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(SessionError::NotFound(id))
    }

    pub async fn get(&self, id: SessionId) -> Result<Session, SessionError> {
        let entry = self.entry(id).await?;
        let state = entry.state.lock().await;
        Ok(Session {
            id,
            history: state.history.clone(),
            created_at: entry.created_at,
            last_activity_at: state.last_activity,
            speaking: entry.speaking.load(Ordering::Acquire),
        })
    }

    pub async fn touch(&self, id: SessionId) -> Result<(), SessionError> {
        let entry = self.entry(id).await?;
        entry.state.lock().await.last_activity = Instant::now();
        Ok(())
    }

    /// Ends a session, dropping its history and interrupt flag together.
    pub async fn remove(&self, id: SessionId) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(&id).ok_or(SessionError::NotFound(id))?;
        info!(session_id = %id, active = sessions.len(), "Call session ended");
        Ok(())
    }

    /// Marks the session's in-flight relay for cancellation.
    pub async fn interrupt(&self, id: SessionId) -> Result<(), SessionError> {
        let entry = self.entry(id).await?;
        entry.state.lock().await.interrupt.set();
        info!(session_id = %id, "Interrupt requested");
        Ok(())
    }

    /// Moves the session from `Idle` to `Speaking`, rejecting a second
    /// concurrent turn with [`SessionError::Busy`].
    ///
    /// Each accepted turn gets a fresh interrupt flag, so only interrupts
    /// issued after acceptance can stop it.
    pub async fn begin_turn(&self, id: SessionId) -> Result<TurnGuard, SessionError> {
        let entry = self.entry(id).await?;
        let guard = {
            let mut state = entry.state.lock().await;
            entry
                .speaking
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .map_err(|_| SessionError::Busy(id))?;
            state.interrupt = InterruptFlag::default();
            state.last_activity = Instant::now();
            TurnGuard {
                entry: entry.clone(),
                interrupt: state.interrupt.clone(),
            }
        };
        Ok(guard)
    }

    /// Builds the outgoing message list for a turn.
    ///
    /// With `retain` the turn is appended to history first and the request is
    /// the history alone; otherwise the turn rides along once at the end and
    /// is forgotten.
    pub async fn prepare_request(
        &self,
        id: SessionId,
        turn: Turn,
        retain: bool,
    ) -> Result<Vec<Turn>, SessionError> {
        let entry = self.entry(id).await?;
        let mut state = entry.state.lock().await;
        state.last_activity = Instant::now();
        if retain {
            state.history.push(turn);
            Ok(state.history.clone())
        } else {
            let mut messages = Vec::with_capacity(state.history.len() + 1);
            messages.extend(state.history.iter().cloned());
            messages.push(turn);
            Ok(messages)
        }
    }

    /// Appends a completed turn. Appending to a session that has already been
    /// ended or evicted is a silent no-op.
    pub async fn append(&self, id: SessionId, turn: Turn) {
        let Ok(entry) = self.entry(id).await else {
            debug!(session_id = %id, role = %turn.role, "Session gone, dropping turn");
            return;
        };
        let mut state = entry.state.lock().await;
        state.history.push(turn);
        state.last_activity = Instant::now();
    }

    pub async fn history(&self, id: SessionId) -> Result<Vec<Turn>, SessionError> {
        let entry = self.entry(id).await?;
        let history = entry.state.lock().await.history.clone();
        Ok(history)
    }

    /// Removes every session idle for longer than `timeout`.
    ///
    /// The idle check and the removal happen under the same session lock, so
    /// a session touched concurrently is never evicted on a stale reading.
    pub async fn evict_idle(&self, timeout: Duration) -> Vec<SessionId> {
        let mut sessions = self.sessions.write().await;
        let candidates: Vec<Arc<SessionEntry>> = sessions.values().cloned().collect();
        let mut evicted = Vec::new();
        for entry in candidates {
            let state = entry.state.lock().await;
            if state.last_activity.elapsed() > timeout {
                sessions.remove(&entry.id);
                evicted.push(entry.id);
            }
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
