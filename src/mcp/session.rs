//! Per-connection handshake state.
//!
//! A [`Session`] moves `Uninitialized → Initializing → Ready` and never
//! backwards. Transports that keep a connection open own one session each;
//! stateless transports look theirs up in a [`SessionStore`] by an opaque
//! key they derive themselves.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;

/// Handshake state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Waiting for `initialize`.
    Uninitialized,
    /// `initialize` answered, waiting for `initialized`.
    Initializing,
    /// Handshake complete; tools may be listed and called.
    Ready,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "UNINITIALIZED"),
            Self::Initializing => write!(f, "INITIALIZING"),
            Self::Ready => write!(f, "READY"),
        }
    }
}

#[derive(Debug)]
struct Handshake {
    state: SessionState,
    protocol_version: Option<String>,
    client_info: Option<Value>,
}

/// One client's protocol session.
#[derive(Debug)]
pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    last_seen: Mutex<Instant>,
    handshake: Mutex<Handshake>,
}

impl Session {
    /// Creates an uninitialised session.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
            last_seen: Mutex::new(Instant::now()),
            handshake: Mutex::new(Handshake {
                state: SessionState::Uninitialized,
                protocol_version: None,
                client_info: None,
            }),
        }
    }

    /// Session identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the session was last looked up.
    #[must_use]
    pub fn last_seen(&self) -> Instant {
        *self.last_seen.lock()
    }

    /// Marks the session as used now.
    pub fn touch(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    /// Current handshake state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.handshake.lock().state
    }

    /// Whether the handshake has completed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Protocol version the client asked for.
    #[must_use]
    pub fn protocol_version(&self) -> Option<String> {
        self.handshake.lock().protocol_version.clone()
    }

    /// Client information from `initialize`.
    #[must_use]
    pub fn client_info(&self) -> Option<Value> {
        self.handshake.lock().client_info.clone()
    }

    /// Records an `initialize` request and returns the previous state.
    ///
    /// From `Uninitialized` this moves to `Initializing`. Later calls replace
    /// the recorded client details but leave the state alone.
    pub fn begin_initialize(&self, protocol_version: String, client_info: Value) -> SessionState {
        let mut handshake = self.handshake.lock();
        let previous = handshake.state;
        handshake.protocol_version = Some(protocol_version);
        handshake.client_info = Some(client_info);
        if previous == SessionState::Uninitialized {
            handshake.state = SessionState::Initializing;
        }
        previous
    }

    /// Handles the `initialized` notification.
    ///
    /// Returns `false`, changing nothing, unless the session is `Initializing`.
    pub fn complete_initialize(&self) -> bool {
        let mut handshake = self.handshake.lock();
        if handshake.state == SessionState::Initializing {
            handshake.state = SessionState::Ready;
            true
        } else {
            false
        }
    }

    /// A serialisable view for diagnostics endpoints.
    #[must_use]
    pub fn summary(&self) -> SessionSummary {
        let handshake = self.handshake.lock();
        SessionSummary {
            id: self.id.clone(),
            state: handshake.state,
            initialized: handshake.state == SessionState::Ready,
            protocol_version: handshake.protocol_version.clone(),
            client_info: handshake.client_info.clone(),
            created_at: self.created_at,
        }
    }
}

/// Snapshot of a session's public attributes.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    /// Session identifier.
    pub id: String,
    /// Handshake state.
    pub state: SessionState,
    /// Whether the handshake has completed.
    pub initialized: bool,
    /// Protocol version the client asked for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<String>,
    /// Client information from `initialize`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_info: Option<Value>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Sessions keyed by a transport-supplied identifier.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the session for `key`, creating it on first contact.
    ///
    /// Either way the session counts as seen now.
    pub fn get_or_create(&self, key: &str) -> Arc<Session> {
        if let Some(session) = self.sessions.read().get(key) {
            session.touch();
            return Arc::clone(session);
        }

        let mut sessions = self.sessions.write();
        Arc::clone(sessions.entry(key.to_string()).or_insert_with(|| {
            tracing::debug!(session = %key, "Session created");
            Arc::new(Session::new(key))
        }))
    }

    /// Returns the session for `key` if it exists.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(key).cloned()
    }

    /// Inserts a session under its own id.
    pub fn insert(&self, session: Arc<Session>) {
        self.sessions.write().insert(session.id().to_string(), session);
    }

    /// Destroys the session for `key`.
    pub fn remove(&self, key: &str) -> Option<Arc<Session>> {
        let removed = self.sessions.write().remove(key);
        if removed.is_some() {
            tracing::debug!(session = %key, "Session removed");
        }
        removed
    }

    /// Destroys every session last seen before `cutoff`. Returns how many
    /// were removed.
    pub fn evict_unseen_since(&self, cutoff: Instant) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|key, session| {
            let keep = session.last_seen() >= cutoff;
            if !keep {
                tracing::debug!(session = %key, "Idle session evicted");
            }
            keep
        });
        before - sessions.len()
    }

    /// Destroys every session idle for at least `max_idle`.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        match Instant::now().checked_sub(max_idle) {
            Some(cutoff) => self.evict_unseen_since(cutoff),
            None => 0,
        }
    }

    /// Evicts idle sessions every `period` until the returned task is aborted
    /// or the runtime shuts down.
    pub fn spawn_sweeper(self: &Arc<Self>, max_idle: Duration, period: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let evicted = store.evict_idle(max_idle);
                if evicted > 0 {
                    tracing::info!(evicted, remaining = store.len(), "Swept idle sessions");
                }
            }
        })
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether there are no live sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Number of sessions that completed the handshake.
    #[must_use]
    pub fn ready_count(&self) -> usize {
        self.sessions.read().values().filter(|s| s.is_ready()).count()
    }

    /// Summaries of every live session.
    #[must_use]
    pub fn summaries(&self) -> Vec<SessionSummary> {
        self.sessions.read().values().map(|s| s.summary()).collect()
    }
}
