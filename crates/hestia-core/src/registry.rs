//! Client registry
//!
//! Tracks the dashboard sessions currently connected. Each [`ClientSession`]
//! owns a bounded queue of outbound frames which a per-connection writer
//! task drains into the socket; the registry only ever hands out cheap
//! clones of the session handle so that no lock is held while a frame is
//! being delivered.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::debug;
use uuid::Uuid;

/// A serialized text frame shared by every session receiving it
pub type Frame = Arc<str>;

/// Opaque identity of a session, used for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First eight characters, for compact log lines
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of offering a frame to one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Frame queued for the writer
    Queued,
    /// Queue full; frame dropped for this session. Carries the number of
    /// consecutive frames dropped so far.
    Lagged(u64),
    /// Session closed or its writer is gone
    Closed,
}

struct SessionInner {
    id: SessionId,
    peer: Option<SocketAddr>,
    tx: mpsc::Sender<Frame>,
    open: AtomicBool,
    closed_tx: watch::Sender<bool>,
    lagged: AtomicU64,
    opened_at: DateTime<Utc>,
}

/// Handle to one connected dashboard client
#[derive(Clone)]
pub struct ClientSession {
    inner: Arc<SessionInner>,
}

impl ClientSession {
    /// Create a session with an outbound queue of `queue_capacity` frames
    ///
    /// Returns the receiving end of the queue for the connection's writer.
    pub fn new(peer: Option<SocketAddr>, queue_capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let (closed_tx, _) = watch::channel(false);
        let session = Self {
            inner: Arc::new(SessionInner {
                id: SessionId::new(),
                peer,
                tx,
                open: AtomicBool::new(true),
                closed_tx,
                lagged: AtomicU64::new(0),
                opened_at: Utc::now(),
            }),
        };
        (session, rx)
    }

    /// Session id
    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    /// Remote address, when known
    pub fn peer(&self) -> Option<SocketAddr> {
        self.inner.peer
    }

    /// When the session was opened
    pub fn opened_at(&self) -> DateTime<Utc> {
        self.inner.opened_at
    }

    /// False once the session has been unregistered or closed
    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire) && !self.inner.tx.is_closed()
    }

    /// Consecutive frames dropped because the queue was full
    pub fn lagged_frames(&self) -> u64 {
        self.inner.lagged.load(Ordering::Relaxed)
    }

    /// Mark the session closed and wake anyone waiting in [`ClientSession::closed`]
    pub fn close(&self) {
        if self.inner.open.swap(false, Ordering::AcqRel) {
            self.inner.closed_tx.send_replace(true);
        }
    }

    /// Resolves once [`ClientSession::close`] has been called
    pub async fn closed(&self) {
        let mut rx = self.inner.closed_tx.subscribe();
        // The sender lives in `self`, so this only errors if it was dropped
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Try to queue a frame without waiting
    pub fn offer(&self, frame: &Frame) -> Offer {
        if !self.inner.open.load(Ordering::Acquire) {
            return Offer::Closed;
        }
        match self.inner.tx.try_send(Frame::clone(frame)) {
            Ok(()) => {
                self.inner.lagged.store(0, Ordering::Relaxed);
                Offer::Queued
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                Offer::Lagged(self.inner.lagged.fetch_add(1, Ordering::Relaxed) + 1)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Offer::Closed,
        }
    }

    /// Label used in log lines: short id plus peer address
    pub fn label(&self) -> String {
        match self.inner.peer {
            Some(peer) => format!("{}@{}", self.inner.id.short(), peer),
            None => self.inner.id.short(),
        }
    }
}

impl fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSession")
            .field("id", &self.inner.id)
            .field("peer", &self.inner.peer)
            .field("open", &self.is_open())
            .field("lagged", &self.lagged_frames())
            .finish()
    }
}

/// Set of connected sessions, safe to mutate while a broadcast is running
#[derive(Default)]
pub struct ClientRegistry {
    sessions: RwLock<HashMap<SessionId, ClientSession>>,
}

impl ClientRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session; returns the number of registered sessions
    pub fn register(&self, session: ClientSession) -> usize {
        let mut sessions = self.sessions.write();
        debug!("Registering session {}", session.label());
        sessions.insert(session.id(), session);
        sessions.len()
    }

    /// Remove a session and close it
    ///
    /// Returns `None` if it was already gone, which makes concurrent
    /// removals (writer error and eviction racing) harmless.
    pub fn unregister(&self, id: &SessionId) -> Option<ClientSession> {
        let removed = self.sessions.write().remove(id);
        if let Some(session) = &removed {
            session.close();
            debug!("Unregistered session {}", session.label());
        }
        removed
    }

    /// Remove and close every session; returns how many were open
    pub fn close_all(&self) -> usize {
        let drained: Vec<ClientSession> = self.sessions.write().drain().map(|(_, s)| s).collect();
        for session in &drained {
            session.close();
        }
        drained.len()
    }

    /// Copy of the current session handles
    pub fn snapshot(&self) -> Vec<ClientSession> {
        self.sessions.read().values().cloned().collect()
    }

    /// Check whether a session is registered
    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.read().contains_key(id)
    }

    /// Number of registered sessions
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// True if no session is registered
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
