//! Connection status tracking for live subscriptions.
//!
//! The driver task writes status transitions; any number of readers take
//! cheap snapshots. Reads never touch the network and never await.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle state of a subscription channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    /// No connection; the initial and post-close state.
    Disconnected,
    /// Subscription handshake in flight.
    Connecting,
    /// Handshake confirmed; events are flowing.
    Subscribed,
    /// A failure was observed and a retry is scheduled.
    Reconnecting,
    /// Retry budget exhausted; waiting for an explicit reconnect.
    Failed,
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Subscribed => "subscribed",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Caller-visible status of one subscription.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionStatus {
    /// Current state-machine state.
    pub state: ChannelState,

    /// Whether the underlying channel is connected.
    pub connected: bool,

    /// Whether the subscription handshake has been confirmed.
    pub subscribed: bool,

    /// Most recent error, kept until the next successful transition so the
    /// UI can render a reconnect affordance.
    pub last_error: Option<String>,

    /// When the last change event arrived.
    pub last_event_at: Option<DateTime<Utc>>,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            state: ChannelState::Disconnected,
            connected: false,
            subscribed: false,
            last_error: None,
            last_event_at: None,
        }
    }
}

/// Clonable handle to a shared [`ConnectionStatus`].
#[derive(Debug, Clone, Default)]
pub struct StatusHandle {
    inner: Arc<Mutex<ConnectionStatus>>,
}

impl StatusHandle {
    /// Create a handle in the disconnected state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the current status.
    #[must_use]
    pub fn snapshot(&self) -> ConnectionStatus {
        self.lock().clone()
    }

    pub(crate) fn set_connecting(&self) {
        let mut status = self.lock();
        status.state = ChannelState::Connecting;
        status.connected = false;
        status.subscribed = false;
    }

    pub(crate) fn set_subscribed(&self) {
        let mut status = self.lock();
        status.state = ChannelState::Subscribed;
        status.connected = true;
        status.subscribed = true;
        status.last_error = None;
    }

    pub(crate) fn set_reconnecting(&self, error: &str) {
        let mut status = self.lock();
        status.state = ChannelState::Reconnecting;
        status.connected = false;
        status.subscribed = false;
        status.last_error = Some(error.to_string());
    }

    pub(crate) fn set_failed(&self, error: &str) {
        let mut status = self.lock();
        status.state = ChannelState::Failed;
        status.connected = false;
        status.subscribed = false;
        status.last_error = Some(error.to_string());
    }

    pub(crate) fn set_disconnected(&self) {
        let mut status = self.lock();
        status.state = ChannelState::Disconnected;
        status.connected = false;
        status.subscribed = false;
    }

    /// Record a delivered event without touching the state machine.
    pub(crate) fn record_event(&self) {
        let mut status = self.lock();
        status.last_event_at = Some(Utc::now());
        status.last_error = None;
    }

    /// Record a per-event error (e.g. a payload that failed to decode)
    /// without tearing the subscription down.
    pub(crate) fn record_error(&self, error: &str) {
        self.lock().last_error = Some(error.to_string());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ConnectionStatus> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
