//! Notification port for applied changes.
//!
//! When the reconciler applies an event to its collection it emits a
//! lightweight notification for the toast layer. Delivery is synchronous and
//! fire-and-forget; the sink must not block and gets no acknowledgment path.

use uuid::Uuid;

/// What happened to the record, from the point of view of the active view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// A record entered the view.
    Added,
    /// A record in the view changed.
    Updated,
    /// A record left the view or was deleted.
    Removed,
}

/// A single change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// What happened.
    pub kind: NotificationKind,

    /// Identifier of the affected record.
    pub id: Uuid,

    /// Human-readable name for display. Empty for deletions, where only the
    /// identity survives.
    pub display_name: String,
}

/// Receiver of change notifications.
pub trait NotificationSink: Send + Sync {
    /// Deliver one notification. Must not block.
    fn notify(&self, notification: Notification);
}

/// Sink that discards every notification; the default when the composing
/// layer does not care about toasts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl NotificationSink for NoopSink {
    fn notify(&self, _notification: Notification) {}
}

/// An unbounded channel sender works directly as a sink; a dropped receiver
/// silently discards, matching fire-and-forget semantics.
impl NotificationSink for tokio::sync::mpsc::UnboundedSender<Notification> {
    fn notify(&self, notification: Notification) {
        let _ = self.send(notification);
    }
}
