//! insight-sync - Real-time synchronization core for Academic Insight.
//!
//! Keeps in-memory collections and aggregate statistics consistent with a
//! remote change stream. Three pieces compose:
//!
//! - [`StreamClient`]: owns one live subscription per table, delivers typed
//!   [`ChangeEvent`]s over a bounded channel, and runs the bounded
//!   linear-backoff reconnection state machine.
//! - [`Reconciler`]: applies change events to an ordered, de-duplicated
//!   in-memory collection against the active filter, with epoch-guarded
//!   fetches so stale responses are discarded.
//! - [`StatsRecalculator`]: recomputes aggregate statistics wholesale on
//!   every change notification.
//!
//! The remote service is reached only through the [`DataSource`] and
//! [`EventSource`] traits; [`MemoryDataSource`] implements both for tests
//! and local development. [`LiveCollection`] and [`LiveStats`] wire the
//! pieces together the way the dashboard consumes them.

pub mod event;
pub mod live;
pub mod memory;
pub mod notify;
pub mod recalc;
pub mod reconciler;
pub mod retry;
pub mod source;
pub mod status;
pub mod stream;

pub use event::{ChangeEvent, ChangeKind, DecodeError, EventMask, RawChange, Table};
pub use live::{LiveCollection, LiveStats};
pub use memory::MemoryDataSource;
pub use notify::{NoopSink, Notification, NotificationKind, NotificationSink};
pub use recalc::StatsRecalculator;
pub use reconciler::Reconciler;
pub use retry::{RetryPolicy, RetryState};
pub use source::{
    ChannelLifecycle, DataSource, EventSource, FetchOrder, SourceError, SubscriptionChannel,
    TransportMessage,
};
pub use status::{ChannelState, ConnectionStatus, StatusHandle};
pub use stream::{StreamClient, StreamController, StreamHandle};
