//! Boundary traits for the remote data service.
//!
//! The sync core never talks to a concrete backend; it consumes these two
//! seams. The query side (`DataSource`) backs the initial fetch and the
//! statistics refresh, and also documents the mutation surface whose
//! successful writes are exactly what produce change events. The
//! subscription side (`EventSource`) yields transport messages for one
//! table. Row-level access control is enforced by the remote service and
//! surfaces here only as generic errors.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use insight_core::Filter;

use crate::event::{EventMask, RawChange, Table};

/// Errors surfaced by the remote service.
#[derive(Debug, Error)]
pub enum SourceError {
    /// A read query failed (network, access denied, malformed filter).
    #[error("query failed: {0}")]
    Query(String),

    /// A mutation failed.
    #[error("mutation failed: {0}")]
    Mutation(String),

    /// The subscription request was rejected outright.
    #[error("subscription rejected: {0}")]
    Subscribe(String),

    /// Fetched rows did not deserialize into the record type.
    #[error("row decode failed: {0}")]
    Decode(String),
}

/// Server-side ordering applied to a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOrder {
    /// Oldest rows first.
    CreatedAscending,
    /// Newest rows first; what the reconciler uses.
    CreatedDescending,
}

/// Query and mutation interface of the remote service.
///
/// Rows travel as JSON values; decoding into record types happens in the
/// consumer so that one source instance can serve differently-typed views.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Fetch every row of `table` matching `filter`, ordered by creation
    /// time.
    async fn fetch(
        &self,
        table: Table,
        filter: &Filter,
        order: FetchOrder,
    ) -> Result<Vec<serde_json::Value>, SourceError>;

    /// Insert a row. Used by the CRUD layer, not by the sync core.
    async fn insert(&self, table: Table, row: serde_json::Value) -> Result<(), SourceError>;

    /// Update the row with `id`. Used by the CRUD layer, not by the sync
    /// core.
    async fn update(
        &self,
        table: Table,
        id: Uuid,
        row: serde_json::Value,
    ) -> Result<(), SourceError>;

    /// Delete the row with `id`. Used by the CRUD layer, not by the sync
    /// core.
    async fn delete(&self, table: Table, id: Uuid) -> Result<(), SourceError>;
}

/// Lifecycle transitions reported by the transport for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLifecycle {
    /// Handshake confirmed; change payloads follow.
    Subscribed,
    /// The channel failed server-side or the connection dropped.
    ChannelError,
    /// The server reported a timeout on the channel.
    TimedOut,
    /// The channel was closed in an orderly fashion.
    Closed,
}

/// One message from a subscription channel.
#[derive(Debug, Clone)]
pub enum TransportMessage {
    /// A lifecycle transition.
    Lifecycle(ChannelLifecycle),
    /// A raw change payload.
    Change(RawChange),
}

/// A live subscription channel handed out by [`EventSource::subscribe`].
///
/// The receiver yields messages in transport order; the channel closing
/// (sender dropped) is equivalent to a channel error.
#[derive(Debug)]
pub struct SubscriptionChannel {
    /// Transport messages, in order.
    pub messages: mpsc::Receiver<TransportMessage>,
}

/// Subscription interface of the remote service.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Open a change-notification channel for `table`.
    ///
    /// `filter_expr` is an opaque server-side filter expression; a malformed
    /// expression is not validated client-side and comes back as a channel
    /// error. The handshake is confirmed asynchronously by a
    /// [`ChannelLifecycle::Subscribed`] message on the returned channel.
    async fn subscribe(
        &self,
        table: Table,
        mask: EventMask,
        filter_expr: Option<String>,
    ) -> Result<SubscriptionChannel, SourceError>;
}
