//! In-memory implementation of the remote service boundary.
//!
//! Backs the integration tests and local development: rows live in process,
//! mutations broadcast the same transport messages a real backend would
//! push, and fault injection hooks simulate fetch failures and dropped
//! channels. One instance serves both the query and the subscription seam.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use insight_core::{Filter, FilterClause};
use insight_core::record::FieldValue;

use crate::event::{ChangeKind, EventMask, RawChange, Table};
use crate::source::{
    ChannelLifecycle, DataSource, EventSource, FetchOrder, SourceError, SubscriptionChannel,
    TransportMessage,
};

/// Per-subscriber transport channel capacity. Generous for tests; a real
/// backend sizes this against its socket buffers.
const CHANNEL_CAPACITY: usize = 32;

struct Subscriber {
    table: Table,
    mask: EventMask,
    tx: mpsc::Sender<TransportMessage>,
}

#[derive(Default)]
struct MemoryState {
    tables: HashMap<Table, Vec<serde_json::Value>>,
    subscribers: Vec<Subscriber>,
    fail_next_fetch: Option<String>,
    fetch_counts: HashMap<Table, usize>,
}

/// In-memory data and event source.
#[derive(Default)]
pub struct MemoryDataSource {
    inner: Mutex<MemoryState>,
}

impl MemoryDataSource {
    /// Create an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load rows into a table without emitting change events, as if they
    /// predated every subscription.
    pub fn seed(&self, table: Table, rows: Vec<serde_json::Value>) {
        self.lock().tables.entry(table).or_default().extend(rows);
    }

    /// Number of fetches served for `table` so far.
    #[must_use]
    pub fn fetch_count(&self, table: Table) -> usize {
        self.lock().fetch_counts.get(&table).copied().unwrap_or(0)
    }

    /// Make the next fetch fail with `message`, then recover.
    pub fn fail_next_fetch(&self, message: impl Into<String>) {
        self.lock().fail_next_fetch = Some(message.into());
    }

    /// Simulate a server-side channel drop: every subscriber of `table`
    /// receives a channel error and its channel ends.
    pub fn break_channels(&self, table: Table) {
        let dropped: Vec<Subscriber> = {
            let mut state = self.lock();
            let (dropped, kept) = state
                .subscribers
                .drain(..)
                .partition(|sub| sub.table == table);
            state.subscribers = kept;
            dropped
        };
        for sub in dropped {
            let _ = sub
                .tx
                .try_send(TransportMessage::Lifecycle(ChannelLifecycle::ChannelError));
            // Dropping the sender closes the channel behind the error.
        }
    }

    /// Number of live subscribers across all tables.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    async fn broadcast(&self, table: Table, kind: ChangeKind, raw: RawChange) {
        let targets: Vec<mpsc::Sender<TransportMessage>> = {
            let mut state = self.lock();
            state.subscribers.retain(|sub| !sub.tx.is_closed());
            state
                .subscribers
                .iter()
                .filter(|sub| sub.table == table && sub.mask.accepts(kind))
                .map(|sub| sub.tx.clone())
                .collect()
        };
        for tx in targets {
            // Await capacity rather than dropping; transport order per
            // subscriber is part of the contract.
            let _ = tx.send(TransportMessage::Change(raw.clone())).await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DataSource for MemoryDataSource {
    async fn fetch(
        &self,
        table: Table,
        filter: &Filter,
        order: FetchOrder,
    ) -> Result<Vec<serde_json::Value>, SourceError> {
        let mut rows = {
            let mut state = self.lock();
            *state.fetch_counts.entry(table).or_insert(0) += 1;
            if let Some(message) = state.fail_next_fetch.take() {
                return Err(SourceError::Query(message));
            }
            let rows = state.tables.get(&table).cloned().unwrap_or_default();
            rows
        };

        rows.retain(|row| filter.clauses().iter().all(|clause| clause_matches(row, clause)));
        rows.sort_by_key(|row| created_at(row));
        if order == FetchOrder::CreatedDescending {
            rows.reverse();
        }
        Ok(rows)
    }

    async fn insert(&self, table: Table, row: serde_json::Value) -> Result<(), SourceError> {
        if row_id(&row).is_none() {
            return Err(SourceError::Mutation("row is missing an id".to_string()));
        }
        self.lock().tables.entry(table).or_default().push(row.clone());
        self.broadcast(
            table,
            ChangeKind::Insert,
            RawChange {
                kind: ChangeKind::Insert,
                new: Some(row),
                old: None,
            },
        )
        .await;
        Ok(())
    }

    async fn update(
        &self,
        table: Table,
        id: Uuid,
        fields: serde_json::Value,
    ) -> Result<(), SourceError> {
        let (old, new) = {
            let mut state = self.lock();
            let rows = state.tables.entry(table).or_default();
            let Some(slot) = rows.iter_mut().find(|row| row_id(row) == Some(id)) else {
                return Err(SourceError::Mutation(format!("no row with id {id}")));
            };
            let old = slot.clone();
            merge_fields(slot, &fields);
            (old, slot.clone())
        };
        self.broadcast(
            table,
            ChangeKind::Update,
            RawChange {
                kind: ChangeKind::Update,
                new: Some(new),
                old: Some(old),
            },
        )
        .await;
        Ok(())
    }

    async fn delete(&self, table: Table, id: Uuid) -> Result<(), SourceError> {
        {
            let mut state = self.lock();
            let rows = state.tables.entry(table).or_default();
            let before = rows.len();
            rows.retain(|row| row_id(row) != Some(id));
            if rows.len() == before {
                return Err(SourceError::Mutation(format!("no row with id {id}")));
            }
        }
        self.broadcast(
            table,
            ChangeKind::Delete,
            RawChange {
                kind: ChangeKind::Delete,
                new: None,
                // A real backend strips deleted rows down to their identity.
                old: Some(serde_json::json!({ "id": id })),
            },
        )
        .await;
        Ok(())
    }
}

#[async_trait]
impl EventSource for MemoryDataSource {
    async fn subscribe(
        &self,
        table: Table,
        mask: EventMask,
        _filter_expr: Option<String>,
    ) -> Result<SubscriptionChannel, SourceError> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        // Handshake confirms immediately; the message sits in the channel
        // until the driver reads it.
        let _ = tx.try_send(TransportMessage::Lifecycle(ChannelLifecycle::Subscribed));
        self.lock().subscribers.push(Subscriber { table, mask, tx });
        Ok(SubscriptionChannel { messages: rx })
    }
}

fn row_id(row: &serde_json::Value) -> Option<Uuid> {
    row.get("id")
        .and_then(|value| serde_json::from_value(value.clone()).ok())
}

fn created_at(row: &serde_json::Value) -> DateTime<Utc> {
    row.get("created_at")
        .and_then(serde_json::Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map_or(DateTime::<Utc>::MIN_UTC, |dt| dt.with_timezone(&Utc))
}

fn merge_fields(row: &mut serde_json::Value, fields: &serde_json::Value) {
    if let (Some(target), Some(updates)) = (row.as_object_mut(), fields.as_object()) {
        for (key, value) in updates {
            target.insert(key.clone(), value.clone());
        }
    }
}

fn clause_matches(row: &serde_json::Value, clause: &FilterClause) -> bool {
    let value = row.get(&clause.field);
    match &clause.value {
        FieldValue::Text(expected) => value
            .and_then(serde_json::Value::as_str)
            .is_some_and(|actual| actual == expected),
        FieldValue::Int(expected) => value
            .and_then(serde_json::Value::as_i64)
            .is_some_and(|actual| actual == *expected),
        FieldValue::Float(expected) => value
            .and_then(serde_json::Value::as_f64)
            .is_some_and(|actual| (actual - expected).abs() < f64::EPSILON),
        FieldValue::Null => value.is_none_or(serde_json::Value::is_null),
    }
}
