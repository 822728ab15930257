//! Filter-aware reconciliation of an in-memory collection.
//!
//! A [`Reconciler`] owns one ordered, de-duplicated collection of records
//! for one table and keeps it consistent with (a) an initial bulk fetch and
//! (b) a live change stream, against the active [`Filter`]. The collection
//! is a display cache: recency-ordered, never authoritative.
//!
//! Reads go through cheap snapshots; `apply_event` is synchronous and
//! non-reentrant per instance, so two events can never interleave their
//! effects on one collection. A fetch completing after `set_filter` or
//! `close` is discarded via an epoch counter rather than applied to a view
//! it no longer describes.

use std::sync::{Arc, Mutex, PoisonError};

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use insight_core::{Filter, Record};

use crate::event::{ChangeEvent, Table};
use crate::notify::{NoopSink, Notification, NotificationKind, NotificationSink};
use crate::source::{DataSource, FetchOrder, SourceError};

struct ReconcilerState<R> {
    records: Vec<R>,
    filter: Filter,
    loading: bool,
    error: Option<String>,
    /// Bumped by `set_filter` and `close`; a fetch started under an older
    /// epoch discards its result.
    epoch: u64,
    closed: bool,
}

/// Reconciles one in-memory collection against a change stream.
///
/// Clonable handle; all clones share the same collection.
pub struct Reconciler<R: Record> {
    inner: Arc<Mutex<ReconcilerState<R>>>,
    source: Arc<dyn DataSource>,
    table: Table,
    sink: Arc<dyn NotificationSink>,
}

impl<R: Record> Clone for Reconciler<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            source: Arc::clone(&self.source),
            table: self.table,
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<R> Reconciler<R>
where
    R: Record + DeserializeOwned,
{
    /// Create a reconciler for `table` with the given view filter and no
    /// notification sink.
    #[must_use]
    pub fn new(source: Arc<dyn DataSource>, table: Table, filter: Filter) -> Self {
        Self::with_sink(source, table, filter, Arc::new(NoopSink))
    }

    /// Create a reconciler that reports applied changes to `sink`.
    #[must_use]
    pub fn with_sink(
        source: Arc<dyn DataSource>,
        table: Table,
        filter: Filter,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ReconcilerState {
                records: Vec::new(),
                filter,
                loading: false,
                error: None,
                epoch: 0,
                closed: false,
            })),
            source,
            table,
            sink,
        }
    }

    /// Snapshot of the reconciled collection, in view order.
    #[must_use]
    pub fn records(&self) -> Vec<R> {
        self.lock().records.clone()
    }

    /// Number of records currently in the view.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    /// Whether the view is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// The active filter.
    #[must_use]
    pub fn filter(&self) -> Filter {
        self.lock().filter.clone()
    }

    /// Whether a fetch is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.lock().loading
    }

    /// Most recent fetch or decode error, if any.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    /// Replace the whole collection from a fresh remote fetch.
    ///
    /// The active filter is applied server-side and the result arrives
    /// newest-first. On failure the previous collection is kept
    /// (stale-but-present beats empty) and the error is recorded. A result
    /// arriving after `set_filter` or `close` is discarded.
    ///
    /// # Errors
    ///
    /// Returns the fetch or decode error; the same message is also recorded
    /// on the reconciler state for the UI.
    pub async fn refresh(&self) -> Result<(), SourceError> {
        let (epoch, filter) = {
            let mut state = self.lock();
            if state.closed {
                return Ok(());
            }
            state.loading = true;
            (state.epoch, state.filter.clone())
        };

        let result = self
            .source
            .fetch(self.table, &filter, FetchOrder::CreatedDescending)
            .await
            .and_then(decode_rows::<R>);

        let mut state = self.lock();
        if state.closed || state.epoch != epoch {
            // The view this fetch was started for no longer exists.
            debug!(table = %self.table, "discarding stale fetch result");
            return Ok(());
        }
        state.loading = false;
        match result {
            Ok(records) => {
                debug!(table = %self.table, count = records.len(), "collection replaced from fetch");
                state.records = records;
                state.error = None;
                Ok(())
            }
            Err(err) => {
                warn!(table = %self.table, error = %err, "fetch failed, keeping stale collection");
                state.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Replace the active filter.
    ///
    /// Bumps the epoch so an in-flight fetch for the old filter is
    /// discarded. The in-memory collection is intentionally not
    /// re-filtered; the caller runs [`Reconciler::refresh`] to repopulate,
    /// avoiding stale-filter drift.
    pub fn set_filter(&self, filter: Filter) {
        let mut state = self.lock();
        state.filter = filter;
        state.epoch += 1;
    }

    /// Close the reconciler: in-flight fetches and subsequent events are
    /// ignored. Idempotent.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.epoch += 1;
    }

    /// Apply one change event against the active filter.
    ///
    /// Synchronous; never suspends. Events are idempotent: a duplicate
    /// insert, or an update/delete for an absent id, is a no-op.
    pub fn apply_event(&self, event: ChangeEvent<R>) {
        let notification = {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            apply_to_state(&mut state, event)
        };
        // Notify outside the lock; the sink is foreign code.
        if let Some(notification) = notification {
            self.sink.notify(notification);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ReconcilerState<R>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The reconciliation algorithm proper. Returns the notification to emit,
/// if the event changed the view.
fn apply_to_state<R: Record>(
    state: &mut ReconcilerState<R>,
    event: ChangeEvent<R>,
) -> Option<Notification> {
    match event {
        ChangeEvent::Inserted(record) => {
            if !state.filter.matches(&record) {
                return None;
            }
            if state.records.iter().any(|r| r.id() == record.id()) {
                // Already applied; treat the duplicate as a no-op upsert.
                return None;
            }
            let notification = Notification {
                kind: NotificationKind::Added,
                id: record.id(),
                display_name: record.display_name(),
            };
            state.records.insert(0, record);
            Some(notification)
        }
        ChangeEvent::Updated { new, .. } => {
            let id = new.id();
            if !state.filter.matches(&new) {
                // The record has left this view.
                let before = state.records.len();
                state.records.retain(|r| r.id() != id);
                if state.records.len() == before {
                    return None;
                }
                return Some(Notification {
                    kind: NotificationKind::Removed,
                    id,
                    display_name: new.display_name(),
                });
            }
            let notification = Notification {
                kind: NotificationKind::Updated,
                id,
                display_name: new.display_name(),
            };
            if let Some(slot) = state.records.iter_mut().find(|r| r.id() == id) {
                *slot = new;
            } else {
                // Implicit insert: the update brought the record into view.
                state.records.insert(0, new);
            }
            Some(notification)
        }
        ChangeEvent::Deleted { id } => {
            let before = state.records.len();
            state.records.retain(|r| r.id() != id);
            if state.records.len() == before {
                return None;
            }
            Some(Notification {
                kind: NotificationKind::Removed,
                id,
                display_name: String::new(),
            })
        }
    }
}

fn decode_rows<R: DeserializeOwned>(rows: Vec<serde_json::Value>) -> Result<Vec<R>, SourceError> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(|err| SourceError::Decode(err.to_string())))
        .collect()
}
