//! Aggregate statistics recalculation.
//!
//! The recalculator keeps a [`AggregateStats`] snapshot fresh by re-fetching
//! the entire student set and recomputing from scratch on every change
//! notification. Wholesale recomputation costs a full fetch per mutation but
//! can never drift from the source data; record volumes are small enough
//! that the trade is deliberate.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use insight_core::{AggregateStats, Filter, Student};

use crate::event::Table;
use crate::source::{DataSource, FetchOrder, SourceError};

struct RecalcState {
    stats: Option<AggregateStats>,
    loading: bool,
    error: Option<String>,
    epoch: u64,
    closed: bool,
}

/// Maintains an aggregate statistics snapshot over the full student set.
///
/// Owns its own fetch path, independent of any reconciler, and ignores every
/// view-level filter: statistics always describe the whole table.
#[derive(Clone)]
pub struct StatsRecalculator {
    inner: Arc<Mutex<RecalcState>>,
    source: Arc<dyn DataSource>,
}

impl StatsRecalculator {
    /// Create a recalculator with no snapshot yet.
    #[must_use]
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RecalcState {
                stats: None,
                loading: false,
                error: None,
                epoch: 0,
                closed: false,
            })),
            source,
        }
    }

    /// The current snapshot; `None` until the first successful refresh.
    ///
    /// Snapshots are replaced atomically, so a reader never observes a
    /// partially-updated set of counts.
    #[must_use]
    pub fn stats(&self) -> Option<AggregateStats> {
        self.lock().stats.clone()
    }

    /// Whether a refresh is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.lock().loading
    }

    /// Most recent refresh error, if any.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    /// Re-fetch the full student set and recompute the snapshot.
    ///
    /// On failure the last-good snapshot is preserved and the error
    /// recorded; the caller may retry manually or lean on the stream's
    /// reconnect affordance.
    ///
    /// # Errors
    ///
    /// Returns the fetch or decode error; the same message is recorded on
    /// the recalculator state.
    pub async fn refresh(&self) -> Result<(), SourceError> {
        let epoch = {
            let mut state = self.lock();
            if state.closed {
                return Ok(());
            }
            state.loading = true;
            state.epoch
        };

        let result = self
            .source
            .fetch(Table::Students, &Filter::all(), FetchOrder::CreatedDescending)
            .await
            .and_then(|rows| {
                rows.into_iter()
                    .map(|row| {
                        serde_json::from_value::<Student>(row)
                            .map_err(|err| SourceError::Decode(err.to_string()))
                    })
                    .collect::<Result<Vec<_>, _>>()
            });

        let mut state = self.lock();
        if state.closed || state.epoch != epoch {
            debug!("discarding stale stats refresh");
            return Ok(());
        }
        state.loading = false;
        match result {
            Ok(students) => {
                state.stats = Some(AggregateStats::compute(&students));
                state.error = None;
                debug!(total = students.len(), "statistics recomputed");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "stats refresh failed, keeping last snapshot");
                state.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Close the recalculator: in-flight refreshes are discarded. Idempotent.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.epoch += 1;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RecalcState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
