//! Live composition of the sync pieces.
//!
//! [`LiveCollection`] and [`LiveStats`] wire a reconciler or recalculator to
//! a change stream the way the dashboard pages consume them: one initial
//! fetch, then a driver task that applies every event as it arrives. The
//! presentation layer only ever sees the handles these expose.
//!
//! The subscription is opened without a server-side filter: the view filter
//! is applied server-side on the fetch and client-side per event, so a
//! filter change only needs a re-fetch, not a re-subscribe.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;

use insight_core::{Filter, Record};

use crate::event::{EventMask, Table};
use crate::notify::NotificationSink;
use crate::recalc::StatsRecalculator;
use crate::reconciler::Reconciler;
use crate::source::{DataSource, SourceError};
use crate::status::ConnectionStatus;
use crate::stream::{StreamClient, StreamController};

/// A reconciled collection kept live by a change stream.
pub struct LiveCollection<R: Record> {
    reconciler: Reconciler<R>,
    controller: StreamController,
    driver: JoinHandle<()>,
}

impl<R> LiveCollection<R>
where
    R: Record + DeserializeOwned,
{
    /// Start a live collection: fetch the current rows, then keep applying
    /// change events until closed.
    ///
    /// A failed initial fetch is recorded on the reconciler state rather
    /// than returned; the stream still comes up and the caller retries via
    /// [`Reconciler::refresh`].
    pub async fn start(
        client: &StreamClient,
        source: Arc<dyn DataSource>,
        table: Table,
        filter: Filter,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let reconciler = Reconciler::with_sink(source, table, filter, sink);
        let mut stream = client.open::<R>(table, EventMask::All, None);
        let controller = stream.controller();

        let _ = reconciler.refresh().await;

        let worker = reconciler.clone();
        let driver = tokio::spawn(async move {
            while let Some(event) = stream.recv().await {
                worker.apply_event(event);
            }
        });

        Self {
            reconciler,
            controller,
            driver,
        }
    }

    /// The underlying reconciler handle.
    #[must_use]
    pub fn reconciler(&self) -> &Reconciler<R> {
        &self.reconciler
    }

    /// Snapshot of the collection, in view order.
    #[must_use]
    pub fn records(&self) -> Vec<R> {
        self.reconciler.records()
    }

    /// Connection status of the underlying stream.
    #[must_use]
    pub fn connection(&self) -> ConnectionStatus {
        self.controller.status()
    }

    /// Replace the view filter and re-fetch.
    ///
    /// # Errors
    ///
    /// Returns the fetch error when the re-fetch fails; the previous
    /// collection stays visible either way.
    pub async fn set_filter(&self, filter: Filter) -> Result<(), SourceError> {
        self.reconciler.set_filter(filter);
        self.reconciler.refresh().await
    }

    /// Force a reconnect of the underlying stream (retry counter reset).
    pub fn reconnect(&self) {
        self.controller.reconnect();
    }

    /// Tear everything down: the stream, the driver, the reconciler.
    pub fn close(&self) {
        self.reconciler.close();
        self.controller.close();
    }
}

impl<R: Record> Drop for LiveCollection<R> {
    fn drop(&mut self) {
        self.controller.close();
        self.driver.abort();
    }
}

/// Aggregate statistics kept live by a change stream.
///
/// Subscribes to every event kind on the students table and runs one full
/// refresh per event, whatever the event contains.
pub struct LiveStats {
    recalc: StatsRecalculator,
    controller: StreamController,
    driver: JoinHandle<()>,
}

impl LiveStats {
    /// Start live statistics: one initial refresh, then one refresh per
    /// change event.
    pub async fn start(client: &StreamClient, source: Arc<dyn DataSource>) -> Self {
        let recalc = StatsRecalculator::new(source);
        let mut stream = client.open::<insight_core::Student>(Table::Students, EventMask::All, None);
        let controller = stream.controller();

        let _ = recalc.refresh().await;

        let worker = recalc.clone();
        let driver = tokio::spawn(async move {
            while let Some(_event) = stream.recv().await {
                // Event content is irrelevant; any change invalidates the
                // snapshot wholesale.
                let _ = worker.refresh().await;
            }
        });

        Self {
            recalc,
            controller,
            driver,
        }
    }

    /// The underlying recalculator handle.
    #[must_use]
    pub fn recalculator(&self) -> &StatsRecalculator {
        &self.recalc
    }

    /// The current snapshot; `None` until the first successful refresh.
    #[must_use]
    pub fn stats(&self) -> Option<insight_core::AggregateStats> {
        self.recalc.stats()
    }

    /// Connection status of the underlying stream.
    #[must_use]
    pub fn connection(&self) -> ConnectionStatus {
        self.controller.status()
    }

    /// Force a reconnect of the underlying stream.
    pub fn reconnect(&self) {
        self.controller.reconnect();
    }

    /// Tear everything down.
    pub fn close(&self) {
        self.recalc.close();
        self.controller.close();
    }
}

impl Drop for LiveStats {
    fn drop(&mut self) {
        self.controller.close();
        self.driver.abort();
    }
}
