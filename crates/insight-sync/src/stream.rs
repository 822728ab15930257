//! Change-stream client.
//!
//! [`StreamClient::open`] spawns a driver task that owns the transport
//! subscription for one table and delivers decoded [`ChangeEvent`]s to the
//! consumer over a bounded channel. The driver runs the reconnection state
//! machine:
//!
//! ```text
//! Disconnected -> Connecting -> Subscribed -> (error | timeout)
//!                     ^                             |
//!                     +------- Reconnecting <-------+   (bounded linear backoff)
//! ```
//!
//! Failure n waits `base_delay * n` before the next attempt; after
//! `max_retries` failures the subscription parks in `Failed` until an
//! explicit reconnect. A delivered event resets the retry counter. `close()`
//! exits the machine from any state and cancels pending timers.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::time::{self, Duration, Instant};
use tracing::{debug, error, info, warn};

use insight_core::{Record, SyncConfig};

use crate::event::{ChangeEvent, EventMask, Table};
use crate::retry::{RetryPolicy, RetryState};
use crate::source::{ChannelLifecycle, EventSource, TransportMessage};
use crate::status::{ConnectionStatus, StatusHandle};

/// Factory for live subscriptions against one event source.
///
/// Explicitly constructed and passed by reference; there is no ambient
/// singleton. Dropping the client does not affect streams it already opened.
#[derive(Clone)]
pub struct StreamClient {
    source: Arc<dyn EventSource>,
    config: SyncConfig,
}

impl StreamClient {
    /// Create a client over `source` with the given tunables.
    #[must_use]
    pub fn new(source: Arc<dyn EventSource>, config: SyncConfig) -> Self {
        Self { source, config }
    }

    /// Open a live subscription to `table`.
    ///
    /// The returned handle starts connecting immediately. `filter_expr` is
    /// passed through to the remote service unvalidated; a malformed
    /// expression surfaces as a connection error through the status object.
    #[must_use]
    pub fn open<R>(
        &self,
        table: Table,
        mask: EventMask,
        filter_expr: Option<String>,
    ) -> StreamHandle<R>
    where
        R: Record + DeserializeOwned,
    {
        let status = StatusHandle::new();
        let (events_tx, events_rx) = mpsc::channel(self.config.event_buffer);
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            source: Arc::clone(&self.source),
            table,
            mask,
            filter_expr,
            config: self.config.clone(),
            status: status.clone(),
            events: events_tx,
            control: control_rx,
            retry: RetryState::new(RetryPolicy::from_config(&self.config)),
        };
        tokio::spawn(driver.run());

        StreamHandle {
            events: events_rx,
            controller: StreamController {
                control: control_tx,
                status,
            },
        }
    }
}

/// Control messages from the handle to the driver.
#[derive(Debug, Clone, Copy)]
enum Control {
    /// Tear down and retry immediately with a fresh retry budget.
    Reconnect,
    /// Tear down for good.
    Close,
}

/// Clonable controller for a stream: status reads, reconnect, close.
#[derive(Debug, Clone)]
pub struct StreamController {
    control: mpsc::UnboundedSender<Control>,
    status: StatusHandle,
}

impl StreamController {
    /// Snapshot the connection status. Never blocks on I/O.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status.snapshot()
    }

    /// Force immediate teardown and a fresh connection attempt, resetting
    /// the retry counter. This is the only way out of the `Failed` state.
    pub fn reconnect(&self) {
        let _ = self.control.send(Control::Reconnect);
    }

    /// Tear the subscription down. Idempotent; closing an already-closed
    /// stream is a no-op.
    pub fn close(&self) {
        let _ = self.control.send(Control::Close);
    }
}

/// Consumer end of a live subscription.
///
/// Events arrive in transport order over a bounded channel; a slow consumer
/// backpressures the driver instead of losing events. Dropping the handle
/// closes the subscription.
#[derive(Debug)]
pub struct StreamHandle<R> {
    events: mpsc::Receiver<ChangeEvent<R>>,
    controller: StreamController,
}

impl<R> StreamHandle<R> {
    /// Receive the next change event. `None` means the subscription has
    /// terminated (closed, or the driver exited).
    pub async fn recv(&mut self) -> Option<ChangeEvent<R>> {
        self.events.recv().await
    }

    /// A clonable controller for this stream.
    #[must_use]
    pub fn controller(&self) -> StreamController {
        self.controller.clone()
    }

    /// Snapshot the connection status. Never blocks on I/O.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.controller.status()
    }

    /// See [`StreamController::reconnect`].
    pub fn reconnect(&self) {
        self.controller.reconnect();
    }

    /// See [`StreamController::close`].
    pub fn close(&self) {
        self.controller.close();
    }
}

impl<R> Drop for StreamHandle<R> {
    fn drop(&mut self) {
        self.controller.close();
    }
}

/// How one connect-and-pump session ended.
enum SessionExit {
    /// Close requested, or the handle side is gone.
    Shutdown,
    /// The event receiver was dropped; nobody is listening.
    ConsumerGone,
    /// Explicit reconnect request.
    ReconnectRequested,
    /// Channel failure or timeout; candidate for automatic retry.
    Failure(String),
}

/// What ended a backoff wait or a `Failed` park.
enum ControlSignal {
    Reconnect,
    Shutdown,
}

struct Driver<R> {
    source: Arc<dyn EventSource>,
    table: Table,
    mask: EventMask,
    filter_expr: Option<String>,
    config: SyncConfig,
    status: StatusHandle,
    events: mpsc::Sender<ChangeEvent<R>>,
    control: mpsc::UnboundedReceiver<Control>,
    retry: RetryState,
}

impl<R> Driver<R>
where
    R: Record + DeserializeOwned,
{
    async fn run(mut self) {
        loop {
            match self.connect_and_pump().await {
                SessionExit::Shutdown => {
                    debug!(table = %self.table, "change stream closed");
                    self.status.set_disconnected();
                    return;
                }
                SessionExit::ConsumerGone => {
                    debug!(table = %self.table, "event receiver dropped, closing stream");
                    self.status.set_disconnected();
                    return;
                }
                SessionExit::ReconnectRequested => {
                    self.retry.reset();
                }
                SessionExit::Failure(reason) => match self.retry.next_delay() {
                    Some(delay) => {
                        warn!(
                            table = %self.table,
                            attempt = self.retry.attempt(),
                            delay_ms = delay.as_millis() as u64,
                            %reason,
                            "change stream failed, scheduling reconnect"
                        );
                        self.status.set_reconnecting(&reason);
                        match self.wait_backoff(delay).await {
                            None => {}
                            Some(ControlSignal::Reconnect) => self.retry.reset(),
                            Some(ControlSignal::Shutdown) => {
                                self.status.set_disconnected();
                                return;
                            }
                        }
                    }
                    None => {
                        let message = format!(
                            "max reconnection attempts ({}) reached: {reason}",
                            self.retry.policy().max_retries
                        );
                        error!(table = %self.table, "{message}");
                        self.status.set_failed(&message);
                        match self.park_until_control().await {
                            ControlSignal::Reconnect => self.retry.reset(),
                            ControlSignal::Shutdown => {
                                self.status.set_disconnected();
                                return;
                            }
                        }
                    }
                },
            }
        }
    }

    /// One connection attempt: subscribe, await the handshake, then pump
    /// messages until something ends the session.
    async fn connect_and_pump(&mut self) -> SessionExit {
        self.status.set_connecting();
        debug!(table = %self.table, filter = ?self.filter_expr, "subscribing to change stream");

        let mut channel = match self
            .source
            .subscribe(self.table, self.mask, self.filter_expr.clone())
            .await
        {
            Ok(channel) => channel,
            Err(err) => return SessionExit::Failure(err.to_string()),
        };

        // Field-level borrows so the select arms and their handlers don't
        // contend over `self`.
        let table = self.table;
        let mask = self.mask;
        let control = &mut self.control;
        let events = &self.events;
        let retry = &mut self.retry;
        let status = &self.status;

        let mut subscribed = false;
        let handshake_deadline = Instant::now() + self.config.handshake_timeout;

        loop {
            tokio::select! {
                () = time::sleep_until(handshake_deadline), if !subscribed => {
                    return SessionExit::Failure("subscription handshake timed out".to_string());
                }
                signal = control.recv() => match signal {
                    Some(Control::Close) | None => return SessionExit::Shutdown,
                    Some(Control::Reconnect) => return SessionExit::ReconnectRequested,
                },
                message = channel.messages.recv() => match message {
                    None => return SessionExit::Failure("transport dropped the channel".to_string()),
                    Some(TransportMessage::Lifecycle(lifecycle)) => match lifecycle {
                        ChannelLifecycle::Subscribed => {
                            subscribed = true;
                            status.set_subscribed();
                            info!(%table, "subscribed to change stream");
                        }
                        ChannelLifecycle::ChannelError => {
                            return SessionExit::Failure("channel error".to_string());
                        }
                        ChannelLifecycle::TimedOut => {
                            return SessionExit::Failure("channel timed out".to_string());
                        }
                        ChannelLifecycle::Closed => return SessionExit::Shutdown,
                    },
                    Some(TransportMessage::Change(raw)) => {
                        if !mask.accepts(raw.kind) {
                            continue;
                        }
                        // Live traffic is proof of health.
                        retry.reset();
                        status.record_event();
                        match raw.decode::<R>() {
                            Ok(event) => {
                                if events.send(event).await.is_err() {
                                    return SessionExit::ConsumerGone;
                                }
                            }
                            Err(err) => {
                                // A single bad payload must not kill the
                                // subscription; record it and keep pumping.
                                warn!(%table, error = %err, "undecodable change payload");
                                status.record_error(&err.to_string());
                            }
                        }
                    }
                },
            }
        }
    }

    /// Sleep out a backoff delay, or cut it short on a control message.
    async fn wait_backoff(&mut self, delay: Duration) -> Option<ControlSignal> {
        let sleep = time::sleep(delay);
        tokio::pin!(sleep);
        tokio::select! {
            () = &mut sleep => None,
            control = self.control.recv() => match control {
                Some(Control::Reconnect) => Some(ControlSignal::Reconnect),
                Some(Control::Close) | None => Some(ControlSignal::Shutdown),
            },
        }
    }

    /// Park in the `Failed` state until told to reconnect or close.
    async fn park_until_control(&mut self) -> ControlSignal {
        match self.control.recv().await {
            Some(Control::Reconnect) => ControlSignal::Reconnect,
            Some(Control::Close) | None => ControlSignal::Shutdown,
        }
    }
}
