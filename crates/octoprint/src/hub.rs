//! Subscription hub for the three synchronized streams.
//!
//! - printer status and job status are "hot": every new subscriber first
//!   receives the latest record, then every later publish ([`ReplayChannel`]).
//! - printer events are plain fan-out: only events published after
//!   subscribing are delivered.
//!
//! All channels are backed by `tokio::sync::broadcast`, so any number of
//! subscribers each see every value. Publishing with no subscribers is a
//! no-op.

use std::sync::Mutex;

use futures::Stream;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use octosync_core::job::JobStatus;
use octosync_core::printer::PrinterStatus;
use octosync_core::printer_event::PrinterEvent;

/// Default buffer capacity of each broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// ReplayChannel
// ---------------------------------------------------------------------------

/// Broadcast channel that remembers its last value.
///
/// The stored value and the subscription are taken under one lock, so a
/// subscriber never misses nor duplicates a publish racing its subscription.
pub struct ReplayChannel<T: Clone> {
    latest: Mutex<T>,
    sender: broadcast::Sender<T>,
}

impl<T: Clone> ReplayChannel<T> {
    pub fn new(initial: T, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            latest: Mutex::new(initial),
            sender,
        }
    }

    pub fn publish(&self, value: T) {
        let mut latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        *latest = value.clone();
        // Ignore the SendError: it only means there are zero receivers.
        let _ = self.sender.send(value);
    }

    /// Most recently published value.
    pub fn latest(&self) -> T {
        self.latest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn subscribe(&self) -> ReplaySubscription<T> {
        let latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        ReplaySubscription {
            pending: Some(latest.clone()),
            receiver: self.sender.subscribe(),
        }
    }
}

/// Receiving half of a [`ReplayChannel`].
pub struct ReplaySubscription<T: Clone> {
    pending: Option<T>,
    receiver: broadcast::Receiver<T>,
}

impl<T: Clone> ReplaySubscription<T> {
    /// Next value: the replayed latest value first, then live publishes.
    ///
    /// A subscriber that falls more than the channel capacity behind gets
    /// `RecvError::Lagged` and continues from the oldest retained value.
    pub async fn recv(&mut self) -> Result<T, RecvError> {
        if let Some(value) = self.pending.take() {
            return Ok(value);
        }
        self.receiver.recv().await
    }

    /// Adapt into a stream that skips over lag and ends when the hub is
    /// dropped.
    pub fn into_stream(self) -> impl Stream<Item = T>
    where
        T: Send + 'static,
    {
        futures::stream::unfold(self, |mut subscription| async move {
            loop {
                match subscription.recv().await {
                    Ok(value) => return Some((value, subscription)),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Status subscriber lagged behind");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        })
    }
}

// ---------------------------------------------------------------------------
// SubscriptionHub
// ---------------------------------------------------------------------------

/// Multicast point for printer status, job status and printer events.
///
/// Shared as `Arc<SubscriptionHub>` between the session task (the only
/// publisher) and any number of consumers.
pub struct SubscriptionHub {
    printer_status: ReplayChannel<PrinterStatus>,
    job_status: ReplayChannel<JobStatus>,
    events: broadcast::Sender<PrinterEvent>,
}

impl SubscriptionHub {
    pub fn new(layer_progress_enabled: bool) -> Self {
        let (events, _) = broadcast::channel(DEFAULT_CAPACITY);
        Self {
            printer_status: ReplayChannel::new(
                PrinterStatus::initial(layer_progress_enabled),
                DEFAULT_CAPACITY,
            ),
            job_status: ReplayChannel::new(
                JobStatus::initial(layer_progress_enabled),
                DEFAULT_CAPACITY,
            ),
            events,
        }
    }

    pub fn publish_printer_status(&self, status: PrinterStatus) {
        self.printer_status.publish(status);
    }

    pub fn publish_job_status(&self, status: JobStatus) {
        self.job_status.publish(status);
    }

    pub fn publish_event(&self, event: PrinterEvent) {
        let _ = self.events.send(event);
    }

    pub fn printer_status(&self) -> PrinterStatus {
        self.printer_status.latest()
    }

    pub fn job_status(&self) -> JobStatus {
        self.job_status.latest()
    }

    /// Latest printer status, then every update.
    pub fn subscribe_printer_status(&self) -> ReplaySubscription<PrinterStatus> {
        self.printer_status.subscribe()
    }

    /// Latest job status, then every update.
    pub fn subscribe_job_status(&self) -> ReplaySubscription<JobStatus> {
        self.job_status.subscribe()
    }

    /// Events published from now on.
    pub fn subscribe_events(&self) -> broadcast::Receiver<PrinterEvent> {
        self.events.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
