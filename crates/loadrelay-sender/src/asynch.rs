//! Asynchronous sender: bounded queue drained by one background worker
//!
//! Producers hand events to a bounded channel and return as soon as there is
//! room. A single worker waits for one item, takes everything else that is
//! already queued, and ships the lot with one `process_batch` call. When the
//! queue is full the producer waits for a free slot; those waits are counted
//! so operators can size the queue.

use async_trait::async_trait;
use loadrelay_core::{AsynchSettings, CoreError, CoreResult, HostContext, RemoteListener, SampleEvent};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};

use crate::sender::{absorb_transport_error, SampleSender};

/// Element of the delivery queue.
#[derive(Debug)]
enum QueueItem {
    Data(SampleEvent),
    /// Last item the worker will ever read.
    EndOfStream,
}

/// Producer-side backpressure counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueWaitStats {
    /// Number of `sample_occurred` calls that found the queue full.
    pub wait_count: u64,
    /// Total time those calls spent waiting for a slot.
    pub wait_time: Duration,
}

/// Fatal error recorded by the worker, replayed to producers.
type FatalSlot = Arc<Mutex<Option<String>>>;

pub struct AsynchSender {
    listener: Arc<dyn RemoteListener>,
    ctx: HostContext,
    capacity: usize,
    shutdown_timeout: Duration,
    tx: mpsc::Sender<QueueItem>,
    worker: Mutex<Option<JoinHandle<()>>>,
    fatal: FatalSlot,
    wait_count: AtomicU64,
    wait_nanos: AtomicU64,
}

impl AsynchSender {
    /// Creates the queue and spawns the worker on the current runtime.
    ///
    /// # Errors
    /// `CoreError::Resource` when called outside a tokio runtime.
    pub fn new(
        listener: Arc<dyn RemoteListener>,
        settings: &AsynchSettings,
        ctx: HostContext,
    ) -> CoreResult<Self> {
        let capacity = if settings.client_configured {
            settings.client_queue_size
        } else {
            settings.server_queue_size
        }
        .max(1);

        let handle = Handle::try_current()
            .map_err(|e| CoreError::Resource(format!("cannot start asynch worker: {e}")))?;

        let (tx, rx) = mpsc::channel(capacity);
        let fatal = FatalSlot::default();
        let worker = handle.spawn(run_worker(rx, Arc::clone(&listener), Arc::clone(&fatal)));

        tracing::info!(
            hostname = ctx.hostname(),
            capacity,
            client_configured = settings.client_configured,
            "Using asynch sample sender"
        );

        Ok(Self {
            listener,
            ctx,
            capacity,
            shutdown_timeout: settings.shutdown_timeout(),
            tx,
            worker: Mutex::new(Some(worker)),
            fatal,
            wait_count: AtomicU64::new(0),
            wait_nanos: AtomicU64::new(0),
        })
    }

    /// Queue capacity resolved at construction.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn wait_stats(&self) -> QueueWaitStats {
        QueueWaitStats {
            wait_count: self.wait_count.load(Ordering::Relaxed),
            wait_time: Duration::from_nanos(self.wait_nanos.load(Ordering::Relaxed)),
        }
    }

    fn check_fatal(&self) -> CoreResult<()> {
        match self.fatal.lock().as_ref() {
            Some(message) => Err(CoreError::peer_unreachable(message.clone())),
            None => Ok(()),
        }
    }

    fn record_wait(&self, waited: Duration) {
        self.wait_count.fetch_add(1, Ordering::Relaxed);
        let nanos = u64::try_from(waited.as_nanos()).unwrap_or(u64::MAX);
        self.wait_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    /// Waits for the worker to exit, aborting it once `deadline` passes.
    async fn join_worker(&self, deadline: Instant) {
        let worker = self.worker.lock().take();
        let Some(mut worker) = worker else {
            return;
        };

        match timeout_at(deadline, &mut worker).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let err = CoreError::internal(format!("asynch worker terminated abnormally: {e}"));
                tracing::error!(error = %err, "Queued samples may be lost");
            }
            Err(_) => {
                worker.abort();
                let err = CoreError::ShutdownTimeout {
                    what: "asynch queue drain",
                    timeout_ms: u64::try_from(self.shutdown_timeout.as_millis())
                        .unwrap_or(u64::MAX),
                };
                tracing::error!(error = %err, "Abandoning undelivered samples");
            }
        }
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<QueueItem>,
    listener: Arc<dyn RemoteListener>,
    fatal: FatalSlot,
) {
    let mut batch = Vec::new();

    while let Some(first) = rx.recv().await {
        let mut end = matches!(first, QueueItem::EndOfStream);
        if let QueueItem::Data(event) = first {
            batch.push(event);
        }
        while !end {
            match rx.try_recv() {
                Ok(QueueItem::Data(event)) => batch.push(event),
                Ok(QueueItem::EndOfStream) => end = true,
                Err(_) => break,
            }
        }

        if !batch.is_empty() {
            let events = std::mem::take(&mut batch);
            let stopped = fatal.lock().is_some();
            if stopped {
                tracing::warn!(samples = events.len(), "Controller unreachable, batch lost");
            } else {
                deliver(listener.as_ref(), events, &fatal).await;
            }
        }

        if end {
            break;
        }
    }

    tracing::debug!("Asynch worker stopped");
}

async fn deliver(listener: &dyn RemoteListener, events: Vec<SampleEvent>, fatal: &FatalSlot) {
    let count = events.len();
    tracing::debug!(samples = count, "Flushing queued samples");
    match listener.process_batch(events).await {
        Ok(()) => {}
        Err(CoreError::PeerUnreachable { message }) => {
            tracing::error!(error = %message, samples = count, "Controller unreachable, stopping delivery");
            *fatal.lock() = Some(message);
        }
        Err(e) => {
            tracing::error!(error = %e, samples = count, "Batch delivery failed, its samples are lost");
        }
    }
}

#[async_trait]
impl SampleSender for AsynchSender {
    fn name(&self) -> &str {
        "Asynch"
    }

    async fn sample_occurred(&self, event: SampleEvent) -> CoreResult<()> {
        self.check_fatal()?;

        let item = match self.tx.try_send(QueueItem::Data(event)) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Closed(_)) => {
                return Err(CoreError::invalid_state("sample received after test end"));
            }
            Err(TrySendError::Full(item)) => item,
        };

        let started = Instant::now();
        let sent = self.tx.send(item).await;
        self.record_wait(started.elapsed());

        sent.map_err(|_| CoreError::invalid_state("sample received after test end"))
    }

    /// Drains the queue before signalling the listener, so the final batch
    /// always reaches it ahead of the end-of-test signal. The drain is bounded
    /// by the shutdown timeout; samples still queued after it are abandoned.
    async fn test_ended(&self, host: Option<&str>) -> CoreResult<()> {
        let deadline = Instant::now() + self.shutdown_timeout;

        match timeout_at(deadline, self.tx.send(QueueItem::EndOfStream)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => tracing::warn!("Asynch worker already stopped"),
            Err(_) => tracing::error!("Timed out queueing end of stream"),
        }
        self.join_worker(deadline).await;
        self.check_fatal()?;

        absorb_transport_error(self.listener.test_ended(host).await, "test_ended")?;

        let stats = self.wait_stats();
        tracing::info!(
            host = host.unwrap_or(self.ctx.hostname()),
            capacity = self.capacity,
            wait_count = stats.wait_count,
            wait_time_ms = u64::try_from(stats.wait_time.as_millis()).unwrap_or(u64::MAX),
            "Test ended, asynch queue drained"
        );
        Ok(())
    }
}
