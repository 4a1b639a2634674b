//! Batch sender with threshold-triggered flushing

use async_trait::async_trait;
use loadrelay_core::{BatchSettings, CoreResult, HostContext, RemoteListener, SampleEvent};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::sender::{absorb_transport_error, SampleSender};
use crate::threshold::FlushTrigger;

/// Buffers samples and ships them as one `process_batch` call whenever the
/// count or time threshold is reached.
///
/// The buffer lock is held across the flush so batches reach the listener
/// in the order their samples were accepted.
pub struct BatchSender {
    listener: Arc<dyn RemoteListener>,
    ctx: HostContext,
    state: Mutex<BatchState>,
}

struct BatchState {
    buffer: Vec<SampleEvent>,
    trigger: FlushTrigger,
}

impl BatchSender {
    pub fn new(listener: Arc<dyn RemoteListener>, settings: &BatchSettings, ctx: HostContext) -> Self {
        let trigger = FlushTrigger::from_settings(settings);
        tracing::info!(
            hostname = ctx.hostname(),
            num_threshold = ?trigger.count(),
            time_threshold_ms = ?trigger.period().map(|p| p.as_millis()),
            "Using batch sample sender"
        );

        Self {
            listener,
            ctx,
            state: Mutex::new(BatchState {
                buffer: Vec::new(),
                trigger,
            }),
        }
    }

    /// Number of samples waiting for the next flush.
    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.buffer.len()
    }

    /// Sends one batch. The buffer has already been cleared by the caller
    /// and is not restored if the call fails.
    async fn send(&self, batch: Vec<SampleEvent>) -> CoreResult<()> {
        let count = batch.len();
        tracing::debug!(samples = count, "Flushing sample batch");
        absorb_transport_error(self.listener.process_batch(batch).await, "process_batch")
    }
}

#[async_trait]
impl SampleSender for BatchSender {
    fn name(&self) -> &str {
        "Batch"
    }

    async fn sample_occurred(&self, event: SampleEvent) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        state.buffer.push(event);

        let now = Instant::now();
        let buffered = state.buffer.len();
        if !state.trigger.should_flush(buffered, now) {
            return Ok(());
        }

        let batch = std::mem::take(&mut state.buffer);
        state.trigger.flushed(now);
        self.send(batch).await
    }

    async fn test_ended(&self, host: Option<&str>) -> CoreResult<()> {
        {
            let mut state = self.state.lock().await;
            let remainder = std::mem::take(&mut state.buffer);
            if !remainder.is_empty() {
                self.send(remainder).await?;
            }
        }

        absorb_transport_error(self.listener.test_ended(host).await, "test_ended")?;
        tracing::info!(host = host.unwrap_or(self.ctx.hostname()), "Test ended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{InjectedFailure, RecordingListener};
    use loadrelay_core::{SampleResult, THRESHOLD_DISABLED};
    use std::time::Duration;

    fn event(label: &str) -> SampleEvent {
        SampleEvent::new(
            SampleResult::new(label),
            "tg",
            &HostContext::with_hostname("agent"),
        )
    }

    fn sender(listener: Arc<RecordingListener>, num: i64, time_ms: i64) -> BatchSender {
        let settings = BatchSettings {
            num_threshold: num,
            time_threshold_ms: time_ms,
        };
        BatchSender::new(listener, &settings, HostContext::with_hostname("agent"))
    }

    #[tokio::test]
    async fn test_count_threshold_flush() {
        let listener = Arc::new(RecordingListener::new());
        let sender = sender(listener.clone(), 3, THRESHOLD_DISABLED);

        for label in ["a", "b", "c", "d"] {
            sender.sample_occurred(event(label)).await.unwrap();
        }

        let batches = listener.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 3);
        assert_eq!(sender.pending_count().await, 1);

        sender.test_ended(None).await.unwrap();
        let batches = listener.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1][0].result().label, "d");
        assert_eq!(listener.ended_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_threshold_flush() {
        let listener = Arc::new(RecordingListener::new());
        let sender = sender(listener.clone(), THRESHOLD_DISABLED, 1_000);

        sender.sample_occurred(event("a")).await.unwrap();
        tokio::time::advance(Duration::from_millis(500)).await;
        sender.sample_occurred(event("b")).await.unwrap();
        assert!(listener.batches().is_empty());

        tokio::time::advance(Duration::from_millis(500)).await;
        sender.sample_occurred(event("c")).await.unwrap();
        let batches = listener.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 3);

        // Deadline re-armed at flush time.
        tokio::time::advance(Duration::from_millis(999)).await;
        sender.sample_occurred(event("d")).await.unwrap();
        assert_eq!(listener.batches().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_flush_clears_buffer() {
        let listener = Arc::new(RecordingListener::new());
        listener.fail_with(Some(InjectedFailure::Transport));
        let sender = sender(listener.clone(), 2, THRESHOLD_DISABLED);

        sender.sample_occurred(event("a")).await.unwrap();
        sender.sample_occurred(event("b")).await.unwrap();
        assert_eq!(sender.pending_count().await, 0);
        assert!(listener.batches().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_during_flush_is_fatal() {
        let listener = Arc::new(RecordingListener::new());
        listener.fail_with(Some(InjectedFailure::Unreachable));
        let sender = sender(listener.clone(), 1, THRESHOLD_DISABLED);

        let err = sender.sample_occurred(event("a")).await.unwrap_err();
        assert!(err.is_fatal());
    }
}
