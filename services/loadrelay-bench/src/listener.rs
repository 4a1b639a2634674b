//! Remote Listener that only counts what it receives

use async_trait::async_trait;
use loadrelay_core::{CoreResult, RemoteListener, SampleEvent};
use std::sync::atomic::{AtomicU64, Ordering};

/// Delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Remote calls carrying samples.
    pub calls: u64,
    /// Events received.
    pub events: u64,
    /// Samples those events stand for (aggregates count many).
    pub represented: u64,
    /// Response payload bytes that travelled.
    pub payload_bytes: u64,
}

#[derive(Debug, Default)]
pub struct CountingListener {
    calls: AtomicU64,
    events: AtomicU64,
    represented: AtomicU64,
    payload_bytes: AtomicU64,
    ended: AtomicU64,
}

impl CountingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> DeliveryStats {
        DeliveryStats {
            calls: self.calls.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
            represented: self.represented.load(Ordering::Relaxed),
            payload_bytes: self.payload_bytes.load(Ordering::Relaxed),
        }
    }

    pub fn ended(&self) -> u64 {
        self.ended.load(Ordering::Relaxed)
    }

    fn count(&self, event: &SampleEvent) {
        let result = event.result();
        self.events.fetch_add(1, Ordering::Relaxed);
        self.represented
            .fetch_add(u64::from(result.sample_count()), Ordering::Relaxed);
        self.payload_bytes
            .fetch_add(result.response_data.len() as u64, Ordering::Relaxed);
    }
}

#[async_trait]
impl RemoteListener for CountingListener {
    async fn test_started(&self, host: Option<&str>) -> CoreResult<()> {
        tracing::debug!(host = host.unwrap_or_default(), "Test started");
        Ok(())
    }

    async fn test_ended(&self, host: Option<&str>) -> CoreResult<()> {
        self.ended.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(host = host.unwrap_or_default(), "Test ended");
        Ok(())
    }

    async fn sample_occurred(&self, event: SampleEvent) -> CoreResult<()> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.count(&event);
        Ok(())
    }

    async fn sample_started(&self, _event: SampleEvent) -> CoreResult<()> {
        Ok(())
    }

    async fn sample_stopped(&self, _event: SampleEvent) -> CoreResult<()> {
        Ok(())
    }

    async fn process_batch(&self, events: Vec<SampleEvent>) -> CoreResult<()> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        for event in &events {
            self.count(event);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadrelay_core::{HostContext, SampleResult};

    #[tokio::test]
    async fn test_counts_batches_and_aggregates() {
        let listener = CountingListener::new();
        let ctx = HostContext::with_hostname("h");
        let single = SampleEvent::new(
            SampleResult::new("a").with_response_data(vec![0u8; 4]),
            "tg",
            &ctx,
        );
        let aggregate = SampleEvent::new(SampleResult::new("b").with_counts(10, 1), "tg", &ctx);

        listener.sample_occurred(single.clone()).await.unwrap();
        listener.process_batch(vec![single, aggregate]).await.unwrap();
        listener.test_ended(None).await.unwrap();

        let stats = listener.snapshot();
        assert_eq!(stats.calls, 2);
        assert_eq!(stats.events, 3);
        assert_eq!(stats.represented, 12);
        assert_eq!(stats.payload_bytes, 8);
        assert_eq!(listener.ended(), 1);
    }
}
