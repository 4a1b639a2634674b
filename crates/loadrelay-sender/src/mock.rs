//! In-memory Remote Listener for testing
//!
//! Records every call in order, and can be told to fail or to slow down
//! batch delivery so backpressure and error paths can be exercised.

use async_trait::async_trait;
use loadrelay_core::{CoreError, CoreResult, RemoteListener, SampleEvent};
use parking_lot::Mutex;
use std::time::Duration;

/// One recorded listener call.
#[derive(Debug, Clone, PartialEq)]
pub enum ListenerCall {
    TestStarted(Option<String>),
    TestEnded(Option<String>),
    SampleOccurred(SampleEvent),
    SampleStarted(SampleEvent),
    SampleStopped(SampleEvent),
    ProcessBatch(Vec<SampleEvent>),
}

/// Failure injected into delivery calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    /// Report the controller as unreachable.
    Unreachable,
    /// Report a recoverable transport error.
    Transport,
}

/// Recording listener configuration
#[derive(Debug, Clone, Default)]
pub struct RecordingListenerConfig {
    /// Delay applied to every `process_batch` call.
    pub batch_latency: Duration,
}

/// Remote Listener that keeps every call in memory.
#[derive(Debug, Default)]
pub struct RecordingListener {
    config: RecordingListenerConfig,
    calls: Mutex<Vec<ListenerCall>>,
    failure: Mutex<Option<InjectedFailure>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_with_config(config: RecordingListenerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Makes subsequent delivery calls fail (`sample_occurred`, `process_batch`).
    pub fn fail_with(&self, failure: Option<InjectedFailure>) {
        *self.failure.lock() = failure;
    }

    /// All calls so far, in order.
    pub fn calls(&self) -> Vec<ListenerCall> {
        self.calls.lock().clone()
    }

    /// Every delivered event, flattening batches, in delivery order.
    pub fn delivered(&self) -> Vec<SampleEvent> {
        self.calls
            .lock()
            .iter()
            .flat_map(|call| match call {
                ListenerCall::SampleOccurred(event) => vec![event.clone()],
                ListenerCall::ProcessBatch(events) => events.clone(),
                _ => Vec::new(),
            })
            .collect()
    }

    /// Batches received through `process_batch`.
    pub fn batches(&self) -> Vec<Vec<SampleEvent>> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                ListenerCall::ProcessBatch(events) => Some(events.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of `test_ended` signals received.
    pub fn ended_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, ListenerCall::TestEnded(_)))
            .count()
    }

    fn check_failure(&self) -> CoreResult<()> {
        match *self.failure.lock() {
            None => Ok(()),
            Some(InjectedFailure::Unreachable) => {
                Err(CoreError::peer_unreachable("connection refused"))
            }
            Some(InjectedFailure::Transport) => {
                Err(CoreError::Transport("connection reset by peer".to_string()))
            }
        }
    }

    fn record(&self, call: ListenerCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl RemoteListener for RecordingListener {
    async fn test_started(&self, host: Option<&str>) -> CoreResult<()> {
        self.record(ListenerCall::TestStarted(host.map(str::to_string)));
        Ok(())
    }

    async fn test_ended(&self, host: Option<&str>) -> CoreResult<()> {
        self.record(ListenerCall::TestEnded(host.map(str::to_string)));
        Ok(())
    }

    async fn sample_occurred(&self, event: SampleEvent) -> CoreResult<()> {
        self.check_failure()?;
        self.record(ListenerCall::SampleOccurred(event));
        Ok(())
    }

    async fn sample_started(&self, event: SampleEvent) -> CoreResult<()> {
        self.record(ListenerCall::SampleStarted(event));
        Ok(())
    }

    async fn sample_stopped(&self, event: SampleEvent) -> CoreResult<()> {
        self.record(ListenerCall::SampleStopped(event));
        Ok(())
    }

    async fn process_batch(&self, events: Vec<SampleEvent>) -> CoreResult<()> {
        if !self.config.batch_latency.is_zero() {
            tokio::time::sleep(self.config.batch_latency).await;
        }
        self.check_failure()?;
        self.record(ListenerCall::ProcessBatch(events));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadrelay_core::{HostContext, SampleResult};

    fn event(label: &str) -> SampleEvent {
        SampleEvent::new(SampleResult::new(label), "tg", &HostContext::with_hostname("h"))
    }

    #[tokio::test]
    async fn test_records_in_order() {
        let listener = RecordingListener::new();
        listener.sample_occurred(event("a")).await.unwrap();
        listener
            .process_batch(vec![event("b"), event("c")])
            .await
            .unwrap();
        listener.test_ended(Some("host")).await.unwrap();

        let labels: Vec<String> = listener
            .delivered()
            .iter()
            .map(|e| e.result().label.clone())
            .collect();
        assert_eq!(labels, vec!["a", "b", "c"]);
        assert_eq!(listener.batches().len(), 1);
        assert_eq!(listener.ended_count(), 1);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let listener = RecordingListener::new();
        listener.fail_with(Some(InjectedFailure::Unreachable));
        let err = listener.sample_occurred(event("a")).await.unwrap_err();
        assert!(err.is_fatal());

        listener.fail_with(Some(InjectedFailure::Transport));
        let err = listener.process_batch(vec![event("b")]).await.unwrap_err();
        assert!(!err.is_fatal());

        listener.fail_with(None);
        assert!(listener.delivered().is_empty());
    }
}
