//! Hold sender: keep everything in memory until the test ends.
//!
//! Memory grows with the number of samples. Meant for small runs where
//! nothing may be lost and nothing should travel during the test.

use async_trait::async_trait;
use loadrelay_core::{CoreResult, HostContext, RemoteListener, SampleEvent};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::sender::{absorb_transport_error, SampleSender};

pub struct HoldSender {
    listener: Arc<dyn RemoteListener>,
    ctx: HostContext,
    held: Mutex<Vec<SampleEvent>>,
}

impl HoldSender {
    pub fn new(listener: Arc<dyn RemoteListener>, ctx: HostContext) -> Self {
        tracing::info!(hostname = ctx.hostname(), "Using hold sample sender");
        Self {
            listener,
            ctx,
            held: Mutex::new(Vec::new()),
        }
    }

    /// Number of samples currently held.
    pub fn held_count(&self) -> usize {
        self.held.lock().len()
    }
}

#[async_trait]
impl SampleSender for HoldSender {
    fn name(&self) -> &str {
        "Hold"
    }

    async fn sample_occurred(&self, event: SampleEvent) -> CoreResult<()> {
        self.held.lock().push(event);
        Ok(())
    }

    async fn test_ended(&self, host: Option<&str>) -> CoreResult<()> {
        let held = std::mem::take(&mut *self.held.lock());
        let count = held.len();

        for event in held {
            absorb_transport_error(
                self.listener.sample_occurred(event).await,
                "sample_occurred",
            )?;
        }

        absorb_transport_error(self.listener.test_ended(host).await, "test_ended")?;
        tracing::info!(
            host = host.unwrap_or(self.ctx.hostname()),
            samples = count,
            "Test ended, held samples replayed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{ListenerCall, RecordingListener};
    use loadrelay_core::SampleResult;

    #[tokio::test]
    async fn test_nothing_sent_before_end() {
        let ctx = HostContext::with_hostname("agent");
        let listener = Arc::new(RecordingListener::new());
        let sender = HoldSender::new(listener.clone(), ctx.clone());

        for i in 0..5 {
            let event = SampleEvent::new(SampleResult::new(format!("s{i}")), "tg", &ctx);
            sender.sample_occurred(event).await.unwrap();
        }
        assert!(listener.calls().is_empty());
        assert_eq!(sender.held_count(), 5);

        sender.test_ended(Some("agent")).await.unwrap();

        let calls = listener.calls();
        assert_eq!(calls.len(), 6);
        assert!(matches!(calls[5], ListenerCall::TestEnded(Some(_))));
        let labels: Vec<String> = listener
            .delivered()
            .into_iter()
            .map(|e| e.into_result().label)
            .collect();
        assert_eq!(labels, vec!["s0", "s1", "s2", "s3", "s4"]);
        assert_eq!(sender.held_count(), 0);
    }

    #[tokio::test]
    async fn test_end_without_samples() {
        let listener = Arc::new(RecordingListener::new());
        let sender = HoldSender::new(listener.clone(), HostContext::with_hostname("agent"));

        sender.test_ended(None).await.unwrap();
        assert_eq!(listener.calls(), vec![ListenerCall::TestEnded(None)]);
    }
}
