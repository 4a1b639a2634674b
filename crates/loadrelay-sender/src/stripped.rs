//! Payload-stripping decorator

use async_trait::async_trait;
use loadrelay_core::{CoreResult, SampleEvent};

use crate::sender::SampleSender;

/// Wraps any sender and drops the response payload of successful samples
/// before they reach it. Failed samples keep their payload.
pub struct StrippedSender<S> {
    inner: S,
    name: String,
}

impl<S: SampleSender> StrippedSender<S> {
    pub fn new(inner: S) -> Self {
        let name = match inner.name() {
            "Standard" => "Stripped".to_string(),
            other => format!("Stripped{other}"),
        };
        Self { inner, name }
    }
}

#[async_trait]
impl<S: SampleSender> SampleSender for StrippedSender<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn sample_occurred(&self, event: SampleEvent) -> CoreResult<()> {
        let event = event.map_result(|mut result| {
            if result.success {
                result.strip_successful();
            }
            result
        });
        self.inner.sample_occurred(event).await
    }

    async fn test_ended(&self, host: Option<&str>) -> CoreResult<()> {
        self.inner.test_ended(host).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingListener;
    use crate::standard::StandardSender;
    use loadrelay_core::{HostContext, SampleResult};
    use std::sync::Arc;

    fn ctx() -> HostContext {
        HostContext::with_hostname("agent")
    }

    fn stripped(listener: Arc<RecordingListener>) -> StrippedSender<StandardSender> {
        StrippedSender::new(StandardSender::new(listener, ctx()))
    }

    #[tokio::test]
    async fn test_strips_successful_payload_only() {
        let listener = Arc::new(RecordingListener::new());
        let sender = stripped(listener.clone());
        assert_eq!(sender.name(), "Stripped");

        let ok = SampleResult::new("ok")
            .with_success(true)
            .with_response_data(b"<html>body</html>".to_vec());
        let failed = SampleResult::new("failed")
            .with_success(false)
            .with_response_data(b"500 Internal Server Error".to_vec());

        sender.sample_occurred(SampleEvent::new(ok, "tg", &ctx())).await.unwrap();
        sender.sample_occurred(SampleEvent::new(failed, "tg", &ctx())).await.unwrap();

        let delivered = listener.delivered();
        assert!(delivered[0].result().response_data.is_empty());
        assert_eq!(delivered[1].result().response_data, b"500 Internal Server Error");
    }

    #[tokio::test]
    async fn test_failed_sub_results_keep_payload() {
        let listener = Arc::new(RecordingListener::new());
        let sender = stripped(listener.clone());

        let mut parent = SampleResult::new("page")
            .with_success(true)
            .with_response_data(b"page".to_vec());
        parent.add_sub_result(
            SampleResult::new("css")
                .with_success(true)
                .with_response_data(b"css".to_vec()),
        );
        parent.add_sub_result(
            SampleResult::new("img")
                .with_success(false)
                .with_response_data(b"404".to_vec()),
        );

        sender.sample_occurred(SampleEvent::new(parent, "tg", &ctx())).await.unwrap();

        let delivered = listener.delivered();
        let result = delivered[0].result();
        assert!(result.response_data.is_empty());
        assert!(result.sub_results()[0].response_data.is_empty());
        assert_eq!(result.sub_results()[1].response_data, b"404");
    }

    #[tokio::test]
    async fn test_end_passes_through() {
        let listener = Arc::new(RecordingListener::new());
        let sender = stripped(listener.clone());
        sender.test_ended(Some("agent")).await.unwrap();
        assert_eq!(listener.ended_count(), 1);
    }
}
