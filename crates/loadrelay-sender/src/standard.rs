//! Standard sender: every sample goes straight to the controller.

use async_trait::async_trait;
use loadrelay_core::{CoreResult, HostContext, RemoteListener, SampleEvent};
use std::sync::Arc;

use crate::sender::{absorb_transport_error, SampleSender};

/// Forwards each sample synchronously, without buffering.
pub struct StandardSender {
    listener: Arc<dyn RemoteListener>,
    ctx: HostContext,
}

impl StandardSender {
    pub fn new(listener: Arc<dyn RemoteListener>, ctx: HostContext) -> Self {
        tracing::info!(hostname = ctx.hostname(), "Using standard sample sender");
        Self { listener, ctx }
    }
}

#[async_trait]
impl SampleSender for StandardSender {
    fn name(&self) -> &str {
        "Standard"
    }

    async fn sample_occurred(&self, event: SampleEvent) -> CoreResult<()> {
        absorb_transport_error(
            self.listener.sample_occurred(event).await,
            "sample_occurred",
        )
    }

    async fn test_ended(&self, host: Option<&str>) -> CoreResult<()> {
        absorb_transport_error(self.listener.test_ended(host).await, "test_ended")?;
        tracing::info!(
            host = host.unwrap_or(self.ctx.hostname()),
            "Test ended"
        );
        Ok(())
    }
}
