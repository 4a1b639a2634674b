use async_trait::async_trait;
use loadrelay_core::{CoreResult, SampleEvent};

/// Policy governing how samples travel from sampling tasks to the controller.
///
/// One instance is shared by every sampling task of an agent and bound to a
/// single Remote Listener. `test_ended` is called exactly once, after all
/// producers have stopped.
#[async_trait]
pub trait SampleSender: Send + Sync {
    /// Mode token this sender was built for.
    fn name(&self) -> &str;

    /// Accepts one completed sample from any task.
    ///
    /// # Errors
    /// `CoreError::PeerUnreachable` when the controller is gone; the caller
    /// must abort the test run. Other delivery failures are logged, not returned.
    async fn sample_occurred(&self, event: SampleEvent) -> CoreResult<()>;

    /// Flushes everything still retained, then signals the end of the test
    /// to the listener and releases background resources.
    ///
    /// `None` ends the unhosted test, `Some(host)` the test run on that host.
    async fn test_ended(&self, host: Option<&str>) -> CoreResult<()>;
}

#[async_trait]
impl<S: SampleSender + ?Sized> SampleSender for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn sample_occurred(&self, event: SampleEvent) -> CoreResult<()> {
        (**self).sample_occurred(event).await
    }

    async fn test_ended(&self, host: Option<&str>) -> CoreResult<()> {
        (**self).test_ended(host).await
    }
}

/// Applies the transport error policy to the outcome of a remote call.
///
/// An unreachable peer is returned so the caller aborts; anything else is
/// logged and the data carried by the call is considered lost.
pub(crate) fn absorb_transport_error(result: CoreResult<()>, call: &'static str) -> CoreResult<()> {
    match result {
        Ok(()) => Ok(()),
        Err(err) if err.is_fatal() => {
            tracing::error!(call, error = %err, "Controller unreachable, aborting delivery");
            Err(err)
        }
        Err(err) => {
            tracing::error!(call, error = %err, "Remote call failed, its samples are lost");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadrelay_core::CoreError;

    #[test]
    fn test_absorb_keeps_fatal() {
        let err = absorb_transport_error(Err(CoreError::peer_unreachable("refused")), "test")
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_absorb_swallows_transport() {
        let result = absorb_transport_error(Err(CoreError::Transport("reset".into())), "test");
        assert!(result.is_ok());
    }
}
