use async_trait::async_trait;

use crate::error::CoreResult;
use crate::event::SampleEvent;

/// Controller-side receiver of sample data.
///
/// Implementations wrap whatever remote transport connects the agent to the
/// controller. Every call may fail: an unreachable peer must be reported as
/// [`CoreError::PeerUnreachable`](crate::CoreError::PeerUnreachable), any
/// other transport failure as [`CoreError::Transport`](crate::CoreError::Transport).
/// Fan-out to several consumers is the listener's own concern.
#[async_trait]
pub trait RemoteListener: Send + Sync {
    /// Signals the start of a test, optionally for a named host.
    async fn test_started(&self, host: Option<&str>) -> CoreResult<()>;

    /// Signals that the test has ended, optionally for a named host.
    async fn test_ended(&self, host: Option<&str>) -> CoreResult<()>;

    /// Delivers one completed sample.
    async fn sample_occurred(&self, event: SampleEvent) -> CoreResult<()>;

    /// Notifies that a sample has started.
    async fn sample_started(&self, event: SampleEvent) -> CoreResult<()>;

    /// Notifies that a sample has stopped.
    async fn sample_stopped(&self, event: SampleEvent) -> CoreResult<()>;

    /// Delivers an ordered batch of completed samples in one call.
    async fn process_batch(&self, events: Vec<SampleEvent>) -> CoreResult<()>;
}
