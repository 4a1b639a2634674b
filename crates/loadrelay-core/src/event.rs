use serde::{Deserialize, Serialize};

use crate::host::HostContext;
use crate::sample::SampleResult;

/// Envelope correlating a [`SampleResult`] with where it was produced.
///
/// Built once per completed sample by the sampling thread and not mutated
/// afterwards; senders either forward it, fold it into an aggregate, or
/// spill it to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleEvent {
    result: SampleResult,
    thread_group: String,
    hostname: String,
}

impl SampleEvent {
    /// Creates an event stamped with the context's host name.
    #[must_use]
    pub fn new(result: SampleResult, thread_group: impl Into<String>, ctx: &HostContext) -> Self {
        Self {
            result,
            thread_group: thread_group.into(),
            hostname: ctx.hostname().to_string(),
        }
    }

    pub fn result(&self) -> &SampleResult {
        &self.result
    }

    pub fn thread_group(&self) -> &str {
        &self.thread_group
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Consumes the event, returning the wrapped result.
    pub fn into_result(self) -> SampleResult {
        self.result
    }

    /// Rebuilds the event around a transformed result, keeping its origin.
    #[must_use]
    pub fn map_result(self, f: impl FnOnce(SampleResult) -> SampleResult) -> Self {
        Self {
            result: f(self.result),
            thread_group: self.thread_group,
            hostname: self.hostname,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_carries_origin() {
        let ctx = HostContext::with_hostname("agent-7");
        let event = SampleEvent::new(SampleResult::new("login"), "Users", &ctx);

        assert_eq!(event.hostname(), "agent-7");
        assert_eq!(event.thread_group(), "Users");
        assert_eq!(event.result().label, "login");
    }

    #[test]
    fn test_event_json_line() {
        let ctx = HostContext::with_hostname("agent-7");
        let result = SampleResult::new("login")
            .with_success(true)
            .with_response_data(b"ok".to_vec())
            .with_timing(10, 30, 5);
        let event = SampleEvent::new(result, "Users", &ctx);

        let line = serde_json::to_string(&event).unwrap();
        assert!(!line.contains('\n'));
        let decoded: SampleEvent = serde_json::from_str(&line).unwrap();
        assert_eq!(decoded, event);
        assert_eq!(decoded.result().elapsed(), 15);
    }
}
