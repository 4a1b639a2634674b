//! Shared fixtures for sender integration tests

#![allow(dead_code)]

pub use loadrelay_sender::mock::{InjectedFailure, ListenerCall, RecordingListener};

use loadrelay_core::{HostContext, SampleEvent, SampleResult};

pub const HOST: &str = "agent-1";

pub fn ctx() -> HostContext {
    HostContext::with_hostname(HOST)
}

/// Successful sample carrying a small HTML payload.
pub fn ok_event(label: impl Into<String>) -> SampleEvent {
    let result = SampleResult::new(label)
        .with_success(true)
        .with_response_code("200")
        .with_response_data(b"<html>ok</html>".to_vec());
    SampleEvent::new(result, "Thread Group 1", &ctx())
}

/// Failed sample carrying an error body.
pub fn failed_event(label: impl Into<String>) -> SampleEvent {
    let result = SampleResult::new(label)
        .with_success(false)
        .with_response_code("500")
        .with_response_data(b"Internal Server Error".to_vec());
    SampleEvent::new(result, "Thread Group 1", &ctx())
}

/// Labels of everything the listener received, in delivery order.
pub fn delivered_labels(listener: &RecordingListener) -> Vec<String> {
    listener
        .delivered()
        .into_iter()
        .map(|event| event.into_result().label)
        .collect()
}
