//! Sender factory integration tests

mod common;

use common::*;
use loadrelay_core::{CoreError, RemoteListener, SenderSettings, THRESHOLD_DISABLED};
use loadrelay_sender::{SampleSender, SenderFactory, SenderMode, SenderRegistry, StandardSender};
use std::io::Write;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_stripped_batch_strips_and_flushes_on_count() {
    let mut settings = SenderSettings::default();
    settings.batch.num_threshold = 3;
    settings.batch.time_threshold_ms = THRESHOLD_DISABLED;

    let listener = Arc::new(RecordingListener::new());
    let sender = SenderFactory::new(settings, ctx())
        .create(listener.clone())
        .unwrap();
    assert_eq!(sender.name(), "StrippedBatch");

    sender.sample_occurred(ok_event("a")).await.unwrap();
    sender.sample_occurred(failed_event("b")).await.unwrap();
    sender.sample_occurred(ok_event("c")).await.unwrap();
    sender.sample_occurred(ok_event("d")).await.unwrap();

    let batches = listener.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 3);
    assert!(batches[0][0].result().response_data.is_empty());
    assert!(!batches[0][1].result().response_data.is_empty());
    assert!(batches[0][2].result().response_data.is_empty());

    sender.test_ended(Some(HOST)).await.unwrap();
    assert_eq!(delivered_labels(&listener), vec!["a", "b", "c", "d"]);
    assert!(listener
        .delivered()
        .iter()
        .filter(|e| e.result().success)
        .all(|e| e.result().response_data.is_empty()));
}

#[test]
fn test_unknown_mode_fails_before_any_sample() {
    let settings = SenderSettings {
        mode: "org.example.NoSuchSender".to_string(),
        ..SenderSettings::default()
    };
    let listener = Arc::new(RecordingListener::new());

    let err = SenderFactory::new(settings, ctx())
        .create(listener.clone())
        .err()
        .unwrap();

    assert!(matches!(err, CoreError::UnknownSenderMode { .. }));
    assert!(err.to_string().contains("StrippedBatch"));
    assert!(listener.calls().is_empty());
}

#[tokio::test]
async fn test_registered_sender_is_resolved_by_name() {
    let mut registry = SenderRegistry::new();
    registry
        .register("Verbose", |listener: Arc<dyn RemoteListener>, _settings: &SenderSettings, ctx| {
            Ok(Box::new(StandardSender::new(listener, ctx.clone())) as Box<dyn SampleSender>)
        })
        .unwrap();

    let settings = SenderSettings {
        mode: "Verbose".to_string(),
        ..SenderSettings::default()
    };
    let listener = Arc::new(RecordingListener::new());
    let sender = SenderFactory::new(settings, ctx())
        .with_registry(registry)
        .create(listener.clone())
        .unwrap();

    sender.sample_occurred(ok_event("a")).await.unwrap();
    assert_eq!(delivered_labels(&listener), vec!["a"]);
}

#[test]
fn test_failing_registered_constructor_is_a_configuration_error() {
    let mut registry = SenderRegistry::new();
    registry
        .register("Custom", |_listener: Arc<dyn RemoteListener>, _settings: &SenderSettings, _ctx| {
            Err(CoreError::Resource("no socket".to_string()))
        })
        .unwrap();

    let settings = SenderSettings {
        mode: "Custom".to_string(),
        ..SenderSettings::default()
    };
    let listener = Arc::new(RecordingListener::new());
    let err = SenderFactory::new(settings, ctx())
        .with_registry(registry)
        .create(listener.clone())
        .err()
        .unwrap();

    assert!(matches!(err, CoreError::Configuration(_)));
    let msg = err.to_string();
    assert!(msg.contains("`Custom`"));
    assert!(msg.contains("no socket"));
    assert!(msg.contains("StrippedDiskStore"));
    assert!(listener.calls().is_empty());
}

#[tokio::test]
async fn test_mode_from_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("loadrelay.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "mode = \"statistical\"").unwrap();
    writeln!(file, "[batch]").unwrap();
    writeln!(file, "num_threshold = 2").unwrap();
    writeln!(file, "time_threshold_ms = -1").unwrap();
    drop(file);

    let settings = SenderSettings::from_file(&path).unwrap();
    let listener = Arc::new(RecordingListener::new());
    let sender = SenderFactory::new(settings, ctx()).create(listener.clone()).unwrap();
    assert_eq!(sender.name(), SenderMode::Statistical.as_str());

    sender.sample_occurred(ok_event("x")).await.unwrap();
    sender.sample_occurred(ok_event("x")).await.unwrap();
    let batches = listener.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0][0].result().sample_count(), 2);
}
