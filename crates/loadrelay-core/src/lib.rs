//! Core data model and boundary types for distributed sample delivery.

pub mod config;
pub mod error;
pub mod event;
pub mod host;
pub mod listener;
pub mod sample;
pub mod telemetry;

pub use config::{
    AsynchSettings, BatchSettings, DiskStoreSettings, SenderSettings, StatisticalSettings,
    DEFAULT_MODE, THRESHOLD_DISABLED,
};
pub use error::{CoreError, CoreResult};
pub use event::SampleEvent;
pub use host::HostContext;
pub use listener::RemoteListener;
pub use sample::SampleResult;
