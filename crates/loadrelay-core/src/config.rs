//! Configuration management for sample senders
//!
//! Settings are layered, lowest priority first:
//! - Hardcoded defaults
//! - `/etc/loadrelay/loadrelay.{toml,yaml,json}`
//! - `./config/loadrelay.{toml,yaml,json}`
//! - File named by the `LOADRELAY_CONFIG` env var
//! - Environment variables, e.g. `LOADRELAY__BATCH__NUM_THRESHOLD=500`

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Mode used when nothing else is configured.
pub const DEFAULT_MODE: &str = "StrippedBatch";

/// Threshold value meaning "ignore this trigger".
pub const THRESHOLD_DISABLED: i64 = -1;

/// Root configuration for building a sender.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SenderSettings {
    /// Sender mode token resolved by the factory.
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Deprecated: `true` behaves like `mode = "Hold"`.
    #[serde(default)]
    pub hold_samples: bool,

    #[serde(default)]
    pub batch: BatchSettings,

    #[serde(default)]
    pub asynch: AsynchSettings,

    #[serde(default)]
    pub statistical: StatisticalSettings,

    #[serde(default)]
    pub disk_store: DiskStoreSettings,
}

fn default_mode() -> String {
    DEFAULT_MODE.to_string()
}

impl Default for SenderSettings {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            hold_samples: false,
            batch: BatchSettings::default(),
            asynch: AsynchSettings::default(),
            statistical: StatisticalSettings::default(),
            disk_store: DiskStoreSettings::default(),
        }
    }
}

impl SenderSettings {
    /// Load settings from every configured source, then validate them.
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Self::set_defaults(Config::builder())?;

        builder = builder
            .add_source(File::with_name("/etc/loadrelay/loadrelay").required(false))
            .add_source(File::with_name("./config/loadrelay").required(false));

        if let Ok(config_path) = std::env::var("LOADRELAY_CONFIG") {
            builder = builder.add_source(File::with_name(&config_path).required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix("LOADRELAY")
                .separator("__")
                .try_parsing(true),
        );

        let settings: SenderSettings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a single file on top of the defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings: SenderSettings = Self::set_defaults(Config::builder())?
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn set_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("mode", DEFAULT_MODE)?
            .set_default("hold_samples", false)?
            // Batch and Statistical thresholds
            .set_default("batch.num_threshold", 100)?
            .set_default("batch.time_threshold_ms", 60_000)?
            // Asynchronous queue
            .set_default("asynch.client_configured", true)?
            .set_default("asynch.client_queue_size", 100)?
            .set_default("asynch.server_queue_size", 100)?
            .set_default("asynch.shutdown_timeout_ms", 30_000)?
            // Statistical keying
            .set_default("statistical.key_on_thread_name", false)?
            // Disk store
            .set_default("disk_store.close_timeout_ms", 3_000)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mode.trim().is_empty() {
            return Err(ConfigError::Message("mode must not be empty".to_string()));
        }

        validate_threshold("batch.num_threshold", self.batch.num_threshold)?;
        validate_threshold("batch.time_threshold_ms", self.batch.time_threshold_ms)?;

        if self.asynch.client_queue_size == 0 {
            return Err(ConfigError::Message(
                "asynch.client_queue_size must be > 0".to_string(),
            ));
        }
        if self.asynch.server_queue_size == 0 {
            return Err(ConfigError::Message(
                "asynch.server_queue_size must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn validate_threshold(name: &str, value: i64) -> Result<(), ConfigError> {
    if value == THRESHOLD_DISABLED || value > 0 {
        Ok(())
    } else {
        Err(ConfigError::Message(format!(
            "{name} must be > 0 or {THRESHOLD_DISABLED} to disable, got {value}"
        )))
    }
}

/// Flush thresholds shared by the Batch and Statistical senders.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchSettings {
    /// Flush when this many samples are buffered; -1 disables.
    pub num_threshold: i64,

    /// Flush when this many milliseconds have passed; -1 disables.
    pub time_threshold_ms: i64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            num_threshold: 100,
            time_threshold_ms: 60_000,
        }
    }
}

impl BatchSettings {
    /// Count trigger, `None` when disabled.
    pub fn count_threshold(&self) -> Option<usize> {
        usize::try_from(self.num_threshold).ok().filter(|n| *n > 0)
    }

    /// Time trigger, `None` when disabled.
    pub fn time_threshold(&self) -> Option<Duration> {
        u64::try_from(self.time_threshold_ms)
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

/// Asynchronous sender queue configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AsynchSettings {
    /// When true the controller-side capacity wins, otherwise the agent's own.
    pub client_configured: bool,

    /// Queue capacity configured on the controller (client) side.
    pub client_queue_size: usize,

    /// Queue capacity configured on the agent (server) side.
    pub server_queue_size: usize,

    /// Upper bound on the end-of-test drain wait.
    pub shutdown_timeout_ms: u64,
}

impl Default for AsynchSettings {
    fn default() -> Self {
        Self {
            client_configured: true,
            client_queue_size: 100,
            server_queue_size: 100,
            shutdown_timeout_ms: 30_000,
        }
    }
}

impl AsynchSettings {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Statistical sender keying
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StatisticalSettings {
    /// Key aggregates on thread name instead of thread group.
    pub key_on_thread_name: bool,
}

/// Disk store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiskStoreSettings {
    /// Directory for the spill file; the system temp dir when unset.
    #[serde(default)]
    pub spill_dir: Option<PathBuf>,

    /// Upper bound on the wait for the writer to close the spill file.
    pub close_timeout_ms: u64,
}

impl Default for DiskStoreSettings {
    fn default() -> Self {
        Self {
            spill_dir: None,
            close_timeout_ms: 3_000,
        }
    }
}

impl DiskStoreSettings {
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}
