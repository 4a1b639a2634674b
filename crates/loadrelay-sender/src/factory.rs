//! Sender factory: resolves a configured mode token to a sender
//!
//! Built-in modes are matched case-insensitively. Anything else is looked up
//! in a [`SenderRegistry`] of user-supplied constructors, which must be filled
//! before the first sender is created.

use loadrelay_core::{
    CoreError, CoreResult, HostContext, RemoteListener, SenderSettings,
};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::asynch::AsynchSender;
use crate::batch::BatchSender;
use crate::disk_store::DiskStoreSender;
use crate::hold::HoldSender;
use crate::sender::SampleSender;
use crate::standard::StandardSender;
use crate::statistical::StatisticalSender;
use crate::stripped::StrippedSender;

/// Built-in sender modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SenderMode {
    Standard,
    Hold,
    Batch,
    Statistical,
    Stripped,
    StrippedBatch,
    Asynch,
    StrippedAsynch,
    DiskStore,
    StrippedDiskStore,
}

impl SenderMode {
    pub const ALL: [SenderMode; 10] = [
        SenderMode::Standard,
        SenderMode::Hold,
        SenderMode::Batch,
        SenderMode::Statistical,
        SenderMode::Stripped,
        SenderMode::StrippedBatch,
        SenderMode::Asynch,
        SenderMode::StrippedAsynch,
        SenderMode::DiskStore,
        SenderMode::StrippedDiskStore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SenderMode::Standard => "Standard",
            SenderMode::Hold => "Hold",
            SenderMode::Batch => "Batch",
            SenderMode::Statistical => "Statistical",
            SenderMode::Stripped => "Stripped",
            SenderMode::StrippedBatch => "StrippedBatch",
            SenderMode::Asynch => "Asynch",
            SenderMode::StrippedAsynch => "StrippedAsynch",
            SenderMode::DiskStore => "DiskStore",
            SenderMode::StrippedDiskStore => "StrippedDiskStore",
        }
    }

    fn known() -> Vec<&'static str> {
        Self::ALL.iter().map(SenderMode::as_str).collect()
    }
}

impl fmt::Display for SenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SenderMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(token))
            .ok_or_else(|| CoreError::UnknownSenderMode {
                token: token.to_string(),
                known: Self::known(),
            })
    }
}

/// Constructor for a user-supplied sender.
pub type SenderConstructor = Arc<
    dyn Fn(Arc<dyn RemoteListener>, &SenderSettings, &HostContext) -> CoreResult<Box<dyn SampleSender>>
        + Send
        + Sync,
>;

/// User-supplied sender constructors, keyed by mode token.
#[derive(Default, Clone)]
pub struct SenderRegistry {
    constructors: HashMap<String, SenderConstructor>,
}

impl SenderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor under `name`.
    ///
    /// # Errors
    /// `CoreError::Configuration` when `name` is empty or shadows a built-in mode.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F) -> CoreResult<()>
    where
        F: Fn(Arc<dyn RemoteListener>, &SenderSettings, &HostContext) -> CoreResult<Box<dyn SampleSender>>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CoreError::Configuration("sender name must not be empty".to_string()));
        }
        if name.parse::<SenderMode>().is_ok() {
            return Err(CoreError::Configuration(format!(
                "`{name}` is a built-in sender mode"
            )));
        }

        let constructor: SenderConstructor = Arc::new(constructor);
        if self.constructors.insert(name.clone(), constructor).is_some() {
            tracing::warn!(name = %name, "Replacing registered sender constructor");
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&SenderConstructor> {
        self.constructors.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }
}

impl fmt::Debug for SenderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderRegistry")
            .field("names", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builds senders bound to a listener from validated settings.
#[derive(Debug, Clone)]
pub struct SenderFactory {
    settings: SenderSettings,
    ctx: HostContext,
    registry: SenderRegistry,
}

impl SenderFactory {
    pub fn new(settings: SenderSettings, ctx: HostContext) -> Self {
        Self {
            settings,
            ctx,
            registry: SenderRegistry::new(),
        }
    }

    #[must_use]
    pub fn with_registry(mut self, registry: SenderRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry_mut(&mut self) -> &mut SenderRegistry {
        &mut self.registry
    }

    /// Builds the sender named by the configured mode.
    ///
    /// The deprecated `hold_samples` flag overrides the mode.
    pub fn create(&self, listener: Arc<dyn RemoteListener>) -> CoreResult<Box<dyn SampleSender>> {
        if self.settings.hold_samples {
            tracing::warn!(
                configured_mode = %self.settings.mode,
                "hold_samples is deprecated, use mode = \"Hold\""
            );
            return self.build(SenderMode::Hold, listener);
        }
        self.create_mode(&self.settings.mode, listener)
    }

    /// Builds the sender for an explicit mode token.
    ///
    /// # Errors
    /// `CoreError::UnknownSenderMode` when the token is neither built in nor
    /// registered, `CoreError::Configuration` when a registered constructor
    /// fails, and construction errors of built-in senders.
    pub fn create_mode(
        &self,
        token: &str,
        listener: Arc<dyn RemoteListener>,
    ) -> CoreResult<Box<dyn SampleSender>> {
        match token.parse::<SenderMode>() {
            Ok(mode) => self.build(mode, listener),
            Err(unknown) => match self.registry.get(token.trim()) {
                Some(constructor) => {
                    tracing::info!(mode = token, "Using registered sample sender");
                    constructor(listener, &self.settings, &self.ctx).map_err(|e| {
                        tracing::error!(mode = token, error = %e, "Registered sample sender failed to construct");
                        CoreError::Configuration(format!(
                            "sender `{}` failed to construct: {e}; built-in modes: {}",
                            token.trim(),
                            SenderMode::known().join(", ")
                        ))
                    })
                }
                None => {
                    tracing::error!(mode = token, "Unknown sample sender mode");
                    Err(unknown)
                }
            },
        }
    }

    fn build(&self, mode: SenderMode, listener: Arc<dyn RemoteListener>) -> CoreResult<Box<dyn SampleSender>> {
        let settings = &self.settings;
        let ctx = self.ctx.clone();

        let sender: Box<dyn SampleSender> = match mode {
            SenderMode::Standard => Box::new(StandardSender::new(listener, ctx)),
            SenderMode::Hold => Box::new(HoldSender::new(listener, ctx)),
            SenderMode::Batch => Box::new(BatchSender::new(listener, &settings.batch, ctx)),
            SenderMode::Statistical => Box::new(StatisticalSender::new(
                listener,
                &settings.batch,
                &settings.statistical,
                ctx,
            )),
            SenderMode::Asynch => Box::new(AsynchSender::new(listener, &settings.asynch, ctx)?),
            SenderMode::DiskStore => {
                Box::new(DiskStoreSender::new(listener, &settings.disk_store, ctx)?)
            }
            SenderMode::Stripped => Box::new(StrippedSender::new(self.build(SenderMode::Standard, listener)?)),
            SenderMode::StrippedBatch => Box::new(StrippedSender::new(self.build(SenderMode::Batch, listener)?)),
            SenderMode::StrippedAsynch => Box::new(StrippedSender::new(self.build(SenderMode::Asynch, listener)?)),
            SenderMode::StrippedDiskStore => {
                Box::new(StrippedSender::new(self.build(SenderMode::DiskStore, listener)?))
            }
        };

        Ok(sender)
    }
}
