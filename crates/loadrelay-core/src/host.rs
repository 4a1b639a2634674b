//! Originating host identity.
//!
//! The host name is resolved once when the agent starts and never changes
//! afterwards. It is carried by an explicit [`HostContext`] value that is
//! handed to whoever builds events or senders.

use std::fs;
use std::sync::Arc;

const HOSTNAME_FILES: [&str; 2] = ["/proc/sys/kernel/hostname", "/etc/hostname"];

/// Immutable per-process host information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostContext {
    hostname: Arc<str>,
}

impl HostContext {
    /// Resolves the local host name.
    ///
    /// Sources, first non-empty wins: `HOSTNAME`, `/proc/sys/kernel/hostname`,
    /// `/etc/hostname`. When none resolves, a warning is logged and the name
    /// stays empty; startup is never aborted for it.
    pub fn resolve() -> Self {
        let hostname = std::env::var("HOSTNAME")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .or_else(|| HOSTNAME_FILES.iter().find_map(|path| read_trimmed(path)));

        match hostname {
            Some(name) => {
                tracing::debug!(hostname = %name, "Resolved local host name");
                Self::with_hostname(name)
            }
            None => {
                tracing::warn!("Could not resolve local host name, leaving it empty");
                Self::with_hostname("")
            }
        }
    }

    /// Builds a context with a known host name.
    pub fn with_hostname(hostname: impl Into<String>) -> Self {
        Self {
            hostname: Arc::from(hostname.into()),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }
}

fn read_trimmed(path: &str) -> Option<String> {
    let raw = fs::read_to_string(path).ok()?;
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
