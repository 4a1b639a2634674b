use thiserror::Error;

/// Canonical error type for sample delivery.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The controller cannot be reached. Every sender treats this as fatal
    /// and aborts the current test run on this agent.
    #[error("peer unreachable: {message}")]
    PeerUnreachable {
        /// Underlying transport failure.
        message: String,
    },

    /// A remote call failed for a reason other than an unreachable peer.
    /// The data carried by the call is considered lost.
    #[error("transport error: {0}")]
    Transport(String),

    /// The configured sender mode is neither built in nor registered.
    #[error("unknown sender mode `{token}`; recognized modes: {}", known.join(", "))]
    UnknownSenderMode {
        /// Offending configuration token.
        token: String,
        /// Built-in modes, in declaration order.
        known: Vec<&'static str>,
    },

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A resource the sender depends on (temp file, background worker) could
    /// not be acquired.
    #[error("resource error: {0}")]
    Resource(String),

    /// A bounded shutdown wait expired.
    #[error("{what} did not finish within {timeout_ms} ms")]
    ShutdownTimeout {
        /// What was being waited for.
        what: &'static str,
        /// Timeout that elapsed.
        timeout_ms: u64,
    },

    /// Operation violates the sender lifecycle.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Human-readable explanation of the invalid state.
        message: String,
    },

    /// Unexpected internal error occurred.
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable details for debugging purposes.
        message: String,
    },

    /// I/O error occurred during file operations.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error occurred.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error occurred.
    #[error("deserialization error: {0}")]
    DeserializationError(String),
}

impl CoreError {
    /// Creates a `PeerUnreachable` variant.
    #[must_use]
    pub fn peer_unreachable(message: impl Into<String>) -> Self {
        Self::PeerUnreachable {
            message: message.into(),
        }
    }

    /// Creates an `InvalidState` variant.
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates an `Internal` variant.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true when the error must abort the test run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::PeerUnreachable { .. })
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_eof() || err.is_syntax() || err.is_data() {
            Self::DeserializationError(err.to_string())
        } else {
            Self::SerializationError(err.to_string())
        }
    }
}

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Convenient result alias for delivery operations.
pub type CoreResult<T> = Result<T, CoreError>;
