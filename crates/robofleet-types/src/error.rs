use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type spanning command validation, cycle evaluation, transports and
/// shutdown.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FleetError {
    /// A command or configuration value was rejected at construction.
    #[error("Configuration Error: {0}")]
    Configuration(String),

    /// The post-stop halt broadcast could not be confirmed.  The loop unit has
    /// still exited when this is returned.
    #[error("Shutdown Failure: {0}")]
    ShutdownFailure(String),

    /// One cycle's strategy or controller evaluation failed.  Never fatal to
    /// the loop.
    #[error("Cycle Failure in {stage}: {details}")]
    CycleFailure { stage: String, details: String },

    #[error("Transport Error on {channel}: {details}")]
    Transport { channel: String, details: String },

    /// Wiring transports or creating the world model failed during start.
    #[error("Initialization Error: {0}")]
    Initialization(String),
}

impl FleetError {
    pub(crate) fn non_finite(what: &str) -> Self {
        FleetError::Configuration(format!("{what} must be a finite number"))
    }

    /// Shorthand for a [`FleetError::Transport`] on `channel`.
    pub fn transport(channel: &str, details: impl Into<String>) -> Self {
        FleetError::Transport {
            channel: channel.to_string(),
            details: details.into(),
        }
    }
}
