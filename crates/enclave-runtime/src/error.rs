//! Runtime error types.

use enclave_core::{ConfigError, InterpError};

/// Errors that can occur while setting up or driving the runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// File I/O error
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Context management or execution failure
    #[error(transparent)]
    Interp(#[from] InterpError),

    /// Malformed `name=value` shared binding
    #[error("invalid shared binding '{0}': expected NAME=VALUE")]
    SharedArg(String),

    /// Logging could not be initialised
    #[error("logging setup failed: {0}")]
    Logging(String),
}
