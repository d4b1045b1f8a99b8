//! Logging setup
//!
//! Installs a `tracing-subscriber` fmt layer writing to stderr, so script
//! output on stdout stays clean. The filter comes from `ENCLAVE_LOG` when set
//! (standard `EnvFilter` directives, e.g. `enclave::runner=trace`), otherwise
//! from the configured default level.

use crate::error::RuntimeError;
use enclave_core::LogFormat;
use std::io;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

/// Environment variable holding filter directives
pub const LOG_ENV: &str = "ENCLAVE_LOG";

/// Filter from `ENCLAVE_LOG`, falling back to `default_level`
pub fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Install the global subscriber
///
/// Fails if a global subscriber is already set.
pub fn init(default_level: &str, format: LogFormat) -> Result<(), RuntimeError> {
    let layer = format_layer(format, io::stderr).with_filter(build_filter(default_level));
    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| RuntimeError::Logging(e.to_string()))
}

fn format_layer<F>(format: LogFormat, make_writer: F) -> Box<dyn Layer<Registry> + Send + Sync>
where
    F: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_target(true)
            .with_writer(make_writer)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .without_time()
            .with_writer(make_writer)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_writer(make_writer)
            .boxed(),
    }
}
