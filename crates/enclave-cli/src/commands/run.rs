//! `enclave run`: Execute a script file in a context.

use anyhow::Context;
use enclave_core::{ContextId, RuntimeConfig};
use enclave_runtime::{parse_bindings, Interpreters};
use std::path::Path;
use tracing::debug;

/// Which context a run targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Main,
    Existing(ContextId),
    Fresh,
}

impl Target {
    pub fn from_flags(context: Option<i64>, new: bool) -> Self {
        match (context, new) {
            (_, true) => Target::Fresh,
            (Some(raw), false) => Target::Existing(ContextId::new(raw)),
            (None, false) => Target::Main,
        }
    }
}

pub fn execute(config: RuntimeConfig, target: Target, file: &Path, shares: &[String]) -> anyhow::Result<()> {
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    run_source(config, target, &source, shares)
}

/// Run `source` in a new runtime, returning once the script finishes
pub fn run_source(config: RuntimeConfig, target: Target, source: &str, shares: &[String]) -> anyhow::Result<()> {
    let shared = parse_bindings(shares)?;
    let interps = Interpreters::from_config(config);

    let id = match target {
        Target::Main => interps.get_main(),
        Target::Existing(id) => id,
        Target::Fresh => interps.create()?,
    };
    debug!(target: "enclave::cli", context = %id, shared = shared.len(), "running");

    let shared = (!shared.is_empty()).then_some(&shared);
    interps.run_string(id, source, shared)?;
    Ok(())
}
