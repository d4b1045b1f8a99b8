//! `enclave eval`: Evaluate inline code.

use super::run::{run_source, Target};
use enclave_core::RuntimeConfig;

pub fn execute(config: RuntimeConfig, target: Target, code: &str, shares: &[String]) -> anyhow::Result<()> {
    // Shells pass `\n` literally more often than real newlines
    let source = if code.contains('\n') {
        code.to_string()
    } else {
        code.replace("\\n", "\n")
    };
    run_source(config, target, &source, shares)
}
