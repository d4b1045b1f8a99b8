//! `enclave info`: Display the effective configuration and runtime surface.

use crate::output::StyledOutput;
use enclave_core::RuntimeConfig;
use enclave_runtime::logging::LOG_ENV;
use enclave_runtime::Interpreters;
use serde::Serialize;
use termcolor::ColorChoice;

#[derive(Serialize)]
struct Report<'a> {
    version: &'static str,
    config: &'a RuntimeConfig,
    shareable_types: Vec<&'static str>,
    modules: &'a [String],
}

pub fn execute(config: RuntimeConfig, json: bool, color: ColorChoice) -> anyhow::Result<()> {
    let interps = Interpreters::from_config(config);
    let shareable_types = interps
        .runner()
        .shareables()
        .kinds()
        .into_iter()
        .map(|kind| kind.name())
        .collect();
    let report = Report {
        version: env!("CARGO_PKG_VERSION"),
        config: interps.config(),
        shareable_types,
        modules: interps.module_names(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let mut out = StyledOutput::new(color);
    out.bold(&format!("Enclave v{}", report.version));
    out.newline();
    out.newline();

    out.info("Shareable:    ");
    out.plain(&report.shareable_types.join(", "));
    out.newline();
    out.info("Modules:      ");
    out.plain(&report.modules.join(", "));
    out.newline();
    out.newline();

    out.info("Config:");
    out.newline();
    for line in toml::to_string(report.config)?.lines() {
        out.plain(&format!("  {}\n", line));
    }

    out.newline();
    out.info("Environment:");
    out.newline();
    for var in ["ENCLAVE_CONFIG", LOG_ENV] {
        match std::env::var(var) {
            Ok(val) => out.plain(&format!("  {} = {}\n", var, val)),
            Err(_) => out.plain(&format!("  {} = (unset)\n", var)),
        }
    }
    Ok(())
}
