//! `enclave contexts`: Create contexts and list the registry.

use crate::output::StyledOutput;
use enclave_core::RuntimeConfig;
use enclave_runtime::Interpreters;
use termcolor::ColorChoice;

pub fn execute(config: RuntimeConfig, count: usize, cleanup: bool, color: ColorChoice) -> anyhow::Result<()> {
    let interps = Interpreters::from_config(config);
    let created = (0..count)
        .map(|_| interps.create())
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = StyledOutput::new(color);
    for id in interps.list_all() {
        let stats = interps.stats(id)?;
        out.bold(&format!("{:>4}", id.as_i64()));
        if id == interps.get_main() {
            out.info("  main");
        } else {
            out.plain("      ");
        }
        out.plain(&format!(
            "  running={} allocated={}B steps={}",
            interps.is_running(id)?,
            stats.allocated_bytes,
            stats.total_steps
        ));
        out.newline();
    }

    if cleanup {
        for id in created {
            interps.destroy(id)?;
        }
        out.success("destroyed");
        out.plain(&format!(" {} context(s), {} left", count, interps.list_all().len()));
        out.newline();
    }
    Ok(())
}
