//! Enclave CLI
//!
//! Runs scripts inside isolated interpreter contexts:
//! `run` executes a file, `eval` inline code, `contexts` exercises the
//! registry, and `info` reports the effective configuration.

mod commands;
mod output;

use anyhow::Context;
use clap::{Parser, Subcommand};
use enclave_core::{LogFormat, RuntimeConfig};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "enclave")]
#[command(about = "Run scripts in isolated interpreter contexts", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (enclave.toml)
    #[arg(long, global = true, env = "ENCLAVE_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format: pretty, compact, json
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Colored output: auto, always, never
    #[arg(long, global = true, default_value = "auto")]
    color: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a script file
    Run {
        /// Script file
        file: PathBuf,
        /// Shared binding passed into the context (NAME=VALUE, repeatable)
        #[arg(short, long = "share", value_name = "NAME=VALUE")]
        shares: Vec<String>,
        /// Run in an existing context instead of main
        #[arg(long, conflicts_with = "new")]
        context: Option<i64>,
        /// Run in a freshly created context
        #[arg(long)]
        new: bool,
    },

    /// Evaluate inline code
    Eval {
        /// Source text
        code: String,
        /// Shared binding passed into the context (NAME=VALUE, repeatable)
        #[arg(short, long = "share", value_name = "NAME=VALUE")]
        shares: Vec<String>,
        /// Run in a freshly created context
        #[arg(long)]
        new: bool,
    },

    /// Create contexts and list the registry
    Contexts {
        /// Number of contexts to create
        #[arg(default_value_t = 0)]
        count: usize,
        /// Destroy the created contexts again before exiting
        #[arg(long)]
        cleanup: bool,
    },

    /// Show configuration, shareable types and importable modules
    Info {
        /// Emit JSON
        #[arg(long)]
        json: bool,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<RuntimeConfig> {
    let mut config = match &cli.config {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    if let Some(format) = &cli.log_format {
        config.logging.format = format.parse::<LogFormat>()?;
    }
    Ok(config)
}

fn main() {
    let cli = Cli::parse();
    let mut out = output::StyledOutput::new(output::resolve_color_choice(Some(&cli.color)));

    if let Err(e) = dispatch(cli) {
        out.stderr_error("error");
        eprintln!(": {:#}", e);
        std::process::exit(1);
    }
}

fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    enclave_runtime::logging::init(&config.logging.level, config.logging.format)?;
    let color = output::resolve_color_choice(Some(&cli.color));

    match cli.command {
        Commands::Run {
            file,
            shares,
            context,
            new,
        } => commands::run::execute(config, commands::run::Target::from_flags(context, new), &file, &shares),
        Commands::Eval { code, shares, new } => {
            commands::eval::execute(config, commands::run::Target::from_flags(None, new), &code, &shares)
        }
        Commands::Contexts { count, cleanup } => commands::contexts::execute(config, count, cleanup, color),
        Commands::Info { json } => commands::info::execute(config, json, color),
    }
}
