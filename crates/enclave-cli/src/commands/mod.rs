//! Subcommand implementations

pub mod contexts;
pub mod eval;
pub mod info;
pub mod run;
