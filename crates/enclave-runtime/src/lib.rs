//! Enclave Runtime
//!
//! Binds the context core to the script evaluator:
//! - [`Interpreters`]: the host-side facade over one registry
//! - The `interpreters` module scripts import to manage sibling contexts
//! - `NAME=VALUE` shared-binding parsing for command-line use
//! - Logging setup
//!
//! # Example
//!
//! ```ignore
//! let interps = Interpreters::new();
//! let id = interps.create()?;
//! interps.run_string(id, "answer = 6 * 7", None)?;
//! assert_eq!(interps.get_global(id, "answer")?, Some(Value::Int(42)));
//! ```

#![warn(rust_2018_idioms)]

pub mod error;
pub mod host;
pub mod interpreters;
pub mod logging;
pub mod shared;

pub use error::RuntimeError;
pub use interpreters::{Interpreters, InterpretersBuilder};
pub use shared::{parse_binding, parse_bindings, parse_literal};

pub use enclave_core::{ContextId, InterpError, Namespace, RuntimeConfig, Value};
