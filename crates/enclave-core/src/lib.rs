//! Enclave Core
//!
//! This crate provides isolated execution contexts inside a single process:
//! - Execution contexts with their own namespace and allocation accounting
//! - A registry of live contexts with stable, sequential identifiers
//! - Focus switching (binding the calling thread to another context)
//! - Cross-context sharing of a closed set of value types
//! - A script runner that executes source text inside a target context and
//!   reports failures as owned, context-free descriptions
//!
//! The program-text evaluator is not part of this crate; it is plugged in
//! through the [`Evaluator`] trait.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod context;
pub mod error;
pub mod eval;
pub mod exception;
pub mod focus;
pub mod registry;
pub mod runner;
pub mod share;
pub mod value;

pub use config::{ConfigError, LogFormat, RuntimeConfig};
pub use context::{
    ContextHeap, ContextId, ContextOptions, ExecutionContext, HeapStats, ResourceLimits, RunClaim,
    Worker, WorkerId,
};
pub use error::{HeapError, InterpError, InterpResult};
pub use eval::{Evaluator, Scope};
pub use exception::{Exception, SharedException};
pub use focus::{FocusGuard, RegistryId};
pub use registry::ContextRegistry;
pub use runner::ScriptRunner;
pub use share::{
    CrossContextData, ShareError, Shareable, ShareableRegistry, SharedNamespace, SharedPayload,
};
pub use value::{Module, Namespace, NativeFn, NativeFunction, Value, ValueKind};
