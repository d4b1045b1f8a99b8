//! Error types shared by the registry, the sharing protocol and the runner

use crate::config::ConfigError;
use crate::context::ContextId;
use crate::share::ShareError;
use thiserror::Error;

/// Errors raised by a context heap
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapError {
    /// The heap was touched while another context had the calling thread's focus
    #[error("context {owner} heap used while context {active} is active")]
    WrongContext {
        /// Context owning the heap
        owner: ContextId,
        /// Context the calling thread is bound to
        active: ContextId,
    },

    /// Allocation budget exhausted
    #[error("allocation of {requested} bytes exceeds the {limit} byte budget of context {owner}")]
    Exhausted {
        /// Context owning the heap
        owner: ContextId,
        /// Bytes requested
        requested: usize,
        /// Configured budget
        limit: usize,
    },

    /// Step budget exhausted
    #[error("step budget of {limit} exhausted in context {owner}")]
    StepBudget {
        /// Context owning the heap
        owner: ContextId,
        /// Configured budget
        limit: u64,
    },
}

/// Errors surfaced at the interpreter-management boundary
#[derive(Debug, Error)]
pub enum InterpError {
    /// Value's type has no registered cross-context capability
    #[error("{0} is not a cross-context shareable type")]
    NotShareable(String),

    /// Underlying context allocation failed
    #[error("interpreter creation failed: {0}")]
    CreationFailed(String),

    /// Identifier does not name a live context
    #[error("unrecognized interpreter ID {0}")]
    NotFound(ContextId),

    /// Attempted to destroy the calling thread's own context
    #[error("cannot destroy the current interpreter")]
    CurrentContext,

    /// Attempted to destroy the main context
    #[error("cannot destroy the main interpreter")]
    MainContext,

    /// Target context is already executing
    #[error("interpreter already running")]
    Running,

    /// Target context has more than one worker
    #[error("interpreter has more than one thread")]
    AmbiguousState,

    /// Execution inside the target context raised
    #[error("{0}")]
    RunFailed(String),

    /// Malformed argument shape or type
    #[error("{0}")]
    TypeError(String),

    /// Malformed argument value
    #[error("{0}")]
    ValueError(String),

    /// The failure description itself could not be allocated
    #[error("out of memory while capturing a failure")]
    NoMemory,

    /// Sharing protocol failure outside the cases above
    #[error(transparent)]
    Share(ShareError),

    /// Configuration failure
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<ShareError> for InterpError {
    fn from(err: ShareError) -> Self {
        match err {
            ShareError::NotShareable(type_name) => InterpError::NotShareable(type_name),
            ShareError::InvalidName(name) => {
                InterpError::TypeError(format!("shared name {:?} is not a valid identifier", name))
            }
            other => InterpError::Share(other),
        }
    }
}

/// Result alias for boundary operations
pub type InterpResult<T> = Result<T, InterpError>;
