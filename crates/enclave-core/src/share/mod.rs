//! Cross-context sharing
//!
//! Values never cross a context boundary by reference. A value whose type
//! has a registered [`Shareable`] capability is turned into a
//! [`CrossContextData`] descriptor in its origin context; the descriptor
//! materializes an equivalent, independently allocated value in the target
//! context and is released back in the origin afterwards.

mod builtin;
mod data;
mod namespace;
mod registry;

pub use builtin::{BytesShareable, ScalarShareable, StrShareable};
pub use data::CrossContextData;
pub use namespace::SharedNamespace;
pub use registry::{ShareableRegistry, ShareableRegistryBuilder};

use crate::context::ContextHeap;
use crate::error::HeapError;
use crate::value::{Value, ValueKind};
use std::any::Any;
use std::fmt;
use thiserror::Error;

/// Type-erased, context-independent payload produced by a capability
pub type SharedPayload = Box<dyn Any + Send + Sync>;

/// Errors raised by the sharing protocol
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShareError {
    /// No capability is registered for the value's type
    #[error("{0} is not a cross-context shareable type")]
    NotShareable(String),

    /// A capability for this type already exists
    #[error("a cross-context capability for {0} is already registered")]
    AlreadyRegistered(String),

    /// A shared-namespace key is not an identifier
    #[error("shared name {0:?} is not a valid identifier")]
    InvalidName(String),

    /// The capability itself failed
    #[error("{0}")]
    Capability(String),

    /// Heap accounting failed (wrong focus, exhausted budget)
    #[error(transparent)]
    Heap(#[from] HeapError),
}

/// Capability that makes one value kind shareable across contexts
///
/// `get_data` runs in the origin context and must capture everything needed
/// to rebuild the value; `new_object` runs in the target context and must
/// allocate fresh storage there.
pub trait Shareable: Send + Sync {
    /// The value kind this capability handles
    fn kind(&self) -> ValueKind;

    /// Extract a context-independent payload from `value`
    fn get_data(&self, value: &Value) -> Result<SharedPayload, ShareError>;

    /// Build a new value from `payload`, accounted to `target`
    fn new_object(&self, payload: &SharedPayload, target: &ContextHeap)
        -> Result<Value, ShareError>;

    /// Dispose of a payload
    fn free(&self, payload: SharedPayload) {
        drop(payload);
    }

    /// Whether `free` must run with the origin context focused
    ///
    /// Payloads that still reference origin storage return true.
    fn releases_at_home(&self) -> bool {
        true
    }

    /// Human readable description (for debugging/introspection)
    fn description(&self) -> &str {
        "No description provided"
    }
}

impl fmt::Debug for dyn Shareable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shareable")
            .field("kind", &self.kind())
            .field("description", &self.description())
            .finish()
    }
}
