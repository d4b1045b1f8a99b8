//! Live exceptions and their context-free captures
//!
//! An [`Exception`] is raised by an evaluator and belongs to the context it
//! was raised in: its arguments are that context's values. Before a failure
//! leaves the context it is captured as a [`SharedException`], an owned
//! string with no references back into the context.

use crate::error::{HeapError, InterpError};
use crate::share::ShareError;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// A raised exception: a kind name plus argument values
#[derive(Clone)]
pub struct Exception {
    kind: Arc<str>,
    args: Vec<Value>,
}

impl Exception {
    /// Create an exception of `kind` with arbitrary arguments
    pub fn new(kind: impl Into<Arc<str>>, args: Vec<Value>) -> Self {
        Self {
            kind: kind.into(),
            args,
        }
    }

    /// Create an exception carrying a single message argument
    pub fn with_message(kind: impl Into<Arc<str>>, message: impl Into<String>) -> Self {
        Self::new(kind, vec![Value::from(message.into())])
    }

    /// `TypeError` with a message
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::with_message("TypeError", message)
    }

    /// `ValueError` with a message
    pub fn value_error(message: impl Into<String>) -> Self {
        Self::with_message("ValueError", message)
    }

    /// `RuntimeError` with a message
    pub fn runtime_error(message: impl Into<String>) -> Self {
        Self::with_message("RuntimeError", message)
    }

    /// Kind name, e.g. `ValueError`
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Arguments as raised
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Check the kind name
    pub fn is(&self, kind: &str) -> bool {
        &*self.kind == kind
    }

    /// Text form, as produced by `str(exc)`
    ///
    /// No arguments give an empty string, one argument gives its `str`, and
    /// several give the `repr` of the argument tuple.
    pub fn message(&self) -> String {
        match self.args.as_slice() {
            [] => String::new(),
            [single] => single.to_str(),
            many => Value::tuple(many.to_vec()).repr(),
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = self.message();
        if message.is_empty() {
            f.write_str(&self.kind)
        } else {
            write!(f, "{}: {}", self.kind, message)
        }
    }
}

impl fmt::Debug for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exception")
            .field("kind", &self.kind)
            .field("args", &self.args)
            .finish()
    }
}

impl From<HeapError> for Exception {
    fn from(err: HeapError) -> Self {
        let kind = match err {
            HeapError::Exhausted { .. } => "MemoryError",
            HeapError::WrongContext { .. } | HeapError::StepBudget { .. } => "RuntimeError",
        };
        Exception::with_message(kind, err.to_string())
    }
}

impl From<ShareError> for Exception {
    fn from(err: ShareError) -> Self {
        match err {
            ShareError::Heap(heap) => heap.into(),
            ShareError::NotShareable(_) => Exception::value_error(err.to_string()),
            ShareError::InvalidName(_) => Exception::type_error(err.to_string()),
            other => Exception::runtime_error(other.to_string()),
        }
    }
}

impl From<InterpError> for Exception {
    fn from(err: InterpError) -> Self {
        match err {
            InterpError::TypeError(msg) => Exception::type_error(msg),
            InterpError::ValueError(msg) => Exception::value_error(msg),
            InterpError::RunFailed(msg) => Exception::with_message("RunFailedError", msg),
            InterpError::NoMemory => Exception::new("MemoryError", Vec::new()),
            InterpError::Share(share) => share.into(),
            InterpError::NotShareable(_) => Exception::value_error(err.to_string()),
            other => Exception::runtime_error(other.to_string()),
        }
    }
}

/// Owned, context-free description of a failure: `"Kind: message"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedException {
    msg: String,
}

impl SharedException {
    /// Render `exc` into freshly reserved storage
    ///
    /// Returns [`InterpError::NoMemory`] when the description itself cannot
    /// be allocated.
    pub fn capture(exc: &Exception) -> Result<Self, InterpError> {
        let kind = exc.kind();
        let message = exc.message();
        let len = if message.is_empty() {
            kind.len()
        } else {
            kind.len() + 2 + message.len()
        };

        let mut msg = String::new();
        msg.try_reserve_exact(len)
            .map_err(|_| InterpError::NoMemory)?;
        msg.push_str(kind);
        if !message.is_empty() {
            msg.push_str(": ");
            msg.push_str(&message);
        }
        Ok(Self { msg })
    }

    /// The captured text
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Rebuild as the caller-side run failure
    pub fn into_error(self) -> InterpError {
        InterpError::RunFailed(self.msg)
    }
}

impl fmt::Display for SharedException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextId;

    #[test]
    fn test_message_forms() {
        assert_eq!(Exception::new("KeyError", vec![]).message(), "");
        assert_eq!(Exception::value_error("boom").message(), "boom");
        assert_eq!(
            Exception::new("OSError", vec![Value::Int(2), Value::from("gone")]).message(),
            "(2, 'gone')"
        );
        assert_eq!(
            Exception::new("ValueError", vec![Value::Int(3)]).message(),
            "3"
        );
    }

    #[test]
    fn test_capture_formats_kind_and_message() {
        let captured = SharedException::capture(&Exception::value_error("boom")).unwrap();
        assert_eq!(captured.message(), "ValueError: boom");

        let bare = SharedException::capture(&Exception::new("StopIteration", vec![])).unwrap();
        assert_eq!(bare.message(), "StopIteration");
    }

    #[test]
    fn test_capture_outlives_exception() {
        let exc = Exception::runtime_error("late");
        let captured = SharedException::capture(&exc).unwrap();
        drop(exc);
        match captured.into_error() {
            InterpError::RunFailed(msg) => assert_eq!(msg, "RuntimeError: late"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_heap_errors_become_script_exceptions() {
        let exc: Exception = HeapError::Exhausted {
            owner: ContextId::new(1),
            requested: 10,
            limit: 5,
        }
        .into();
        assert!(exc.is("MemoryError"));

        let exc: Exception = HeapError::StepBudget {
            owner: ContextId::new(1),
            limit: 5,
        }
        .into();
        assert!(exc.is("RuntimeError"));
    }

    #[test]
    fn test_interp_errors_become_script_exceptions() {
        let exc: Exception = InterpError::NotFound(ContextId::new(9)).into();
        assert!(exc.is("RuntimeError"));
        assert_eq!(exc.message(), "unrecognized interpreter ID 9");

        let exc: Exception = InterpError::TypeError("ID must be an int".into()).into();
        assert!(exc.is("TypeError"));

        let exc: Exception = InterpError::RunFailed("ValueError: x".into()).into();
        assert!(exc.is("RunFailedError"));

        let exc: Exception = InterpError::NotShareable("list".into()).into();
        assert!(exc.is("ValueError"));
    }
}
