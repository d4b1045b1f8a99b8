//! Evaluator interface
//!
//! The core never interprets program text itself. An [`Evaluator`] receives
//! the source and a [`Scope`] giving it the target context's namespace and
//! heap accounting; it reports failure by returning an [`Exception`].

use crate::context::{ContextHeap, ContextId, ExecutionContext};
use crate::exception::Exception;
use crate::value::{Namespace, Value};
use std::sync::Arc;

/// Executes program text inside a context
pub trait Evaluator: Send + Sync {
    /// Run `source` against `scope`, leaving its effects in the namespace
    fn exec(&self, source: &str, scope: &mut Scope<'_>) -> Result<(), Exception>;
}

impl<F> Evaluator for F
where
    F: Fn(&str, &mut Scope<'_>) -> Result<(), Exception> + Send + Sync,
{
    fn exec(&self, source: &str, scope: &mut Scope<'_>) -> Result<(), Exception> {
        self(source, scope)
    }
}

/// What an evaluator may touch while executing
pub struct Scope<'a> {
    context: &'a ExecutionContext,
    namespace: &'a mut Namespace,
}

impl<'a> Scope<'a> {
    /// Create a scope over a locked namespace of `context`
    pub fn new(context: &'a ExecutionContext, namespace: &'a mut Namespace) -> Self {
        Self { context, namespace }
    }

    /// The context being executed in
    pub fn context(&self) -> &'a ExecutionContext {
        self.context
    }

    /// Shorthand for `context().id()`
    pub fn context_id(&self) -> ContextId {
        self.context.id()
    }

    /// Global namespace
    pub fn globals(&self) -> &Namespace {
        &*self.namespace
    }

    /// Global namespace, mutable
    pub fn globals_mut(&mut self) -> &mut Namespace {
        &mut *self.namespace
    }

    /// Heap accounting of the context
    pub fn heap(&self) -> &'a ContextHeap {
        self.context.heap()
    }

    /// Account one evaluation step
    pub fn step(&self) -> Result<(), Exception> {
        self.heap().step().map_err(Exception::from)
    }

    /// Allocate a string value on this context's heap
    pub fn alloc_str(&self, text: impl Into<String>) -> Result<Value, Exception> {
        let text = text.into();
        self.heap().allocate(text.len())?;
        Ok(Value::from(text))
    }

    /// Allocate a bytes value on this context's heap
    pub fn alloc_bytes(&self, bytes: Vec<u8>) -> Result<Value, Exception> {
        self.heap().allocate(bytes.len())?;
        Ok(Value::Bytes(Arc::from(bytes)))
    }

    /// Allocate a list value on this context's heap
    pub fn alloc_list(&self, items: Vec<Value>) -> Result<Value, Exception> {
        self.heap()
            .allocate(items.len() * std::mem::size_of::<Value>())?;
        Ok(Value::list(items))
    }

    /// Allocate a tuple value on this context's heap
    pub fn alloc_tuple(&self, items: Vec<Value>) -> Result<Value, Exception> {
        self.heap()
            .allocate(items.len() * std::mem::size_of::<Value>())?;
        Ok(Value::tuple(items))
    }

    /// Allocate a dict value on this context's heap
    pub fn alloc_dict(&self, entries: Namespace) -> Result<Value, Exception> {
        self.heap()
            .allocate(entries.len() * std::mem::size_of::<(Arc<str>, Value)>())?;
        Ok(Value::dict(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextOptions, ResourceLimits};
    use crate::focus::RegistryId;

    #[test]
    fn test_closure_evaluator() {
        let ctx = ExecutionContext::new(ContextId::MAIN, RegistryId::new(), &ContextOptions::default());
        let evaluator = |source: &str, scope: &mut Scope<'_>| -> Result<(), Exception> {
            let value = scope.alloc_str(source)?;
            scope.globals_mut().insert("src", value);
            Ok(())
        };

        let mut ns = ctx.namespace();
        let mut scope = Scope::new(&ctx, &mut ns);
        evaluator.exec("hello", &mut scope).unwrap();
        assert_eq!(ns.get("src"), Some(&Value::from("hello")));
        assert_eq!(ctx.heap().stats().allocated_bytes, 5);
    }

    #[test]
    fn test_allocation_failure_is_memory_error() {
        let options = ContextOptions {
            limits: ResourceLimits::with_alloc_limit(3),
        };
        let ctx = ExecutionContext::new(ContextId::MAIN, RegistryId::new(), &options);
        let mut ns = ctx.namespace();
        let scope = Scope::new(&ctx, &mut ns);

        let err = scope.alloc_str("too long").unwrap_err();
        assert!(err.is("MemoryError"));
    }
}
