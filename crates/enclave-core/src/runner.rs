//! Script runner
//!
//! Executes source text inside a target context:
//!
//! 1. Claim the target's head worker (fails if already running)
//! 2. Build the shared namespace in the caller's context
//! 3. Switch focus to the target, apply shared items, execute
//! 4. On failure, capture the exception while still in the target
//! 5. Restore focus, release shared items at home, report

use crate::context::{ContextId, ExecutionContext};
use crate::error::{InterpError, InterpResult};
use crate::eval::{Evaluator, Scope};
use crate::exception::{Exception, SharedException};
use crate::registry::ContextRegistry;
use crate::share::{ShareableRegistry, SharedNamespace};
use crate::value::{Namespace, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Runs source text in contexts of one registry
pub struct ScriptRunner {
    contexts: Arc<ContextRegistry>,
    shareables: Arc<ShareableRegistry>,
    evaluator: Arc<dyn Evaluator>,
}

impl ScriptRunner {
    /// Create a runner over `contexts`, sharing through `shareables`
    pub fn new(
        contexts: Arc<ContextRegistry>,
        shareables: Arc<ShareableRegistry>,
        evaluator: Arc<dyn Evaluator>,
    ) -> Self {
        Self {
            contexts,
            shareables,
            evaluator,
        }
    }

    /// The context registry
    pub fn contexts(&self) -> &Arc<ContextRegistry> {
        &self.contexts
    }

    /// The shareable registry
    pub fn shareables(&self) -> &Arc<ShareableRegistry> {
        &self.shareables
    }

    /// Whether `value` could be passed in a shared namespace
    pub fn is_shareable(&self, value: &Value) -> bool {
        self.shareables.is_shareable(value)
    }

    /// Execute `source` in context `id`
    ///
    /// `shared` bindings are copied into the target's namespace before
    /// execution. Any failure inside the target comes back as
    /// [`InterpError::RunFailed`] carrying `"Kind: message"`.
    pub fn run_string(&self, id: ContextId, source: &str, shared: Option<&Namespace>) -> InterpResult<()> {
        let target = self.contexts.lookup(id)?;

        if source.contains('\0') {
            return Err(InterpError::ValueError(
                "source code string cannot contain null bytes".to_string(),
            ));
        }

        let _claim = target.claim()?;

        let origin = self.contexts.current()?;
        let shared = SharedNamespace::build(shared, &self.shareables, &origin)?;

        debug!(
            target: "enclave::runner",
            context = %id,
            origin = %origin.id(),
            shared = shared.len(),
            "run"
        );

        let outcome = self.execute(&target, source, &shared);
        shared.release_all();

        if let Err(err) = &outcome {
            warn!(target: "enclave::runner", context = %id, error = %err, "run failed");
        }
        outcome
    }

    fn execute(&self, target: &ExecutionContext, source: &str, shared: &SharedNamespace) -> InterpResult<()> {
        let _focus = target.enter()?;
        let mut namespace = target.namespace();

        let result = shared
            .apply(target, &mut namespace)
            .map_err(Exception::from)
            .and_then(|()| {
                let mut scope = Scope::new(target, &mut namespace);
                self.evaluator.exec(source, &mut scope)
            });

        match result {
            Ok(()) => Ok(()),
            Err(exc) => {
                let captured = SharedException::capture(&exc);
                drop(exc);
                Err(captured?.into_error())
            }
        }
    }
}

impl std::fmt::Debug for ScriptRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptRunner")
            .field("contexts", &self.contexts)
            .field("shareables", &self.shareables)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner<F>(eval: F) -> ScriptRunner
    where
        F: Fn(&str, &mut Scope<'_>) -> Result<(), Exception> + Send + Sync + 'static,
    {
        ScriptRunner::new(
            Arc::new(ContextRegistry::new()),
            ShareableRegistry::global(),
            Arc::new(eval),
        )
    }

    #[test]
    fn test_runs_in_target_focus() {
        let runner = runner(|_src: &str, scope: &mut Scope<'_>| {
            let here = scope.context_id().as_i64();
            scope.globals_mut().insert("here", Value::Int(here));
            Ok(())
        });
        let id = runner.contexts().create().unwrap();

        runner.run_string(id, "", None).unwrap();

        let ctx = runner.contexts().lookup(id).unwrap();
        assert_eq!(ctx.get_global("here"), Some(Value::Int(id.as_i64())));
        assert_eq!(runner.contexts().get_current(), ContextId::MAIN);
        assert!(!ctx.is_running().unwrap());
    }

    #[test]
    fn test_failure_is_captured() {
        let runner = runner(|_src: &str, _scope: &mut Scope<'_>| {
            Err(Exception::value_error("boom"))
        });
        let id = runner.contexts().create().unwrap();

        match runner.run_string(id, "", None) {
            Err(InterpError::RunFailed(msg)) => assert_eq!(msg, "ValueError: boom"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(runner.contexts().get_current(), ContextId::MAIN);
        assert!(!runner.contexts().is_running(id).unwrap());
    }

    #[test]
    fn test_nul_rejected_before_execution() {
        let runner = runner(|_src: &str, _scope: &mut Scope<'_>| {
            panic!("evaluator must not run")
        });
        let id = runner.contexts().create().unwrap();

        let err = runner.run_string(id, "x = 1\0", None).unwrap_err();
        assert!(matches!(err, InterpError::ValueError(ref m) if m.contains("null bytes")));
    }

    #[test]
    fn test_unknown_target() {
        let runner = runner(|_src: &str, _scope: &mut Scope<'_>| Ok(()));
        assert!(matches!(
            runner.run_string(ContextId::new(42), "", None),
            Err(InterpError::NotFound(_))
        ));
    }

    #[test]
    fn test_shared_items_are_applied() {
        let runner = runner(|_src: &str, scope: &mut Scope<'_>| {
            match scope.globals().get("answer") {
                Some(Value::Int(42)) => Ok(()),
                other => Err(Exception::with_message(
                    "AssertionError",
                    format!("got {:?}", other),
                )),
            }
        });
        let id = runner.contexts().create().unwrap();
        let shared: Namespace = vec![("answer", Value::Int(42))].into_iter().collect();

        runner.run_string(id, "", Some(&shared)).unwrap();
        assert_eq!(runner.contexts().main().heap().stakes(), 0);
    }
}
