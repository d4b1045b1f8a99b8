//! Registry of live execution contexts
//!
//! The registry owns every context it created. Identifiers are issued
//! sequentially from 0 (the main context, created with the registry) and
//! never reused. Contexts are stored oldest first; enumeration reports them
//! newest first.

use crate::config::RuntimeConfig;
use crate::context::{ContextId, ContextOptions, ExecutionContext};
use crate::error::{InterpError, InterpResult};
use crate::focus::{self, FocusGuard, RegistryId};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

struct RegistryState {
    contexts: Vec<Arc<ExecutionContext>>,
    next_id: i64,
}

/// Registry of all live contexts
pub struct ContextRegistry {
    id: RegistryId,
    main: Arc<ExecutionContext>,
    state: RwLock<RegistryState>,
    options: ContextOptions,
    max_contexts: Option<usize>,
}

impl ContextRegistry {
    /// Create a registry with default options and no context limit
    pub fn new() -> Self {
        Self::with_options(ContextOptions::default(), None)
    }

    /// Create a registry applying `options` to every new context
    ///
    /// `max_contexts` caps the number of live contexts, main included.
    pub fn with_options(options: ContextOptions, max_contexts: Option<usize>) -> Self {
        let id = RegistryId::new();
        let main = Arc::new(ExecutionContext::new(ContextId::MAIN, id, &options));
        Self {
            id,
            main: main.clone(),
            state: RwLock::new(RegistryState {
                contexts: vec![main],
                next_id: 1,
            }),
            options,
            max_contexts,
        }
    }

    /// Create a registry from a loaded config
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::with_options(config.context_options(), config.runtime.max_contexts)
    }

    /// Identity used for focus tracking
    pub fn id(&self) -> RegistryId {
        self.id
    }

    /// Create a new context and return its identifier
    ///
    /// No identifier is consumed when creation fails.
    pub fn create(&self) -> InterpResult<ContextId> {
        let mut state = self.state.write();

        if let Some(max) = self.max_contexts {
            if state.contexts.len() >= max {
                return Err(InterpError::CreationFailed(format!(
                    "limit of {} live contexts reached",
                    max
                )));
            }
        }

        let raw = state.next_id;
        let next = raw
            .checked_add(1)
            .ok_or_else(|| InterpError::CreationFailed("context identifiers exhausted".to_string()))?;

        let id = ContextId::new(raw);
        state
            .contexts
            .push(Arc::new(ExecutionContext::new(id, self.id, &self.options)));
        state.next_id = next;

        debug!(target: "enclave::registry", context = %id, live = state.contexts.len(), "context created");
        Ok(id)
    }

    /// Tear down a context
    ///
    /// Refuses the calling thread's current context, the main context, and
    /// any context that is running or has more than one worker.
    pub fn destroy(&self, id: ContextId) -> InterpResult<()> {
        let target = self.lookup(id)?;

        if id == self.get_current() {
            return Err(InterpError::CurrentContext);
        }
        if id.is_main() {
            return Err(InterpError::MainContext);
        }

        let claim = target.claim()?;

        self.state.write().contexts.retain(|ctx| ctx.id() != id);

        {
            let _focus = FocusGuard::enter(self.id, claim.worker().clone());
            target.teardown();
        }
        drop(claim);

        debug!(target: "enclave::registry", context = %id, "context destroyed");
        Ok(())
    }

    /// Find a live context
    pub fn lookup(&self, id: ContextId) -> InterpResult<Arc<ExecutionContext>> {
        self.state
            .read()
            .contexts
            .iter()
            .find(|ctx| ctx.id() == id)
            .cloned()
            .ok_or(InterpError::NotFound(id))
    }

    /// Whether `id` names a live context
    pub fn contains(&self, id: ContextId) -> bool {
        self.state.read().contexts.iter().any(|ctx| ctx.id() == id)
    }

    /// Snapshot of live identifiers, newest first
    pub fn list_all(&self) -> Vec<ContextId> {
        self.state
            .read()
            .contexts
            .iter()
            .rev()
            .map(|ctx| ctx.id())
            .collect()
    }

    /// Context the calling thread is bound to
    pub fn get_current(&self) -> ContextId {
        focus::current_context(self.id)
    }

    /// Identifier of the main context
    pub fn get_main(&self) -> ContextId {
        ContextId::MAIN
    }

    /// The main context
    pub fn main(&self) -> Arc<ExecutionContext> {
        self.main.clone()
    }

    /// The calling thread's current context
    pub fn current(&self) -> InterpResult<Arc<ExecutionContext>> {
        self.lookup(self.get_current())
    }

    /// Whether the context is executing
    pub fn is_running(&self, id: ContextId) -> InterpResult<bool> {
        self.lookup(id)?.is_running()
    }

    /// Bind the calling thread to a context until the guard drops
    pub fn enter(&self, id: ContextId) -> InterpResult<FocusGuard> {
        self.lookup(id)?.enter()
    }

    /// Number of live contexts, main included
    pub fn len(&self) -> usize {
        self.state.read().contexts.len()
    }

    /// Always false: the main context lives as long as the registry
    pub fn is_empty(&self) -> bool {
        self.state.read().contexts.is_empty()
    }

    /// Options applied to new contexts
    pub fn options(&self) -> &ContextOptions {
        &self.options
    }

    /// Configured cap on live contexts
    pub fn max_contexts(&self) -> Option<usize> {
        self.max_contexts
    }
}

impl Default for ContextRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ContextRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextRegistry")
            .field("id", &self.id)
            .field("contexts", &self.list_all())
            .finish()
    }
}
