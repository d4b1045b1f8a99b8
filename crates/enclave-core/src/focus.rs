//! Focus switching
//!
//! Every OS thread is bound to at most one worker per registry. A thread that
//! never switched is bound to the main context. Rebinding is scoped through
//! [`FocusGuard`]: dropping the guard restores the binding that was in place
//! before, on both normal and error paths.
//!
//! Guards must be dropped in reverse order of creation; lexical scoping
//! gives that for free.

use crate::context::{ContextId, Worker};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Identity of one context registry
///
/// Focus is tracked per registry so that independent registries in the same
/// process (for example, one per test) never observe each other's bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistryId(u64);

impl RegistryId {
    /// Allocate a fresh registry identity
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        RegistryId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for RegistryId {
    fn default() -> Self {
        Self::new()
    }
}

thread_local! {
    static FOCUS: RefCell<FxHashMap<RegistryId, Arc<Worker>>> =
        RefCell::new(FxHashMap::default());
}

/// Worker the calling thread is bound to, if it ever switched
pub fn focused_worker(registry: RegistryId) -> Option<Arc<Worker>> {
    FOCUS.with(|focus| focus.borrow().get(&registry).cloned())
}

/// Context the calling thread is bound to
pub fn current_context(registry: RegistryId) -> ContextId {
    focused_worker(registry)
        .map(|worker| worker.context())
        .unwrap_or(ContextId::MAIN)
}

fn swap(registry: RegistryId, worker: Option<Arc<Worker>>) -> Option<Arc<Worker>> {
    FOCUS.with(|focus| {
        let mut focus = focus.borrow_mut();
        match worker {
            Some(worker) => focus.insert(registry, worker),
            None => focus.remove(&registry),
        }
    })
}

/// RAII binding of the calling thread to a worker
///
/// The guard is tied to the thread that created it and is neither `Send`
/// nor `Sync`.
pub struct FocusGuard {
    registry: RegistryId,
    worker: Arc<Worker>,
    previous: Option<Arc<Worker>>,
    _thread_bound: PhantomData<*const ()>,
}

impl FocusGuard {
    /// Bind the calling thread to `worker`, remembering the previous binding
    pub fn enter(registry: RegistryId, worker: Arc<Worker>) -> Self {
        let previous = swap(registry, Some(worker.clone()));
        trace!(
            target: "enclave::focus",
            from = %previous.as_ref().map_or(ContextId::MAIN, |w| w.context()),
            to = %worker.context(),
            "focus switch"
        );
        Self {
            registry,
            worker,
            previous,
            _thread_bound: PhantomData,
        }
    }

    /// Context the thread is bound to while the guard lives
    pub fn context(&self) -> ContextId {
        self.worker.context()
    }

    /// Context that will be restored when the guard drops
    pub fn previous_context(&self) -> ContextId {
        self.previous
            .as_ref()
            .map_or(ContextId::MAIN, |worker| worker.context())
    }
}

impl Drop for FocusGuard {
    fn drop(&mut self) {
        trace!(
            target: "enclave::focus",
            from = %self.worker.context(),
            to = %self.previous_context(),
            "focus restore"
        );
        swap(self.registry, self.previous.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_id_uniqueness() {
        let id1 = RegistryId::new();
        let id2 = RegistryId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_unbound_thread_is_on_main() {
        let registry = RegistryId::new();
        assert!(focused_worker(registry).is_none());
        assert_eq!(current_context(registry), ContextId::MAIN);
    }

    #[test]
    fn test_guard_restores_on_drop() {
        let registry = RegistryId::new();
        let worker = Arc::new(Worker::new(ContextId::new(3)));

        {
            let guard = FocusGuard::enter(registry, worker.clone());
            assert_eq!(guard.context(), ContextId::new(3));
            assert_eq!(guard.previous_context(), ContextId::MAIN);
            assert_eq!(current_context(registry), ContextId::new(3));
        }

        assert_eq!(current_context(registry), ContextId::MAIN);
        assert!(focused_worker(registry).is_none());
    }

    #[test]
    fn test_nested_guards_unwind_in_order() {
        let registry = RegistryId::new();
        let a = Arc::new(Worker::new(ContextId::new(1)));
        let b = Arc::new(Worker::new(ContextId::new(2)));

        let outer = FocusGuard::enter(registry, a);
        {
            let _inner = FocusGuard::enter(registry, b);
            assert_eq!(current_context(registry), ContextId::new(2));
        }
        assert_eq!(current_context(registry), ContextId::new(1));
        drop(outer);
        assert_eq!(current_context(registry), ContextId::MAIN);
    }

    #[test]
    fn test_registries_do_not_share_focus() {
        let first = RegistryId::new();
        let second = RegistryId::new();
        let worker = Arc::new(Worker::new(ContextId::new(9)));

        let _guard = FocusGuard::enter(first, worker);
        assert_eq!(current_context(first), ContextId::new(9));
        assert_eq!(current_context(second), ContextId::MAIN);
    }

    #[test]
    fn test_focus_is_per_thread() {
        let registry = RegistryId::new();
        let worker = Arc::new(Worker::new(ContextId::new(4)));
        let _guard = FocusGuard::enter(registry, worker);

        let seen = std::thread::spawn(move || current_context(registry))
            .join()
            .unwrap();
        assert_eq!(seen, ContextId::MAIN);
    }
}
