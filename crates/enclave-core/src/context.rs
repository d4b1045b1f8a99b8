//! Execution contexts
//!
//! Each ExecutionContext represents an isolated execution environment with:
//! - Its own global namespace
//! - Its own heap accounting and resource limits
//! - One or more workers (thread-state records) that a calling thread binds
//!   to while executing inside it

use crate::error::{HeapError, InterpError, InterpResult};
use crate::focus::{self, FocusGuard, RegistryId};
use crate::value::{Namespace, Value};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Identifier of an execution context
///
/// Identifiers are issued sequentially by a registry starting at 0 (the main
/// context) and are never reused for the lifetime of that registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(i64);

impl ContextId {
    /// The main context
    pub const MAIN: ContextId = ContextId(0);

    /// Wrap a raw identifier
    pub const fn new(raw: i64) -> Self {
        ContextId(raw)
    }

    /// Get the raw ID value
    pub const fn as_i64(&self) -> i64 {
        self.0
    }

    /// Check if this is the main context
    pub const fn is_main(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(u64);

impl WorkerId {
    fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        WorkerId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Thread-state record of one context
///
/// A calling thread binds to a worker to execute inside the worker's
/// context. The running flag marks the single active runner.
#[derive(Debug)]
pub struct Worker {
    id: WorkerId,
    context: ContextId,
    running: AtomicBool,
    retired: AtomicBool,
}

impl Worker {
    /// Create a detached worker record for `context`
    pub fn new(context: ContextId) -> Self {
        Self {
            id: WorkerId::next(),
            context,
            running: AtomicBool::new(false),
            retired: AtomicBool::new(false),
        }
    }

    /// Worker identifier
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Context this worker belongs to
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Whether a runner currently holds this worker
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Whether the owning context was torn down
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    fn try_begin(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn finish(&self) {
        self.running.store(false, Ordering::Release);
    }

    fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }
}

/// Exclusive claim on a context's head worker
///
/// The worker is marked running for as long as the claim lives.
#[derive(Debug)]
pub struct RunClaim {
    worker: Arc<Worker>,
}

impl RunClaim {
    /// The claimed worker
    pub fn worker(&self) -> &Arc<Worker> {
        &self.worker
    }
}

impl Drop for RunClaim {
    fn drop(&mut self) {
        self.worker.finish();
    }
}

/// Resource limits for an execution context
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Maximum bytes allocated over the context's lifetime (None = unlimited)
    pub max_alloc_bytes: Option<usize>,

    /// Maximum evaluation steps (None = unlimited)
    pub max_steps: Option<u64>,
}

impl ResourceLimits {
    /// Create unlimited resource limits
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Create resource limits with an allocation budget
    pub fn with_alloc_limit(max_alloc_bytes: usize) -> Self {
        Self {
            max_alloc_bytes: Some(max_alloc_bytes),
            ..Default::default()
        }
    }

    /// Create resource limits with a step budget
    pub fn with_step_budget(max_steps: u64) -> Self {
        Self {
            max_steps: Some(max_steps),
            ..Default::default()
        }
    }
}

/// Options for creating an execution context
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextOptions {
    /// Resource limits
    pub limits: ResourceLimits,
}

/// Snapshot of a context heap's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Bytes allocated so far
    pub allocated_bytes: usize,
    /// Number of allocations
    pub allocation_count: usize,
    /// Evaluation steps executed
    pub total_steps: u64,
    /// Values currently retained by outstanding descriptors
    pub outstanding_stakes: usize,
    /// Highest number of simultaneously outstanding stakes
    pub peak_stakes: usize,
}

/// Allocation accounting of one context
///
/// Every mutating operation must be performed while the calling thread is
/// focused on the owning context; anything else is reported as
/// [`HeapError::WrongContext`].
#[derive(Debug)]
pub struct ContextHeap {
    owner: ContextId,
    registry: RegistryId,
    limits: ResourceLimits,
    allocated_bytes: AtomicUsize,
    allocation_count: AtomicUsize,
    total_steps: AtomicU64,
    stakes: AtomicUsize,
    peak_stakes: AtomicUsize,
}

impl ContextHeap {
    fn new(owner: ContextId, registry: RegistryId, limits: ResourceLimits) -> Self {
        Self {
            owner,
            registry,
            limits,
            allocated_bytes: AtomicUsize::new(0),
            allocation_count: AtomicUsize::new(0),
            total_steps: AtomicU64::new(0),
            stakes: AtomicUsize::new(0),
            peak_stakes: AtomicUsize::new(0),
        }
    }

    /// Context owning this heap
    pub fn owner(&self) -> ContextId {
        self.owner
    }

    /// Configured limits
    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Fail unless the calling thread is focused on the owning context
    pub fn check_home(&self) -> Result<(), HeapError> {
        let active = focus::current_context(self.registry);
        if active == self.owner {
            Ok(())
        } else {
            Err(HeapError::WrongContext {
                owner: self.owner,
                active,
            })
        }
    }

    /// Account an allocation of `bytes`
    pub fn allocate(&self, bytes: usize) -> Result<(), HeapError> {
        self.check_home()?;

        if let Some(limit) = self.limits.max_alloc_bytes {
            let current = self.allocated_bytes.load(Ordering::Relaxed);
            if current.saturating_add(bytes) > limit {
                return Err(HeapError::Exhausted {
                    owner: self.owner,
                    requested: bytes,
                    limit,
                });
            }
        }

        self.allocated_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.allocation_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Account one evaluation step
    pub fn step(&self) -> Result<(), HeapError> {
        let steps = self.total_steps.fetch_add(1, Ordering::Relaxed) + 1;
        match self.limits.max_steps {
            Some(limit) if steps > limit => Err(HeapError::StepBudget {
                owner: self.owner,
                limit,
            }),
            _ => Ok(()),
        }
    }

    /// Record a value retained on behalf of an outstanding descriptor
    pub fn add_stake(&self) -> Result<usize, HeapError> {
        self.check_home()?;
        let count = self.stakes.fetch_add(1, Ordering::Relaxed) + 1;

        // Update peak
        let mut peak = self.peak_stakes.load(Ordering::Relaxed);
        while count > peak {
            match self.peak_stakes.compare_exchange_weak(
                peak,
                count,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(p) => peak = p,
            }
        }

        Ok(count)
    }

    /// Drop a stake previously taken with [`ContextHeap::add_stake`]
    pub fn drop_stake(&self) -> Result<usize, HeapError> {
        self.check_home()?;
        let previous = self
            .stakes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            })
            .unwrap_or_default();
        Ok(previous.saturating_sub(1))
    }

    /// Currently outstanding stakes
    pub fn stakes(&self) -> usize {
        self.stakes.load(Ordering::Relaxed)
    }

    /// Snapshot of all counters
    pub fn stats(&self) -> HeapStats {
        HeapStats {
            allocated_bytes: self.allocated_bytes.load(Ordering::Relaxed),
            allocation_count: self.allocation_count.load(Ordering::Relaxed),
            total_steps: self.total_steps.load(Ordering::Relaxed),
            outstanding_stakes: self.stakes.load(Ordering::Relaxed),
            peak_stakes: self.peak_stakes.load(Ordering::Relaxed),
        }
    }
}

/// An isolated execution context
pub struct ExecutionContext {
    id: ContextId,
    registry: RegistryId,
    namespace: Mutex<Namespace>,
    workers: RwLock<Vec<Arc<Worker>>>,
    alive: AtomicBool,
    heap: ContextHeap,
}

impl ExecutionContext {
    /// Create a context with a single head worker
    pub(crate) fn new(id: ContextId, registry: RegistryId, options: &ContextOptions) -> Self {
        let mut namespace = Namespace::new();
        namespace.insert("__name__", Value::from("__main__"));

        Self {
            id,
            registry,
            namespace: Mutex::new(namespace),
            workers: RwLock::new(vec![Arc::new(Worker::new(id))]),
            alive: AtomicBool::new(true),
            heap: ContextHeap::new(id, registry, options.limits.clone()),
        }
    }

    /// Get the context ID
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Identity of the owning registry
    pub fn registry_id(&self) -> RegistryId {
        self.registry
    }

    /// Whether the context has not been torn down
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Heap accounting
    pub fn heap(&self) -> &ContextHeap {
        &self.heap
    }

    /// Lock the global namespace
    pub fn namespace(&self) -> MutexGuard<'_, Namespace> {
        self.namespace.lock()
    }

    /// Read one global, cloned out of the namespace
    pub fn get_global(&self, name: &str) -> Option<Value> {
        self.namespace.lock().get(name).cloned()
    }

    /// Number of attached workers
    pub fn worker_count(&self) -> usize {
        self.workers.read().len()
    }

    /// The worker created with the context
    pub fn head_worker(&self) -> Option<Arc<Worker>> {
        self.workers.read().first().cloned()
    }

    /// Attach an extra worker
    pub fn attach_worker(&self) -> WorkerId {
        let worker = Arc::new(Worker::new(self.id));
        let id = worker.id();
        self.workers.write().push(worker);
        debug!(target: "enclave::registry", context = %self.id, worker = id.as_u64(), "worker attached");
        id
    }

    /// Detach an extra worker
    ///
    /// The head worker stays attached for the context's whole life.
    pub fn detach_worker(&self, id: WorkerId) -> InterpResult<()> {
        let mut workers = self.workers.write();
        let index = workers
            .iter()
            .position(|w| w.id() == id)
            .ok_or_else(|| InterpError::ValueError(format!("unknown worker {}", id.as_u64())))?;
        if index == 0 {
            return Err(InterpError::ValueError(
                "cannot detach the head worker".to_string(),
            ));
        }
        if workers[index].is_running() {
            return Err(InterpError::Running);
        }
        workers.remove(index);
        debug!(target: "enclave::registry", context = %self.id, worker = id.as_u64(), "worker detached");
        Ok(())
    }

    /// Whether the head worker is executing
    pub fn is_running(&self) -> InterpResult<bool> {
        let workers = self.workers.read();
        if workers.len() > 1 {
            return Err(InterpError::AmbiguousState);
        }
        Ok(workers.first().map_or(false, |w| w.is_running()))
    }

    /// Atomically mark the head worker as running
    pub fn claim(&self) -> InterpResult<RunClaim> {
        let workers = self.workers.read();
        if workers.len() > 1 {
            return Err(InterpError::AmbiguousState);
        }
        let head = workers.first().ok_or(InterpError::NotFound(self.id))?;
        if !head.try_begin() {
            return Err(InterpError::Running);
        }
        Ok(RunClaim {
            worker: head.clone(),
        })
    }

    /// Bind the calling thread to this context's head worker
    pub fn enter(&self) -> InterpResult<FocusGuard> {
        let head = self.head_worker().ok_or(InterpError::NotFound(self.id))?;
        Ok(FocusGuard::enter(self.registry, head))
    }

    /// Clear state and retire every worker
    ///
    /// Must run while focused on this context.
    pub(crate) fn teardown(&self) {
        self.alive.store(false, Ordering::Release);
        let globals = std::mem::take(&mut *self.namespace.lock());
        drop(globals);
        for worker in self.workers.write().drain(..) {
            worker.retire();
        }
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .field("workers", &self.worker_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(id: i64) -> ExecutionContext {
        ExecutionContext::new(ContextId::new(id), RegistryId::new(), &ContextOptions::default())
    }

    #[test]
    fn test_context_id_display() {
        assert_eq!(ContextId::new(12).to_string(), "12");
        assert!(ContextId::MAIN.is_main());
        assert!(!ContextId::new(1).is_main());
    }

    #[test]
    fn test_resource_limits_builders() {
        let limits = ResourceLimits::unlimited();
        assert!(limits.max_alloc_bytes.is_none());
        assert!(limits.max_steps.is_none());

        assert_eq!(
            ResourceLimits::with_alloc_limit(1024).max_alloc_bytes,
            Some(1024)
        );
        assert_eq!(ResourceLimits::with_step_budget(50).max_steps, Some(50));
    }

    #[test]
    fn test_new_context_namespace() {
        let ctx = context(0);
        assert_eq!(ctx.get_global("__name__"), Some(Value::from("__main__")));
        assert_eq!(ctx.namespace().len(), 1);
        assert!(ctx.is_alive());
    }

    #[test]
    fn test_claim_is_exclusive() {
        let ctx = context(0);
        assert!(!ctx.is_running().unwrap());

        let claim = ctx.claim().unwrap();
        assert!(ctx.is_running().unwrap());
        assert!(matches!(ctx.claim(), Err(InterpError::Running)));

        drop(claim);
        assert!(!ctx.is_running().unwrap());
        assert!(ctx.claim().is_ok());
    }

    #[test]
    fn test_extra_worker_makes_state_ambiguous() {
        let ctx = context(0);
        let extra = ctx.attach_worker();
        assert_eq!(ctx.worker_count(), 2);
        assert!(matches!(ctx.is_running(), Err(InterpError::AmbiguousState)));
        assert!(matches!(ctx.claim(), Err(InterpError::AmbiguousState)));

        ctx.detach_worker(extra).unwrap();
        assert!(!ctx.is_running().unwrap());
    }

    #[test]
    fn test_head_worker_cannot_be_detached() {
        let ctx = context(0);
        let head = ctx.head_worker().unwrap().id();
        assert!(matches!(
            ctx.detach_worker(head),
            Err(InterpError::ValueError(_))
        ));
        assert_eq!(ctx.worker_count(), 1);
    }

    #[test]
    fn test_heap_requires_home_focus() {
        let ctx = context(5);
        assert!(matches!(
            ctx.heap().allocate(8),
            Err(HeapError::WrongContext { .. })
        ));

        let _focus = ctx.enter().unwrap();
        ctx.heap().allocate(8).unwrap();
        let stats = ctx.heap().stats();
        assert_eq!(stats.allocated_bytes, 8);
        assert_eq!(stats.allocation_count, 1);
    }

    #[test]
    fn test_alloc_budget() {
        let options = ContextOptions {
            limits: ResourceLimits::with_alloc_limit(10),
        };
        let ctx = ExecutionContext::new(ContextId::new(1), RegistryId::new(), &options);
        let _focus = ctx.enter().unwrap();

        ctx.heap().allocate(6).unwrap();
        assert!(matches!(
            ctx.heap().allocate(6),
            Err(HeapError::Exhausted { limit: 10, .. })
        ));
        ctx.heap().allocate(4).unwrap();
        assert_eq!(ctx.heap().stats().allocated_bytes, 10);
    }

    #[test]
    fn test_step_budget() {
        let options = ContextOptions {
            limits: ResourceLimits::with_step_budget(2),
        };
        let ctx = ExecutionContext::new(ContextId::new(1), RegistryId::new(), &options);

        ctx.heap().step().unwrap();
        ctx.heap().step().unwrap();
        assert!(matches!(
            ctx.heap().step(),
            Err(HeapError::StepBudget { limit: 2, .. })
        ));
    }

    #[test]
    fn test_stakes_track_peak() {
        let ctx = context(0);
        let heap = ctx.heap();

        assert_eq!(heap.add_stake().unwrap(), 1);
        assert_eq!(heap.add_stake().unwrap(), 2);
        assert_eq!(heap.drop_stake().unwrap(), 1);
        assert_eq!(heap.stakes(), 1);
        assert_eq!(heap.stats().peak_stakes, 2);

        assert_eq!(heap.drop_stake().unwrap(), 0);
        // Never underflows
        assert_eq!(heap.drop_stake().unwrap(), 0);
    }

    #[test]
    fn test_teardown_retires_workers() {
        let ctx = context(3);
        let head = ctx.head_worker().unwrap();
        ctx.namespace().insert("x", Value::Int(1));

        {
            let _focus = ctx.enter().unwrap();
            ctx.teardown();
        }

        assert!(!ctx.is_alive());
        assert!(head.is_retired());
        assert!(ctx.namespace().is_empty());
        assert!(ctx.head_worker().is_none());
        assert!(ctx.enter().is_err());
    }
}
