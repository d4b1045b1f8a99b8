//! Host-side facade over one context registry
//!
//! [`Interpreters`] bundles a registry, the shareable capabilities and a
//! script evaluator that can import the `interpreters` module. It is the
//! entry point the binary and embedding code use.

use crate::error::RuntimeError;
use crate::host;
use enclave_core::{
    ContextId, ContextRegistry, HeapStats, InterpResult, Module, Namespace, RuntimeConfig,
    ScriptRunner, ShareableRegistry, Value,
};
use enclave_script::{OutputSink, ScriptEvaluator};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Multiple-interpreter runtime
pub struct Interpreters {
    runner: Arc<ScriptRunner>,
    config: RuntimeConfig,
    modules: Vec<String>,
}

impl Interpreters {
    /// Runtime with default settings
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Runtime configured by `config`
    pub fn from_config(config: RuntimeConfig) -> Self {
        Self::builder().config(config).build()
    }

    /// Runtime configured from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, RuntimeError> {
        let config = RuntimeConfig::from_file(path)?;
        Ok(Self::from_config(config))
    }

    /// Start configuring a runtime
    pub fn builder() -> InterpretersBuilder {
        InterpretersBuilder::default()
    }

    /// Create a context, returning its identifier
    pub fn create(&self) -> InterpResult<ContextId> {
        self.contexts().create()
    }

    /// Destroy an idle context
    pub fn destroy(&self, id: ContextId) -> InterpResult<()> {
        self.contexts().destroy(id)
    }

    /// Live identifiers, newest first
    pub fn list_all(&self) -> Vec<ContextId> {
        self.contexts().list_all()
    }

    /// Context the calling thread is focused on
    pub fn get_current(&self) -> ContextId {
        self.contexts().get_current()
    }

    /// The main context, always id 0
    pub fn get_main(&self) -> ContextId {
        self.contexts().get_main()
    }

    /// Whether context `id` is executing code
    pub fn is_running(&self, id: ContextId) -> InterpResult<bool> {
        self.contexts().is_running(id)
    }

    /// Execute `source` in context `id` with optional shared bindings
    pub fn run_string(&self, id: ContextId, source: &str, shared: Option<&Namespace>) -> InterpResult<()> {
        self.runner.run_string(id, source, shared)
    }

    /// Whether `value` may be passed as a shared binding
    pub fn is_shareable(&self, value: &Value) -> bool {
        self.runner.is_shareable(value)
    }

    /// Read a global of context `id`
    pub fn get_global(&self, id: ContextId, name: &str) -> InterpResult<Option<Value>> {
        Ok(self.contexts().lookup(id)?.get_global(name))
    }

    /// Heap counters of context `id`
    pub fn stats(&self, id: ContextId) -> InterpResult<HeapStats> {
        Ok(self.contexts().lookup(id)?.heap().stats())
    }

    /// The underlying context registry
    pub fn contexts(&self) -> &Arc<ContextRegistry> {
        self.runner.contexts()
    }

    /// The runner shared with the `interpreters` module
    pub fn runner(&self) -> &Arc<ScriptRunner> {
        &self.runner
    }

    /// Effective configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Modules scripts can import, sorted
    pub fn module_names(&self) -> &[String] {
        &self.modules
    }
}

impl Default for Interpreters {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Interpreters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreters")
            .field("runner", &self.runner)
            .field("modules", &self.modules)
            .finish()
    }
}

/// Builder for [`Interpreters`]
#[derive(Default)]
pub struct InterpretersBuilder {
    config: RuntimeConfig,
    output: Option<OutputSink>,
    modules: Vec<Module>,
    shareables: Option<Arc<ShareableRegistry>>,
}

impl InterpretersBuilder {
    /// Use `config` for limits and registry settings
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Send script `print` output to `sink`
    pub fn output(mut self, sink: OutputSink) -> Self {
        self.output = Some(sink);
        self
    }

    /// Make an extra host module importable
    pub fn module(mut self, module: Module) -> Self {
        self.modules.push(module);
        self
    }

    /// Use `shareables` instead of the process-wide registry
    pub fn shareables(mut self, shareables: Arc<ShareableRegistry>) -> Self {
        self.shareables = Some(shareables);
        self
    }

    /// Create the registry, evaluator and runner
    pub fn build(self) -> Interpreters {
        let InterpretersBuilder {
            config,
            output,
            modules,
            shareables,
        } = self;
        let contexts = Arc::new(ContextRegistry::from_config(&config));
        let shareables = shareables.unwrap_or_else(ShareableRegistry::global);

        let mut names = Vec::new();
        let runner = Arc::new_cyclic(|weak| {
            let mut evaluator = ScriptEvaluator::builder().module(host::module(weak.clone()));
            for module in modules {
                evaluator = evaluator.module(module);
            }
            if let Some(sink) = output {
                evaluator = evaluator.output(sink);
            }
            let evaluator = evaluator.build();
            names = evaluator.module_names().iter().map(|n| n.to_string()).collect();

            ScriptRunner::new(contexts, shareables, Arc::new(evaluator))
        });

        debug!(target: "enclave::runtime", modules = ?names, "evaluator ready");
        info!(
            target: "enclave::runtime",
            max_contexts = ?config.runtime.max_contexts,
            max_alloc_bytes = ?config.limits.max_alloc_bytes,
            max_steps = ?config.limits.max_steps,
            "runtime initialised"
        );

        Interpreters {
            runner,
            config,
            modules: names,
        }
    }
}
