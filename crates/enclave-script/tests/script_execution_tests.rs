//! Script execution through the context runner
//!
//! These tests run real script text in isolated contexts:
//! - Namespace persistence and isolation
//! - Shared bindings arriving as target-owned values
//! - Failures reported as "Kind: message"
//! - Syntax errors leaving the namespace untouched
//! - Resource limits surfacing as script exceptions
//!
//! # Running Tests
//! ```bash
//! cargo test -p enclave-script --test script_execution_tests
//! ```

use enclave_core::{
    ContextOptions, ContextRegistry, InterpError, Module, Namespace, ResourceLimits, ScriptRunner,
    ShareableRegistry, Value,
};
use enclave_script::ScriptEvaluator;
use parking_lot::Mutex;
use std::sync::Arc;

struct Harness {
    runner: ScriptRunner,
    printed: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    fn new() -> Self {
        Self::with_options(ContextOptions::default())
    }

    fn with_options(options: ContextOptions) -> Self {
        let printed = Arc::new(Mutex::new(Vec::new()));
        let sink = printed.clone();
        let evaluator = ScriptEvaluator::builder()
            .output(Arc::new(move |line: &str| sink.lock().push(line.to_string())))
            .module(Module::new("settings").with_attr("mode", Value::from("test")))
            .build();

        Self {
            runner: ScriptRunner::new(
                Arc::new(ContextRegistry::with_options(options, None)),
                Arc::new(ShareableRegistry::standard()),
                Arc::new(evaluator),
            ),
            printed,
        }
    }

    fn create(&self) -> enclave_core::ContextId {
        self.runner.contexts().create().unwrap()
    }

    fn global(&self, id: enclave_core::ContextId, name: &str) -> Option<Value> {
        self.runner.contexts().lookup(id).unwrap().get_global(name)
    }

    fn failure(&self, id: enclave_core::ContextId, source: &str) -> String {
        match self.runner.run_string(id, source, None) {
            Err(InterpError::RunFailed(message)) => message,
            other => panic!("expected a run failure, got {:?}", other),
        }
    }
}

#[test]
fn test_globals_persist_between_runs() {
    let h = Harness::new();
    let id = h.create();

    h.runner.run_string(id, "counter = 1", None).unwrap();
    h.runner.run_string(id, "counter += 1", None).unwrap();
    assert_eq!(h.global(id, "counter"), Some(Value::Int(2)));
}

#[test]
fn test_contexts_do_not_see_each_other() {
    let h = Harness::new();
    let a = h.create();
    let b = h.create();

    h.runner.run_string(a, "secret = 'a'", None).unwrap();
    let message = h.failure(b, "print(secret)");
    assert_eq!(message, "NameError: name 'secret' is not defined");
}

#[test]
fn test_module_name_is_main() {
    let h = Harness::new();
    let id = h.create();
    h.runner.run_string(id, "print(__name__)", None).unwrap();
    assert_eq!(*h.printed.lock(), vec!["__main__".to_string()]);
}

#[test]
fn test_shared_values_arrive_in_target() {
    let h = Harness::new();
    let id = h.create();
    let shared: Namespace = vec![
        ("text", Value::from("hi")),
        ("blob", Value::from(&b"\x00\x01"[..])),
        ("n", Value::Int(3)),
        ("nothing", Value::None),
    ]
    .into_iter()
    .collect();

    h.runner
        .run_string(
            id,
            "result = text * n\nsize = len(blob)\nmissing = nothing is None",
            Some(&shared),
        )
        .unwrap();

    assert_eq!(h.global(id, "result"), Some(Value::from("hihihi")));
    assert_eq!(h.global(id, "size"), Some(Value::Int(2)));
    assert_eq!(h.global(id, "missing"), Some(Value::Bool(true)));
}

#[test]
fn test_shared_binding_overwrites_existing_global() {
    let h = Harness::new();
    let id = h.create();
    h.runner.run_string(id, "x = 'old'", None).unwrap();

    let shared: Namespace = vec![("x", Value::from("new"))].into_iter().collect();
    h.runner.run_string(id, "pass", Some(&shared)).unwrap();
    assert_eq!(h.global(id, "x"), Some(Value::from("new")));
}

#[test]
fn test_failure_message_format() {
    let h = Harness::new();
    let id = h.create();

    assert_eq!(h.failure(id, "raise ValueError('bad value')"), "ValueError: bad value");
    assert_eq!(h.failure(id, "1 / 0"), "ZeroDivisionError: division by zero");
    assert_eq!(h.failure(id, "raise KeyError"), "KeyError");
    assert_eq!(h.failure(id, "[][0]"), "IndexError: list index out of range");
}

#[test]
fn test_effects_before_failure_remain() {
    let h = Harness::new();
    let id = h.create();

    h.failure(id, "before = 1\nraise RuntimeError('stop')\nafter = 2");
    assert_eq!(h.global(id, "before"), Some(Value::Int(1)));
    assert_eq!(h.global(id, "after"), None);
}

#[test]
fn test_syntax_error_runs_nothing() {
    let h = Harness::new();
    let id = h.create();

    let message = h.failure(id, "x = 1\ny = (");
    assert!(message.starts_with("SyntaxError: "), "{}", message);
    assert_eq!(h.global(id, "x"), None);
}

#[test]
fn test_handled_exception_does_not_fail_run() {
    let h = Harness::new();
    let id = h.create();

    let source = "
try:
    int('nope')
except ValueError as err:
    reason = str(err)
";
    h.runner.run_string(id, source, None).unwrap();
    assert_eq!(
        h.global(id, "reason"),
        Some(Value::from("invalid literal for int() with base 10: 'nope'"))
    );
}

#[test]
fn test_imports_resolve_host_modules() {
    let h = Harness::new();
    let id = h.create();

    h.runner.run_string(id, "import settings\nmode = settings.mode", None).unwrap();
    assert_eq!(h.global(id, "mode"), Some(Value::from("test")));
    assert_eq!(
        h.failure(id, "import nowhere"),
        "ModuleNotFoundError: No module named 'nowhere'"
    );
}

#[test]
fn test_allocation_limit_raises_memory_error() {
    let h = Harness::with_options(ContextOptions {
        limits: ResourceLimits::with_alloc_limit(1024),
    });
    let id = h.create();

    let message = h.failure(id, "s = 'x'\nwhile True:\n    s = s + s");
    assert!(message.starts_with("MemoryError"), "{}", message);
}

#[test]
fn test_memory_error_is_catchable() {
    let h = Harness::with_options(ContextOptions {
        limits: ResourceLimits::with_alloc_limit(1024),
    });
    let id = h.create();

    let source = "
try:
    big = 'x' * 4096
except MemoryError:
    big = None
";
    h.runner.run_string(id, source, None).unwrap();
    assert_eq!(h.global(id, "big"), Some(Value::None));
}

#[test]
fn test_step_budget_stops_runaway_loop() {
    let h = Harness::with_options(ContextOptions {
        limits: ResourceLimits::with_step_budget(10_000),
    });
    let id = h.create();

    let message = h.failure(id, "while True:\n    pass");
    assert!(message.starts_with("RuntimeError"), "{}", message);
}

#[test]
fn test_print_output() {
    let h = Harness::new();
    let id = h.create();

    h.runner
        .run_string(id, "for i in range(3):\n    print('line', i)", None)
        .unwrap();
    assert_eq!(
        *h.printed.lock(),
        vec!["line 0".to_string(), "line 1".to_string(), "line 2".to_string()]
    );
}
