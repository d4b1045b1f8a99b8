//! The `interpreters` module seen from scripts
//!
//! Lets a script manage sibling contexts of the registry it is running in:
//!
//! ```text
//! import interpreters
//! worker = interpreters.create()
//! interpreters.run_string(worker, "x = n * 2", {"n": 21})
//! interpreters.destroy(worker)
//! ```
//!
//! The module holds a weak handle to its runner; the runner owns the
//! evaluator that owns this module.

use enclave_core::{
    ContextId, Exception, Module, NativeFunction, Namespace, Scope, ScriptRunner, Value,
};
use enclave_script::builtins::check_arity;
use std::sync::{Arc, Weak};

/// Name scripts import the module by
pub const MODULE_NAME: &str = "interpreters";

/// Build the module over `runner`
pub fn module(runner: Weak<ScriptRunner>) -> Module {
    Module::new(MODULE_NAME)
        .with_attr("RunFailedError", Value::Type(Arc::from("RunFailedError")))
        .with_native(host_function(&runner, "create", &[], create))
        .with_native(host_function(&runner, "destroy", &["id"], destroy))
        .with_native(host_function(&runner, "list_all", &[], list_all))
        .with_native(host_function(&runner, "get_current", &[], get_current))
        .with_native(host_function(&runner, "get_main", &[], get_main))
        .with_native(host_function(&runner, "is_running", &["id"], is_running))
        .with_native(host_function(&runner, "run_string", &["id", "code", "shared"], run_string))
        .with_native(host_function(&runner, "is_shareable", &["obj"], is_shareable))
}

type HostFn = fn(&ScriptRunner, &mut Scope<'_>, Vec<Value>) -> Result<Value, Exception>;

fn host_function(runner: &Weak<ScriptRunner>, name: &str, params: &[&str], body: HostFn) -> NativeFunction {
    let runner = runner.clone();
    NativeFunction::new(name, move |scope: &mut Scope<'_>, args: Vec<Value>| {
        let runner = runner
            .upgrade()
            .ok_or_else(|| Exception::runtime_error("interpreter runtime has shut down"))?;
        body(&runner, scope, args)
    })
    .with_params(params)
}

fn id_value(id: ContextId) -> Value {
    Value::Int(id.as_i64())
}

fn context_id(value: &Value, message: &str) -> Result<ContextId, Exception> {
    match value {
        Value::Int(i) => Ok(ContextId::new(*i)),
        Value::Bool(b) => Ok(ContextId::new(i64::from(*b))),
        _ => Err(Exception::type_error(message)),
    }
}

fn create(runner: &ScriptRunner, _scope: &mut Scope<'_>, args: Vec<Value>) -> Result<Value, Exception> {
    check_arity("create", &args, 0, 0)?;
    let id = runner.contexts().create()?;
    Ok(id_value(id))
}

fn destroy(runner: &ScriptRunner, _scope: &mut Scope<'_>, args: Vec<Value>) -> Result<Value, Exception> {
    check_arity("destroy", &args, 1, 1)?;
    let id = context_id(&args[0], "ID must be an int")?;
    runner.contexts().destroy(id)?;
    Ok(Value::None)
}

fn list_all(runner: &ScriptRunner, scope: &mut Scope<'_>, args: Vec<Value>) -> Result<Value, Exception> {
    check_arity("list_all", &args, 0, 0)?;
    let ids = runner.contexts().list_all().into_iter().map(id_value).collect();
    scope.alloc_list(ids)
}

fn get_current(runner: &ScriptRunner, _scope: &mut Scope<'_>, args: Vec<Value>) -> Result<Value, Exception> {
    check_arity("get_current", &args, 0, 0)?;
    Ok(id_value(runner.contexts().get_current()))
}

fn get_main(runner: &ScriptRunner, _scope: &mut Scope<'_>, args: Vec<Value>) -> Result<Value, Exception> {
    check_arity("get_main", &args, 0, 0)?;
    Ok(id_value(runner.contexts().get_main()))
}

fn is_running(runner: &ScriptRunner, _scope: &mut Scope<'_>, args: Vec<Value>) -> Result<Value, Exception> {
    check_arity("is_running", &args, 1, 1)?;
    let id = context_id(&args[0], "ID must be an int")?;
    Ok(Value::Bool(runner.contexts().is_running(id)?))
}

fn run_string(runner: &ScriptRunner, _scope: &mut Scope<'_>, args: Vec<Value>) -> Result<Value, Exception> {
    check_arity("run_string", &args, 2, 3)?;
    let id = context_id(&args[0], "first arg (ID) must be an int")?;
    let Value::Str(code) = &args[1] else {
        return Err(Exception::type_error("second arg (code) must be a string"));
    };
    let shared: Option<Namespace> = match args.get(2) {
        None | Some(Value::None) => None,
        Some(Value::Dict(entries)) => Some(entries.read().clone()),
        Some(_) => return Err(Exception::type_error("shared must be a dict")),
    };

    runner.run_string(id, code, shared.as_ref())?;
    Ok(Value::None)
}

fn is_shareable(runner: &ScriptRunner, _scope: &mut Scope<'_>, args: Vec<Value>) -> Result<Value, Exception> {
    check_arity("is_shareable", &args, 1, 1)?;
    Ok(Value::Bool(runner.is_shareable(&args[0])))
}
