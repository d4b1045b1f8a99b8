//! Tree-walking interpreter
//!
//! Runs a parsed [`Program`] against a [`Scope`]. Names resolve against the
//! context's global namespace first and the builtins second. One evaluation
//! step is charged per statement and per loop iteration, so a context's step
//! budget bounds every program.

use crate::ast::*;
use crate::builtins::is_subclass;
use crate::methods;
use crate::ops;
use enclave_core::{Exception, Module, Namespace, NativeFunction, Scope, Value};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// How a statement finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Normal,
    Break,
    Continue,
}

type ExecResult = Result<Flow, Exception>;

fn name_error(name: &str) -> Exception {
    Exception::with_message("NameError", format!("name '{}' is not defined", name))
}

/// Turn a raised value into an exception
fn to_exception(value: Value) -> Result<Exception, Exception> {
    match value {
        Value::Exception(exc) => Ok(Arc::unwrap_or_clone(exc)),
        Value::Type(kind) => Ok(Exception::new(kind, Vec::new())),
        _ => Err(Exception::type_error("exceptions must derive from BaseException")),
    }
}

pub struct Interpreter<'e> {
    builtins: &'e Namespace,
    modules: &'e FxHashMap<String, Arc<Module>>,
    /// Exceptions whose handlers are currently running, innermost last
    handling: Vec<Exception>,
}

impl<'e> Interpreter<'e> {
    pub fn new(builtins: &'e Namespace, modules: &'e FxHashMap<String, Arc<Module>>) -> Self {
        Self {
            builtins,
            modules,
            handling: Vec::new(),
        }
    }

    /// Execute a whole program
    pub fn run(&mut self, program: &Program, scope: &mut Scope<'_>) -> Result<(), Exception> {
        self.exec_block(&program.body, scope).map(|_| ())
    }

    fn exec_block(&mut self, body: &[Stmt], scope: &mut Scope<'_>) -> ExecResult {
        for stmt in body {
            match self.exec(stmt, scope)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt, scope: &mut Scope<'_>) -> ExecResult {
        scope.step()?;

        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr, scope)?;
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value, scope)?;
                for target in targets {
                    self.assign(target, value.clone(), scope)?;
                }
            }
            StmtKind::AugAssign { target, op, value } => {
                self.exec_aug_assign(target, *op, value, scope)?;
            }
            StmtKind::Assert { test, msg } => {
                if !self.eval(test, scope)?.is_truthy() {
                    let args = match msg {
                        Some(msg) => vec![self.eval(msg, scope)?],
                        None => Vec::new(),
                    };
                    return Err(Exception::new("AssertionError", args));
                }
            }
            StmtKind::Raise(None) => {
                return Err(self
                    .handling
                    .last()
                    .cloned()
                    .unwrap_or_else(|| Exception::runtime_error("No active exception to reraise")));
            }
            StmtKind::Raise(Some(expr)) => {
                let value = self.eval(expr, scope)?;
                return Err(to_exception(value)?);
            }
            StmtKind::Del(targets) => {
                for target in targets {
                    self.delete(target, scope)?;
                }
            }
            StmtKind::Import { module, alias } => {
                let found = self.modules.get(module).ok_or_else(|| {
                    Exception::with_message(
                        "ModuleNotFoundError",
                        format!("No module named '{}'", module),
                    )
                })?;
                let name = alias.as_deref().unwrap_or(module);
                scope
                    .globals_mut()
                    .insert(name, Value::Module(found.clone()));
            }
            StmtKind::Pass => {}
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::If { test, body, orelse } => {
                return if self.eval(test, scope)?.is_truthy() {
                    self.exec_block(body, scope)
                } else {
                    self.exec_block(orelse, scope)
                };
            }
            StmtKind::While { test, body } => {
                while self.eval(test, scope)?.is_truthy() {
                    scope.step()?;
                    if self.exec_block(body, scope)? == Flow::Break {
                        break;
                    }
                }
            }
            StmtKind::For { target, iter, body } => {
                let iterable = self.eval(iter, scope)?;
                for item in ops::iterate(scope, &iterable)? {
                    scope.step()?;
                    self.assign(target, item, scope)?;
                    if self.exec_block(body, scope)? == Flow::Break {
                        break;
                    }
                }
            }
            StmtKind::Try {
                body,
                handlers,
                finally,
            } => {
                let outcome = match self.exec_block(body, scope) {
                    Err(exc) => self.handle(exc, handlers, scope),
                    other => other,
                };
                if finally.is_empty() {
                    return outcome;
                }
                return match self.exec_block(finally, scope)? {
                    Flow::Normal => outcome,
                    flow => Ok(flow),
                };
            }
        }

        Ok(Flow::Normal)
    }

    fn exec_aug_assign(
        &mut self,
        target: &Target,
        op: BinaryOp,
        value: &Expr,
        scope: &mut Scope<'_>,
    ) -> Result<(), Exception> {
        match target {
            Target::Name(name) => {
                let current = self.lookup(name, scope)?;
                let rhs = self.eval(value, scope)?;
                let updated = self.augmented(op, current, &rhs, scope)?;
                scope.globals_mut().insert(name.as_str(), updated);
            }
            Target::Subscript { object, index } => {
                let object = self.eval(object, scope)?;
                let index = self.eval(index, scope)?;
                let current = ops::subscript(scope, &object, &index)?;
                let rhs = self.eval(value, scope)?;
                let updated = self.augmented(op, current, &rhs, scope)?;
                ops::store_subscript(&object, &index, updated)?;
            }
            Target::Tuple(_) => {
                return Err(Exception::with_message(
                    "SyntaxError",
                    "illegal expression for augmented assignment",
                ))
            }
        }
        Ok(())
    }

    /// `list += iterable` extends in place; everything else rebinds
    fn augmented(
        &mut self,
        op: BinaryOp,
        current: Value,
        rhs: &Value,
        scope: &mut Scope<'_>,
    ) -> Result<Value, Exception> {
        if let (BinaryOp::Add, Value::List(items)) = (op, &current) {
            let more = ops::iterate(scope, rhs)?;
            scope
                .heap()
                .allocate(more.len() * std::mem::size_of::<Value>())?;
            items.write().extend(more);
            return Ok(current);
        }
        ops::binary(scope, op, &current, rhs)
    }

    fn handle(&mut self, exc: Exception, handlers: &[Handler], scope: &mut Scope<'_>) -> ExecResult {
        for handler in handlers {
            let matched = match &handler.kind {
                None => true,
                Some(kind) => {
                    let class = self.eval(kind, scope)?;
                    exception_matches(&exc, &class)?
                }
            };
            if !matched {
                continue;
            }

            if let Some(name) = &handler.name {
                scope
                    .globals_mut()
                    .insert(name.as_str(), Value::Exception(Arc::new(exc.clone())));
            }
            self.handling.push(exc);
            let outcome = self.exec_block(&handler.body, scope);
            self.handling.pop();
            if let Some(name) = &handler.name {
                scope.globals_mut().remove(name);
            }
            return outcome;
        }
        Err(exc)
    }

    fn lookup(&self, name: &str, scope: &Scope<'_>) -> Result<Value, Exception> {
        scope
            .globals()
            .get(name)
            .or_else(|| self.builtins.get(name))
            .cloned()
            .ok_or_else(|| name_error(name))
    }

    fn assign(&mut self, target: &Target, value: Value, scope: &mut Scope<'_>) -> Result<(), Exception> {
        match target {
            Target::Name(name) => {
                scope.globals_mut().insert(name.as_str(), value);
            }
            Target::Subscript { object, index } => {
                let object = self.eval(object, scope)?;
                let index = self.eval(index, scope)?;
                ops::store_subscript(&object, &index, value)?;
            }
            Target::Tuple(targets) => {
                let items = ops::iterate(scope, &value)?;
                if items.len() < targets.len() {
                    return Err(Exception::value_error(format!(
                        "not enough values to unpack (expected {}, got {})",
                        targets.len(),
                        items.len()
                    )));
                }
                if items.len() > targets.len() {
                    return Err(Exception::value_error(format!(
                        "too many values to unpack (expected {})",
                        targets.len()
                    )));
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item, scope)?;
                }
            }
        }
        Ok(())
    }

    fn delete(&mut self, target: &Target, scope: &mut Scope<'_>) -> Result<(), Exception> {
        match target {
            Target::Name(name) => {
                scope
                    .globals_mut()
                    .remove(name)
                    .ok_or_else(|| name_error(name))?;
            }
            Target::Subscript { object, index } => {
                let object = self.eval(object, scope)?;
                let index = self.eval(index, scope)?;
                ops::delete_subscript(&object, &index)?;
            }
            Target::Tuple(targets) => {
                for target in targets {
                    self.delete(target, scope)?;
                }
            }
        }
        Ok(())
    }

    fn eval_all(&mut self, exprs: &[Expr], scope: &mut Scope<'_>) -> Result<Vec<Value>, Exception> {
        exprs.iter().map(|expr| self.eval(expr, scope)).collect()
    }

    fn eval(&mut self, expr: &Expr, scope: &mut Scope<'_>) -> Result<Value, Exception> {
        match expr {
            Expr::None => Ok(Value::None),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(i) => Ok(Value::Int(*i)),
            Expr::Float(f) => Ok(Value::Float(*f)),
            Expr::Str(s) => scope.alloc_str(s.as_str()),
            Expr::Bytes(b) => scope.alloc_bytes(b.clone()),
            Expr::Name(name) => self.lookup(name, scope),
            Expr::Tuple(items) => {
                let items = self.eval_all(items, scope)?;
                scope.alloc_tuple(items)
            }
            Expr::List(items) => {
                let items = self.eval_all(items, scope)?;
                scope.alloc_list(items)
            }
            Expr::Dict(entries) => {
                let mut evaluated = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = self.eval(key, scope)?;
                    let value = self.eval(value, scope)?;
                    evaluated.push((key, value));
                }
                ops::build_dict(scope, evaluated)
            }
            Expr::Unary { op, operand } => {
                let value = self.eval(operand, scope)?;
                unary(*op, &value)
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                ops::binary(scope, *op, &left, &right)
            }
            Expr::Compare { left, ops: chain } => {
                let mut left = self.eval(left, scope)?;
                for (op, right) in chain {
                    let right = self.eval(right, scope)?;
                    if !ops::compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::And(left, right) => {
                let left = self.eval(left, scope)?;
                if !left.is_truthy() {
                    return Ok(left);
                }
                self.eval(right, scope)
            }
            Expr::Or(left, right) => {
                let left = self.eval(left, scope)?;
                if left.is_truthy() {
                    return Ok(left);
                }
                self.eval(right, scope)
            }
            Expr::Conditional { test, body, orelse } => {
                if self.eval(test, scope)?.is_truthy() {
                    self.eval(body, scope)
                } else {
                    self.eval(orelse, scope)
                }
            }
            Expr::Call { func, args, kwargs } => {
                let func = self.eval(func, scope)?;
                let args = self.eval_all(args, scope)?;
                let mut named = Vec::with_capacity(kwargs.len());
                for (name, value) in kwargs {
                    named.push((name.as_str(), self.eval(value, scope)?));
                }
                call(func, args, named, scope)
            }
            Expr::Attribute { object, name } => {
                let object = self.eval(object, scope)?;
                attribute(&object, name, scope)
            }
            Expr::Subscript { object, index } => {
                let object = self.eval(object, scope)?;
                let index = self.eval(index, scope)?;
                ops::subscript(scope, &object, &index)
            }
        }
    }
}

fn unary(op: UnaryOp, value: &Value) -> Result<Value, Exception> {
    let bad = || {
        Exception::type_error(format!(
            "bad operand type for unary {}: '{}'",
            match op {
                UnaryOp::Neg => "-",
                UnaryOp::Pos => "+",
                UnaryOp::Not => "not",
            },
            value.type_name()
        ))
    };
    match (op, value) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.is_truthy())),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Value::Float(f)) => Ok(Value::Float(*f)),
        (UnaryOp::Neg, v) => match ops::int_like(v) {
            Some(i) => i.checked_neg().map(Value::Int).ok_or_else(ops::overflow),
            None => Err(bad()),
        },
        (UnaryOp::Pos, v) => ops::int_like(v).map(Value::Int).ok_or_else(bad),
    }
}

fn exception_matches(exc: &Exception, class: &Value) -> Result<bool, Exception> {
    match class {
        Value::Type(kind) => Ok(is_subclass(exc.kind(), kind)),
        Value::Tuple(classes) => {
            for class in classes.iter() {
                if exception_matches(exc, class)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => Err(Exception::type_error(
            "catching classes that do not inherit from BaseException is not allowed",
        )),
    }
}

/// Place keyword arguments into the positional slots named by the function
fn bind_keywords(
    func: &NativeFunction,
    args: Vec<Value>,
    kwargs: Vec<(&str, Value)>,
) -> Result<Vec<Value>, Exception> {
    if kwargs.is_empty() {
        return Ok(args);
    }
    let params = func.params();
    if params.is_empty() {
        return Err(Exception::type_error(format!(
            "{}() takes no keyword arguments",
            func.name()
        )));
    }

    let mut slots: Vec<Option<Value>> = args.into_iter().map(Some).collect();
    for (name, value) in kwargs {
        let Some(position) = params.iter().position(|p| p == name) else {
            return Err(Exception::type_error(format!(
                "{}() got an unexpected keyword argument '{}'",
                func.name(),
                name
            )));
        };
        if slots.len() <= position {
            slots.resize(position + 1, None);
        }
        if slots[position].is_some() {
            return Err(Exception::type_error(format!(
                "{}() got multiple values for argument '{}'",
                func.name(),
                name
            )));
        }
        slots[position] = Some(value);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| {
            slot.ok_or_else(|| {
                Exception::type_error(format!(
                    "{}() missing required argument '{}'",
                    func.name(),
                    params[i]
                ))
            })
        })
        .collect()
}

fn call(
    func: Value,
    args: Vec<Value>,
    kwargs: Vec<(&str, Value)>,
    scope: &mut Scope<'_>,
) -> Result<Value, Exception> {
    match func {
        Value::Native(native) => {
            let args = bind_keywords(&native, args, kwargs)?;
            native.call(scope, args)
        }
        Value::Type(kind) => {
            if !kwargs.is_empty() {
                return Err(Exception::type_error(format!(
                    "{}() takes no keyword arguments",
                    kind
                )));
            }
            Ok(Value::Exception(Arc::new(Exception::new(kind, args))))
        }
        other => Err(Exception::type_error(format!(
            "'{}' object is not callable",
            other.type_name()
        ))),
    }
}

fn attribute(object: &Value, name: &str, scope: &Scope<'_>) -> Result<Value, Exception> {
    match object {
        Value::Module(module) => module.get(name).cloned().ok_or_else(|| {
            Exception::with_message(
                "AttributeError",
                format!("module '{}' has no attribute '{}'", module.name(), name),
            )
        }),
        Value::Exception(exc) if name == "args" => scope.alloc_tuple(exc.args().to_vec()),
        other => methods::bind(other, name).ok_or_else(|| {
            Exception::with_message(
                "AttributeError",
                format!("'{}' object has no attribute '{}'", other.type_name(), name),
            )
        }),
    }
}
