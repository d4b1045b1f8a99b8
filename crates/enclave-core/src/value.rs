//! Value representation for execution contexts
//!
//! Values belong to the context whose namespace holds them. Scalars are
//! stored inline; strings, byte strings and containers are reference
//! counted and accounted to the heap of the context that allocated them.
//! Nothing in this module knows how to move a value into another context;
//! that is the job of [`crate::share`].

use crate::eval::Scope;
use crate::exception::Exception;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// Maximum nesting rendered by `repr` before eliding with `...`
const MAX_REPR_DEPTH: usize = 32;

/// Maximum container nesting `==` descends before raising `RecursionError`
const MAX_COMPARE_DEPTH: usize = 200;

/// Runtime type tag of a [`Value`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueKind {
    /// `None`
    NoneType,
    /// `True` / `False`
    Bool,
    /// 64-bit signed integer
    Int,
    /// 64-bit float
    Float,
    /// Immutable text
    Str,
    /// Immutable byte string
    Bytes,
    /// Immutable sequence
    Tuple,
    /// Mutable sequence
    List,
    /// Mutable name-keyed mapping
    Dict,
    /// Host function
    Native,
    /// Host module
    Module,
    /// Exception type
    Type,
    /// Exception instance
    Exception,
}

impl ValueKind {
    /// Name of the type as seen from scripts
    pub const fn name(self) -> &'static str {
        match self {
            ValueKind::NoneType => "NoneType",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Str => "str",
            ValueKind::Bytes => "bytes",
            ValueKind::Tuple => "tuple",
            ValueKind::List => "list",
            ValueKind::Dict => "dict",
            ValueKind::Native => "builtin_function_or_method",
            ValueKind::Module => "module",
            ValueKind::Type => "type",
            ValueKind::Exception => "exception",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Signature of a host function callable from scripts
pub type NativeFn =
    Arc<dyn Fn(&mut Scope<'_>, Vec<Value>) -> Result<Value, Exception> + Send + Sync>;

/// A named host function
pub struct NativeFunction {
    name: String,
    params: Vec<String>,
    func: NativeFn,
}

impl NativeFunction {
    /// Wrap a closure as a host function
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut Scope<'_>, Vec<Value>) -> Result<Value, Exception> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            params: Vec::new(),
            func: Arc::new(func),
        }
    }

    /// Name the positional parameters so callers may pass them by keyword
    pub fn with_params(mut self, params: &[&str]) -> Self {
        self.params = params.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Function name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameter names accepted as keywords, in positional order
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Invoke the function inside `scope`
    pub fn call(&self, scope: &mut Scope<'_>, args: Vec<Value>) -> Result<Value, Exception> {
        (self.func)(scope, args)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .finish()
    }
}

/// A host module: a name plus a fixed attribute table
#[derive(Debug)]
pub struct Module {
    name: String,
    attrs: Namespace,
}

impl Module {
    /// Create an empty module
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Namespace::new(),
        }
    }

    /// Add an attribute
    pub fn with_attr(mut self, name: &str, value: Value) -> Self {
        self.attrs.insert(name, value);
        self
    }

    /// Add a host function attribute
    pub fn with_function<F>(self, name: &str, func: F) -> Self
    where
        F: Fn(&mut Scope<'_>, Vec<Value>) -> Result<Value, Exception> + Send + Sync + 'static,
    {
        self.with_native(NativeFunction::new(name, func))
    }

    /// Add a prepared host function, keeping its keyword parameters
    pub fn with_native(self, native: NativeFunction) -> Self {
        let name = native.name().to_string();
        self.with_attr(&name, Value::Native(Arc::new(native)))
    }

    /// Module name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up an attribute
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }

    /// All attributes in definition order
    pub fn attrs(&self) -> &Namespace {
        &self.attrs
    }
}

/// A value living inside one execution context
#[derive(Clone)]
pub enum Value {
    /// `None`
    None,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// Text
    Str(Arc<str>),
    /// Byte string
    Bytes(Arc<[u8]>),
    /// Immutable sequence
    Tuple(Arc<[Value]>),
    /// Mutable sequence
    List(Arc<RwLock<Vec<Value>>>),
    /// Mutable mapping with string keys
    Dict(Arc<RwLock<Namespace>>),
    /// Host function
    Native(Arc<NativeFunction>),
    /// Host module
    Module(Arc<Module>),
    /// Exception type, identified by name
    Type(Arc<str>),
    /// Exception instance
    Exception(Arc<Exception>),
}

impl Value {
    /// Build a list value
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Arc::new(RwLock::new(items)))
    }

    /// Build a dict value
    pub fn dict(entries: Namespace) -> Self {
        Value::Dict(Arc::new(RwLock::new(entries)))
    }

    /// Build a tuple value
    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(items.into())
    }

    /// Runtime type tag
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::None => ValueKind::NoneType,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Str(_) => ValueKind::Str,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Tuple(_) => ValueKind::Tuple,
            Value::List(_) => ValueKind::List,
            Value::Dict(_) => ValueKind::Dict,
            Value::Native(_) => ValueKind::Native,
            Value::Module(_) => ValueKind::Module,
            Value::Type(_) => ValueKind::Type,
            Value::Exception(_) => ValueKind::Exception,
        }
    }

    /// Type name as seen from scripts
    pub fn type_name(&self) -> &'static str {
        self.kind().name()
    }

    /// Check if this value is `None`
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Truthiness
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::Tuple(t) => !t.is_empty(),
            Value::List(l) => !l.read().is_empty(),
            Value::Dict(d) => !d.read().is_empty(),
            _ => true,
        }
    }

    /// Extract an integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Extract a number as float (bool and int widen)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Extract text
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Extract bytes
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Text form, as produced by `str(value)`
    pub fn to_str(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            Value::Exception(exc) => exc.message(),
            _ => self.repr(),
        }
    }

    /// Debug form, as produced by `repr(value)`
    pub fn repr(&self) -> String {
        let mut out = String::new();
        self.write_repr(&mut out, 0);
        out
    }

    fn write_repr(&self, out: &mut String, depth: usize) {
        if depth > MAX_REPR_DEPTH {
            out.push_str("...");
            return;
        }
        match self {
            Value::None => out.push_str("None"),
            Value::Bool(true) => out.push_str("True"),
            Value::Bool(false) => out.push_str("False"),
            Value::Int(i) => out.push_str(&i.to_string()),
            Value::Float(f) => out.push_str(&format_float(*f)),
            Value::Str(s) => write_quoted(out, s),
            Value::Bytes(b) => write_bytes(out, b),
            Value::Tuple(items) => {
                out.push('(');
                write_items(out, items.iter(), depth);
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
            }
            Value::List(items) => {
                out.push('[');
                write_items(out, items.read().iter(), depth);
                out.push(']');
            }
            Value::Dict(entries) => {
                out.push('{');
                for (i, (key, value)) in entries.read().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    write_quoted(out, key);
                    out.push_str(": ");
                    value.write_repr(out, depth + 1);
                }
                out.push('}');
            }
            Value::Native(func) => {
                out.push_str("<built-in function ");
                out.push_str(func.name());
                out.push('>');
            }
            Value::Module(module) => {
                out.push_str("<module '");
                out.push_str(module.name());
                out.push_str("'>");
            }
            Value::Type(name) => {
                out.push_str("<class '");
                out.push_str(name);
                out.push_str("'>");
            }
            Value::Exception(exc) => {
                out.push_str(exc.kind());
                out.push('(');
                write_items(out, exc.args().iter(), depth);
                out.push(')');
            }
        }
    }
}

fn write_items<'a>(out: &mut String, items: impl Iterator<Item = &'a Value>, depth: usize) {
    for (i, item) in items.enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        item.write_repr(out, depth + 1);
    }
}

fn write_quoted(out: &mut String, s: &str) {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push(quote);
}

fn write_bytes(out: &mut String, bytes: &[u8]) {
    out.push_str("b'");
    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\x{:02x}", b)),
        }
    }
    out.push('\'');
}

/// Render a float the way scripts print it (`1.0`, `0.5`, `inf`, `nan`)
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "inf" } else { "-inf" }.to_string()
    } else {
        format!("{:?}", f)
    }
}

impl Value {
    /// Structural equality as scripts see it
    ///
    /// Containers nested deeper than the comparison limit, distinct
    /// self-containing ones included, raise `RecursionError`.
    pub fn equals(&self, other: &Value) -> Result<bool, Exception> {
        self.eq_depth(other, 0)
    }

    fn eq_depth(&self, other: &Value, depth: usize) -> Result<bool, Exception> {
        if depth > MAX_COMPARE_DEPTH {
            return Err(Exception::with_message(
                "RecursionError",
                "maximum recursion depth exceeded in comparison",
            ));
        }
        let equal = match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => {
                Arc::ptr_eq(a, b) || items_eq(a, b, depth)?
            }
            (Value::List(a), Value::List(b)) => {
                if Arc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let (a, b) = (a.read().clone(), b.read().clone());
                items_eq(&a, &b, depth)?
            }
            (Value::Dict(a), Value::Dict(b)) => {
                if Arc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let (a, b) = (a.read().clone(), b.read().clone());
                a.eq_depth(&b, depth)?
            }
            (Value::Native(a), Value::Native(b)) => Arc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Arc::ptr_eq(a, b),
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::Exception(a), Value::Exception(b)) => Arc::ptr_eq(a, b),
            (Value::Int(a), Value::Int(b)) => a == b,
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        };
        Ok(equal)
    }
}

fn items_eq(a: &[Value], b: &[Value], depth: usize) -> Result<bool, Exception> {
    if a.len() != b.len() {
        return Ok(false);
    }
    for (x, y) in a.iter().zip(b) {
        if !x.eq_depth(y, depth + 1)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Host-side equality; comparisons too deep to decide count as unequal.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other).unwrap_or(false)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_str())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(Arc::from(b))
    }
}

/// Insertion-ordered mapping of names to values
///
/// Used both as a context's global namespace and as the "shared" mapping
/// handed to the script runner.
#[derive(Clone, Default)]
pub struct Namespace {
    entries: Vec<(Arc<str>, Value)>,
    index: FxHashMap<Arc<str>, usize>,
}

impl Namespace {
    /// Create an empty namespace
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no bindings
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a binding
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.index.get(name).map(|&i| &self.entries[i].1)
    }

    /// Check if a name is bound
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Bind a name, returning the previous value
    ///
    /// Rebinding keeps the name's original position.
    pub fn insert(&mut self, name: impl Into<Arc<str>>, value: Value) -> Option<Value> {
        let name = name.into();
        if let Some(&i) = self.index.get(&*name) {
            return Some(std::mem::replace(&mut self.entries[i].1, value));
        }
        self.index.insert(name.clone(), self.entries.len());
        self.entries.push((name, value));
        None
    }

    /// Unbind a name
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let i = self.index.remove(name)?;
        let (_, value) = self.entries.remove(i);
        for slot in self.index.values_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }
        Some(value)
    }

    /// Remove every binding
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Iterate bindings in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (&**k, v))
    }

    /// Iterate names in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| &**k)
    }
}

impl Namespace {
    fn eq_depth(&self, other: &Namespace, depth: usize) -> Result<bool, Exception> {
        if self.len() != other.len() {
            return Ok(false);
        }
        for (name, value) in self.iter() {
            match other.get(name) {
                Some(theirs) if value.eq_depth(theirs, depth + 1)? => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }
}

impl PartialEq for Namespace {
    fn eq(&self, other: &Self) -> bool {
        self.eq_depth(other, 0).unwrap_or(false)
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Into<Arc<str>>> FromIterator<(K, Value)> for Namespace {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut ns = Namespace::new();
        for (name, value) in iter {
            ns.insert(name, value);
        }
        ns
    }
}
