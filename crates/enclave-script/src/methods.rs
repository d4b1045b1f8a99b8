//! Bound methods of the builtin value types
//!
//! Attribute access on a list, dict, str or bytes produces a host function
//! closed over the receiver.

use crate::builtins::check_arity;
use crate::ops::{self, int_like};
use enclave_core::{Exception, NativeFunction, Scope, Value};
use std::sync::Arc;

type Method = fn(&mut Scope<'_>, &Value, Vec<Value>) -> Result<Value, Exception>;

/// Resolve `receiver.name` to a bound method
pub fn bind(receiver: &Value, name: &str) -> Option<Value> {
    let method: Method = match (receiver, name) {
        (Value::List(_), "append") => list_append,
        (Value::List(_), "extend") => list_extend,
        (Value::List(_), "pop") => list_pop,
        (Value::List(_), "index") => list_index,
        (Value::Dict(_), "get") => dict_get,
        (Value::Dict(_), "keys") => dict_keys,
        (Value::Dict(_), "values") => dict_values,
        (Value::Dict(_), "items") => dict_items,
        (Value::Dict(_), "pop") => dict_pop,
        (Value::Str(_), "upper") => str_upper,
        (Value::Str(_), "lower") => str_lower,
        (Value::Str(_), "strip") => str_strip,
        (Value::Str(_), "split") => str_split,
        (Value::Str(_), "join") => str_join,
        (Value::Str(_), "startswith") => str_startswith,
        (Value::Str(_), "endswith") => str_endswith,
        (Value::Str(_), "replace") => str_replace,
        (Value::Str(_), "encode") => str_encode,
        (Value::Bytes(_), "decode") => bytes_decode,
        _ => return None,
    };

    let receiver = receiver.clone();
    let qualified = format!("{}.{}", receiver.type_name(), name);
    let native = NativeFunction::new(qualified, move |scope, args| method(scope, &receiver, args));
    Some(Value::Native(Arc::new(native)))
}

fn list_append(scope: &mut Scope<'_>, this: &Value, args: Vec<Value>) -> Result<Value, Exception> {
    check_arity("append", &args, 1, 1)?;
    if let Value::List(items) = this {
        scope.heap().allocate(std::mem::size_of::<Value>())?;
        items.write().extend(args);
    }
    Ok(Value::None)
}

fn list_extend(scope: &mut Scope<'_>, this: &Value, args: Vec<Value>) -> Result<Value, Exception> {
    check_arity("extend", &args, 1, 1)?;
    if let Value::List(items) = this {
        let more = ops::iterate(scope, &args[0])?;
        scope
            .heap()
            .allocate(more.len() * std::mem::size_of::<Value>())?;
        items.write().extend(more);
    }
    Ok(Value::None)
}

fn list_pop(_: &mut Scope<'_>, this: &Value, args: Vec<Value>) -> Result<Value, Exception> {
    check_arity("pop", &args, 0, 1)?;
    let Value::List(items) = this else {
        return Ok(Value::None);
    };
    let mut items = items.write();
    if items.is_empty() {
        return Err(Exception::with_message("IndexError", "pop from empty list"));
    }

    let len = items.len() as i64;
    let index = match args.first() {
        Some(arg) => int_like(arg).ok_or_else(|| {
            Exception::type_error(format!(
                "'{}' object cannot be interpreted as an integer",
                arg.type_name()
            ))
        })?,
        None => -1,
    };
    let index = if index < 0 { index + len } else { index };
    if !(0..len).contains(&index) {
        return Err(Exception::with_message("IndexError", "pop index out of range"));
    }
    Ok(items.remove(index as usize))
}

fn list_index(_: &mut Scope<'_>, this: &Value, args: Vec<Value>) -> Result<Value, Exception> {
    check_arity("index", &args, 1, 1)?;
    let Value::List(items) = this else {
        return Ok(Value::None);
    };
    let items = items.read().clone();
    for (i, item) in items.iter().enumerate() {
        if item.equals(&args[0])? {
            return Ok(Value::Int(i as i64));
        }
    }
    Err(Exception::value_error(format!("{} is not in list", args[0].repr())))
}

fn dict_get(_: &mut Scope<'_>, this: &Value, args: Vec<Value>) -> Result<Value, Exception> {
    check_arity("get", &args, 1, 2)?;
    let Value::Dict(entries) = this else {
        return Ok(Value::None);
    };
    let default = args.get(1).cloned().unwrap_or(Value::None);
    Ok(args[0]
        .as_str()
        .and_then(|key| entries.read().get(key).cloned())
        .unwrap_or(default))
}

fn dict_keys(scope: &mut Scope<'_>, this: &Value, args: Vec<Value>) -> Result<Value, Exception> {
    check_arity("keys", &args, 0, 0)?;
    let keys = ops::iterate(scope, this)?;
    scope.alloc_list(keys)
}

fn dict_values(scope: &mut Scope<'_>, this: &Value, args: Vec<Value>) -> Result<Value, Exception> {
    check_arity("values", &args, 0, 0)?;
    let Value::Dict(entries) = this else {
        return Ok(Value::None);
    };
    let values = entries.read().iter().map(|(_, v)| v.clone()).collect();
    scope.alloc_list(values)
}

fn dict_items(scope: &mut Scope<'_>, this: &Value, args: Vec<Value>) -> Result<Value, Exception> {
    check_arity("items", &args, 0, 0)?;
    let Value::Dict(entries) = this else {
        return Ok(Value::None);
    };
    let pairs: Vec<(String, Value)> = entries
        .read()
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    let items = pairs
        .into_iter()
        .map(|(k, v)| scope.alloc_tuple(vec![Value::from(k), v]))
        .collect::<Result<Vec<_>, _>>()?;
    scope.alloc_list(items)
}

fn dict_pop(_: &mut Scope<'_>, this: &Value, args: Vec<Value>) -> Result<Value, Exception> {
    check_arity("pop", &args, 1, 2)?;
    let Value::Dict(entries) = this else {
        return Ok(Value::None);
    };
    let removed = args[0].as_str().and_then(|key| entries.write().remove(key));
    match (removed, args.get(1)) {
        (Some(value), _) => Ok(value),
        (None, Some(default)) => Ok(default.clone()),
        (None, None) => Err(ops::key_error(&args[0])),
    }
}

fn text(this: &Value) -> &str {
    this.as_str().unwrap_or_default()
}

fn str_arg<'a>(method: &str, arg: &'a Value) -> Result<&'a str, Exception> {
    arg.as_str().ok_or_else(|| {
        Exception::type_error(format!(
            "{}() argument must be str, not {}",
            method,
            arg.type_name()
        ))
    })
}

fn str_upper(scope: &mut Scope<'_>, this: &Value, args: Vec<Value>) -> Result<Value, Exception> {
    check_arity("upper", &args, 0, 0)?;
    scope.alloc_str(text(this).to_uppercase())
}

fn str_lower(scope: &mut Scope<'_>, this: &Value, args: Vec<Value>) -> Result<Value, Exception> {
    check_arity("lower", &args, 0, 0)?;
    scope.alloc_str(text(this).to_lowercase())
}

fn str_strip(scope: &mut Scope<'_>, this: &Value, args: Vec<Value>) -> Result<Value, Exception> {
    check_arity("strip", &args, 0, 1)?;
    let stripped = match args.first() {
        None | Some(Value::None) => text(this).trim(),
        Some(chars) => {
            let chars = str_arg("strip", chars)?;
            text(this).trim_matches(|c: char| chars.contains(c))
        }
    };
    scope.alloc_str(stripped)
}

fn str_split(scope: &mut Scope<'_>, this: &Value, args: Vec<Value>) -> Result<Value, Exception> {
    check_arity("split", &args, 0, 1)?;
    let parts: Vec<&str> = match args.first() {
        None | Some(Value::None) => text(this).split_whitespace().collect(),
        Some(sep) => {
            let sep = str_arg("split", sep)?;
            if sep.is_empty() {
                return Err(Exception::value_error("empty separator"));
            }
            text(this).split(sep).collect()
        }
    };
    let items = parts
        .into_iter()
        .map(|part| scope.alloc_str(part))
        .collect::<Result<Vec<_>, _>>()?;
    scope.alloc_list(items)
}

fn str_join(scope: &mut Scope<'_>, this: &Value, args: Vec<Value>) -> Result<Value, Exception> {
    check_arity("join", &args, 1, 1)?;
    let items = ops::iterate(scope, &args[0])?;
    let mut parts = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        match item.as_str() {
            Some(s) => parts.push(s),
            None => {
                return Err(Exception::type_error(format!(
                    "sequence item {}: expected str instance, {} found",
                    i,
                    item.type_name()
                )))
            }
        }
    }
    scope.alloc_str(parts.join(text(this)))
}

fn str_startswith(_: &mut Scope<'_>, this: &Value, args: Vec<Value>) -> Result<Value, Exception> {
    check_arity("startswith", &args, 1, 1)?;
    Ok(Value::Bool(text(this).starts_with(str_arg("startswith", &args[0])?)))
}

fn str_endswith(_: &mut Scope<'_>, this: &Value, args: Vec<Value>) -> Result<Value, Exception> {
    check_arity("endswith", &args, 1, 1)?;
    Ok(Value::Bool(text(this).ends_with(str_arg("endswith", &args[0])?)))
}

fn str_replace(scope: &mut Scope<'_>, this: &Value, args: Vec<Value>) -> Result<Value, Exception> {
    check_arity("replace", &args, 2, 2)?;
    let from = str_arg("replace", &args[0])?;
    let to = str_arg("replace", &args[1])?;
    scope.alloc_str(text(this).replace(from, to))
}

fn str_encode(scope: &mut Scope<'_>, this: &Value, args: Vec<Value>) -> Result<Value, Exception> {
    check_arity("encode", &args, 0, 1)?;
    if let Some(encoding) = args.first() {
        let encoding = str_arg("encode", encoding)?;
        if !matches!(encoding, "utf-8" | "utf8" | "UTF-8") {
            return Err(Exception::with_message(
                "LookupError",
                format!("unknown encoding: {}", encoding),
            ));
        }
    }
    scope.alloc_bytes(text(this).as_bytes().to_vec())
}

fn bytes_decode(scope: &mut Scope<'_>, this: &Value, args: Vec<Value>) -> Result<Value, Exception> {
    check_arity("decode", &args, 0, 1)?;
    let bytes = this.as_bytes().unwrap_or_default();
    match std::str::from_utf8(bytes) {
        Ok(decoded) => scope.alloc_str(decoded),
        Err(err) => Err(Exception::with_message(
            "UnicodeDecodeError",
            format!("'utf-8' codec can't decode bytes: {}", err),
        )),
    }
}
