//! Operators on values: arithmetic, comparison, membership, subscripts
//!
//! Every function that creates a container or text value allocates it on
//! the heap of the scope's context.

use crate::ast::{BinaryOp, CompareOp};
use enclave_core::{Exception, Namespace, Scope, Value};
use std::cmp::Ordering;
use std::sync::Arc;

/// Upper bound on the length of sequences built by repetition or `range`
pub const MAX_SEQUENCE_LEN: usize = 1 << 28;

pub fn overflow() -> Exception {
    Exception::with_message("OverflowError", "integer overflow")
}

/// Integer view of `int` and `bool`
pub fn int_like(value: &Value) -> Option<i64> {
    match value {
        Value::Bool(b) => Some(*b as i64),
        Value::Int(i) => Some(*i),
        _ => None,
    }
}

fn is_number(value: &Value) -> bool {
    matches!(value, Value::Bool(_) | Value::Int(_) | Value::Float(_))
}

fn unsupported(op: &str, left: &Value, right: &Value) -> Exception {
    Exception::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op,
        left.type_name(),
        right.type_name()
    ))
}

/// Evaluate `left op right`
pub fn binary(scope: &Scope<'_>, op: BinaryOp, left: &Value, right: &Value) -> Result<Value, Exception> {
    if let (Some(a), Some(b)) = (int_like(left), int_like(right)) {
        return int_binary(op, a, b);
    }
    if is_number(left) && is_number(right) {
        if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
            return float_binary(op, a, b);
        }
    }

    match (op, left, right) {
        (BinaryOp::Add, Value::Str(a), Value::Str(b)) => {
            let mut text = String::with_capacity(a.len() + b.len());
            text.push_str(a);
            text.push_str(b);
            scope.alloc_str(text)
        }
        (BinaryOp::Add, Value::Bytes(a), Value::Bytes(b)) => scope.alloc_bytes([&a[..], &b[..]].concat()),
        (BinaryOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
            scope.alloc_tuple(a.iter().chain(b.iter()).cloned().collect())
        }
        (BinaryOp::Add, Value::List(a), Value::List(b)) => {
            let mut items = a.read().clone();
            items.extend(b.read().iter().cloned());
            scope.alloc_list(items)
        }
        (BinaryOp::Mul, seq, count) | (BinaryOp::Mul, count, seq)
            if int_like(count).is_some() && !is_number(seq) =>
        {
            let times = int_like(count).unwrap_or(0);
            repeat(scope, seq, times)
                .unwrap_or_else(|| Err(unsupported(op.symbol(), left, right)))
        }
        _ => Err(unsupported(op.symbol(), left, right)),
    }
}

fn repeat(scope: &Scope<'_>, seq: &Value, times: i64) -> Option<Result<Value, Exception>> {
    let times = times.max(0) as usize;
    let len = match seq {
        Value::Str(s) => s.len(),
        Value::Bytes(b) => b.len(),
        Value::Tuple(t) => t.len(),
        Value::List(l) => l.read().len(),
        _ => return None,
    };
    match len.checked_mul(times) {
        Some(total) if total <= MAX_SEQUENCE_LEN => {}
        _ => return Some(Err(Exception::with_message("MemoryError", "repeated sequence too large"))),
    }

    Some(match seq {
        Value::Str(s) => scope.alloc_str(s.repeat(times)),
        Value::Bytes(b) => scope.alloc_bytes(b.repeat(times)),
        Value::Tuple(t) => scope.alloc_tuple(repeat_items(t, times)),
        Value::List(l) => {
            let items = repeat_items(&l.read(), times);
            scope.alloc_list(items)
        }
        _ => return None,
    })
}

fn repeat_items(items: &[Value], times: usize) -> Vec<Value> {
    items.iter().cycle().take(items.len() * times).cloned().collect()
}

fn int_binary(op: BinaryOp, a: i64, b: i64) -> Result<Value, Exception> {
    let zero_div = || Exception::with_message("ZeroDivisionError", "integer division or modulo by zero");
    let result = match op {
        BinaryOp::Add => a.checked_add(b).ok_or_else(overflow)?,
        BinaryOp::Sub => a.checked_sub(b).ok_or_else(overflow)?,
        BinaryOp::Mul => a.checked_mul(b).ok_or_else(overflow)?,
        BinaryOp::Div => {
            if b == 0 {
                return Err(Exception::with_message("ZeroDivisionError", "division by zero"));
            }
            return Ok(Value::Float(a as f64 / b as f64));
        }
        BinaryOp::FloorDiv => {
            if b == 0 {
                return Err(zero_div());
            }
            let q = a.checked_div(b).ok_or_else(overflow)?;
            if a % b != 0 && ((a < 0) != (b < 0)) {
                q - 1
            } else {
                q
            }
        }
        BinaryOp::Mod => {
            if b == 0 {
                return Err(zero_div());
            }
            let r = a.checked_rem(b).unwrap_or(0);
            if r != 0 && ((r < 0) != (b < 0)) {
                r + b
            } else {
                r
            }
        }
        BinaryOp::Pow => {
            if b < 0 {
                if a == 0 {
                    return Err(Exception::with_message(
                        "ZeroDivisionError",
                        "0.0 cannot be raised to a negative power",
                    ));
                }
                return Ok(Value::Float((a as f64).powf(b as f64)));
            }
            let exp = u32::try_from(b).map_err(|_| overflow())?;
            a.checked_pow(exp).ok_or_else(overflow)?
        }
    };
    Ok(Value::Int(result))
}

fn float_binary(op: BinaryOp, a: f64, b: f64) -> Result<Value, Exception> {
    let zero = |what: &str| Exception::with_message("ZeroDivisionError", what.to_string());
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(zero("float division by zero"));
            }
            a / b
        }
        BinaryOp::FloorDiv => {
            if b == 0.0 {
                return Err(zero("float floor division by zero"));
            }
            (a / b).floor()
        }
        BinaryOp::Mod => {
            if b == 0.0 {
                return Err(zero("float modulo"));
            }
            let r = a % b;
            if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
                r + b
            } else {
                r
            }
        }
        BinaryOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(zero("0.0 cannot be raised to a negative power"));
            }
            a.powf(b)
        }
    };
    Ok(Value::Float(result))
}

/// Evaluate one link of a comparison chain
pub fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, Exception> {
    match op {
        CompareOp::Eq => left.equals(right),
        CompareOp::NotEq => left.equals(right).map(|equal| !equal),
        CompareOp::In => contains(right, left),
        CompareOp::NotIn => contains(right, left).map(|found| !found),
        CompareOp::Is => Ok(is_same(left, right)),
        CompareOp::IsNot => Ok(!is_same(left, right)),
        CompareOp::Lt | CompareOp::LtE | CompareOp::Gt | CompareOp::GtE => {
            let ordering = order(left, right, op.symbol())?;
            Ok(match (op, ordering) {
                (_, None) => false,
                (CompareOp::Lt, Some(o)) => o == Ordering::Less,
                (CompareOp::LtE, Some(o)) => o != Ordering::Greater,
                (CompareOp::Gt, Some(o)) => o == Ordering::Greater,
                (_, Some(o)) => o != Ordering::Less,
            })
        }
    }
}

/// Ordering for `<` and friends; `None` when unordered (NaN)
pub fn order(left: &Value, right: &Value, symbol: &str) -> Result<Option<Ordering>, Exception> {
    if let (Some(a), Some(b)) = (int_like(left), int_like(right)) {
        return Ok(Some(a.cmp(&b)));
    }
    if is_number(left) && is_number(right) {
        if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
            return Ok(a.partial_cmp(&b));
        }
    }

    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
        (Value::Bytes(a), Value::Bytes(b)) => Ok(Some(a.cmp(b))),
        (Value::Tuple(a), Value::Tuple(b)) => order_items(a, b, symbol),
        (Value::List(a), Value::List(b)) => {
            let a = a.read().clone();
            let b = b.read().clone();
            order_items(&a, &b, symbol)
        }
        _ => Err(Exception::type_error(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            symbol,
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn order_items(a: &[Value], b: &[Value], symbol: &str) -> Result<Option<Ordering>, Exception> {
    for (x, y) in a.iter().zip(b) {
        if !x.equals(y)? {
            return order(x, y, symbol);
        }
    }
    Ok(Some(a.len().cmp(&b.len())))
}

/// Identity test
pub fn is_same(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::None, Value::None) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
        (Value::Str(a), Value::Str(b)) => Arc::ptr_eq(a, b),
        (Value::Bytes(a), Value::Bytes(b)) => Arc::ptr_eq(a, b),
        (Value::Tuple(a), Value::Tuple(b)) => Arc::ptr_eq(a, b),
        (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
        (Value::Dict(a), Value::Dict(b)) => Arc::ptr_eq(a, b),
        (Value::Type(a), Value::Type(b)) => a == b,
        (a, b) if a.kind() == b.kind() => a == b,
        _ => false,
    }
}

fn contains_item(items: &[Value], item: &Value) -> Result<bool, Exception> {
    for candidate in items {
        if candidate.equals(item)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// `item in container`
pub fn contains(container: &Value, item: &Value) -> Result<bool, Exception> {
    match container {
        Value::Str(haystack) => match item {
            Value::Str(needle) => Ok(haystack.contains(&**needle)),
            other => Err(Exception::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::Bytes(haystack) => match item {
            Value::Bytes(needle) => Ok(needle.is_empty()
                || haystack.windows(needle.len()).any(|w| w == &needle[..])),
            other => match int_like(other) {
                Some(byte) => Ok(haystack.iter().any(|&b| b as i64 == byte)),
                None => Err(Exception::type_error(format!(
                    "a bytes-like object is required, not '{}'",
                    other.type_name()
                ))),
            },
        },
        Value::Tuple(items) => contains_item(items, item),
        Value::List(items) => {
            let items = items.read().clone();
            contains_item(&items, item)
        }
        Value::Dict(entries) => Ok(item.as_str().is_some_and(|key| entries.read().contains(key))),
        other => Err(Exception::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

/// Snapshot of the items produced by iterating `value`
pub fn iterate(scope: &Scope<'_>, value: &Value) -> Result<Vec<Value>, Exception> {
    match value {
        Value::Str(s) => s
            .chars()
            .map(|c| scope.alloc_str(c.to_string()))
            .collect(),
        Value::Bytes(b) => Ok(b.iter().map(|&byte| Value::Int(byte as i64)).collect()),
        Value::Tuple(items) => Ok(items.to_vec()),
        Value::List(items) => Ok(items.read().clone()),
        Value::Dict(entries) => Ok(entries.read().names().map(Value::from).collect()),
        other => Err(Exception::type_error(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}

fn normalize_index(index: &Value, len: usize, what: &str) -> Result<Option<usize>, Exception> {
    let Some(i) = int_like(index) else {
        return Err(Exception::type_error(format!(
            "{} indices must be integers, not {}",
            what,
            index.type_name()
        )));
    };
    let len = len as i64;
    let i = if i < 0 { i + len } else { i };
    Ok((0..len).contains(&i).then_some(i as usize))
}

fn index_error(what: &str) -> Exception {
    Exception::with_message("IndexError", format!("{} index out of range", what))
}

pub fn key_error(key: &Value) -> Exception {
    Exception::new("KeyError", vec![key.clone()])
}

/// Keys of dicts are text
pub fn dict_key<'v>(key: &'v Value) -> Result<&'v str, Exception> {
    key.as_str().ok_or_else(|| {
        Exception::type_error(format!("dict keys must be str, not '{}'", key.type_name()))
    })
}

/// `object[index]`
pub fn subscript(scope: &Scope<'_>, object: &Value, index: &Value) -> Result<Value, Exception> {
    match object {
        Value::List(items) => {
            let items = items.read();
            let i = normalize_index(index, items.len(), "list")?.ok_or_else(|| index_error("list"))?;
            Ok(items[i].clone())
        }
        Value::Tuple(items) => {
            let i = normalize_index(index, items.len(), "tuple")?.ok_or_else(|| index_error("tuple"))?;
            Ok(items[i].clone())
        }
        Value::Str(s) => {
            let count = s.chars().count();
            let i = normalize_index(index, count, "string")?.ok_or_else(|| index_error("string"))?;
            let c = s.chars().nth(i).ok_or_else(|| index_error("string"))?;
            scope.alloc_str(c.to_string())
        }
        Value::Bytes(b) => {
            let i = normalize_index(index, b.len(), "byte")?.ok_or_else(|| index_error(""))?;
            Ok(Value::Int(b[i] as i64))
        }
        Value::Dict(entries) => {
            let key = dict_key(index).map_err(|_| key_error(index))?;
            entries.read().get(key).cloned().ok_or_else(|| key_error(index))
        }
        other => Err(Exception::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// `object[index] = value`
pub fn store_subscript(object: &Value, index: &Value, value: Value) -> Result<(), Exception> {
    match object {
        Value::List(items) => {
            let mut items = items.write();
            let i = normalize_index(index, items.len(), "list")?
                .ok_or_else(|| index_error("list assignment"))?;
            items[i] = value;
            Ok(())
        }
        Value::Dict(entries) => {
            let key = dict_key(index)?;
            entries.write().insert(key, value);
            Ok(())
        }
        other => Err(Exception::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

/// `del object[index]`
pub fn delete_subscript(object: &Value, index: &Value) -> Result<(), Exception> {
    match object {
        Value::List(items) => {
            let mut items = items.write();
            let i = normalize_index(index, items.len(), "list")?
                .ok_or_else(|| index_error("list assignment"))?;
            items.remove(i);
            Ok(())
        }
        Value::Dict(entries) => {
            let key = dict_key(index).map_err(|_| key_error(index))?;
            entries.write().remove(key).map(|_| ()).ok_or_else(|| key_error(index))
        }
        other => Err(Exception::type_error(format!(
            "'{}' object does not support item deletion",
            other.type_name()
        ))),
    }
}

/// Build a dict from evaluated entries
pub fn build_dict(scope: &Scope<'_>, entries: Vec<(Value, Value)>) -> Result<Value, Exception> {
    let mut namespace = Namespace::new();
    for (key, value) in entries {
        namespace.insert(dict_key(&key)?, value);
    }
    scope.alloc_dict(namespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use enclave_core::ContextRegistry;

    fn with_scope<R>(f: impl FnOnce(&mut Scope<'_>) -> R) -> R {
        let registry = ContextRegistry::new();
        let main = registry.main();
        let mut ns = main.namespace();
        let mut scope = Scope::new(&main, &mut ns);
        f(&mut scope)
    }

    #[test]
    fn test_integer_arithmetic() {
        with_scope(|scope| {
            let b = |op, x: i64, y: i64| binary(scope, op, &Value::Int(x), &Value::Int(y));
            assert_eq!(b(BinaryOp::Add, 2, 3).unwrap(), Value::Int(5));
            assert_eq!(b(BinaryOp::FloorDiv, -7, 2).unwrap(), Value::Int(-4));
            assert_eq!(b(BinaryOp::Mod, -7, 2).unwrap(), Value::Int(1));
            assert_eq!(b(BinaryOp::Mod, 7, -2).unwrap(), Value::Int(-1));
            assert_eq!(b(BinaryOp::Div, 7, 2).unwrap(), Value::Float(3.5));
            assert_eq!(b(BinaryOp::Pow, 2, 10).unwrap(), Value::Int(1024));
            assert_eq!(b(BinaryOp::Pow, 2, -1).unwrap(), Value::Float(0.5));
            assert!(b(BinaryOp::Div, 1, 0).unwrap_err().is("ZeroDivisionError"));
            assert!(b(BinaryOp::Mod, 1, 0).unwrap_err().is("ZeroDivisionError"));
            assert!(b(BinaryOp::Mul, i64::MAX, 2).unwrap_err().is("OverflowError"));
            assert!(b(BinaryOp::FloorDiv, i64::MIN, -1).unwrap_err().is("OverflowError"));
        });
    }

    #[test]
    fn test_mixed_arithmetic_promotes() {
        with_scope(|scope| {
            let v = binary(scope, BinaryOp::Add, &Value::Int(1), &Value::Float(0.5)).unwrap();
            assert_eq!(v, Value::Float(1.5));
            let v = binary(scope, BinaryOp::Add, &Value::Bool(true), &Value::Int(1)).unwrap();
            assert_eq!(v, Value::Int(2));
        });
    }

    #[test]
    fn test_sequence_operators() {
        with_scope(|scope| {
            let v = binary(scope, BinaryOp::Add, &Value::from("ab"), &Value::from("cd")).unwrap();
            assert_eq!(v, Value::from("abcd"));
            let v = binary(scope, BinaryOp::Mul, &Value::Int(3), &Value::from("x")).unwrap();
            assert_eq!(v, Value::from("xxx"));
            let v = binary(scope, BinaryOp::Mul, &Value::list(vec![Value::Int(1)]), &Value::Int(-1)).unwrap();
            assert_eq!(v, Value::list(vec![]));

            let err = binary(scope, BinaryOp::Add, &Value::from("a"), &Value::Int(1)).unwrap_err();
            assert!(err.is("TypeError"));
            assert_eq!(err.message(), "unsupported operand type(s) for +: 'str' and 'int'");
        });
    }

    #[test]
    fn test_comparisons() {
        assert!(compare(CompareOp::Lt, &Value::Int(1), &Value::Float(1.5)).unwrap());
        assert!(compare(CompareOp::GtE, &Value::from("b"), &Value::from("a")).unwrap());
        assert!(!compare(CompareOp::Lt, &Value::Float(f64::NAN), &Value::Int(1)).unwrap());
        assert!(compare(
            CompareOp::Lt,
            &Value::tuple(vec![Value::Int(1), Value::Int(2)]),
            &Value::tuple(vec![Value::Int(1), Value::Int(3)])
        )
        .unwrap());

        let err = compare(CompareOp::Lt, &Value::from("a"), &Value::Int(1)).unwrap_err();
        assert_eq!(err.message(), "'<' not supported between instances of 'str' and 'int'");
    }

    #[test]
    fn test_membership() {
        assert!(contains(&Value::from("hello"), &Value::from("ell")).unwrap());
        assert!(contains(&Value::list(vec![Value::Int(2)]), &Value::Float(2.0)).unwrap());
        assert!(contains(&Value::from("x"), &Value::Int(1)).is_err());

        let d = Value::dict(vec![("k", Value::None)].into_iter().collect());
        assert!(contains(&d, &Value::from("k")).unwrap());
        assert!(!contains(&d, &Value::Int(1)).unwrap());
    }

    #[test]
    fn test_identity() {
        let list = Value::list(vec![]);
        assert!(is_same(&list, &list.clone()));
        assert!(!is_same(&list, &Value::list(vec![])));
        assert!(is_same(&Value::None, &Value::None));
        assert!(!is_same(&Value::Int(1), &Value::Bool(true)));
    }

    #[test]
    fn test_subscripts() {
        with_scope(|scope| {
            let list = Value::list(vec![Value::Int(1), Value::Int(2)]);
            assert_eq!(subscript(scope, &list, &Value::Int(-1)).unwrap(), Value::Int(2));
            assert!(subscript(scope, &list, &Value::Int(2)).unwrap_err().is("IndexError"));
            assert!(subscript(scope, &list, &Value::from("0")).unwrap_err().is("TypeError"));

            store_subscript(&list, &Value::Int(0), Value::from("a")).unwrap();
            assert_eq!(subscript(scope, &list, &Value::Int(0)).unwrap(), Value::from("a"));

            let d = Value::dict(Namespace::new());
            store_subscript(&d, &Value::from("k"), Value::Int(5)).unwrap();
            assert_eq!(subscript(scope, &d, &Value::from("k")).unwrap(), Value::Int(5));
            assert!(subscript(scope, &d, &Value::from("x")).unwrap_err().is("KeyError"));
            delete_subscript(&d, &Value::from("k")).unwrap();
            assert!(delete_subscript(&d, &Value::from("k")).unwrap_err().is("KeyError"));

            let t = Value::tuple(vec![Value::Int(1)]);
            assert!(store_subscript(&t, &Value::Int(0), Value::None).unwrap_err().is("TypeError"));
            assert_eq!(subscript(scope, &Value::from("héllo"), &Value::Int(1)).unwrap(), Value::from("é"));
        });
    }

    #[test]
    fn test_iterate() {
        with_scope(|scope| {
            assert_eq!(
                iterate(scope, &Value::from("ab")).unwrap(),
                vec![Value::from("a"), Value::from("b")]
            );
            assert_eq!(iterate(scope, &Value::from(&b"\x01"[..])).unwrap(), vec![Value::Int(1)]);
            assert!(iterate(scope, &Value::Int(3)).unwrap_err().is("TypeError"));
        });
    }
}
