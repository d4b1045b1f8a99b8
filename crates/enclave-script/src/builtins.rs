//! Builtin functions and exception types

use crate::ops::{self, int_like, MAX_SEQUENCE_LEN};
use enclave_core::{Exception, Namespace, NativeFunction, Scope, Value};
use std::sync::Arc;

/// Destination of `print`
pub type OutputSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Exception types visible to every script
pub const EXCEPTION_TYPES: &[&str] = &[
    "BaseException",
    "Exception",
    "ArithmeticError",
    "AssertionError",
    "AttributeError",
    "ImportError",
    "IndexError",
    "KeyError",
    "LookupError",
    "MemoryError",
    "ModuleNotFoundError",
    "NameError",
    "OverflowError",
    "RecursionError",
    "RuntimeError",
    "SyntaxError",
    "TypeError",
    "UnicodeDecodeError",
    "ValueError",
    "ZeroDivisionError",
];

fn parent_of(kind: &str) -> Option<&'static str> {
    match kind {
        "BaseException" => None,
        "Exception" => Some("BaseException"),
        "ModuleNotFoundError" => Some("ImportError"),
        "KeyError" | "IndexError" => Some("LookupError"),
        "ZeroDivisionError" | "OverflowError" => Some("ArithmeticError"),
        "RunFailedError" | "RecursionError" => Some("RuntimeError"),
        "UnicodeDecodeError" => Some("ValueError"),
        _ => Some("Exception"),
    }
}

/// Whether exception `kind` is `ancestor` or derives from it
///
/// Kinds not in the builtin hierarchy derive directly from `Exception`.
pub fn is_subclass(kind: &str, ancestor: &str) -> bool {
    let mut current = kind;
    loop {
        if current == ancestor {
            return true;
        }
        match parent_of(current) {
            Some(parent) => current = parent,
            None => return false,
        }
    }
}

/// Raise `TypeError` unless `min <= args.len() <= max`
pub fn check_arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), Exception> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    let expected = if min == max {
        format!("exactly {}", min)
    } else if args.len() < min {
        format!("at least {}", min)
    } else {
        format!("at most {}", max)
    };
    Err(Exception::type_error(format!(
        "{}() takes {} argument{} ({} given)",
        name,
        expected,
        if min == max && min == 1 { "" } else { "s" },
        args.len()
    )))
}

fn native<F>(name: &str, func: F) -> (String, Value)
where
    F: Fn(&mut Scope<'_>, Vec<Value>) -> Result<Value, Exception> + Send + Sync + 'static,
{
    (name.to_string(), Value::Native(Arc::new(NativeFunction::new(name, func))))
}

/// Build the builtin namespace
pub fn builtins(output: OutputSink) -> Namespace {
    let mut ns = Namespace::new();

    let functions = vec![
        native("len", |_, args| {
            check_arity("len", &args, 1, 1)?;
            let len = match &args[0] {
                Value::Str(s) => s.chars().count(),
                Value::Bytes(b) => b.len(),
                Value::Tuple(t) => t.len(),
                Value::List(l) => l.read().len(),
                Value::Dict(d) => d.read().len(),
                other => {
                    return Err(Exception::type_error(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )))
                }
            };
            Ok(Value::Int(len as i64))
        }),
        native("str", |scope, args| {
            check_arity("str", &args, 0, 1)?;
            match args.first() {
                None => scope.alloc_str(""),
                Some(value @ Value::Str(_)) => Ok(value.clone()),
                Some(value) => scope.alloc_str(value.to_str()),
            }
        }),
        native("repr", |scope, args| {
            check_arity("repr", &args, 1, 1)?;
            scope.alloc_str(args[0].repr())
        }),
        native("int", |_, args| {
            check_arity("int", &args, 0, 1)?;
            to_int(args.first().unwrap_or(&Value::Int(0)))
        }),
        native("float", |_, args| {
            check_arity("float", &args, 0, 1)?;
            to_float(args.first().unwrap_or(&Value::Float(0.0)))
        }),
        native("bool", |_, args| {
            check_arity("bool", &args, 0, 1)?;
            Ok(Value::Bool(args.first().is_some_and(Value::is_truthy)))
        }),
        native("bytes", |scope, args| {
            check_arity("bytes", &args, 0, 2)?;
            to_bytes(scope, &args)
        }),
        native("type", |scope, args| {
            check_arity("type", &args, 1, 1)?;
            scope.alloc_str(args[0].type_name())
        }),
        native("print", move |_, args| {
            let line = args.iter().map(Value::to_str).collect::<Vec<_>>().join(" ");
            output(&line);
            Ok(Value::None)
        }),
        native("range", |scope, args| {
            check_arity("range", &args, 1, 3)?;
            range(scope, &args)
        }),
        native("list", |scope, args| {
            check_arity("list", &args, 0, 1)?;
            let items = match args.first() {
                Some(value) => ops::iterate(scope, value)?,
                None => Vec::new(),
            };
            scope.alloc_list(items)
        }),
        native("tuple", |scope, args| {
            check_arity("tuple", &args, 0, 1)?;
            match args.first() {
                Some(value @ Value::Tuple(_)) => Ok(value.clone()),
                Some(value) => {
                    let items = ops::iterate(scope, value)?;
                    scope.alloc_tuple(items)
                }
                None => scope.alloc_tuple(Vec::new()),
            }
        }),
        native("abs", |_, args| {
            check_arity("abs", &args, 1, 1)?;
            match &args[0] {
                Value::Float(f) => Ok(Value::Float(f.abs())),
                other => match int_like(other) {
                    Some(i) => i.checked_abs().map(Value::Int).ok_or_else(ops::overflow),
                    None => Err(Exception::type_error(format!(
                        "bad operand type for abs(): '{}'",
                        other.type_name()
                    ))),
                },
            }
        }),
        native("min", |scope, args| extremum(scope, "min", args, std::cmp::Ordering::Less)),
        native("max", |scope, args| extremum(scope, "max", args, std::cmp::Ordering::Greater)),
        native("sum", |scope, args| {
            check_arity("sum", &args, 1, 2)?;
            let mut total = args.get(1).cloned().unwrap_or(Value::Int(0));
            for item in ops::iterate(scope, &args[0])? {
                total = ops::binary(scope, crate::ast::BinaryOp::Add, &total, &item)?;
            }
            Ok(total)
        }),
        native("sorted", |scope, args| {
            check_arity("sorted", &args, 1, 1)?;
            let items = sort_values(ops::iterate(scope, &args[0])?)?;
            scope.alloc_list(items)
        }),
        native("enumerate", |scope, args| {
            check_arity("enumerate", &args, 1, 1)?;
            let pairs = ops::iterate(scope, &args[0])?
                .into_iter()
                .enumerate()
                .map(|(i, item)| scope.alloc_tuple(vec![Value::Int(i as i64), item]))
                .collect::<Result<Vec<_>, _>>()?;
            scope.alloc_list(pairs)
        }),
        native("zip", |scope, args| {
            let columns = args
                .iter()
                .map(|arg| ops::iterate(scope, arg))
                .collect::<Result<Vec<_>, _>>()?;
            let len = columns.iter().map(Vec::len).min().unwrap_or(0);
            let rows = (0..len)
                .map(|i| scope.alloc_tuple(columns.iter().map(|col| col[i].clone()).collect()))
                .collect::<Result<Vec<_>, _>>()?;
            scope.alloc_list(rows)
        }),
        native("isinstance", |_, args| {
            check_arity("isinstance", &args, 2, 2)?;
            is_instance(&args[0], &args[1]).map(Value::Bool)
        }),
    ];

    for (name, value) in functions {
        ns.insert(name, value);
    }
    for kind in EXCEPTION_TYPES {
        ns.insert(*kind, Value::Type(Arc::from(*kind)));
    }
    ns
}

fn to_int(value: &Value) -> Result<Value, Exception> {
    match value {
        Value::Float(f) => {
            if f.is_nan() {
                Err(Exception::value_error("cannot convert float NaN to integer"))
            } else if f.is_infinite() || f.abs() >= 9.223_372_036_854_775_808e18 {
                Err(Exception::with_message(
                    "OverflowError",
                    "cannot convert float infinity to integer",
                ))
            } else {
                Ok(Value::Int(f.trunc() as i64))
            }
        }
        Value::Str(s) => s
            .trim()
            .replace('_', "")
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| {
                Exception::value_error(format!(
                    "invalid literal for int() with base 10: {}",
                    value.repr()
                ))
            }),
        other => int_like(other).map(Value::Int).ok_or_else(|| {
            Exception::type_error(format!(
                "int() argument must be a string or a number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

fn to_float(value: &Value) -> Result<Value, Exception> {
    match value {
        Value::Str(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
            Exception::value_error(format!("could not convert string to float: {}", value.repr()))
        }),
        other => other.as_f64().map(Value::Float).ok_or_else(|| {
            Exception::type_error(format!(
                "float() argument must be a string or a number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

fn to_bytes(scope: &Scope<'_>, args: &[Value]) -> Result<Value, Exception> {
    match args {
        [] => scope.alloc_bytes(Vec::new()),
        [Value::Bytes(b)] => Ok(Value::Bytes(b.clone())),
        [Value::Str(_)] => Err(Exception::type_error("string argument without an encoding")),
        [Value::Str(s), encoding] => match encoding.as_str() {
            Some("utf-8" | "utf8" | "UTF-8") => scope.alloc_bytes(s.as_bytes().to_vec()),
            Some(other) => Err(Exception::with_message(
                "LookupError",
                format!("unknown encoding: {}", other),
            )),
            None => Err(Exception::type_error("bytes() argument 'encoding' must be str")),
        },
        [count] if int_like(count).is_some() => {
            let n = int_like(count).unwrap_or(0);
            if n < 0 {
                return Err(Exception::value_error("negative count"));
            }
            if n as u64 > MAX_SEQUENCE_LEN as u64 {
                return Err(Exception::with_message("MemoryError", "bytes too large"));
            }
            scope.alloc_bytes(vec![0; n as usize])
        }
        [items] => {
            let mut out = Vec::new();
            for item in ops::iterate(scope, items)? {
                match int_like(&item) {
                    Some(b @ 0..=255) => out.push(b as u8),
                    Some(_) => return Err(Exception::value_error("bytes must be in range(0, 256)")),
                    None => {
                        return Err(Exception::type_error(format!(
                            "'{}' object cannot be interpreted as an integer",
                            item.type_name()
                        )))
                    }
                }
            }
            scope.alloc_bytes(out)
        }
        _ => Err(Exception::type_error("encoding without a string argument")),
    }
}

fn range(scope: &Scope<'_>, args: &[Value]) -> Result<Value, Exception> {
    let ints = args
        .iter()
        .map(|arg| {
            int_like(arg).ok_or_else(|| {
                Exception::type_error(format!(
                    "'{}' object cannot be interpreted as an integer",
                    arg.type_name()
                ))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Err(Exception::type_error("range expected at most 3 arguments")),
    };
    if step == 0 {
        return Err(Exception::value_error("range() arg 3 must not be zero"));
    }

    let span = if step > 0 {
        (stop as i128 - start as i128).max(0)
    } else {
        (start as i128 - stop as i128).max(0)
    };
    let step_abs = (step as i128).abs();
    let len = (span + step_abs - 1) / step_abs;
    if len > MAX_SEQUENCE_LEN as i128 {
        return Err(Exception::with_message("MemoryError", "range too large"));
    }

    let items = (0..len)
        .map(|i| Value::Int((start as i128 + i * step as i128) as i64))
        .collect();
    scope.alloc_list(items)
}

fn extremum(
    scope: &Scope<'_>,
    name: &str,
    args: Vec<Value>,
    wanted: std::cmp::Ordering,
) -> Result<Value, Exception> {
    let items = match args.len() {
        0 => return check_arity(name, &args, 1, usize::MAX).map(|_| Value::None),
        1 => ops::iterate(scope, &args[0])?,
        _ => args,
    };

    let mut iter = items.into_iter();
    let mut best = iter
        .next()
        .ok_or_else(|| Exception::value_error(format!("{}() arg is an empty sequence", name)))?;
    for item in iter {
        if ops::order(&item, &best, if wanted.is_lt() { "<" } else { ">" })? == Some(wanted) {
            best = item;
        }
    }
    Ok(best)
}

/// Stable sort by `<`
pub(crate) fn sort_values(mut items: Vec<Value>) -> Result<Vec<Value>, Exception> {
    let mut failure = None;
    items.sort_by(|a, b| match ops::order(a, b, "<") {
        Ok(ordering) => ordering.unwrap_or(std::cmp::Ordering::Equal),
        Err(err) => {
            failure.get_or_insert(err);
            std::cmp::Ordering::Equal
        }
    });
    match failure {
        Some(err) => Err(err),
        None => Ok(items),
    }
}

fn is_instance(value: &Value, class: &Value) -> Result<bool, Exception> {
    match class {
        Value::Tuple(classes) => {
            for class in classes.iter() {
                if is_instance(value, class)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Value::Type(kind) => Ok(match value {
            Value::Exception(exc) => is_subclass(exc.kind(), kind),
            _ => false,
        }),
        Value::Native(func) => {
            let name = func.name();
            let matched = match value {
                Value::Bool(_) => name == "bool" || name == "int",
                other => other.type_name() == name,
            };
            if matches!(
                name,
                "int" | "float" | "str" | "bytes" | "bool" | "list" | "tuple"
            ) {
                Ok(matched)
            } else {
                Err(Exception::type_error(
                    "isinstance() arg 2 must be a type or tuple of types",
                ))
            }
        }
        _ => Err(Exception::type_error(
            "isinstance() arg 2 must be a type or tuple of types",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enclave_core::ContextRegistry;
    use parking_lot::Mutex;

    fn call(name: &str, args: Vec<Value>) -> Result<Value, Exception> {
        let registry = ContextRegistry::new();
        let main = registry.main();
        let mut ns = main.namespace();
        let mut scope = Scope::new(&main, &mut ns);
        let builtins = builtins(Arc::new(|_: &str| {}));
        match builtins.get(name) {
            Some(Value::Native(func)) => func.call(&mut scope, args),
            other => panic!("{} is not a builtin function: {:?}", name, other),
        }
    }

    #[test]
    fn test_exception_hierarchy() {
        assert!(is_subclass("KeyError", "LookupError"));
        assert!(is_subclass("KeyError", "Exception"));
        assert!(is_subclass("ModuleNotFoundError", "ImportError"));
        assert!(is_subclass("RunFailedError", "RuntimeError"));
        assert!(is_subclass("CustomError", "Exception"));
        assert!(is_subclass("Exception", "BaseException"));
        assert!(!is_subclass("ValueError", "TypeError"));
        assert!(!is_subclass("BaseException", "Exception"));
    }

    #[test]
    fn test_len_and_conversions() {
        assert_eq!(call("len", vec![Value::from("héllo")]).unwrap(), Value::Int(5));
        assert!(call("len", vec![Value::Int(1)]).unwrap_err().is("TypeError"));
        assert_eq!(call("int", vec![Value::from(" 42 ")]).unwrap(), Value::Int(42));
        assert_eq!(call("int", vec![Value::Float(-2.7)]).unwrap(), Value::Int(-2));
        assert!(call("int", vec![Value::from("x")]).unwrap_err().is("ValueError"));
        assert_eq!(call("float", vec![Value::from("1.5")]).unwrap(), Value::Float(1.5));
        assert_eq!(call("str", vec![Value::Float(2.0)]).unwrap(), Value::from("2.0"));
        assert_eq!(call("bool", vec![]).unwrap(), Value::Bool(false));
        assert_eq!(call("type", vec![Value::None]).unwrap(), Value::from("NoneType"));
    }

    #[test]
    fn test_bytes_constructor() {
        assert_eq!(
            call("bytes", vec![Value::from("hi"), Value::from("utf-8")]).unwrap(),
            Value::from(&b"hi"[..])
        );
        assert_eq!(call("bytes", vec![Value::Int(2)]).unwrap(), Value::from(&b"\0\0"[..]));
        assert!(call("bytes", vec![Value::from("hi")]).unwrap_err().is("TypeError"));
        assert!(call("bytes", vec![Value::list(vec![Value::Int(300)])])
            .unwrap_err()
            .is("ValueError"));
    }

    #[test]
    fn test_range() {
        let ints = |v: &[i64]| Value::list(v.iter().map(|&i| Value::Int(i)).collect());
        assert_eq!(call("range", vec![Value::Int(3)]).unwrap(), ints(&[0, 1, 2]));
        assert_eq!(
            call("range", vec![Value::Int(5), Value::Int(0), Value::Int(-2)]).unwrap(),
            ints(&[5, 3, 1])
        );
        assert_eq!(call("range", vec![Value::Int(2), Value::Int(1)]).unwrap(), ints(&[]));
        assert!(call("range", vec![Value::Int(0), Value::Int(1), Value::Int(0)])
            .unwrap_err()
            .is("ValueError"));
        assert!(call("range", vec![Value::Int(i64::MAX)]).unwrap_err().is("MemoryError"));
    }

    #[test]
    fn test_min_max_sum_sorted() {
        let list = Value::list(vec![Value::Int(3), Value::Int(1), Value::Int(2)]);
        assert_eq!(call("min", vec![list.clone()]).unwrap(), Value::Int(1));
        assert_eq!(call("max", vec![Value::Int(4), Value::Int(9)]).unwrap(), Value::Int(9));
        assert_eq!(call("sum", vec![list.clone()]).unwrap(), Value::Int(6));
        assert_eq!(
            call("sorted", vec![list]).unwrap(),
            Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
        assert!(call("min", vec![Value::list(vec![])]).unwrap_err().is("ValueError"));
        assert!(call(
            "sorted",
            vec![Value::list(vec![Value::Int(1), Value::from("a")])]
        )
        .unwrap_err()
        .is("TypeError"));
    }

    #[test]
    fn test_isinstance() {
        let value_error = Value::Type(Arc::from("ValueError"));
        let exc = Value::Exception(Arc::new(Exception::value_error("x")));
        assert_eq!(call("isinstance", vec![exc.clone(), value_error]).unwrap(), Value::Bool(true));
        assert_eq!(
            call("isinstance", vec![exc, Value::Type(Arc::from("Exception"))]).unwrap(),
            Value::Bool(true)
        );
        assert!(call("isinstance", vec![Value::Int(1), Value::Int(1)]).is_err());
    }

    #[test]
    fn test_print_writes_to_sink() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        let builtins = builtins(Arc::new(move |line: &str| sink.lock().push(line.to_string())));

        let registry = ContextRegistry::new();
        let main = registry.main();
        let mut ns = main.namespace();
        let mut scope = Scope::new(&main, &mut ns);
        let Some(Value::Native(print)) = builtins.get("print") else {
            panic!("print missing");
        };
        print
            .call(&mut scope, vec![Value::from("a"), Value::Int(1), Value::None])
            .unwrap();
        assert_eq!(*lines.lock(), vec!["a 1 None".to_string()]);
    }
}
