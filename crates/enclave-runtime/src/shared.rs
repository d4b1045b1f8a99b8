//! Shared bindings given on the command line
//!
//! `NAME=VALUE` pairs become a [`Namespace`] for `run_string`. A value that
//! lexes as a single literal (`42`, `-1.5`, `None`, `True`, `'quoted'`,
//! `b'\x00'`) takes that literal's type; anything else is passed as text.

use crate::error::RuntimeError;
use enclave_core::{Namespace, Value};
use enclave_script::lexer::{tokenize, Token};

/// Interpret the value half of a binding
pub fn parse_literal(text: &str) -> Value {
    let Ok(tokens) = tokenize(text) else {
        return Value::from(text);
    };
    let significant: Vec<&Token> = tokens
        .iter()
        .map(|(token, _)| token)
        .filter(|token| !matches!(token, Token::Newline | Token::Eof))
        .collect();

    match significant.as_slice() {
        [Token::None] => Value::None,
        [Token::True] => Value::Bool(true),
        [Token::False] => Value::Bool(false),
        [Token::Int(i)] => Value::Int(*i),
        [Token::Float(f)] => Value::Float(*f),
        [Token::Minus, Token::Int(i)] => i.checked_neg().map_or_else(|| Value::from(text), Value::Int),
        [Token::Minus, Token::Float(f)] => Value::Float(-f),
        [Token::Str(s)] => Value::from(s.as_str()),
        [Token::Bytes(b)] => Value::from(b.as_slice()),
        _ => Value::from(text),
    }
}

/// Split one `NAME=VALUE` argument
pub fn parse_binding(arg: &str) -> Result<(String, Value), RuntimeError> {
    match arg.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), parse_literal(value)))
        }
        _ => Err(RuntimeError::SharedArg(arg.to_string())),
    }
}

/// Build a shared namespace from `NAME=VALUE` arguments, later bindings winning
pub fn parse_bindings<S: AsRef<str>>(args: &[S]) -> Result<Namespace, RuntimeError> {
    let mut namespace = Namespace::new();
    for arg in args {
        let (name, value) = parse_binding(arg.as_ref())?;
        namespace.insert(name, value);
    }
    Ok(namespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literals() {
        assert_eq!(parse_literal("42"), Value::Int(42));
        assert_eq!(parse_literal("-7"), Value::Int(-7));
        assert_eq!(parse_literal("0x10"), Value::Int(16));
        assert_eq!(parse_literal("2.5"), Value::Float(2.5));
        assert_eq!(parse_literal("None"), Value::None);
        assert_eq!(parse_literal("True"), Value::Bool(true));
        assert_eq!(parse_literal("'quoted'"), Value::from("quoted"));
        assert_eq!(parse_literal("b'\\x00a'"), Value::from(&b"\x00a"[..]));
    }

    #[test]
    fn test_everything_else_is_text() {
        assert_eq!(parse_literal("hello world"), Value::from("hello world"));
        assert_eq!(parse_literal(""), Value::from(""));
        assert_eq!(parse_literal("1 + 2"), Value::from("1 + 2"));
        assert_eq!(parse_literal("'unterminated"), Value::from("'unterminated"));
    }

    #[test]
    fn test_bindings() {
        let ns = parse_bindings(&["a=1", "b=x=y", "a=2"]).unwrap();
        assert_eq!(ns.get("a"), Some(&Value::Int(2)));
        assert_eq!(ns.get("b"), Some(&Value::from("x=y")));
        assert_eq!(ns.len(), 2);

        assert!(matches!(parse_binding("novalue"), Err(RuntimeError::SharedArg(_))));
        assert!(matches!(parse_binding("=1"), Err(RuntimeError::SharedArg(_))));
    }
}
