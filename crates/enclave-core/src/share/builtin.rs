//! Built-in shareable kinds: `None`, `bool`, `int`, `float`, `str`, `bytes`

use super::{ShareError, Shareable, SharedPayload};
use crate::context::ContextHeap;
use crate::value::{Value, ValueKind};
use std::sync::Arc;

fn mismatch(expected: ValueKind, value: &Value) -> ShareError {
    ShareError::Capability(format!(
        "{} capability cannot encode a {} value",
        expected,
        value.type_name()
    ))
}

fn downcast<T: 'static>(kind: ValueKind, payload: &SharedPayload) -> Result<&T, ShareError> {
    (**payload)
        .downcast_ref::<T>()
        .ok_or_else(|| ShareError::Capability(format!("corrupt {} payload", kind)))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Scalar {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
}

/// Inline scalars: the payload is the scalar itself
///
/// Nothing references origin storage, so release never switches focus.
#[derive(Debug, Clone, Copy)]
pub struct ScalarShareable {
    kind: ValueKind,
}

impl ScalarShareable {
    /// Capability for `None`
    pub const fn none() -> Self {
        Self {
            kind: ValueKind::NoneType,
        }
    }

    /// Capability for `bool`
    pub const fn bool() -> Self {
        Self {
            kind: ValueKind::Bool,
        }
    }

    /// Capability for `int`
    pub const fn int() -> Self {
        Self {
            kind: ValueKind::Int,
        }
    }

    /// Capability for `float`
    pub const fn float() -> Self {
        Self {
            kind: ValueKind::Float,
        }
    }
}

impl Shareable for ScalarShareable {
    fn kind(&self) -> ValueKind {
        self.kind
    }

    fn get_data(&self, value: &Value) -> Result<SharedPayload, ShareError> {
        let scalar = match (self.kind, value) {
            (ValueKind::NoneType, Value::None) => Scalar::None,
            (ValueKind::Bool, Value::Bool(b)) => Scalar::Bool(*b),
            (ValueKind::Int, Value::Int(i)) => Scalar::Int(*i),
            (ValueKind::Float, Value::Float(f)) => Scalar::Float(*f),
            _ => return Err(mismatch(self.kind, value)),
        };
        Ok(Box::new(scalar))
    }

    fn new_object(&self, payload: &SharedPayload, _target: &ContextHeap) -> Result<Value, ShareError> {
        Ok(match *downcast::<Scalar>(self.kind, payload)? {
            Scalar::None => Value::None,
            Scalar::Bool(b) => Value::Bool(b),
            Scalar::Int(i) => Value::Int(i),
            Scalar::Float(f) => Value::Float(f),
        })
    }

    fn releases_at_home(&self) -> bool {
        false
    }

    fn description(&self) -> &str {
        "inline scalar"
    }
}

/// Text: the payload keeps the origin's buffer alive until release
#[derive(Debug, Clone, Copy, Default)]
pub struct StrShareable;

impl Shareable for StrShareable {
    fn kind(&self) -> ValueKind {
        ValueKind::Str
    }

    fn get_data(&self, value: &Value) -> Result<SharedPayload, ShareError> {
        match value {
            Value::Str(s) => Ok(Box::new(s.clone())),
            other => Err(mismatch(ValueKind::Str, other)),
        }
    }

    fn new_object(&self, payload: &SharedPayload, target: &ContextHeap) -> Result<Value, ShareError> {
        let text = downcast::<Arc<str>>(ValueKind::Str, payload)?;
        target.allocate(text.len())?;
        Ok(Value::Str(Arc::from(&**text)))
    }

    fn description(&self) -> &str {
        "copied text"
    }
}

/// Byte strings: same shape as [`StrShareable`]
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesShareable;

impl Shareable for BytesShareable {
    fn kind(&self) -> ValueKind {
        ValueKind::Bytes
    }

    fn get_data(&self, value: &Value) -> Result<SharedPayload, ShareError> {
        match value {
            Value::Bytes(b) => Ok(Box::new(b.clone())),
            other => Err(mismatch(ValueKind::Bytes, other)),
        }
    }

    fn new_object(&self, payload: &SharedPayload, target: &ContextHeap) -> Result<Value, ShareError> {
        let bytes = downcast::<Arc<[u8]>>(ValueKind::Bytes, payload)?;
        target.allocate(bytes.len())?;
        Ok(Value::Bytes(Arc::from(&**bytes)))
    }

    fn description(&self) -> &str {
        "copied bytes"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextId, ContextOptions, ExecutionContext};
    use crate::focus::RegistryId;

    fn main_context() -> ExecutionContext {
        ExecutionContext::new(ContextId::MAIN, RegistryId::new(), &ContextOptions::default())
    }

    #[test]
    fn test_scalar_payloads() {
        let ctx = main_context();
        let cases = [
            (ScalarShareable::none(), Value::None),
            (ScalarShareable::bool(), Value::Bool(true)),
            (ScalarShareable::int(), Value::Int(-7)),
            (ScalarShareable::float(), Value::Float(2.5)),
        ];
        for (cap, value) in cases {
            let payload = cap.get_data(&value).unwrap();
            assert_eq!(cap.new_object(&payload, ctx.heap()).unwrap(), value);
            assert!(!cap.releases_at_home());
        }
    }

    #[test]
    fn test_scalar_rejects_other_kinds() {
        let err = ScalarShareable::int().get_data(&Value::Float(1.0)).unwrap_err();
        assert!(matches!(err, ShareError::Capability(_)));
    }

    #[test]
    fn test_str_materializes_fresh_buffer() {
        let ctx = main_context();
        let original: Arc<str> = Arc::from("spam");
        let value = Value::Str(original.clone());

        let payload = StrShareable.get_data(&value).unwrap();
        let copy = StrShareable.new_object(&payload, ctx.heap()).unwrap();

        assert_eq!(copy, value);
        match copy {
            Value::Str(s) => assert!(!Arc::ptr_eq(&s, &original)),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(ctx.heap().stats().allocated_bytes, 4);
    }

    #[test]
    fn test_bytes_materializes_fresh_buffer() {
        let ctx = main_context();
        let value = Value::from(&b"\x00\x01"[..]);
        let payload = BytesShareable.get_data(&value).unwrap();
        assert_eq!(BytesShareable.new_object(&payload, ctx.heap()).unwrap(), value);
    }

    #[test]
    fn test_corrupt_payload() {
        let ctx = main_context();
        let payload: SharedPayload = Box::new(17u8);
        assert!(matches!(
            StrShareable.new_object(&payload, ctx.heap()),
            Err(ShareError::Capability(_))
        ));
    }
}
