//! Registry of shareable capabilities, keyed by value kind

use super::builtin::{BytesShareable, ScalarShareable, StrShareable};
use super::{ShareError, Shareable};
use crate::value::{Value, ValueKind};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::debug;

static GLOBAL: Lazy<Arc<ShareableRegistry>> = Lazy::new(|| Arc::new(ShareableRegistry::standard()));

/// Maps a value kind to the capability that shares it
///
/// Registration is append-only; lookups may run concurrently from any thread.
#[derive(Default)]
pub struct ShareableRegistry {
    capabilities: RwLock<FxHashMap<ValueKind, Arc<dyn Shareable>>>,
}

impl ShareableRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry builder
    pub fn builder() -> ShareableRegistryBuilder {
        ShareableRegistryBuilder {
            capabilities: Vec::new(),
        }
    }

    /// Registry with the built-in kinds
    pub fn standard() -> Self {
        let registry = Self::new();
        for capability in standard_capabilities() {
            registry.insert(capability);
        }
        registry
    }

    /// Process-wide standard registry, built on first use
    pub fn global() -> Arc<ShareableRegistry> {
        GLOBAL.clone()
    }

    fn insert(&self, capability: Arc<dyn Shareable>) {
        self.capabilities.write().insert(capability.kind(), capability);
    }

    /// Register a capability for its kind
    pub fn register(&self, capability: Arc<dyn Shareable>) -> Result<(), ShareError> {
        let kind = capability.kind();
        let mut capabilities = self.capabilities.write();
        if capabilities.contains_key(&kind) {
            return Err(ShareError::AlreadyRegistered(kind.name().to_string()));
        }
        debug!(target: "enclave::share", kind = kind.name(), "capability registered");
        capabilities.insert(kind, capability);
        Ok(())
    }

    /// Capability for the value's runtime type
    pub fn lookup(&self, value: &Value) -> Result<Arc<dyn Shareable>, ShareError> {
        self.get(value.kind())
            .ok_or_else(|| ShareError::NotShareable(value.type_name().to_string()))
    }

    /// Capability for a kind
    pub fn get(&self, kind: ValueKind) -> Option<Arc<dyn Shareable>> {
        self.capabilities.read().get(&kind).cloned()
    }

    /// Whether a capability exists for the value's runtime type
    pub fn is_shareable(&self, value: &Value) -> bool {
        self.capabilities.read().contains_key(&value.kind())
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<ValueKind> {
        let mut kinds: Vec<_> = self.capabilities.read().keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Get the number of registered capabilities
    pub fn len(&self) -> usize {
        self.capabilities.read().len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.capabilities.read().is_empty()
    }
}

impl std::fmt::Debug for ShareableRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareableRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

fn standard_capabilities() -> Vec<Arc<dyn Shareable>> {
    vec![
        Arc::new(ScalarShareable::none()),
        Arc::new(ScalarShareable::bool()),
        Arc::new(ScalarShareable::int()),
        Arc::new(ScalarShareable::float()),
        Arc::new(StrShareable),
        Arc::new(BytesShareable),
    ]
}

/// Builder for ShareableRegistry
pub struct ShareableRegistryBuilder {
    capabilities: Vec<Arc<dyn Shareable>>,
}

impl ShareableRegistryBuilder {
    /// Add the built-in kinds
    pub fn with_standard(mut self) -> Self {
        self.capabilities.extend(standard_capabilities());
        self
    }

    /// Add a capability
    pub fn register(mut self, capability: Arc<dyn Shareable>) -> Self {
        self.capabilities.push(capability);
        self
    }

    /// Build the registry, rejecting duplicate kinds
    pub fn build(self) -> Result<ShareableRegistry, ShareError> {
        let registry = ShareableRegistry::new();
        for capability in self.capabilities {
            registry.register(capability)?;
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextHeap;
    use crate::share::SharedPayload;

    struct ListLength;

    impl Shareable for ListLength {
        fn kind(&self) -> ValueKind {
            ValueKind::List
        }

        fn get_data(&self, value: &Value) -> Result<SharedPayload, ShareError> {
            match value {
                Value::List(items) => Ok(Box::new(items.read().len() as i64)),
                _ => Err(ShareError::Capability("not a list".into())),
            }
        }

        fn new_object(&self, payload: &SharedPayload, _target: &ContextHeap) -> Result<Value, ShareError> {
            let len = (**payload)
                .downcast_ref::<i64>()
                .ok_or_else(|| ShareError::Capability("bad payload".into()))?;
            Ok(Value::Int(*len))
        }
    }

    #[test]
    fn test_standard_registry() {
        let registry = ShareableRegistry::standard();
        assert_eq!(registry.len(), 6);
        assert!(registry.is_shareable(&Value::None));
        assert!(registry.is_shareable(&Value::Bool(false)));
        assert!(registry.is_shareable(&Value::Int(1)));
        assert!(registry.is_shareable(&Value::Float(1.0)));
        assert!(registry.is_shareable(&Value::from("s")));
        assert!(registry.is_shareable(&Value::from(&b"b"[..])));

        assert!(!registry.is_shareable(&Value::list(vec![])));
        assert!(!registry.is_shareable(&Value::tuple(vec![])));
        assert!(!registry.is_shareable(&Value::dict(Default::default())));
    }

    #[test]
    fn test_lookup_reports_type_name() {
        let registry = ShareableRegistry::standard();
        let err = registry.lookup(&Value::list(vec![])).unwrap_err();
        assert_eq!(err, ShareError::NotShareable("list".into()));
        assert_eq!(err.to_string(), "list is not a cross-context shareable type");
    }

    #[test]
    fn test_register_custom_kind() {
        let registry = ShareableRegistry::standard();
        registry.register(Arc::new(ListLength)).unwrap();
        assert!(registry.is_shareable(&Value::list(vec![Value::None])));

        let err = registry.register(Arc::new(ListLength)).unwrap_err();
        assert_eq!(err, ShareError::AlreadyRegistered("list".into()));
    }

    #[test]
    fn test_builder() {
        let registry = ShareableRegistry::builder()
            .register(Arc::new(StrShareable))
            .build()
            .unwrap();
        assert_eq!(registry.kinds(), vec![ValueKind::Str]);

        let duplicate = ShareableRegistry::builder()
            .with_standard()
            .register(Arc::new(StrShareable))
            .build();
        assert!(matches!(duplicate, Err(ShareError::AlreadyRegistered(_))));
    }

    #[test]
    fn test_global_is_shared() {
        let a = ShareableRegistry::global();
        let b = ShareableRegistry::global();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.is_shareable(&Value::Int(0)));
    }
}
