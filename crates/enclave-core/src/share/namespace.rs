//! Shared namespace: the ordered set of descriptors handed to a run

use super::{CrossContextData, ShareError, ShareableRegistry};
use crate::context::ExecutionContext;
use crate::value::Namespace;
use std::sync::Arc;
use tracing::warn;
use unicode_xid::UnicodeXID;

/// Ordered `(name, descriptor)` list
///
/// Either fully built or not built at all: a failed [`SharedNamespace::build`]
/// releases everything it acquired before returning.
#[derive(Debug, Default)]
pub struct SharedNamespace {
    items: Vec<(Arc<str>, CrossContextData)>,
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first == '_' || first.is_xid_start() => chars.all(|c| c.is_xid_continue()),
        _ => false,
    }
}

impl SharedNamespace {
    /// Empty shared namespace
    pub fn empty() -> Self {
        Self::default()
    }

    /// Acquire a descriptor for every binding of `shared`, in order
    ///
    /// The calling thread must be focused on `origin`.
    pub fn build(
        shared: Option<&Namespace>,
        registry: &ShareableRegistry,
        origin: &Arc<ExecutionContext>,
    ) -> Result<Self, ShareError> {
        let mut built = Self::empty();
        let Some(shared) = shared else {
            return Ok(built);
        };

        for (name, value) in shared.iter() {
            let item = if is_identifier(name) {
                CrossContextData::acquire(value, registry, origin)
            } else {
                Err(ShareError::InvalidName(name.to_string()))
            };

            match item {
                Ok(data) => built.items.push((Arc::from(name), data)),
                Err(err) => {
                    built.release_all();
                    return Err(err);
                }
            }
        }

        Ok(built)
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if there are no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Item names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|(name, _)| &**name)
    }

    /// Materialize every item into `namespace` of `target`
    ///
    /// Stops at the first failure; items already applied stay bound.
    pub fn apply(&self, target: &ExecutionContext, namespace: &mut Namespace) -> Result<(), ShareError> {
        for (name, data) in &self.items {
            let value = data.materialize(target)?;
            namespace.insert(name.clone(), value);
        }
        Ok(())
    }

    /// Release every descriptor in its origin context
    pub fn release_all(self) {
        for (name, data) in self.items {
            if let Err(err) = data.release() {
                warn!(target: "enclave::share", name = &*name, error = %err, "shared item release failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextId, ContextOptions};
    use crate::focus::RegistryId;
    use crate::value::Value;

    fn main_context() -> Arc<ExecutionContext> {
        Arc::new(ExecutionContext::new(
            ContextId::MAIN,
            RegistryId::new(),
            &ContextOptions::default(),
        ))
    }

    #[test]
    fn test_identifier_check() {
        assert!(is_identifier("spam"));
        assert!(is_identifier("_x1"));
        assert!(is_identifier("größe"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("1x"));
        assert!(!is_identifier("a-b"));
    }

    #[test]
    fn test_absent_or_empty() {
        let main = main_context();
        let registry = ShareableRegistry::standard();
        assert!(SharedNamespace::build(None, &registry, &main).unwrap().is_empty());
        assert!(SharedNamespace::build(Some(&Namespace::new()), &registry, &main)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_build_and_apply_in_order() {
        let main = main_context();
        let registry = ShareableRegistry::standard();
        let shared: Namespace = vec![("b", Value::Int(1)), ("a", Value::from("two"))]
            .into_iter()
            .collect();

        let built = SharedNamespace::build(Some(&shared), &registry, &main).unwrap();
        assert_eq!(built.names().collect::<Vec<_>>(), vec!["b", "a"]);

        let mut ns = Namespace::new();
        built.apply(&main, &mut ns).unwrap();
        assert_eq!(ns, shared);

        built.release_all();
        assert_eq!(main.heap().stakes(), 0);
    }

    #[test]
    fn test_failure_releases_acquired_items() {
        let main = main_context();
        let registry = ShareableRegistry::standard();
        let shared: Namespace = vec![
            ("first", Value::from("ok")),
            ("second", Value::list(vec![])),
            ("third", Value::from("never")),
        ]
        .into_iter()
        .collect();

        let err = SharedNamespace::build(Some(&shared), &registry, &main).unwrap_err();
        assert_eq!(err, ShareError::NotShareable("list".into()));
        assert_eq!(main.heap().stakes(), 0);
    }

    #[test]
    fn test_invalid_name() {
        let main = main_context();
        let registry = ShareableRegistry::standard();
        let shared: Namespace = vec![("not a name", Value::Int(1))].into_iter().collect();

        let err = SharedNamespace::build(Some(&shared), &registry, &main).unwrap_err();
        assert!(matches!(err, ShareError::InvalidName(_)));
    }
}
