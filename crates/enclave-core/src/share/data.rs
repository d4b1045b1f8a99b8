//! The cross-context descriptor

use super::{ShareError, Shareable, ShareableRegistry, SharedPayload};
use crate::context::{ContextId, ExecutionContext};
use crate::value::{Value, ValueKind};
use std::fmt;
use std::sync::Arc;
use tracing::{trace, warn};

/// Transferable description of one shareable value
///
/// Acquired in the origin context, materialized in a target context, and
/// released back in the origin. [`CrossContextData::release`] consumes the
/// descriptor; one that is dropped without an explicit release is released
/// by its `Drop` impl.
pub struct CrossContextData {
    kind: ValueKind,
    payload: Option<SharedPayload>,
    capability: Arc<dyn Shareable>,
    origin: Option<Arc<ExecutionContext>>,
    object: Option<Value>,
}

impl CrossContextData {
    /// Build a descriptor for `value`, which lives in `origin`
    ///
    /// The calling thread must be focused on `origin`. When the capability
    /// releases at home, the value is staked on the origin heap until
    /// release.
    pub fn acquire(
        value: &Value,
        registry: &ShareableRegistry,
        origin: &Arc<ExecutionContext>,
    ) -> Result<Self, ShareError> {
        let capability = registry.lookup(value)?;
        let at_home = capability.releases_at_home();
        if at_home {
            origin.heap().add_stake()?;
        }

        let payload = match capability.get_data(value) {
            Ok(payload) => payload,
            Err(err) => {
                if at_home {
                    origin.heap().drop_stake()?;
                }
                return Err(err);
            }
        };

        trace!(
            target: "enclave::share",
            kind = value.type_name(),
            origin = %origin.id(),
            "descriptor acquired"
        );

        Ok(Self {
            kind: value.kind(),
            payload: Some(payload),
            capability,
            origin: at_home.then(|| origin.clone()),
            object: Some(value.clone()),
        })
    }

    /// Kind of the shared value
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Context release will switch into, if any
    pub fn origin(&self) -> Option<ContextId> {
        self.origin.as_ref().map(|ctx| ctx.id())
    }

    /// Whether release has to run in the origin context
    pub fn releases_at_home(&self) -> bool {
        self.origin.is_some()
    }

    /// Build an equivalent value in `target`
    ///
    /// The calling thread must be focused on `target`.
    pub fn materialize(&self, target: &ExecutionContext) -> Result<Value, ShareError> {
        target.heap().check_home()?;
        let payload = self
            .payload
            .as_ref()
            .ok_or_else(|| ShareError::Capability("descriptor already released".to_string()))?;
        self.capability.new_object(payload, target.heap())
    }

    /// Release the payload and the retained value in the origin context
    pub fn release(mut self) -> Result<(), ShareError> {
        self.release_in_place()
    }

    fn release_in_place(&mut self) -> Result<(), ShareError> {
        let Some(payload) = self.payload.take() else {
            return Ok(());
        };

        let Some(origin) = self.origin.take() else {
            self.capability.free(payload);
            self.object = None;
            return Ok(());
        };

        match origin.enter() {
            Ok(focus) => {
                self.capability.free(payload);
                self.object = None;
                origin.heap().drop_stake()?;
                drop(focus);
            }
            Err(_) => {
                // Origin already torn down; nothing left to unstake.
                self.capability.free(payload);
                self.object = None;
            }
        }

        trace!(target: "enclave::share", kind = self.kind.name(), origin = %origin.id(), "descriptor released");
        Ok(())
    }
}

impl Drop for CrossContextData {
    fn drop(&mut self) {
        if let Err(err) = self.release_in_place() {
            warn!(target: "enclave::share", kind = self.kind.name(), error = %err, "descriptor release failed");
        }
    }
}

impl fmt::Debug for CrossContextData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrossContextData")
            .field("kind", &self.kind)
            .field("origin", &self.origin())
            .field("released", &self.payload.is_none())
            .finish()
    }
}
