//! Discovered instances for the duration of one reconciliation pass

use crate::resource::Identity;
use std::collections::BTreeMap;

/// Anything discovered on the backend that has an identity
pub trait Discovered {
    fn identity(&self) -> &Identity;
}

/// Holds what one `list` call returned, keyed by identity.
///
/// Passes read from it to decide create vs update vs no-op, and write to it
/// after each successful call so later plans see the new state.
#[derive(Debug, Clone)]
pub struct ReconcileContext<I> {
    instances: BTreeMap<Identity, I>,
}

impl<I> Default for ReconcileContext<I> {
    fn default() -> Self {
        Self {
            instances: BTreeMap::new(),
        }
    }
}

impl<I: Discovered> ReconcileContext<I> {
    /// Build from discovered instances.
    ///
    /// Identities are unique per kind; a duplicate keeps the first record.
    pub fn new(discovered: impl IntoIterator<Item = I>) -> Self {
        let mut instances = BTreeMap::new();
        for instance in discovered {
            let identity = instance.identity().clone();
            if instances.contains_key(&identity) {
                log::warn!("Ignoring duplicate discovered object {identity}");
                continue;
            }
            instances.insert(identity, instance);
        }
        Self { instances }
    }

    pub fn find(&self, identity: &Identity) -> Option<&I> {
        self.instances.get(identity)
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.instances.contains_key(identity)
    }

    /// Record the state after a successful create or upsert
    pub fn insert(&mut self, instance: I) {
        self.instances.insert(instance.identity().clone(), instance);
    }

    /// Forget an instance after a successful delete
    pub fn remove(&mut self, identity: &Identity) -> Option<I> {
        self.instances.remove(identity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &I> {
        self.instances.values()
    }
}
