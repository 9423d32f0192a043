//! Reference-counted marshaller registrations keyed by document type.
//!
//! The remote store's decode context is shared by document-type name, so two
//! executions over the same type may overlap. Each registration is tracked by
//! marshaller id; unregistering only drops the caller's own reference, and an
//! entry is removed once its count reaches zero.

use std::sync::Arc;

use docbridge_common::utils::hash::FastHashMap;
use parking_lot::RwLock;

use super::marshaller::{MarshallerId, RowMarshaller};

#[derive(Debug)]
struct Registration {
    marshaller: Arc<RowMarshaller>,
    refs: usize,
}

/// Thread-safe registry of live row marshallers.
#[derive(Debug, Default)]
pub struct MarshallerRegistry {
    entries: RwLock<FastHashMap<String, Vec<Registration>>>,
}

impl MarshallerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a marshaller, or adds a reference to an existing registration
    /// of the same build. Returns the new reference count.
    pub fn register(&self, marshaller: &Arc<RowMarshaller>) -> usize {
        let mut entries = self.entries.write();
        let slot = entries.entry(marshaller.type_name().to_string()).or_default();
        let refs = match slot.iter_mut().find(|r| r.marshaller.id() == marshaller.id()) {
            Some(existing) => {
                existing.refs += 1;
                existing.refs
            }
            None => {
                slot.push(Registration {
                    marshaller: Arc::clone(marshaller),
                    refs: 1,
                });
                1
            }
        };
        tracing::trace!(
            "registered marshaller {} for {} (refs={})",
            marshaller.id().as_u64(),
            marshaller.type_name(),
            refs
        );
        refs
    }

    /// Drops one reference to a marshaller's registration.
    ///
    /// Returns false if the build was not registered.
    pub fn unregister(&self, marshaller: &RowMarshaller) -> bool {
        let mut entries = self.entries.write();
        let Some(slot) = entries.get_mut(marshaller.type_name()) else {
            return false;
        };
        let Some(pos) = slot.iter().position(|r| r.marshaller.id() == marshaller.id()) else {
            return false;
        };

        slot[pos].refs -= 1;
        let refs = slot[pos].refs;
        if refs == 0 {
            slot.remove(pos);
            if slot.is_empty() {
                entries.remove(marshaller.type_name());
            }
        }
        tracing::trace!(
            "unregistered marshaller {} for {} (refs={})",
            marshaller.id().as_u64(),
            marshaller.type_name(),
            refs
        );
        true
    }

    /// Returns the most recently registered live marshaller for a type.
    #[must_use]
    pub fn lookup(&self, type_name: &str) -> Option<Arc<RowMarshaller>> {
        self.entries
            .read()
            .get(type_name)
            .and_then(|slot| slot.last())
            .map(|r| Arc::clone(&r.marshaller))
    }

    /// Returns whether a specific build is registered.
    #[must_use]
    pub fn is_registered(&self, id: MarshallerId) -> bool {
        self.entries
            .read()
            .values()
            .any(|slot| slot.iter().any(|r| r.marshaller.id() == id))
    }

    /// Returns the number of live registrations across all types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().values().map(Vec::len).sum()
    }

    /// Returns whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
