//! Once-per-identifier protobuf schema distribution.

use docbridge_common::utils::error::SchemaError;
use docbridge_common::utils::hash::FastHashSet;
use parking_lot::Mutex;

use super::{CacheConnection, ProtobufResource};

/// Distributes protobuf schema files, each identifier at most once.
///
/// Registration happens per schema version, not per query; a rejected schema
/// is not remembered, so a corrected file can be registered later.
#[derive(Debug, Default)]
pub struct SchemaRegistrar {
    registered: Mutex<FastHashSet<String>>,
}

impl SchemaRegistrar {
    /// Creates a registrar with nothing registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `resource` unless its identifier was registered before.
    ///
    /// Returns true if the file was sent to the store.
    pub fn register(
        &self,
        connection: &dyn CacheConnection,
        resource: &ProtobufResource,
    ) -> Result<bool, SchemaError> {
        let mut registered = self.registered.lock();
        if registered.contains(resource.identifier()) {
            return Ok(false);
        }
        if resource.contents().trim().is_empty() {
            return Err(SchemaError::MissingResource);
        }

        connection.register_protobuf_file(resource)?;
        tracing::debug!("Registered protobuf schema {}", resource.identifier());
        registered.insert(resource.identifier().to_string());
        Ok(true)
    }

    /// Returns whether an identifier was registered through this registrar.
    #[must_use]
    pub fn is_registered(&self, identifier: &str) -> bool {
        self.registered.lock().contains(identifier)
    }
}
