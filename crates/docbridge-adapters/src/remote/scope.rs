//! Execution-scoped marshaller registration.

use std::fmt;
use std::sync::Arc;

use docbridge_common::utils::error::Result;
use docbridge_core::execution::RowMarshaller;

use super::CacheConnection;

/// Keeps a marshaller registered with the remote store until released or
/// dropped.
///
/// Release only removes this scope's own reference, so overlapping
/// executions over the same document type do not disturb each other.
pub struct MarshallerScope {
    connection: Arc<dyn CacheConnection>,
    marshaller: Arc<RowMarshaller>,
    released: bool,
}

impl MarshallerScope {
    /// Registers `marshaller` and returns the guard holding the registration.
    pub fn acquire(
        connection: Arc<dyn CacheConnection>,
        marshaller: Arc<RowMarshaller>,
    ) -> Result<Self> {
        connection.register_marshaller(&marshaller)?;
        Ok(Self {
            connection,
            marshaller,
            released: false,
        })
    }

    /// Returns the registered marshaller.
    pub fn marshaller(&self) -> &Arc<RowMarshaller> {
        &self.marshaller
    }

    /// Returns whether the registration was already released.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Unregisters the marshaller. Later calls do nothing.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.connection.unregister_marshaller(&self.marshaller) {
            tracing::warn!(
                "Failed to unregister marshaller for {}: {}",
                self.marshaller.type_name(),
                e
            );
        }
    }
}

impl Drop for MarshallerScope {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for MarshallerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarshallerScope")
            .field("marshaller", &self.marshaller.id())
            .field("type_name", &self.marshaller.type_name())
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryConnection;
    use docbridge_common::types::ColumnType;
    use docbridge_core::schema::{Column, Schema, Table, TableShape};

    fn marshaller() -> Arc<RowMarshaller> {
        let schema = Schema::new()
            .with_table(Table::root("T", "x.T").with_column(Column::new("a", 1, ColumnType::Int32)));
        Arc::new(RowMarshaller::build(
            Arc::new(TableShape::derive(&schema, "T").unwrap()),
            None,
        ))
    }

    #[test]
    fn test_drop_unregisters() {
        let connection = Arc::new(InMemoryConnection::new("default"));
        let m = marshaller();
        {
            let scope = MarshallerScope::acquire(connection.clone(), Arc::clone(&m)).unwrap();
            assert!(!scope.is_released());
            assert!(connection.registry().is_registered(m.id()));
        }
        assert!(!connection.registry().is_registered(m.id()));
    }

    #[test]
    fn test_release_is_idempotent() {
        let connection = Arc::new(InMemoryConnection::new("default"));
        let m = marshaller();
        let outer = MarshallerScope::acquire(connection.clone(), Arc::clone(&m)).unwrap();
        let mut inner = MarshallerScope::acquire(connection.clone(), Arc::clone(&m)).unwrap();

        inner.release();
        inner.release();
        assert!(inner.is_released());
        assert!(connection.registry().is_registered(m.id()));

        drop(outer);
        assert!(connection.registry().is_empty());
    }
}
