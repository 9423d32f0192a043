//! Remote cache collaborators.
//!
//! Connection establishment, pooling, and transport security live outside
//! Docbridge. The read path reaches the remote store only through the traits
//! here:
//!
//! - [`CacheConnection`] - one connection handle: caches, schema and
//!   marshaller registration, alias lookups
//! - [`CacheManager`] - named cache lookup
//! - [`RemoteCache`] - paged execution of a native query
//! - [`AliasSource`] - the alias-naming cache used when tables swap backing
//!   caches

mod registrar;
mod scope;

pub use registrar::SchemaRegistrar;
pub use scope::MarshallerScope;

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use docbridge_common::utils::error::{Result, SchemaError, StreamError};
use docbridge_core::execution::RowMarshaller;

/// A remote cache that executes native queries page by page.
pub trait RemoteCache: Send + Sync {
    /// Returns the cache name.
    fn name(&self) -> &str;

    /// Executes `query` and returns up to `max_results` raw documents
    /// starting at `start_offset` of the result set.
    ///
    /// A page shorter than `max_results` is the last one.
    fn fetch_page(
        &self,
        query: &str,
        start_offset: usize,
        max_results: usize,
    ) -> std::result::Result<Vec<Bytes>, StreamError>;
}

/// Looks up caches by name.
pub trait CacheManager: Send + Sync {
    /// Returns the named cache, or `None` if the store has no such cache.
    fn cache(&self, name: &str) -> Result<Option<Arc<dyn RemoteCache>>>;

    /// Returns the name of the connection's default cache.
    fn default_cache_name(&self) -> &str;
}

/// Maps a table name to the name of the table currently backing it.
pub trait AliasSource: Send + Sync {
    /// Returns the aliased table name, or `None` when the table is not aliased.
    fn alias_for(&self, table: &str) -> Result<Option<String>>;
}

/// A protobuf schema file to distribute to the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtobufResource {
    identifier: String,
    contents: String,
}

impl ProtobufResource {
    /// Creates a resource from its identifier and `.proto` source.
    pub fn new(identifier: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            contents: contents.into(),
        }
    }

    /// Reads a resource from a file, using the file name as identifier.
    pub fn from_file(path: impl AsRef<Path>) -> std::result::Result<Self, SchemaError> {
        let path = path.as_ref();
        let identifier = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or(SchemaError::MissingResource)?;
        let contents = std::fs::read_to_string(path).map_err(|e| {
            tracing::warn!("Failed to read protobuf schema {}: {}", path.display(), e);
            SchemaError::MissingResource
        })?;
        Ok(Self::new(identifier, contents))
    }

    /// Returns the identifier the store files the schema under.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Returns the `.proto` source.
    pub fn contents(&self) -> &str {
        &self.contents
    }
}

/// A connection handle to the remote store.
pub trait CacheConnection: Send + Sync {
    /// Returns the connection's default cache.
    fn cache(&self) -> Result<Arc<dyn RemoteCache>>;

    /// Returns a named cache.
    ///
    /// Fails with [`StreamError::CacheNotFound`] if the store has no cache of
    /// that name.
    fn cache_named(&self, name: &str) -> Result<Arc<dyn RemoteCache>> {
        self.cache_manager()
            .cache(name)?
            .ok_or_else(|| StreamError::CacheNotFound(name.to_string()).into())
    }

    /// Returns the cache manager.
    fn cache_manager(&self) -> Arc<dyn CacheManager>;

    /// Distributes a protobuf schema file to the store.
    fn register_protobuf_file(
        &self,
        resource: &ProtobufResource,
    ) -> std::result::Result<(), SchemaError>;

    /// Registers a marshaller in the store's decode context.
    fn register_marshaller(&self, marshaller: &Arc<RowMarshaller>) -> Result<()>;

    /// Drops one registration of a marshaller from the decode context.
    fn unregister_marshaller(&self, marshaller: &RowMarshaller) -> Result<()>;

    /// Returns the alias-naming cache, if the store keeps one.
    fn alias_source(&self) -> Option<Arc<dyn AliasSource>>;
}
