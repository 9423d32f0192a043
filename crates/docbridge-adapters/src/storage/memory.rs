//! In-memory cache backend.
//!
//! A complete in-process stand-in for the remote store: named caches holding
//! raw protobuf documents per type, store-side evaluation of Ickle queries
//! with paging, an alias-naming cache, a protobuf schema store, and the
//! marshaller decode context. Faults can be injected for page fetches, alias
//! lookups, and schema registration.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use docbridge_common::utils::error::{Error, Result, SchemaError, StreamError};
use docbridge_common::utils::hash::FastHashMap;
use docbridge_core::execution::{MarshallerRegistry, RowMarshaller};
use docbridge_core::schema::{Schema, TableShape};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use super::matcher::Matcher;
use crate::query::ickle;
use crate::remote::{AliasSource, CacheConnection, CacheManager, ProtobufResource, RemoteCache};

/// Name reported by alias lookup failures.
pub const ALIAS_CACHE_NAME: &str = "alias-naming";

/// Document layouts the store uses to evaluate query conditions.
#[derive(Debug, Default)]
struct DocumentCatalog {
    shapes: RwLock<FastHashMap<String, Arc<TableShape>>>,
}

impl DocumentCatalog {
    fn get(&self, type_name: &str) -> Option<Arc<TableShape>> {
        self.shapes.read().get(type_name).cloned()
    }
}

/// One page request received by a cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Query string.
    pub query: String,
    /// First result requested.
    pub start_offset: usize,
    /// Page size requested.
    pub max_results: usize,
}

/// A named in-memory cache.
#[derive(Debug)]
pub struct InMemoryCache {
    name: String,
    catalog: Arc<DocumentCatalog>,
    /// Raw documents per document type, in insertion order.
    documents: RwLock<IndexMap<String, Vec<Bytes>>>,
    requests: Mutex<Vec<PageRequest>>,
    fetches: AtomicUsize,
    /// Fetch number (1-based) from which pages fail, with the reason.
    failure: RwLock<Option<(usize, String)>>,
}

impl InMemoryCache {
    fn new(name: &str, catalog: Arc<DocumentCatalog>) -> Self {
        Self {
            name: name.to_string(),
            catalog,
            documents: RwLock::new(IndexMap::new()),
            requests: Mutex::new(Vec::new()),
            fetches: AtomicUsize::new(0),
            failure: RwLock::new(None),
        }
    }

    /// Stores a raw document of the given type.
    pub fn insert(&self, type_name: &str, raw: impl Into<Bytes>) {
        self.documents
            .write()
            .entry(type_name.to_string())
            .or_default()
            .push(raw.into());
    }

    /// Stores several raw documents of the given type.
    pub fn insert_all<I, B>(&self, type_name: &str, documents: I)
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        let mut stored = self.documents.write();
        let slot = stored.entry(type_name.to_string()).or_default();
        slot.extend(documents.into_iter().map(Into::into));
    }

    /// Returns the number of documents of a type.
    #[must_use]
    pub fn len(&self, type_name: &str) -> usize {
        self.documents.read().get(type_name).map_or(0, Vec::len)
    }

    /// Returns the number of page fetches served or failed.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Acquire)
    }

    /// Returns every page request received, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().clone()
    }

    /// Makes fetch number `fetch` (1-based) and every later one fail.
    pub fn fail_fetches_from(&self, fetch: usize, reason: impl Into<String>) {
        *self.failure.write() = Some((fetch.max(1), reason.into()));
    }

    /// Removes an injected fetch failure.
    pub fn clear_failures(&self) {
        *self.failure.write() = None;
    }

    fn fetch_error(&self, reason: impl Into<String>) -> StreamError {
        StreamError::Fetch {
            cache: self.name.clone(),
            reason: reason.into(),
        }
    }
}

impl RemoteCache for InMemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_page(
        &self,
        query: &str,
        start_offset: usize,
        max_results: usize,
    ) -> std::result::Result<Vec<Bytes>, StreamError> {
        let fetch = self.fetches.fetch_add(1, Ordering::AcqRel) + 1;
        self.requests.lock().push(PageRequest {
            query: query.to_string(),
            start_offset,
            max_results,
        });
        if let Some((from, reason)) = &*self.failure.read() {
            if fetch >= *from {
                return Err(self.fetch_error(reason.clone()));
            }
        }

        let parsed = ickle::parse(query).map_err(|e| self.fetch_error(e.to_string()))?;
        let candidates = self
            .documents
            .read()
            .get(&parsed.entity)
            .cloned()
            .unwrap_or_default();

        let page: Vec<Bytes> = match &parsed.filter {
            None => candidates
                .into_iter()
                .skip(start_offset)
                .take(max_results)
                .collect(),
            Some(condition) => {
                let shape = self
                    .catalog
                    .get(&parsed.entity)
                    .ok_or_else(|| self.fetch_error(format!("unknown entity {}", parsed.entity)))?;
                let matcher = Matcher::compile(&shape, condition).map_err(|e| self.fetch_error(e))?;
                candidates
                    .into_iter()
                    .filter(|raw| {
                        docbridge_core::document::decode_document(&shape, raw)
                            .is_ok_and(|doc| matcher.matches(&doc))
                    })
                    .skip(start_offset)
                    .take(max_results)
                    .collect()
            }
        };
        tracing::trace!(
            "cache {} served {} documents for fetch {}",
            self.name,
            page.len(),
            fetch
        );
        Ok(page)
    }
}

/// Named cache lookup over in-memory caches.
#[derive(Debug)]
pub struct InMemoryCacheManager {
    default_cache: String,
    catalog: Arc<DocumentCatalog>,
    caches: RwLock<IndexMap<String, Arc<InMemoryCache>>>,
}

impl InMemoryCacheManager {
    fn new(default_cache: &str) -> Self {
        let catalog = Arc::new(DocumentCatalog::default());
        let mut caches = IndexMap::new();
        caches.insert(
            default_cache.to_string(),
            Arc::new(InMemoryCache::new(default_cache, Arc::clone(&catalog))),
        );
        Self {
            default_cache: default_cache.to_string(),
            catalog,
            caches: RwLock::new(caches),
        }
    }

    /// Returns the named cache, creating it if needed.
    pub fn create_cache(&self, name: &str) -> Arc<InMemoryCache> {
        let mut caches = self.caches.write();
        Arc::clone(
            caches
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(InMemoryCache::new(name, Arc::clone(&self.catalog)))),
        )
    }

    /// Returns the named cache, if it exists.
    pub fn get(&self, name: &str) -> Option<Arc<InMemoryCache>> {
        self.caches.read().get(name).cloned()
    }
}

impl CacheManager for InMemoryCacheManager {
    fn cache(&self, name: &str) -> Result<Option<Arc<dyn RemoteCache>>> {
        Ok(self.get(name).map(|c| c as Arc<dyn RemoteCache>))
    }

    fn default_cache_name(&self) -> &str {
        &self.default_cache
    }
}

/// The alias-naming cache.
#[derive(Debug, Default)]
pub struct InMemoryAliasSource {
    aliases: RwLock<FastHashMap<String, String>>,
    failure: RwLock<Option<String>>,
    lookups: AtomicUsize,
}

impl InMemoryAliasSource {
    /// Returns the number of lookups performed.
    #[must_use]
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Acquire)
    }
}

impl AliasSource for InMemoryAliasSource {
    fn alias_for(&self, table: &str) -> Result<Option<String>> {
        self.lookups.fetch_add(1, Ordering::AcqRel);
        if let Some(reason) = &*self.failure.read() {
            return Err(Error::Stream(StreamError::Fetch {
                cache: ALIAS_CACHE_NAME.to_string(),
                reason: reason.clone(),
            }));
        }
        Ok(self.aliases.read().get(table).cloned())
    }
}

/// An in-process connection to an in-memory store.
#[derive(Debug)]
pub struct InMemoryConnection {
    manager: Arc<InMemoryCacheManager>,
    registry: MarshallerRegistry,
    aliases: Arc<InMemoryAliasSource>,
    protobuf_files: RwLock<FastHashMap<String, String>>,
    rejections: RwLock<FastHashMap<String, String>>,
    protobuf_registrations: AtomicUsize,
}

impl InMemoryConnection {
    /// Creates a connection whose default cache is `default_cache`.
    #[must_use]
    pub fn new(default_cache: &str) -> Self {
        Self {
            manager: Arc::new(InMemoryCacheManager::new(default_cache)),
            registry: MarshallerRegistry::new(),
            aliases: Arc::new(InMemoryAliasSource::default()),
            protobuf_files: RwLock::new(FastHashMap::default()),
            rejections: RwLock::new(FastHashMap::default()),
            protobuf_registrations: AtomicUsize::new(0),
        }
    }

    /// Returns the default cache.
    #[must_use]
    pub fn default_cache(&self) -> Arc<InMemoryCache> {
        self.manager.create_cache(&self.manager.default_cache)
    }

    /// Returns the named cache, creating it if needed.
    pub fn create_cache(&self, name: &str) -> Arc<InMemoryCache> {
        self.manager.create_cache(name)
    }

    /// Teaches the store the document layout of `root_table`'s document type,
    /// so it can evaluate query conditions over it.
    pub fn define_document(&self, schema: &Schema, root_table: &str) -> std::result::Result<(), SchemaError> {
        let shape = TableShape::derive(schema, root_table)?;
        self.manager
            .catalog
            .shapes
            .write()
            .insert(shape.document_type().to_string(), Arc::new(shape));
        Ok(())
    }

    /// Returns the decode context.
    #[must_use]
    pub fn registry(&self) -> &MarshallerRegistry {
        &self.registry
    }

    /// Returns the alias-naming cache.
    #[must_use]
    pub fn aliases(&self) -> &Arc<InMemoryAliasSource> {
        &self.aliases
    }

    /// Points `table` at the table currently backing it.
    pub fn set_alias(&self, table: &str, target: &str) {
        self.aliases
            .aliases
            .write()
            .insert(table.to_string(), target.to_string());
    }

    /// Removes an alias.
    pub fn clear_alias(&self, table: &str) {
        self.aliases.aliases.write().remove(table);
    }

    /// Makes alias lookups fail with `reason`, or succeed again with `None`.
    pub fn fail_alias_lookups(&self, reason: Option<&str>) {
        *self.aliases.failure.write() = reason.map(str::to_string);
    }

    /// Makes the store reject a protobuf file with the given errors.
    pub fn reject_protobuf_file(&self, identifier: &str, errors: &str) {
        self.rejections
            .write()
            .insert(identifier.to_string(), errors.to_string());
    }

    /// Stops rejecting a protobuf file.
    pub fn accept_protobuf_file(&self, identifier: &str) {
        self.rejections.write().remove(identifier);
    }

    /// Returns the contents of a registered protobuf file.
    #[must_use]
    pub fn protobuf_file(&self, identifier: &str) -> Option<String> {
        self.protobuf_files.read().get(identifier).cloned()
    }

    /// Returns how many protobuf files were accepted.
    #[must_use]
    pub fn protobuf_registrations(&self) -> usize {
        self.protobuf_registrations.load(Ordering::Acquire)
    }
}

impl CacheConnection for InMemoryConnection {
    fn cache(&self) -> Result<Arc<dyn RemoteCache>> {
        Ok(self.default_cache() as Arc<dyn RemoteCache>)
    }

    fn cache_manager(&self) -> Arc<dyn CacheManager> {
        Arc::clone(&self.manager) as Arc<dyn CacheManager>
    }

    fn register_protobuf_file(
        &self,
        resource: &ProtobufResource,
    ) -> std::result::Result<(), SchemaError> {
        if let Some(errors) = self.rejections.read().get(resource.identifier()) {
            return Err(SchemaError::Rejected {
                identifier: resource.identifier().to_string(),
                errors: errors.clone(),
            });
        }
        self.protobuf_files.write().insert(
            resource.identifier().to_string(),
            resource.contents().to_string(),
        );
        self.protobuf_registrations.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn register_marshaller(&self, marshaller: &Arc<RowMarshaller>) -> Result<()> {
        self.registry.register(marshaller);
        Ok(())
    }

    fn unregister_marshaller(&self, marshaller: &RowMarshaller) -> Result<()> {
        if self.registry.unregister(marshaller) {
            Ok(())
        } else {
            Err(Error::Internal(format!(
                "marshaller for {} is not registered",
                marshaller.type_name()
            )))
        }
    }

    fn alias_source(&self) -> Option<Arc<dyn AliasSource>> {
        Some(Arc::clone(&self.aliases) as Arc<dyn AliasSource>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbridge_common::types::ColumnType;
    use docbridge_core::document::ProtoWriter;
    use docbridge_core::schema::{Column, Table};

    const PERSON: &str = "tutorial.Person";

    fn connection() -> InMemoryConnection {
        let schema = Schema::new()
            .with_table(
                Table::root("Person", PERSON)
                    .with_column(Column::new("id", 1, ColumnType::Int32))
                    .with_column(Column::new("name", 2, ColumnType::String)),
            )
            .with_table(
                Table::nested("Phone", "tutorial.PhoneNumber", "Person", "phones", 4, true)
                    .with_column(Column::new("number", 1, ColumnType::String)),
            );
        let connection = InMemoryConnection::new("default");
        connection.define_document(&schema, "Person").unwrap();
        let cache = connection.default_cache();
        for (id, name, phones) in [
            (1, "Alice", &["1", "2"][..]),
            (2, "Bob", &[][..]),
            (3, "Carol", &["3"][..]),
        ] {
            let mut doc = ProtoWriter::new().int32(1, id).string(2, name);
            for number in phones {
                doc = doc.message(4, ProtoWriter::new().string(1, number));
            }
            cache.insert(PERSON, doc.finish());
        }
        connection
    }

    fn fetch(connection: &InMemoryConnection, query: &str) -> usize {
        connection.default_cache().fetch_page(query, 0, 100).unwrap().len()
    }

    #[test]
    fn test_fetch_without_condition_pages() {
        let connection = connection();
        let cache = connection.default_cache();
        assert_eq!(cache.fetch_page("FROM tutorial.Person g0", 1, 1).unwrap().len(), 1);
        assert_eq!(cache.fetch_page("FROM tutorial.Person g0", 2, 5).unwrap().len(), 1);
        assert_eq!(cache.fetch_count(), 2);
        assert_eq!(cache.requests()[1].start_offset, 2);
    }

    #[test]
    fn test_store_side_conditions() {
        let connection = connection();
        assert_eq!(fetch(&connection, "FROM tutorial.Person g0 WHERE g0.id > 1"), 2);
        assert_eq!(fetch(&connection, "FROM tutorial.Person g0 WHERE g0.name LIKE '%o%'"), 2);
        assert_eq!(fetch(&connection, "FROM tutorial.Person g0 WHERE g0.phones.number = '2'"), 1);
        assert_eq!(fetch(&connection, "FROM tutorial.Person g0 WHERE NOT (g0.id IN (1, 3))"), 1);
        assert_eq!(fetch(&connection, "FROM tutorial.Person g0 WHERE g0.phones.number IS NULL"), 1);
    }

    #[test]
    fn test_unknown_entity_and_property() {
        let connection = connection();
        let cache = connection.default_cache();
        assert_eq!(cache.fetch_page("FROM other.Doc g0", 0, 10).unwrap().len(), 0);
        assert!(cache.fetch_page("FROM other.Doc g0 WHERE g0.x = 1", 0, 10).is_err());
        assert!(cache.fetch_page("FROM tutorial.Person g0 WHERE g0.nope = 1", 0, 10).is_err());
        assert!(cache.fetch_page("DELETE FROM tutorial.Person", 0, 10).is_err());
    }

    #[test]
    fn test_injected_fetch_failure() {
        let connection = connection();
        let cache = connection.default_cache();
        cache.fail_fetches_from(2, "connection reset");
        assert!(cache.fetch_page("FROM tutorial.Person g0", 0, 1).is_ok());
        let err = cache.fetch_page("FROM tutorial.Person g0", 1, 1).unwrap_err();
        assert_eq!(
            err,
            StreamError::Fetch {
                cache: "default".into(),
                reason: "connection reset".into()
            }
        );
        cache.clear_failures();
        assert!(cache.fetch_page("FROM tutorial.Person g0", 1, 1).is_ok());
    }

    #[test]
    fn test_named_caches() {
        let connection = connection();
        assert!(connection.cache_named("people").is_err());
        connection.create_cache("people");
        assert_eq!(connection.cache_named("people").unwrap().name(), "people");
        assert_eq!(connection.cache_manager().default_cache_name(), "default");
    }

    #[test]
    fn test_alias_source() {
        let connection = connection();
        let source = connection.alias_source().unwrap();
        assert_eq!(source.alias_for("Person").unwrap(), None);
        connection.set_alias("Person", "PersonStaging");
        assert_eq!(source.alias_for("Person").unwrap().as_deref(), Some("PersonStaging"));
        connection.fail_alias_lookups(Some("timeout"));
        assert!(source.alias_for("Person").is_err());
        assert_eq!(connection.aliases().lookups(), 3);
    }
}
