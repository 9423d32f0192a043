//! Table alias resolution.
//!
//! A remote store can expose several logical views over one physical cache,
//! and swap the table backing a view at runtime. The [`AliasResolver`] maps a
//! table reference to the canonical [`TableShape`] of the table backing it and
//! keeps the result for the lifetime of the connection, so repeated
//! references share one `Arc<TableShape>` and derivation happens once.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use docbridge_adapters::remote::AliasSource;
use docbridge_common::utils::error::{Result, TranslationError};
use docbridge_common::utils::hash::FastHashMap;
use docbridge_core::schema::{Schema, TableShape};
use parking_lot::RwLock;

use crate::execution::ExecutionContext;
use crate::query::plan::TableRef;

#[derive(Debug, Default)]
struct ResolverCache {
    /// Table name to the table currently backing it, as reported by the
    /// alias-naming cache.
    targets: FastHashMap<String, String>,
    /// Backing table name to its shape.
    shapes: FastHashMap<String, Arc<TableShape>>,
}

/// Resolves table references to canonical shapes.
pub struct AliasResolver {
    schema: Arc<Schema>,
    source: Option<Arc<dyn AliasSource>>,
    cache: RwLock<ResolverCache>,
    derivations: AtomicUsize,
}

impl AliasResolver {
    /// Creates a resolver over `schema` without alias lookups.
    #[must_use]
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            source: None,
            cache: RwLock::new(ResolverCache::default()),
            derivations: AtomicUsize::new(0),
        }
    }

    /// Consults `source` for table aliases when the context asks for it.
    #[must_use]
    pub fn with_alias_source(mut self, source: Arc<dyn AliasSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Returns the relational schema.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Resolves a table reference to the shape of the table backing it.
    ///
    /// # Errors
    ///
    /// Fails with [`TranslationError::UnknownTable`] when the table is not in
    /// the schema. Alias lookup and derivation failures are returned as is;
    /// the caller decides whether to degrade.
    pub fn resolve(&self, ctx: &ExecutionContext, table: &TableRef) -> Result<Arc<TableShape>> {
        if self.schema.table(&table.name).is_none() {
            return Err(TranslationError::UnknownTable(table.name.clone()).into());
        }
        let target = match (&self.source, ctx.alias_mode()) {
            (Some(source), true) => self.target_of(source.as_ref(), &table.name)?,
            _ => table.name.clone(),
        };
        self.shape_of(&target)
    }

    /// Returns the shape of `table` itself, ignoring any alias.
    ///
    /// Used when alias resolution failed and the reference degrades to the
    /// schema's own view of the table.
    pub fn derive_unaliased(&self, table: &str) -> Result<Arc<TableShape>> {
        if self.schema.table(table).is_none() {
            return Err(TranslationError::UnknownTable(table.to_string()).into());
        }
        self.shape_of(table)
    }

    /// Forgets what is known about `table`, after its alias was swapped.
    pub fn invalidate(&self, table: &str) {
        let mut cache = self.cache.write();
        cache.targets.remove(table);
        cache.shapes.remove(table);
    }

    /// Forgets everything.
    pub fn clear(&self) {
        let mut cache = self.cache.write();
        cache.targets.clear();
        cache.shapes.clear();
    }

    /// Returns how many shapes were derived from the schema.
    #[must_use]
    pub fn derivations(&self) -> usize {
        self.derivations.load(Ordering::Acquire)
    }

    /// Returns the number of cached shapes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.read().shapes.len()
    }

    /// Returns true if no shape is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn target_of(&self, source: &dyn AliasSource, table: &str) -> Result<String> {
        if let Some(target) = self.cache.read().targets.get(table) {
            return Ok(target.clone());
        }
        let target = source
            .alias_for(table)?
            .unwrap_or_else(|| table.to_string());
        tracing::trace!("table {} is backed by {}", table, target);

        let mut cache = self.cache.write();
        Ok(cache
            .targets
            .entry(table.to_string())
            .or_insert(target)
            .clone())
    }

    fn shape_of(&self, table: &str) -> Result<Arc<TableShape>> {
        if let Some(shape) = self.cache.read().shapes.get(table) {
            return Ok(Arc::clone(shape));
        }
        // Derive without holding the lock; a concurrent miss on the same key
        // loses the insert below and adopts the winner's shape.
        let derived = Arc::new(TableShape::derive(&self.schema, table)?);
        self.derivations.fetch_add(1, Ordering::AcqRel);

        let mut cache = self.cache.write();
        Ok(Arc::clone(
            cache.shapes.entry(table.to_string()).or_insert(derived),
        ))
    }
}

impl std::fmt::Debug for AliasResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AliasResolver")
            .field("shapes", &self.len())
            .field("alias_source", &self.source.is_some())
            .field("derivations", &self.derivations())
            .finish()
    }
}
