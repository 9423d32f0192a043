//! Query execution.
//!
//! A [`QueryExecution`] runs one relational query end to end: bind tables
//! through the alias resolver, translate, build the row marshaller, register
//! it for the execution, and open the result stream. Everything that can fail
//! before streaming fails before the marshaller is registered.

use std::sync::Arc;

use docbridge_adapters::remote::{CacheConnection, MarshallerScope, RemoteCache};
use docbridge_common::utils::error::Result;
use docbridge_core::execution::RowMarshaller;

use crate::alias::AliasResolver;
use crate::config::Config;
use crate::query::{Binder, RelationalQuery, TranslatedQuery, translate};
use crate::stream::{CursorOptions, ResultStream};

/// Per-request settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Caller-supplied request identifier, for log correlation.
    pub request_id: Option<String>,
    /// Page size override.
    pub batch_size: Option<usize>,
    /// Alias mode override.
    pub use_alias_cache: Option<bool>,
}

impl ExecutionContext {
    /// Creates a context taking every setting from the configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags the request.
    #[must_use]
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Overrides the page size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size.max(1));
        self
    }

    /// Overrides alias mode.
    #[must_use]
    pub fn with_alias_cache(mut self, enabled: bool) -> Self {
        self.use_alias_cache = Some(enabled);
        self
    }

    /// Returns whether tables resolve through the alias-naming cache.
    #[must_use]
    pub fn alias_mode(&self) -> bool {
        self.use_alias_cache.unwrap_or(false)
    }

    fn merged(mut self, config: &Config) -> Self {
        self.batch_size.get_or_insert(config.effective_batch_size());
        self.use_alias_cache.get_or_insert(config.use_alias_cache);
        self
    }
}

/// One execution of a relational query.
pub struct QueryExecution {
    config: Config,
    connection: Arc<dyn CacheConnection>,
    resolver: Arc<AliasResolver>,
    query: RelationalQuery,
    ctx: ExecutionContext,
}

impl QueryExecution {
    /// Prepares an execution. Context settings override the configuration.
    pub fn new(
        config: Config,
        connection: Arc<dyn CacheConnection>,
        resolver: Arc<AliasResolver>,
        query: RelationalQuery,
        ctx: ExecutionContext,
    ) -> Self {
        let ctx = ctx.merged(&config);
        Self {
            config,
            connection,
            resolver,
            query,
            ctx,
        }
    }

    /// Returns the effective context.
    #[must_use]
    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    /// Binds and translates the query without touching the remote store
    /// (alias lookups aside).
    pub fn translate(&self) -> Result<TranslatedQuery> {
        let bindings = Binder::new(&self.resolver, &self.ctx).bind(&self.query)?;
        translate(&self.query, &bindings)
    }

    /// Runs the query and returns the stream of rows.
    ///
    /// # Errors
    ///
    /// Translation failures, a missing named cache, and a refused marshaller
    /// registration fail here; page and decode failures surface from the
    /// stream.
    pub fn execute(&self) -> Result<ResultStream> {
        let translated = self.translate()?;
        if let Some(id) = &self.ctx.request_id {
            tracing::debug!("request {}: {}", id, translated.query);
        }

        let marshaller = Arc::new(
            RowMarshaller::build(Arc::clone(&translated.shape), translated.residual.clone())
                .with_scope(translated.scope.iter().copied()),
        );
        let cache = self.cache_for(&translated)?;
        let scope = MarshallerScope::acquire(Arc::clone(&self.connection), marshaller)?;

        let options = CursorOptions {
            batch_size: self
                .ctx
                .batch_size
                .unwrap_or_else(|| self.config.effective_batch_size()),
            limit: translated.row_limit,
            offset: translated.row_offset,
            native_paging: translated.native_paging,
            decode_policy: self.config.decode_policy,
        };
        Ok(ResultStream::open(
            cache,
            translated.query.clone(),
            &translated.fields(),
            scope,
            options,
        ))
    }

    fn cache_for(&self, translated: &TranslatedQuery) -> Result<Arc<dyn RemoteCache>> {
        match translated.cache_name.as_deref() {
            Some(name) if name != self.connection.cache_manager().default_cache_name() => {
                self.connection.cache_named(name)
            }
            _ => self.connection.cache(),
        }
    }
}

impl std::fmt::Debug for QueryExecution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecution")
            .field("config", &self.config)
            .field("query", &self.query)
            .field("ctx", &self.ctx)
            .finish()
    }
}
