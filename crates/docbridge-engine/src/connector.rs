//! The connector entry point.

use std::sync::Arc;

use docbridge_adapters::remote::{CacheConnection, ProtobufResource, SchemaRegistrar};
use docbridge_common::utils::error::Result;
use docbridge_core::execution::Row;
use docbridge_core::schema::Schema;

use crate::alias::AliasResolver;
use crate::config::Config;
use crate::execution::{ExecutionContext, QueryExecution};
use crate::query::{RelationalQuery, TranslatedQuery};
use crate::stream::ResultStream;

/// A relational view over one remote store connection.
///
/// Owns the pieces shared by every execution on the connection: the alias
/// resolver cache and the set of protobuf schemas already distributed.
pub struct Connector {
    config: Config,
    connection: Arc<dyn CacheConnection>,
    resolver: Arc<AliasResolver>,
    registrar: SchemaRegistrar,
}

impl Connector {
    /// Creates a connector over `connection` exposing `schema`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use docbridge_adapters::storage::InMemoryConnection;
    /// use docbridge_common::types::ColumnType;
    /// use docbridge_core::schema::{Column, Schema, Table};
    /// use docbridge_engine::{Config, Connector};
    ///
    /// let schema = Schema::new().with_table(
    ///     Table::root("Item", "shop.Item").with_column(Column::new("n", 1, ColumnType::Int32)),
    /// );
    /// let connection = Arc::new(InMemoryConnection::new("default"));
    /// let connector = Connector::new(Config::default(), connection, Arc::new(schema));
    /// assert_eq!(connector.resolver().derivations(), 0);
    /// ```
    pub fn new(config: Config, connection: Arc<dyn CacheConnection>, schema: Arc<Schema>) -> Self {
        let mut resolver = AliasResolver::new(schema);
        if let Some(source) = connection.alias_source() {
            resolver = resolver.with_alias_source(source);
        }
        Self {
            config,
            connection,
            resolver: Arc::new(resolver),
            registrar: SchemaRegistrar::new(),
        }
    }

    /// Distributes a protobuf schema to the store, once per identifier.
    ///
    /// Returns whether the schema was sent.
    pub fn register_schema(&self, resource: &ProtobufResource) -> Result<bool> {
        Ok(self.registrar.register(self.connection.as_ref(), resource)?)
    }

    /// Prepares an execution with the default context.
    #[must_use]
    pub fn prepare(&self, query: RelationalQuery) -> QueryExecution {
        self.prepare_with(query, ExecutionContext::new())
    }

    /// Prepares an execution with an explicit context.
    #[must_use]
    pub fn prepare_with(&self, query: RelationalQuery, ctx: ExecutionContext) -> QueryExecution {
        QueryExecution::new(
            self.config.clone(),
            Arc::clone(&self.connection),
            Arc::clone(&self.resolver),
            query,
            ctx,
        )
    }

    /// Translates a query without running it.
    pub fn translate(&self, query: RelationalQuery) -> Result<TranslatedQuery> {
        self.prepare(query).translate()
    }

    /// Runs a query and returns its row stream.
    pub fn execute(&self, query: RelationalQuery) -> Result<ResultStream> {
        self.prepare(query).execute()
    }

    /// Runs a query and collects every row.
    pub fn query_rows(&self, query: RelationalQuery) -> Result<Vec<Row>> {
        self.execute(query)?.collect()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the alias resolver shared by executions.
    #[must_use]
    pub fn resolver(&self) -> &Arc<AliasResolver> {
        &self.resolver
    }

    /// Returns the connection.
    #[must_use]
    pub fn connection(&self) -> &Arc<dyn CacheConnection> {
        &self.connection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbridge_adapters::storage::InMemoryConnection;
    use docbridge_common::types::ColumnType;
    use docbridge_common::utils::error::{Error, SchemaError};
    use docbridge_core::schema::{Column, Table};

    fn connector(connection: &Arc<InMemoryConnection>) -> Connector {
        let schema = Schema::new().with_table(
            Table::root("Item", "shop.Item").with_column(Column::new("n", 1, ColumnType::Int32)),
        );
        Connector::new(
            Config::default(),
            Arc::clone(connection) as Arc<dyn CacheConnection>,
            Arc::new(schema),
        )
    }

    #[test]
    fn test_register_schema_once() {
        let connection = Arc::new(InMemoryConnection::new("default"));
        let connector = connector(&connection);
        let resource = ProtobufResource::new("shop.proto", "message Item { int32 n = 1; }");

        assert!(connector.register_schema(&resource).unwrap());
        assert!(!connector.register_schema(&resource).unwrap());
        assert_eq!(connection.protobuf_registrations(), 1);
    }

    #[test]
    fn test_rejected_schema() {
        let connection = Arc::new(InMemoryConnection::new("default"));
        connection.reject_protobuf_file("shop.proto", "syntax error");
        let connector = connector(&connection);
        let err = connector
            .register_schema(&ProtobufResource::new("shop.proto", "message"))
            .unwrap_err();
        assert!(matches!(err, Error::Schema(SchemaError::Rejected { .. })));
    }

    #[test]
    fn test_query_rows_empty_cache() {
        let connection = Arc::new(InMemoryConnection::new("default"));
        let rows = connector(&connection)
            .query_rows(RelationalQuery::select_from(crate::query::TableRef::new("Item")).column("n"))
            .unwrap();
        assert!(rows.is_empty());
        assert!(connection.registry().is_empty());
    }
}
