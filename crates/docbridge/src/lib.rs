//! # Docbridge
//!
//! Relational queries over a remote protobuf document cache.
//!
//! Start with [`Connector`]: it wraps a [`CacheConnection`] and a relational
//! [`Schema`], translates each [`RelationalQuery`] into an Ickle query plus a
//! client-side residual filter, and streams the matching documents back as
//! flat [`Row`]s, unwinding repeated fields into one row per element.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use docbridge::{
//!     Column, ColumnType, Config, Connector, InMemoryConnection, ProtoWriter, RelationalQuery,
//!     Schema, Table, TableRef, Value,
//! };
//!
//! let schema = Schema::new().with_table(
//!     Table::root("Person", "tutorial.Person")
//!         .with_column(Column::new("name", 1, ColumnType::String)),
//! );
//! let connection = Arc::new(InMemoryConnection::new("default"));
//! connection
//!     .default_cache()
//!     .insert("tutorial.Person", ProtoWriter::new().string(1, "Alice").finish());
//!
//! let connector = Connector::new(Config::default(), connection, Arc::new(schema));
//! let rows = connector.query_rows(
//!     RelationalQuery::select_from(TableRef::new("Person")).column("name"),
//! )?;
//! assert_eq!(rows[0].values(), &[Value::from("Alice")]);
//! # Ok::<(), docbridge::Error>(())
//! ```

// Entry point, configuration, and the relational query model
pub use docbridge_engine::{
    AliasResolver, BinaryOp, ColumnRef, Config, Connector, CursorOptions, DecodePolicy,
    ExecutionContext, Expression, QueryExecution, RelationalQuery, ResultStream, TableRef,
    TranslatedQuery, UnaryOp,
};

// Schema, documents, and rows
pub use docbridge_core::{Column, ProtoWriter, Row, RowMarshaller, Schema, Table, TableShape};

// Values and errors
pub use docbridge_common::{ColumnType, Error, Result, Value};

// Remote store collaborators and the in-memory backend
pub use docbridge_adapters::{
    AliasSource, CacheConnection, CacheManager, InMemoryCache, InMemoryConnection,
    MarshallerScope, ProtobufResource, RemoteCache,
};
