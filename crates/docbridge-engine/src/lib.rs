//! # docbridge-engine
//!
//! The read path of Docbridge: relational queries in, relational rows out,
//! over a remote protobuf document cache.
//!
//! ## Modules
//!
//! - [`connector`] - Connector entry point shared by executions
//! - [`config`] - Configuration options
//! - [`alias`] - Table alias resolution and shape cache
//! - [`query`] - Relational plan, binding, filter pushdown, Ickle translation
//! - [`execution`] - One query execution end to end
//! - [`stream`] - Paged, lazy row streaming

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod alias;
pub mod config;
pub mod connector;
pub mod execution;
pub mod query;
pub mod stream;

pub use alias::AliasResolver;
pub use config::{Config, DecodePolicy};
pub use connector::Connector;
pub use execution::{ExecutionContext, QueryExecution};
pub use query::{
    BinaryOp, ColumnRef, Expression, RelationalQuery, TableRef, TranslatedQuery, UnaryOp,
};
pub use stream::{CursorOptions, ResultStream};
