//! # docbridge-adapters
//!
//! Adapters layer for Docbridge: the narrow interfaces to the remote document
//! cache, protobuf schema registration, and an in-process cache backend.
//!
//! ## Modules
//!
//! - [`remote`] - Remote cache collaborator traits and scoped registration
//! - [`query`] - Ickle query language parser
//! - [`storage`] - Cache backends (in-memory)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod query;
pub mod remote;
pub mod storage;

pub use remote::{
    AliasSource, CacheConnection, CacheManager, MarshallerScope, ProtobufResource, RemoteCache,
    SchemaRegistrar,
};
pub use storage::{InMemoryCache, InMemoryConnection};
