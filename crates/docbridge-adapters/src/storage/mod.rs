//! Cache backends.
//!
//! - [`InMemoryConnection`] - In-process store with named caches, store-side
//!   query evaluation, and fault injection

mod matcher;
mod memory;

pub use memory::{
    ALIAS_CACHE_NAME, InMemoryAliasSource, InMemoryCache, InMemoryCacheManager,
    InMemoryConnection, PageRequest,
};
