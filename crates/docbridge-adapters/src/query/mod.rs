//! Query language support for cache backends.
//!
//! - [`ickle`] - The native document query language of the remote cache

pub mod ickle;
