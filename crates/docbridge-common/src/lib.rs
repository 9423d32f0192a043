//! # docbridge-common
//!
//! Foundation layer for Docbridge: value types and the error taxonomy.
//!
//! This crate provides the fundamental building blocks used by all other
//! Docbridge crates. It has no internal dependencies and should be kept minimal.
//!
//! ## Modules
//!
//! - [`types`] - Core type definitions (Value, ColumnType)
//! - [`utils`] - Utility functions and helpers (hashing, errors)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod types;
pub mod utils;

// Re-export commonly used types at crate root
pub use types::{ColumnType, Value};
pub use utils::error::{Error, Result};
