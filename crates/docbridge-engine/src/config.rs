//! Configuration options for query execution.

use serde::{Deserialize, Serialize};

/// Default number of documents fetched per page.
pub const DEFAULT_BATCH_SIZE: usize = 256;

/// What a result stream does with a document it cannot decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodePolicy {
    /// Fail the stream; a malformed document usually means a schema mismatch
    /// that affects later documents too.
    #[default]
    Abort,
    /// Drop the document, count it, and keep streaming.
    Skip,
}

/// Execution configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Documents requested per page fetch.
    pub batch_size: usize,
    /// Handling of undecodable documents.
    pub decode_policy: DecodePolicy,
    /// Whether tables are resolved through the remote alias-naming cache.
    pub use_alias_cache: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            decode_policy: DecodePolicy::Abort,
            use_alias_cache: false,
        }
    }
}

impl Config {
    /// Sets the page size; values below one are raised to one.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Sets the decode failure policy.
    #[must_use]
    pub fn with_decode_policy(mut self, policy: DecodePolicy) -> Self {
        self.decode_policy = policy;
        self
    }

    /// Enables or disables alias resolution through the alias-naming cache.
    #[must_use]
    pub fn with_alias_cache(mut self, enabled: bool) -> Self {
        self.use_alias_cache = enabled;
        self
    }

    /// Returns the page size actually used.
    #[must_use]
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }
}
