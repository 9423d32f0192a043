//! Paged result streaming.
//!
//! A [`ResultStream`] pulls pages of raw documents from a remote cache and
//! turns them into rows: decode, residual match, projection with unwinding,
//! then offset and limit. It is lazy, forward-only, and not restartable.
//!
//! The stream owns the execution's [`MarshallerScope`], so the marshaller
//! stays registered exactly as long as rows may still be produced: it is
//! released when the stream is exhausted, fails, is closed, or is dropped.

use std::collections::VecDeque;
use std::sync::Arc;

use docbridge_adapters::remote::{MarshallerScope, RemoteCache};
use docbridge_common::utils::error::{Error, Result};
use docbridge_core::execution::{ProjectionPlan, Row};
use docbridge_core::schema::FieldId;

use crate::config::{DEFAULT_BATCH_SIZE, DecodePolicy};

/// Paging and row-window options of one cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorOptions {
    /// Documents requested per page.
    pub batch_size: usize,
    /// Maximum rows to emit.
    pub limit: Option<usize>,
    /// Rows to skip before emitting.
    pub offset: usize,
    /// Whether the store applies offset and limit (one row per document).
    pub native_paging: bool,
    /// Handling of undecodable documents.
    pub decode_policy: DecodePolicy,
}

impl Default for CursorOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            limit: None,
            offset: 0,
            native_paging: false,
            decode_policy: DecodePolicy::Abort,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    Open,
    Exhausted,
    Failed,
}

/// A lazy, finite, forward-only sequence of rows.
pub struct ResultStream {
    cache: Arc<dyn RemoteCache>,
    query: String,
    plan: ProjectionPlan,
    scope: MarshallerScope,
    batch_size: usize,
    limit: Option<usize>,
    decode_policy: DecodePolicy,
    /// Rows still to drop client-side.
    skip: usize,
    /// Remote offset of the next page.
    next_start: usize,
    remote_exhausted: bool,
    pending: VecDeque<Row>,
    /// Failure surfaced once the rows produced before it are drained.
    deferred: Option<Error>,
    state: CursorState,
    rows_emitted: usize,
    pages_fetched: usize,
    decode_failures: usize,
}

impl ResultStream {
    /// Opens a stream over `query`. Nothing is fetched until the first row
    /// is requested.
    pub fn open(
        cache: Arc<dyn RemoteCache>,
        query: impl Into<String>,
        fields: &[FieldId],
        scope: MarshallerScope,
        options: CursorOptions,
    ) -> Self {
        let plan = scope.marshaller().plan(fields);
        // A native offset is applied by the store; it must not be applied
        // again here.
        let (next_start, skip) = if options.native_paging {
            (options.offset, 0)
        } else {
            (0, options.offset)
        };
        Self {
            cache,
            query: query.into(),
            plan,
            scope,
            batch_size: options.batch_size.max(1),
            limit: options.limit,
            decode_policy: options.decode_policy,
            skip,
            next_start,
            remote_exhausted: false,
            pending: VecDeque::new(),
            deferred: None,
            state: CursorState::Open,
            rows_emitted: 0,
            pages_fetched: 0,
            decode_failures: 0,
        }
    }

    /// Returns the next row, or `Ok(None)` at end of stream.
    ///
    /// After end of stream or a failure every later call returns `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns the page fetch failure, or the decode failure under
    /// [`DecodePolicy::Abort`]; the stream is terminated either way.
    pub fn next_row(&mut self) -> Result<Option<Row>> {
        loop {
            if self.state != CursorState::Open {
                return Ok(None);
            }
            if self.limit_reached() {
                self.finish(CursorState::Exhausted);
                return Ok(None);
            }
            if let Some(row) = self.pending.pop_front() {
                self.rows_emitted += 1;
                if self.limit_reached() {
                    self.finish(CursorState::Exhausted);
                }
                return Ok(Some(row));
            }
            if let Some(error) = self.deferred.take() {
                self.finish(CursorState::Failed);
                return Err(error);
            }
            if self.remote_exhausted {
                self.finish(CursorState::Exhausted);
                return Ok(None);
            }
            if let Err(error) = self.fetch_page() {
                self.finish(CursorState::Failed);
                return Err(error);
            }
        }
    }

    /// Stops the stream and releases the marshaller registration.
    pub fn close(&mut self) {
        if self.state == CursorState::Open {
            self.finish(CursorState::Exhausted);
        }
    }

    /// Returns the query string.
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Returns the number of values in each row.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.plan.arity()
    }

    /// Returns the number of rows emitted so far.
    #[must_use]
    pub fn rows_emitted(&self) -> usize {
        self.rows_emitted
    }

    /// Returns the number of pages fetched.
    #[must_use]
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Returns the number of documents dropped because they could not be
    /// decoded.
    #[must_use]
    pub fn decode_failures(&self) -> usize {
        self.decode_failures
    }

    /// Returns true once the stream can produce no more rows.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state != CursorState::Open
    }

    /// Returns true if the marshaller is still registered.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        !self.scope.is_released()
    }

    fn limit_reached(&self) -> bool {
        self.limit.is_some_and(|limit| self.rows_emitted >= limit)
    }

    fn finish(&mut self, state: CursorState) {
        self.state = state;
        self.pending.clear();
        self.deferred = None;
        self.scope.release();
    }

    fn fetch_page(&mut self) -> Result<()> {
        let mut max_results = self.batch_size;
        if self.skip == 0 {
            if let Some(limit) = self.limit {
                // With one row per document, never ask for more than the
                // rows still missing.
                if self.plan.groups().is_empty() && self.scope.marshaller().residual().is_none() {
                    max_results = max_results.min(limit - self.rows_emitted);
                }
            }
        }

        let page = self
            .cache
            .fetch_page(&self.query, self.next_start, max_results)?;
        self.pages_fetched += 1;
        self.next_start += page.len();
        if page.len() < max_results {
            self.remote_exhausted = true;
        }
        tracing::debug!(
            "fetched page {} from {}: {} documents at offset {}",
            self.pages_fetched,
            self.cache.name(),
            page.len(),
            self.next_start - page.len()
        );

        let marshaller = Arc::clone(self.scope.marshaller());
        for raw in &page {
            let document = match marshaller.decode(raw) {
                Ok(document) => document,
                Err(e) => match self.decode_policy {
                    DecodePolicy::Abort => {
                        self.deferred = Some(e.into());
                        return Ok(());
                    }
                    DecodePolicy::Skip => {
                        self.decode_failures += 1;
                        tracing::warn!(
                            "Skipping undecodable {} document: {}",
                            marshaller.type_name(),
                            e
                        );
                        continue;
                    }
                },
            };
            if !marshaller.matches(&document) {
                continue;
            }
            for row in marshaller.project_with(&self.plan, &document) {
                if self.skip > 0 {
                    self.skip -= 1;
                } else {
                    self.pending.push_back(row);
                }
            }
        }
        Ok(())
    }
}

impl Iterator for ResultStream {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

impl std::fmt::Debug for ResultStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultStream")
            .field("cache", &self.cache.name())
            .field("query", &self.query)
            .field("state", &self.state)
            .field("rows_emitted", &self.rows_emitted)
            .field("pages_fetched", &self.pages_fetched)
            .finish()
    }
}
