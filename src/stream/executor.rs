//! # Streaming Executor
//!
//! Executes a SELECT through a store cursor and yields mapped rows lazily,
//! one bounded fetch at a time.
//!
//! The cursor is released exactly once: when the stream is exhausted, when
//! `close()` is called, when a fetch or mapping error is yielded, or when
//! the stream is dropped early.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, error};

use super::row::RowMapper;
use crate::errors::{CrudError, CrudResult};
use crate::metrics::EngineMetrics;
use crate::store::{RawRow, RowCursor, SqlStore, SqlValue};

pub const DEFAULT_FETCH_SIZE: usize = 250;
pub const MAX_FETCH_SIZE: usize = 1000;

/// Per-stream options
#[derive(Debug, Clone, Default)]
pub struct StreamOptions {
    /// Name used in logs
    pub stream_name: String,
    /// Rows per fetch; the executor default when absent
    pub fetch_size: Option<usize>,
}

impl StreamOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            stream_name: name.into(),
            fetch_size: None,
        }
    }

    pub fn with_fetch_size(mut self, fetch_size: usize) -> Self {
        self.fetch_size = Some(fetch_size);
        self
    }
}

/// Opens cursors against the store
pub struct StreamingExecutor {
    store: Arc<dyn SqlStore>,
    default_fetch_size: usize,
    max_fetch_size: usize,
    metrics: Arc<EngineMetrics>,
}

impl StreamingExecutor {
    pub fn new(store: Arc<dyn SqlStore>, metrics: Arc<EngineMetrics>) -> Self {
        Self {
            store,
            default_fetch_size: DEFAULT_FETCH_SIZE,
            max_fetch_size: MAX_FETCH_SIZE,
            metrics,
        }
    }

    /// Override the default and maximum fetch sizes
    pub fn with_fetch_limits(mut self, default_fetch_size: usize, max_fetch_size: usize) -> Self {
        self.max_fetch_size = max_fetch_size.max(1);
        self.default_fetch_size = default_fetch_size.clamp(1, self.max_fetch_size);
        self
    }

    /// Fetch size actually used for `options`
    pub fn effective_fetch_size(&self, options: &StreamOptions) -> usize {
        options
            .fetch_size
            .unwrap_or(self.default_fetch_size)
            .clamp(1, self.max_fetch_size)
    }

    /// Open a lazy, single-pass stream of mapped rows
    pub fn stream<M: RowMapper>(
        &self,
        sql: &str,
        params: &[SqlValue],
        mapper: M,
        options: StreamOptions,
    ) -> CrudResult<RowStream<M>> {
        let fetch_size = self.effective_fetch_size(&options);
        let cursor = self
            .store
            .open_cursor(sql, params, fetch_size)
            .map_err(|e| {
                error!(stream = %options.stream_name, error = %e, "Failed to open cursor");
                CrudError::execution(format!("opening stream '{}'", options.stream_name), e)
            })?;

        self.metrics.increment_streams_opened();
        debug!(
            stream = %options.stream_name,
            fetch_size,
            "Opened streaming cursor"
        );

        Ok(RowStream {
            name: options.stream_name,
            columns: cursor.columns().to_vec(),
            cursor: Some(cursor),
            mapper,
            buffer: VecDeque::new(),
            rows: 0,
            metrics: self.metrics.clone(),
        })
    }

    /// Run `f` over a stream that is closed when `f` returns
    pub fn with_stream<M, F, R>(
        &self,
        sql: &str,
        params: &[SqlValue],
        mapper: M,
        options: StreamOptions,
        f: F,
    ) -> CrudResult<R>
    where
        M: RowMapper,
        F: FnOnce(&mut RowStream<M>) -> R,
    {
        let mut stream = self.stream(sql, params, mapper, options)?;
        let result = f(&mut stream);
        stream.close();
        Ok(result)
    }
}

/// Lazy, finite, single-pass sequence of mapped rows
pub struct RowStream<M: RowMapper> {
    name: String,
    columns: Vec<String>,
    cursor: Option<Box<dyn RowCursor>>,
    mapper: M,
    buffer: VecDeque<RawRow>,
    rows: u64,
    metrics: Arc<EngineMetrics>,
}

impl<M: RowMapper> RowStream<M> {
    /// Column labels reported by the cursor
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows yielded so far
    pub fn rows_read(&self) -> u64 {
        self.rows
    }

    pub fn is_closed(&self) -> bool {
        self.cursor.is_none()
    }

    /// Release the cursor. Idempotent.
    pub fn close(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            cursor.close();
            self.buffer.clear();
            self.metrics.increment_streams_closed();
            self.metrics.add_rows_streamed(self.rows);
            debug!("Closed streaming cursor '{}' after {} rows", self.name, self.rows);
        }
    }
}

impl<M: RowMapper> Iterator for RowStream<M> {
    type Item = CrudResult<M::Output>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.buffer.pop_front() {
                return match self.mapper.map_row(&self.columns, row) {
                    Ok(mapped) => {
                        self.rows += 1;
                        Some(Ok(mapped))
                    }
                    Err(e) => {
                        self.close();
                        Some(Err(e))
                    }
                };
            }

            let cursor = self.cursor.as_mut()?;
            match cursor.next_batch() {
                Ok(batch) if batch.is_empty() => {
                    self.close();
                    return None;
                }
                Ok(batch) => self.buffer.extend(batch),
                Err(e) => {
                    error!(stream = %self.name, error = %e, "Cursor fetch failed");
                    let name = self.name.clone();
                    self.close();
                    return Some(Err(CrudError::execution(
                        format!("fetching rows for stream '{}'", name),
                        e,
                    )));
                }
            }
        }
    }
}

impl<M: RowMapper> Drop for RowStream<M> {
    fn drop(&mut self) {
        self.close();
    }
}
