//! # Streaming
//!
//! Bounded-fetch cursors exposed as lazy row iterators.

mod executor;
mod row;

pub use executor::{RowStream, StreamOptions, StreamingExecutor, DEFAULT_FETCH_SIZE, MAX_FETCH_SIZE};
pub use row::{normalize, Record, RowMapper, VisibleRowMapper};

/// Stream of visible-column records
pub type RecordStream = RowStream<VisibleRowMapper>;
