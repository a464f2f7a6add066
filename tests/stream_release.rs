//! Streaming Tests
//!
//! Cursors opened for streams must be released on every exit path:
//! exhaustion, explicit close, early drop and fetch errors. Writes made
//! while a stream is open must not make it skip rows.

use std::sync::Arc;

use serde_json::json;

use tablecrud::auth::Principal;
use tablecrud::filter::FilterDescriptor;
use tablecrud::query::{OrderDirection, QueryRequest};
use tablecrud::store::{
    ExecOutcome, PagingStyle, RawRow, RowCursor, SqlStore, SqlValue, SqliteStore, StoreError,
    StoreResult, WriteBatch,
};
use tablecrud::{CrudEngine, CrudError, EngineConfig, ErrorKind};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup(fetch_size: usize) -> (Arc<SqliteStore>, CrudEngine) {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store
        .execute_script("CREATE TABLE events (id INTEGER PRIMARY KEY, kind TEXT, payload BLOB)")
        .unwrap();

    let mut script = String::new();
    for i in 1..=25 {
        let kind = if i % 2 == 0 { "even" } else { "odd" };
        script.push_str(&format!(
            "INSERT INTO events (kind, payload) VALUES ('{}', X'CAFE');",
            kind
        ));
    }
    store.execute_script(&script).unwrap();

    let mut config = EngineConfig::new(["events"]);
    config.stream_fetch_size = fetch_size;
    let engine = CrudEngine::builder(config)
        .sqlite(store.clone())
        .build()
        .unwrap();
    (store, engine)
}

/// Store whose cursors fail after a fixed number of fetches
struct FailingStore {
    inner: Arc<SqliteStore>,
    fail_after: usize,
}

struct FailingCursor {
    inner: Box<dyn RowCursor>,
    remaining: usize,
}

impl SqlStore for FailingStore {
    fn paging_style(&self) -> PagingStyle {
        self.inner.paging_style()
    }

    fn count(&self, sql: &str, params: &[SqlValue]) -> StoreResult<u64> {
        self.inner.count(sql, params)
    }

    fn open_cursor(
        &self,
        sql: &str,
        params: &[SqlValue],
        fetch_size: usize,
    ) -> StoreResult<Box<dyn RowCursor>> {
        Ok(Box::new(FailingCursor {
            inner: self.inner.open_cursor(sql, params, fetch_size)?,
            remaining: self.fail_after,
        }))
    }

    fn execute_batch(&self, batch: &WriteBatch) -> StoreResult<Vec<ExecOutcome>> {
        self.inner.execute_batch(batch)
    }
}

impl RowCursor for FailingCursor {
    fn columns(&self) -> &[String] {
        self.inner.columns()
    }

    fn next_batch(&mut self) -> StoreResult<Vec<RawRow>> {
        if self.remaining == 0 {
            return Err(StoreError::Driver("disk I/O error".to_string()));
        }
        self.remaining -= 1;
        self.inner.next_batch()
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

fn admin() -> Principal {
    Principal::authenticated("exporter").with_authority("ROLE_ADMIN")
}

fn ordered() -> QueryRequest {
    QueryRequest::new("events").order("id", OrderDirection::Asc)
}

// =============================================================================
// Release Tests
// =============================================================================

/// Exhausting the stream yields every row once and releases the cursor.
#[test]
fn test_stream_exhaustion() {
    let (store, engine) = setup(4);

    let mut stream = engine.stream(&admin(), &ordered()).unwrap();
    assert_eq!(store.open_cursor_count(), 1);

    let ids: Vec<i64> = stream
        .by_ref()
        .map(|row| row.unwrap()["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, (1..=25).collect::<Vec<_>>());
    assert!(stream.is_closed());
    assert_eq!(store.open_cursor_count(), 0);

    drop(stream);
    let metrics = engine.metrics();
    assert_eq!(metrics.streams_opened, 1);
    assert_eq!(metrics.streams_closed, 1);
    assert_eq!(metrics.rows_streamed, 25);
}

/// Dropping a partly consumed stream releases the cursor.
#[test]
fn test_stream_early_drop() {
    let (store, engine) = setup(4);

    {
        let stream = engine.stream(&admin(), &ordered()).unwrap();
        let first: Vec<_> = stream.take(3).collect();
        assert_eq!(first.len(), 3);
    }

    assert_eq!(store.open_cursor_count(), 0);
    assert_eq!(engine.metrics().streams_closed, 1);
}

/// Closing twice is harmless.
#[test]
fn test_stream_close_idempotent() {
    let (store, engine) = setup(4);

    let mut stream = engine.stream(&admin(), &ordered()).unwrap();
    assert!(stream.next().is_some());
    stream.close();
    stream.close();
    assert!(stream.next().is_none());
    drop(stream);

    assert_eq!(store.open_cursor_count(), 0);
    assert_eq!(engine.metrics().streams_closed, 1);
}

/// A fetch failure mid-stream surfaces once and releases the cursor.
#[test]
fn test_stream_error_releases_cursor() {
    let (store, engine) = setup(5);
    let failing = CrudEngine::builder(engine.config().clone())
        .catalog(store.clone())
        .store(Arc::new(FailingStore {
            inner: store.clone(),
            fail_after: 1,
        }))
        .build()
        .unwrap();

    let mut stream = failing.stream(&admin(), &ordered()).unwrap();
    for _ in 0..5 {
        assert!(stream.next().unwrap().is_ok());
    }

    let err = stream.next().unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExecutionError);
    assert!(stream.next().is_none());
    assert_eq!(stream.rows_read(), 5);
    assert_eq!(store.open_cursor_count(), 0);
}

// =============================================================================
// Concurrent Write Tests
// =============================================================================

/// Deleting rows already read never makes the stream skip rows it has not
/// reached yet.
#[test]
fn test_stream_with_deletes_behind_cursor() {
    let (store, engine) = setup(2);

    let mut ids = Vec::new();
    for row in engine.stream(&admin(), &ordered()).unwrap() {
        let id = row.unwrap()["id"].as_i64().unwrap();
        store
            .execute_script(&format!("DELETE FROM events WHERE id = {}", id))
            .unwrap();
        ids.push(id);
    }

    assert_eq!(ids, (1..=25).collect::<Vec<_>>());
    assert_eq!(store.open_cursor_count(), 0);
    assert_eq!(
        engine.count(&admin(), &QueryRequest::new("events")).unwrap(),
        0
    );
}

/// Writes behind the cursor neither reorder nor leak into the rows still to come.
#[test]
fn test_stream_with_inserts_during_read() {
    let (store, engine) = setup(3);

    let mut stream = engine.stream(&admin(), &ordered()).unwrap();
    let first = stream.next().unwrap().unwrap();
    assert_eq!(first["id"], json!(1));

    store
        .execute_script(
            "DELETE FROM events WHERE id <= 3;
             INSERT INTO events (id, kind) VALUES (0, 'late');",
        )
        .unwrap();

    let rest: Vec<i64> = stream
        .map(|row| row.unwrap()["id"].as_i64().unwrap())
        .collect();
    assert!(rest.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(rest.last(), Some(&25));
    assert!(!rest.contains(&0));
}

// =============================================================================
// Row Shape Tests
// =============================================================================

/// Streams apply filters and normalize binary values.
#[test]
fn test_stream_filtered_rows() {
    let (store, engine) = setup(3);

    let request = ordered().filter(FilterDescriptor::eq("kind", json!("even")));
    let rows: Vec<_> = engine
        .stream(&admin(), &request)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(rows.len(), 12);
    assert!(rows.iter().all(|r| r["kind"] == json!("even")));
    assert_eq!(rows[0]["payload"], json!("yv4="));
    assert_eq!(store.open_cursor_count(), 0);
}

/// Streams are not capped by the page size limit.
#[test]
fn test_stream_unbounded_by_page_cap() {
    let (_store, engine) = setup(2);
    let mut config = engine.config().clone();
    config.max_page_size = 5;

    let capped = CrudEngine::builder(config)
        .sqlite(Arc::new(SqliteStore::open_in_memory().unwrap()))
        .build()
        .unwrap();
    assert!(matches!(
        capped.select(&admin(), &QueryRequest::new("events").page(10, 0)),
        Err(CrudError::LimitExceeded(10, 5))
    ));

    assert_eq!(engine.stream(&admin(), &ordered()).unwrap().count(), 25);
}
