//! SQLite connector.
//!
//! Implements [`Catalog`] and [`SqlStore`] over a writer connection guarded
//! by a mutex. Each cursor gets its own reader connection, stepped once
//! from start to end on a worker thread and handed over in batches of
//! `fetch_size` rows through a bounded channel. Writes committed while a
//! cursor is open never shift rows it has yet to return.
//!
//! File databases run in WAL mode, so a reader keeps the snapshot it
//! started with. In-memory databases are named shared-cache databases;
//! their readers run with `read_uncommitted` so writers are never
//! table-locked out by an open cursor.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::{ToSql, ToSqlOutput, Value as RusqliteValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    Catalog, ExecOutcome, PagingStyle, RawRow, RowCursor, SqlStore, SqlValue, StoreError,
    StoreResult, WriteBatch,
};
use crate::mutation::CrudOperation;
use crate::schema::{ColumnMetadata, ForeignKeyRef};

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(RusqliteValue::Null),
            SqlValue::Bool(b) => ToSqlOutput::Owned(RusqliteValue::Integer(i64::from(*b))),
            SqlValue::Integer(i) => ToSqlOutput::Owned(RusqliteValue::Integer(*i)),
            SqlValue::Real(f) => ToSqlOutput::Owned(RusqliteValue::Real(*f)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlValue::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            SqlValue::Timestamp(ts) => ToSqlOutput::Owned(RusqliteValue::Text(ts.to_rfc3339())),
            SqlValue::Date(d) => {
                ToSqlOutput::Owned(RusqliteValue::Text(d.format("%Y-%m-%d").to_string()))
            }
            SqlValue::Time(t) => {
                ToSqlOutput::Owned(RusqliteValue::Text(t.format("%H:%M:%S%.f").to_string()))
            }
        })
    }
}

fn read_value(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Integer(i),
        ValueRef::Real(f) => SqlValue::Real(f),
        ValueRef::Text(bytes) => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => SqlValue::Blob(bytes.to_vec()),
    }
}

/// `upper()` with full Unicode case mapping. The builtin only folds ASCII.
fn unicode_upper(ctx: &Context<'_>) -> rusqlite::Result<Option<String>> {
    Ok(match ctx.get_raw(0) {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).to_uppercase())
        }
    })
}

/// Per-connection setup shared by the writer and every cursor reader
fn configure(conn: &Connection) -> StoreResult<()> {
    // LIKE must compare literally; case-insensitive search upper-cases both sides.
    conn.execute_batch("PRAGMA case_sensitive_like = ON; PRAGMA foreign_keys = ON;")?;
    conn.create_scalar_function(
        "upper",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        unicode_upper,
    )?;
    Ok(())
}

/// Where cursor readers attach
#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    /// `file:` URI of a named shared-cache in-memory database
    Memory(String),
}

struct Shared {
    conn: Mutex<Connection>,
    location: Location,
    open_cursors: AtomicUsize,
}

impl Shared {
    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn open_reader(&self) -> StoreResult<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = match &self.location {
            Location::File(path) => Connection::open_with_flags(path, flags)?,
            Location::Memory(uri) => {
                let conn = Connection::open_with_flags(uri, flags)?;
                conn.execute_batch("PRAGMA read_uncommitted = ON;")?;
                conn
            }
        };
        configure(&conn)?;
        Ok(conn)
    }
}

/// SQLite-backed catalog and store
#[derive(Clone)]
pub struct SqliteStore {
    shared: Arc<Shared>,
}

impl SqliteStore {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if path == Path::new(":memory:") {
            return Self::open_in_memory();
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::from_connection(conn, Location::File(path.to_path_buf()))
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> StoreResult<Self> {
        let uri = format!(
            "file:tablecrud-{}?mode=memory&cache=shared",
            Uuid::new_v4().simple()
        );
        let conn = Connection::open_with_flags(
            &uri,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Self::from_connection(conn, Location::Memory(uri))
    }

    fn from_connection(conn: Connection, location: Location) -> StoreResult<Self> {
        configure(&conn)?;
        Ok(Self {
            shared: Arc::new(Shared {
                conn: Mutex::new(conn),
                location,
                open_cursors: AtomicUsize::new(0),
            }),
        })
    }

    /// Run trusted DDL or fixture SQL
    pub fn execute_script(&self, sql: &str) -> StoreResult<()> {
        self.shared.lock()?.execute_batch(sql)?;
        Ok(())
    }

    /// Number of cursors opened and not yet released
    pub fn open_cursor_count(&self) -> usize {
        self.shared.open_cursors.load(Ordering::SeqCst)
    }

    fn unique_columns(conn: &Connection, table: &str) -> StoreResult<HashSet<String>> {
        let mut index_stmt =
            conn.prepare("SELECT name FROM pragma_index_list(?1) WHERE \"unique\" = 1")?;
        let indexes = index_stmt
            .query_map([table], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut info_stmt = conn.prepare("SELECT name FROM pragma_index_info(?1)")?;
        let mut unique = HashSet::new();
        for index in indexes {
            let columns = info_stmt
                .query_map([&index], |row| row.get::<_, Option<String>>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            // Composite unique indexes do not make any single column unique.
            if let [Some(column)] = columns.as_slice() {
                unique.insert(column.to_lowercase());
            }
        }
        Ok(unique)
    }

    fn foreign_keys(conn: &Connection, table: &str) -> StoreResult<HashMap<String, ForeignKeyRef>> {
        let mut stmt =
            conn.prepare("SELECT \"from\", \"table\", \"to\" FROM pragma_foreign_key_list(?1)")?;
        let rows = stmt
            .query_map([table], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .map(|(from, table, to)| (from.to_lowercase(), ForeignKeyRef { table, column: to }))
            .collect())
    }
}

impl Catalog for SqliteStore {
    fn table_columns(&self, table: &str) -> StoreResult<Vec<ColumnMetadata>> {
        let conn = self.shared.lock()?;
        let unique = Self::unique_columns(&conn, table)?;
        let mut foreign_keys = Self::foreign_keys(&conn, table)?;

        let mut stmt = conn.prepare(
            "SELECT name, type, \"notnull\", dflt_value, pk \
             FROM pragma_table_info(?1) ORDER BY cid",
        )?;
        let rows = stmt
            .query_map([table], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let columns = rows
            .into_iter()
            .map(|(name, declared, not_null, default_value, pk)| {
                let parsed = DeclaredType::parse(&declared);
                let key = name.to_lowercase();
                let primary_key = pk > 0;
                ColumnMetadata {
                    unique: unique.contains(&key),
                    foreign_key: foreign_keys.remove(&key),
                    // INTEGER PRIMARY KEY aliases the rowid and is never NULL.
                    nullable: not_null == 0 && !primary_key,
                    primary_key,
                    type_tag: parsed.base,
                    length: parsed.length,
                    precision: parsed.precision,
                    scale: parsed.scale,
                    default_value,
                    comment: None,
                    name,
                }
            })
            .collect();

        Ok(columns)
    }
}

impl SqlStore for SqliteStore {
    fn paging_style(&self) -> PagingStyle {
        PagingStyle::LimitOffset
    }

    fn count(&self, sql: &str, params: &[SqlValue]) -> StoreResult<u64> {
        let conn = self.shared.lock()?;
        let count: i64 = conn.query_row(sql, params_from_iter(params.iter()), |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn open_cursor(
        &self,
        sql: &str,
        params: &[SqlValue],
        fetch_size: usize,
    ) -> StoreResult<Box<dyn RowCursor>> {
        let reader = self.shared.open_reader()?;
        let columns: Vec<String> = {
            let stmt = reader.prepare(sql)?;
            let names = stmt.column_names().into_iter().map(String::from).collect();
            names
        };

        let fetch_size = fetch_size.max(1);
        let (sender, receiver) = mpsc::sync_channel(1);
        let sql = sql.to_string();
        let params = params.to_vec();
        let worker = thread::Builder::new()
            .name("sqlite-cursor".to_string())
            .spawn(move || {
                if let Err(err) = pump_rows(&reader, &sql, &params, fetch_size, &sender) {
                    let _ = sender.send(Err(err));
                }
            })
            .map_err(|err| StoreError::Driver(format!("failed to spawn cursor reader: {err}")))?;

        self.shared.open_cursors.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SqliteCursor {
            shared: Arc::clone(&self.shared),
            columns,
            receiver: Some(receiver),
            worker: Some(worker),
            closed: false,
        }))
    }

    fn execute_batch(&self, batch: &WriteBatch) -> StoreResult<Vec<ExecOutcome>> {
        debug!(trace_id = %batch.trace_id(), statements = batch.len(), "Executing write batch");
        let mut conn = self.shared.lock()?;
        let tx = conn.transaction()?;
        let mut outcomes = Vec::with_capacity(batch.len());

        for statement in batch.statements() {
            let affected = tx.execute(&statement.sql, params_from_iter(statement.params.iter()))?;
            let generated_id = match statement.operation {
                CrudOperation::Create if affected > 0 => {
                    Some(SqlValue::Integer(tx.last_insert_rowid()))
                }
                _ => None,
            };
            outcomes.push(ExecOutcome {
                affected_rows: affected as u64,
                generated_id,
            });
        }

        tx.commit()?;
        Ok(outcomes)
    }
}

type BatchSender = SyncSender<StoreResult<Vec<RawRow>>>;

/// Step `sql` once from start to end, sending rows in batches of
/// `fetch_size`. Stops early once the cursor side hangs up.
fn pump_rows(
    conn: &Connection,
    sql: &str,
    params: &[SqlValue],
    fetch_size: usize,
    sender: &BatchSender,
) -> StoreResult<()> {
    let mut stmt = conn.prepare(sql)?;
    let width = stmt.column_count();
    let mut rows = stmt.query(params_from_iter(params.iter()))?;

    let mut batch = Vec::with_capacity(fetch_size);
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(read_value(row.get_ref(i)?));
        }
        batch.push(values);

        if batch.len() == fetch_size {
            let full = std::mem::replace(&mut batch, Vec::with_capacity(fetch_size));
            if sender.send(Ok(full)).is_err() {
                return Ok(());
            }
        }
    }

    if !batch.is_empty() {
        let _ = sender.send(Ok(batch));
    }
    Ok(())
}

struct SqliteCursor {
    shared: Arc<Shared>,
    columns: Vec<String>,
    receiver: Option<Receiver<StoreResult<Vec<RawRow>>>>,
    worker: Option<JoinHandle<()>>,
    closed: bool,
}

impl RowCursor for SqliteCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next_batch(&mut self) -> StoreResult<Vec<RawRow>> {
        if self.closed {
            return Err(StoreError::CursorClosed);
        }

        match self.receiver.as_ref().map(Receiver::recv) {
            Some(Ok(batch)) => batch,
            // Reader finished and hung up.
            _ => Ok(Vec::new()),
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        // Hanging up wakes a reader parked on a full channel.
        drop(self.receiver.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("SQLite cursor reader panicked");
            }
        }
        self.shared.open_cursors.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Drop for SqliteCursor {
    fn drop(&mut self) {
        self.close();
    }
}

/// Declared column type split into base name and size arguments
#[derive(Debug, Clone, PartialEq, Eq)]
struct DeclaredType {
    base: String,
    length: Option<u32>,
    precision: Option<u32>,
    scale: Option<u32>,
}

impl DeclaredType {
    fn parse(declared: &str) -> Self {
        let (base, args) = match declared.find('(') {
            Some(open) => {
                let close = declared.rfind(')').unwrap_or(declared.len());
                let inner = declared.get(open + 1..close).unwrap_or("");
                let args: Vec<u32> = inner
                    .split(',')
                    .filter_map(|part| part.trim().parse().ok())
                    .collect();
                (&declared[..open], args)
            }
            None => (declared, Vec::new()),
        };
        let base = base.trim().to_uppercase();

        let is_sized_text = ["CHAR", "TEXT", "CLOB", "BINARY"]
            .iter()
            .any(|t| base.contains(t));
        if is_sized_text {
            Self {
                base,
                length: args.first().copied(),
                precision: None,
                scale: None,
            }
        } else {
            Self {
                base,
                length: None,
                precision: args.first().copied(),
                scale: args.get(1).copied(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Statement;
    use uuid::Uuid;

    fn fixture() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .execute_script(
                "CREATE TABLE teams (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
                 CREATE TABLE members (
                     id INTEGER PRIMARY KEY,
                     email VARCHAR(128) NOT NULL UNIQUE,
                     salary NUMERIC(10,2),
                     team_id INTEGER REFERENCES teams(id),
                     joined_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
                 );
                 INSERT INTO teams (name) VALUES ('core'), ('infra'), ('data');",
            )
            .unwrap();
        store
    }

    #[test]
    fn test_declared_type_parsing() {
        let t = DeclaredType::parse("varchar(64)");
        assert_eq!(t.base, "VARCHAR");
        assert_eq!(t.length, Some(64));

        let n = DeclaredType::parse("NUMERIC(10, 2)");
        assert_eq!(n.precision, Some(10));
        assert_eq!(n.scale, Some(2));

        let plain = DeclaredType::parse("INTEGER");
        assert_eq!(plain.base, "INTEGER");
        assert_eq!(plain.precision, None);
    }

    #[test]
    fn test_catalog_metadata() {
        let store = fixture();
        let columns = store.table_columns("members").unwrap();

        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "email", "salary", "team_id", "joined_at"]);

        assert!(columns[0].primary_key);
        assert!(!columns[0].nullable);
        assert!(columns[1].unique);
        assert_eq!(columns[1].length, Some(128));
        assert_eq!(columns[2].scale, Some(2));
        assert_eq!(
            columns[3].foreign_key,
            Some(ForeignKeyRef {
                table: "teams".to_string(),
                column: Some("id".to_string()),
            })
        );
        assert_eq!(columns[4].default_value.as_deref(), Some("CURRENT_TIMESTAMP"));
    }

    #[test]
    fn test_unknown_table_has_no_columns() {
        let store = fixture();
        assert!(store.table_columns("nope").unwrap().is_empty());
    }

    #[test]
    fn test_upper_maps_unicode() {
        let store = fixture();
        let conn = store.shared.lock().unwrap();
        let upper: String = conn
            .query_row("SELECT upper('café straße')", [], |row| row.get(0))
            .unwrap();
        assert_eq!(upper, "CAFÉ STRASSE");

        let null: Option<String> = conn
            .query_row("SELECT upper(NULL)", [], |row| row.get(0))
            .unwrap();
        assert_eq!(null, None);
    }

    #[test]
    fn test_cursor_fetches_in_batches() {
        let store = fixture();
        let mut cursor = store
            .open_cursor("SELECT \"name\" FROM \"teams\" ORDER BY \"id\"", &[], 2)
            .unwrap();
        assert_eq!(store.open_cursor_count(), 1);
        assert_eq!(cursor.columns(), &["name".to_string()]);

        let first = cursor.next_batch().unwrap();
        assert_eq!(first.len(), 2);
        let second = cursor.next_batch().unwrap();
        assert_eq!(second, vec![vec![SqlValue::Text("data".to_string())]]);
        assert!(cursor.next_batch().unwrap().is_empty());

        cursor.close();
        cursor.close();
        assert_eq!(store.open_cursor_count(), 0);
        assert!(matches!(cursor.next_batch(), Err(StoreError::CursorClosed)));
    }

    #[test]
    fn test_write_batch_is_atomic() {
        let store = fixture();
        let batch = WriteBatch::new(
            Uuid::new_v4(),
            vec![
                Statement {
                    operation: CrudOperation::Create,
                    sql: "INSERT INTO \"teams\" (\"name\") VALUES (?)".to_string(),
                    params: vec![SqlValue::from("ml")],
                },
                Statement {
                    operation: CrudOperation::Create,
                    sql: "INSERT INTO \"teams\" (\"name\") VALUES (?)".to_string(),
                    params: vec![SqlValue::Null],
                },
            ],
        );

        let err = store.execute_batch(&batch).unwrap_err();
        assert!(err.is_constraint());
        assert_eq!(store.count("SELECT COUNT(*) FROM \"teams\"", &[]).unwrap(), 3);
    }

    #[test]
    fn test_insert_reports_generated_id() {
        let store = fixture();
        let batch = WriteBatch::new(
            Uuid::new_v4(),
            vec![Statement {
                operation: CrudOperation::Create,
                sql: "INSERT INTO \"teams\" (\"name\") VALUES (?)".to_string(),
                params: vec![SqlValue::from("ml")],
            }],
        );

        let outcomes = store.execute_batch(&batch).unwrap();
        assert_eq!(outcomes[0].affected_rows, 1);
        assert_eq!(outcomes[0].generated_id, Some(SqlValue::Integer(4)));
    }

    #[test]
    fn test_cursor_survives_concurrent_deletes() {
        let store = fixture();
        let mut cursor = store
            .open_cursor("SELECT \"id\" FROM \"teams\" ORDER BY \"id\"", &[], 1)
            .unwrap();

        let mut seen = Vec::new();
        loop {
            let batch = cursor.next_batch().unwrap();
            let Some(row) = batch.first() else { break };
            if let SqlValue::Integer(id) = row[0] {
                seen.push(id);
                store
                    .execute_script(&format!("DELETE FROM teams WHERE id = {}", id))
                    .unwrap();
            }
        }

        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(store.count("SELECT COUNT(*) FROM \"teams\"", &[]).unwrap(), 0);
    }

    #[test]
    fn test_file_cursor_reads_one_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("snap.db")).unwrap();
        store
            .execute_script(
                "CREATE TABLE t (id INTEGER PRIMARY KEY);
                 INSERT INTO t (id) VALUES (1), (2), (3), (4);",
            )
            .unwrap();

        let mut cursor = store
            .open_cursor("SELECT \"id\" FROM \"t\" ORDER BY \"id\"", &[], 2)
            .unwrap();
        assert_eq!(cursor.next_batch().unwrap().len(), 2);

        store.execute_script("DELETE FROM t WHERE id IN (1, 2, 3)").unwrap();
        assert_eq!(
            cursor.next_batch().unwrap(),
            vec![vec![SqlValue::Integer(3)], vec![SqlValue::Integer(4)]]
        );
        assert!(cursor.next_batch().unwrap().is_empty());

        drop(cursor);
        assert_eq!(store.open_cursor_count(), 0);
    }
}
