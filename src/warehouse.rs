//! Database connectivity for the load phases.
//!
//! The pipeline only ever issues DDL, bulk inserts, and full-table selects, so the
//! [`Warehouse`] trait is kept to exactly those operations plus an explicit commit.
//! Implementations must run with autocommit off: nothing is durable until
//! [`Warehouse::commit`] returns.

use anyhow::{Context, Result};
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};
use std::path::Path;
use tracing::{debug, trace};

/// A single column value, independent of the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// The operations the load phases need from a relational database.
pub trait Warehouse {
    /// Run one statement with no parameters and no result rows.
    fn execute(&mut self, sql: &str) -> Result<()>;

    /// Run one parameterized statement once per row. A failing row fails the whole batch.
    fn execute_many(&mut self, sql: &str, rows: &[Vec<Value>]) -> Result<usize>;

    /// Run a query and return every row.
    fn fetch_all(&mut self, sql: &str) -> Result<Vec<Vec<Value>>>;

    /// Make everything since the previous commit durable.
    fn commit(&mut self) -> Result<()>;

    /// Release the connection. Uncommitted work is discarded.
    fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// SQLite-backed warehouse. Keeps a transaction open at all times to emulate
/// autocommit-off semantics.
pub struct SqliteWarehouse {
    conn: Connection,
}

impl SqliteWarehouse {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database: {}", path.display()))?;
        debug!(path = %path.display(), "Opened warehouse");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        // foreign_keys is a no-op inside a transaction, so it has to precede BEGIN.
        conn.execute_batch("PRAGMA foreign_keys = ON; BEGIN;")
            .context("Failed to initialise warehouse connection")?;
        Ok(Self { conn })
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Integer(v) => ToSqlOutput::Borrowed(ValueRef::Integer(*v)),
            Value::Real(v) => ToSqlOutput::Borrowed(ValueRef::Real(*v)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

impl From<rusqlite::types::Value> for Value {
    fn from(v: rusqlite::types::Value) -> Self {
        use rusqlite::types::Value as Sql;
        match v {
            Sql::Null => Value::Null,
            Sql::Integer(i) => Value::Integer(i),
            Sql::Real(f) => Value::Real(f),
            Sql::Text(s) => Value::Text(s),
            Sql::Blob(b) => Value::Text(String::from_utf8_lossy(&b).into_owned()),
        }
    }
}

impl Warehouse for SqliteWarehouse {
    fn execute(&mut self, sql: &str) -> Result<()> {
        trace!(sql, "execute");
        self.conn
            .execute_batch(sql)
            .with_context(|| format!("Failed to execute: {}", first_line(sql)))
    }

    fn execute_many(&mut self, sql: &str, rows: &[Vec<Value>]) -> Result<usize> {
        trace!(sql, rows = rows.len(), "execute_many");
        let sp = self
            .conn
            .savepoint()
            .context("Failed to open savepoint for batch")?;
        {
            let mut stmt = sp
                .prepare(sql)
                .with_context(|| format!("Failed to prepare: {sql}"))?;
            for (i, row) in rows.iter().enumerate() {
                stmt.execute(params_from_iter(row.iter()))
                    .with_context(|| format!("Batch row {i} failed: {sql}"))?;
            }
        }
        sp.commit().context("Failed to release batch savepoint")?;
        Ok(rows.len())
    }

    fn fetch_all(&mut self, sql: &str) -> Result<Vec<Vec<Value>>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .with_context(|| format!("Failed to prepare query: {sql}"))?;
        let columns = stmt.column_count();
        let rows = stmt
            .query_map([], |row| {
                (0..columns)
                    .map(|i| row.get::<_, rusqlite::types::Value>(i).map(Value::from))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })
            .with_context(|| format!("Failed to run query: {sql}"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("Failed to read rows: {sql}"))?;
        Ok(rows)
    }

    fn commit(&mut self) -> Result<()> {
        self.conn
            .execute_batch("COMMIT; BEGIN;")
            .context("Failed to commit transaction")
    }

    fn close(self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn
                .execute_batch("ROLLBACK;")
                .context("Failed to discard uncommitted work")?;
        }
        self.conn
            .close()
            .map_err(|(_, e)| e)
            .context("Failed to close warehouse connection")?;
        debug!("Closed warehouse");
        Ok(())
    }
}

fn first_line(sql: &str) -> &str {
    sql.trim().lines().next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn with_table() -> SqliteWarehouse {
        let mut wh = SqliteWarehouse::open_in_memory().unwrap();
        wh.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT UNIQUE)")
            .unwrap();
        wh
    }

    #[test]
    fn execute_many_inserts_all_rows() {
        let mut wh = with_table();
        let rows = vec![vec![Value::from("a")], vec![Value::from("b")]];
        let n = wh
            .execute_many("INSERT INTO t (name) VALUES (?1)", &rows)
            .unwrap();
        assert_eq!(n, 2);

        let fetched = wh.fetch_all("SELECT id, name FROM t ORDER BY id").unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0][1], Value::from("a"));
        assert_eq!(fetched[1][0].as_i64(), Some(2));
    }

    #[test]
    fn failing_row_rolls_back_whole_batch() {
        let mut wh = with_table();
        let rows = vec![
            vec![Value::from("a")],
            vec![Value::from("b")],
            vec![Value::from("a")],
        ];
        let err = wh
            .execute_many("INSERT INTO t (name) VALUES (?1)", &rows)
            .unwrap_err();
        assert!(format!("{err:#}").contains("UNIQUE"));

        let fetched = wh.fetch_all("SELECT name FROM t").unwrap();
        assert!(fetched.is_empty());
    }

    #[test]
    fn null_values_round_trip() {
        let mut wh = with_table();
        wh.execute_many(
            "INSERT INTO t (name) VALUES (?1)",
            &[vec![Value::from(None::<String>)]],
        )
        .unwrap();
        let fetched = wh.fetch_all("SELECT name FROM t").unwrap();
        assert_eq!(fetched[0][0], Value::Null);
    }

    #[test]
    fn uncommitted_work_is_discarded_on_close() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wh.db");

        let mut wh = SqliteWarehouse::open(&path).unwrap();
        wh.execute("CREATE TABLE t (name TEXT)").unwrap();
        wh.commit().unwrap();
        wh.execute_many("INSERT INTO t (name) VALUES (?1)", &[vec!["kept".into()]])
            .unwrap();
        wh.commit().unwrap();
        wh.execute_many("INSERT INTO t (name) VALUES (?1)", &[vec!["lost".into()]])
            .unwrap();
        wh.close().unwrap();

        let mut wh = SqliteWarehouse::open(&path).unwrap();
        let fetched = wh.fetch_all("SELECT name FROM t").unwrap();
        assert_eq!(fetched, vec![vec![Value::from("kept")]]);
        wh.close().unwrap();
    }

    #[test]
    fn execute_reports_statement_on_error() {
        let mut wh = SqliteWarehouse::open_in_memory().unwrap();
        let err = wh.execute("DROP TABLE missing").unwrap_err();
        assert!(err.to_string().contains("DROP TABLE missing"));
    }
}
