// SQLite adapter (embedded file backend)
use crate::models::{BackendKind, ResultSet};
use crate::services::database::adapter::DatabaseConnection;
use crate::services::database::DatabaseError;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::{json, Value};
use std::path::Path;

pub struct SqliteConnection {
    conn: Option<Connection>,
}

impl SqliteConnection {
    /// Open an existing database file. A missing file is a connection error
    /// rather than a new empty database.
    pub fn open(path: &str) -> Result<Self, DatabaseError> {
        // Handle SQLite URL format (sqlite:./path or sqlite://path)
        let clean_path = path.trim_start_matches("sqlite:").trim_start_matches("//");

        let conn = if clean_path == ":memory:" {
            Connection::open_in_memory()
        } else {
            if !Path::new(clean_path).exists() {
                return Err(DatabaseError::Connection(format!(
                    "SQLite database file not found: {}",
                    clean_path
                )));
            }
            Connection::open_with_flags(
                clean_path,
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
        }
        .map_err(|e| DatabaseError::Connection(format!("Failed to open SQLite database: {}", e)))?;

        Ok(Self { conn: Some(conn) })
    }

    fn query(conn: &Connection, sql: &str) -> rusqlite::Result<Option<ResultSet>> {
        let mut stmt = conn.prepare(sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let column_count = names.len();

        let mut rows = stmt.query([])?;
        let mut materialized = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(column_count);
            for idx in 0..column_count {
                values.push(match row.get_ref(idx)? {
                    ValueRef::Null => Value::Null,
                    ValueRef::Integer(i) => json!(i),
                    ValueRef::Real(f) => json!(f),
                    ValueRef::Text(t) => json!(String::from_utf8_lossy(t)),
                    ValueRef::Blob(b) => json!(format!("<blob {} bytes>", b.len())),
                });
            }
            materialized.push(values);
        }

        if column_count == 0 {
            return Ok(None);
        }

        // SQLite is dynamically typed; column types come from the values
        Ok(Some(ResultSet::from_positional(names, Vec::new(), materialized)))
    }
}

#[async_trait::async_trait]
impl DatabaseConnection for SqliteConnection {
    fn backend_kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    async fn execute(&mut self, sql: &str) -> Result<Option<ResultSet>, DatabaseError> {
        let conn = self
            .conn
            .take()
            .ok_or_else(|| DatabaseError::Connection("SQLite connection already closed".to_string()))?;
        let sql = sql.to_string();

        let (conn, result) = tokio::task::spawn_blocking(move || {
            let result = Self::query(&conn, &sql);
            (conn, result)
        })
        .await
        .map_err(|e| DatabaseError::Execution(format!("SQLite worker failed: {}", e)))?;

        self.conn = Some(conn);
        result.map_err(|e| DatabaseError::Execution(e.to_string()))
    }

    async fn close(self: Box<Self>) -> Result<(), DatabaseError> {
        match self.conn {
            Some(conn) => conn
                .close()
                .map_err(|(_, e)| DatabaseError::Connection(format!("Failed to close SQLite database: {}", e))),
            None => Ok(()),
        }
    }
}
