// DuckDB adapter (embedded analytic backend)
use crate::models::{BackendKind, ColumnInfo, ColumnType, ResultSet};
use crate::services::database::adapter::DatabaseConnection;
use crate::services::database::DatabaseError;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use duckdb::Connection;
use serde_json::{Map, Value};
use std::path::Path;

pub struct DuckDbConnection {
    conn: Option<Connection>,
}

impl DuckDbConnection {
    /// Open an existing database file. DuckDB would create a missing file,
    /// so that case is rejected here.
    pub fn open(path: &str) -> Result<Self, DatabaseError> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            if !Path::new(path).exists() {
                return Err(DatabaseError::Connection(format!(
                    "DuckDB database file not found: {}",
                    path
                )));
            }
            Connection::open(path)
        }
        .map_err(|e| DatabaseError::Connection(format!("Failed to open DuckDB database: {}", e)))?;

        Ok(Self { conn: Some(conn) })
    }

    fn query(conn: &Connection, sql: &str) -> Result<Option<ResultSet>, DatabaseError> {
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| DatabaseError::Execution(e.to_string()))?;

        let arrow_batch = stmt
            .query_arrow([])
            .map_err(|e| DatabaseError::Execution(e.to_string()))?;

        let schema = arrow_batch.get_schema();
        if schema.fields().is_empty() {
            return Ok(None);
        }

        let columns: Vec<(String, ColumnType)> = schema
            .fields()
            .iter()
            .map(|field| (field.name().clone(), column_type(field.data_type())))
            .collect();

        let record_batches: Vec<RecordBatch> = arrow_batch.collect();
        let mut rows = Vec::new();
        for batch in &record_batches {
            rows.extend(batch_to_rows(batch)?);
        }

        // The JSON writer omits nulls and writes some numerics as strings;
        // normalize every row against the schema.
        let rows = rows
            .into_iter()
            .map(|mut row| {
                columns
                    .iter()
                    .map(|(name, data_type)| {
                        let value = row.remove(name).unwrap_or(Value::Null);
                        (name.clone(), normalize(value, data_type))
                    })
                    .collect::<Map<String, Value>>()
            })
            .collect();

        let columns = columns
            .into_iter()
            .map(|(name, data_type)| ColumnInfo::new(name, data_type))
            .collect();

        Ok(Some(ResultSet::new(columns, rows)))
    }
}

fn batch_to_rows(batch: &RecordBatch) -> Result<Vec<Map<String, Value>>, DatabaseError> {
    let mut writer = arrow::json::ArrayWriter::new(Vec::new());
    writer
        .write_batches(&[batch])
        .map_err(|e| DatabaseError::Execution(format!("Failed to convert DuckDB result: {}", e)))?;
    writer
        .finish()
        .map_err(|e| DatabaseError::Execution(format!("Failed to convert DuckDB result: {}", e)))?;

    let buffer = writer.into_inner();
    if buffer.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_slice(&buffer)
        .map_err(|e| DatabaseError::Execution(format!("Failed to convert DuckDB result: {}", e)))
}

fn column_type(data_type: &DataType) -> ColumnType {
    match data_type {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => ColumnType::Integer,
        DataType::Float16
        | DataType::Float32
        | DataType::Float64
        | DataType::Decimal128(_, _)
        | DataType::Decimal256(_, _) => ColumnType::Float,
        DataType::Boolean => ColumnType::Boolean,
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => ColumnType::Text,
        DataType::Date32
        | DataType::Date64
        | DataType::Timestamp(_, _)
        | DataType::Time32(_)
        | DataType::Time64(_)
        | DataType::Duration(_)
        | DataType::Interval(_) => ColumnType::Temporal,
        DataType::Binary | DataType::LargeBinary | DataType::FixedSizeBinary(_) => ColumnType::Binary,
        DataType::Null => ColumnType::Null,
        other => ColumnType::Other(other.to_string()),
    }
}

fn normalize(value: Value, data_type: &ColumnType) -> Value {
    if let Value::String(s) = &value {
        let parsed = match data_type {
            ColumnType::Integer => s.parse::<i64>().ok().map(Value::from),
            ColumnType::Float => s
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            _ => None,
        };
        if let Some(parsed) = parsed {
            return parsed;
        }
    }
    value
}

#[async_trait::async_trait]
impl DatabaseConnection for DuckDbConnection {
    fn backend_kind(&self) -> BackendKind {
        BackendKind::DuckDb
    }

    async fn execute(&mut self, sql: &str) -> Result<Option<ResultSet>, DatabaseError> {
        let conn = self
            .conn
            .take()
            .ok_or_else(|| DatabaseError::Connection("DuckDB connection already closed".to_string()))?;
        let sql = sql.to_string();

        let (conn, result) = tokio::task::spawn_blocking(move || {
            let result = Self::query(&conn, &sql);
            (conn, result)
        })
        .await
        .map_err(|e| DatabaseError::Execution(format!("DuckDB worker failed: {}", e)))?;

        self.conn = Some(conn);
        result
    }

    async fn close(self: Box<Self>) -> Result<(), DatabaseError> {
        match self.conn {
            Some(conn) => conn
                .close()
                .map_err(|(_, e)| DatabaseError::Connection(format!("Failed to close DuckDB database: {}", e))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn fixture(path: &std::path::Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE sales (region VARCHAR, amount DOUBLE, units INTEGER);
             INSERT INTO sales VALUES ('north', 10.5, 3), ('south', 20.0, NULL);",
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_query_reads_typed_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sales.duckdb");
        fixture(&path);

        let mut conn = DuckDbConnection::open(path.to_str().unwrap()).unwrap();
        let rs = conn
            .execute("SELECT region, amount, units FROM sales ORDER BY region")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(rs.row_count(), 2);
        assert_eq!(rs.columns[0].data_type, ColumnType::Text);
        assert_eq!(rs.columns[1].data_type, ColumnType::Float);
        assert_eq!(rs.columns[2].data_type, ColumnType::Integer);
        assert_eq!(rs.rows[0]["region"], json!("north"));
        assert_eq!(rs.rows[1]["units"], Value::Null);

        Box::new(conn).close().await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_rows_keep_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sales.duckdb");
        fixture(&path);

        let mut conn = DuckDbConnection::open(path.to_str().unwrap()).unwrap();
        let rs = conn
            .execute("SELECT region FROM sales WHERE amount > 1000")
            .await
            .unwrap()
            .unwrap();
        assert!(rs.is_empty());
        assert_eq!(rs.columns.len(), 1);
    }

    #[test]
    fn test_missing_file_is_connection_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("typo.duckdb");
        let err = DuckDbConnection::open(path.to_str().unwrap()).err().unwrap();
        assert!(matches!(err, DatabaseError::Connection(_)));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_invalid_sql_is_execution_error() {
        let mut conn = DuckDbConnection::open(":memory:").unwrap();
        let err = conn.execute("SELECT * FROM missing_table").await.err().unwrap();
        assert!(matches!(err, DatabaseError::Execution(_)));
    }

    #[test]
    fn test_decimal_strings_are_normalized() {
        assert_eq!(normalize(json!("12.50"), &ColumnType::Float), json!(12.5));
        assert_eq!(normalize(json!("7"), &ColumnType::Integer), json!(7));
        assert_eq!(normalize(json!("x"), &ColumnType::Text), json!("x"));
    }
}
