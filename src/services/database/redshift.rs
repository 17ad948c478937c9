// Redshift adapter over the PostgreSQL wire protocol
use crate::models::{BackendKind, ColumnType, ResultSet};
use crate::services::database::adapter::DatabaseConnection;
use crate::services::database::DatabaseError;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::{Client, NoTls, Row};

/// How long `close` waits for the server to acknowledge a cancel or for the
/// driver task to wind down
const CLOSE_GRACE: Duration = Duration::from_secs(5);

pub struct RedshiftConnection {
    client: Client,
    driver: JoinHandle<()>,
    /// Set while a statement is on the wire. Stays set when the caller drops
    /// `execute` mid-flight, e.g. on timeout.
    in_flight: bool,
}

/// Connection parameters resolved from configuration
#[derive(Clone)]
pub struct RedshiftParams {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl RedshiftConnection {
    pub async fn connect(params: &RedshiftParams) -> Result<Self, DatabaseError> {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&params.host)
            .port(params.port)
            .dbname(&params.database)
            .user(&params.user)
            .password(&params.password);

        let (client, connection) = config.connect(NoTls).await.map_err(|e| {
            DatabaseError::Connection(format!(
                "Failed to connect to Redshift at {}:{}: {}",
                params.host, params.port, e
            ))
        })?;

        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!("Redshift connection closed with error: {}", e);
            }
        });

        Ok(Self {
            client,
            driver,
            in_flight: false,
        })
    }

    async fn run(&self, sql: &str) -> Result<Option<ResultSet>, DatabaseError> {
        let statement = self.client.prepare(sql).await.map_err(execution_error)?;

        if statement.columns().is_empty() {
            self.client
                .execute(&statement, &[])
                .await
                .map_err(execution_error)?;
            return Ok(None);
        }

        let names: Vec<String> = statement.columns().iter().map(|c| c.name().to_string()).collect();
        let types: Vec<Type> = statement.columns().iter().map(|c| c.type_().clone()).collect();

        let rows = self
            .client
            .query(&statement, &[])
            .await
            .map_err(execution_error)?;

        let values: Vec<Vec<Value>> = rows
            .iter()
            .map(|row| {
                types
                    .iter()
                    .enumerate()
                    .map(|(idx, ty)| cell_value(row, idx, ty))
                    .collect()
            })
            .collect();

        Ok(Some(ResultSet::from_positional(
            names,
            types.iter().map(column_type).collect(),
            values,
        )))
    }
}

pub(crate) fn column_type(ty: &Type) -> ColumnType {
    match *ty {
        Type::INT2 | Type::INT4 | Type::INT8 | Type::OID => ColumnType::Integer,
        Type::FLOAT4 | Type::FLOAT8 | Type::NUMERIC => ColumnType::Float,
        Type::BOOL => ColumnType::Boolean,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::CHAR => ColumnType::Text,
        Type::DATE | Type::TIME | Type::TIMESTAMP | Type::TIMESTAMPTZ | Type::TIMETZ | Type::INTERVAL => {
            ColumnType::Temporal
        }
        Type::BYTEA => ColumnType::Binary,
        _ => ColumnType::Other(ty.name().to_string()),
    }
}

/// NUMERIC decoded from the binary wire format into a float
struct Numeric(f64);

impl<'a> FromSql<'a> for Numeric {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        if raw.len() < 8 {
            return Err("invalid numeric header".into());
        }
        let ndigits = i16::from_be_bytes([raw[0], raw[1]]).max(0) as usize;
        let weight = i16::from_be_bytes([raw[2], raw[3]]) as i32;
        let sign = u16::from_be_bytes([raw[4], raw[5]]);
        if sign == 0xC000 {
            return Ok(Numeric(f64::NAN));
        }
        if raw.len() < 8 + ndigits * 2 {
            return Err("truncated numeric digits".into());
        }

        // Base-10000 digits, the first one scaled by 10000^weight
        let mut value = 0f64;
        for i in 0..ndigits {
            let digit = i16::from_be_bytes([raw[8 + 2 * i], raw[9 + 2 * i]]) as f64;
            value += digit * 10000f64.powi(weight - i as i32);
        }
        if sign == 0x4000 {
            value = -value;
        }
        Ok(Numeric(value))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

fn cell_value(row: &Row, idx: usize, ty: &Type) -> Value {
    match *ty {
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)
            .ok()
            .flatten()
            .map(|v| json!(v))
            .unwrap_or(Value::Null),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)
            .ok()
            .flatten()
            .map(|v| json!(v))
            .unwrap_or(Value::Null),
        Type::INT8 => row
            .try_get::<_, Option<i64>>(idx)
            .ok()
            .flatten()
            .map(|v| json!(v))
            .unwrap_or(Value::Null),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)
            .ok()
            .flatten()
            .map(|v| json!(v))
            .unwrap_or(Value::Null),
        Type::FLOAT8 => row
            .try_get::<_, Option<f64>>(idx)
            .ok()
            .flatten()
            .map(|v| json!(v))
            .unwrap_or(Value::Null),
        Type::NUMERIC => row
            .try_get::<_, Option<Numeric>>(idx)
            .ok()
            .flatten()
            .and_then(|v| serde_json::Number::from_f64(v.0))
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Type::BOOL => row
            .try_get::<_, Option<bool>>(idx)
            .ok()
            .flatten()
            .map(|v| json!(v))
            .unwrap_or(Value::Null),
        Type::TIMESTAMP => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(idx)
            .ok()
            .flatten()
            .map(|v| json!(v.to_string()))
            .unwrap_or(Value::Null),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
            .ok()
            .flatten()
            .map(|v| json!(v.to_rfc3339()))
            .unwrap_or(Value::Null),
        Type::DATE => row
            .try_get::<_, Option<chrono::NaiveDate>>(idx)
            .ok()
            .flatten()
            .map(|v| json!(v.to_string()))
            .unwrap_or(Value::Null),
        _ => match row.try_get::<_, Option<String>>(idx) {
            Ok(Some(v)) => json!(v),
            Ok(None) => Value::Null,
            // For types that can't be read as text, show the type name
            Err(_) => json!(format!("<{}>", ty.name())),
        },
    }
}

#[async_trait::async_trait]
impl DatabaseConnection for RedshiftConnection {
    fn backend_kind(&self) -> BackendKind {
        BackendKind::Redshift
    }

    async fn execute(&mut self, sql: &str) -> Result<Option<ResultSet>, DatabaseError> {
        self.in_flight = true;
        let result = self.run(sql).await;
        self.in_flight = false;
        result
    }

    async fn close(self: Box<Self>) -> Result<(), DatabaseError> {
        let RedshiftConnection {
            client,
            driver,
            in_flight,
        } = *self;

        // The server keeps running an abandoned statement until told otherwise
        if in_flight {
            tracing::warn!("Cancelling Redshift statement still running at close");
            match tokio::time::timeout(CLOSE_GRACE, client.cancel_token().cancel_query(NoTls)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Failed to cancel Redshift statement: {}", e),
                Err(_) => tracing::warn!("Redshift cancel request timed out"),
            }
        }

        drop(client);
        release_driver(driver, in_flight, CLOSE_GRACE).await
    }
}

/// Wait for the connection driver to exit once the client is gone.
///
/// The driver only finishes after draining pending responses, so with a
/// statement still in flight it is aborted instead of awaited.
async fn release_driver(mut driver: JoinHandle<()>, in_flight: bool, grace: Duration) -> Result<(), DatabaseError> {
    if in_flight {
        driver.abort();
        return Ok(());
    }

    match tokio::time::timeout(grace, &mut driver).await {
        Ok(joined) => joined.map_err(|e| DatabaseError::Connection(format!("Redshift driver task failed: {}", e))),
        Err(_) => {
            driver.abort();
            Err(DatabaseError::Connection(format!(
                "Redshift session did not close within {}s",
                grace.as_secs()
            )))
        }
    }
}

fn execution_error(e: tokio_postgres::Error) -> DatabaseError {
    let details = if let Some(db_error) = e.as_db_error() {
        format!("Code: {}, Message: {}", db_error.code().code(), db_error.message())
    } else {
        e.to_string()
    };
    DatabaseError::Execution(details)
}
