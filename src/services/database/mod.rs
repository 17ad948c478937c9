// Backend connector: resolves a backend kind to a live connection handle
pub mod adapter;
pub mod duckdb;
pub mod redshift;
pub mod snowflake;
pub mod sqlite;

pub use adapter::{ConnectionHandle, DatabaseConnection};

use crate::config::BackendsConfig;
use crate::models::{BackendKind, Setting};
use self::duckdb::DuckDbConnection;
use self::redshift::{RedshiftConnection, RedshiftParams};
use self::snowflake::{SnowflakeConnection, SnowflakeParams};
use self::sqlite::SqliteConnection;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Missing settings or an unreachable store. Never retried.
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Session setup failed on `{statement}`: {message}")]
    DialectSetup { statement: String, message: String },

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Database operation timed out after {0}s")]
    Timeout(u64),
}

/// Why a connection is opened. Validation may run against a fixed reference
/// dataset instead of the live store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPurpose {
    Validation,
    Execution,
}

/// Opens one fresh session per call. Nothing is pooled or shared; the caller
/// owns the returned handle and must close it.
pub struct BackendConnector {
    backends: BackendsConfig,
    connect_timeout: Duration,
    live: Arc<AtomicUsize>,
}

impl BackendConnector {
    pub fn new(backends: BackendsConfig, connect_timeout: Duration) -> Self {
        Self {
            backends,
            connect_timeout,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn backends(&self) -> &BackendsConfig {
        &self.backends
    }

    /// Handles opened by this connector that are not yet closed or dropped
    pub fn open_handles(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub async fn open(&self, kind: BackendKind, purpose: ConnectionPurpose) -> Result<ConnectionHandle, DatabaseError> {
        let missing = self.backends.missing_settings(kind);
        if !missing.is_empty() {
            let names: Vec<String> = missing
                .iter()
                .map(|s| format!("backends.{}.{}", kind.as_str(), s.key()))
                .collect();
            return Err(DatabaseError::Connection(format!(
                "{} is not configured, missing setting(s): {}",
                kind,
                names.join(", ")
            )));
        }

        tracing::debug!("Opening {} connection for {:?}", kind, purpose);

        let conn: Box<dyn DatabaseConnection> = match kind {
            BackendKind::Sqlite => {
                let path = match purpose {
                    ConnectionPurpose::Validation => self
                        .backends
                        .sqlite
                        .validation_path
                        .clone()
                        .filter(|p| !p.trim().is_empty())
                        .or_else(|| self.required(kind, Setting::Path).ok()),
                    ConnectionPurpose::Execution => None,
                };
                let path = match path {
                    Some(path) => path,
                    None => self.required(kind, Setting::Path)?,
                };
                let conn = tokio::task::spawn_blocking(move || SqliteConnection::open(&path))
                    .await
                    .map_err(|e| DatabaseError::Connection(format!("SQLite worker failed: {}", e)))??;
                Box::new(conn)
            }
            BackendKind::DuckDb => {
                let path = self.required(kind, Setting::Path)?;
                let conn = tokio::task::spawn_blocking(move || DuckDbConnection::open(&path))
                    .await
                    .map_err(|e| DatabaseError::Connection(format!("DuckDB worker failed: {}", e)))??;
                Box::new(conn)
            }
            BackendKind::Redshift => {
                let params = self.redshift_params()?;
                let connect = RedshiftConnection::connect(&params);
                let conn = tokio::time::timeout(self.connect_timeout, connect)
                    .await
                    .map_err(|_| self.connect_timed_out(kind))??;
                Box::new(conn)
            }
            BackendKind::Snowflake => {
                let params = self.snowflake_params()?;
                let connect = SnowflakeConnection::connect(&params, self.connect_timeout);
                let conn = tokio::time::timeout(self.connect_timeout, connect)
                    .await
                    .map_err(|_| self.connect_timed_out(kind))??;
                Box::new(conn)
            }
        };

        Ok(ConnectionHandle::new(conn, self.live.clone()))
    }

    fn required(&self, kind: BackendKind, setting: Setting) -> Result<String, DatabaseError> {
        self.backends.setting(kind, setting).ok_or_else(|| {
            DatabaseError::Connection(format!(
                "{} is not configured, missing setting: backends.{}.{}",
                kind,
                kind.as_str(),
                setting.key()
            ))
        })
    }

    fn connect_timed_out(&self, kind: BackendKind) -> DatabaseError {
        DatabaseError::Connection(format!(
            "Timed out connecting to {} after {}s",
            kind,
            self.connect_timeout.as_secs()
        ))
    }

    fn redshift_params(&self) -> Result<RedshiftParams, DatabaseError> {
        let kind = BackendKind::Redshift;
        let port = self.required(kind, Setting::Port)?;
        let port = port.parse::<u16>().map_err(|_| {
            DatabaseError::Connection(format!("Invalid setting backends.redshift.port: {}", port))
        })?;
        Ok(RedshiftParams {
            host: self.required(kind, Setting::Host)?,
            port,
            database: self.required(kind, Setting::Database)?,
            user: self.required(kind, Setting::User)?,
            password: self.required(kind, Setting::Password)?,
        })
    }

    fn snowflake_params(&self) -> Result<SnowflakeParams, DatabaseError> {
        let kind = BackendKind::Snowflake;
        Ok(SnowflakeParams {
            account: self.required(kind, Setting::Account)?,
            user: self.required(kind, Setting::User)?,
            password: self.required(kind, Setting::Password)?,
            warehouse: self.required(kind, Setting::Warehouse)?,
            database: self.required(kind, Setting::Database)?,
            role: self.required(kind, Setting::Role)?,
            schema: self.required(kind, Setting::Schema)?,
        })
    }
}
