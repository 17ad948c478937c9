use sqlparser::ast::Statement;
use sqlparser::dialect::{Dialect, DuckDbDialect, RedshiftSqlDialect, SQLiteDialect, SnowflakeDialect};
use sqlparser::parser::Parser;
use std::sync::Arc;
use std::time::Duration;

use crate::models::{BackendKind, SqlDialect};
use crate::services::database::{BackendConnector, ConnectionHandle, ConnectionPurpose, DatabaseError};
use crate::services::dialect::DialectAdapter;

/// Outcome of validating one statement against a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Invalid { reason: String },
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid)
    }
}

/// Validates generated SQL by running it on a disposable session.
///
/// SQL is not analysed for correctness; a statement is valid when the target
/// backend accepts it under the same session setup used for execution.
/// Mutating statements are therefore executed during validation unless
/// `allow_mutations` is off, in which case they are rejected up front.
pub struct SqlValidator {
    connector: Arc<BackendConnector>,
    timeout: Duration,
    allow_mutations: bool,
}

impl SqlValidator {
    pub fn new(connector: Arc<BackendConnector>, timeout: Duration, allow_mutations: bool) -> Self {
        Self {
            connector,
            timeout,
            allow_mutations,
        }
    }

    /// `Ok(false)` for anything the backend rejects. Only connection errors
    /// are returned as errors.
    pub async fn validate(&self, sql: &str, kind: BackendKind) -> Result<bool, DatabaseError> {
        Ok(self.check(sql, kind).await?.is_valid())
    }

    /// Like `validate`, keeping the reason a statement was rejected
    pub async fn check(&self, sql: &str, kind: BackendKind) -> Result<Verdict, DatabaseError> {
        if sql.trim().is_empty() {
            return Ok(Verdict::Invalid {
                reason: "Empty SQL query".to_string(),
            });
        }

        match Self::is_mutating(sql, kind.profile().sql_dialect) {
            Some(true) if !self.allow_mutations => {
                tracing::warn!("Rejected mutating statement for {}", kind);
                return Ok(Verdict::Invalid {
                    reason: "Only read-only queries are permitted".to_string(),
                });
            }
            Some(true) => {
                tracing::warn!("Validating a mutating statement against {}; it will be executed", kind);
            }
            _ => {}
        }

        let mut handle = self.connector.open(kind, ConnectionPurpose::Validation).await?;
        let attempt = self.attempt(kind, &mut handle, sql).await;
        handle.close().await;

        match attempt {
            Ok(()) => Ok(Verdict::Valid),
            Err(e) => {
                tracing::warn!("SQL failed validation against {}: {}", kind, e);
                Ok(Verdict::Invalid { reason: e.to_string() })
            }
        }
    }

    async fn attempt(&self, kind: BackendKind, handle: &mut ConnectionHandle, sql: &str) -> Result<(), DatabaseError> {
        let backends = self.connector.backends();
        let run = async {
            DialectAdapter::prepare(kind, handle, backends).await?;
            handle.execute(sql).await.map(|_| ())
        };
        tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| DatabaseError::Timeout(self.timeout.as_secs()))?
    }

    /// Classify `sql` with the backend's grammar. `None` when the statement
    /// cannot be parsed; the backend stays the judge of validity.
    pub fn is_mutating(sql: &str, dialect: SqlDialect) -> Option<bool> {
        let dialect = parser_dialect(dialect);
        let statements = Parser::parse_sql(dialect.as_ref(), sql).ok()?;
        if statements.is_empty() {
            return None;
        }
        Some(statements.iter().any(|stmt| !is_read_only(stmt)))
    }
}

fn parser_dialect(dialect: SqlDialect) -> Box<dyn Dialect> {
    match dialect {
        SqlDialect::Snowflake => Box::new(SnowflakeDialect {}),
        SqlDialect::Redshift => Box::new(RedshiftSqlDialect {}),
        SqlDialect::Sqlite => Box::new(SQLiteDialect {}),
        SqlDialect::DuckDb => Box::new(DuckDbDialect {}),
    }
}

fn is_read_only(stmt: &Statement) -> bool {
    matches!(
        stmt,
        Statement::Query { .. }
            | Statement::Explain { .. }
            | Statement::ExplainTable { .. }
            | Statement::ShowTables { .. }
            | Statement::ShowColumns { .. }
            | Statement::ShowVariable { .. }
            | Statement::ShowCreate { .. }
            | Statement::ShowFunctions { .. }
            | Statement::Use { .. }
    )
}
