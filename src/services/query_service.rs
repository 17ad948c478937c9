use crate::models::{BackendKind, ResultSet};
use crate::services::database::{BackendConnector, ConnectionHandle, ConnectionPurpose, DatabaseError};
use crate::services::dialect::DialectAdapter;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Runs validated SQL and materializes the result.
///
/// Every call opens its own session, applies the dialect setup, executes
/// and closes the session whatever the outcome.
pub struct QueryExecutor {
    connector: Arc<BackendConnector>,
    timeout: Duration,
}

impl QueryExecutor {
    pub fn new(connector: Arc<BackendConnector>, timeout: Duration) -> Self {
        Self { connector, timeout }
    }

    /// Execute `sql` against `kind`.
    ///
    /// # Returns
    /// `Some(result)` for statements with tabular output (possibly zero rows),
    /// `None` for statements without any.
    pub async fn execute(&self, sql: &str, kind: BackendKind) -> Result<Option<ResultSet>, DatabaseError> {
        let start_time = Instant::now();
        let mut handle = self.connector.open(kind, ConnectionPurpose::Execution).await?;
        let result = self.run(kind, &mut handle, sql).await;
        handle.close().await;

        match &result {
            Ok(Some(rs)) => {
                tracing::info!(
                    "Query on {} returned {} rows in {}ms",
                    kind,
                    rs.row_count(),
                    start_time.elapsed().as_millis()
                );
                tracing::debug!("Result columns:\n{}", rs.describe_columns());
            }
            Ok(None) => tracing::info!("Statement on {} produced no tabular output", kind),
            Err(e) => tracing::warn!("Query on {} failed: {}", kind, e),
        }
        result
    }

    /// Health check: session setup followed by `SELECT 1`
    pub async fn ping(&self, kind: BackendKind) -> Result<(), DatabaseError> {
        self.execute("SELECT 1", kind).await.map(|_| ())
    }

    async fn run(
        &self,
        kind: BackendKind,
        handle: &mut ConnectionHandle,
        sql: &str,
    ) -> Result<Option<ResultSet>, DatabaseError> {
        let backends = self.connector.backends();
        let work = async {
            DialectAdapter::prepare(kind, handle, backends).await?;
            handle.execute(sql).await
        };
        tokio::time::timeout(self.timeout, work)
            .await
            .map_err(|_| DatabaseError::Timeout(self.timeout.as_secs()))?
    }
}
