// Connection abstraction shared by every backend
use crate::models::{BackendKind, ResultSet};
use crate::services::database::DatabaseError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A live session against one backend.
///
/// Implementations run arbitrary SQL and materialize whatever the statement
/// returns. They never retry and never share the underlying session.
#[async_trait::async_trait]
pub trait DatabaseConnection: Send {
    fn backend_kind(&self) -> BackendKind;

    /// Run one statement. `Ok(None)` means the statement produced no tabular
    /// output (DDL, `USE ...`, `SET ...`).
    async fn execute(&mut self, sql: &str) -> Result<Option<ResultSet>, DatabaseError>;

    /// Release the session. Called exactly once by `ConnectionHandle::close`.
    async fn close(self: Box<Self>) -> Result<(), DatabaseError>;
}

/// Owned handle returned by the connector.
///
/// Counts towards the connector's live-handle total until it is closed or
/// dropped, which makes leaked sessions observable.
pub struct ConnectionHandle {
    inner: Option<Box<dyn DatabaseConnection>>,
    live: Arc<AtomicUsize>,
}

impl ConnectionHandle {
    pub(crate) fn new(inner: Box<dyn DatabaseConnection>, live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self {
            inner: Some(inner),
            live,
        }
    }

    pub fn backend_kind(&self) -> Option<BackendKind> {
        self.inner.as_ref().map(|c| c.backend_kind())
    }

    pub async fn execute(&mut self, sql: &str) -> Result<Option<ResultSet>, DatabaseError> {
        match self.inner.as_mut() {
            Some(conn) => conn.execute(sql).await,
            None => Err(DatabaseError::Connection("connection already closed".to_string())),
        }
    }

    /// Close the session. Errors while closing are logged, never returned:
    /// the caller has already decided the outcome of its work.
    pub async fn close(mut self) {
        if let Some(conn) = self.inner.take() {
            let kind = conn.backend_kind();
            if let Err(e) = conn.close().await {
                tracing::warn!("Failed to close {} connection cleanly: {}", kind, e);
            }
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        // Dropped without close(): the driver releases the session on drop
        if self.inner.take().is_some() {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopConnection;

    #[async_trait::async_trait]
    impl DatabaseConnection for NoopConnection {
        fn backend_kind(&self) -> BackendKind {
            BackendKind::Sqlite
        }

        async fn execute(&mut self, _sql: &str) -> Result<Option<ResultSet>, DatabaseError> {
            Ok(None)
        }

        async fn close(self: Box<Self>) -> Result<(), DatabaseError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_handle_counts_until_closed() {
        let live = Arc::new(AtomicUsize::new(0));
        let handle = ConnectionHandle::new(Box::new(NoopConnection), live.clone());
        assert_eq!(live.load(Ordering::SeqCst), 1);
        handle.close().await;
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dropped_handle_is_released() {
        let live = Arc::new(AtomicUsize::new(0));
        {
            let _handle = ConnectionHandle::new(Box::new(NoopConnection), live.clone());
            assert_eq!(live.load(Ordering::SeqCst), 1);
        }
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }
}
