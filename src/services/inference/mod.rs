// Inference gateway: the remote service that writes SQL, chart code,
// summaries and questions
pub mod cached;
pub mod rpc;

pub use cached::CachedGateway;
pub use rpc::RpcGateway;

use crate::config::BackendsConfig;
use crate::models::{BackendKind, ResultSet, Setting};
use crate::services::chart_service;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Failed to call inference gateway: {0}")]
    Transport(String),

    #[error("Inference gateway returned error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to parse inference gateway response: {0}")]
    Decode(String),

    #[error("Inference gateway call timed out after {0}s")]
    Timeout(u64),

    #[error("Inference gateway is not configured: {0}")]
    NotConfigured(String),
}

/// Context appended to a question so generated SQL targets the right
/// warehouse namespace. Embedded backends need none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendHint {
    pub backend: BackendKind,
    pub database: Option<String>,
    pub schema: Option<String>,
}

impl BackendHint {
    pub fn from_config(backend: BackendKind, backends: &BackendsConfig) -> Self {
        let (database, schema) = if backend.is_embedded() {
            (None, None)
        } else {
            (
                backends.setting(backend, Setting::Database),
                backends.setting(backend, Setting::Schema),
            )
        };
        Self {
            backend,
            database,
            schema,
        }
    }

    /// The question as sent for SQL generation
    pub fn qualify(&self, question: &str) -> String {
        match self.backend {
            BackendKind::Snowflake | BackendKind::Redshift => format!(
                "{} in {} , assuming database name is {} and schema name is {} ",
                question,
                self.backend,
                self.database.as_deref().unwrap_or(""),
                self.schema.as_deref().unwrap_or("")
            ),
            BackendKind::Sqlite | BackendKind::DuckDb => question.to_string(),
        }
    }
}

/// Boundary to the language-model service.
///
/// `Ok(None)` and empty lists mean the gateway had nothing to offer; errors
/// are for failed calls. Callers treat both as an absent result.
#[async_trait::async_trait]
pub trait InferenceGateway: Send + Sync {
    async fn generate_sql(&self, question: &str, hint: &BackendHint) -> Result<Option<String>, GatewayError>;

    /// Suggested questions to start a session with
    async fn generate_questions(&self) -> Result<Vec<String>, GatewayError>;

    /// Whether a chart is worth generating for `result`. Implementations
    /// that override this must stay consistent with the local predicate.
    fn should_generate_chart(&self, result: &ResultSet) -> bool {
        chart_service::should_generate_chart(result)
    }

    async fn generate_chart_code(
        &self,
        question: &str,
        sql: &str,
        result: &ResultSet,
    ) -> Result<Option<String>, GatewayError>;

    async fn generate_summary(&self, question: &str, result: &ResultSet) -> Result<Option<String>, GatewayError>;

    async fn generate_followup_questions(
        &self,
        question: &str,
        sql: &str,
        result: &ResultSet,
    ) -> Result<Vec<String>, GatewayError>;
}

/// Strip markdown code fences the model sometimes wraps SQL in
pub fn extract_sql(text: &str) -> Option<String> {
    let cleaned = text
        .trim()
        .trim_start_matches("```sql")
        .trim_start_matches("```SQL")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}
