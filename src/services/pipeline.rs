// Question answering: SQL generation, validation, execution, derivation
use crate::config::Config;
use crate::models::{Answer, BackendKind, DerivationOptions, PipelineOutcome, ResultSet};
use crate::services::database::{BackendConnector, DatabaseError};
use crate::services::derivation::DerivationPipeline;
use crate::services::inference::{BackendHint, GatewayError, InferenceGateway};
use crate::services::query_service::QueryExecutor;
use crate::validation::{SqlValidator, Verdict};
use std::sync::Arc;
use std::time::Duration;

/// One run of the question → answer chain.
///
/// Holds no per-session state: the backend is a parameter of every call, so
/// concurrent questions against different backends do not interact.
pub struct QueryPipeline {
    gateway: Arc<dyn InferenceGateway>,
    connector: Arc<BackendConnector>,
    validator: SqlValidator,
    executor: QueryExecutor,
    derivation: DerivationPipeline,
    gateway_timeout: Duration,
}

impl QueryPipeline {
    pub fn new(config: &Config, gateway: Arc<dyn InferenceGateway>, connector: Arc<BackendConnector>) -> Self {
        let query_timeout = Duration::from_secs(config.pipeline.query_timeout_secs);
        let gateway_timeout = Duration::from_secs(config.pipeline.gateway_timeout_secs);

        Self {
            validator: SqlValidator::new(connector.clone(), query_timeout, config.pipeline.allow_mutations),
            executor: QueryExecutor::new(connector.clone(), query_timeout),
            derivation: DerivationPipeline::new(gateway.clone(), gateway_timeout, config.pipeline.max_followups),
            gateway,
            connector,
            gateway_timeout,
        }
    }

    pub fn connector(&self) -> &Arc<BackendConnector> {
        &self.connector
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    /// Run the whole chain. Derivation only runs after a successful query.
    pub async fn ask(&self, question: &str, kind: BackendKind, options: DerivationOptions) -> Answer {
        let outcome = self.run_query(question, kind).await;

        let artifacts = match &outcome {
            PipelineOutcome::Success { sql, result } => {
                Some(self.derivation.derive(question, sql, result, options).await)
            }
            halted => {
                tracing::info!("Pipeline halted for {}: {:?}", kind, halted.halt_message());
                None
            }
        };

        Answer::new(question.to_string(), kind, outcome, artifacts)
    }

    /// Generate, validate and execute SQL for `question`
    pub async fn run_query(&self, question: &str, kind: BackendKind) -> PipelineOutcome {
        let hint = BackendHint::from_config(kind, self.connector.backends());

        let sql = match self.bounded(self.gateway.generate_sql(question, &hint)).await {
            // Validation and execution both see exactly this string
            Ok(Some(sql)) if !sql.trim().is_empty() => sql.trim().to_string(),
            Ok(_) => {
                tracing::warn!("Inference gateway produced no SQL for question");
                return PipelineOutcome::SqlGenerationFailed;
            }
            Err(e) => {
                tracing::warn!("SQL generation failed: {}", e);
                return PipelineOutcome::SqlGenerationFailed;
            }
        };
        tracing::info!("Generated SQL for {}: {}", kind, sql);

        match self.validator.check(&sql, kind).await {
            Ok(Verdict::Valid) => {}
            Ok(Verdict::Invalid { reason }) => return PipelineOutcome::SqlInvalid { sql, reason },
            Err(e) => return PipelineOutcome::ConnectionFailed { reason: e.to_string() },
        }

        match self.executor.execute(&sql, kind).await {
            Ok(result) => PipelineOutcome::Success {
                sql,
                result: result.unwrap_or_else(ResultSet::default),
            },
            Err(DatabaseError::Connection(reason)) => PipelineOutcome::ConnectionFailed { reason },
            Err(e) => {
                tracing::error!("SQL passed validation on {} but failed to execute: {}", kind, e);
                PipelineOutcome::ExecutionFailed {
                    sql,
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Questions to suggest at the start of a session; empty when the
    /// gateway has none or cannot be reached.
    pub async fn suggested_questions(&self) -> Vec<String> {
        match self.bounded(self.gateway.generate_questions()).await {
            Ok(questions) => questions,
            Err(e) => {
                tracing::warn!("Failed to generate suggested questions: {}", e);
                Vec::new()
            }
        }
    }

    async fn bounded<T>(
        &self,
        call: impl std::future::Future<Output = Result<T, GatewayError>>,
    ) -> Result<T, GatewayError> {
        tokio::time::timeout(self.gateway_timeout, call)
            .await
            .unwrap_or_else(|_| Err(GatewayError::Timeout(self.gateway_timeout.as_secs())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        BackendsConfig, CacheConfig, GatewayConfig, LoggingConfig, PipelineConfig, ServerConfig,
    };
    use crate::models::{Artifact, ColumnType};
    use crate::services::inference::test_support::ScriptedGateway;
    use tempfile::{tempdir, TempDir};

    fn test_config(backends: BackendsConfig) -> Config {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                style: "auto".to_string(),
            },
            gateway: GatewayConfig {
                endpoint: "http://127.0.0.1:1/rpc".to_string(),
                api_key: None,
                model: "chinook".to_string(),
                timeout_secs: 5,
            },
            pipeline: PipelineConfig {
                default_backend: "sqlite".to_string(),
                query_timeout_secs: 5,
                gateway_timeout_secs: 5,
                show_chart: true,
                show_summary: true,
                show_followups: true,
                max_followups: 5,
                allow_mutations: true,
            },
            cache: CacheConfig {
                enabled: false,
                max_entries: 10,
                ttl_secs: 60,
            },
            backends,
        }
    }

    fn chinook() -> (TempDir, BackendsConfig) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chinook.sqlite");
        rusqlite::Connection::open(&path)
            .unwrap()
            .execute_batch(
                "CREATE TABLE customers (CustomerId INTEGER PRIMARY KEY, FirstName TEXT, Country TEXT);
                 INSERT INTO customers VALUES (1, 'Luís', 'Brazil'), (2, 'Leonie', 'Germany'),
                                              (3, 'François', 'Canada'), (4, 'Bjørn', 'Norway');",
            )
            .unwrap();
        let mut backends = BackendsConfig::default();
        backends.sqlite.path = Some(path.to_string_lossy().to_string());
        (dir, backends)
    }

    fn pipeline(backends: BackendsConfig, gateway: Arc<ScriptedGateway>) -> QueryPipeline {
        let config = test_config(backends);
        let connector = Arc::new(BackendConnector::new(config.backends.clone(), Duration::from_secs(5)));
        QueryPipeline::new(&config, gateway, connector)
    }

    #[tokio::test]
    async fn test_count_question_on_embedded_backend() {
        let (_dir, backends) = chinook();
        let gateway = Arc::new(ScriptedGateway {
            sql: Some("SELECT COUNT(*) AS customers FROM customers".to_string()),
            chart_code: Some("fig = px.bar(df, x='customers', y='customers')".to_string()),
            summary: Some("There are 4 customers.".to_string()),
            followups: vec!["Which country has the most customers?".to_string()],
            ..Default::default()
        });
        let pipeline = pipeline(backends, gateway.clone());

        let answer = pipeline
            .ask("How many customers are there?", BackendKind::Sqlite, DerivationOptions::default())
            .await;

        match &answer.outcome {
            PipelineOutcome::Success { result, .. } => {
                assert_eq!(result.row_count(), 1);
                assert_eq!(result.columns[0].data_type, ColumnType::Integer);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        let artifacts = answer.artifacts.unwrap();
        assert!(!artifacts.chart_applicable);
        assert_eq!(artifacts.chart.code, Artifact::Skipped);
        assert!(artifacts.summary.is_ready());
        assert!(artifacts.followups.is_ready());
        assert!(answer.message.is_none());
        assert_eq!(pipeline.connector().open_handles(), 0);
    }

    #[tokio::test]
    async fn test_missing_warehouse_credentials_halt_with_connection_failure() {
        let gateway = Arc::new(ScriptedGateway {
            sql: Some("SELECT 1".to_string()),
            summary: Some("never".to_string()),
            ..Default::default()
        });
        let pipeline = pipeline(BackendsConfig::default(), gateway.clone());

        let answer = pipeline
            .ask("How many customers are there?", BackendKind::Snowflake, DerivationOptions::default())
            .await;

        assert!(matches!(answer.outcome, PipelineOutcome::ConnectionFailed { .. }));
        assert!(answer.artifacts.is_none());
        assert!(answer.message.is_some());
        // Only SQL generation reached the gateway
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn test_broken_sql_halts_before_execution() {
        let (_dir, backends) = chinook();
        let gateway = Arc::new(ScriptedGateway {
            sql: Some("SELEC COUNT(* FROM customers".to_string()),
            summary: Some("never".to_string()),
            ..Default::default()
        });
        let pipeline = pipeline(backends, gateway.clone());

        let answer = pipeline
            .ask("How many customers are there?", BackendKind::Sqlite, DerivationOptions::default())
            .await;

        match &answer.outcome {
            PipelineOutcome::SqlInvalid { sql, .. } => assert!(sql.starts_with("SELEC ")),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(answer.artifacts.is_none());
        assert_eq!(gateway.calls(), 1);
        assert_eq!(pipeline.connector().open_handles(), 0);
    }

    #[tokio::test]
    async fn test_execution_failure_after_validation_is_distinct() {
        let dir = tempdir().unwrap();
        let reference = dir.path().join("reference.sqlite");
        let live = dir.path().join("live.sqlite");
        rusqlite::Connection::open(&reference)
            .unwrap()
            .execute_batch("CREATE TABLE invoices (InvoiceId INTEGER, Total REAL);")
            .unwrap();
        rusqlite::Connection::open(&live)
            .unwrap()
            .execute_batch("CREATE TABLE customers (CustomerId INTEGER);")
            .unwrap();

        let mut backends = BackendsConfig::default();
        backends.sqlite.path = Some(live.to_string_lossy().to_string());
        backends.sqlite.validation_path = Some(reference.to_string_lossy().to_string());
        let gateway = Arc::new(ScriptedGateway {
            sql: Some("SELECT SUM(Total) FROM invoices".to_string()),
            summary: Some("never".to_string()),
            ..Default::default()
        });
        let pipeline = pipeline(backends, gateway.clone());

        let answer = pipeline
            .ask("What is the total revenue?", BackendKind::Sqlite, DerivationOptions::default())
            .await;

        match &answer.outcome {
            PipelineOutcome::ExecutionFailed { sql, reason } => {
                assert_eq!(sql, "SELECT SUM(Total) FROM invoices");
                assert!(reason.contains("invoices"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(answer.artifacts.is_none());
        assert!(answer.message.is_some());
        assert_eq!(gateway.calls(), 1);
        assert_eq!(pipeline.connector().open_handles(), 0);
    }

    #[tokio::test]
    async fn test_generated_sql_is_trimmed_once() {
        let (_dir, backends) = chinook();
        let padded = pipeline(
            backends,
            Arc::new(ScriptedGateway {
                sql: Some("\n  SELECT COUNT(*) FROM customers  \n".to_string()),
                ..Default::default()
            }),
        );
        let outcome = padded.run_query("How many customers are there?", BackendKind::Sqlite).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.sql(), Some("SELECT COUNT(*) FROM customers"));

        let blank = pipeline(
            BackendsConfig::default(),
            Arc::new(ScriptedGateway {
                sql: Some("   ".to_string()),
                ..Default::default()
            }),
        );
        assert_eq!(
            blank.run_query("?", BackendKind::Sqlite).await,
            PipelineOutcome::SqlGenerationFailed
        );
    }

    #[tokio::test]
    async fn test_no_sql_generated() {
        let (_dir, backends) = chinook();
        let pipeline = pipeline(backends, Arc::new(ScriptedGateway::default()));
        let outcome = pipeline.run_query("???", BackendKind::Sqlite).await;
        assert_eq!(outcome, PipelineOutcome::SqlGenerationFailed);
    }

    #[tokio::test]
    async fn test_chart_for_multi_row_result() {
        let (_dir, backends) = chinook();
        let gateway = Arc::new(ScriptedGateway {
            sql: Some("SELECT Country, COUNT(*) AS total FROM customers GROUP BY Country".to_string()),
            chart_code: Some("fig = px.bar(df, x='Country', y='total')".to_string()),
            ..Default::default()
        });
        let pipeline = pipeline(backends, gateway);

        let answer = pipeline
            .ask("Customers per country", BackendKind::Sqlite, DerivationOptions::default())
            .await;
        let artifacts = answer.artifacts.unwrap();
        assert!(artifacts.chart_applicable);
        assert_eq!(
            artifacts.chart.figure.ready().unwrap().data[0].x.as_ref().unwrap().len(),
            4
        );
        // No summary or follow-ups scripted
        assert!(matches!(artifacts.summary, Artifact::Unavailable(_)));
        assert!(matches!(artifacts.followups, Artifact::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_suggested_questions() {
        let (_dir, backends) = chinook();
        let gateway = Arc::new(ScriptedGateway {
            questions: vec!["Who are the top customers?".to_string()],
            ..Default::default()
        });
        let pipeline = pipeline(backends, gateway);
        assert_eq!(pipeline.suggested_questions().await.len(), 1);
    }
}
