use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::backend::BackendKind;
use super::chart::Figure;
use super::result_set::ResultSet;

/// Result of the question → SQL → validate → execute chain.
///
/// Every consumer branches on this; only `Success` feeds derivation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineOutcome {
    SqlGenerationFailed,
    ConnectionFailed { reason: String },
    SqlInvalid { sql: String, reason: String },
    ExecutionFailed { sql: String, reason: String },
    Success { sql: String, result: ResultSet },
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Success { .. })
    }

    pub fn sql(&self) -> Option<&str> {
        match self {
            PipelineOutcome::SqlInvalid { sql, .. }
            | PipelineOutcome::ExecutionFailed { sql, .. }
            | PipelineOutcome::Success { sql, .. } => Some(sql),
            _ => None,
        }
    }

    /// Message shown in place of an answer when the chain halted
    pub fn halt_message(&self) -> Option<String> {
        match self {
            PipelineOutcome::SqlGenerationFailed => {
                Some("I wasn't able to generate SQL for that question".to_string())
            }
            PipelineOutcome::ConnectionFailed { reason } => {
                Some(format!("Could not connect to the database: {}", reason))
            }
            PipelineOutcome::SqlInvalid { .. } => {
                Some("I couldn't produce valid SQL for that question".to_string())
            }
            PipelineOutcome::ExecutionFailed { reason, .. } => {
                Some(format!("The query passed validation but failed to run: {}", reason))
            }
            PipelineOutcome::Success { .. } => None,
        }
    }
}

/// One derived artifact (chart, summary, follow-ups)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Artifact<T> {
    Ready(T),
    /// The step ran (or should have) but produced nothing usable
    Unavailable(String),
    /// The step was disabled or not applicable
    Skipped,
}

impl<T> Artifact<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Artifact::Ready(_))
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Artifact::Ready(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartArtifacts {
    /// Chart code as returned by the gateway
    pub code: Artifact<String>,
    pub figure: Artifact<Figure>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedArtifacts {
    pub chart_applicable: bool,
    pub chart: ChartArtifacts,
    pub summary: Artifact<String>,
    pub followups: Artifact<Vec<String>>,
}

/// Which derivation steps the caller wants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivationOptions {
    pub chart: bool,
    pub summary: bool,
    pub followups: bool,
}

impl Default for DerivationOptions {
    fn default() -> Self {
        Self {
            chart: true,
            summary: true,
            followups: true,
        }
    }
}

/// Partial override of the configured derivation options
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct DerivationOverrides {
    pub show_chart: Option<bool>,
    pub show_summary: Option<bool>,
    pub show_followups: Option<bool>,
}

impl DerivationOverrides {
    pub fn apply(&self, base: DerivationOptions) -> DerivationOptions {
        DerivationOptions {
            chart: self.show_chart.unwrap_or(base.chart),
            summary: self.show_summary.unwrap_or(base.summary),
            followups: self.show_followups.unwrap_or(base.followups),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
    pub backend: Option<String>,
    #[serde(default)]
    pub options: DerivationOverrides,
}

/// Everything produced for one question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub id: String,
    pub question: String,
    pub backend: BackendKind,
    pub outcome: PipelineOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<DerivedArtifacts>,
    pub answered_at: DateTime<Utc>,
}

impl Answer {
    pub fn new(
        question: String,
        backend: BackendKind,
        outcome: PipelineOutcome,
        artifacts: Option<DerivedArtifacts>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            question,
            backend,
            message: outcome.halt_message(),
            outcome,
            artifacts,
            answered_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply_on_top_of_config() {
        let overrides = DerivationOverrides {
            show_chart: Some(false),
            show_summary: None,
            show_followups: None,
        };
        let options = overrides.apply(DerivationOptions::default());
        assert!(!options.chart);
        assert!(options.summary);
        assert!(options.followups);
    }

    #[test]
    fn test_halt_messages() {
        assert!(PipelineOutcome::SqlGenerationFailed.halt_message().is_some());
        let success = PipelineOutcome::Success {
            sql: "SELECT 1".to_string(),
            result: ResultSet::default(),
        };
        assert!(success.halt_message().is_none());
        assert_eq!(success.sql(), Some("SELECT 1"));
    }

    #[test]
    fn test_outcome_serialization_is_tagged() {
        let outcome = PipelineOutcome::SqlInvalid {
            sql: "SELEC".to_string(),
            reason: "syntax error".to_string(),
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], "sql_invalid");
        assert_eq!(value["sql"], "SELEC");
    }

    #[test]
    fn test_artifact_serialization() {
        let ready: Artifact<String> = Artifact::Ready("ok".to_string());
        let value = serde_json::to_value(&ready).unwrap();
        assert_eq!(value["status"], "ready");
        assert_eq!(value["value"], "ok");

        let skipped: Artifact<String> = Artifact::Skipped;
        assert_eq!(serde_json::to_value(&skipped).unwrap()["status"], "skipped");
    }
}
