// Derivation pipeline: chart, summary and follow-ups for a successful query
use crate::models::{Artifact, ChartArtifacts, DerivationOptions, DerivedArtifacts, ResultSet};
use crate::services::chart_service;
use crate::services::inference::{GatewayError, InferenceGateway};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const CHART_UNAVAILABLE: &str = "chart could not be generated";

/// Runs the derivation steps for one result. A failing step only affects its
/// own artifact; nothing here aborts the answer.
pub struct DerivationPipeline {
    gateway: Arc<dyn InferenceGateway>,
    timeout: Duration,
    max_followups: usize,
}

impl DerivationPipeline {
    pub fn new(gateway: Arc<dyn InferenceGateway>, timeout: Duration, max_followups: usize) -> Self {
        Self {
            gateway,
            timeout,
            max_followups,
        }
    }

    pub async fn derive(
        &self,
        question: &str,
        sql: &str,
        result: &ResultSet,
        options: DerivationOptions,
    ) -> DerivedArtifacts {
        let chart_applicable = self.gateway.should_generate_chart(result);

        let chart = if options.chart && chart_applicable {
            self.chart(question, sql, result).await
        } else {
            ChartArtifacts {
                code: Artifact::Skipped,
                figure: Artifact::Skipped,
            }
        };

        let (summary, followups) = tokio::join!(
            self.summary(question, result, options.summary),
            self.followups(question, sql, result, options.followups),
        );

        DerivedArtifacts {
            chart_applicable,
            chart,
            summary,
            followups,
        }
    }

    async fn chart(&self, question: &str, sql: &str, result: &ResultSet) -> ChartArtifacts {
        let code = match self
            .bounded("chart code", self.gateway.generate_chart_code(question, sql, result))
            .await
        {
            Ok(Some(code)) => code,
            Ok(None) => {
                return ChartArtifacts {
                    code: Artifact::Unavailable("no chart code was generated".to_string()),
                    figure: Artifact::Unavailable(CHART_UNAVAILABLE.to_string()),
                }
            }
            Err(e) => {
                return ChartArtifacts {
                    code: Artifact::Unavailable(e.to_string()),
                    figure: Artifact::Unavailable(CHART_UNAVAILABLE.to_string()),
                }
            }
        };

        let figure = match chart_service::render_code(&code, result) {
            Ok(figure) => Artifact::Ready(figure),
            Err(e) => {
                tracing::warn!("Chart rendering failed: {}", e);
                Artifact::Unavailable(CHART_UNAVAILABLE.to_string())
            }
        };

        ChartArtifacts {
            code: Artifact::Ready(code),
            figure,
        }
    }

    async fn summary(&self, question: &str, result: &ResultSet, enabled: bool) -> Artifact<String> {
        if !enabled {
            return Artifact::Skipped;
        }
        match self
            .bounded("summary", self.gateway.generate_summary(question, result))
            .await
        {
            Ok(Some(summary)) => Artifact::Ready(summary),
            Ok(None) => Artifact::Unavailable("no summary was generated".to_string()),
            Err(e) => Artifact::Unavailable(e.to_string()),
        }
    }

    async fn followups(&self, question: &str, sql: &str, result: &ResultSet, enabled: bool) -> Artifact<Vec<String>> {
        if !enabled {
            return Artifact::Skipped;
        }
        match self
            .bounded(
                "follow-up questions",
                self.gateway.generate_followup_questions(question, sql, result),
            )
            .await
        {
            Ok(questions) if questions.is_empty() => {
                Artifact::Unavailable("no follow-up questions were generated".to_string())
            }
            Ok(mut questions) => {
                questions.truncate(self.max_followups);
                Artifact::Ready(questions)
            }
            Err(e) => Artifact::Unavailable(e.to_string()),
        }
    }

    /// Bound a gateway call by the configured timeout, logging failures
    async fn bounded<T>(
        &self,
        step: &str,
        call: impl Future<Output = Result<T, GatewayError>>,
    ) -> Result<T, GatewayError> {
        let outcome = match tokio::time::timeout(self.timeout, call).await {
            Ok(outcome) => outcome,
            Err(_) => Err(GatewayError::Timeout(self.timeout.as_secs())),
        };
        if let Err(e) = &outcome {
            tracing::warn!("Derivation step '{}' failed: {}", step, e);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::inference::test_support::ScriptedGateway;
    use serde_json::json;

    fn genres(rows: usize) -> ResultSet {
        ResultSet::from_positional(
            vec!["genre".into(), "tracks".into()],
            vec![],
            (0..rows).map(|i| vec![json!(format!("g{}", i)), json!(i * 10)]).collect(),
        )
    }

    fn pipeline(gateway: ScriptedGateway) -> DerivationPipeline {
        DerivationPipeline::new(Arc::new(gateway), Duration::from_secs(5), 5)
    }

    #[tokio::test]
    async fn test_all_steps_ready() {
        let derived = pipeline(ScriptedGateway {
            chart_code: Some("fig = px.bar(df, x='genre', y='tracks')".to_string()),
            summary: Some("Rock leads.".to_string()),
            followups: (0..8).map(|i| format!("question {}", i)).collect(),
            ..Default::default()
        })
        .derive("q", "SELECT 1", &genres(5), DerivationOptions::default())
        .await;

        assert!(derived.chart_applicable);
        assert!(derived.chart.code.is_ready());
        assert!(derived.chart.figure.is_ready());
        assert_eq!(derived.summary.ready().map(String::as_str), Some("Rock leads."));
        assert_eq!(derived.followups.ready().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_absent_chart_code_keeps_other_steps() {
        let derived = pipeline(ScriptedGateway {
            summary: Some("s".to_string()),
            followups: vec!["f".to_string()],
            ..Default::default()
        })
        .derive("q", "SELECT 1", &genres(5), DerivationOptions::default())
        .await;

        assert!(!derived.chart.code.is_ready());
        assert_eq!(
            derived.chart.figure,
            Artifact::Unavailable(CHART_UNAVAILABLE.to_string())
        );
        assert!(derived.summary.is_ready());
        assert!(derived.followups.is_ready());
    }

    #[tokio::test]
    async fn test_unrenderable_chart_code() {
        let derived = pipeline(ScriptedGateway {
            chart_code: Some("fig = px.bar(df, x='genre', y='missing')".to_string()),
            ..Default::default()
        })
        .derive("q", "SELECT 1", &genres(3), DerivationOptions::default())
        .await;

        assert!(derived.chart.code.is_ready());
        assert_eq!(
            derived.chart.figure,
            Artifact::Unavailable(CHART_UNAVAILABLE.to_string())
        );
    }

    #[tokio::test]
    async fn test_single_row_skips_chart() {
        let gateway = Arc::new(ScriptedGateway {
            chart_code: Some("fig = px.bar(df, x='genre', y='tracks')".to_string()),
            summary: Some("one".to_string()),
            ..Default::default()
        });
        let derived = DerivationPipeline::new(gateway.clone(), Duration::from_secs(5), 5)
            .derive("q", "SELECT 1", &genres(1), DerivationOptions::default())
            .await;

        assert!(!derived.chart_applicable);
        assert_eq!(derived.chart.code, Artifact::Skipped);
        assert!(derived.summary.is_ready());
        // summary + follow-ups only
        assert_eq!(gateway.calls(), 2);
    }

    #[tokio::test]
    async fn test_disabled_steps_are_skipped() {
        let gateway = Arc::new(ScriptedGateway::default());
        let options = DerivationOptions {
            chart: false,
            summary: false,
            followups: false,
        };
        let derived = DerivationPipeline::new(gateway.clone(), Duration::from_secs(5), 5)
            .derive("q", "SELECT 1", &genres(5), options)
            .await;

        assert!(derived.chart_applicable);
        assert_eq!(derived.chart.figure, Artifact::Skipped);
        assert_eq!(derived.summary, Artifact::Skipped);
        assert_eq!(derived.followups, Artifact::Skipped);
        assert_eq!(gateway.calls(), 0);
    }

    #[tokio::test]
    async fn test_gateway_failures_degrade() {
        let derived = pipeline(ScriptedGateway {
            fail_derivations: true,
            ..Default::default()
        })
        .derive("q", "SELECT 1", &genres(5), DerivationOptions::default())
        .await;

        assert!(matches!(derived.chart.code, Artifact::Unavailable(_)));
        assert!(matches!(derived.summary, Artifact::Unavailable(_)));
        assert!(matches!(derived.followups, Artifact::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_slow_summary_times_out() {
        let gateway = ScriptedGateway {
            summary: Some("late".to_string()),
            followups: vec!["f".to_string()],
            summary_delay: Some(Duration::from_millis(500)),
            ..Default::default()
        };
        let derived = DerivationPipeline::new(Arc::new(gateway), Duration::from_millis(50), 5)
            .derive("q", "SELECT 1", &genres(1), DerivationOptions::default())
            .await;

        assert!(matches!(derived.summary, Artifact::Unavailable(_)));
        assert!(derived.followups.is_ready());
    }
}
