// JSON-RPC client for the hosted inference service
use super::{extract_sql, BackendHint, GatewayError, InferenceGateway};
use crate::config::GatewayConfig;
use crate::models::ResultSet;
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

/// Request payload shared by every result-aware method
#[derive(Debug, Serialize)]
struct DataResult<'a> {
    question: &'a str,
    sql: &'a str,
    table_markdown: String,
    error: Option<String>,
    correction_attempts: u32,
}

#[derive(Debug, Deserialize)]
struct SqlAnswer {
    sql: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuestionList {
    #[serde(default)]
    questions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PlotlyResult {
    plotly_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StringData {
    data: Option<String>,
}

pub struct RpcGateway {
    endpoint: Url,
    api_key: Option<String>,
    model: String,
    http_client: HttpClient,
}

impl RpcGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| GatewayError::NotConfigured(format!("invalid gateway.endpoint {}: {}", config.endpoint, e)))?;

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            endpoint,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            model: config.model.clone(),
            http_client,
        })
    }

    /// Call one RPC method. `Ok(None)` when the response carries no `result`.
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<Option<T>, GatewayError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| GatewayError::NotConfigured("gateway.api_key is not set".to_string()))?;

        tracing::debug!("Calling inference gateway method {}", method);

        let response = self
            .http_client
            .post(self.endpoint.clone())
            .header("Content-Type", "application/json")
            .header("Vanna-Key", api_key)
            .header("Vanna-Org", &self.model)
            .json(&json!({ "method": method, "params": params }))
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GatewayError::Status { status, body });
        }

        let mut body: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;

        match body.get_mut("result").map(Value::take) {
            None | Some(Value::Null) => {
                tracing::warn!("Inference gateway method {} returned no result", method);
                Ok(None)
            }
            Some(result) => serde_json::from_value(result)
                .map(Some)
                .map_err(|e| GatewayError::Decode(format!("{}: {}", method, e))),
        }
    }

    /// `table` is the column description for chart and follow-up calls and
    /// the rendered table for summaries
    fn data_result(question: &str, sql: &str, table: String) -> Value {
        let data = DataResult {
            question,
            sql,
            table_markdown: table,
            error: None,
            correction_attempts: 0,
        };
        json!([data])
    }
}

#[async_trait::async_trait]
impl InferenceGateway for RpcGateway {
    async fn generate_sql(&self, question: &str, hint: &BackendHint) -> Result<Option<String>, GatewayError> {
        let params = json!([{ "question": hint.qualify(question) }]);
        let answer: Option<SqlAnswer> = self.call("generate_sql_from_question", params).await?;
        Ok(answer.and_then(|a| a.sql).and_then(|sql| extract_sql(&sql)))
    }

    async fn generate_questions(&self) -> Result<Vec<String>, GatewayError> {
        let list: Option<QuestionList> = self.call("generate_questions", json!([])).await?;
        Ok(list.map(|l| l.questions).unwrap_or_default())
    }

    async fn generate_chart_code(
        &self,
        question: &str,
        sql: &str,
        result: &ResultSet,
    ) -> Result<Option<String>, GatewayError> {
        let plotly: Option<PlotlyResult> = self
            .call("generate_plotly_code", Self::data_result(question, sql, result.describe_columns()))
            .await?;
        Ok(plotly
            .and_then(|p| p.plotly_code)
            .filter(|code| !code.trim().is_empty()))
    }

    async fn generate_summary(&self, question: &str, result: &ResultSet) -> Result<Option<String>, GatewayError> {
        let summary: Option<StringData> = self
            .call("generate_summary", Self::data_result(question, "", result.to_markdown()))
            .await?;
        Ok(summary.and_then(|s| s.data).filter(|s| !s.trim().is_empty()))
    }

    async fn generate_followup_questions(
        &self,
        question: &str,
        sql: &str,
        result: &ResultSet,
    ) -> Result<Vec<String>, GatewayError> {
        let list: Option<QuestionList> = self
            .call(
                "generate_followup_questions",
                Self::data_result(question, sql, result.describe_columns()),
            )
            .await?;
        Ok(list.map(|l| l.questions).unwrap_or_default())
    }
}
