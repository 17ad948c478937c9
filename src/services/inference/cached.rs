// Memoizing decorator around any inference gateway
use super::{BackendHint, GatewayError, InferenceGateway};
use crate::config::CacheConfig;
use crate::models::ResultSet;
use crate::services::memo_cache::{CacheStats, MemoCache};
use std::sync::Arc;
use std::time::Duration;

/// Caches successful, non-empty gateway answers keyed by a content hash of
/// the call inputs. Failures and absent results always reach the inner
/// gateway again on the next call.
pub struct CachedGateway {
    inner: Arc<dyn InferenceGateway>,
    text: MemoCache<String>,
    lists: MemoCache<Vec<String>>,
}

impl CachedGateway {
    pub fn new(inner: Arc<dyn InferenceGateway>, config: &CacheConfig) -> Self {
        let ttl = Duration::from_secs(config.ttl_secs);
        Self {
            inner,
            text: MemoCache::new(config.max_entries, ttl),
            lists: MemoCache::new(config.max_entries, ttl),
        }
    }

    pub fn stats(&self) -> CacheStats {
        let text = self.text.stats();
        let lists = self.lists.stats();
        CacheStats {
            hits: text.hits + lists.hits,
            misses: text.misses + lists.misses,
            evictions: text.evictions + lists.evictions,
            expirations: text.expirations + lists.expirations,
        }
    }

    fn remember_text(&self, key: String, value: Result<Option<String>, GatewayError>) -> Result<Option<String>, GatewayError> {
        if let Ok(Some(text)) = &value {
            self.text.put(key, text.clone());
        }
        value
    }

    fn remember_list(&self, key: String, value: Result<Vec<String>, GatewayError>) -> Result<Vec<String>, GatewayError> {
        if let Ok(list) = &value {
            if !list.is_empty() {
                self.lists.put(key, list.clone());
            }
        }
        value
    }
}

#[async_trait::async_trait]
impl InferenceGateway for CachedGateway {
    async fn generate_sql(&self, question: &str, hint: &BackendHint) -> Result<Option<String>, GatewayError> {
        let key = MemoCache::<String>::key("generate_sql", &[&hint.qualify(question), hint.backend.as_str()]);
        if let Some(sql) = self.text.get(&key) {
            return Ok(Some(sql));
        }
        let value = self.inner.generate_sql(question, hint).await;
        self.remember_text(key, value)
    }

    async fn generate_questions(&self) -> Result<Vec<String>, GatewayError> {
        let key = MemoCache::<Vec<String>>::key("generate_questions", &[]);
        if let Some(questions) = self.lists.get(&key) {
            return Ok(questions);
        }
        let value = self.inner.generate_questions().await;
        self.remember_list(key, value)
    }

    fn should_generate_chart(&self, result: &ResultSet) -> bool {
        self.inner.should_generate_chart(result)
    }

    async fn generate_chart_code(
        &self,
        question: &str,
        sql: &str,
        result: &ResultSet,
    ) -> Result<Option<String>, GatewayError> {
        let key = MemoCache::<String>::key("generate_chart_code", &[question, sql, &result.describe_columns()]);
        if let Some(code) = self.text.get(&key) {
            return Ok(Some(code));
        }
        let value = self.inner.generate_chart_code(question, sql, result).await;
        self.remember_text(key, value)
    }

    async fn generate_summary(&self, question: &str, result: &ResultSet) -> Result<Option<String>, GatewayError> {
        let key = MemoCache::<String>::key("generate_summary", &[question, &result.to_markdown()]);
        if let Some(summary) = self.text.get(&key) {
            return Ok(Some(summary));
        }
        let value = self.inner.generate_summary(question, result).await;
        self.remember_text(key, value)
    }

    async fn generate_followup_questions(
        &self,
        question: &str,
        sql: &str,
        result: &ResultSet,
    ) -> Result<Vec<String>, GatewayError> {
        let key = MemoCache::<Vec<String>>::key("generate_followup_questions", &[question, sql, &result.describe_columns()]);
        if let Some(questions) = self.lists.get(&key) {
            return Ok(questions);
        }
        let value = self.inner.generate_followup_questions(question, sql, result).await;
        self.remember_list(key, value)
    }
}
