// Snowflake adapter over the SQL REST API
use crate::models::{BackendKind, ResultSet};
use crate::services::database::adapter::DatabaseConnection;
use crate::services::database::DatabaseError;
use serde_json::Value;
use snowflake_connector_rs::{SnowflakeAuthMethod, SnowflakeClient, SnowflakeClientConfig, SnowflakeSession};
use std::time::Duration;

/// Connection parameters resolved from configuration
#[derive(Clone)]
pub struct SnowflakeParams {
    pub account: String,
    pub user: String,
    pub password: String,
    pub warehouse: String,
    pub database: String,
    pub role: String,
    pub schema: String,
}

pub struct SnowflakeConnection {
    session: SnowflakeSession,
}

impl SnowflakeConnection {
    pub async fn connect(params: &SnowflakeParams, timeout: Duration) -> Result<Self, DatabaseError> {
        let client = SnowflakeClient::new(
            &params.user,
            SnowflakeAuthMethod::Password(params.password.clone()),
            SnowflakeClientConfig {
                account: params.account.clone(),
                role: Some(params.role.clone()),
                warehouse: Some(params.warehouse.clone()),
                database: Some(params.database.clone()),
                schema: Some(params.schema.clone()),
                timeout: Some(timeout),
            },
        )
        .map_err(|e| DatabaseError::Connection(format!("Invalid Snowflake configuration: {}", e)))?;

        let session = client.create_session().await.map_err(|e| {
            DatabaseError::Connection(format!(
                "Failed to connect to Snowflake account {}: {}",
                params.account, e
            ))
        })?;

        Ok(Self { session })
    }
}

fn trim_statement(sql: &str) -> &str {
    sql.trim().trim_end_matches(';').trim_end()
}

#[async_trait::async_trait]
impl DatabaseConnection for SnowflakeConnection {
    fn backend_kind(&self) -> BackendKind {
        BackendKind::Snowflake
    }

    async fn execute(&mut self, sql: &str) -> Result<Option<ResultSet>, DatabaseError> {
        let rows = self
            .session
            .query(trim_statement(sql))
            .await
            .map_err(|e| DatabaseError::Execution(e.to_string()))?;

        // Column metadata is carried by each row; an empty result has none
        let names: Vec<String> = match rows.first() {
            Some(first) => first
                .column_types()
                .into_iter()
                .map(|col| col.name().to_string())
                .collect(),
            None => return Ok(Some(ResultSet::default())),
        };

        let values: Vec<Vec<Value>> = rows
            .into_iter()
            .map(|row| {
                names
                    .iter()
                    .map(|name| match row.get::<Value>(name) {
                        Ok(v) => v,
                        Err(_) => match row.get::<String>(name) {
                            Ok(s) => Value::String(s),
                            Err(_) => Value::Null,
                        },
                    })
                    .collect()
            })
            .collect();

        Ok(Some(ResultSet::from_positional(names, Vec::new(), values)))
    }

    async fn close(self: Box<Self>) -> Result<(), DatabaseError> {
        // The session token expires server-side once the session is dropped
        drop(self.session);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_semicolon_is_removed() {
        assert_eq!(trim_statement("SELECT 1;"), "SELECT 1");
        assert_eq!(trim_statement("  USE ROLE ANALYST ;  "), "USE ROLE ANALYST");
        assert_eq!(trim_statement("SELECT ';'"), "SELECT ';'");
    }
}
