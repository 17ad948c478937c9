// Dialect adapter: per-backend session setup
use crate::config::BackendsConfig;
use crate::models::{BackendKind, SetupStatement};
use crate::services::database::{ConnectionHandle, DatabaseError};

/// Runs the setup statements of a backend's profile on a fresh session.
///
/// The validator and the executor both go through `prepare`, so a statement
/// is always validated under the same session state it later runs under.
pub struct DialectAdapter;

impl DialectAdapter {
    /// Render the setup statements for `kind` without running them
    pub fn setup_statements(kind: BackendKind, backends: &BackendsConfig) -> Result<Vec<String>, DatabaseError> {
        kind.profile()
            .setup
            .iter()
            .map(|statement| Self::render(kind, statement, backends))
            .collect()
    }

    /// Apply session setup in order. Stops at the first failing statement.
    pub async fn prepare(
        kind: BackendKind,
        handle: &mut ConnectionHandle,
        backends: &BackendsConfig,
    ) -> Result<(), DatabaseError> {
        for statement in Self::setup_statements(kind, backends)? {
            tracing::debug!("Applying {} session setup: {}", kind, statement);
            handle
                .execute(&statement)
                .await
                .map_err(|e| DatabaseError::DialectSetup {
                    message: match e {
                        DatabaseError::Execution(msg) | DatabaseError::Connection(msg) => msg,
                        other => other.to_string(),
                    },
                    statement: statement.clone(),
                })?;
        }
        Ok(())
    }

    fn render(kind: BackendKind, statement: &SetupStatement, backends: &BackendsConfig) -> Result<String, DatabaseError> {
        let value = backends
            .setting(kind, statement.setting)
            .ok_or_else(|| DatabaseError::DialectSetup {
                statement: statement.template.to_string(),
                message: format!(
                    "missing setting backends.{}.{}",
                    kind.as_str(),
                    statement.setting.key()
                ),
            })?;

        if !is_plain_identifier(&value) {
            return Err(DatabaseError::DialectSetup {
                statement: statement.template.to_string(),
                message: format!(
                    "setting backends.{}.{} is not a plain identifier",
                    kind.as_str(),
                    statement.setting.key()
                ),
            });
        }

        Ok(statement.render(&value))
    }
}

/// Letters, digits, `_`, `$` and `.` only
fn is_plain_identifier(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.'))
}
