//! Database connection abstraction.
//!
//! Visitors and facades only ever produce [`Command`]s; a [`Connection`] runs
//! them. The bundled adapter is [`PgConnection`](crate::PgConnection) (feature
//! `postgres`); tests use in-memory implementations.

use crate::command::Command;
use crate::config::OrmConfig;
use crate::error::{OrmError, OrmResult};
use crate::row::Row;
use std::future::Future;

/// Executes commands against a database.
pub trait Connection: Send + Sync {
    /// Execute a command and return the number of affected rows.
    fn execute(&self, command: &Command) -> impl Future<Output = OrmResult<u64>> + Send;

    /// Execute a command and return the rows of its (last) result set.
    fn query(&self, command: &Command) -> impl Future<Output = OrmResult<Vec<Row>>> + Send;

    /// Execute a `;`-joined command and return one row set per statement.
    ///
    /// The default implementation reports the capability as missing; callers
    /// fall back to running the statements one by one.
    fn query_multi(
        &self,
        command: &Command,
    ) -> impl Future<Output = OrmResult<Vec<Vec<Row>>>> + Send {
        let _ = command;
        async {
            Err(OrmError::NotSupported(
                "multiple result sets in one round trip".into(),
            ))
        }
    }
}

/// Cut `sql` to at most `max_bytes`, on a char boundary.
pub(crate) fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}

fn display_sql(config: &OrmConfig, sql: &str) -> String {
    match config.max_sql_log_length {
        Some(max) if sql.len() > max => format!("{}...", truncate_sql_bytes(sql, max)),
        _ => sql.to_string(),
    }
}

/// Emit the pre-execution `visql.sql` event.
pub(crate) fn log_command(config: &OrmConfig, operation: &str, command: &Command) {
    if !config.log_sql {
        return;
    }
    tracing::debug!(
        target: "visql.sql",
        operation,
        param_count = command.parameters.len(),
        sql = %display_sql(config, &command.sql),
        "executing"
    );
}

pub(crate) async fn execute_logged<C: Connection>(
    conn: &C,
    config: &OrmConfig,
    operation: &str,
    command: &Command,
) -> OrmResult<u64> {
    log_command(config, operation, command);
    conn.execute(command).await
}

pub(crate) async fn query_logged<C: Connection>(
    conn: &C,
    config: &OrmConfig,
    operation: &str,
    command: &Command,
) -> OrmResult<Vec<Row>> {
    log_command(config, operation, command);
    conn.query(command).await
}

/// Run a multi-statement command, one row set per statement.
///
/// Uses [`Connection::query_multi`] when the connection supports it, else
/// runs each statement separately with the full parameter list.
pub(crate) async fn query_multi_logged<C: Connection>(
    conn: &C,
    config: &OrmConfig,
    operation: &str,
    command: &Command,
) -> OrmResult<Vec<Vec<Row>>> {
    log_command(config, operation, command);
    match conn.query_multi(command).await {
        Err(OrmError::NotSupported(_)) => {}
        other => return other,
    }
    let mut sets = Vec::new();
    for statement in command.statements() {
        let single = Command::new(statement, command.parameters.clone());
        sets.push(conn.query(&single).await?);
    }
    Ok(sets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::RecordingConnection;

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_sql_bytes("SELECT 1", 100), "SELECT 1");
        assert_eq!(truncate_sql_bytes("héllo", 2), "h");
    }

    #[test]
    fn display_sql_appends_ellipsis() {
        let config = OrmConfig::new().with_max_sql_log_length(6);
        assert_eq!(display_sql(&config, "SELECT 1"), "SELECT...");
        assert_eq!(display_sql(&config.no_truncate(), "SELECT 1"), "SELECT 1");
    }

    #[tokio::test]
    async fn statement_fallback_keeps_quoted_semicolons() {
        let conn = RecordingConnection::new();
        let command = Command::new("SELECT COUNT(*) FROM t WHERE note=';';SELECT id FROM t", vec![]);
        let sets = query_multi_logged(&conn, &OrmConfig::default(), "page", &command)
            .await
            .unwrap();
        assert_eq!(sets.len(), 2);
        assert_eq!(conn.sql(), ["SELECT COUNT(*) FROM t WHERE note=';'", "SELECT id FROM t"]);
    }
}
