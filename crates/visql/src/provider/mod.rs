//! Dialect providers.
//!
//! An [`OrmProvider`] owns every decision that differs between databases:
//! identifier quoting, parameter prefix, identity retrieval, paging syntax and
//! which multi-table UPDATE forms the dialect can express. Visitors only ever
//! ask the provider; they never switch on [`DatabaseType`] themselves.

mod mysql;
mod oracle;
mod postgresql;
mod sqlserver;

pub use mysql::MySqlProvider;
pub use oracle::OracleProvider;
pub use postgresql::PostgreSqlProvider;
pub use sqlserver::SqlServerProvider;

use crate::command::DbParameter;
use crate::error::{OrmError, OrmResult};
use crate::mapping::MemberMap;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// The supported database dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseType {
    MySql,
    PostgreSql,
    SqlServer,
    Oracle,
}

/// Identity of one provider instance, part of every command cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProviderId(u64);

impl ProviderId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ProviderId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Dialect-specific SQL rendering and capabilities.
pub trait OrmProvider: Send + Sync {
    fn database_type(&self) -> DatabaseType;

    fn provider_id(&self) -> ProviderId;

    /// Prefix of named parameters (`@`, `:`).
    fn parameter_prefix(&self) -> &str;

    /// Render a table name, quoting it when the provider is configured to.
    fn table_name(&self, name: &str) -> String;

    /// Render a column name, quoting it when the provider is configured to.
    fn field_name(&self, name: &str) -> String;

    fn create_parameter(&self, name: String, value: Value, native_type: Option<&str>) -> DbParameter {
        DbParameter {
            name,
            value,
            native_type: native_type.map(str::to_string),
        }
    }

    /// SQL for a well-known static member (`now`, `utc_now`, `today`), if the
    /// dialect has one.
    fn member_access_sql_formatter(&self, member: &str) -> Option<String>;

    /// Suffix appended to an INSERT to read back the generated key.
    fn select_identity_sql(&self, member: &MemberMap) -> String;

    fn boolean_literal(&self, value: bool) -> &'static str;

    fn concat(&self, parts: &[String]) -> String;

    fn length_function(&self) -> &'static str {
        "LENGTH"
    }

    /// Append the dialect's paging clause to a complete SELECT.
    fn paging_sql(&self, sql: &mut String, skip: Option<u64>, take: Option<u64>, has_order_by: bool);

    /// `UPDATE t JOIN u ON ... SET ...`
    fn supports_update_join(&self) -> bool;

    /// `UPDATE t SET ... FROM u`
    fn supports_update_from(&self) -> bool;

    /// Whether SET targets carry the table alias in multi-table updates.
    fn prefix_set_fields_with_alias(&self) -> bool;

    fn check_update_join(&self) -> OrmResult<()> {
        if self.supports_update_join() {
            Ok(())
        } else {
            Err(OrmError::unsupported_dialect("UPDATE ... JOIN", self.database_type()))
        }
    }

    fn check_update_from(&self) -> OrmResult<()> {
        if self.supports_update_from() {
            Ok(())
        } else {
            Err(OrmError::unsupported_dialect("UPDATE ... FROM", self.database_type()))
        }
    }
}

/// Settings shared by the bundled providers.
#[derive(Debug)]
struct ProviderBase {
    id: ProviderId,
    quote: bool,
}

impl ProviderBase {
    fn new() -> Self {
        Self {
            id: ProviderId::next(),
            quote: false,
        }
    }

    fn quote_with(&self, name: &str, open: char, close: char) -> String {
        if !self.quote {
            return name.to_string();
        }
        name.split('.')
            .map(|part| format!("{open}{part}{close}"))
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// LIMIT/OFFSET paging shared by MySQL and PostgreSQL.
fn limit_offset(sql: &mut String, skip: Option<u64>, take: Option<u64>, unbounded: &str) {
    match (skip, take) {
        (Some(skip), Some(take)) => sql.push_str(&format!(" LIMIT {take} OFFSET {skip}")),
        (None, Some(take)) => sql.push_str(&format!(" LIMIT {take}")),
        (Some(skip), None) => sql.push_str(&format!("{unbounded} OFFSET {skip}")),
        (None, None) => {}
    }
}

/// ANSI OFFSET/FETCH paging shared by SQL Server and Oracle.
fn offset_fetch(sql: &mut String, skip: Option<u64>, take: Option<u64>) {
    if skip.is_none() && take.is_none() {
        return;
    }
    sql.push_str(&format!(" OFFSET {} ROWS", skip.unwrap_or(0)));
    if let Some(take) = take {
        sql.push_str(&format!(" FETCH NEXT {take} ROWS ONLY"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn providers() -> Vec<Box<dyn OrmProvider>> {
        vec![
            Box::new(MySqlProvider::new()),
            Box::new(PostgreSqlProvider::new()),
            Box::new(SqlServerProvider::new()),
            Box::new(OracleProvider::new()),
        ]
    }

    #[test]
    fn update_capability_matrix() {
        let matrix: Vec<_> = providers()
            .iter()
            .map(|p| {
                (
                    p.database_type(),
                    p.supports_update_join(),
                    p.supports_update_from(),
                    p.prefix_set_fields_with_alias(),
                )
            })
            .collect();
        assert_eq!(
            matrix,
            vec![
                (DatabaseType::MySql, true, false, true),
                (DatabaseType::PostgreSql, false, true, false),
                (DatabaseType::SqlServer, false, true, false),
                (DatabaseType::Oracle, false, false, true),
            ]
        );
    }

    #[test]
    fn capability_checks_name_the_operation() {
        let err = PostgreSqlProvider::new().check_update_join().unwrap_err();
        assert!(matches!(
            err,
            OrmError::UnsupportedDialect {
                operation: "UPDATE ... JOIN",
                database: DatabaseType::PostgreSql
            }
        ));
        assert!(MySqlProvider::new().check_update_from().is_err());
        assert!(OracleProvider::new().check_update_from().is_err());
        assert!(OracleProvider::new().check_update_join().is_err());
    }

    #[test]
    fn provider_ids_are_distinct() {
        assert_ne!(
            MySqlProvider::new().provider_id(),
            MySqlProvider::new().provider_id()
        );
    }

    #[test]
    fn quoting_is_opt_in() {
        assert_eq!(MySqlProvider::new().table_name("order"), "order");
        assert_eq!(MySqlProvider::new().quoted().table_name("order"), "`order`");
        assert_eq!(PostgreSqlProvider::new().quoted().field_name("a.id"), "\"a\".\"id\"");
        assert_eq!(SqlServerProvider::new().quoted().field_name("id"), "[id]");
    }

    #[test]
    fn paging_per_dialect() {
        let mut sql = String::from("SELECT 1");
        MySqlProvider::new().paging_sql(&mut sql, Some(20), Some(10), false);
        assert_eq!(sql, "SELECT 1 LIMIT 10 OFFSET 20");

        let mut sql = String::from("SELECT 1");
        SqlServerProvider::new().paging_sql(&mut sql, Some(20), Some(10), false);
        assert_eq!(sql, "SELECT 1 ORDER BY (SELECT NULL) OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY");

        let mut sql = String::from("SELECT 1 ORDER BY a.id");
        OracleProvider::new().paging_sql(&mut sql, None, Some(5), true);
        assert_eq!(sql, "SELECT 1 ORDER BY a.id OFFSET 0 ROWS FETCH NEXT 5 ROWS ONLY");
    }
}
