use super::{DatabaseType, OrmProvider, ProviderBase, ProviderId, limit_offset};
use crate::mapping::MemberMap;

/// PostgreSQL.
#[derive(Debug)]
pub struct PostgreSqlProvider {
    base: ProviderBase,
}

impl PostgreSqlProvider {
    pub fn new() -> Self {
        Self {
            base: ProviderBase::new(),
        }
    }

    /// Quote identifiers with double quotes.
    pub fn quoted(mut self) -> Self {
        self.base.quote = true;
        self
    }
}

impl Default for PostgreSqlProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl OrmProvider for PostgreSqlProvider {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::PostgreSql
    }

    fn provider_id(&self) -> ProviderId {
        self.base.id
    }

    fn parameter_prefix(&self) -> &str {
        "@"
    }

    fn table_name(&self, name: &str) -> String {
        self.base.quote_with(name, '"', '"')
    }

    fn field_name(&self, name: &str) -> String {
        self.base.quote_with(name, '"', '"')
    }

    fn member_access_sql_formatter(&self, member: &str) -> Option<String> {
        match member {
            "now" => Some("NOW()".into()),
            "utc_now" => Some("(NOW() AT TIME ZONE 'UTC')".into()),
            "today" => Some("CURRENT_DATE".into()),
            _ => None,
        }
    }

    fn select_identity_sql(&self, member: &MemberMap) -> String {
        format!(" RETURNING {}", self.field_name(&member.field_name))
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        if value { "TRUE" } else { "FALSE" }
    }

    fn concat(&self, parts: &[String]) -> String {
        parts.join("||")
    }

    fn paging_sql(&self, sql: &mut String, skip: Option<u64>, take: Option<u64>, _has_order_by: bool) {
        match (skip, take) {
            (Some(skip), None) => sql.push_str(&format!(" OFFSET {skip}")),
            _ => limit_offset(sql, skip, take, ""),
        }
    }

    fn supports_update_join(&self) -> bool {
        false
    }

    fn supports_update_from(&self) -> bool {
        true
    }

    fn prefix_set_fields_with_alias(&self) -> bool {
        false
    }
}
