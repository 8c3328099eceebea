use super::{DatabaseType, OrmProvider, ProviderBase, ProviderId, limit_offset};
use crate::mapping::MemberMap;

/// MySQL / MariaDB.
#[derive(Debug)]
pub struct MySqlProvider {
    base: ProviderBase,
}

impl MySqlProvider {
    pub fn new() -> Self {
        Self {
            base: ProviderBase::new(),
        }
    }

    /// Quote identifiers with backticks.
    pub fn quoted(mut self) -> Self {
        self.base.quote = true;
        self
    }
}

impl Default for MySqlProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl OrmProvider for MySqlProvider {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::MySql
    }

    fn provider_id(&self) -> ProviderId {
        self.base.id
    }

    fn parameter_prefix(&self) -> &str {
        "@"
    }

    fn table_name(&self, name: &str) -> String {
        self.base.quote_with(name, '`', '`')
    }

    fn field_name(&self, name: &str) -> String {
        self.base.quote_with(name, '`', '`')
    }

    fn member_access_sql_formatter(&self, member: &str) -> Option<String> {
        match member {
            "now" => Some("NOW()".into()),
            "utc_now" => Some("UTC_TIMESTAMP()".into()),
            "today" => Some("CURDATE()".into()),
            _ => None,
        }
    }

    fn select_identity_sql(&self, _member: &MemberMap) -> String {
        ";SELECT LAST_INSERT_ID()".into()
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        if value { "1" } else { "0" }
    }

    fn concat(&self, parts: &[String]) -> String {
        format!("CONCAT({})", parts.join(","))
    }

    fn length_function(&self) -> &'static str {
        "CHAR_LENGTH"
    }

    fn paging_sql(&self, sql: &mut String, skip: Option<u64>, take: Option<u64>, _has_order_by: bool) {
        limit_offset(sql, skip, take, " LIMIT 18446744073709551615");
    }

    fn supports_update_join(&self) -> bool {
        true
    }

    fn supports_update_from(&self) -> bool {
        false
    }

    fn prefix_set_fields_with_alias(&self) -> bool {
        true
    }
}
