use super::{DatabaseType, OrmProvider, ProviderBase, ProviderId, offset_fetch};
use crate::mapping::MemberMap;

/// Oracle 12c and later.
#[derive(Debug)]
pub struct OracleProvider {
    base: ProviderBase,
}

impl OracleProvider {
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

impl Default for OracleProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl OrmProvider for OracleProvider {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Oracle
    }

    fn provider_id(&self) -> ProviderId {
        self.base.id
    }

    fn parameter_prefix(&self) -> &str {
        ":"
    }

    fn table_name(&self, name: &str) -> String {
        self.base.quote_with(name, '"', '"')
    }

    fn field_name(&self, name: &str) -> String {
        self.base.quote_with(name, '"', '"')
    }

    fn member_access_sql_formatter(&self, member: &str) -> Option<String> {
        match member {
            "now" => Some("SYSDATE".into()),
            "utc_now" => Some("SYS_EXTRACT_UTC(SYSTIMESTAMP)".into()),
            "today" => Some("TRUNC(SYSDATE)".into()),
            _ => None,
        }
    }

    fn select_identity_sql(&self, member: &MemberMap) -> String {
        format!(
            " RETURNING {} INTO {}{}",
            self.field_name(&member.field_name),
            self.parameter_prefix(),
            member.member_name
        )
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        if value { "1" } else { "0" }
    }

    fn concat(&self, parts: &[String]) -> String {
        parts.join("||")
    }

    fn paging_sql(&self, sql: &mut String, skip: Option<u64>, take: Option<u64>, _has_order_by: bool) {
        offset_fetch(sql, skip, take);
    }

    fn supports_update_join(&self) -> bool {
        false
    }

    fn supports_update_from(&self) -> bool {
        false
    }

    fn prefix_set_fields_with_alias(&self) -> bool {
        true
    }
}
