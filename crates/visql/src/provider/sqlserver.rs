use super::{DatabaseType, OrmProvider, ProviderBase, ProviderId, offset_fetch};
use crate::mapping::MemberMap;

/// Microsoft SQL Server.
#[derive(Debug)]
pub struct SqlServerProvider {
    base: ProviderBase,
}

impl SqlServerProvider {
    pub fn new() -> Self {
        Self {
            base: ProviderBase::new(),
        }
    }

    /// Quote identifiers with brackets.
    pub fn quoted(mut self) -> Self {
        self.base.quote = true;
        self
    }
}

impl Default for SqlServerProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl OrmProvider for SqlServerProvider {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::SqlServer
    }

    fn provider_id(&self) -> ProviderId {
        self.base.id
    }

    fn parameter_prefix(&self) -> &str {
        "@"
    }

    fn table_name(&self, name: &str) -> String {
        self.base.quote_with(name, '[', ']')
    }

    fn field_name(&self, name: &str) -> String {
        self.base.quote_with(name, '[', ']')
    }

    fn member_access_sql_formatter(&self, member: &str) -> Option<String> {
        match member {
            "now" => Some("GETDATE()".into()),
            "utc_now" => Some("GETUTCDATE()".into()),
            "today" => Some("CONVERT(DATE,GETDATE())".into()),
            _ => None,
        }
    }

    fn select_identity_sql(&self, _member: &MemberMap) -> String {
        ";SELECT SCOPE_IDENTITY()".into()
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        if value { "1" } else { "0" }
    }

    fn concat(&self, parts: &[String]) -> String {
        parts.join("+")
    }

    fn length_function(&self) -> &'static str {
        "LEN"
    }

    // OFFSET/FETCH is only valid after ORDER BY.
    fn paging_sql(&self, sql: &mut String, skip: Option<u64>, take: Option<u64>, has_order_by: bool) {
        if (skip.is_some() || take.is_some()) && !has_order_by {
            sql.push_str(" ORDER BY (SELECT NULL)");
        }
        offset_fetch(sql, skip, take);
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
