//! Commands and the command-initializer cache.
//!
//! The fixed-shape paths (insert, delete by key, get by key, update by object
//! and raw SQL) skip the expression visitors entirely: their SQL depends only
//! on the entity map and the provider, so it is compiled once per
//! [`CacheKey`] into a [`TypedInitializer`] that binds parameters straight
//! from a value's field accessors.

mod cache;
mod initializer;

pub use cache::{CacheStats, CommandCache};
pub use initializer::{TypedInitializer, init_batch_from_maps, init_from_map};
pub(crate) use initializer::{key_parameters, select_list};

use crate::provider::ProviderId;
use crate::value::Value;
use std::any::TypeId;
use std::fmt;

/// One bound parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct DbParameter {
    pub name: String,
    pub value: Value,
    pub native_type: Option<String>,
}

/// SQL text plus its bound parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Command {
    pub sql: String,
    pub parameters: Vec<DbParameter>,
}

impl Command {
    pub fn new(sql: impl Into<String>, parameters: Vec<DbParameter>) -> Self {
        Self {
            sql: sql.into(),
            parameters,
        }
    }

    /// Value bound under `name`.
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }

    /// The `;`-separated statements of the command. A `;` inside a quoted
    /// literal or identifier does not separate statements.
    pub fn statements(&self) -> impl Iterator<Item = &str> {
        let mut statements = Vec::new();
        let mut quote = None;
        let mut start = 0;
        for (i, c) in self.sql.char_indices() {
            match (quote, c) {
                (Some(open), _) if c == open => quote = None,
                (Some(_), _) => {}
                (None, '\'' | '"' | '`') => quote = Some(c),
                (None, ';') => {
                    statements.push(&self.sql[start..i]);
                    start = i + 1;
                }
                _ => {}
            }
        }
        statements.push(&self.sql[start..]);
        statements.into_iter().map(str::trim).filter(|s| !s.is_empty())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Which fixed-shape command an initializer builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Insert,
    InsertBatch,
    Delete,
    DeleteBatch,
    Get,
    UpdateBy,
    RawSql,
}

impl CommandKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Insert => "insert",
            CommandKind::InsertBatch => "insert_batch",
            CommandKind::Delete => "delete",
            CommandKind::DeleteBatch => "delete_batch",
            CommandKind::Get => "get",
            CommandKind::UpdateBy => "update_by",
            CommandKind::RawSql => "raw_sql",
        }
    }

    pub fn is_batch(self) -> bool {
        matches!(self, CommandKind::InsertBatch | CommandKind::DeleteBatch)
    }
}

/// Identity of one compiled initializer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: CommandKind,
    pub provider: ProviderId,
    pub sql: Option<String>,
    pub entity: TypeId,
    pub parameter: TypeId,
}

impl CacheKey {
    pub fn new(kind: CommandKind, provider: ProviderId, entity: TypeId, parameter: TypeId) -> Self {
        Self {
            kind,
            provider,
            sql: None,
            entity,
            parameter,
        }
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }
}
