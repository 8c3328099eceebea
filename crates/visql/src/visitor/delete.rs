//! DELETE compiler.

use super::base::{Conjunction, SqlVisitor};
use crate::command::Command;
use crate::error::OrmResult;
use crate::lambda::Lambda;
use crate::mapping::{EntityMapProvider, EntityType};
use crate::provider::OrmProvider;
use std::sync::Arc;

/// Compiles `DELETE FROM <table> [WHERE ...]`.
///
/// Single table, never aliased.
pub struct DeleteVisitor {
    base: SqlVisitor,
    where_clause: Conjunction,
}

impl DeleteVisitor {
    pub fn new(
        provider: Arc<dyn OrmProvider>,
        maps: Arc<dyn EntityMapProvider>,
        entity: EntityType,
    ) -> Self {
        let mut base = SqlVisitor::new(provider, maps);
        base.add_table(entity, None);
        Self {
            base,
            where_clause: Conjunction::default(),
        }
    }

    /// Add a predicate; repeated calls are AND-ed.
    pub fn where_(&mut self, lambda: &Lambda) -> OrmResult<()> {
        let predicate = self.base.predicate(lambda)?;
        self.where_clause.push(predicate);
        Ok(())
    }

    pub fn and(&mut self, lambda: &Lambda) -> OrmResult<()> {
        self.where_(lambda)
    }

    pub fn build_sql(mut self) -> OrmResult<Command> {
        let mut sql = format!("DELETE FROM {}", self.base.table_sql(0)?);
        if let Some(predicate) = self.where_clause.render() {
            sql.push_str(" WHERE ");
            sql.push_str(&predicate);
        }
        Ok(Command::new(sql, self.base.parameters))
    }
}
