//! UPDATE compiler.
//!
//! The multi-table forms differ per dialect:
//!
//! - MySQL: `UPDATE t a [JOIN u b ON ...]* SET ... [WHERE ...]`
//! - PostgreSQL, SQL Server: `UPDATE t a SET ... [FROM u b, ...] [WHERE ...]`
//! - Oracle: `UPDATE t SET ... [WHERE ...]`
//!
//! A clause the dialect cannot express fails when it is added.

use super::base::{Conjunction, SqlVisitor};
use super::table::JoinType;
use crate::command::Command;
use crate::error::{OrmError, OrmResult};
use crate::expr::Expr;
use crate::lambda::Lambda;
use crate::mapping::{EntityMapProvider, EntityType, MemberMap};
use crate::provider::OrmProvider;
use crate::value::Value;
use std::sync::Arc;

/// One rendered `SET` assignment.
#[derive(Debug, Clone)]
pub struct SetField {
    pub member: Arc<MemberMap>,
    pub value: String,
}

pub struct UpdateVisitor {
    base: SqlVisitor,
    set_fields: Vec<SetField>,
    where_clause: Conjunction,
}

impl UpdateVisitor {
    pub fn new(
        provider: Arc<dyn OrmProvider>,
        maps: Arc<dyn EntityMapProvider>,
        entity: EntityType,
    ) -> Self {
        let mut base = SqlVisitor::new(provider, maps);
        base.add_table(entity, None);
        Self {
            base,
            set_fields: Vec::new(),
            where_clause: Conjunction::default(),
        }
    }

    fn ensure_tables_open(&self, clause: &str) -> OrmResult<()> {
        if self.set_fields.is_empty() && self.where_clause.is_empty() {
            Ok(())
        } else {
            Err(OrmError::invalid_argument(format!(
                "{clause} must be added before set/where"
            )))
        }
    }

    /// `UPDATE t SET ... FROM u, v WHERE ...`
    pub fn from(&mut self, entities: &[EntityType]) -> OrmResult<()> {
        self.base.provider.check_update_from()?;
        self.ensure_tables_open("FROM")?;
        if entities.is_empty() {
            return Err(OrmError::invalid_argument("FROM needs at least one table"));
        }
        for entity in entities {
            self.base.add_table(*entity, None);
        }
        self.base.is_need_alias = true;
        Ok(())
    }

    /// `UPDATE t JOIN u ON ... SET ...`
    pub fn join(&mut self, join_type: JoinType, entity: EntityType, on: &Lambda) -> OrmResult<()> {
        self.base.provider.check_update_join()?;
        self.ensure_tables_open("JOIN")?;
        self.base.is_need_alias = true;
        let index = self.base.add_table(entity, Some(join_type));
        let (on_sql, _) = self.base.predicate(on)?;
        self.base.tables[index].on_sql = Some(on_sql);
        Ok(())
    }

    /// Assign every member of a projection body.
    pub fn set(&mut self, lambda: &Lambda) -> OrmResult<()> {
        if lambda.uses_query_builder() {
            return Err(OrmError::invalid_argument(
                "sub-query assignments go through set_from_query",
            ));
        }
        self.set_projection(lambda)
    }

    /// Like [`set`](Self::set), allowing correlated `(SELECT ...)` values.
    pub fn set_from_query(&mut self, lambda: &Lambda) -> OrmResult<()> {
        if !lambda.uses_query_builder() {
            return Err(OrmError::invalid_argument(
                "set_from_query expects a lambda with a query-builder parameter",
            ));
        }
        self.set_projection(lambda)
    }

    fn set_projection(&mut self, lambda: &Lambda) -> OrmResult<()> {
        let Expr::Projection { fields, .. } = lambda.body() else {
            return Err(OrmError::unsupported(format!(
                "set expects a projection of member assignments, found a {}",
                lambda.body().kind_name()
            )));
        };
        self.base.init_table_alias(lambda)?;
        for (name, expr) in fields {
            let member = self.target_member(name)?;
            let value = self.base.value_sql(expr, Some(member.as_ref()))?;
            self.set_fields.push(SetField { member, value });
        }
        Ok(())
    }

    /// Assign a constant to the member `selector` picks.
    pub fn set_field(&mut self, selector: &Lambda, value: Value) -> OrmResult<()> {
        let member = self.selector_member(selector)?;
        let value = if value.is_null() {
            "NULL".to_string()
        } else {
            self.base.add_parameter(Some(member.as_ref()), value)
        };
        self.set_fields.push(SetField { member, value });
        Ok(())
    }

    /// Assign an expression to the member `selector` picks.
    pub fn set_expr(&mut self, selector: &Lambda, value: &Lambda) -> OrmResult<()> {
        let member = self.selector_member(selector)?;
        self.base.init_table_alias(value)?;
        let value = self.base.value_sql(value.body(), Some(member.as_ref()))?;
        self.set_fields.push(SetField { member, value });
        Ok(())
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

    fn target_member(&mut self, name: &str) -> OrmResult<Arc<MemberMap>> {
        let map = self.base.table_map(0)?;
        let member = Arc::clone(map.member_or_err(name)?);
        if !member.is_column() {
            return Err(OrmError::unsupported(format!(
                "member `{name}` of {} has no column to assign",
                map.type_name
            )));
        }
        Ok(member)
    }

    fn selector_member(&mut self, selector: &Lambda) -> OrmResult<Arc<MemberMap>> {
        let Expr::Member { object, member } = selector.body() else {
            return Err(OrmError::unsupported(format!(
                "a set target must be a member access, found a {}",
                selector.body().kind_name()
            )));
        };
        self.base.init_table_alias(selector)?;
        match object.as_ref() {
            Expr::Parameter(id) if self.base.bound_table(*id) == Some(0) => {
                self.target_member(member)
            }
            _ => Err(OrmError::unsupported(format!(
                "set target `{member}` is not a member of the updated table"
            ))),
        }
    }

    fn set_target(&self, member: &MemberMap) -> String {
        if self.base.tables.len() > 1 && self.base.provider.prefix_set_fields_with_alias() {
            self.base.column_sql(0, &member.field_name)
        } else {
            self.base.provider.field_name(&member.field_name)
        }
    }

    pub fn set_fields(&self) -> &[SetField] {
        &self.set_fields
    }

    pub fn build_sql(mut self) -> OrmResult<Command> {
        if self.set_fields.is_empty() {
            return Err(OrmError::invalid_argument(
                "UPDATE requires at least one SET assignment",
            ));
        }
        let mut sql = format!("UPDATE {}", self.base.table_sql(0)?);
        let mut from = Vec::new();
        for index in 1..self.base.tables.len() {
            let table = self.base.table_sql(index)?;
            let segment = &self.base.tables[index];
            match (segment.join_type, &segment.on_sql) {
                (Some(join_type), Some(on)) => {
                    sql.push_str(&format!(" {} {table} ON {on}", join_type.sql()));
                }
                _ => from.push(table),
            }
        }
        let assignments: Vec<String> = self
            .set_fields
            .iter()
            .map(|f| format!("{}={}", self.set_target(&f.member), f.value))
            .collect();
        sql.push_str(" SET ");
        sql.push_str(&assignments.join(","));
        if !from.is_empty() {
            sql.push_str(" FROM ");
            sql.push_str(&from.join(","));
        }
        if let Some(predicate) = self.where_clause.render() {
            sql.push_str(" WHERE ");
            sql.push_str(&predicate);
        }
        Ok(Command::new(sql, self.base.parameters))
    }
}
