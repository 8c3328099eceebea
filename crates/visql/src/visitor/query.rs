//! SELECT compiler.

use super::base::{Conjunction, SqlVisitor};
use super::segment::SqlSegment;
use super::table::JoinType;
use crate::command::{Command, DbParameter};
use crate::error::{OrmError, OrmResult};
use crate::expr::{Expr, ParamId};
use crate::lambda::Lambda;
use crate::mapping::{EntityMapProvider, EntityType, MemberMap, Navigation};
use crate::provider::OrmProvider;
use crate::row::Row;
use crate::value::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// A recorded query, replayed by a [`QueryVisitor`] when it is compiled.
///
/// Sub-queries are kept in this form inside expression trees so that they
/// compile in the scope of the statement that contains them.
#[derive(Debug, Clone)]
pub struct QueryDef {
    entity: EntityType,
    origin: Option<ParamId>,
    ops: Vec<QueryOp>,
}

/// One recorded query operation.
#[derive(Debug, Clone)]
pub enum QueryOp {
    From(EntityType),
    Join {
        join_type: JoinType,
        entity: EntityType,
        on: Lambda,
    },
    Where(Lambda),
    And(Lambda),
    GroupBy(Lambda),
    Having(Lambda),
    OrderBy {
        lambda: Lambda,
        descending: bool,
    },
    Select(Lambda),
    Distinct,
    Skip(u64),
    Take(u64),
    Union {
        all: bool,
        query: QueryDef,
    },
}

impl QueryDef {
    pub fn new(entity: EntityType) -> Self {
        Self {
            entity,
            origin: None,
            ops: Vec::new(),
        }
    }

    /// Record the query-builder parameter this query was started from.
    pub(crate) fn with_origin(mut self, origin: ParamId) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn push(&mut self, op: QueryOp) {
        self.ops.push(op);
    }

    pub fn entity(&self) -> EntityType {
        self.entity
    }

    pub fn ops(&self) -> &[QueryOp] {
        &self.ops
    }

    pub(crate) fn collect_params(&self, out: &mut HashSet<ParamId>) {
        if let Some(origin) = self.origin {
            out.insert(origin);
        }
        for op in &self.ops {
            match op {
                QueryOp::Join { on: lambda, .. }
                | QueryOp::Where(lambda)
                | QueryOp::And(lambda)
                | QueryOp::GroupBy(lambda)
                | QueryOp::Having(lambda)
                | QueryOp::OrderBy { lambda, .. }
                | QueryOp::Select(lambda) => lambda.body().collect_params(out),
                QueryOp::Union { query, .. } => query.collect_params(out),
                QueryOp::From(_) | QueryOp::Distinct | QueryOp::Skip(_) | QueryOp::Take(_) => {}
            }
        }
    }
}

/// Maps one select-list position to the label rows are decoded by.
#[derive(Debug, Clone)]
pub struct ReaderField {
    pub index: usize,
    /// Member name, or the projected name for computed columns.
    pub label: String,
    pub member: Option<Arc<MemberMap>>,
}

#[derive(Debug, Clone)]
struct IncludePlan {
    member: String,
    navigation: Navigation,
    parent_key: Arc<MemberMap>,
}

#[derive(Debug, Default)]
struct SelectList {
    columns: Vec<String>,
    fields: Vec<ReaderField>,
}

impl SelectList {
    fn push(&mut self, column: String, label: String, member: Option<Arc<MemberMap>>) {
        self.fields.push(ReaderField {
            index: self.fields.len(),
            label,
            member,
        });
        self.columns.push(column);
    }
}

/// Compiles a SELECT from chained calls.
///
/// Every table is aliased (`a`, `b`, ...) in declaration order. The visitor
/// is consumed by [`build_sql`](Self::build_sql).
pub struct QueryVisitor {
    base: SqlVisitor,
    where_clause: Conjunction,
    group_by: Vec<String>,
    having: Conjunction,
    order_by: Vec<String>,
    select: Option<SelectList>,
    distinct: bool,
    skip: Option<u64>,
    take: Option<u64>,
    /// Row offset and page size.
    page: Option<(u64, u64)>,
    unions: Vec<String>,
    includes: Vec<IncludePlan>,
}

impl QueryVisitor {
    pub fn new(
        provider: Arc<dyn OrmProvider>,
        maps: Arc<dyn EntityMapProvider>,
        entity: EntityType,
    ) -> Self {
        let mut base = SqlVisitor::new(provider, maps);
        base.is_need_alias = true;
        Self::with_base(base, entity)
    }

    fn with_base(mut base: SqlVisitor, entity: EntityType) -> Self {
        base.add_table(entity, None);
        Self {
            base,
            where_clause: Conjunction::default(),
            group_by: Vec::new(),
            having: Conjunction::default(),
            order_by: Vec::new(),
            select: None,
            distinct: false,
            skip: None,
            take: None,
            page: None,
            unions: Vec::new(),
            includes: Vec::new(),
        }
    }

    /// Read the first table from `sql` instead of the entity's table.
    pub fn from_sql(&mut self, sql: impl Into<String>) -> OrmResult<()> {
        let sql = sql.into();
        if sql.trim().is_empty() {
            return Err(OrmError::invalid_argument("derived table SQL is empty"));
        }
        self.base.tables[0].body = Some(sql);
        Ok(())
    }

    /// Add a comma-joined table.
    pub fn from(&mut self, entity: EntityType) -> OrmResult<()> {
        self.base.add_table(entity, None);
        Ok(())
    }

    pub fn join(&mut self, join_type: JoinType, entity: EntityType, on: &Lambda) -> OrmResult<()> {
        let index = self.base.add_table(entity, Some(join_type));
        let (on_sql, _) = self.base.predicate(on)?;
        self.base.tables[index].on_sql = Some(on_sql);
        Ok(())
    }

    /// Add a WHERE predicate; repeated calls are AND-ed.
    pub fn where_(&mut self, lambda: &Lambda) -> OrmResult<()> {
        let predicate = self.base.predicate(lambda)?;
        self.where_clause.push(predicate);
        Ok(())
    }

    pub fn and(&mut self, lambda: &Lambda) -> OrmResult<()> {
        self.where_(lambda)
    }

    /// Group by a member or a projection of members.
    pub fn group_by(&mut self, lambda: &Lambda) -> OrmResult<()> {
        self.base.init_table_alias(lambda)?;
        for (_, expr) in projection_items(lambda.body()) {
            let sql = self.base.value_sql(expr, None)?;
            self.group_by.push(sql);
        }
        Ok(())
    }

    pub fn having(&mut self, lambda: &Lambda) -> OrmResult<()> {
        let predicate = self.base.predicate(lambda)?;
        self.having.push(predicate);
        Ok(())
    }

    pub fn order_by(&mut self, lambda: &Lambda, descending: bool) -> OrmResult<()> {
        self.base.init_table_alias(lambda)?;
        for (_, expr) in projection_items(lambda.body()) {
            let sql = self.base.value_sql(expr, None)?;
            self.order_by
                .push(if descending { format!("{sql} DESC") } else { sql });
        }
        Ok(())
    }

    /// Set the select list: a whole entity parameter, a single expression,
    /// or a projection of named expressions.
    pub fn select(&mut self, lambda: &Lambda) -> OrmResult<()> {
        self.base.init_table_alias(lambda)?;
        let mut list = SelectList::default();
        match lambda.body() {
            Expr::Parameter(id) => self.select_entity(*id, &mut list)?,
            Expr::Projection { fields, .. } => {
                for (name, expr) in fields {
                    match expr {
                        Expr::Parameter(id) => self.select_entity(*id, &mut list)?,
                        other => self.select_item(Some(name), other, &mut list)?,
                    }
                }
            }
            other => self.select_item(None, other, &mut list)?,
        }
        self.select = Some(list);
        Ok(())
    }

    pub fn distinct(&mut self) {
        self.distinct = true;
    }

    pub fn skip(&mut self, n: u64) {
        self.skip = Some(n);
    }

    pub fn take(&mut self, n: u64) {
        self.take = Some(n);
    }

    /// Page `index` (1-based) of `size` rows, preceded by a total count.
    pub fn page(&mut self, index: u64, size: u64) -> OrmResult<()> {
        if size == 0 {
            return Err(OrmError::invalid_argument("page size must be positive"));
        }
        let offset = (index.max(1) - 1).checked_mul(size).ok_or_else(|| {
            OrmError::invalid_argument(format!(
                "page {index} of size {size} overflows the row offset"
            ))
        })?;
        self.page = Some((offset, size));
        Ok(())
    }

    /// Append `UNION [ALL] <query>`, bound in this query's parameter scope.
    pub fn union(&mut self, query: &QueryDef, all: bool) -> OrmResult<()> {
        let sql = compile_nested(&mut self.base, query)?;
        let keyword = if all { "UNION ALL" } else { "UNION" };
        self.unions.push(format!(" {keyword} {sql}"));
        Ok(())
    }

    /// Eager-load a navigation member of the first table. Each navigation
    /// is loaded by its own secondary command.
    pub fn include(&mut self, member: &str) -> OrmResult<()> {
        if self.includes.iter().any(|plan| plan.member == member) {
            return Err(OrmError::invalid_argument(format!(
                "`{member}` is already included"
            )));
        }
        let map = self.base.table_map(0)?;
        let member_map = map.member_or_err(member)?;
        let navigation = member_map.navigation.clone().ok_or_else(|| {
            OrmError::invalid_argument(format!(
                "member `{member}` of {} is not a navigation",
                map.type_name
            ))
        })?;
        let parent_key = map.key_members().next().cloned().ok_or_else(|| {
            OrmError::Mapping(format!(
                "entity '{}' needs a key member to include `{member}`",
                map.type_name
            ))
        })?;
        self.includes.push(IncludePlan {
            member: member.to_string(),
            navigation,
            parent_key,
        });
        Ok(())
    }

    pub(crate) fn apply(&mut self, op: &QueryOp) -> OrmResult<()> {
        match op {
            QueryOp::From(entity) => self.from(*entity),
            QueryOp::Join {
                join_type,
                entity,
                on,
            } => self.join(*join_type, *entity, on),
            QueryOp::Where(lambda) => self.where_(lambda),
            QueryOp::And(lambda) => self.and(lambda),
            QueryOp::GroupBy(lambda) => self.group_by(lambda),
            QueryOp::Having(lambda) => self.having(lambda),
            QueryOp::OrderBy { lambda, descending } => self.order_by(lambda, *descending),
            QueryOp::Select(lambda) => self.select(lambda),
            QueryOp::Distinct => {
                self.distinct();
                Ok(())
            }
            QueryOp::Skip(n) => {
                self.skip(*n);
                Ok(())
            }
            QueryOp::Take(n) => {
                self.take(*n);
                Ok(())
            }
            QueryOp::Union { all, query } => self.union(query, *all),
        }
    }

    // ==================== Select list ====================

    fn select_entity(&mut self, id: ParamId, list: &mut SelectList) -> OrmResult<()> {
        let index = self.base.bound_table(id).ok_or_else(|| {
            OrmError::invalid_argument("selected parameter is not bound to a table")
        })?;
        self.select_table(index, list)
    }

    fn select_table(&mut self, index: usize, list: &mut SelectList) -> OrmResult<()> {
        let map = self.base.table_map(index)?;
        for member in map.columns() {
            let column = self.base.column_sql(index, &member.field_name);
            list.push(column, member.member_name.clone(), Some(Arc::clone(member)));
        }
        Ok(())
    }

    fn select_item(&mut self, name: Option<&str>, expr: &Expr, list: &mut SelectList) -> OrmResult<()> {
        let segment = self.base.visit(SqlSegment::new(expr))?;
        let member = segment.member.clone();
        let is_column = matches!(expr, Expr::Member { .. }) && member.is_some();
        let sql = self.base.render(segment, None, 0)?;
        let label = match (name, &member) {
            (Some(name), _) => name.to_string(),
            (None, Some(member)) if is_column => member.member_name.clone(),
            (None, _) => format!("Column{}", list.fields.len()),
        };
        let needs_alias = match &member {
            Some(member) if is_column => member.field_name != label,
            _ => true,
        };
        let column = if needs_alias {
            format!("{sql} AS {}", self.base.provider.field_name(&label))
        } else {
            sql
        };
        list.push(column, label, if is_column { member } else { None });
        Ok(())
    }

    // ==================== Assembly ====================

    fn from_clause(&mut self) -> OrmResult<String> {
        let mut sql = self.base.table_sql(0)?;
        for index in 1..self.base.tables.len() {
            let table = self.base.table_sql(index)?;
            let segment = &self.base.tables[index];
            match (segment.join_type, &segment.on_sql) {
                (Some(join_type), Some(on)) => {
                    sql.push_str(&format!(" {} {table} ON {on}", join_type.sql()));
                }
                _ => {
                    sql.push(',');
                    sql.push_str(&table);
                }
            }
        }
        Ok(sql)
    }

    fn filter_clauses(&self) -> String {
        let mut sql = String::new();
        if let Some(predicate) = self.where_clause.render() {
            sql.push_str(" WHERE ");
            sql.push_str(&predicate);
        }
        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(","));
        }
        if let Some(predicate) = self.having.render() {
            sql.push_str(" HAVING ");
            sql.push_str(&predicate);
        }
        sql
    }

    /// `SELECT ... FROM ... [WHERE] [GROUP BY] [HAVING] [UNION ...]`, without
    /// ordering or paging.
    fn body(&mut self) -> OrmResult<(String, String, Vec<ReaderField>)> {
        let list = match self.select.take() {
            Some(list) => list,
            None => {
                let mut list = SelectList::default();
                self.select_table(0, &mut list)?;
                list
            }
        };
        let from = self.from_clause()?;
        let distinct = if self.distinct { "DISTINCT " } else { "" };
        let mut sql = format!(
            "SELECT {distinct}{} FROM {from}{}",
            list.columns.join(","),
            self.filter_clauses()
        );
        for union in &self.unions {
            sql.push_str(union);
        }
        Ok((sql, from, list.fields))
    }

    fn order_clause(&self) -> String {
        if self.order_by.is_empty() {
            String::new()
        } else {
            format!(" ORDER BY {}", self.order_by.join(","))
        }
    }

    fn render_nested(&mut self) -> OrmResult<String> {
        let (mut sql, _, _) = self.body()?;
        sql.push_str(&self.order_clause());
        self.base
            .provider
            .paging_sql(&mut sql, self.skip, self.take, !self.order_by.is_empty());
        Ok(sql)
    }

    pub fn build_sql(mut self) -> OrmResult<BuiltQuery> {
        let (body, from, reader_fields) = self.body()?;
        let has_order_by = !self.order_by.is_empty();
        let mut sql = body.clone();
        sql.push_str(&self.order_clause());

        let is_paged = self.page.is_some();
        if let Some((offset, size)) = self.page {
            self.base
                .provider
                .paging_sql(&mut sql, Some(offset), Some(size), has_order_by);
            let count = if self.distinct || !self.group_by.is_empty() || !self.unions.is_empty() {
                format!("SELECT COUNT(*) FROM ({body}) t")
            } else {
                let mut count = format!("SELECT COUNT(*) FROM {from}");
                if let Some(predicate) = self.where_clause.render() {
                    count.push_str(" WHERE ");
                    count.push_str(&predicate);
                }
                count
            };
            sql = format!("{count};{sql}");
        } else {
            self.base
                .provider
                .paging_sql(&mut sql, self.skip, self.take, has_order_by);
        }

        for plan in &self.includes {
            let key = &plan.parent_key.member_name;
            if !reader_fields.iter().any(|f| &f.label == key) {
                return Err(OrmError::invalid_argument(format!(
                    "include of `{}` needs `{key}` in the select list",
                    plan.member
                )));
            }
        }

        Ok(BuiltQuery {
            command: Command::new(sql, std::mem::take(&mut self.base.parameters)),
            reader_fields,
            includes: self.includes,
            is_paged,
            provider: self.base.provider,
            maps: self.base.maps,
        })
    }
}

/// Compile `query` as a sub-query of `parent`, sharing its parameters.
pub(crate) fn compile_nested(parent: &mut SqlVisitor, query: &QueryDef) -> OrmResult<String> {
    let base = parent.nested()?;
    let mut visitor = QueryVisitor::with_base(base, query.entity);
    let result = query
        .ops
        .iter()
        .try_for_each(|op| visitor.apply(op))
        .and_then(|()| visitor.render_nested());
    parent.restore_parameters(std::mem::take(&mut visitor.base.parameters));
    result
}

/// Items of a projection body, or the body itself as a single item.
fn projection_items(body: &Expr) -> Vec<(Option<&str>, &Expr)> {
    match body {
        Expr::Projection { fields, .. } => fields
            .iter()
            .map(|(name, expr)| (Some(name.as_str()), expr))
            .collect(),
        other => vec![(None, other)],
    }
}

/// A compiled SELECT.
pub struct BuiltQuery {
    pub command: Command,
    pub reader_fields: Vec<ReaderField>,
    includes: Vec<IncludePlan>,
    is_paged: bool,
    provider: Arc<dyn OrmProvider>,
    maps: Arc<dyn EntityMapProvider>,
}

impl std::fmt::Debug for BuiltQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltQuery")
            .field("command", &self.command)
            .field("reader_fields", &self.reader_fields)
            .field("includes", &self.includes)
            .field("is_paged", &self.is_paged)
            .field("database", &self.provider.database_type())
            .finish()
    }
}

/// Secondary command loading an included navigation.
#[derive(Debug, Clone)]
pub struct IncludeCommand {
    pub member: String,
    pub command: Command,
    pub reader_fields: Vec<ReaderField>,
    /// Child member holding the parent key.
    pub foreign_key: String,
    /// Parent member the foreign key points at.
    pub parent_key: String,
    pub is_many: bool,
}

impl BuiltQuery {
    pub fn sql(&self) -> &str {
        &self.command.sql
    }

    pub fn parameters(&self) -> &[DbParameter] {
        &self.command.parameters
    }

    /// Whether the command yields a total count before the rows.
    pub fn is_paged(&self) -> bool {
        self.is_paged
    }

    pub fn has_include(&self) -> bool {
        !self.includes.is_empty()
    }

    /// Navigation members requested with `include`, in call order.
    pub fn included_members(&self) -> impl Iterator<Item = &str> {
        self.includes.iter().map(|plan| plan.member.as_str())
    }

    pub fn labels(&self) -> Vec<String> {
        self.reader_fields.iter().map(|f| f.label.clone()).collect()
    }

    /// One command per included navigation, loading its rows for `rows`.
    ///
    /// `rows` must carry the reader-field labels. Empty when no include was
    /// requested or no parent key is present.
    pub fn build_include_sql(&self, rows: &[Row]) -> OrmResult<Vec<IncludeCommand>> {
        let mut commands = Vec::with_capacity(self.includes.len());
        for plan in &self.includes {
            if let Some(command) = self.include_command(plan, rows)? {
                commands.push(command);
            }
        }
        Ok(commands)
    }

    fn include_command(&self, plan: &IncludePlan, rows: &[Row]) -> OrmResult<Option<IncludeCommand>> {
        let key = &plan.parent_key.member_name;
        let mut keys: Vec<Value> = Vec::new();
        for row in rows {
            let value = row
                .get_value(key)
                .ok_or_else(|| OrmError::decode(key.as_str(), "parent key column missing from row"))?;
            if !value.is_null() && !keys.contains(value) {
                keys.push(value.clone());
            }
        }
        if keys.is_empty() {
            return Ok(None);
        }

        let child = self.maps.entity_map(&plan.navigation.target)?;
        let foreign_key = child.member_or_err(&plan.navigation.foreign_key)?;
        let prefix = self.provider.parameter_prefix();
        let mut names = Vec::with_capacity(keys.len());
        let mut parameters = Vec::with_capacity(keys.len());
        for (i, value) in keys.into_iter().enumerate() {
            let name = format!("{prefix}{}_{i}", foreign_key.member_name);
            parameters.push(self.provider.create_parameter(
                name.clone(),
                value,
                foreign_key.native_type.as_deref(),
            ));
            names.push(name);
        }

        let mut columns = Vec::new();
        let mut reader_fields = Vec::new();
        for (index, member) in child.columns().enumerate() {
            columns.push(format!("a.{}", self.provider.field_name(&member.field_name)));
            reader_fields.push(ReaderField {
                index,
                label: member.member_name.clone(),
                member: Some(Arc::clone(member)),
            });
        }
        let sql = format!(
            "SELECT {} FROM {} a WHERE a.{} IN ({})",
            columns.join(","),
            self.provider.table_name(&child.table_name),
            self.provider.field_name(&foreign_key.field_name),
            names.join(",")
        );
        Ok(Some(IncludeCommand {
            member: plan.member.clone(),
            command: Command::new(sql, parameters),
            reader_fields,
            foreign_key: foreign_key.member_name.clone(),
            parent_key: key.clone(),
            is_many: plan.navigation.is_many,
        }))
    }
}
