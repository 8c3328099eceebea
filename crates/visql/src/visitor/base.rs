//! Shared traversal primitives used by every statement visitor.

use super::query::compile_nested;
use super::segment::{DeferredExpr, SqlSegment};
use super::table::{JoinType, TableSegment, alias_for};
use crate::command::DbParameter;
use crate::error::{OrmError, OrmResult};
use crate::expr::{BinaryOp, Expr, Method, ParamId, UnaryOp};
use crate::lambda::{Lambda, LambdaParam};
use crate::mapping::{EntityMap, EntityMapProvider, EntityType, MemberMap};
use crate::provider::OrmProvider;
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Unary minus binds tighter than every binary operator.
const NEGATE_PRECEDENCE: u8 = 7;

/// A table of an enclosing statement, visible to a correlated sub-query.
#[derive(Debug, Clone)]
struct OuterTable {
    qualifier: String,
    map: Arc<EntityMap>,
}

/// State shared by the statement visitors: the table list, the parameter
/// alias map of the lambda being visited, and the bound parameters.
pub struct SqlVisitor {
    pub(crate) provider: Arc<dyn OrmProvider>,
    pub(crate) maps: Arc<dyn EntityMapProvider>,
    pub(crate) tables: Vec<TableSegment>,
    alias_map: HashMap<ParamId, usize>,
    outer: HashMap<ParamId, OuterTable>,
    alias_offset: usize,
    pub(crate) parameters: Vec<DbParameter>,
    pub(crate) is_need_alias: bool,
}

impl SqlVisitor {
    pub fn new(provider: Arc<dyn OrmProvider>, maps: Arc<dyn EntityMapProvider>) -> Self {
        Self {
            provider,
            maps,
            tables: Vec::new(),
            alias_map: HashMap::new(),
            outer: HashMap::new(),
            alias_offset: 0,
            parameters: Vec::new(),
            is_need_alias: false,
        }
    }

    /// A visitor for a sub-query of this one.
    ///
    /// The child sees every table bound in the current alias map, continues
    /// the alias letters after this visitor's tables and takes over the
    /// parameter list; hand it back with [`restore_parameters`](Self::restore_parameters).
    pub(crate) fn nested(&mut self) -> OrmResult<SqlVisitor> {
        let mut outer = self.outer.clone();
        let bound: Vec<(ParamId, usize)> = self.alias_map.iter().map(|(k, v)| (*k, *v)).collect();
        for (id, index) in bound {
            let map = self.table_map(index)?;
            let qualifier = if self.is_need_alias {
                self.tables[index].alias.clone()
            } else {
                self.provider.table_name(&map.table_name)
            };
            outer.insert(id, OuterTable { qualifier, map });
        }
        Ok(SqlVisitor {
            provider: Arc::clone(&self.provider),
            maps: Arc::clone(&self.maps),
            tables: Vec::new(),
            alias_map: HashMap::new(),
            outer,
            alias_offset: self.alias_offset + self.tables.len(),
            parameters: std::mem::take(&mut self.parameters),
            is_need_alias: true,
        })
    }

    pub(crate) fn restore_parameters(&mut self, parameters: Vec<DbParameter>) {
        self.parameters = parameters;
    }

    // ==================== Tables ====================

    /// Append a table; its alias follows declaration order.
    pub(crate) fn add_table(&mut self, entity: EntityType, join_type: Option<JoinType>) -> usize {
        let index = self.tables.len();
        let mut table = TableSegment::new(entity, alias_for(self.alias_offset + index));
        table.join_type = join_type;
        self.tables.push(table);
        index
    }

    pub(crate) fn table_map(&mut self, index: usize) -> OrmResult<Arc<EntityMap>> {
        let maps = Arc::clone(&self.maps);
        let table = self
            .tables
            .get_mut(index)
            .ok_or_else(|| OrmError::invalid_argument(format!("no table at position {index}")))?;
        table.mapper(maps.as_ref())
    }

    /// Table name as it appears in FROM/UPDATE/JOIN, with alias when needed.
    pub(crate) fn table_sql(&mut self, index: usize) -> OrmResult<String> {
        let map = self.table_map(index)?;
        let table = &self.tables[index];
        let name = match &table.body {
            Some(body) => format!("({body})"),
            None => self.provider.table_name(&map.table_name),
        };
        if self.is_need_alias {
            Ok(format!("{name} {}", table.alias))
        } else {
            Ok(name)
        }
    }

    /// Column reference for `field` on the table at `index`.
    pub(crate) fn column_sql(&self, index: usize, field: &str) -> String {
        let field = self.provider.field_name(field);
        if self.is_need_alias {
            format!("{}.{field}", self.tables[index].alias)
        } else {
            field
        }
    }

    /// Bind the entity parameters of `lambda` to tables by position.
    ///
    /// Query-builder parameters take no table slot and parameters the body
    /// never references are left unbound.
    pub(crate) fn init_table_alias(&mut self, lambda: &Lambda) -> OrmResult<()> {
        self.alias_map.clear();
        let referenced = lambda.referenced();
        let mut position = 0;
        for param in lambda.params() {
            let LambdaParam::Entity { id, entity } = param else {
                continue;
            };
            let index = position;
            position += 1;
            if !referenced.contains(id) {
                continue;
            }
            let table = self.tables.get(index).ok_or_else(|| {
                OrmError::invalid_argument(format!(
                    "lambda parameter {index} of type {} has no matching table",
                    entity.short_name()
                ))
            })?;
            if table.entity != *entity {
                return Err(OrmError::invalid_argument(format!(
                    "lambda parameter {index} is {} but table {} is {}",
                    entity.short_name(),
                    table.alias,
                    table.entity.short_name()
                )));
            }
            self.alias_map.insert(*id, index);
        }
        Ok(())
    }

    // ==================== Parameters ====================

    fn has_parameter(&self, name: &str) -> bool {
        self.parameters.iter().any(|p| p.name == name)
    }

    /// Bind `value`, naming it after `member` when known.
    ///
    /// A taken name gets the current parameter count appended.
    pub(crate) fn add_parameter(&mut self, member: Option<&MemberMap>, value: Value) -> String {
        let prefix = self.provider.parameter_prefix().to_string();
        let base = match member {
            Some(m) => m.member_name.clone(),
            None => format!("p{}", self.parameters.len()),
        };
        let mut name = format!("{prefix}{base}");
        let mut suffix = self.parameters.len();
        while self.has_parameter(&name) {
            name = format!("{prefix}{base}{suffix}");
            suffix += 1;
        }
        let native_type = member.and_then(|m| m.native_type.as_deref());
        let parameter = self
            .provider
            .create_parameter(name.clone(), value, native_type);
        self.parameters.push(parameter);
        name
    }

    // ==================== Rendering helpers ====================

    /// Predicate text and its precedence for a lambda in a WHERE/ON/HAVING slot.
    pub(crate) fn predicate(&mut self, lambda: &Lambda) -> OrmResult<(String, u8)> {
        self.init_table_alias(lambda)?;
        let segment = self.visit(SqlSegment::condition(lambda.body()))?;
        Ok((condition_text(&segment)?, segment.precedence))
    }

    /// Table index a parameter is bound to by the last `init_table_alias`.
    pub(crate) fn bound_table(&self, id: ParamId) -> Option<usize> {
        self.alias_map.get(&id).copied()
    }

    /// Value text for an expression, binding constants under `hint`'s name.
    pub(crate) fn value_sql(&mut self, expr: &Expr, hint: Option<&MemberMap>) -> OrmResult<String> {
        let segment = self.visit(SqlSegment::new(expr))?;
        self.render(segment, hint, 0)
    }

    /// Operand text: constants become parameters (`NULL` is inlined),
    /// SQL is parenthesised when it binds looser than `min_precedence`.
    pub(crate) fn render(
        &mut self,
        segment: SqlSegment<'_>,
        hint: Option<&MemberMap>,
        min_precedence: u8,
    ) -> OrmResult<String> {
        if let Some(value) = segment.constant_value() {
            if value.is_null() {
                return Ok("NULL".to_string());
            }
            return Ok(self.add_parameter(hint, value.clone()));
        }
        let sql = segment.sql().ok_or_else(|| {
            OrmError::unsupported(format!(
                "{} produced no SQL",
                segment.expr.kind_name()
            ))
        })?;
        Ok(wrap(sql, segment.precedence, min_precedence))
    }

    // ==================== Visiting ====================

    /// Visit one node, then resolve any pending boolean logic against it.
    pub(crate) fn visit<'e>(&mut self, segment: SqlSegment<'e>) -> OrmResult<SqlSegment<'e>> {
        let segment = self.visit_node(segment)?;
        if segment.is_constant {
            return Ok(segment);
        }
        if segment.has_deferred() || (segment.is_condition && !segment.is_predicate) {
            return self.visit_boolean_deferred(segment);
        }
        Ok(segment)
    }

    fn visit_node<'e>(&mut self, mut segment: SqlSegment<'e>) -> OrmResult<SqlSegment<'e>> {
        let expr = segment.expr;
        match expr {
            Expr::Parameter(_) => Err(OrmError::unsupported(
                "a whole entity parameter cannot be used as a value; access one of its members",
            )),
            Expr::Member { object, member } => self.visit_member(segment, object, member),
            Expr::HasValue(inner) => {
                segment.push(DeferredExpr::Not);
                segment.push(DeferredExpr::Equal(Value::Null));
                let next = segment.next(inner);
                self.visit(next)
            }
            Expr::NullableValue(inner) => {
                let next = segment.next(inner);
                self.visit(next)
            }
            Expr::Constant(value) => self.visit_constant(segment, value.clone()),
            Expr::Captured(captured) => self.visit_constant(segment, captured.evaluate()),
            Expr::Static(name) => match self.provider.member_access_sql_formatter(name) {
                Some(sql) => Ok(segment.change(sql).expression(0)),
                None => Err(OrmError::unsupported(format!(
                    "static member `{name}` has no SQL form on {:?}",
                    self.provider.database_type()
                ))),
            },
            Expr::Unary {
                op: UnaryOp::Not,
                operand,
            } => {
                segment.push(DeferredExpr::Not);
                let next = segment.next(operand);
                self.visit(next)
            }
            Expr::Unary {
                op: UnaryOp::Negate,
                operand,
            } => self.visit_negate(segment, operand),
            Expr::Binary { op, left, right } if op.is_logical() => {
                self.visit_logical(segment, *op, left, right)
            }
            Expr::Binary { op, left, right } => self.visit_binary(segment, *op, left, right),
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => self.visit_conditional(segment, test, if_true, if_false),
            Expr::Call {
                method,
                object,
                args,
            } => self.visit_call(segment, *method, object.as_deref(), args),
            Expr::Projection { .. } => Err(OrmError::unsupported(
                "a projection is only valid as a select list or a set list",
            )),
            Expr::Subquery(query) => {
                let sql = compile_nested(self, query)?;
                Ok(segment.change(format!("({sql})")).expression(0))
            }
        }
    }

    fn visit_member<'e>(
        &mut self,
        segment: SqlSegment<'e>,
        object: &Expr,
        member: &str,
    ) -> OrmResult<SqlSegment<'e>> {
        let Expr::Parameter(id) = object else {
            return Err(OrmError::unsupported(format!(
                "member `{member}` accessed on a {}; only lambda parameters have mapped members",
                object.kind_name()
            )));
        };
        let (table, map, qualifier) = if let Some(&index) = self.alias_map.get(id) {
            (Some(index), self.table_map(index)?, None)
        } else if let Some(outer) = self.outer.get(id) {
            (None, Arc::clone(&outer.map), Some(outer.qualifier.clone()))
        } else {
            return Err(OrmError::invalid_argument(format!(
                "member `{member}` belongs to a parameter that is not bound to any table of this statement"
            )));
        };
        let member_map = Arc::clone(map.member_or_err(member)?);
        if member_map.is_navigation() {
            return Err(OrmError::unsupported(format!(
                "navigation member `{member}` cannot be used as a column; use include instead"
            )));
        }
        if member_map.is_ignored {
            return Err(OrmError::unsupported(format!(
                "member `{member}` of {} is ignored and has no column",
                map.type_name
            )));
        }
        let sql = match (table, qualifier) {
            (Some(index), _) => self.column_sql(index, &member_map.field_name),
            (None, Some(qualifier)) => format!(
                "{qualifier}.{}",
                self.provider.field_name(&member_map.field_name)
            ),
            (None, None) => self.provider.field_name(&member_map.field_name),
        };
        let mut segment = segment.change(sql);
        segment.has_field = true;
        segment.table = table;
        segment.member = Some(member_map);
        Ok(segment)
    }

    fn visit_constant<'e>(
        &mut self,
        mut segment: SqlSegment<'e>,
        value: Value,
    ) -> OrmResult<SqlSegment<'e>> {
        let mut current = value;
        while let Some(deferred) = segment.deferred.pop() {
            current = match deferred {
                DeferredExpr::Not => {
                    let b = current.as_bool().ok_or_else(|| {
                        OrmError::unsupported(format!(
                            "NOT applied to a {} constant",
                            current.type_name()
                        ))
                    })?;
                    Value::Bool(!b)
                }
                DeferredExpr::Equal(other) => Value::Bool(current == other),
            };
        }
        let is_parameter = !current.is_null();
        let mut segment = segment.change_constant(current);
        segment.is_parameter = is_parameter;
        Ok(segment)
    }

    /// Render the deferred stack against the resolved operand.
    ///
    /// With no comparison pending, a boolean member becomes `f=<true>` (or
    /// `f=<false>` under an odd number of negations); any other operand is
    /// not a condition.
    pub(crate) fn visit_boolean_deferred<'e>(
        &mut self,
        mut segment: SqlSegment<'e>,
    ) -> OrmResult<SqlSegment<'e>> {
        let Some(operand) = segment.sql() else {
            return Ok(segment);
        };
        let operand = wrap(operand, segment.precedence, BinaryOp::Add.precedence());
        let mut negated = false;
        let mut compare = None;
        while let Some(deferred) = segment.deferred.pop() {
            match deferred {
                DeferredExpr::Not => negated = !negated,
                DeferredExpr::Equal(value) => compare = Some(value),
            }
        }
        let sql = match compare {
            Some(Value::Null) if negated => format!("{operand} IS NOT NULL"),
            Some(Value::Null) => format!("{operand} IS NULL"),
            Some(value) => {
                let name = self.add_parameter(segment.member.as_deref(), value);
                let op = if negated { "<>" } else { "=" };
                format!("{operand}{op}{name}")
            }
            None => {
                if !segment.member.as_ref().is_some_and(|m| m.is_boolean) {
                    let what = match &segment.member {
                        Some(m) => format!("member `{}`", m.member_name),
                        None => segment.expr.kind_name().to_string(),
                    };
                    return Err(OrmError::unsupported(format!(
                        "{what} does not return a boolean and cannot be used as a condition"
                    )));
                }
                format!("{operand}={}", self.provider.boolean_literal(!negated))
            }
        };
        Ok(segment.change(sql).predicate(BinaryOp::Equal.precedence()))
    }

    fn visit_negate<'e>(
        &mut self,
        segment: SqlSegment<'e>,
        operand: &'e Expr,
    ) -> OrmResult<SqlSegment<'e>> {
        let inner = self.visit(SqlSegment::new(operand))?;
        if let Some(value) = inner.constant_value() {
            let negated = match value {
                Value::Int(i) => Value::Int(-i),
                Value::Float(f) => Value::Float(-f),
                other => {
                    return Err(OrmError::unsupported(format!(
                        "cannot negate a {} constant",
                        other.type_name()
                    )));
                }
            };
            return Ok(segment.change_constant(negated));
        }
        let has_field = inner.has_field;
        let sql = self.render(inner, None, NEGATE_PRECEDENCE)?;
        let mut segment = segment.change(format!("-{sql}")).expression(NEGATE_PRECEDENCE);
        segment.has_field = has_field;
        Ok(segment)
    }

    fn visit_logical<'e>(
        &mut self,
        mut segment: SqlSegment<'e>,
        op: BinaryOp,
        left: &'e Expr,
        right: &'e Expr,
    ) -> OrmResult<SqlSegment<'e>> {
        let negated = segment.take_negation().ok_or_else(|| {
            OrmError::unsupported("a null comparison cannot apply to AND/OR")
        })?;
        let l = self.visit(SqlSegment::condition(left))?;
        let r = self.visit(SqlSegment::condition(right))?;
        let has_field = l.has_field || r.has_field;

        let (lb, rb) = (l.constant_bool(), r.constant_bool());
        let short_circuit = op == BinaryOp::Or;
        if lb == Some(short_circuit) || rb == Some(short_circuit) {
            return Ok(segment.change_constant(Value::Bool(short_circuit != negated)));
        }
        // A constant operand that does not short-circuit drops out.
        let (sql, precedence) = match (lb, rb) {
            (Some(_), Some(_)) => {
                return Ok(segment.change_constant(Value::Bool(short_circuit == negated)));
            }
            (Some(_), None) => (condition_text(&r)?, r.precedence),
            (None, Some(_)) => (condition_text(&l)?, l.precedence),
            (None, None) => {
                let ls = wrap(&condition_text(&l)?, l.precedence, op.precedence());
                let rs = wrap(&condition_text(&r)?, r.precedence, op.precedence());
                (format!("{ls}{}{rs}", op.sql()), op.precedence())
            }
        };
        let mut segment = if negated {
            segment.change(format!("NOT ({sql})")).predicate(3)
        } else {
            segment.change(sql).predicate(precedence)
        };
        segment.has_field = has_field;
        Ok(segment)
    }

    fn visit_binary<'e>(
        &mut self,
        mut segment: SqlSegment<'e>,
        op: BinaryOp,
        left: &'e Expr,
        right: &'e Expr,
    ) -> OrmResult<SqlSegment<'e>> {
        let op = if op.is_comparison() {
            let negated = segment.take_negation().ok_or_else(|| {
                OrmError::unsupported("a null comparison cannot apply to a comparison")
            })?;
            match op.negate() {
                Some(inverse) if negated => inverse,
                _ => op,
            }
        } else {
            op
        };
        let l = self.visit(SqlSegment::new(left))?;
        let r = self.visit(SqlSegment::new(right))?;
        let has_field = l.has_field || r.has_field;
        let l_hint = r.member.clone();
        let r_hint = l.member.clone();

        if l.is_constant && r.is_constant {
            if let (Some(lv), Some(rv)) = (l.constant_value(), r.constant_value()) {
                match op {
                    BinaryOp::Equal => return Ok(segment.change_constant(Value::Bool(lv == rv))),
                    BinaryOp::NotEqual => {
                        return Ok(segment.change_constant(Value::Bool(lv != rv)));
                    }
                    _ => {}
                }
            }
        }

        if l.is_predicate || r.is_predicate {
            let mut segment = self.compare_predicate(segment, op, l, r)?;
            segment.has_field = has_field;
            return Ok(segment);
        }

        if matches!(op, BinaryOp::Equal | BinaryOp::NotEqual) {
            let right_is_null = r.constant_value().is_some_and(Value::is_null);
            let left_is_null = l.constant_value().is_some_and(Value::is_null);
            if right_is_null || left_is_null {
                let operand = if right_is_null { l } else { r };
                let sql = self.render(operand, None, BinaryOp::Add.precedence())?;
                let sql = if op == BinaryOp::Equal {
                    format!("{sql} IS NULL")
                } else {
                    format!("{sql} IS NOT NULL")
                };
                let mut segment = segment.change(sql).predicate(op.precedence());
                segment.has_field = has_field;
                return Ok(segment);
            }
        }

        let mut segment = match op {
            BinaryOp::Coalesce => {
                let ls = self.render(l, l_hint.as_deref(), 0)?;
                let rs = self.render(r, r_hint.as_deref(), 0)?;
                segment.change(format!("COALESCE({ls},{rs})")).expression(0)
            }
            BinaryOp::Add if l.is_string || r.is_string => {
                let parts = [
                    self.render(l, l_hint.as_deref(), 0)?,
                    self.render(r, r_hint.as_deref(), 0)?,
                ];
                let mut segment = segment
                    .change(self.provider.concat(&parts))
                    .expression(BinaryOp::Add.precedence());
                segment.is_string = true;
                segment
            }
            _ => {
                let precedence = op.precedence();
                let ls = self.render(l, l_hint.as_deref(), precedence)?;
                let right_min = precedence + u8::from(op.is_left_associative_only());
                let rs = self.render(r, r_hint.as_deref(), right_min)?;
                let segment = segment.change(format!("{ls}{}{rs}", op.sql()));
                if op.is_comparison() {
                    segment.predicate(precedence)
                } else {
                    segment.expression(precedence)
                }
            }
        };
        segment.has_field = has_field;
        Ok(segment)
    }

    /// `<predicate> == <bool>` keeps or negates the predicate; any other
    /// comparison against a predicate has no SQL form.
    fn compare_predicate<'e>(
        &mut self,
        segment: SqlSegment<'e>,
        op: BinaryOp,
        l: SqlSegment<'e>,
        r: SqlSegment<'e>,
    ) -> OrmResult<SqlSegment<'e>> {
        let (predicate, other) = if l.is_predicate { (l, r) } else { (r, l) };
        let expected = match (op, other.constant_value()) {
            (BinaryOp::Equal, Some(Value::Bool(b))) => *b,
            (BinaryOp::NotEqual, Some(Value::Bool(b))) => !*b,
            _ => {
                return Err(OrmError::unsupported(format!(
                    "a condition can only be compared with a boolean constant using == or !=, found `{}` against a {}",
                    op.sql().trim(),
                    other.expr.kind_name()
                )));
            }
        };
        let sql = condition_text(&predicate)?;
        Ok(if expected {
            segment.change(sql).predicate(predicate.precedence)
        } else {
            segment.change(format!("NOT ({sql})")).predicate(3)
        })
    }

    fn visit_conditional<'e>(
        &mut self,
        segment: SqlSegment<'e>,
        test: &'e Expr,
        if_true: &'e Expr,
        if_false: &'e Expr,
    ) -> OrmResult<SqlSegment<'e>> {
        let test = self.visit(SqlSegment::condition(test))?;
        let test = condition_text(&test)?;
        let t = self.visit(SqlSegment::new(if_true))?;
        let f = self.visit(SqlSegment::new(if_false))?;
        let has_field = t.has_field || f.has_field;
        let is_string = t.is_string || f.is_string;
        let (t_hint, f_hint) = (f.member.clone(), t.member.clone());
        let ts = self.render(t, t_hint.as_deref(), 0)?;
        let fs = self.render(f, f_hint.as_deref(), 0)?;
        let mut segment = segment
            .change(format!("CASE WHEN {test} THEN {ts} ELSE {fs} END"))
            .expression(0);
        segment.has_field = has_field;
        segment.is_string = is_string;
        Ok(segment)
    }

    fn visit_call<'e>(
        &mut self,
        mut segment: SqlSegment<'e>,
        method: Method,
        object: Option<&'e Expr>,
        args: &'e [Expr],
    ) -> OrmResult<SqlSegment<'e>> {
        let target = |name: &str| {
            object.ok_or_else(|| OrmError::unsupported(format!("{name} requires a target expression")))
        };
        match method {
            Method::Contains | Method::StartsWith | Method::EndsWith => {
                let negated = take_call_negation(&mut segment)?;
                let target = self.visit(SqlSegment::new(target("LIKE")?))?;
                let pattern_expr = args
                    .first()
                    .ok_or_else(|| OrmError::invalid_argument("LIKE requires a pattern"))?;
                let pattern = self.visit(SqlSegment::new(pattern_expr))?;
                let hint = target.member.clone();
                let has_field = target.has_field;
                let target_sql = self.render(target, None, BinaryOp::Add.precedence())?;
                let pattern_sql = match pattern.constant_value() {
                    Some(Value::Null) => {
                        return Err(OrmError::invalid_argument("LIKE pattern cannot be NULL"));
                    }
                    Some(value) => {
                        let text = value.to_string();
                        let like = match method {
                            Method::Contains => format!("%{text}%"),
                            Method::StartsWith => format!("{text}%"),
                            _ => format!("%{text}"),
                        };
                        self.add_parameter(hint.as_deref(), Value::String(like))
                    }
                    None => {
                        let p = self.render(pattern, None, 0)?;
                        let wildcard = "'%'".to_string();
                        let parts = match method {
                            Method::Contains => vec![wildcard.clone(), p, wildcard],
                            Method::StartsWith => vec![p, wildcard],
                            _ => vec![wildcard, p],
                        };
                        self.provider.concat(&parts)
                    }
                };
                let op = if negated { " NOT LIKE " } else { " LIKE " };
                let mut segment = segment
                    .change(format!("{target_sql}{op}{pattern_sql}"))
                    .predicate(BinaryOp::Equal.precedence());
                segment.has_field = has_field;
                Ok(segment)
            }
            Method::ToUpper | Method::ToLower | Method::Trim | Method::Length => {
                let inner = self.visit(SqlSegment::new(target("string function")?))?;
                let has_field = inner.has_field;
                let member = inner.member.clone();
                let sql = self.render(inner, member.as_deref(), 0)?;
                let function = match method {
                    Method::ToUpper => "UPPER",
                    Method::ToLower => "LOWER",
                    Method::Trim => "TRIM",
                    _ => self.provider.length_function(),
                };
                let mut segment = segment.change(format!("{function}({sql})")).expression(0);
                segment.has_field = has_field;
                segment.is_string = method != Method::Length;
                Ok(segment)
            }
            Method::InList => {
                let negated = take_call_negation(&mut segment)?;
                let target = self.visit(SqlSegment::new(target("IN")?))?;
                if args.is_empty() {
                    return Ok(segment.change_constant(Value::Bool(negated)));
                }
                let hint = target.member.clone();
                let has_field = target.has_field;
                let target_sql = self.render(target, None, BinaryOp::Add.precedence())?;
                let mut items = Vec::with_capacity(args.len());
                for arg in args {
                    items.push(self.value_sql(arg, hint.as_deref())?);
                }
                let op = if negated { " NOT IN " } else { " IN " };
                let mut segment = segment
                    .change(format!("{target_sql}{op}({})", items.join(",")))
                    .predicate(BinaryOp::Equal.precedence());
                segment.has_field = has_field;
                Ok(segment)
            }
            Method::InQuery => {
                let negated = take_call_negation(&mut segment)?;
                let target = self.visit(SqlSegment::new(target("IN")?))?;
                let has_field = target.has_field;
                let target_sql = self.render(target, None, BinaryOp::Add.precedence())?;
                let sub = self.subquery_arg(args)?;
                let op = if negated { " NOT IN " } else { " IN " };
                let mut segment = segment
                    .change(format!("{target_sql}{op}({sub})"))
                    .predicate(BinaryOp::Equal.precedence());
                segment.has_field = has_field;
                Ok(segment)
            }
            Method::Exists => {
                let negated = take_call_negation(&mut segment)?;
                let sub = self.subquery_arg(args)?;
                let op = if negated { "NOT EXISTS" } else { "EXISTS" };
                Ok(segment.change(format!("{op} ({sub})")).predicate(0))
            }
            Method::Count => match object {
                None => Ok(segment.change("COUNT(1)").expression(0)),
                Some(inner) => {
                    let sql = self.value_sql(inner, None)?;
                    Ok(segment.change(format!("COUNT({sql})")).expression(0))
                }
            },
            Method::CountDistinct | Method::Sum | Method::Avg | Method::Max | Method::Min => {
                let sql = self.value_sql(target("aggregate")?, None)?;
                let sql = match method {
                    Method::CountDistinct => format!("COUNT(DISTINCT {sql})"),
                    Method::Sum => format!("SUM({sql})"),
                    Method::Avg => format!("AVG({sql})"),
                    Method::Max => format!("MAX({sql})"),
                    _ => format!("MIN({sql})"),
                };
                Ok(segment.change(sql).expression(0))
            }
        }
    }

    fn subquery_arg(&mut self, args: &[Expr]) -> OrmResult<String> {
        match args.first() {
            Some(Expr::Subquery(query)) => compile_nested(self, query),
            Some(other) => Err(OrmError::unsupported(format!(
                "expected a sub-query, found a {}",
                other.kind_name()
            ))),
            None => Err(OrmError::invalid_argument("missing sub-query argument")),
        }
    }
}

fn take_call_negation(segment: &mut SqlSegment<'_>) -> OrmResult<bool> {
    segment
        .take_negation()
        .ok_or_else(|| OrmError::unsupported("a null comparison cannot apply to a predicate call"))
}

/// Text of a segment in a predicate slot; constant booleans become
/// tautologies (`1=1`) or contradictions (`1=0`).
pub(crate) fn condition_text(segment: &SqlSegment<'_>) -> OrmResult<String> {
    if let Some(value) = segment.constant_value() {
        return match value.as_bool() {
            Some(true) => Ok("1=1".to_string()),
            Some(false) => Ok("1=0".to_string()),
            None => Err(OrmError::unsupported(format!(
                "a {} constant is not a predicate",
                value.type_name()
            ))),
        };
    }
    segment.sql().map(str::to_string).ok_or_else(|| {
        OrmError::unsupported(format!(
            "{} is not a predicate",
            segment.expr.kind_name()
        ))
    })
}

/// Predicates of one clause, joined with `AND`.
#[derive(Debug, Clone, Default)]
pub(crate) struct Conjunction {
    parts: Vec<(String, u8)>,
}

impl Conjunction {
    pub(crate) fn push(&mut self, (sql, precedence): (String, u8)) {
        self.parts.push((sql, precedence));
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub(crate) fn render(&self) -> Option<String> {
        match self.parts.as_slice() {
            [] => None,
            [(sql, _)] => Some(sql.clone()),
            parts => Some(
                parts
                    .iter()
                    .map(|(sql, precedence)| wrap(sql, *precedence, BinaryOp::And.precedence()))
                    .collect::<Vec<_>>()
                    .join(" AND "),
            ),
        }
    }
}

pub(crate) fn wrap(sql: &str, precedence: u8, min_precedence: u8) -> String {
    if precedence != 0 && precedence < min_precedence {
        format!("({sql})")
    } else {
        sql.to_string()
    }
}
