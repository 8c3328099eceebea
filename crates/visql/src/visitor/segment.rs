//! Per-node traversal state.

use crate::expr::Expr;
use crate::mapping::MemberMap;
use crate::value::Value;
use std::sync::Arc;

/// One pending boolean transformation.
///
/// Pushed when a boolean operator cannot be rendered until its terminal
/// operand is known; popped LIFO by
/// [`SqlVisitor::visit_boolean_deferred`](super::SqlVisitor).
#[derive(Debug, Clone, PartialEq)]
pub enum DeferredExpr {
    Not,
    /// Compare the resolved operand with a value (`NULL` renders `IS NULL`).
    Equal(Value),
}

/// Resolved value of a segment.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SegmentValue {
    #[default]
    Empty,
    Sql(String),
    Constant(Value),
}

/// The result of visiting one expression node.
#[derive(Debug, Clone)]
pub struct SqlSegment<'e> {
    pub expr: &'e Expr,
    pub value: SegmentValue,
    /// A mapped column contributed to the value.
    pub has_field: bool,
    pub is_constant: bool,
    /// The value is a bound parameter name.
    pub is_parameter: bool,
    /// The value is composite SQL rather than a single column.
    pub is_expression: bool,
    /// The segment sits in a predicate slot (WHERE, ON, HAVING, AND/OR operand).
    pub is_condition: bool,
    /// The value is known to be character data.
    pub is_string: bool,
    /// The value already is a boolean predicate.
    pub is_predicate: bool,
    /// Binding strength of the outermost operator; `0` is atomic.
    pub precedence: u8,
    pub deferred: Vec<DeferredExpr>,
    /// Index of the table the member resolved against, for local tables.
    pub table: Option<usize>,
    pub member: Option<Arc<MemberMap>>,
}

impl<'e> SqlSegment<'e> {
    /// A segment in value position.
    pub fn new(expr: &'e Expr) -> Self {
        Self {
            expr,
            value: SegmentValue::Empty,
            has_field: false,
            is_constant: false,
            is_parameter: false,
            is_expression: false,
            is_condition: false,
            is_string: false,
            is_predicate: false,
            precedence: 0,
            deferred: Vec::new(),
            table: None,
            member: None,
        }
    }

    /// A segment in predicate position.
    pub fn condition(expr: &'e Expr) -> Self {
        let mut segment = Self::new(expr);
        segment.is_condition = true;
        segment
    }

    /// Child segment for `expr`, taking over the deferred stack.
    pub fn next(&mut self, expr: &'e Expr) -> SqlSegment<'e> {
        let mut child = SqlSegment::new(expr);
        child.is_condition = self.is_condition;
        child.deferred = std::mem::take(&mut self.deferred);
        child
    }

    pub fn push(&mut self, deferred: DeferredExpr) {
        self.deferred.push(deferred);
    }

    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    /// Resolve to SQL text.
    pub fn change(mut self, sql: impl Into<String>) -> Self {
        self.value = SegmentValue::Sql(sql.into());
        self.is_constant = false;
        self
    }

    /// Resolve to a constant.
    pub fn change_constant(mut self, value: Value) -> Self {
        self.is_string = matches!(value, Value::String(_));
        self.value = SegmentValue::Constant(value);
        self.is_constant = true;
        self.is_parameter = false;
        self.is_predicate = false;
        self.precedence = 0;
        self
    }

    /// Mark as a composite expression with the given operator strength.
    pub fn expression(mut self, precedence: u8) -> Self {
        self.is_expression = true;
        self.precedence = precedence;
        self
    }

    /// Mark as a rendered boolean predicate.
    pub fn predicate(mut self, precedence: u8) -> Self {
        self.is_predicate = true;
        self.is_expression = true;
        self.precedence = precedence;
        self
    }

    pub fn constant_value(&self) -> Option<&Value> {
        match &self.value {
            SegmentValue::Constant(v) => Some(v),
            _ => None,
        }
    }

    /// Boolean view of a constant segment.
    pub fn constant_bool(&self) -> Option<bool> {
        self.constant_value().and_then(Value::as_bool)
    }

    pub fn sql(&self) -> Option<&str> {
        match &self.value {
            SegmentValue::Sql(s) => Some(s),
            _ => None,
        }
    }

    /// Drain the deferred stack when it holds only negations, returning
    /// whether an odd number was pending.
    pub(crate) fn take_negation(&mut self) -> Option<bool> {
        if self.deferred.iter().any(|d| !matches!(d, DeferredExpr::Not)) {
            return None;
        }
        let negated = self.deferred.len() % 2 == 1;
        self.deferred.clear();
        Some(negated)
    }
}
