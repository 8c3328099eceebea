//! Typed expression trees.
//!
//! An [`Expr`] is the input every visitor walks. Member accesses are rooted in
//! lambda parameters ([`ParamId`]), which the visitors bind to the tables of
//! the statement being compiled. Values come in as constants, as captured
//! closures evaluated once at compile time, or as provider-rendered static
//! members such as [`Expr::now`].
//!
//! ```ignore
//! use visql::{lambda, Expr};
//!
//! let pred = lambda::<Order>(|o| o.buyer_id().eq(5).and(o.amount().gt(10)));
//! ```

use crate::value::Value;
use crate::visitor::QueryDef;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of one lambda parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamId(u64);

impl ParamId {
    /// Allocate a process-unique id.
    pub fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ParamId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A closure evaluated once, when the visitor reaches it.
#[derive(Clone)]
pub struct Captured(Arc<dyn Fn() -> Value + Send + Sync>);

impl Captured {
    pub fn evaluate(&self) -> Value {
        (self.0)()
    }
}

impl fmt::Debug for Captured {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Captured(<closure>)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Coalesce,
}

impl BinaryOp {
    /// Binding strength; higher binds tighter. `0` never needs parentheses.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Equal
            | BinaryOp::NotEqual
            | BinaryOp::GreaterThan
            | BinaryOp::GreaterThanOrEqual
            | BinaryOp::LessThan
            | BinaryOp::LessThanOrEqual => 4,
            BinaryOp::Add | BinaryOp::Subtract => 5,
            BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => 6,
            BinaryOp::Coalesce => 0,
        }
    }

    pub fn is_comparison(self) -> bool {
        self.precedence() == 4
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    /// The comparison that holds exactly when `self` does not.
    pub fn negate(self) -> Option<BinaryOp> {
        Some(match self {
            BinaryOp::Equal => BinaryOp::NotEqual,
            BinaryOp::NotEqual => BinaryOp::Equal,
            BinaryOp::GreaterThan => BinaryOp::LessThanOrEqual,
            BinaryOp::GreaterThanOrEqual => BinaryOp::LessThan,
            BinaryOp::LessThan => BinaryOp::GreaterThanOrEqual,
            BinaryOp::LessThanOrEqual => BinaryOp::GreaterThan,
            _ => return None,
        })
    }

    pub fn sql(self) -> &'static str {
        match self {
            BinaryOp::And => " AND ",
            BinaryOp::Or => " OR ",
            BinaryOp::Equal => "=",
            BinaryOp::NotEqual => "<>",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterThanOrEqual => ">=",
            BinaryOp::LessThan => "<",
            BinaryOp::LessThanOrEqual => "<=",
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Coalesce => ",",
        }
    }

    /// Whether `a op (b op c)` differs from `(a op b) op c`.
    pub(crate) fn is_left_associative_only(self) -> bool {
        matches!(
            self,
            BinaryOp::Subtract | BinaryOp::Divide | BinaryOp::Modulo
        )
    }
}

/// Functions and predicates a call node can translate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Contains,
    StartsWith,
    EndsWith,
    ToUpper,
    ToLower,
    Trim,
    Length,
    InList,
    InQuery,
    Exists,
    Count,
    CountDistinct,
    Sum,
    Avg,
    Max,
    Min,
}

impl Method {
    pub fn is_aggregate(self) -> bool {
        matches!(
            self,
            Method::Count
                | Method::CountDistinct
                | Method::Sum
                | Method::Avg
                | Method::Max
                | Method::Min
        )
    }
}

/// Shape of a projection; both render the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionKind {
    /// `new { A = .., B = .. }`
    Anonymous,
    /// `new Order { A = .., B = .. }`
    MemberInit,
}

/// Expression tree node.
#[derive(Debug, Clone)]
pub enum Expr {
    /// A lambda parameter, i.e. a whole table row.
    Parameter(ParamId),
    Member {
        object: Box<Expr>,
        member: String,
    },
    /// `x.m.has_value()` on a nullable member.
    HasValue(Box<Expr>),
    /// `x.m.value()` on a nullable member.
    NullableValue(Box<Expr>),
    Constant(Value),
    Captured(Captured),
    /// A well-known static member rendered by the provider.
    Static(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },
    Call {
        method: Method,
        object: Option<Box<Expr>>,
        args: Vec<Expr>,
    },
    Projection {
        kind: ProjectionKind,
        fields: Vec<(String, Expr)>,
    },
    Subquery(Box<QueryDef>),
}

/// Conversion into an expression operand.
pub trait IntoExpr {
    fn into_expr(self) -> Expr;
}

impl IntoExpr for Expr {
    fn into_expr(self) -> Expr {
        self
    }
}

impl IntoExpr for &Expr {
    fn into_expr(self) -> Expr {
        self.clone()
    }
}

impl IntoExpr for Value {
    fn into_expr(self) -> Expr {
        Expr::Constant(self)
    }
}

impl IntoExpr for QueryDef {
    fn into_expr(self) -> Expr {
        Expr::Subquery(Box::new(self))
    }
}

macro_rules! impl_into_expr {
    ($($ty:ty),*) => {
        $(
            impl IntoExpr for $ty {
                fn into_expr(self) -> Expr {
                    Expr::Constant(Value::from(self))
                }
            }
        )*
    };
}

impl_into_expr!(
    bool,
    i8,
    i16,
    i32,
    i64,
    u8,
    u16,
    u32,
    f32,
    f64,
    String,
    &str,
    &String,
    Vec<u8>,
    chrono::NaiveDate,
    chrono::NaiveDateTime,
    chrono::DateTime<chrono::Utc>,
    uuid::Uuid,
    serde_json::Value
);

impl<T: Into<Value>> IntoExpr for Option<T> {
    fn into_expr(self) -> Expr {
        Expr::Constant(self.into())
    }
}

impl Expr {
    // ==================== Leaves ====================

    pub fn member(param: ParamId, name: impl Into<String>) -> Expr {
        Expr::Member {
            object: Box::new(Expr::Parameter(param)),
            member: name.into(),
        }
    }

    pub fn constant(value: impl Into<Value>) -> Expr {
        Expr::Constant(value.into())
    }

    pub fn null() -> Expr {
        Expr::Constant(Value::Null)
    }

    /// A value read from a closure when the statement is compiled.
    pub fn captured<F, V>(f: F) -> Expr
    where
        F: Fn() -> V + Send + Sync + 'static,
        V: Into<Value>,
    {
        Expr::Captured(Captured(Arc::new(move || f().into())))
    }

    /// Current local timestamp, rendered by the provider (`NOW()`, `GETDATE()`, ...).
    pub fn now() -> Expr {
        Expr::Static("now".into())
    }

    pub fn utc_now() -> Expr {
        Expr::Static("utc_now".into())
    }

    pub fn today() -> Expr {
        Expr::Static("today".into())
    }

    /// Anonymous projection: `new { A = .., B = .. }`.
    pub fn new_object<I, S>(fields: I) -> Expr
    where
        I: IntoIterator<Item = (S, Expr)>,
        S: Into<String>,
    {
        Expr::Projection {
            kind: ProjectionKind::Anonymous,
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Object initializer projection: `new T { A = .., B = .. }`.
    pub fn member_init<I, S>(fields: I) -> Expr
    where
        I: IntoIterator<Item = (S, Expr)>,
        S: Into<String>,
    {
        Expr::Projection {
            kind: ProjectionKind::MemberInit,
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn case(test: impl IntoExpr, if_true: impl IntoExpr, if_false: impl IntoExpr) -> Expr {
        Expr::Conditional {
            test: Box::new(test.into_expr()),
            if_true: Box::new(if_true.into_expr()),
            if_false: Box::new(if_false.into_expr()),
        }
    }

    pub fn exists(query: impl Into<QueryDef>) -> Expr {
        Expr::Call {
            method: Method::Exists,
            object: None,
            args: vec![Expr::Subquery(Box::new(query.into()))],
        }
    }

    /// `COUNT(1)`
    pub fn count() -> Expr {
        Expr::Call {
            method: Method::Count,
            object: None,
            args: Vec::new(),
        }
    }

    // ==================== Logic ====================

    fn binary(self, op: BinaryOp, right: impl IntoExpr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(self),
            right: Box::new(right.into_expr()),
        }
    }

    pub fn and(self, other: impl IntoExpr) -> Expr {
        self.binary(BinaryOp::And, other)
    }

    pub fn or(self, other: impl IntoExpr) -> Expr {
        self.binary(BinaryOp::Or, other)
    }

    pub fn eq(self, other: impl IntoExpr) -> Expr {
        self.binary(BinaryOp::Equal, other)
    }

    pub fn ne(self, other: impl IntoExpr) -> Expr {
        self.binary(BinaryOp::NotEqual, other)
    }

    pub fn gt(self, other: impl IntoExpr) -> Expr {
        self.binary(BinaryOp::GreaterThan, other)
    }

    pub fn ge(self, other: impl IntoExpr) -> Expr {
        self.binary(BinaryOp::GreaterThanOrEqual, other)
    }

    pub fn lt(self, other: impl IntoExpr) -> Expr {
        self.binary(BinaryOp::LessThan, other)
    }

    pub fn le(self, other: impl IntoExpr) -> Expr {
        self.binary(BinaryOp::LessThanOrEqual, other)
    }

    pub fn is_null(self) -> Expr {
        self.eq(Expr::null())
    }

    pub fn is_not_null(self) -> Expr {
        self.ne(Expr::null())
    }

    /// `a ?? b`
    pub fn coalesce(self, other: impl IntoExpr) -> Expr {
        self.binary(BinaryOp::Coalesce, other)
    }

    // ==================== Nullable members ====================

    pub fn has_value(self) -> Expr {
        Expr::HasValue(Box::new(self))
    }

    pub fn value(self) -> Expr {
        Expr::NullableValue(Box::new(self))
    }

    // ==================== Calls ====================

    fn call(self, method: Method, args: Vec<Expr>) -> Expr {
        Expr::Call {
            method,
            object: Some(Box::new(self)),
            args,
        }
    }

    pub fn contains(self, pattern: impl IntoExpr) -> Expr {
        self.call(Method::Contains, vec![pattern.into_expr()])
    }

    pub fn starts_with(self, pattern: impl IntoExpr) -> Expr {
        self.call(Method::StartsWith, vec![pattern.into_expr()])
    }

    pub fn ends_with(self, pattern: impl IntoExpr) -> Expr {
        self.call(Method::EndsWith, vec![pattern.into_expr()])
    }

    pub fn to_upper(self) -> Expr {
        self.call(Method::ToUpper, Vec::new())
    }

    pub fn to_lower(self) -> Expr {
        self.call(Method::ToLower, Vec::new())
    }

    pub fn trim(self) -> Expr {
        self.call(Method::Trim, Vec::new())
    }

    pub fn len(self) -> Expr {
        self.call(Method::Length, Vec::new())
    }

    /// `self IN (v0, v1, ...)`; an empty list never matches.
    pub fn in_list<I>(self, values: I) -> Expr
    where
        I: IntoIterator,
        I::Item: IntoExpr,
    {
        let args = values.into_iter().map(IntoExpr::into_expr).collect();
        self.call(Method::InList, args)
    }

    pub fn in_query(self, query: impl Into<QueryDef>) -> Expr {
        self.call(Method::InQuery, vec![Expr::Subquery(Box::new(query.into()))])
    }

    pub fn count_distinct(self) -> Expr {
        self.call(Method::CountDistinct, Vec::new())
    }

    pub fn sum(self) -> Expr {
        self.call(Method::Sum, Vec::new())
    }

    pub fn avg(self) -> Expr {
        self.call(Method::Avg, Vec::new())
    }

    pub fn max(self) -> Expr {
        self.call(Method::Max, Vec::new())
    }

    pub fn min(self) -> Expr {
        self.call(Method::Min, Vec::new())
    }

    // ==================== Inspection ====================

    /// Short node name for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Expr::Parameter(_) => "parameter",
            Expr::Member { .. } => "member access",
            Expr::HasValue(_) => "has_value",
            Expr::NullableValue(_) => "nullable value",
            Expr::Constant(_) => "constant",
            Expr::Captured(_) => "captured value",
            Expr::Static(_) => "static member",
            Expr::Unary { .. } => "unary expression",
            Expr::Binary { .. } => "binary expression",
            Expr::Conditional { .. } => "conditional",
            Expr::Call { .. } => "method call",
            Expr::Projection { .. } => "projection",
            Expr::Subquery(_) => "sub-query",
        }
    }

    /// Every lambda parameter this tree references, sub-queries included.
    pub fn referenced_params(&self) -> HashSet<ParamId> {
        let mut out = HashSet::new();
        self.collect_params(&mut out);
        out
    }

    pub(crate) fn collect_params(&self, out: &mut HashSet<ParamId>) {
        match self {
            Expr::Parameter(id) => {
                out.insert(*id);
            }
            Expr::Member { object, .. } => object.collect_params(out),
            Expr::HasValue(inner) | Expr::NullableValue(inner) => inner.collect_params(out),
            Expr::Constant(_) | Expr::Captured(_) | Expr::Static(_) => {}
            Expr::Unary { operand, .. } => operand.collect_params(out),
            Expr::Binary { left, right, .. } => {
                left.collect_params(out);
                right.collect_params(out);
            }
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => {
                test.collect_params(out);
                if_true.collect_params(out);
                if_false.collect_params(out);
            }
            Expr::Call { object, args, .. } => {
                if let Some(object) = object {
                    object.collect_params(out);
                }
                for arg in args {
                    arg.collect_params(out);
                }
            }
            Expr::Projection { fields, .. } => {
                for (_, expr) in fields {
                    expr.collect_params(out);
                }
            }
            Expr::Subquery(query) => query.collect_params(out),
        }
    }
}

impl std::ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(self),
        }
    }
}

impl std::ops::Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::Negate,
            operand: Box::new(self),
        }
    }
}

macro_rules! impl_arith {
    ($($trait:ident, $method:ident, $op:ident;)*) => {
        $(
            impl<T: IntoExpr> std::ops::$trait<T> for Expr {
                type Output = Expr;

                fn $method(self, rhs: T) -> Expr {
                    self.binary(BinaryOp::$op, rhs)
                }
            }
        )*
    };
}

impl_arith! {
    Add, add, Add;
    Sub, sub, Subtract;
    Mul, mul, Multiply;
    Div, div, Divide;
    Rem, rem, Modulo;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn referenced_params_walks_the_tree() {
        let a = ParamId::fresh();
        let b = ParamId::fresh();
        let unused = ParamId::fresh();
        let expr = Expr::member(a, "Id")
            .eq(Expr::member(b, "OrderId"))
            .and(!Expr::member(a, "Deleted"));
        let params = expr.referenced_params();
        assert!(params.contains(&a));
        assert!(params.contains(&b));
        assert!(!params.contains(&unused));
    }

    #[test]
    fn comparison_negation_round_trips() {
        for op in [
            BinaryOp::Equal,
            BinaryOp::NotEqual,
            BinaryOp::GreaterThan,
            BinaryOp::GreaterThanOrEqual,
            BinaryOp::LessThan,
            BinaryOp::LessThanOrEqual,
        ] {
            assert_eq!(op.negate().and_then(BinaryOp::negate), Some(op));
        }
        assert_eq!(BinaryOp::And.negate(), None);
    }

    #[test]
    fn captured_is_evaluated_on_demand() {
        let expr = Expr::captured(|| 41 + 1);
        let Expr::Captured(c) = expr else {
            panic!("expected captured");
        };
        assert_eq!(c.evaluate(), Value::Int(42));
    }
}
