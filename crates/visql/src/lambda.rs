//! Lambdas: expression bodies with typed table parameters.
//!
//! Each entity parameter of a [`Lambda`] stands for one table of the
//! statement it is passed to, matched by position. A query-builder parameter
//! ([`FromQuery`]) stands for nothing; it only builds sub-queries.
//!
//! ```ignore
//! let on = lambda2::<Order, Buyer>(|o, b| o.buyer_id().eq(b.id()));
//! let total = lambda_with_query::<Order>(|o, q| {
//!     Expr::new_object([(
//!         "Total",
//!         q.from::<Detail>()
//!             .where_(|d| d.order_id().eq(o.id()))
//!             .select(|d| d.amount().sum())
//!             .into_expr(),
//!     )])
//! });
//! ```

use crate::expr::{Expr, IntoExpr, ParamId};
use crate::mapping::{Entity, EntityType, FieldHandle};
use crate::visitor::{QueryDef, QueryOp};
use std::collections::HashSet;
use std::marker::PhantomData;

/// One lambda parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LambdaParam {
    Entity { id: ParamId, entity: EntityType },
    QueryBuilder { id: ParamId },
}

impl LambdaParam {
    pub fn entity<T: Entity>(id: ParamId) -> Self {
        LambdaParam::Entity {
            id,
            entity: EntityType::of::<T>(),
        }
    }

    pub fn id(&self) -> ParamId {
        match self {
            LambdaParam::Entity { id, .. } | LambdaParam::QueryBuilder { id } => *id,
        }
    }
}

/// A body expression plus the parameters it is written against.
#[derive(Debug, Clone)]
pub struct Lambda {
    params: Vec<LambdaParam>,
    body: Expr,
}

impl Lambda {
    pub fn new(params: Vec<LambdaParam>, body: Expr) -> Self {
        Self { params, body }
    }

    pub fn params(&self) -> &[LambdaParam] {
        &self.params
    }

    pub fn body(&self) -> &Expr {
        &self.body
    }

    /// Parameters the body actually uses.
    pub fn referenced(&self) -> HashSet<ParamId> {
        self.body.referenced_params()
    }

    /// Whether the body builds a sub-query from a query-builder parameter.
    pub fn uses_query_builder(&self) -> bool {
        let referenced = self.referenced();
        self.params.iter().any(|p| {
            matches!(p, LambdaParam::QueryBuilder { id } if referenced.contains(id))
        })
    }
}

/// `|x: T| body`
pub fn lambda<T: Entity>(f: impl FnOnce(T::Fields) -> Expr) -> Lambda {
    let id = ParamId::fresh();
    let body = f(T::Fields::from_param(id));
    Lambda::new(vec![LambdaParam::entity::<T>(id)], body)
}

/// `|x: T, y: U| body`
pub fn lambda2<T: Entity, U: Entity>(f: impl FnOnce(T::Fields, U::Fields) -> Expr) -> Lambda {
    let (t, u) = (ParamId::fresh(), ParamId::fresh());
    let body = f(T::Fields::from_param(t), U::Fields::from_param(u));
    Lambda::new(
        vec![LambdaParam::entity::<T>(t), LambdaParam::entity::<U>(u)],
        body,
    )
}

/// `|x: T, y: U, z: V| body`
pub fn lambda3<T: Entity, U: Entity, V: Entity>(
    f: impl FnOnce(T::Fields, U::Fields, V::Fields) -> Expr,
) -> Lambda {
    let (t, u, v) = (ParamId::fresh(), ParamId::fresh(), ParamId::fresh());
    let body = f(
        T::Fields::from_param(t),
        U::Fields::from_param(u),
        V::Fields::from_param(v),
    );
    Lambda::new(
        vec![
            LambdaParam::entity::<T>(t),
            LambdaParam::entity::<U>(u),
            LambdaParam::entity::<V>(v),
        ],
        body,
    )
}

/// `|x: T, q: FromQuery| body`, for bodies containing correlated sub-queries.
pub fn lambda_with_query<T: Entity>(f: impl FnOnce(T::Fields, FromQuery) -> Expr) -> Lambda {
    let (t, q) = (ParamId::fresh(), ParamId::fresh());
    let body = f(T::Fields::from_param(t), FromQuery { id: q });
    Lambda::new(
        vec![
            LambdaParam::entity::<T>(t),
            LambdaParam::QueryBuilder { id: q },
        ],
        body,
    )
}

/// Query-builder parameter handed to [`lambda_with_query`] bodies.
#[derive(Debug, Clone, Copy)]
pub struct FromQuery {
    id: ParamId,
}

impl FromQuery {
    /// A standalone query builder, for sub-queries that need no correlation.
    pub fn detached() -> Self {
        Self {
            id: ParamId::fresh(),
        }
    }

    pub fn from<E: Entity>(&self) -> SubQuery<E> {
        SubQuery {
            def: QueryDef::new(EntityType::of::<E>()).with_origin(self.id),
            id: ParamId::fresh(),
            _marker: PhantomData,
        }
    }
}

/// A single-table sub-query under construction.
///
/// Bodies may reference the outer lambda's field handles; those references
/// resolve against the enclosing statement's aliases.
#[derive(Debug)]
pub struct SubQuery<E: Entity> {
    def: QueryDef,
    id: ParamId,
    _marker: PhantomData<E>,
}

impl<E: Entity> SubQuery<E> {
    fn lambda(&self, f: impl FnOnce(E::Fields) -> Expr) -> Lambda {
        let body = f(E::Fields::from_param(self.id));
        Lambda::new(vec![LambdaParam::entity::<E>(self.id)], body)
    }

    fn op(mut self, op: QueryOp) -> Self {
        self.def.push(op);
        self
    }

    pub fn where_(self, f: impl FnOnce(E::Fields) -> Expr) -> Self {
        let l = self.lambda(f);
        self.op(QueryOp::Where(l))
    }

    pub fn and(self, f: impl FnOnce(E::Fields) -> Expr) -> Self {
        let l = self.lambda(f);
        self.op(QueryOp::And(l))
    }

    pub fn group_by(self, f: impl FnOnce(E::Fields) -> Expr) -> Self {
        let l = self.lambda(f);
        self.op(QueryOp::GroupBy(l))
    }

    pub fn having(self, f: impl FnOnce(E::Fields) -> Expr) -> Self {
        let l = self.lambda(f);
        self.op(QueryOp::Having(l))
    }

    pub fn order_by(self, f: impl FnOnce(E::Fields) -> Expr) -> Self {
        let lambda = self.lambda(f);
        self.op(QueryOp::OrderBy {
            lambda,
            descending: false,
        })
    }

    pub fn order_by_desc(self, f: impl FnOnce(E::Fields) -> Expr) -> Self {
        let lambda = self.lambda(f);
        self.op(QueryOp::OrderBy {
            lambda,
            descending: true,
        })
    }

    pub fn select(self, f: impl FnOnce(E::Fields) -> Expr) -> Self {
        let l = self.lambda(f);
        self.op(QueryOp::Select(l))
    }

    pub fn distinct(self) -> Self {
        self.op(QueryOp::Distinct)
    }

    pub fn take(self, n: u64) -> Self {
        self.op(QueryOp::Take(n))
    }

    /// Select `COUNT(1)`.
    pub fn count(self) -> Self {
        self.select(|_| Expr::count())
    }

    pub fn into_def(self) -> QueryDef {
        self.def
    }
}

impl<E: Entity> From<SubQuery<E>> for QueryDef {
    fn from(query: SubQuery<E>) -> Self {
        query.def
    }
}

impl<E: Entity> IntoExpr for SubQuery<E> {
    fn into_expr(self) -> Expr {
        Expr::Subquery(Box::new(self.def))
    }
}
