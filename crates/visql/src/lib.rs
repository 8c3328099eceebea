//! # visql
//!
//! An expression-tree ORM: typed predicates and projections over mapped
//! entities compile into parameterized SQL for MySQL, PostgreSQL, SQL Server
//! and Oracle.
//!
//! ## Features
//!
//! - **Expression trees**: conditions are [`Expr`] values built through
//!   generated field handles, never SQL strings
//! - **Four dialects**: parameter prefixes, paging, identity read-back and
//!   UPDATE forms follow the [`OrmProvider`]
//! - **Command cache**: insert/delete/get/update-by-object/raw commands are
//!   compiled once per entity and parameter type
//! - **Driver-agnostic**: a [`Connection`] runs commands; [`PgConnection`]
//!   adapts `tokio-postgres` (feature `postgres`)
//!
//! ## Example
//!
//! ```ignore
//! use visql::prelude::*;
//!
//! #[derive(Entity, FromRow)]
//! #[visql(table = "order")]
//! struct Order {
//!     #[visql(key, auto_increment)]
//!     id: i64,
//!     amount: i64,
//!     buyer_id: i64,
//! }
//!
//! let orm = Orm::new(MySqlProvider::new());
//!
//! let big: Vec<Order> = orm
//!     .query::<Order>()
//!     .where_(lambda::<Order>(|o| o.amount().gt(100)))?
//!     .order_by_desc(lambda::<Order>(|o| o.id()))?
//!     .fetch_all(&conn)
//!     .await?;
//!
//! orm.create::<Order>().with_by(&order)?.execute(&conn).await?;
//! ```

extern crate self as visql;

pub mod builder;
pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod expr;
pub mod lambda;
pub mod mapping;
pub mod prelude;
pub mod provider;
pub mod row;
pub mod value;
pub mod visitor;

#[cfg(feature = "postgres")]
mod postgres;

#[cfg(test)]
mod fixtures;

pub use builder::{
    CreateBuilder, DeleteBuilder, GetBuilder, Loaded, Orm, Page, QueryBuilder, RawSqlBuilder,
    UpdateBuilder,
};
pub use command::{CacheKey, CacheStats, Command, CommandCache, CommandKind, DbParameter};
pub use config::OrmConfig;
pub use connection::Connection;
pub use error::{OrmError, OrmResult};
pub use expr::{Expr, IntoExpr, ParamId};
pub use lambda::{FromQuery, Lambda, SubQuery, lambda, lambda_with_query, lambda2, lambda3};
pub use mapping::{
    Entity, EntityMap, EntityMapProvider, EntityType, FieldAccessor, FieldHandle, FieldSource,
    MapRegistry, MemberMap, Navigation,
};
pub use provider::{
    DatabaseType, MySqlProvider, OracleProvider, OrmProvider, PostgreSqlProvider,
    SqlServerProvider,
};
pub use row::{FromRow, Row};
pub use value::{FromValue, Value};
pub use visitor::{BuiltQuery, DeleteVisitor, JoinType, QueryDef, QueryVisitor, UpdateVisitor};

#[cfg(feature = "postgres")]
pub use postgres::PgConnection;

#[cfg(feature = "derive")]
pub use visql_derive::{Entity, FieldSource, FromRow};
