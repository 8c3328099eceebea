//! Convenient imports for typical `visql` usage.
//!
//! ```ignore
//! use visql::prelude::*;
//! ```

pub use crate::{
    Connection, Entity, Expr, FieldHandle, FieldSource, FromQuery, FromRow, Lambda, MySqlProvider,
    OracleProvider, Orm, OrmConfig, OrmError, OrmResult, PostgreSqlProvider, Row,
    SqlServerProvider, Value, lambda, lambda_with_query, lambda2, lambda3,
};

#[cfg(feature = "postgres")]
pub use crate::PgConnection;
