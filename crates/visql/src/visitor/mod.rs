//! Expression visitors.
//!
//! [`SqlVisitor`] holds what every statement shares: the table list and
//! alias resolution, parameter binding and the expression walk with its
//! deferred boolean resolution. The statement visitors wrap it:
//!
//! - [`DeleteVisitor`] for `DELETE ... WHERE`
//! - [`UpdateVisitor`] for `UPDATE ... SET` and the dialect's multi-table form
//! - [`QueryVisitor`] for `SELECT`, including paging, unions and includes
//!
//! Visitors are single-use; `build_sql` consumes them.

mod base;
mod delete;
mod query;
mod segment;
mod table;
mod update;

#[cfg(test)]
mod tests;

pub use base::SqlVisitor;
pub use delete::DeleteVisitor;
pub use query::{BuiltQuery, IncludeCommand, QueryDef, QueryOp, QueryVisitor, ReaderField};
pub use segment::{DeferredExpr, SegmentValue, SqlSegment};
pub use table::{JoinType, TableSegment};
pub use update::{SetField, UpdateVisitor};
