use super::Orm;
use crate::command::{Command, CommandKind, init_from_map};
use crate::connection::{Connection, execute_logged};
use crate::error::{OrmError, OrmResult};
use crate::lambda::Lambda;
use crate::mapping::{Entity, FieldSource};
use crate::value::Value;
use crate::visitor::{JoinType, UpdateVisitor};
use std::collections::HashMap;
use std::marker::PhantomData;

/// UPDATE facade.
///
/// Either expression clauses (`from`, joins, `set*`, `where_`) or a single
/// by-object source (`with_by*`), which updates every non-key column by key.
#[must_use = "builders do nothing until executed"]
pub struct UpdateBuilder<T: Entity> {
    orm: Orm,
    visitor: UpdateVisitor,
    touched: bool,
    by_object: Option<Command>,
    _marker: PhantomData<T>,
}

impl<T: Entity> UpdateBuilder<T> {
    pub(crate) fn new(orm: Orm) -> Self {
        let visitor = UpdateVisitor::new(
            orm.provider.clone(),
            orm.maps.clone(),
            T::entity_type(),
        );
        Self {
            orm,
            visitor,
            touched: false,
            by_object: None,
            _marker: PhantomData,
        }
    }

    fn clause(mut self, f: impl FnOnce(&mut UpdateVisitor) -> OrmResult<()>) -> OrmResult<Self> {
        if self.by_object.is_some() {
            return Err(OrmError::invalid_argument(
                "update by object cannot be combined with other clauses",
            ));
        }
        f(&mut self.visitor)?;
        self.touched = true;
        Ok(self)
    }

    // ==================== Tables ====================

    /// Add `U` as a comma-joined source table (`UPDATE ... FROM`).
    pub fn from<U: Entity>(self) -> OrmResult<Self> {
        self.clause(|v| v.from(&[U::entity_type()]))
    }

    pub fn inner_join<U: Entity>(self, on: Lambda) -> OrmResult<Self> {
        self.clause(|v| v.join(JoinType::Inner, U::entity_type(), &on))
    }

    pub fn left_join<U: Entity>(self, on: Lambda) -> OrmResult<Self> {
        self.clause(|v| v.join(JoinType::Left, U::entity_type(), &on))
    }

    // ==================== SET ====================

    /// Assign the members of a projection (`Expr::new_object`).
    pub fn set(self, assignments: Lambda) -> OrmResult<Self> {
        self.clause(|v| v.set(&assignments))
    }

    /// Assign members from correlated sub-queries.
    pub fn set_from_query(self, assignments: Lambda) -> OrmResult<Self> {
        self.clause(|v| v.set_from_query(&assignments))
    }

    /// Assign a constant to the member `selector` reads.
    pub fn set_field(self, selector: Lambda, value: impl Into<Value>) -> OrmResult<Self> {
        let value = value.into();
        self.clause(|v| v.set_field(&selector, value))
    }

    /// Assign the expression `value` to the member `selector` reads.
    pub fn set_expr(self, selector: Lambda, value: Lambda) -> OrmResult<Self> {
        self.clause(|v| v.set_expr(&selector, &value))
    }

    // ==================== WHERE ====================

    pub fn where_(self, predicate: Lambda) -> OrmResult<Self> {
        self.clause(|v| v.where_(&predicate))
    }

    pub fn and(self, predicate: Lambda) -> OrmResult<Self> {
        self.clause(|v| v.and(&predicate))
    }

    // ==================== By object ====================

    fn ensure_by_object(&self) -> OrmResult<()> {
        if self.touched || self.by_object.is_some() {
            Err(OrmError::invalid_argument(
                "update by object cannot be combined with other clauses",
            ))
        } else {
            Ok(())
        }
    }

    /// Update every non-key column of the row keyed by `source`.
    pub fn with_by<P: FieldSource>(mut self, source: &P) -> OrmResult<Self> {
        self.ensure_by_object()?;
        let initializer = self.orm.initializer::<T, P>(CommandKind::UpdateBy)?;
        self.by_object = Some(initializer.init(self.orm.provider(), source)?);
        Ok(self)
    }

    /// Update the non-key members present in `values`, keyed by its key
    /// members.
    pub fn with_by_map(mut self, values: &HashMap<String, Value>) -> OrmResult<Self> {
        self.ensure_by_object()?;
        let map = self.orm.entity_map::<T>()?;
        self.by_object = Some(init_from_map(
            CommandKind::UpdateBy,
            self.orm.provider(),
            &map,
            values,
            None,
        )?);
        Ok(self)
    }

    // ==================== Output ====================

    pub fn to_sql(self) -> OrmResult<Command> {
        match self.by_object {
            Some(command) => Ok(command),
            None => self.visitor.build_sql(),
        }
    }

    pub async fn execute<C: Connection>(self, conn: &C) -> OrmResult<u64> {
        let config = self.orm.config().clone();
        let command = self.to_sql()?;
        execute_logged(conn, &config, "update", &command).await
    }
}
