use super::Orm;
use crate::command::{Command, CommandKind, init_from_map};
use crate::connection::{Connection, execute_logged};
use crate::error::{OrmError, OrmResult};
use crate::lambda::Lambda;
use crate::mapping::{Entity, FieldSource};
use crate::value::Value;
use crate::visitor::DeleteVisitor;
use std::collections::HashMap;
use std::marker::PhantomData;

/// DELETE facade: either predicates (`where_`/`and`) or keys (`by_key*`),
/// never both.
#[must_use = "builders do nothing until executed"]
pub struct DeleteBuilder<T: Entity> {
    orm: Orm,
    visitor: DeleteVisitor,
    filtered: bool,
    keyed: Vec<Command>,
    _marker: PhantomData<T>,
}

impl<T: Entity> DeleteBuilder<T> {
    pub(crate) fn new(orm: Orm) -> Self {
        let visitor = DeleteVisitor::new(
            orm.provider.clone(),
            orm.maps.clone(),
            T::entity_type(),
        );
        Self {
            orm,
            visitor,
            filtered: false,
            keyed: Vec::new(),
            _marker: PhantomData,
        }
    }

    fn ensure_predicates(&self) -> OrmResult<()> {
        if self.keyed.is_empty() {
            Ok(())
        } else {
            Err(OrmError::invalid_argument(
                "delete by key cannot be combined with where",
            ))
        }
    }

    fn ensure_keys(&self) -> OrmResult<()> {
        if self.filtered {
            Err(OrmError::invalid_argument(
                "delete by key cannot be combined with where",
            ))
        } else {
            Ok(())
        }
    }

    // ==================== Predicates ====================

    pub fn where_(mut self, predicate: Lambda) -> OrmResult<Self> {
        self.ensure_predicates()?;
        self.visitor.where_(&predicate)?;
        self.filtered = true;
        Ok(self)
    }

    pub fn and(self, predicate: Lambda) -> OrmResult<Self> {
        self.where_(predicate)
    }

    // ==================== Keys ====================

    /// Delete the row whose key members match `key`'s.
    pub fn by_key<P: FieldSource>(mut self, key: &P) -> OrmResult<Self> {
        self.ensure_keys()?;
        let initializer = self.orm.initializer::<T, P>(CommandKind::Delete)?;
        self.keyed.push(initializer.init(self.orm.provider(), key)?);
        Ok(self)
    }

    /// Delete many rows by key, in chunks of the configured batch size.
    pub fn by_keys<P: FieldSource>(mut self, keys: &[P]) -> OrmResult<Self> {
        self.ensure_keys()?;
        if keys.is_empty() {
            return Err(OrmError::invalid_argument("batch is empty"));
        }
        let initializer = self.orm.initializer::<T, P>(CommandKind::DeleteBatch)?;
        for chunk in keys.chunks(self.orm.config().batch_size.max(1)) {
            self.keyed
                .push(initializer.init_batch(self.orm.provider(), chunk)?);
        }
        Ok(self)
    }

    pub fn by_key_map(mut self, key: &HashMap<String, Value>) -> OrmResult<Self> {
        self.ensure_keys()?;
        let map = self.orm.entity_map::<T>()?;
        self.keyed.push(init_from_map(
            CommandKind::Delete,
            self.orm.provider(),
            &map,
            key,
            None,
        )?);
        Ok(self)
    }

    // ==================== Output ====================

    /// The commands `execute` would run. Without keys this is one DELETE,
    /// unfiltered when no predicate was added.
    pub fn to_sql(self) -> OrmResult<Vec<Command>> {
        if self.keyed.is_empty() {
            return Ok(vec![self.visitor.build_sql()?]);
        }
        Ok(self.keyed)
    }

    pub async fn execute<C: Connection>(self, conn: &C) -> OrmResult<u64> {
        let config = self.orm.config().clone();
        let mut affected = 0;
        for command in self.to_sql()? {
            affected += execute_logged(conn, &config, "delete", &command).await?;
        }
        Ok(affected)
    }
}
