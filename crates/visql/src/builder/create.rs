use super::Orm;
use crate::command::{Command, CommandKind, init_batch_from_maps, init_from_map};
use crate::connection::{Connection, execute_logged, query_logged};
use crate::error::{OrmError, OrmResult};
use crate::mapping::{Entity, FieldSource};
use crate::value::Value;
use std::collections::HashMap;
use std::marker::PhantomData;
use tracing::debug;

/// INSERT facade.
///
/// Every `with_*` call adds commands; bulk inputs are split into chunks of
/// [`OrmConfig::batch_size`](crate::OrmConfig) rows, each executed on its
/// own.
#[must_use = "builders do nothing until executed"]
pub struct CreateBuilder<T: Entity> {
    orm: Orm,
    commands: Vec<(CommandKind, Command)>,
    _marker: PhantomData<T>,
}

impl<T: Entity> CreateBuilder<T> {
    pub(crate) fn new(orm: Orm) -> Self {
        Self {
            orm,
            commands: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Insert one row bound from `source`'s members.
    pub fn with_by<P: FieldSource>(mut self, source: &P) -> OrmResult<Self> {
        let initializer = self.orm.initializer::<T, P>(CommandKind::Insert)?;
        let command = initializer.init(self.orm.provider(), source)?;
        self.commands.push((CommandKind::Insert, command));
        Ok(self)
    }

    /// Insert one row from a member-name dictionary.
    pub fn with_by_map(mut self, values: &HashMap<String, Value>) -> OrmResult<Self> {
        let map = self.orm.entity_map::<T>()?;
        let command = init_from_map(CommandKind::Insert, self.orm.provider(), &map, values, None)?;
        self.commands.push((CommandKind::Insert, command));
        Ok(self)
    }

    /// Insert many rows in batched commands.
    pub fn with_bulk<P: FieldSource>(mut self, rows: &[P]) -> OrmResult<Self> {
        if rows.is_empty() {
            return Err(OrmError::invalid_argument("batch is empty"));
        }
        let initializer = self.orm.initializer::<T, P>(CommandKind::InsertBatch)?;
        for chunk in rows.chunks(self.orm.config().batch_size.max(1)) {
            let command = initializer.init_batch(self.orm.provider(), chunk)?;
            self.commands.push((CommandKind::InsertBatch, command));
        }
        Ok(self)
    }

    /// Insert many dictionary rows; the first row decides the column set.
    pub fn with_bulk_maps(mut self, rows: &[HashMap<String, Value>]) -> OrmResult<Self> {
        if rows.is_empty() {
            return Err(OrmError::invalid_argument("batch is empty"));
        }
        let map = self.orm.entity_map::<T>()?;
        for chunk in rows.chunks(self.orm.config().batch_size.max(1)) {
            let command =
                init_batch_from_maps(CommandKind::InsertBatch, self.orm.provider(), &map, chunk)?;
            self.commands.push((CommandKind::InsertBatch, command));
        }
        Ok(self)
    }

    /// The commands `execute` would run, in order.
    pub fn to_sql(self) -> OrmResult<Vec<Command>> {
        if self.commands.is_empty() {
            return Err(OrmError::invalid_argument("nothing to insert"));
        }
        Ok(self.commands.into_iter().map(|(_, c)| c).collect())
    }

    /// Run every command and return the total number of inserted rows.
    pub async fn execute<C: Connection>(self, conn: &C) -> OrmResult<u64> {
        let config = self.orm.config().clone();
        let commands = self.to_sql()?;
        let chunks = commands.len();
        let mut affected = 0;
        for (i, command) in commands.iter().enumerate() {
            affected += execute_logged(conn, &config, "insert", command).await?;
            if chunks > 1 {
                debug!(target: "visql.sql", chunk = i + 1, chunks, "batch flushed");
            }
        }
        Ok(affected)
    }

    /// Insert a single row and return the generated key.
    ///
    /// Only valid for one non-batched insert on an auto-increment entity.
    pub async fn execute_returning_id<C: Connection>(self, conn: &C) -> OrmResult<Value> {
        let map = self.orm.entity_map::<T>()?;
        if map.auto_increment_field().is_none() {
            return Err(OrmError::invalid_argument(format!(
                "entity '{}' has no auto-increment member",
                map.type_name
            )));
        }
        let command = match self.commands.as_slice() {
            [(CommandKind::Insert, command)] => command,
            _ => {
                return Err(OrmError::invalid_argument(
                    "returning the generated key needs exactly one single-row insert",
                ));
            }
        };
        let rows = query_logged(conn, self.orm.config(), "insert", command).await?;
        let row = rows
            .first()
            .ok_or_else(|| OrmError::not_found("no generated key returned"))?;
        row.values()
            .first()
            .cloned()
            .ok_or_else(|| OrmError::not_found("no generated key returned"))
    }
}
