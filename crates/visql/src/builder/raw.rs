use super::Orm;
use crate::command::{CacheKey, Command, CommandKind, DbParameter, TypedInitializer, init_from_map};
use crate::connection::{Connection, execute_logged, query_logged};
use crate::error::{OrmError, OrmResult};
use crate::mapping::{EntityMap, FieldSource};
use crate::row::FromRow;
use crate::value::Value;
use std::any::TypeId;
use std::collections::HashMap;

const RAW_SQL_ENTITY: &str = "raw SQL";

/// Raw SQL with named parameters.
///
/// Only members whose `<prefix><Member>` name occurs in the SQL as a whole
/// token are bound; the rest of a source is ignored.
#[must_use = "builders do nothing until executed"]
pub struct RawSqlBuilder {
    orm: Orm,
    sql: String,
    parameters: Vec<DbParameter>,
}

impl RawSqlBuilder {
    pub(crate) fn new(orm: Orm, sql: String) -> Self {
        Self {
            orm,
            sql,
            parameters: Vec::new(),
        }
    }

    fn merge(&mut self, parameters: Vec<DbParameter>) {
        for parameter in parameters {
            match self.parameters.iter_mut().find(|p| p.name == parameter.name) {
                Some(existing) => *existing = parameter,
                None => self.parameters.push(parameter),
            }
        }
    }

    /// Bind the referenced members of `source`.
    pub fn bind<P: FieldSource>(mut self, source: &P) -> OrmResult<Self> {
        let provider = self.orm.provider();
        let key = CacheKey::new(
            CommandKind::RawSql,
            provider.provider_id(),
            TypeId::of::<()>(),
            TypeId::of::<P>(),
        )
        .with_sql(self.sql.as_str());
        let initializer = self.orm.cache().get_or_compile(key, || {
            TypedInitializer::<P>::compile(
                CommandKind::RawSql,
                provider,
                &EntityMap::new(RAW_SQL_ENTITY, ""),
                Some(&self.sql),
            )
        })?;
        let command = initializer.init(provider, source)?;
        self.merge(command.parameters);
        Ok(self)
    }

    /// Bind the referenced entries of a dictionary. Never cached.
    pub fn bind_map(mut self, values: &HashMap<String, Value>) -> OrmResult<Self> {
        let command = init_from_map(
            CommandKind::RawSql,
            self.orm.provider(),
            &EntityMap::new(RAW_SQL_ENTITY, ""),
            values,
            Some(&self.sql),
        )?;
        self.merge(command.parameters);
        Ok(self)
    }

    /// Bind one value under `<prefix><name>`, whether or not the SQL uses it.
    pub fn bind_value(mut self, name: &str, value: impl Into<Value>) -> Self {
        let provider = self.orm.provider();
        let parameter =
            provider.create_parameter(format!("{}{name}", provider.parameter_prefix()), value.into(), None);
        self.merge(vec![parameter]);
        self
    }

    pub fn to_sql(self) -> OrmResult<Command> {
        if self.sql.trim().is_empty() {
            return Err(OrmError::invalid_argument("SQL text is empty"));
        }
        Ok(Command::new(self.sql, self.parameters))
    }

    pub async fn execute<C: Connection>(self, conn: &C) -> OrmResult<u64> {
        let orm = self.orm.clone();
        let command = self.to_sql()?;
        execute_logged(conn, orm.config(), "raw_sql", &command).await
    }

    /// Rows as returned by the database, labelled by their column names.
    pub async fn fetch_all<R: FromRow, C: Connection>(self, conn: &C) -> OrmResult<Vec<R>> {
        let orm = self.orm.clone();
        let command = self.to_sql()?;
        query_logged(conn, orm.config(), "raw_sql", &command)
            .await?
            .iter()
            .map(R::from_row)
            .collect()
    }

    pub async fn fetch_first<R: FromRow, C: Connection>(self, conn: &C) -> OrmResult<Option<R>> {
        let orm = self.orm.clone();
        let command = self.to_sql()?;
        query_logged(conn, orm.config(), "raw_sql", &command)
            .await?
            .first()
            .map(R::from_row)
            .transpose()
    }
}
