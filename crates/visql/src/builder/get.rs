use super::Orm;
use crate::command::{CacheKey, Command, CommandKind, key_parameters, select_list};
use crate::connection::{Connection, query_logged};
use crate::error::{OrmError, OrmResult};
use crate::mapping::{Entity, FieldSource};
use crate::value::Value;
use std::any::TypeId;
use std::collections::HashMap;
use std::marker::PhantomData;

/// Load one entity by key.
#[must_use = "builders do nothing until executed"]
pub struct GetBuilder<T: Entity> {
    orm: Orm,
    command: Option<Command>,
    _marker: PhantomData<T>,
}

impl<T: Entity> GetBuilder<T> {
    pub(crate) fn new(orm: Orm) -> Self {
        Self {
            orm,
            command: None,
            _marker: PhantomData,
        }
    }

    /// Key values read from `key`'s members.
    pub fn by<P: FieldSource>(mut self, key: &P) -> OrmResult<Self> {
        let initializer = self.orm.initializer::<T, P>(CommandKind::Get)?;
        self.command = Some(initializer.init(self.orm.provider(), key)?);
        Ok(self)
    }

    /// Key values read from a member-name dictionary.
    ///
    /// The SQL text is cached per entity; only the key values are bound per
    /// call.
    pub fn by_map(mut self, key: &HashMap<String, Value>) -> OrmResult<Self> {
        let map = self.orm.entity_map::<T>()?;
        let provider = self.orm.provider();
        let cache_key = CacheKey::new(
            CommandKind::Get,
            provider.provider_id(),
            TypeId::of::<T>(),
            TypeId::of::<HashMap<String, Value>>(),
        );
        let sql = self.orm.cache().get_or_insert_sql(cache_key, || {
            let prefix = provider.parameter_prefix();
            let keys = map
                .key_members()
                .map(|k| format!("{}={prefix}{}", provider.field_name(&k.field_name), k.member_name))
                .collect::<Vec<_>>();
            if keys.is_empty() {
                return Err(OrmError::Mapping(format!(
                    "entity '{}' has no key member",
                    map.type_name
                )));
            }
            Ok(format!(
                "SELECT {} FROM {} WHERE {}",
                select_list(provider, &map),
                provider.table_name(&map.table_name),
                keys.join(" AND ")
            ))
        })?;
        let parameters = key_parameters(provider, &map, key)?;
        self.command = Some(Command::new(sql.as_ref(), parameters));
        Ok(self)
    }

    pub fn to_sql(self) -> OrmResult<Command> {
        self.command
            .ok_or_else(|| OrmError::invalid_argument("get without a key"))
    }

    /// The entity, or `None` when no row has the key.
    pub async fn fetch<C: Connection>(self, conn: &C) -> OrmResult<Option<T>> {
        let map = self.orm.entity_map::<T>()?;
        let orm = self.orm.clone();
        let command = self.to_sql()?;
        let mut rows = query_logged(conn, orm.config(), "get", &command).await?;
        let labels: Vec<String> = map.columns().map(|m| m.member_name.clone()).collect();
        match rows.first_mut() {
            Some(row) => {
                row.relabel(&labels);
                T::from_row(row).map(Some)
            }
            None => Ok(None),
        }
    }
}
