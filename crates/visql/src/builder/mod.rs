//! Fluent facades.
//!
//! Each facade is single-use: clauses are compiled as they are added (so a
//! dialect that cannot express a clause fails at that call), and `to_sql` or
//! `execute`/`fetch_*` consume it. `to_sql` never touches a connection.
//!
//! ```ignore
//! let orm = Orm::new(MySqlProvider::new());
//! let cmd = orm
//!     .delete::<Order>()
//!     .where_(lambda::<Order>(|o| o.amount().lt(10)))?
//!     .to_sql()?;
//! ```

mod create;
mod delete;
mod get;
mod query;
mod raw;
mod update;

pub use create::CreateBuilder;
pub use delete::DeleteBuilder;
pub use get::GetBuilder;
pub use query::{Loaded, Page, QueryBuilder};
pub use raw::RawSqlBuilder;
pub use update::UpdateBuilder;

use crate::command::{CacheKey, CommandCache, CommandKind, TypedInitializer};
use crate::config::OrmConfig;
use crate::error::OrmResult;
use crate::mapping::{Entity, EntityMap, EntityMapProvider, EntityType, FieldSource, MapRegistry};
use crate::provider::OrmProvider;
use std::any::TypeId;
use std::sync::Arc;

/// Entry point: a dialect provider, an entity-map store, a command cache and
/// runtime settings.
///
/// Cheap to clone; clones share the map store and the cache.
#[derive(Clone)]
pub struct Orm {
    provider: Arc<dyn OrmProvider>,
    maps: Arc<dyn EntityMapProvider>,
    cache: Arc<CommandCache>,
    config: OrmConfig,
}

impl std::fmt::Debug for Orm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orm")
            .field("database", &self.provider.database_type())
            .field("config", &self.config)
            .finish()
    }
}

impl Orm {
    /// An `Orm` with derived entity maps, the process-wide command cache and
    /// default settings.
    pub fn new(provider: impl OrmProvider + 'static) -> Self {
        Self {
            provider: Arc::new(provider),
            maps: Arc::new(MapRegistry::new()),
            cache: CommandCache::shared(),
            config: OrmConfig::default(),
        }
    }

    pub fn with_config(mut self, config: OrmConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_maps(mut self, maps: Arc<dyn EntityMapProvider>) -> Self {
        self.maps = maps;
        self
    }

    /// Use a private cache instead of the process-wide one.
    pub fn with_cache(mut self, cache: Arc<CommandCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn provider(&self) -> &dyn OrmProvider {
        self.provider.as_ref()
    }

    pub fn maps(&self) -> &Arc<dyn EntityMapProvider> {
        &self.maps
    }

    pub fn cache(&self) -> &Arc<CommandCache> {
        &self.cache
    }

    pub fn config(&self) -> &OrmConfig {
        &self.config
    }

    // ==================== Facades ====================

    pub fn create<T: Entity>(&self) -> CreateBuilder<T> {
        CreateBuilder::new(self.clone())
    }

    pub fn delete<T: Entity>(&self) -> DeleteBuilder<T> {
        DeleteBuilder::new(self.clone())
    }

    pub fn update<T: Entity>(&self) -> UpdateBuilder<T> {
        UpdateBuilder::new(self.clone())
    }

    pub fn query<T: Entity>(&self) -> QueryBuilder<T> {
        QueryBuilder::new(self.clone())
    }

    pub fn get<T: Entity>(&self) -> GetBuilder<T> {
        GetBuilder::new(self.clone())
    }

    /// Raw SQL with named parameters bound from values.
    pub fn sql(&self, sql: impl Into<String>) -> RawSqlBuilder {
        RawSqlBuilder::new(self.clone(), sql.into())
    }

    // ==================== Internals ====================

    pub(crate) fn entity_map<T: Entity>(&self) -> OrmResult<Arc<EntityMap>> {
        self.maps.entity_map(&EntityType::of::<T>())
    }

    /// The cached initializer binding `P` into a `kind` command on `T`.
    pub(crate) fn initializer<T: Entity, P: FieldSource>(
        &self,
        kind: CommandKind,
    ) -> OrmResult<Arc<TypedInitializer<P>>> {
        let key = CacheKey::new(
            kind,
            self.provider.provider_id(),
            TypeId::of::<T>(),
            TypeId::of::<P>(),
        );
        self.cache.get_or_compile(key, || {
            let map = self.entity_map::<T>()?;
            TypedInitializer::compile(kind, self.provider.as_ref(), &map, None)
        })
    }
}
