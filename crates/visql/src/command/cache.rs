use super::CacheKey;
use super::initializer::TypedInitializer;
use crate::error::{OrmError, OrmResult};
use dashmap::DashMap;
use std::any::Any;
use std::sync::{Arc, OnceLock};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Process-wide store of compiled initializers and SQL text.
///
/// Entries are immutable and never evicted. Two threads compiling the same
/// key concurrently both succeed; the first stored entry wins and the other
/// compilation is dropped.
#[derive(Default)]
pub struct CommandCache {
    initializers: DashMap<CacheKey, Arc<dyn Any + Send + Sync>>,
    sql_texts: DashMap<CacheKey, Arc<str>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Counters exposed for tests and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub initializers: usize,
    pub sql_texts: usize,
}

impl std::fmt::Debug for CommandCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandCache")
            .field("stats", &self.stats())
            .finish()
    }
}

impl CommandCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache used by [`Orm::new`](crate::Orm::new).
    pub fn shared() -> Arc<CommandCache> {
        static SHARED: OnceLock<Arc<CommandCache>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(CommandCache::new())))
    }

    /// The initializer for `key`, compiling it on a miss.
    pub fn get_or_compile<P: Send + Sync + 'static>(
        &self,
        key: CacheKey,
        compile: impl FnOnce() -> OrmResult<TypedInitializer<P>>,
    ) -> OrmResult<Arc<TypedInitializer<P>>> {
        if let Some(entry) = self.initializers.get(&key) {
            let entry = Arc::clone(entry.value());
            if let Ok(initializer) = entry.downcast::<TypedInitializer<P>>() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(initializer);
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        trace!(
            target: "visql.cache",
            kind = key.kind.as_str(),
            parameter = std::any::type_name::<P>(),
            "compiling command initializer"
        );
        let compiled: Arc<dyn Any + Send + Sync> = Arc::new(compile()?);
        let stored = Arc::clone(self.initializers.entry(key).or_insert(compiled).value());
        stored
            .downcast::<TypedInitializer<P>>()
            .map_err(|_| OrmError::Other("command cache entry has an unexpected type".into()))
    }

    /// Cached SQL text for `key`, building it on a miss.
    pub fn get_or_insert_sql(
        &self,
        key: CacheKey,
        build: impl FnOnce() -> OrmResult<String>,
    ) -> OrmResult<Arc<str>> {
        if let Some(sql) = self.sql_texts.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(sql.value()));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        trace!(target: "visql.cache", kind = key.kind.as_str(), "building SQL text");
        let sql: Arc<str> = Arc::from(build()?);
        Ok(Arc::clone(self.sql_texts.entry(key).or_insert(sql).value()))
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            initializers: self.initializers.len(),
            sql_texts: self.sql_texts.len(),
        }
    }
}
