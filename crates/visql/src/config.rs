use serde::{Deserialize, Serialize};

/// Runtime settings of an [`Orm`](crate::Orm).
///
/// Deserializable so applications can embed it in their own config files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrmConfig {
    /// Rows per batched command; larger batches are split into chunks
    /// executed one after another.
    pub batch_size: usize,
    /// Truncate logged SQL (in bytes). `None` logs the full text.
    pub max_sql_log_length: Option<usize>,
    /// Emit a `visql.sql` event before each command.
    pub log_sql: bool,
}

impl Default for OrmConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            max_sql_log_length: Some(200),
            log_sql: true,
        }
    }
}

impl OrmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the batch size. Zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_max_sql_log_length(mut self, len: usize) -> Self {
        self.max_sql_log_length = Some(len);
        self
    }

    /// Log SQL without truncation.
    pub fn no_truncate(mut self) -> Self {
        self.max_sql_log_length = None;
        self
    }

    pub fn disable_sql_log(mut self) -> Self {
        self.log_sql = false;
        self
    }
}
