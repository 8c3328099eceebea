//! Error types for visql

use crate::provider::DatabaseType;
use thiserror::Error;

/// Result type alias for visql operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for statement compilation and execution
#[derive(Debug, Error)]
pub enum OrmError {
    /// A required argument was missing or empty
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Entity mapping metadata is inconsistent
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// An expression referenced a member the entity does not map
    #[error("Member '{member}' is not mapped on entity '{entity}'")]
    MissingMember { entity: String, member: String },

    /// A parameter object lacks a member the statement requires
    #[error("Parameter type '{source_type}' has no member '{member}' required by entity '{entity}'")]
    MissingField {
        source_type: String,
        entity: String,
        member: String,
    },

    /// The target dialect cannot express the requested clause
    #[error("{operation} is not supported by {database:?}")]
    UnsupportedDialect {
        operation: &'static str,
        database: DatabaseType,
    },

    /// The expression cannot be translated to SQL
    #[error("Unsupported expression: {0}")]
    Unsupported(String),

    /// The connection does not support the requested operation
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Error raised by the database driver
    #[error("Driver error: {0}")]
    Driver(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl OrmError {
    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a missing member error
    pub fn missing_member(entity: impl Into<String>, member: impl Into<String>) -> Self {
        Self::MissingMember {
            entity: entity.into(),
            member: member.into(),
        }
    }

    /// Create a missing parameter field error
    pub fn missing_field(
        source_type: impl Into<String>,
        entity: impl Into<String>,
        member: impl Into<String>,
    ) -> Self {
        Self::MissingField {
            source_type: source_type.into(),
            entity: entity.into(),
            member: member.into(),
        }
    }

    /// Create an unsupported dialect error
    pub fn unsupported_dialect(operation: &'static str, database: DatabaseType) -> Self {
        Self::UnsupportedDialect {
            operation,
            database,
        }
    }

    /// Create an unsupported expression error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Check if this is a dialect or expression capability error
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnsupportedDialect { .. } | Self::Unsupported(_))
    }

    /// Check if this is a missing member/field error
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::MissingMember { .. } | Self::MissingField { .. })
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for OrmError {
    fn from(err: tokio_postgres::Error) -> Self {
        Self::Driver(Box::new(err))
    }
}
