//! Errors raised while resolving and compiling cube queries.

use crate::store::StoreError;

/// Error type for the query layer.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// Malformed caller input: cut strings, drilldown items, missing bounds.
    #[error("{0}")]
    Argument(String),

    /// Misconfigured logical model or physical mapping.
    #[error("{0}")]
    Model(String),

    #[error("{0}")]
    Schema(String),

    #[error("No such table '{0}'")]
    NoSuchTable(String),

    #[error("No such attribute '{name}'. Available: {}", available.join(", "))]
    NoSuchAttribute { name: String, available: Vec<String> },

    #[error("{0}")]
    Hierarchy(String),

    #[error("No such {kind} '{name}'")]
    NotFound { kind: &'static str, name: String },

    #[error("Expression error: {0}")]
    Expression(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl QueryError {
    pub fn argument(msg: impl Into<String>) -> Self {
        QueryError::Argument(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        QueryError::Model(msg.into())
    }

    pub fn hierarchy(msg: impl Into<String>) -> Self {
        QueryError::Hierarchy(msg.into())
    }

    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        QueryError::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Stable short name of the error kind, as reported to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            QueryError::Argument(_) => "argument",
            QueryError::Model(_) => "model",
            QueryError::Schema(_) => "schema",
            QueryError::NoSuchTable(_) => "no_such_table",
            QueryError::NoSuchAttribute { .. } => "no_such_attribute",
            QueryError::Hierarchy(_) => "hierarchy",
            QueryError::NotFound { .. } => "not_found",
            QueryError::Expression(_) => "expression",
            QueryError::Internal(_) => "internal",
            QueryError::Store(_) => "store",
        }
    }

    /// Errors caused by the request rather than the server. Messages of the
    /// other kinds may name physical tables and columns.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            QueryError::Argument(_)
                | QueryError::Hierarchy(_)
                | QueryError::NotFound { .. }
                | QueryError::NoSuchAttribute { .. }
        )
    }
}

pub type QueryResult<T> = Result<T, QueryError>;
