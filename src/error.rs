use thiserror::Error;

/// Errors returned by the closure-table APIs.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("closure-table currently supports PostgreSQL connections only")]
    UnsupportedBackend,

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("node {0} does not exist")]
    NodeNotFound(i64),

    #[error("parent node {0} does not exist")]
    ParentNotFound(i64),

    #[error("moving node {node} under {target} would create a cycle")]
    CyclicMove { node: i64, target: i64 },

    #[error("path cannot be empty")]
    EmptyPath,

    #[error("closure-table invariant violation: {0}")]
    Invariant(String),
}

impl TreeError {
    pub fn invariant(detail: impl Into<String>) -> Self {
        Self::Invariant(detail.into())
    }
}
