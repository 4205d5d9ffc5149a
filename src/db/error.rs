use thiserror::Error;

/// Error type a [`Connection`](super::Connection) reports.
pub type BackendError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum DbError {
    /// The builder was used in a way that has no SQL meaning.
    #[error("query builder misuse: {0}")]
    Logic(String),

    #[error("invalid SQL identifier `{0}`")]
    InvalidIdentifier(String),

    #[error("statement failed: {sql}")]
    Backend {
        sql: String,
        #[source]
        source: BackendError,
    },
}
