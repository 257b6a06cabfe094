use thiserror::Error;

/// Main error type for query operations
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Query parse error: {0}")]
    QueryParse(String),

    #[error("Invalid aggregation: {0}")]
    InvalidAggregation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for query operations
pub type Result<T> = std::result::Result<T, QueryError>;

impl QueryError {
    /// Message suitable for a result object returned to a caller.
    ///
    /// Parse errors surface the parser's own message without the variant prefix.
    pub fn user_message(&self) -> String {
        match self {
            QueryError::QueryParse(msg) | QueryError::InvalidAggregation(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}
