use thiserror::Error;

pub type UsageSyncResult<T> = Result<T, UsageSyncError>;

#[derive(Debug, Error)]
pub enum UsageSyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid time window: start {start} is not before end {end}")]
    InvalidWindow { start: i64, end: i64 },

    #[error("Result row {row_index} has {field_count} fields, expected at least {expected}")]
    Shape {
        row_index: usize,
        field_count: usize,
        expected: usize
    },

    #[error("Stack resource listing failed: {0}")]
    StackResources(String),

    #[error("Log Insights call failed: {operation} - {message}")]
    LogInsights { operation: String, message: String },

    #[error("Query {query_id} still {status} after {waited_seconds}s")]
    QueryDeadlineExceeded {
        query_id: String,
        status: String,
        waited_seconds: u64
    },

    #[error("Query {query_id} cancelled while {status}")]
    QueryCancelled { query_id: String, status: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error)
}

impl UsageSyncError {
    pub fn log_insights(operation: &str, message: impl ToString) -> Self {
        Self::LogInsights {
            operation: operation.to_string(),
            message: message.to_string()
        }
    }

    /// A disagreement between a query definition and the transformer; the run
    /// cannot be trusted and must not be retried as-is.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::Shape { .. })
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            Self::QueryDeadlineExceeded { .. } => true,
            Self::Http(e) => e.is_timeout(),
            _ => false
        }
    }
}
