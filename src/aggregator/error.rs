//! Aggregator Errors

/// Result type for aggregator calls
pub type AggregatorResult<T> = Result<T, AggregatorError>;

#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    /// Non-success response carrying the aggregator's own error body
    #[error("{error_code}: {error_message}")]
    Upstream {
        status: u16,
        error_type: String,
        error_code: String,
        error_message: String,
        display_message: Option<String>,
    },

    #[error("Aggregator request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected aggregator response: {0}")]
    Decode(String),
}

impl AggregatorError {
    /// Aggregator error code, when the failure came from the aggregator itself
    pub fn code(&self) -> Option<&str> {
        match self {
            AggregatorError::Upstream { error_code, .. } => Some(error_code),
            _ => None,
        }
    }

    /// Human readable detail suitable for a client response
    pub fn message(&self) -> String {
        match self {
            AggregatorError::Upstream {
                error_message,
                display_message,
                ..
            } => display_message
                .clone()
                .unwrap_or_else(|| error_message.clone()),
            other => other.to_string(),
        }
    }
}
