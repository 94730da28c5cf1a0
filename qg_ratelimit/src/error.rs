use std::time::Duration;

use qg_types::RequestType;
use thiserror::Error;

/// Result type for rate limiting operations
pub type Result<T> = std::result::Result<T, RateLimitError>;

/// Errors that can occur during rate limiting operations
///
/// Only `InvalidConfig` is ever produced by the limiter itself; the other
/// variants exist for callers that prefer `?` over inspecting an `Admission`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RateLimitError {
    /// Rate limit exceeded - no window capacity or backing off
    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    Exceeded { retry_after: Duration },

    /// The request type is not served by the configured model
    #[error("Request type {0} is not enabled for this model")]
    RequestTypeDisabled(RequestType),

    /// Invalid configuration
    #[error("Invalid rate limiter configuration: {0}")]
    InvalidConfig(String),
}
