// Generation failure taxonomy
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum GenerateError {
    /// Bad or missing credential. Fatal, never retried.
    #[error("invalid provider configuration: {0}")]
    Configuration(String),

    /// No connectivity. Fatal at pre-flight, retried mid-attempt.
    #[error("network unreachable: {0}")]
    Network(String),

    /// A single attempt exceeded its deadline. Retried.
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    /// The underlying call rejected the request. Retried.
    #[error("provider rejected the request: {0}")]
    Service(String),
}

impl GenerateError {
    /// Whether the resilient path should spend another attempt on this error.
    /// Configuration failures are terminal; everything else is transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Configuration(_))
    }
}

pub type GenerateResult<T> = std::result::Result<T, GenerateError>;
