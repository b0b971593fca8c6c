// Schemaflow Error Types
use schemaflow_providers::GenerateError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchemaflowError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("all generation attempts failed after {attempts} attempts (fallback used: {fallback_used}): {detail}")]
    AllAttemptsFailed {
        attempts: u32,
        fallback_used: bool,
        detail: String,
    },

    #[error("invalid session state: {0}")]
    InvalidState(String),

    #[error("aggregation failed: {0}")]
    Aggregation(String),

    #[error(transparent)]
    Generate(#[from] GenerateError),
}

pub type Result<T> = std::result::Result<T, SchemaflowError>;
