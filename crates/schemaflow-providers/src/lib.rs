use async_trait::async_trait;

mod error;
mod http;
pub mod prompts;

pub use error::{GenerateError, GenerateResult};
pub use http::{HttpDesignProvider, HttpProviderConfig};

/// The opaque remote generation collaborator.
///
/// The engine treats `generate` as a black box: prompt in, text out, failing
/// with one of the taxonomy variants in [`GenerateError`]. Implementations
/// must be safe to call from multiple in-flight attempts at once.
#[async_trait]
pub trait DesignProvider: Send + Sync {
    /// The configured credential, if any. Used for pre-flight shape checks
    /// only; never logged.
    fn credential(&self) -> Option<String>;

    /// Lightweight reachability probe. Callers bound this with their own
    /// timeout; implementations should keep it cheap.
    async fn probe(&self) -> GenerateResult<()>;

    /// Produce text for a prompt.
    async fn generate(&self, prompt: &str) -> GenerateResult<String>;
}
