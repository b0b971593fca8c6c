// Quick Design Client
// Single-shot, low-latency generation with caching and completeness checks

use std::sync::Arc;
use std::time::Duration;

use schemaflow_providers::{prompts::DesignPrompts, DesignProvider, GenerateError};
use schemaflow_types::DesignDomain;

use crate::cache::ResponseCache;
use crate::error::{Result, SchemaflowError};

const MAX_ATTEMPTS: u32 = 3;

/// Narrow orchestrator variant: one prompt, one response, no registry
/// involvement. Retries with exponential backoff and re-asks when the
/// response looks truncated.
pub struct QuickDesignClient {
    provider: Arc<dyn DesignProvider>,
    cache: ResponseCache,
}

impl QuickDesignClient {
    pub fn new(provider: Arc<dyn DesignProvider>) -> Self {
        Self {
            provider,
            cache: ResponseCache::new(),
        }
    }

    pub fn with_cache(provider: Arc<dyn DesignProvider>, cache: ResponseCache) -> Self {
        Self { provider, cache }
    }

    pub async fn generate(&self, request: &str, domain: DesignDomain) -> Result<String> {
        if let Some(cached) = self.cache.get(request, domain) {
            tracing::debug!(domain = domain.as_str(), "response cache hit");
            return Ok(cached);
        }

        let prompt = DesignPrompts::quick(request, domain);
        let mut last_error: Option<GenerateError> = None;

        for attempt in 1..=MAX_ATTEMPTS {
            if attempt > 1 {
                // 2^attempt seconds: 4s before the second try, 8s before the
                // third.
                let pause = Duration::from_secs(1 << attempt);
                tokio::time::sleep(pause).await;
            }

            match self.provider.generate(&prompt).await {
                Ok(response) => {
                    if response_looks_complete(&response) || attempt == MAX_ATTEMPTS {
                        if !response_looks_complete(&response) {
                            tracing::warn!(
                                attempt,
                                "returning possibly-truncated response after final attempt"
                            );
                        }
                        self.cache.put(request, domain, &response);
                        return Ok(response);
                    }
                    tracing::warn!(attempt, "response looks truncated, retrying");
                    last_error = Some(GenerateError::Service(
                        "response failed completeness validation".to_string(),
                    ));
                }
                Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                    tracing::warn!(attempt, error = %err, "generation attempt failed");
                    last_error = Some(err);
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(SchemaflowError::AllAttemptsFailed {
            attempts: MAX_ATTEMPTS,
            fallback_used: false,
            detail: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempts recorded".to_string()),
        })
    }
}

/// Flag responses that were probably cut off mid-generation: an odd number
/// of code-fence markers, a known truncation phrase at the tail, or a long
/// output that stops without any terminal punctuation.
pub(crate) fn response_looks_complete(text: &str) -> bool {
    let trimmed = text.trim_end();
    if trimmed.is_empty() {
        return false;
    }

    let fence_count = trimmed.matches("```").count();
    if fence_count % 2 != 0 {
        return false;
    }

    let tail = trimmed
        .chars()
        .rev()
        .take(80)
        .collect::<String>()
        .chars()
        .rev()
        .collect::<String>()
        .to_lowercase();
    const TRUNCATION_PHRASES: &[&str] = &[
        "to be continued",
        "i'll continue",
        "continuing in the next",
        "[continued]",
        "...",
    ];
    if TRUNCATION_PHRASES.iter().any(|p| tail.ends_with(p)) {
        return false;
    }

    // Long outputs that stop abruptly mid-sentence are suspect; short ones
    // get the benefit of the doubt.
    if trimmed.len() > 600 {
        let last = trimmed.chars().last().unwrap_or(' ');
        if !matches!(last, '.' | '!' | '?' | ':' | ';' | '`' | ')' | '}' | ']' | '|') {
            return false;
        }
    }

    true
}
