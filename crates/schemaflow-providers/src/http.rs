// OpenAI-compatible chat-completions provider

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::error::{GenerateError, GenerateResult};
use crate::DesignProvider;

#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    /// Hard cap on a single HTTP request
    pub request_timeout: Duration,
}

impl Default for HttpProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Chat-completions client speaking the OpenAI wire shape.
pub struct HttpDesignProvider {
    config: HttpProviderConfig,
    client: Client,
}

impl HttpDesignProvider {
    pub fn new(config: HttpProviderConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl DesignProvider for HttpDesignProvider {
    fn credential(&self) -> Option<String> {
        self.config.api_key.clone()
    }

    async fn probe(&self) -> GenerateResult<()> {
        let url = format!("{}/models", normalize_base(&self.config.base_url));
        let mut req = self.client.get(url);
        if let Some(api_key) = &self.config.api_key {
            req = req.bearer_auth(api_key);
        }
        // Any HTTP response at all proves reachability; auth failures are
        // surfaced later by the real call.
        req.send().await.map_err(map_transport_error)?;
        Ok(())
    }

    async fn generate(&self, prompt: &str) -> GenerateResult<String> {
        let url = format!(
            "{}/chat/completions",
            normalize_base(&self.config.base_url)
        );
        let mut req = self
            .client
            .post(url)
            .timeout(self.config.request_timeout)
            .json(&json!({
                "model": self.config.model,
                "messages": [{"role": "user", "content": prompt}],
                "stream": false,
            }));
        if let Some(api_key) = &self.config.api_key {
            req = req.bearer_auth(api_key);
        }

        let response = req.send().await.map_err(map_transport_error)?;
        let status = response.status();
        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenerateError::Service(format!("malformed provider response: {}", e)))?;

        if !status.is_success() {
            let detail = extract_error(&value)
                .unwrap_or_else(|| format!("provider request failed with status {}", status));
            return Err(GenerateError::Service(detail));
        }
        if let Some(detail) = extract_error(&value) {
            return Err(GenerateError::Service(detail));
        }

        extract_text(&value).ok_or_else(|| {
            GenerateError::Service(format!(
                "provider returned no completion content for model `{}`",
                self.config.model
            ))
        })
    }
}

fn map_transport_error(err: reqwest::Error) -> GenerateError {
    if err.is_timeout() {
        GenerateError::Timeout(Duration::from_secs(0))
    } else if err.is_connect() {
        GenerateError::Network(err.to_string())
    } else {
        GenerateError::Service(err.to_string())
    }
}

fn normalize_base(base: &str) -> String {
    base.trim_end_matches('/').to_string()
}

fn extract_text(value: &serde_json::Value) -> Option<String> {
    let text = value
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()?;
    if text.trim().is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn extract_error(value: &serde_json::Value) -> Option<String> {
    let error = value.get("error")?;
    let message = error
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("unknown provider error");
    Some(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_completion_text() {
        let value = json!({
            "choices": [{"message": {"content": "CREATE TABLE users (id INT);"}}]
        });
        assert_eq!(
            extract_text(&value).as_deref(),
            Some("CREATE TABLE users (id INT);")
        );
    }

    #[test]
    fn empty_content_is_treated_as_missing() {
        let value = json!({"choices": [{"message": {"content": "   "}}]});
        assert!(extract_text(&value).is_none());
    }

    #[test]
    fn extracts_error_detail() {
        let value = json!({"error": {"message": "model overloaded"}});
        assert_eq!(extract_error(&value).as_deref(), Some("model overloaded"));
    }

    #[test]
    fn base_url_is_normalized() {
        assert_eq!(normalize_base("https://api.example.com/v1/"), "https://api.example.com/v1");
    }
}
