use crate::config::ProviderConfig;
use crate::providers::traits::{ChatMessage, ChatResponse as ProviderChatResponse, Provider, TokenUsage};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// OpenAI-compatible `/chat/completions` client.
pub struct OpenAiProvider {
    base_url: String,
    credential: Option<String>,
    max_tokens_override: Option<u32>,
    timeout_secs: u64,
    connect_timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageInfo {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: Option<u64>,
}

impl From<UsageInfo> for TokenUsage {
    fn from(u: UsageInfo) -> Self {
        Self {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u
                .total_tokens
                .unwrap_or(u.prompt_tokens + u.completion_tokens),
        }
    }
}

impl OpenAiProvider {
    pub fn new(credential: Option<&str>) -> Self {
        Self::with_base_url(None, credential)
    }

    /// Create a provider with an optional custom base URL.
    /// Defaults to `https://api.openai.com/v1` when `base_url` is `None`.
    pub fn with_base_url(base_url: Option<&str>, credential: Option<&str>) -> Self {
        Self {
            base_url: base_url
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            credential: credential
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(ToString::to_string),
            max_tokens_override: None,
            timeout_secs: 60,
            connect_timeout_secs: 10,
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        let mut provider =
            Self::with_base_url(Some(&config.api_url), config.api_key.as_deref());
        provider.max_tokens_override = config.max_tokens.filter(|value| *value > 0);
        provider.timeout_secs = config.timeout_secs;
        provider.connect_timeout_secs = config.connect_timeout_secs;
        provider
    }

    fn http_client(&self) -> Client {
        crate::config::build_client_with_timeouts(
            "provider.openai",
            self.timeout_secs,
            self.connect_timeout_secs,
        )
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        model: &str,
        temperature: f64,
    ) -> anyhow::Result<ProviderChatResponse> {
        let credential = self.credential.as_ref().ok_or_else(|| {
            anyhow::anyhow!("OpenAI API key not set. Set OPENAI_API_KEY or edit config.toml.")
        })?;

        let request = ChatRequest {
            model,
            messages,
            temperature,
            max_tokens: self.max_tokens_override,
        };

        let response = self
            .http_client()
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {credential}"))
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("OpenAI request failed: {}", e.without_url()))?;

        if !response.status().is_success() {
            return Err(super::api_error("OpenAI", response).await);
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Malformed OpenAI response: {}", e.without_url()))?;

        let text = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("No response from OpenAI"))?;

        Ok(ProviderChatResponse {
            text,
            usage: chat_response.usage.map(TokenUsage::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_with_key() {
        let p = OpenAiProvider::new(Some("openai-test-credential"));
        assert_eq!(p.credential.as_deref(), Some("openai-test-credential"));
    }

    #[test]
    fn empty_key_counts_as_missing() {
        let p = OpenAiProvider::new(Some("  "));
        assert!(p.credential.is_none());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let p = OpenAiProvider::with_base_url(Some("http://localhost:8080/v1/"), None);
        assert_eq!(p.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn from_config_carries_timeouts_and_max_tokens() {
        let config = ProviderConfig {
            api_key: Some("k".into()),
            max_tokens: Some(0),
            timeout_secs: 5,
            ..ProviderConfig::default()
        };
        let p = OpenAiProvider::from_config(&config);
        assert_eq!(p.timeout_secs, 5);
        assert!(p.max_tokens_override.is_none());
    }

    #[tokio::test]
    async fn chat_fails_without_key() {
        let p = OpenAiProvider::new(None);
        let result = p
            .chat(&[ChatMessage::user("hello")], "gpt-3.5-turbo", 0.7)
            .await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not set"));
    }

    #[test]
    fn request_serializes_messages_in_order() {
        let messages = vec![ChatMessage::system("You are a shop"), ChatMessage::user("hello")];
        let req = ChatRequest {
            model: "gpt-3.5-turbo",
            messages: &messages,
            temperature: 0.7,
            max_tokens: None,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"role\":\"system\""));
        assert!(json.contains("\"role\":\"user\""));
        assert!(!json.contains("max_tokens"));
        assert!(json.find("system").unwrap() < json.find("user").unwrap());
    }

    #[test]
    fn response_parses_usage_and_derives_total() {
        let json = r#"{"choices":[{"message":{"content":"Hi!"}}],"usage":{"prompt_tokens":10,"completion_tokens":5}}"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        let usage = TokenUsage::from(resp.usage.unwrap());
        assert_eq!(usage.total_tokens, 15);
        assert_eq!(resp.choices[0].message.content.as_deref(), Some("Hi!"));
    }

    #[test]
    fn response_without_usage_parses() {
        let json = r#"{"choices":[{"message":{"content":"Hi!"}}]}"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        assert!(resp.usage.is_none());
    }
}
