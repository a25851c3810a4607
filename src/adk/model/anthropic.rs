// SPDX-License-Identifier: MIT

//! Anthropic Model - Claude Messages API implementation

use super::{http_client, Content, GenerationConfig, Model, Part};
use crate::adk::error::TransportError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::env;
use std::time::Duration;

const PROVIDER: &str = "anthropic";

/// Anthropic Claude model implementation
pub struct AnthropicModel {
    client: Client,
    api_key: String,
    model_name: String,
    base_url: String,
}

impl AnthropicModel {
    /// Create a new AnthropicModel
    ///
    /// Requires `ANTHROPIC_API_KEY` environment variable to be set.
    /// Optionally uses `ANTHROPIC_BASE_URL` for custom endpoints.
    pub fn new(model_name: String, timeout: Duration) -> Result<Self, TransportError> {
        let api_key = env::var("ANTHROPIC_API_KEY").map_err(|_| {
            TransportError::MissingCredentials("ANTHROPIC_API_KEY must be set".into())
        })?;
        let base_url = env::var("ANTHROPIC_BASE_URL")
            .unwrap_or_else(|_| "https://api.anthropic.com/v1".to_string());

        Ok(Self {
            client: http_client(PROVIDER, timeout)?,
            api_key,
            model_name,
            base_url,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// All system messages joined; Anthropic takes them as a top-level field
    fn extract_system_message(history: &[Content]) -> Option<String> {
        let system: Vec<String> = history
            .iter()
            .filter(|c| c.role == "system")
            .map(Content::text)
            .filter(|t| !t.is_empty())
            .collect();
        if system.is_empty() {
            None
        } else {
            Some(system.join("\n\n"))
        }
    }

    /// Convert internal Content to Anthropic message format
    fn content_to_anthropic_message(content: &Content) -> Option<serde_json::Value> {
        if content.role == "system" {
            return None;
        }

        let role = match content.role.as_str() {
            "model" => "assistant",
            other => other,
        };

        let text = content.text();
        if text.is_empty() {
            return None;
        }

        Some(json!({
            "role": role,
            "content": [{ "type": "text", "text": text }]
        }))
    }

    /// Parse Anthropic response into Content
    fn parse_anthropic_response(response: &serde_json::Value) -> Result<Content, TransportError> {
        let content_blocks = response["content"]
            .as_array()
            .ok_or_else(|| TransportError::invalid_response(PROVIDER, "No content in response"))?;

        let mut parts = Vec::new();
        for block in content_blocks {
            match block["type"].as_str() {
                Some("text") => {
                    if let Some(text) = block["text"].as_str().filter(|t| !t.is_empty()) {
                        parts.push(Part::Text(text.to_string()));
                    }
                }
                Some("thinking") => {
                    if let Some(thinking) = block["thinking"].as_str().filter(|t| !t.is_empty()) {
                        parts.push(Part::Thinking(thinking.to_string()));
                    }
                }
                _ => {}
            }
        }

        if let Some(stop_reason) = response["stop_reason"].as_str() {
            log::debug!("Anthropic stop reason: {}", stop_reason);
            if stop_reason == "max_tokens" {
                log::warn!("Anthropic output truncated at max_tokens");
            }
        }

        Ok(Content {
            role: "model".to_string(),
            parts,
        })
    }
}

#[async_trait]
impl Model for AnthropicModel {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content, TransportError> {
        let url = format!("{}/messages", self.base_url);

        let messages: Vec<serde_json::Value> = history
            .iter()
            .filter_map(Self::content_to_anthropic_message)
            .collect();

        let mut body = json!({
            "model": self.model_name,
            "messages": messages,
            "max_tokens": config.and_then(|c| c.max_output_tokens).unwrap_or(8192)
        });

        if let Some(sys) = Self::extract_system_message(history) {
            body["system"] = json!(sys);
        }

        if let Some(cfg) = config {
            if let Some(temp) = cfg.temperature {
                body["temperature"] = json!(temp);
            }
            if let Some(top_p) = cfg.top_p {
                body["top_p"] = json!(top_p);
            }
            if let Some(top_k) = cfg.top_k {
                body["top_k"] = json!(top_k);
            }
        }

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(PROVIDER, e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(TransportError::status(PROVIDER, status.as_u16(), text));
        }

        let resp_json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| TransportError::from_reqwest(PROVIDER, e))?;
        log::debug!("Anthropic response: {}", resp_json);

        Self::parse_anthropic_response(&resp_json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_extract_system_message() {
        let history = vec![
            Content::system("You are a recruiter"),
            Content::system("Answer in JSON"),
            Content::user("Hello"),
        ];

        let system = AnthropicModel::extract_system_message(&history);
        assert_eq!(
            system,
            Some("You are a recruiter\n\nAnswer in JSON".to_string())
        );
        assert!(AnthropicModel::extract_system_message(&[Content::user("x")]).is_none());
    }

    #[test]
    fn test_content_to_anthropic_messages() {
        let msg = AnthropicModel::content_to_anthropic_message(&Content::user("Hello")).unwrap();
        assert_eq!(msg["role"], "user");
        assert_eq!(msg["content"][0]["type"], "text");
        assert_eq!(msg["content"][0]["text"], "Hello");

        let msg =
            AnthropicModel::content_to_anthropic_message(&Content::model("I can help")).unwrap();
        assert_eq!(msg["role"], "assistant");

        assert!(AnthropicModel::content_to_anthropic_message(&Content::system("s")).is_none());
    }

    #[test]
    fn test_parse_anthropic_thinking_response() {
        let response = json!({
            "content": [
                {"type": "thinking", "thinking": "Let me think about this..."},
                {"type": "text", "text": "The answer is 42"}
            ],
            "stop_reason": "end_turn"
        });

        let content = AnthropicModel::parse_anthropic_response(&response).unwrap();
        assert_eq!(content.parts.len(), 2);
        match &content.parts[0] {
            Part::Thinking(t) => assert_eq!(t, "Let me think about this..."),
            _ => panic!("Expected Thinking part"),
        }
        assert_eq!(content.text(), "The answer is 42");
    }

    #[test]
    fn test_parse_anthropic_missing_content() {
        let err = AnthropicModel::parse_anthropic_response(&json!({"type": "error"})).unwrap_err();
        assert!(matches!(err, TransportError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn test_generate_content_sends_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", "2023-06-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": "[1, 2]"}],
                "stop_reason": "end_turn"
            })))
            .mount(&server)
            .await;

        let model = AnthropicModel {
            client: http_client(PROVIDER, Duration::from_secs(5)).unwrap(),
            api_key: "test-key".to_string(),
            model_name: "claude-sonnet-4-5".to_string(),
            base_url: server.uri(),
        };

        let content = model
            .generate_content(&[Content::system("json only"), Content::user("go")], None)
            .await
            .unwrap();
        assert_eq!(content.text(), "[1, 2]");
    }
}
