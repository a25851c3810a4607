// SPDX-License-Identifier: MIT

//! Gemini Model - Google's Gemini API implementation

use super::{http_client, Content, GenerationConfig, Model, Part};
use crate::adk::error::TransportError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::env;
use std::time::Duration;

const PROVIDER: &str = "gemini";

/// Google Gemini model implementation
pub struct GeminiModel {
    client: Client,
    api_key: String,
    model_name: String,
    base_url: String,
}

impl GeminiModel {
    /// Create a new GeminiModel
    ///
    /// Requires `GOOGLE_API_KEY` environment variable to be set.
    /// Optionally uses `GEMINI_BASE_URL` for custom endpoints.
    pub fn new(model_name: String, timeout: Duration) -> Result<Self, TransportError> {
        let api_key = env::var("GOOGLE_API_KEY")
            .map_err(|_| TransportError::MissingCredentials("GOOGLE_API_KEY must be set".into()))?;
        let base_url = env::var("GEMINI_BASE_URL")
            .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".to_string());

        Ok(Self {
            client: http_client(PROVIDER, timeout)?,
            api_key,
            model_name,
            base_url,
        })
    }

    /// Point the client at a different endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Build the generateContent request body.
    /// System messages go to `systemInstruction`; thinking parts are never sent.
    fn request_body(history: &[Content], config: Option<&GenerationConfig>) -> serde_json::Value {
        let mut system_parts = Vec::new();
        let mut contents = Vec::new();

        for content in history {
            let parts: Vec<serde_json::Value> = content
                .parts
                .iter()
                .filter_map(|p| match p {
                    Part::Text(t) => Some(json!({ "text": t })),
                    Part::Thinking(_) => None,
                })
                .collect();

            if content.role == "system" {
                system_parts.extend(parts);
            } else {
                contents.push(json!({ "role": content.role, "parts": parts }));
            }
        }

        let mut body = json!({ "contents": contents });
        if !system_parts.is_empty() {
            body["systemInstruction"] = json!({ "parts": system_parts });
        }

        if let Some(cfg) = config {
            let mut generation = serde_json::Map::new();
            if let Some(temp) = cfg.temperature {
                generation.insert("temperature".into(), json!(temp));
            }
            if let Some(max_tokens) = cfg.max_output_tokens {
                generation.insert("maxOutputTokens".into(), json!(max_tokens));
            }
            if let Some(top_p) = cfg.top_p {
                generation.insert("topP".into(), json!(top_p));
            }
            if let Some(top_k) = cfg.top_k {
                generation.insert("topK".into(), json!(top_k));
            }
            if !generation.is_empty() {
                body["generationConfig"] = serde_json::Value::Object(generation);
            }
        }

        body
    }

    /// Parse the first candidate of a Gemini response into Content
    fn parse_response(resp_json: &serde_json::Value) -> Result<Content, TransportError> {
        let candidate = resp_json["candidates"]
            .as_array()
            .and_then(|c| c.first())
            .ok_or_else(|| TransportError::invalid_response(PROVIDER, "No candidates in response"))?;

        if let Some(finish_reason) = candidate.get("finishReason").and_then(|v| v.as_str()) {
            log::debug!("Gemini finish reason: {}", finish_reason);
            if finish_reason == "SAFETY" {
                // Treated as an empty completion; the node degrades to empty output
                log::warn!("Gemini blocked response due to safety filters");
            }
        }

        let mut parts = Vec::new();
        if let Some(parts_json) = candidate["content"]["parts"].as_array() {
            for p in parts_json {
                let is_thought = p.get("thought").and_then(|t| t.as_bool()) == Some(true);
                if let Some(text) = p["text"].as_str() {
                    if is_thought {
                        parts.push(Part::Thinking(text.to_string()));
                    } else {
                        parts.push(Part::Text(text.to_string()));
                    }
                }
            }
        } else {
            log::warn!("No parts in Gemini candidate: {}", candidate);
        }

        Ok(Content {
            role: "model".to_string(),
            parts,
        })
    }
}

#[async_trait]
impl Model for GeminiModel {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content, TransportError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url, self.model_name
        );
        let body = Self::request_body(history, config);

        log::debug!(
            "Gemini request body: {}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
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
        log::debug!("Gemini response: {}", resp_json);

        Self::parse_response(&resp_json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_model(base_url: &str, timeout: Duration) -> GeminiModel {
        GeminiModel {
            client: http_client(PROVIDER, timeout).unwrap(),
            api_key: "test-key".to_string(),
            model_name: "gemini-2.5-flash".to_string(),
            base_url: base_url.to_string(),
        }
    }

    #[test]
    fn test_system_message_goes_to_system_instruction() {
        let history = vec![Content::system("be terse"), Content::user("hello")];
        let body = GeminiModel::request_body(&history, None);

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be terse");
        assert_eq!(body["contents"].as_array().unwrap().len(), 1);
        assert_eq!(body["contents"][0]["role"], "user");
    }

    #[test]
    fn test_generation_config_is_mapped() {
        let config = GenerationConfig {
            temperature: Some(0.5),
            max_output_tokens: Some(1024),
            ..Default::default()
        };
        let body = GeminiModel::request_body(&[Content::user("x")], Some(&config));
        assert_eq!(body["generationConfig"]["temperature"], 0.5);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 1024);
    }

    #[test]
    fn test_parse_response_separates_thoughts() {
        let resp = json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "planning", "thought": true},
                    {"text": "{\"a\": 1}"}
                ]},
                "finishReason": "STOP"
            }]
        });
        let content = GeminiModel::parse_response(&resp).unwrap();
        assert_eq!(content.parts.len(), 2);
        assert_eq!(content.text(), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_response_without_candidates_is_invalid() {
        let err = GeminiModel::parse_response(&json!({})).unwrap_err();
        assert!(matches!(err, TransportError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn test_generate_content_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "hello"}]}}]
            })))
            .mount(&server)
            .await;

        let model = test_model(&server.uri(), Duration::from_secs(5));
        let content = model
            .generate_content(&[Content::user("hi")], None)
            .await
            .unwrap();
        assert_eq!(content.text(), "hello");
    }

    #[tokio::test]
    async fn test_slow_upstream_is_a_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(500))
                    .set_body_json(json!({"candidates": []})),
            )
            .mount(&server)
            .await;

        let model = test_model(&server.uri(), Duration::from_millis(50));
        let err = model
            .generate_content(&[Content::user("hi")], None)
            .await
            .unwrap_err();
        assert!(err.is_timeout(), "expected timeout, got {:?}", err);
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let model = test_model(&server.uri(), Duration::from_secs(5));
        let err = model
            .generate_content(&[Content::user("hi")], None)
            .await
            .unwrap_err();
        match err {
            TransportError::Status { status, message, .. } => {
                assert_eq!(status, 503);
                assert_eq!(message, "overloaded");
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        // Port 9 (discard) on localhost is not listening in test environments
        let model = test_model("http://127.0.0.1:9", Duration::from_secs(5));
        let err = model
            .generate_content(&[Content::user("hi")], None)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Unreachable { .. }));
    }
}
