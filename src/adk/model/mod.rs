// SPDX-License-Identifier: MIT

//! Model module - defines the LLM completion trait and implementations
//!
//! This module provides the core Model trait and shared types.
//! Model implementations are in their own submodules:
//! - [anthropic] - Anthropic's Claude API
//! - [gemini] - Google's Gemini API
//! - [openai] - OpenAI's ChatGPT API

pub mod anthropic;
pub mod gemini;
pub mod openai;

use crate::adk::error::TransportError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for model generation
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            parts: vec![Part::Text(text.into())],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![Part::Text(text.into())],
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: "model".to_string(),
            parts: vec![Part::Text(text.into())],
        }
    }

    /// Concatenated text parts, ignoring thinking output
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                Part::Thinking(_) => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Parts of a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Part {
    /// Regular text output from the model
    Text(String),
    /// Thinking/reasoning content from thinking models
    Thinking(String),
}

/// Core trait for LLM completion services
#[async_trait]
pub trait Model: Send + Sync {
    /// Provider label used in logs and transport errors
    fn provider(&self) -> &str;

    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content, TransportError>;
}

/// Which model to build and how long each call may take
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Explicit provider; inferred from the model name when absent
    pub provider: Option<String>,
    pub model_name: String,
    pub timeout: Duration,
}

/// Build the model client for a configuration
pub fn create_model(config: &ModelConfig) -> Result<Arc<dyn Model>, TransportError> {
    let provider = config
        .provider
        .clone()
        .unwrap_or_else(|| infer_provider_from_model(&config.model_name));

    log::debug!(
        "Using provider '{}' with model '{}'",
        provider,
        config.model_name
    );

    let model_name = config.model_name.clone();
    match provider.as_str() {
        "OpenAI" | "openai" => Ok(Arc::new(openai::OpenAIModel::new(
            model_name,
            config.timeout,
        )?)),
        "Anthropic" | "anthropic" => Ok(Arc::new(anthropic::AnthropicModel::new(
            model_name,
            config.timeout,
        )?)),
        _ => Ok(Arc::new(gemini::GeminiModel::new(
            model_name,
            config.timeout,
        )?)),
    }
}

/// Infer the provider from the model name prefix
pub fn infer_provider_from_model(model_name: &str) -> String {
    let name_lower = model_name.to_lowercase();
    if name_lower.starts_with("gpt") || name_lower.starts_with("o1") {
        "OpenAI".to_string()
    } else if name_lower.starts_with("claude") {
        "Anthropic".to_string()
    } else {
        // Gemini is the default provider
        "Gemini".to_string()
    }
}

/// Build an HTTP client with the per-call timeout
pub(crate) fn http_client(
    provider: &str,
    timeout: Duration,
) -> Result<reqwest::Client, TransportError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| TransportError::from_reqwest(provider, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_provider() {
        assert_eq!(infer_provider_from_model("gemini-2.5-flash"), "Gemini");
        assert_eq!(infer_provider_from_model("gpt-4o"), "OpenAI");
        assert_eq!(infer_provider_from_model("claude-sonnet-4-5"), "Anthropic");
        assert_eq!(infer_provider_from_model("something-else"), "Gemini");
    }

    #[test]
    fn test_content_text_skips_thinking() {
        let content = Content {
            role: "model".to_string(),
            parts: vec![
                Part::Thinking("let me think".to_string()),
                Part::Text("{\"a\":".to_string()),
                Part::Text(" 1}".to_string()),
            ],
        };
        assert_eq!(content.text(), "{\"a\": 1}");
    }
}
