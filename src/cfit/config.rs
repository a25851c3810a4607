// SPDX-License-Identifier: MIT

//! Process settings read from the environment
//!
//! `.env` is loaded by the binary before `Settings::from_env` runs.

use crate::adk::error::CfitError;
use crate::adk::model::{infer_provider_from_model, ModelConfig};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointBackend {
    File,
    Memory,
}

impl FromStr for CheckpointBackend {
    type Err = CfitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "memory" => Ok(Self::Memory),
            other => Err(CfitError::Config(format!(
                "CHECKPOINT_BACKEND must be 'file' or 'memory', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub model_provider: String,
    pub model_name: String,
    pub temperature: f32,
    pub parse_endpoint: Option<String>,
    pub parse_api_key: Option<String>,
    pub request_timeout: Duration,
    pub checkpoint_backend: CheckpointBackend,
    pub checkpoint_dir: PathBuf,
    pub workflows_dir: Option<PathBuf>,
    pub port: u16,
}

impl Settings {
    pub fn from_env() -> Result<Self, CfitError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable source. Empty values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CfitError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let model_name = get("MODEL_NAME").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let model_provider = get("MODEL_PROVIDER")
            .unwrap_or_else(|| infer_provider_from_model(&model_name));

        Ok(Self {
            model_provider,
            model_name,
            temperature: parse_var("MODEL_TEMPERATURE", get("MODEL_TEMPERATURE"), 0.5)?,
            parse_endpoint: get("PDF_PARSE_API_ENDPOINT"),
            parse_api_key: get("PARSE_API_KEY"),
            request_timeout: Duration::from_secs(parse_var(
                "REQUEST_TIMEOUT_SECS",
                get("REQUEST_TIMEOUT_SECS"),
                180u64,
            )?),
            checkpoint_backend: get("CHECKPOINT_BACKEND")
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or(CheckpointBackend::File),
            checkpoint_dir: get("CHECKPOINT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("checkpoints")),
            workflows_dir: get("WORKFLOWS_DIR").map(PathBuf::from),
            port: parse_var("PORT", get("PORT"), 8000u16)?,
        })
    }

    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            provider: Some(self.model_provider.clone()),
            model_name: self.model_name.clone(),
            timeout: self.request_timeout,
        }
    }
}

fn parse_var<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T, CfitError> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| CfitError::Config(format!("{} has an invalid value: '{}'", key, raw))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, CfitError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.model_name, DEFAULT_MODEL);
        assert_eq!(s.model_provider, "Gemini");
        assert_eq!(s.temperature, 0.5);
        assert_eq!(s.request_timeout, Duration::from_secs(180));
        assert_eq!(s.checkpoint_backend, CheckpointBackend::File);
        assert_eq!(s.checkpoint_dir, PathBuf::from("checkpoints"));
        assert_eq!(s.port, 8000);
        assert!(s.parse_endpoint.is_none());
        assert!(s.workflows_dir.is_none());
    }

    #[test]
    fn test_provider_inferred_from_model_name() {
        let s = settings(&[("MODEL_NAME", "claude-sonnet-4-5")]).unwrap();
        assert_eq!(s.model_provider, "Anthropic");

        let s = settings(&[("MODEL_NAME", "gpt-4o"), ("MODEL_PROVIDER", "Gemini")]).unwrap();
        assert_eq!(s.model_provider, "Gemini");
    }

    #[test]
    fn test_overrides() {
        let s = settings(&[
            ("MODEL_TEMPERATURE", "0.2"),
            ("REQUEST_TIMEOUT_SECS", "30"),
            ("CHECKPOINT_BACKEND", "Memory"),
            ("PDF_PARSE_API_ENDPOINT", "http://parse.local/convert"),
            ("PORT", "9000"),
            ("WORKFLOWS_DIR", "./custom"),
        ])
        .unwrap();
        assert_eq!(s.temperature, 0.2);
        assert_eq!(s.model_config().timeout, Duration::from_secs(30));
        assert_eq!(s.checkpoint_backend, CheckpointBackend::Memory);
        assert_eq!(s.parse_endpoint.as_deref(), Some("http://parse.local/convert"));
        assert_eq!(s.port, 9000);
        assert_eq!(s.workflows_dir, Some(PathBuf::from("./custom")));
    }

    #[test]
    fn test_invalid_numbers_are_config_errors() {
        assert!(matches!(
            settings(&[("PORT", "eighty")]),
            Err(CfitError::Config(_))
        ));
        assert!(matches!(
            settings(&[("REQUEST_TIMEOUT_SECS", "-1")]),
            Err(CfitError::Config(_))
        ));
        assert!(matches!(
            settings(&[("CHECKPOINT_BACKEND", "postgres")]),
            Err(CfitError::Config(_))
        ));
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let s = settings(&[("PORT", "  "), ("MODEL_NAME", "")]).unwrap();
        assert_eq!(s.port, 8000);
        assert_eq!(s.model_name, DEFAULT_MODEL);
    }
}
