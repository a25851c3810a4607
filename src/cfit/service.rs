// SPDX-License-Identifier: MIT

//! FitService - the operations the HTTP surface and CLI expose
//!
//! Each operation runs one topology on one thread and returns the full
//! merged Job State; callers project the fields they need.

use serde_json::{Map, Value};
use std::sync::Arc;

use crate::adk::error::CfitError;
use crate::adk::model::{create_model, GenerationConfig};
use crate::cfit::config::{CheckpointBackend, Settings};
use crate::cfit::extract::{parse_http_url, Document, HttpExtractor, TextExtractor};
use crate::cfit::nodes::keys::{JD_URL, RESUME, RESUME_FILE};
use crate::cfit::nodes::{register_defaults, NodeServices};
use crate::cfit::workflow::checkpoint::{CheckpointManager, FileSaver};
use crate::cfit::workflow::loader::WorkflowLoader;
use crate::cfit::workflow::registry::NodeRegistry;
use crate::cfit::workflow::runner::WorkflowRunner;

pub const PREPROCESS_RESUME: &str = "preprocess_resume";
pub const PREPROCESS_JD: &str = "preprocess_jd";
pub const ANALYZE_RESUME: &str = "analyze_resume";
pub const ANALYZE_FIT: &str = "analyze_fit";
pub const ONECLICK_RESUME: &str = "oneclick_resume";
pub const ONECLICK_FIT: &str = "oneclick_fit";

/// A fresh thread identifier
pub fn new_thread_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Open the configured checkpoint backend
pub async fn open_checkpoints(settings: &Settings) -> Result<CheckpointManager, CfitError> {
    Ok(match settings.checkpoint_backend {
        CheckpointBackend::Memory => {
            log::warn!("Using in-memory checkpoints; state is lost at exit");
            CheckpointManager::in_memory()
        }
        CheckpointBackend::File => {
            log::info!("Checkpoints in {}", settings.checkpoint_dir.display());
            CheckpointManager::new(Arc::new(FileSaver::open(&settings.checkpoint_dir).await?))
        }
    })
}

#[derive(Clone)]
pub struct FitService {
    runner: WorkflowRunner,
    extractor: Arc<dyn TextExtractor>,
}

impl FitService {
    pub fn new(runner: WorkflowRunner, extractor: Arc<dyn TextExtractor>) -> Self {
        Self { runner, extractor }
    }

    /// Wire the whole stack from settings over an already opened checkpoint
    /// backend: model, extractor, task pool and every topology.
    pub async fn bootstrap(
        settings: &Settings,
        checkpoints: CheckpointManager,
    ) -> Result<Self, CfitError> {
        let model = create_model(&settings.model_config())?;
        let extractor: Arc<dyn TextExtractor> = Arc::new(HttpExtractor::new(
            settings.request_timeout,
            settings.parse_endpoint.clone(),
            settings.parse_api_key.clone(),
        )?);

        let services = NodeServices {
            model,
            extractor: extractor.clone(),
            generation: GenerationConfig {
                temperature: Some(settings.temperature),
                ..Default::default()
            },
        };

        let registry = NodeRegistry::new();
        register_defaults(&registry, &services).await;

        let defs = WorkflowLoader::new().load_all(settings.workflows_dir.as_deref())?;
        let runner = WorkflowRunner::from_definitions(&defs, registry, checkpoints).await?;
        log::info!(
            "Loaded {} workflow(s) with model {}",
            defs.len(),
            settings.model_name
        );

        Ok(Self::new(runner, extractor))
    }

    pub fn runner(&self) -> &WorkflowRunner {
        &self.runner
    }

    pub async fn run(
        &self,
        workflow: &str,
        thread_id: &str,
        fields: Map<String, Value>,
    ) -> Result<Value, CfitError> {
        log::info!("Running '{}' on thread {}", workflow, thread_id);
        Ok(self.runner.run(workflow, thread_id, fields).await?)
    }

    /// Extract a résumé document into the `resume_file` and `resume` fields
    pub async fn extract_document(
        &self,
        document: Document,
    ) -> Result<Map<String, Value>, CfitError> {
        let mut fields = Map::new();
        fields.insert(RESUME_FILE.into(), Value::String(document.file_name.clone()));
        let markdown = self.extractor.extract_document(document).await?;
        fields.insert(RESUME.into(), Value::String(markdown));
        Ok(fields)
    }

    fn jd_url(jd_url: &str) -> Result<Value, CfitError> {
        parse_http_url(jd_url)
            .map(|url| Value::String(url.to_string()))
            .map_err(|e| CfitError::InvalidInput(format!("jd_url '{}': {}", jd_url, e)))
    }

    pub async fn process_resume(
        &self,
        thread_id: &str,
        document: Document,
    ) -> Result<Value, CfitError> {
        let fields = self.extract_document(document).await?;
        self.run(PREPROCESS_RESUME, thread_id, fields).await
    }

    pub async fn process_jd(&self, thread_id: &str, jd_url: &str) -> Result<Value, CfitError> {
        let mut fields = Map::new();
        fields.insert(JD_URL.into(), Self::jd_url(jd_url)?);
        self.run(PREPROCESS_JD, thread_id, fields).await
    }

    /// Runs over whatever the thread's checkpoint already holds
    pub async fn analyze_resume(&self, thread_id: &str) -> Result<Value, CfitError> {
        self.run(ANALYZE_RESUME, thread_id, Map::new()).await
    }

    pub async fn analyze_fit(&self, thread_id: &str) -> Result<Value, CfitError> {
        self.run(ANALYZE_FIT, thread_id, Map::new()).await
    }

    pub async fn oneclick_resume(
        &self,
        thread_id: &str,
        document: Document,
    ) -> Result<Value, CfitError> {
        let fields = self.extract_document(document).await?;
        self.run(ONECLICK_RESUME, thread_id, fields).await
    }

    pub async fn oneclick_fit(
        &self,
        thread_id: &str,
        document: Document,
        jd_url: &str,
    ) -> Result<Value, CfitError> {
        let url = Self::jd_url(jd_url)?;
        let mut fields = self.extract_document(document).await?;
        fields.insert(JD_URL.into(), url);
        self.run(ONECLICK_FIT, thread_id, fields).await
    }

    pub async fn state(&self, thread_id: &str) -> Result<Value, CfitError> {
        Ok(self.runner.state(thread_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::error::{RunError, TransportError};
    use crate::cfit::nodes::testing::{services, ScriptedModel, StaticExtractor};
    use serde_json::json;

    async fn service(extractor: StaticExtractor) -> FitService {
        let registry = NodeRegistry::new();
        register_defaults(&registry, &services(ScriptedModel::new("{}"))).await;
        let defs = WorkflowLoader::new().builtin().unwrap();
        let runner = WorkflowRunner::from_definitions(&defs, registry, CheckpointManager::in_memory())
            .await
            .unwrap();
        FitService::new(runner, Arc::new(extractor))
    }

    fn pdf() -> Document {
        Document {
            file_name: "cv.pdf".into(),
            content_type: None,
            bytes: vec![1, 2, 3],
        }
    }

    #[tokio::test]
    async fn test_process_resume_stores_extracted_text() {
        let svc = service(StaticExtractor(Ok("# Kim".into()))).await;
        let state = svc.process_resume("t1", pdf()).await.unwrap();
        assert_eq!(state["resume"], json!("# Kim"));
        assert_eq!(state["resume_file"], json!("cv.pdf"));
        assert_eq!(
            state["resume_details"],
            json!({"projects": [], "experiences": []})
        );
        assert_eq!(svc.state("t1").await.unwrap(), state);
    }

    #[tokio::test]
    async fn test_invalid_jd_url_is_rejected_before_running() {
        let svc = service(StaticExtractor(Ok(String::new()))).await;
        assert!(matches!(
            svc.process_jd("t1", "not-a-url").await,
            Err(CfitError::InvalidInput(_))
        ));
        assert_eq!(svc.state("t1").await.unwrap(), json!({}));
    }

    #[tokio::test]
    async fn test_extraction_failure_surfaces_as_transport() {
        let svc = service(StaticExtractor(Err("connection refused".into()))).await;
        assert!(matches!(
            svc.oneclick_resume("t1", pdf()).await,
            Err(CfitError::Transport(TransportError::Unreachable { .. }))
        ));
    }

    #[tokio::test]
    async fn test_unknown_workflow() {
        let svc = service(StaticExtractor(Ok(String::new()))).await;
        assert!(matches!(
            svc.run("nope", "t1", Map::new()).await,
            Err(CfitError::Run(RunError::UnknownWorkflow(_)))
        ));
    }

    #[test]
    fn test_new_thread_id_is_valid() {
        let id = new_thread_id();
        assert_eq!(id.len(), 36);
        assert!(crate::cfit::workflow::checkpoint::validate_thread_id(&id).is_ok());
    }
}
