// SPDX-License-Identifier: MIT

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::adk::error::{CfitError, CheckpointError, RunError, TransportError};
use crate::cfit::config::Settings;
use crate::cfit::extract::Document;
use crate::cfit::service::{new_thread_id, open_checkpoints, FitService};

#[derive(Clone)]
pub struct AppState {
    pub service: FitService,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/workflows", get(list_workflows))
        .route("/api/workflows/{name}/runs", post(create_run))
        .route("/api/workflows/{name}/runs/stream", post(stream_run))
        .route(
            "/api/workflows/{name}/threads/{thread_id}/nodes",
            get(thread_progress),
        )
        .route("/api/threads/{thread_id}/state", get(thread_state))
        .route("/api/process/resume", post(process_resume))
        .route("/api/process/jd", post(process_jd))
        .route("/api/analyze/resume", post(analyze_resume))
        .route("/api/analyze/fit", post(analyze_fit))
        .route("/api/oneclick/resume", post(oneclick_resume))
        .route("/api/oneclick/fit", post(oneclick_fit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until Ctrl-C. The checkpoint backend is opened before the listener
/// starts and closed after the last in-flight request finishes.
pub async fn serve(settings: Settings) -> Result<(), CfitError> {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        log::warn!("Tracing subscriber already installed: {}", e);
    }

    let checkpoints = open_checkpoints(&settings).await?;
    let service = FitService::bootstrap(&settings, checkpoints.clone()).await?;
    let app = router(AppState { service });

    let addr = SocketAddr::from(([127, 0, 0, 1], settings.port));
    log::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    log::info!("Shutting down, closing checkpoint store");
    checkpoints.close().await?;
    served?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

pub struct ApiError(CfitError);

impl<E: Into<CfitError>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

fn transport_status(err: &TransportError) -> StatusCode {
    if err.is_timeout() {
        StatusCode::GATEWAY_TIMEOUT
    } else {
        StatusCode::BAD_GATEWAY
    }
}

fn status_for(err: &CfitError) -> StatusCode {
    match err {
        CfitError::InvalidInput(_)
        | CfitError::Checkpoint(CheckpointError::InvalidThreadId(_))
        | CfitError::Run(RunError::Checkpoint(CheckpointError::InvalidThreadId(_))) => {
            StatusCode::BAD_REQUEST
        }
        CfitError::Transport(t) => transport_status(t),
        CfitError::Run(RunError::ThreadBusy(_)) => StatusCode::CONFLICT,
        CfitError::Run(RunError::UnknownWorkflow(_)) => StatusCode::NOT_FOUND,
        CfitError::Run(run) => run
            .transport()
            .map_or(StatusCode::INTERNAL_SERVER_ERROR, transport_status),
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            log::error!("Request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

fn thread_or_new(thread_id: Option<String>) -> String {
    thread_id
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(new_thread_id)
}

fn respond(thread_id: String, state: Value) -> ApiResult {
    Ok(Json(json!({ "thread_id": thread_id, "state": state })))
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_workflows(State(app): State<AppState>) -> Json<Value> {
    Json(json!(app.service.runner().workflows()))
}

#[derive(Deserialize)]
struct RunRequest {
    thread_id: Option<String>,
    #[serde(default)]
    fields: Map<String, Value>,
}

async fn create_run(
    State(app): State<AppState>,
    Path(name): Path<String>,
    Json(payload): Json<RunRequest>,
) -> ApiResult {
    let thread_id = thread_or_new(payload.thread_id);
    let state = app.service.run(&name, &thread_id, payload.fields).await?;
    respond(thread_id, state)
}

async fn stream_run(
    State(app): State<AppState>,
    Path(name): Path<String>,
    Json(payload): Json<RunRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel(100);
    let (done_tx, done_rx) = oneshot::channel();
    let thread_id = thread_or_new(payload.thread_id);

    tokio::spawn(async move {
        log::info!("Starting streamed run of '{}' on thread {}", name, thread_id);
        let result = app
            .service
            .runner()
            .run_stream(&name, &thread_id, payload.fields, Some(tx))
            .await;
        if let Err(e) = &result {
            log::error!("Streamed run of '{}' failed: {}", name, e);
        }
        let _ = done_tx.send((thread_id, result));
    });

    let events = ReceiverStream::new(rx).map(|event| {
        Ok::<_, Infallible>(Event::default()
            .event("run")
            .json_data(event)
            .unwrap_or_else(|e| Event::default().event("error").data(e.to_string())))
    });
    let outcome = futures::stream::once(async move {
        let event = match done_rx.await {
            Ok((thread_id, Ok(state))) => Event::default()
                .event("result")
                .json_data(json!({ "thread_id": thread_id, "state": state }))
                .unwrap_or_else(|e| Event::default().event("error").data(e.to_string())),
            Ok((_, Err(e))) => Event::default().event("error").data(e.to_string()),
            Err(_) => Event::default().event("error").data("run task ended unexpectedly"),
        };
        Ok::<_, Infallible>(event)
    });

    Sse::new(events.chain(outcome))
        .keep_alive(KeepAlive::new().interval(std::time::Duration::from_secs(1)))
}

async fn thread_state(State(app): State<AppState>, Path(thread_id): Path<String>) -> ApiResult {
    let state = app.service.state(&thread_id).await?;
    respond(thread_id, state)
}

async fn thread_progress(
    State(app): State<AppState>,
    Path((name, thread_id)): Path<(String, String)>,
) -> ApiResult {
    let nodes: Vec<Value> = app
        .service
        .runner()
        .progress(&name, &thread_id)
        .await?
        .into_iter()
        .map(|(node, status)| json!({ "node": node, "status": status }))
        .collect();
    Ok(Json(json!({ "thread_id": thread_id, "workflow": name, "nodes": nodes })))
}

/// Fields of a résumé upload form
struct Upload {
    document: Option<Document>,
    thread_id: Option<String>,
    jd_url: Option<String>,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    let mut upload = Upload {
        document: None,
        thread_id: None,
        jd_url: None,
    };
    let bad_form = |e: axum::extract::multipart::MultipartError| {
        ApiError(CfitError::InvalidInput(format!("malformed form: {}", e)))
    };

    while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "resume_file" => {
                let file_name = field.file_name().unwrap_or("resume").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(bad_form)?;
                upload.document = Some(Document {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            "thread_id" => upload.thread_id = Some(field.text().await.map_err(bad_form)?),
            "jd_url" => upload.jd_url = Some(field.text().await.map_err(bad_form)?),
            other => log::debug!("Ignoring form field '{}'", other),
        }
    }
    Ok(upload)
}

fn required<T>(value: Option<T>, name: &str) -> Result<T, ApiError> {
    value.ok_or_else(|| ApiError(CfitError::InvalidInput(format!("'{}' is required", name))))
}

async fn process_resume(State(app): State<AppState>, multipart: Multipart) -> ApiResult {
    let upload = read_upload(multipart).await?;
    let document = required(upload.document, "resume_file")?;
    let thread_id = thread_or_new(upload.thread_id);
    let state = app.service.process_resume(&thread_id, document).await?;
    respond(thread_id, state)
}

#[derive(Deserialize)]
struct JdRequest {
    thread_id: Option<String>,
    jd_url: String,
}

async fn process_jd(State(app): State<AppState>, Json(payload): Json<JdRequest>) -> ApiResult {
    let thread_id = thread_or_new(payload.thread_id);
    let state = app.service.process_jd(&thread_id, &payload.jd_url).await?;
    respond(thread_id, state)
}

#[derive(Deserialize)]
struct ThreadRequest {
    thread_id: String,
}

async fn analyze_resume(
    State(app): State<AppState>,
    Json(payload): Json<ThreadRequest>,
) -> ApiResult {
    let state = app.service.analyze_resume(&payload.thread_id).await?;
    respond(payload.thread_id, state)
}

async fn analyze_fit(State(app): State<AppState>, Json(payload): Json<ThreadRequest>) -> ApiResult {
    let state = app.service.analyze_fit(&payload.thread_id).await?;
    respond(payload.thread_id, state)
}

async fn oneclick_resume(State(app): State<AppState>, multipart: Multipart) -> ApiResult {
    let upload = read_upload(multipart).await?;
    let document = required(upload.document, "resume_file")?;
    let thread_id = thread_or_new(upload.thread_id);
    let state = app.service.oneclick_resume(&thread_id, document).await?;
    respond(thread_id, state)
}

async fn oneclick_fit(State(app): State<AppState>, multipart: Multipart) -> ApiResult {
    let upload = read_upload(multipart).await?;
    let document = required(upload.document, "resume_file")?;
    let jd_url = required(upload.jd_url, "jd_url")?;
    let thread_id = thread_or_new(upload.thread_id);
    let state = app.service.oneclick_fit(&thread_id, document, &jd_url).await?;
    respond(thread_id, state)
}
