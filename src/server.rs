//! HTTP control boundary: start and stop batches, browse transcripts.

use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{Method, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::batch::{Batch, BatchRunner, DEFAULT_TASK, Job, JobFile};
use crate::config::BenchConfig;
use crate::delivery::HttpCollector;
use crate::error::BenchError;
use crate::stream::{Transcript, event_stream};
use crate::transcripts::TranscriptDir;

/// Task names offered to clients, served sorted.
pub const POPULAR_TASKS: [&str; 8] = [
    "mmlu",
    "gsm8k",
    "hellaswag",
    "arc_challenge",
    "winogrande",
    "truthfulqa_mc2",
    "piqa",
    "lambada_openai",
];

/// Slot for the single batch a server may run at a time.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    current: Arc<Mutex<Option<CancellationToken>>>,
}

impl RunControl {
    /// Claim the slot, failing with [`BenchError::BatchRunning`] if taken.
    pub fn begin(&self) -> Result<RunGuard, BenchError> {
        let mut current = self.lock();
        if current.is_some() {
            return Err(BenchError::BatchRunning);
        }
        let token = CancellationToken::new();
        *current = Some(token.clone());
        Ok(RunGuard {
            control: self.clone(),
            token,
        })
    }

    /// Request cancellation of the running batch. False when none is running.
    pub fn cancel(&self) -> bool {
        match self.lock().as_ref() {
            Some(token) if !token.is_cancelled() => {
                token.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holds the run slot; dropping it releases the slot and cancels the batch.
#[derive(Debug)]
pub struct RunGuard {
    control: RunControl,
    token: CancellationToken,
}

impl RunGuard {
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.token.cancel();
        *self.control.lock() = None;
    }
}

#[derive(Clone)]
pub struct AppState {
    config: Arc<BenchConfig>,
    control: RunControl,
}

impl AppState {
    pub fn new(config: BenchConfig) -> Self {
        Self {
            config: Arc::new(config),
            control: RunControl::default(),
        }
    }

    pub fn control(&self) -> &RunControl {
        &self.control
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/api/run", post(run_batch))
        .route("/api/stop", post(stop_batch))
        .route("/api/tasks", get(list_tasks))
        .route("/api/logs_list", get(logs_list))
        .route("/api/logs_content", get(logs_content))
        .route("/api/logs_delete", post(logs_delete))
        .layer(cors)
        .with_state(state)
}

/// Serve the API on `bind` until Ctrl-C.
pub async fn serve(config: BenchConfig, bind: &str) -> anyhow::Result<()> {
    let state = AppState::new(config);
    let control = state.control().clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = %listener.local_addr()?, "pocketbench server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
            if control.is_running() {
                control.cancel();
            }
        })
        .await?;
    Ok(())
}

/// Body of `POST /api/run`. Requests without `jobs` describe a single job
/// with top-level `repo_id`, `filename` and `tasks`.
#[derive(Debug, Default, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub jobs: Option<Vec<Job>>,
    #[serde(default)]
    pub repo_id: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub tasks: Option<Vec<String>>,
    #[serde(default)]
    pub batch: Option<u32>,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub verbosity: Option<String>,
}

impl RunRequest {
    pub fn into_batch(self) -> Result<Batch, BenchError> {
        let jobs = match self.jobs {
            Some(jobs) => jobs,
            None => {
                let tasks = self.tasks.unwrap_or_else(|| vec![DEFAULT_TASK.to_string()]);
                vec![
                    Job::new(
                        self.repo_id.unwrap_or_default(),
                        self.filename.unwrap_or_default(),
                    )
                    .with_tasks(tasks),
                ]
            }
        };
        let file = JobFile {
            jobs,
            batch: self.batch,
            device: self.device,
            verbosity: self.verbosity,
        };
        let (jobs, params) = file.into_parts()?;
        Ok(Batch::new(jobs, params))
    }
}

async fn run_batch(
    State(state): State<AppState>,
    Json(request): Json<RunRequest>,
) -> Result<Response, ApiError> {
    let batch = request.into_batch()?;
    let guard = state.control.begin()?;
    let transcript = Transcript::open(&state.config.logs_dir, &batch.transcript_name())?;

    let mut runner: BatchRunner<HttpCollector> = BatchRunner::from_config(&state.config);
    if let Some(collector) = HttpCollector::from_config(&state.config.collector).map_err(BenchError::from)? {
        info!(collector = %collector.endpoint(), "results will be delivered");
        runner = runner.with_collector(collector);
    }

    info!(batch = %batch.id(), jobs = batch.jobs().len(), "starting batch");
    let events = runner.run(batch, guard.token());
    // The guard lives as long as the response stream, so a dropped client
    // frees the slot and kills the worker.
    let stream = event_stream(events, transcript).map(move |msg| {
        let _slot = &guard;
        Ok::<Event, Infallible>(Event::default().data(msg.to_json()))
    });
    let sse = Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)));
    Ok(sse.into_response())
}

#[derive(Debug, Serialize, Deserialize)]
struct StatusReply {
    status: String,
    msg: String,
}

impl StatusReply {
    fn success(msg: &str) -> Self {
        Self {
            status: "success".into(),
            msg: msg.into(),
        }
    }

    fn error(msg: &str) -> Self {
        Self {
            status: "error".into(),
            msg: msg.into(),
        }
    }
}

async fn stop_batch(State(state): State<AppState>) -> Json<StatusReply> {
    if state.control.cancel() {
        info!("batch cancellation requested");
        Json(StatusReply::success("Process stopped"))
    } else {
        Json(StatusReply::error("No running process found"))
    }
}

async fn list_tasks() -> Json<Vec<&'static str>> {
    let mut tasks = POPULAR_TASKS.to_vec();
    tasks.sort_unstable();
    Json(tasks)
}

async fn logs_list(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let entries = TranscriptDir::new(&state.config.logs_dir).list()?;
    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    filename: Option<String>,
}

async fn logs_content(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Result<String, ApiError> {
    let filename = query
        .filename
        .ok_or_else(|| ApiError::bad_request("No filename"))?;
    Ok(TranscriptDir::new(&state.config.logs_dir).read(&filename)?)
}

#[derive(Debug, Deserialize)]
struct LogsDeleteRequest {
    filename: String,
}

async fn logs_delete(
    State(state): State<AppState>,
    Json(request): Json<LogsDeleteRequest>,
) -> Result<Json<StatusReply>, ApiError> {
    TranscriptDir::new(&state.config.logs_dir).delete(&request.filename)?;
    info!(filename = %request.filename, "transcript deleted");
    Ok(Json(StatusReply::success("Log deleted")))
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.to_string(),
        }
    }
}

impl From<BenchError> for ApiError {
    fn from(err: BenchError) -> Self {
        let status = match &err {
            BenchError::BatchRunning => StatusCode::CONFLICT,
            BenchError::InvalidJob(_) | BenchError::InvalidTranscriptName(_) => {
                StatusCode::BAD_REQUEST
            }
            BenchError::TranscriptNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(StatusReply::error(&self.message))).into_response()
    }
}
