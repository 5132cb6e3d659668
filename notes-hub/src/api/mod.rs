//! HTTP API exposing the note tree and the access analytics.

pub mod access_log;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use notes_hub_core::analytics::{
    AccessLogStore, AccessObserver, AccessRecord, AccessRecorder, LogQuery, StatsAggregator,
    StatsFilter, StatsWindow,
};
use notes_hub_core::search::SearchHit;
use notes_hub_core::tree::Document;
use notes_hub_core::{NoteLibrary, StorageError};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, warn};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub library: Arc<NoteLibrary>,
    pub access_log: Arc<AccessLogStore>,
    pub stats: Arc<StatsAggregator>,
    pub observer: Arc<dyn AccessObserver>,
    pub search_timeout: Duration,
}

impl AppState {
    pub fn new(library: NoteLibrary, access_log: AccessLogStore, search_timeout: Duration) -> Self {
        let access_log = Arc::new(access_log);
        Self {
            library: Arc::new(library),
            stats: Arc::new(StatsAggregator::new(access_log.clone())),
            observer: Arc::new(AccessRecorder::new(access_log.clone())),
            access_log,
            search_timeout,
        }
    }

    /// Replace the sink the access-log middleware reports to.
    pub fn with_observer(mut self, observer: Arc<dyn AccessObserver>) -> Self {
        self.observer = observer;
        self
    }
}

/// `{ "success": ..., "data": ..., "message": ... }`, with any endpoint
/// specific fields flattened next to `data`.
#[derive(Debug, Serialize)]
pub struct Envelope<T, M = NoMeta> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(flatten)]
    pub meta: M,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct NoMeta {}

#[derive(Debug, Serialize)]
pub struct SearchMeta {
    pub total: usize,
    /// False when the search timeout cut the scan short
    pub complete: bool,
}

#[derive(Debug, Serialize)]
pub struct PageMeta {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub pages: u64,
}

#[derive(Debug, Serialize)]
pub struct NoteContent {
    pub path: String,
    pub content: String,
}

fn ok<T>(data: T) -> Json<Envelope<T>> {
    ok_with(data, NoMeta {})
}

fn ok_with<T, M>(data: T, meta: M) -> Json<Envelope<T, M>> {
    Json(Envelope {
        success: true,
        data: Some(data),
        meta,
        message: None,
    })
}

/// Error response carrying only a caller-safe message.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: &'static str,
}

impl ApiError {
    fn bad_request(message: &'static str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message,
        }
    }

    fn note_not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: "note not found",
        }
    }

    /// Log the cause and hide it from the caller.
    fn internal(cause: impl Display) -> Self {
        error!(error = %cause, "request failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "internal server error",
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(_: StorageError) -> Self {
        ApiError::note_not_found()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Envelope::<()> {
            success: false,
            data: None,
            meta: NoMeta {},
            message: Some(self.message.to_string()),
        };
        (self.status, Json(body)).into_response()
    }
}

/// Run filesystem or database work off the async executor.
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(ApiError::internal)
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/notes", get(list_notes))
        .route("/api/notes/search", get(search_notes))
        .route("/api/notes/content", get(note_by_query))
        .route("/api/notes/{*path}", get(note_by_path))
        .route("/api/admin/analytics/logs", get(list_access_logs))
        .route("/api/admin/analytics/overview", get(get_overview))
        .route("/health", get(|| async { "OK" }))
        .layer(middleware::from_fn_with_state(
            state.observer.clone(),
            access_log::record_access,
        ))
        .with_state(state)
}

async fn list_notes(State(state): State<AppState>) -> Result<Json<Envelope<Vec<Document>>>, ApiError> {
    let library = state.library.clone();
    let tree = blocking(move || library.list_tree()).await?;
    Ok(ok(tree))
}

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

async fn search_notes(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Envelope<Vec<SearchHit>, SearchMeta>>, ApiError> {
    let keyword = params.q.trim().to_string();
    if keyword.is_empty() {
        return Err(ApiError::bad_request("search keyword is required"));
    }
    let library = state.library.clone();
    let deadline = Instant::now() + state.search_timeout;
    let results = blocking(move || library.search_until(&keyword, deadline)).await?;
    if !results.complete {
        warn!(hits = results.hits.len(), "search timed out, returning partial results");
    }
    let meta = SearchMeta {
        total: results.hits.len(),
        complete: results.complete,
    };
    Ok(ok_with(results.hits, meta))
}

#[derive(Deserialize)]
struct ContentParams {
    path: Option<String>,
}

async fn note_by_query(
    State(state): State<AppState>,
    Query(params): Query<ContentParams>,
) -> Result<Json<Envelope<NoteContent>>, ApiError> {
    let path = params
        .path
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("path is required"))?;
    read_note(state, path).await
}

async fn note_by_path(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<Envelope<NoteContent>>, ApiError> {
    read_note(state, path).await
}

async fn read_note(state: AppState, path: String) -> Result<Json<Envelope<NoteContent>>, ApiError> {
    let library = state.library.clone();
    let lookup = path.clone();
    let content = blocking(move || library.get_content(&lookup)).await??;
    Ok(ok(NoteContent { path, content }))
}

async fn list_access_logs(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> Result<Json<Envelope<Vec<AccessRecord>, PageMeta>>, ApiError> {
    let store = state.access_log.clone();
    let page = blocking(move || store.query(&query))
        .await?
        .map_err(ApiError::internal)?;
    let meta = PageMeta {
        total: page.total,
        page: page.page,
        limit: page.limit,
        pages: page.page_count,
    };
    Ok(ok_with(page.records, meta))
}

async fn get_overview(
    State(state): State<AppState>,
    Query(filter): Query<StatsFilter>,
) -> Result<Json<Envelope<StatsWindow>>, ApiError> {
    let stats = state.stats.clone();
    let window = blocking(move || stats.overview(&filter))
        .await?
        .map_err(ApiError::internal)?;
    Ok(ok(window))
}
