//! REST API and SSE routes

use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post, put},
    Json, Router,
};
use futures::stream::{Stream, StreamExt as FuturesStreamExt};
use gsd_core::{Detector, DetectorSnapshot, MeasurementDescriptor};
use serde::Serialize;
use std::convert::Infallible;
use std::path::PathBuf;
use thiserror::Error;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::CorsLayer;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/detectors", get(list_detectors))
        .route("/api/detectors/:name", get(get_detector))
        .route("/api/detectors/:name/measurement", put(load_measurement))
        .route("/api/detectors/:name/connect", post(connect))
        .route("/api/detectors/:name/disconnect", post(disconnect))
        .route("/api/detectors/:name/start", post(start))
        .route("/api/detectors/:name/pause", post(pause))
        .route("/api/detectors/:name/stop", post(stop))
        .route("/api/detectors/:name/refresh", post(refresh))
        .route("/api/detectors/:name/save", post(save))
        .route("/api/events", get(status_stream))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// === Errors ===

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Detector(#[from] gsd_core::Error),

    #[error("detector task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        use gsd_core::Error as E;
        match self {
            ApiError::Detector(e) => match e {
                E::InvalidState { .. } | E::NoDescriptorLoaded { .. } => StatusCode::CONFLICT,
                E::InvalidDescriptor(_) => StatusCode::UNPROCESSABLE_ENTITY,
                E::HardwareUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                E::PersistenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
                E::UnknownDetector(_) => StatusCode::NOT_FOUND,
                E::DuplicateDetector(_) => StatusCode::CONFLICT,
            },
            ApiError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::debug!("Rejected request: {}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Run a detector operation on the blocking pool and publish the resulting
/// link if the operation succeeded
async fn with_detector<T, F>(state: &AppState, name: &str, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&Detector) -> gsd_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let detector = state.registry.get(name)?;
    let state = state.clone();
    let out = tokio::task::spawn_blocking(move || {
        let out = op(detector.as_ref())?;
        state.publish(&detector);
        Ok::<_, gsd_core::Error>(out)
    })
    .await??;

    Ok(out)
}

// === Detector Endpoints ===

async fn list_detectors(
    State(state): State<AppState>,
) -> Result<Json<Vec<DetectorSnapshot>>, ApiError> {
    let registry = state.registry.clone();
    let snapshots: Vec<DetectorSnapshot> = tokio::task::spawn_blocking(move || {
        registry.all().iter().map(|d| d.snapshot()).collect()
    })
    .await?;
    Ok(Json(snapshots))
}

async fn get_detector(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DetectorSnapshot>, ApiError> {
    with_detector(&state, &name, |d| Ok(d.snapshot())).await.map(Json)
}

async fn load_measurement(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(descriptor): Json<MeasurementDescriptor>,
) -> Result<Json<DetectorSnapshot>, ApiError> {
    with_detector(&state, &name, move |d| {
        d.load_measurement_info(descriptor)?;
        Ok(d.snapshot())
    })
    .await
    .map(Json)
}

async fn connect(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DetectorSnapshot>, ApiError> {
    with_detector(&state, &name, |d| {
        d.connect()?;
        Ok(d.snapshot())
    })
    .await
    .map(Json)
}

async fn disconnect(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DetectorSnapshot>, ApiError> {
    with_detector(&state, &name, |d| {
        d.disconnect();
        Ok(d.snapshot())
    })
    .await
    .map(Json)
}

async fn start(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DetectorSnapshot>, ApiError> {
    with_detector(&state, &name, |d| {
        d.start()?;
        Ok(d.snapshot())
    })
    .await
    .map(Json)
}

async fn pause(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DetectorSnapshot>, ApiError> {
    with_detector(&state, &name, |d| {
        d.pause()?;
        Ok(d.snapshot())
    })
    .await
    .map(Json)
}

async fn stop(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DetectorSnapshot>, ApiError> {
    with_detector(&state, &name, |d| {
        d.stop()?;
        Ok(d.snapshot())
    })
    .await
    .map(Json)
}

async fn refresh(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DetectorSnapshot>, ApiError> {
    with_detector(&state, &name, |d| {
        d.refresh();
        Ok(d.snapshot())
    })
    .await
    .map(Json)
}

#[derive(Serialize)]
struct SaveResponse {
    path: PathBuf,
    detector: DetectorSnapshot,
}

async fn save(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<(StatusCode, Json<SaveResponse>), ApiError> {
    let response = with_detector(&state, &name, |d| {
        let path = d.save()?;
        Ok(SaveResponse {
            path,
            detector: d.snapshot(),
        })
    })
    .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

// === Status Stream Endpoint ===

async fn status_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(event) => match Event::default().event("status").json_data(&event) {
                Ok(event) => Some(Ok(event)),
                Err(e) => {
                    tracing::error!("Failed to serialize status event: {}", e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!("Broadcast stream error: {}", e);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
