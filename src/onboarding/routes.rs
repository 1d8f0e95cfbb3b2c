//! REST endpoint for intake status.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tracing::error;
use uuid::Uuid;

use crate::store::SubmissionStore;

use super::progress::ProgressCalculator;
use super::state::IntakeStatus;
use super::step::Step;

/// Shared state for intake routes.
#[derive(Clone)]
pub struct IntakeRouteState {
    pub store: Arc<dyn SubmissionStore>,
    pub progress: Arc<ProgressCalculator>,
}

impl IntakeRouteState {
    pub fn new(store: Arc<dyn SubmissionStore>) -> Self {
        Self {
            store,
            progress: Arc::new(ProgressCalculator::default()),
        }
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// GET /api/intake/{identity_id}/status
///
/// Reports the durable submission's step, progress, and completion.
async fn get_status(
    State(state): State<IntakeRouteState>,
    Path(identity_id): Path<String>,
) -> Response {
    let Ok(identity_id) = Uuid::parse_str(&identity_id) else {
        return error_response(StatusCode::BAD_REQUEST, "identity_id must be a UUID");
    };

    match state.store.load(identity_id).await {
        Ok(Some(submission)) => {
            let completed = submission.is_completed();
            let current_step = if completed {
                Step::TERMINAL
            } else {
                submission.current_step().unwrap_or(Step::START)
            };
            Json(IntakeStatus {
                identity_id: Some(identity_id),
                current_step,
                progress: state.progress.progress(current_step),
                completed,
                completed_at: submission.completed_at(),
            })
            .into_response()
        }
        Ok(None) => error_response(StatusCode::NOT_FOUND, "No intake submission for this identity"),
        Err(e) => {
            error!(identity_id = %identity_id, error = %e, "Status lookup failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Status lookup failed")
        }
    }
}

/// Build the intake REST routes.
pub fn intake_routes(state: IntakeRouteState) -> Router {
    Router::new()
        .route("/api/intake/{identity_id}/status", get(get_status))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
