//! HTTP request handlers

use crate::api::server::AppContext;
use crate::frames::FrameOutcome;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mindguard_common::events::FusionSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Deserialize)]
pub struct FrameRequest {
    /// Base64 image, optionally as a data URL
    image: String,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "mindguard".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /api/state - current fused snapshot
pub async fn get_state(State(ctx): State<AppContext>) -> Json<FusionSnapshot> {
    Json(ctx.state.snapshot().await)
}

/// POST /api/frames - submit one camera frame for facial analysis
pub async fn submit_frame(
    State(ctx): State<AppContext>,
    body: Result<Json<FrameRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!("Malformed frame request: {}", rejection);
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "status": "undecodable", "error": rejection.body_text() })),
            )
                .into_response();
        }
    };

    let outcome = ctx.frames.submit(&request.image).await;
    let status = match &outcome {
        FrameOutcome::Processed(_) | FrameOutcome::NoSubject(_) => StatusCode::OK,
        FrameOutcome::Busy => StatusCode::TOO_MANY_REQUESTS,
        FrameOutcome::Undecodable => StatusCode::BAD_REQUEST,
        FrameOutcome::Failed => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(outcome)).into_response()
}
