use crate::session::holder::SessionHolder;
use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

/// Report whether a session credential is currently held. The credential
/// value never leaves the process.
#[utoipa::path(
    get,
    path = "/session",
    responses(
        (status = 200, description = "A session credential is held"),
        (status = 503, description = "No session credential yet"),
    ),
    tag = "custode"
)]
pub async fn session(Extension(holder): Extension<Arc<SessionHolder>>) -> impl IntoResponse {
    match holder.current().await {
        Some(token) => {
            let acquired_at = token
                .acquired_at()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |since| since.as_secs());

            let age_secs = token.acquired_at().elapsed().map_or(0, |age| age.as_secs());

            (
                StatusCode::OK,
                Json(json!({
                    "authenticated": true,
                    "acquired_at": acquired_at,
                    "age_secs": age_secs,
                })),
            )
        }
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"authenticated": false})),
        ),
    }
}
