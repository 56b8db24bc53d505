pub mod credit;
pub mod health;
pub mod limit;
pub mod pnl;
pub mod session;

use axum::{http::StatusCode, response::Json};
use serde_json::{json, Value};

/// Downstream callers must see "no session yet" as its own condition, not
/// wait on a refresh.
pub(crate) fn no_session() -> (StatusCode, Json<Value>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({"error": "no active portal session"})),
    )
}
