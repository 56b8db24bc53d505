use crate::custode::handlers::no_session;
use crate::custode::portal::PortalClient;
use crate::session::holder::SessionHolder;
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, instrument};

// axum handler for looking up a club's ring/tournament P&L
#[utoipa::path(
    get,
    path = "/club/{club}/pnl",
    responses(
        (status = 200, description = "Ring and tournament P&L for the club"),
        (status = 404, description = "Club not on the roster"),
        (status = 502, description = "Portal call failed"),
        (status = 503, description = "No session credential yet"),
    ),
    tag = "custode"
)]
#[instrument(skip(portal, holder))]
pub async fn view(
    Path(club): Path<String>,
    Extension(portal): Extension<Arc<PortalClient>>,
    Extension(holder): Extension<Arc<SessionHolder>>,
) -> impl IntoResponse {
    let Some(token) = holder.current().await else {
        return no_session();
    };

    match portal.club_pnl(&token, &club).await {
        Ok(Some(pnl)) => (StatusCode::OK, Json(json!(pnl))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "club not listed"})),
        ),
        Err(e) => {
            error!("club pnl lookup failed: {e:#}");
            (StatusCode::BAD_GATEWAY, Json(json!({"error": e.to_string()})))
        }
    }
}
