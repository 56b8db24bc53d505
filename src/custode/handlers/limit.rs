use crate::custode::handlers::no_session;
use crate::custode::portal::PortalClient;
use crate::session::holder::SessionHolder;
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LimitUpdate {
    pub win: i64,
    pub loss: i64,
    #[serde(default = "default_include")]
    pub include: bool,
}

const fn default_include() -> bool {
    true
}

// axum handler for viewing a club limit
#[utoipa::path(
    get,
    path = "/club/{club}/limit",
    responses(
        (status = 200, description = "Current limit for the club"),
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

    match portal.club_limit_view(&token, &club).await {
        Ok(limit) => (StatusCode::OK, Json(json!(limit))),
        Err(e) => {
            error!("club limit view failed: {e:#}");
            (StatusCode::BAD_GATEWAY, Json(json!({"error": e.to_string()})))
        }
    }
}

// axum handler for editing a club limit
#[utoipa::path(
    post,
    path = "/club/{club}/limit",
    request_body = LimitUpdate,
    responses(
        (status = 200, description = "Limit updated"),
        (status = 400, description = "Missing payload"),
        (status = 502, description = "Portal call failed"),
        (status = 503, description = "No session credential yet"),
    ),
    tag = "custode"
)]
#[instrument(skip(portal, holder))]
pub async fn edit(
    Path(club): Path<String>,
    Extension(portal): Extension<Arc<PortalClient>>,
    Extension(holder): Extension<Arc<SessionHolder>>,
    payload: Option<Json<LimitUpdate>>,
) -> impl IntoResponse {
    let Some(Json(update)) = payload else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "missing payload"})),
        );
    };

    let Some(token) = holder.current().await else {
        return no_session();
    };

    match portal
        .club_limit_edit(&token, &club, update.win, update.loss, update.include)
        .await
    {
        Ok(()) => (StatusCode::OK, Json(json!({"ok": true}))),
        Err(e) => {
            error!("club limit edit failed: {e:#}");
            (StatusCode::BAD_GATEWAY, Json(json!({"error": e.to_string()})))
        }
    }
}
