use crate::custode::handlers::no_session;
use crate::custode::portal::PortalClient;
use crate::session::holder::SessionHolder;
use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CreditTransfer {
    pub club: String,
    pub amount: i64,
    #[serde(default)]
    pub note: String,
}

// axum handler for sending credit to a club counter
#[utoipa::path(
    post,
    path = "/credit/send",
    request_body = CreditTransfer,
    responses(
        (status = 200, description = "Transfer attempted; see body for outcome"),
        (status = 400, description = "Missing payload"),
        (status = 502, description = "Portal call failed"),
        (status = 503, description = "No session credential yet"),
    ),
    tag = "custode"
)]
#[instrument(skip(portal, holder))]
pub async fn send(
    Extension(portal): Extension<Arc<PortalClient>>,
    Extension(holder): Extension<Arc<SessionHolder>>,
    payload: Option<Json<CreditTransfer>>,
) -> impl IntoResponse {
    let Some(Json(transfer)) = payload else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "missing payload"})),
        );
    };

    let Some(token) = holder.current().await else {
        return no_session();
    };

    match portal
        .credit_send(&token, &transfer.club, transfer.amount, &transfer.note)
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(json!(outcome))),
        Err(e) => {
            error!("credit send failed: {e:#}");
            (StatusCode::BAD_GATEWAY, Json(json!({"error": e.to_string()})))
        }
    }
}

// axum handler for claiming credit back from a club counter
#[utoipa::path(
    post,
    path = "/credit/claim",
    request_body = CreditTransfer,
    responses(
        (status = 200, description = "Claim attempted; see body for outcome"),
        (status = 400, description = "Missing payload"),
        (status = 502, description = "Portal call failed"),
        (status = 503, description = "No session credential yet"),
    ),
    tag = "custode"
)]
#[instrument(skip(portal, holder))]
pub async fn claim(
    Extension(portal): Extension<Arc<PortalClient>>,
    Extension(holder): Extension<Arc<SessionHolder>>,
    payload: Option<Json<CreditTransfer>>,
) -> impl IntoResponse {
    let Some(Json(transfer)) = payload else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "missing payload"})),
        );
    };

    let Some(token) = holder.current().await else {
        return no_session();
    };

    match portal
        .credit_claim(&token, &transfer.club, transfer.amount)
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(json!(outcome))),
        Err(e) => {
            error!("credit claim failed: {e:#}");
            (StatusCode::BAD_GATEWAY, Json(json!({"error": e.to_string()})))
        }
    }
}
