pub mod handlers;
pub mod portal;

use crate::cli::globals::GlobalArgs;
use crate::session::holder::SessionHolder;
use anyhow::Result;
use axum::{
    routing::{get, post},
    Extension, Router,
};
use portal::PortalClient;
use std::sync::Arc;
use tokio::net::TcpListener;

pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "",
};

pub async fn new(port: u16, globals: &GlobalArgs, holder: Arc<SessionHolder>) -> Result<()> {
    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    let portal = Arc::new(PortalClient::new(globals)?);
    let app = router(holder, portal);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

#[must_use]
pub fn router(holder: Arc<SessionHolder>, portal: Arc<PortalClient>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/session", get(handlers::session::session))
        .route(
            "/club/:club/limit",
            get(handlers::limit::view).post(handlers::limit::edit),
        )
        .route("/club/:club/pnl", get(handlers::pnl::view))
        .route("/credit/send", post(handlers::credit::send))
        .route("/credit/claim", post(handlers::credit::claim))
        .layer(Extension(holder))
        .layer(Extension(portal))
}
