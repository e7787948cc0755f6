mod assets;
mod handlers;

use std::{future::Future, path::PathBuf, sync::Arc};

use anyhow::Result;
use axum::{
    Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{any, get},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::{error::SignalError, signaling::Signaling};

pub use assets::mime_type;

#[derive(Clone)]
pub struct AppState {
    pub signaling: Arc<Signaling>,
    pub assets: Arc<PathBuf>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/newpeer", get(handlers::new_peer).post(handlers::new_peer))
        .route("/answer", any(handlers::answer))
        .route("/rtcconfiguration", get(handlers::rtc_configuration))
        .route("/offer", get(handlers::offer))
        .fallback(assets::serve_asset)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

impl IntoResponse for SignalError {
    fn into_response(self) -> Response {
        let status = match &self {
            SignalError::Malformed(_) | SignalError::MissingId => StatusCode::BAD_REQUEST,
            SignalError::Forbidden => StatusCode::FORBIDDEN,
            SignalError::UnknownPeer(_) => StatusCode::NOT_FOUND,
            SignalError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SignalError::RendezvousFull(_) => StatusCode::SERVICE_UNAVAILABLE,
            SignalError::AnswerTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        };
        if status.is_server_error() {
            error!("signaling request failed: {self}");
        } else {
            warn!("signaling request rejected: {self}");
        }
        (status, self.to_string()).into_response()
    }
}
