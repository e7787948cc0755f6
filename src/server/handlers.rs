use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
};

use crate::{
    error::SignalError,
    models::{
        config::IceConfiguration,
        session::{AnswerBody, SessionDescriptionEnvelope},
    },
};

use super::AppState;

pub(super) async fn new_peer(
    State(state): State<AppState>,
) -> Result<Json<SessionDescriptionEnvelope>, SignalError> {
    Ok(Json(state.signaling.request_new_peer().await?))
}

pub(super) async fn answer(
    State(state): State<AppState>,
    method: Method,
    body: Bytes,
) -> Result<StatusCode, SignalError> {
    if method != Method::POST {
        return Err(SignalError::Forbidden);
    }
    let answer: AnswerBody = serde_json::from_slice(&body)?;
    state.signaling.submit_answer(answer).await?;
    Ok(StatusCode::OK)
}

pub(super) async fn rtc_configuration(State(state): State<AppState>) -> Json<IceConfiguration> {
    Json(state.signaling.configuration().clone())
}

pub(super) async fn offer(State(state): State<AppState>) -> Response {
    match state.signaling.poll_offer().await {
        Some(offer) => Json(offer).into_response(),
        None => "none pending".into_response(),
    }
}
