//! Chat simulator: replays bookings as a patient would see them.

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::core::booking::{Conversation, ReplyOutcome, SimulatedMessage};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

pub async fn conversations(State(state): State<AppState>) -> Json<Vec<Conversation>> {
    Json(state.booking.conversations().await)
}

pub async fn message(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<SimulatedMessage>, ApiError> {
    Ok(Json(state.booking.simulated_message(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct SimulatorReply {
    #[serde(default)]
    pub resposta: String,
}

pub async fn reply(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    payload: Result<Json<SimulatorReply>, JsonRejection>,
) -> Result<Json<ReplyOutcome>, ApiError> {
    let Json(body) = payload?;
    Ok(Json(
        state
            .booking
            .simulated_reply(id, body.resposta.trim())
            .await?,
    ))
}
