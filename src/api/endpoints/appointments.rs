//! Operator endpoints: booking, replies typed on the patient's behalf and
//! the dashboard feeds.

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::core::booking::{BookingOutcome, BookingRequest, ReplyOutcome};
use crate::domain::model::{Appointment, BookedSlot, Metrics, Notification, SheetCounts};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

/// `POST /api/agendar`
pub async fn book(
    State(state): State<AppState>,
    payload: Result<Json<BookingRequest>, JsonRejection>,
) -> Result<Json<BookingOutcome>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(state.booking.book(&request).await?))
}

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    #[serde(default)]
    pub telefone: String,
    #[serde(default)]
    pub resposta: String,
}

/// `POST /api/resposta-paciente`
pub async fn reply(
    State(state): State<AppState>,
    payload: Result<Json<ReplyRequest>, JsonRejection>,
) -> Result<Json<ReplyOutcome>, ApiError> {
    let Json(request) = payload?;
    if request.telefone.trim().is_empty() {
        return Err(ApiError::BadRequest("Informe o telefone".to_string()));
    }
    Ok(Json(
        state
            .booking
            .handle_reply(request.telefone.trim(), &request.resposta)
            .await?,
    ))
}

/// `GET /api/notificacoes`
pub async fn notifications(State(state): State<AppState>) -> Json<Vec<Notification>> {
    Json(state.booking.notifications().await)
}

/// `GET /api/metricas`
pub async fn metrics(State(state): State<AppState>) -> Json<Metrics> {
    Json(state.booking.metrics().await)
}

/// `GET /api/agendamentos`
pub async fn list(State(state): State<AppState>) -> Json<Vec<Appointment>> {
    Json(state.booking.appointments().await)
}

#[derive(Serialize)]
pub struct BookedRows {
    pub agendados: Vec<BookedSlot>,
    pub totais: SheetCounts,
}

/// `GET /api/planilha/agendados`: bookings as recorded in the schedule,
/// including those made before this process started.
pub async fn booked_rows(State(state): State<AppState>) -> Result<Json<BookedRows>, ApiError> {
    let (agendados, totais) = state.schedule.booked_overview().await?;
    Ok(Json(BookedRows { agendados, totais }))
}
