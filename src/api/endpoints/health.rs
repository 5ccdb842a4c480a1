use crate::api::state::AppState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub planilha: String,
    pub whatsapp_simulacao: bool,
}

/// `GET /api/health`
pub async fn check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        planilha: state.schedule.describe(),
        whatsapp_simulacao: state.messenger.is_simulated(),
    })
}
