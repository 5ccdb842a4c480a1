use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::domain::ports::{ConnectionState, QrCode};
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

fn require_provider(state: &AppState) -> Result<(), ApiError> {
    if state.messenger.is_simulated() {
        return Err(ApiError::BadRequest(
            "WhatsApp API não configurada (modo simulação)".to_string(),
        ));
    }
    Ok(())
}

/// `GET /api/whatsapp/status`
pub async fn status(State(state): State<AppState>) -> Json<ConnectionState> {
    Json(state.messenger.connection_state().await)
}

/// `GET /api/whatsapp/qrcode`
pub async fn qr_code(State(state): State<AppState>) -> Result<Json<QrCode>, ApiError> {
    require_provider(&state)?;
    Ok(Json(state.messenger.qr_code().await?))
}

/// `POST /api/whatsapp/criar-instancia`
pub async fn create_instance(State(state): State<AppState>) -> Result<Json<QrCode>, ApiError> {
    require_provider(&state)?;
    Ok(Json(state.messenger.create_instance().await?))
}

#[derive(Serialize)]
pub struct MessengerConfig {
    pub base_url: String,
    pub instance_name: String,
    pub modo_simulacao: bool,
    pub api_configurada: bool,
}

/// `GET /api/whatsapp/config`: never exposes the API key.
pub async fn config(State(state): State<AppState>) -> Json<MessengerConfig> {
    let simulated = state.messenger.is_simulated();
    Json(MessengerConfig {
        base_url: state.messenger.base_url().to_string(),
        instance_name: state.messenger.instance().to_string(),
        modo_simulacao: simulated,
        api_configurada: !simulated,
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookRequest {
    pub webhook_url: Option<String>,
}

/// `POST /api/whatsapp/configurar-webhook`: defaults to this server's
/// public webhook URL.
pub async fn configure_webhook(
    State(state): State<AppState>,
    body: Option<Json<WebhookRequest>>,
) -> Result<Json<Value>, ApiError> {
    require_provider(&state)?;
    let url = body
        .and_then(|Json(request)| request.webhook_url)
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(|| format!("{}/webhook/whatsapp", state.public_base_url));

    let response = state.messenger.configure_webhook(&url).await?;
    Ok(Json(json!({
        "sucesso": true,
        "webhook_url": url,
        "resposta": response
    })))
}
