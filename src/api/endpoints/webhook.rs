//! Inbound events pushed by the WhatsApp provider.

use crate::adapters::evolution::{is_from_me, parse_message};
use crate::api::state::AppState;
use crate::domain::model::Reply;
use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

const MESSAGES_UPSERT: &str = "messages.upsert";

/// `GET /webhook/whatsapp`
pub async fn probe(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "webhook ativo",
        "url": format!("{}/webhook/whatsapp", state.public_base_url)
    }))
}

/// `POST /webhook/whatsapp`. Always answers 200 so the provider does not
/// retry; replies are applied on a separate task.
pub async fn receive(State(state): State<AppState>, body: Bytes) -> Json<Value> {
    let Ok(payload) = serde_json::from_slice::<Value>(&body) else {
        tracing::debug!("Webhook body is not JSON ({} bytes)", body.len());
        return Json(json!({ "status": "ignored", "motivo": "json" }));
    };

    let event = payload
        .get("event")
        .and_then(Value::as_str)
        .unwrap_or_default();
    // The provider sends `messages.upsert` or `MESSAGES_UPSERT` depending on its version
    if event.to_lowercase().replace('_', ".") != MESSAGES_UPSERT {
        tracing::debug!("Ignoring webhook event '{}'", event);
        return Json(json!({ "status": "ignored", "evento": event }));
    }

    let record = payload.get("data").cloned().unwrap_or(Value::Null);
    if is_from_me(&record) {
        return Json(json!({ "status": "ignored", "motivo": "fromMe" }));
    }
    let Some(message) = parse_message(&record) else {
        return Json(json!({ "status": "ignored", "motivo": "remoteJid" }));
    };

    tracing::info!("Webhook message from {}: '{}'", message.number, message.text);
    let reply = Reply::parse_strict(&message.text);
    if reply != Reply::Unknown {
        let booking = state.booking.clone();
        let number = message.number.clone();
        tokio::spawn(async move {
            if let Err(e) = booking.process_patient_reply(&number, reply).await {
                tracing::error!("Reply from {} not processed: {}", number, e);
            }
        });
    }

    Json(json!({
        "status": "ok",
        "numero": message.number,
        "texto": message.text
    }))
}
