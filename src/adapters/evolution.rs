use crate::config::toml_config::WhatsAppConfig;
use crate::domain::phone;
use crate::domain::ports::{ConnectionState, InboundMessage, Messenger, QrCode};
use crate::utils::error::{AgendaError, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;

const SERVICE: &str = "Evolution API";

/// WhatsApp delivery through an Evolution API v2 instance.
///
/// Without an API key the client runs in simulation mode: sends are logged
/// and reported as delivered, queries return nothing.
#[derive(Debug, Clone)]
pub struct EvolutionClient {
    client: Client,
    base_url: String,
    api_key: String,
    instance: String,
    send_timeout: Duration,
    query_timeout: Duration,
}

impl EvolutionClient {
    pub fn new(config: &WhatsAppConfig) -> Self {
        let client = Self {
            client: Client::new(),
            base_url: normalize_base_url(&config.base_url),
            api_key: config.api_key.clone(),
            instance: config.instance.clone(),
            send_timeout: Duration::from_secs(config.send_timeout_seconds),
            query_timeout: Duration::from_secs(config.query_timeout_seconds),
        };

        if client.is_simulated() {
            tracing::warn!("WhatsApp running in simulation mode (no API key configured)");
        } else {
            tracing::info!("WhatsApp provider: {} (instance {})", client.base_url, client.instance);
        }
        client
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, path, self.instance)
    }

    async fn post(&self, path: &str, body: &Value, timeout: Duration) -> Result<Response> {
        let url = self.url(path);
        tracing::debug!("POST {}", url);
        Ok(self
            .client
            .post(url)
            .header("apikey", &self.api_key)
            .timeout(timeout)
            .json(body)
            .send()
            .await?)
    }

    async fn get(&self, path: &str) -> Result<Response> {
        let url = self.url(path);
        tracing::debug!("GET {}", url);
        Ok(self
            .client
            .get(url)
            .header("apikey", &self.api_key)
            .timeout(self.query_timeout)
            .send()
            .await?)
    }

    async fn ensure_delivered(response: Response) -> Result<Response> {
        match response.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(response),
            status => Err(AgendaError::UpstreamError {
                service: SERVICE,
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    fn simulation_error() -> AgendaError {
        AgendaError::ConfigError {
            message: "WhatsApp API não configurada".to_string(),
        }
    }
}

#[async_trait]
impl Messenger for EvolutionClient {
    async fn send_text(&self, phone_number: &str, text: &str) -> Result<()> {
        if self.is_simulated() {
            tracing::info!("[simulação] texto para {}: {}", phone_number, preview(text));
            return Ok(());
        }

        let number = phone::to_provider_number(phone_number);
        let body = json!({
            "number": number,
            "textMessage": { "text": text }
        });
        let response = self.post("message/sendText", &body, self.send_timeout).await?;
        Self::ensure_delivered(response).await?;

        tracing::info!("Text sent to {}", number);
        Ok(())
    }

    async fn send_audio(&self, phone_number: &str, audio_url: &str) -> Result<()> {
        if self.is_simulated() {
            tracing::info!("[simulação] áudio para {}: {}", phone_number, audio_url);
            return Ok(());
        }

        let number = phone::to_provider_number(phone_number);
        let body = json!({
            "number": number,
            "mediaMessage": {
                "mediatype": "audio",
                "media": audio_url
            }
        });
        let response = self.post("message/sendMedia", &body, self.send_timeout).await?;
        Self::ensure_delivered(response).await?;

        tracing::info!("Audio sent to {}", number);
        Ok(())
    }

    async fn connection_state(&self) -> ConnectionState {
        if self.is_simulated() {
            return ConnectionState {
                simulated: true,
                ..ConnectionState::default()
            };
        }

        let response = match self.get("instance/connectionState").await {
            Ok(response) => response,
            Err(e) => {
                return ConnectionState {
                    error: Some(e.to_string()),
                    ..ConnectionState::default()
                }
            }
        };

        if response.status() != StatusCode::OK {
            return ConnectionState {
                error: Some(format!("HTTP {}", response.status().as_u16())),
                ..ConnectionState::default()
            };
        }

        match response.json::<Value>().await {
            Ok(data) => {
                let state = data
                    .get("state")
                    .or_else(|| data.pointer("/instance/state"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                ConnectionState {
                    connected: state.as_deref() == Some("open"),
                    status: state,
                    ..ConnectionState::default()
                }
            }
            Err(e) => ConnectionState {
                error: Some(e.to_string()),
                ..ConnectionState::default()
            },
        }
    }

    async fn qr_code(&self) -> Result<QrCode> {
        if self.is_simulated() {
            return Err(Self::simulation_error());
        }

        let response = self.get("instance/connect").await?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::info!("Instance {} not found, creating it", self.instance);
            return self.create_instance().await;
        }

        let data: Value = Self::ensure_delivered(response).await?.json().await?;
        Ok(QrCode {
            qrcode: data.get("base64").and_then(Value::as_str).map(str::to_string),
            code: data.get("code").and_then(Value::as_str).map(str::to_string),
            message: None,
        })
    }

    async fn create_instance(&self) -> Result<QrCode> {
        if self.is_simulated() {
            return Err(Self::simulation_error());
        }

        let body = json!({
            "instanceName": self.instance,
            "qrcode": true,
            "integration": "WHATSAPP-BAILEYS"
        });
        let url = format!("{}/instance/create", self.base_url);
        let response = self
            .client
            .post(url)
            .header("apikey", &self.api_key)
            .timeout(self.query_timeout)
            .json(&body)
            .send()
            .await?;

        let data: Value = Self::ensure_delivered(response).await?.json().await?;
        Ok(QrCode {
            qrcode: data
                .pointer("/qrcode/base64")
                .and_then(Value::as_str)
                .map(str::to_string),
            code: data
                .pointer("/qrcode/code")
                .and_then(Value::as_str)
                .map(str::to_string),
            message: Some("Instância criada".to_string()),
        })
    }

    async fn configure_webhook(&self, url: &str) -> Result<Value> {
        if self.is_simulated() {
            return Err(Self::simulation_error());
        }

        let body = json!({
            "webhook": {
                "enabled": true,
                "url": url,
                "webhookByEvents": false,
                "webhookBase64": false,
                "events": ["MESSAGES_UPSERT"]
            }
        });
        let response = self.post("webhook/set", &body, self.query_timeout).await?;
        let data = Self::ensure_delivered(response).await?.json().await?;

        tracing::info!("Webhook registered: {}", url);
        Ok(data)
    }

    async fn recent_messages(&self, limit: usize) -> Result<Vec<InboundMessage>> {
        if self.is_simulated() {
            return Ok(Vec::new());
        }

        let body = json!({
            "where": { "key": { "fromMe": false } },
            "limit": limit,
            "sort": { "messageTimestamp": -1 }
        });
        let response = self.post("chat/findMessages", &body, self.query_timeout).await?;
        let data: Value = Self::ensure_delivered(response).await?.json().await?;

        Ok(message_records(&data)
            .iter()
            .filter(|record| !is_from_me(record))
            .filter_map(parse_message)
            .collect())
    }

    fn is_simulated(&self) -> bool {
        self.api_key.is_empty()
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn instance(&self) -> &str {
        &self.instance
    }
}

/// Adds `https://` when the configured URL has no scheme.
pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() || trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

pub fn is_from_me(record: &Value) -> bool {
    record
        .pointer("/key/fromMe")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Extracts sender, text and id from a message record as found in both
/// webhook `data` payloads and `findMessages` results.
pub fn parse_message(record: &Value) -> Option<InboundMessage> {
    let jid = record.pointer("/key/remoteJid").and_then(Value::as_str)?;
    let text = record
        .pointer("/message/conversation")
        .and_then(Value::as_str)
        .or_else(|| {
            record
                .pointer("/message/extendedTextMessage/text")
                .and_then(Value::as_str)
        })
        .unwrap_or("");
    let number = phone::from_jid(jid);
    let timestamp = match record.get("messageTimestamp") {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    };
    let id = record
        .pointer("/key/id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}:{}", number, timestamp));

    Some(InboundMessage {
        id,
        number,
        text: text.trim().to_string(),
        timestamp,
    })
}

/// `findMessages` answers with a bare list or wraps it in `messages`/`data`,
/// sometimes with a further `records` level.
fn message_records(data: &Value) -> Vec<Value> {
    let inner = match data {
        Value::Object(map) => map
            .get("messages")
            .or_else(|| map.get("data"))
            .cloned()
            .unwrap_or(Value::Null),
        other => other.clone(),
    };
    let inner = match inner {
        Value::Object(ref map) if map.contains_key("records") => {
            map.get("records").cloned().unwrap_or(Value::Null)
        }
        other => other,
    };
    match inner {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        single => vec![single],
    }
}

fn preview(text: &str) -> String {
    let short: String = text.chars().take(50).collect();
    if short.len() < text.len() {
        format!("{}...", short)
    } else {
        short
    }
}
