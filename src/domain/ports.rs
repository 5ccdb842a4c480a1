use crate::domain::model::Schedule;
use crate::utils::error::Result;
use async_trait::async_trait;
use serde::Serialize;

/// Where the schedule table lives.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// `None` means no schedule has been loaded yet.
    async fn load(&self) -> Result<Option<Schedule>>;
    async fn save(&self, schedule: &Schedule) -> Result<()>;
    async fn clear(&self) -> Result<()>;
    /// The whole table as CSV bytes, for download.
    async fn export(&self) -> Result<Option<Vec<u8>>>;
    fn describe(&self) -> String;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectionState {
    #[serde(rename = "conectado")]
    pub connected: bool,
    pub status: Option<String>,
    #[serde(rename = "simulacao", skip_serializing_if = "std::ops::Not::not")]
    pub simulated: bool,
    #[serde(rename = "erro", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QrCode {
    pub qrcode: Option<String>,
    pub code: Option<String>,
    #[serde(rename = "mensagem", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboundMessage {
    pub id: String,
    #[serde(rename = "numero")]
    pub number: String,
    #[serde(rename = "texto")]
    pub text: String,
    pub timestamp: i64,
}

/// The WhatsApp provider.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(&self, phone: &str, text: &str) -> Result<()>;
    async fn send_audio(&self, phone: &str, audio_url: &str) -> Result<()>;
    async fn connection_state(&self) -> ConnectionState;
    async fn qr_code(&self) -> Result<QrCode>;
    async fn create_instance(&self) -> Result<QrCode>;
    async fn configure_webhook(&self, url: &str) -> Result<serde_json::Value>;
    async fn recent_messages(&self, limit: usize) -> Result<Vec<InboundMessage>>;
    fn is_simulated(&self) -> bool;
    fn base_url(&self) -> &str;
    fn instance(&self) -> &str;
}

/// Writes per-specialty preparation guidance.
#[async_trait]
pub trait GuidanceGenerator: Send + Sync {
    /// Never fails: falls back to a generic text.
    async fn guidance(&self, exam: &str) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioClip {
    pub file_name: String,
    pub url: String,
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<AudioClip>;
}
