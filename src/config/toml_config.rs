use crate::utils::error::{AgendaError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub schedule: ScheduleConfig,
    pub whatsapp: WhatsAppConfig,
    pub guidance: GuidanceConfig,
    pub speech: SpeechConfig,
    pub reminders: ReminderConfig,
    pub clinic: ClinicConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Base URL patients and the provider use to reach this server.
    pub public_base_url: String,
    pub static_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            public_base_url: "http://localhost:5000".to_string(),
            static_dir: "static".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleBackend {
    #[default]
    Csv,
    GoogleSheets,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub backend: ScheduleBackend,
    pub path: String,
    pub sheet_id: Option<String>,
    pub range: String,
    pub api_base: String,
    pub access_token: Option<String>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            backend: ScheduleBackend::Csv,
            path: "agenda_clinicas.csv".to_string(),
            sheet_id: None,
            range: "A:Z".to_string(),
            api_base: "https://sheets.googleapis.com".to_string(),
            access_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhatsAppConfig {
    pub base_url: String,
    /// Empty key switches the client to simulation mode.
    pub api_key: String,
    pub instance: String,
    pub send_timeout_seconds: u64,
    pub query_timeout_seconds: u64,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            instance: "sus-agendamentos".to_string(),
            send_timeout_seconds: 15,
            query_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuidanceConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub timeout_seconds: u64,
}

impl Default for GuidanceConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-2.5-flash".to_string(),
            endpoint: "https://generativelanguage.googleapis.com".to_string(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub language: String,
    pub audio_dir: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://translate.google.com/translate_tts".to_string(),
            language: "pt-BR".to_string(),
            audio_dir: "static/audios".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    pub offsets_days: Vec<i64>,
    pub poll_replies: bool,
    pub poll_interval_seconds: u64,
    pub poll_limit: usize,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 3600,
            offsets_days: vec![7, 5, 3, 1],
            poll_replies: false,
            poll_interval_seconds: 30,
            poll_limit: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClinicConfig {
    pub contact_phone: String,
    pub signature: String,
}

impl Default for ClinicConfig {
    fn default() -> Self {
        Self {
            contact_phone: "(53) 3000-0000".to_string(),
            signature: "Sistema SUS".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(AgendaError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| AgendaError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the environment value; unset variables stay as written.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| AgendaError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// Deployment without a config file: everything from the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        if let Some(port) = var("PORT").and_then(|p| p.parse().ok()) {
            config.server.port = port;
        }
        if let Some(url) = var("PUBLIC_BASE_URL") {
            config.server.public_base_url = url;
        } else if let Some(domain) = var("RAILWAY_PUBLIC_DOMAIN") {
            config.server.public_base_url = format!("https://{}", domain);
        }
        if let Some(path) = var("SCHEDULE_PATH") {
            config.schedule.path = path;
        }
        if let Some(sheet_id) = var("GOOGLE_SHEET_ID") {
            config.schedule.backend = ScheduleBackend::GoogleSheets;
            config.schedule.sheet_id = Some(sheet_id);
        }
        config.schedule.access_token = var("GOOGLE_SHEETS_TOKEN");
        if let Some(url) = var("EVOLUTION_API_URL") {
            config.whatsapp.base_url = url;
        }
        if let Some(key) = var("EVOLUTION_API_KEY") {
            config.whatsapp.api_key = key;
        }
        if let Some(instance) = var("EVOLUTION_INSTANCE") {
            config.whatsapp.instance = instance;
        }
        if let Some(key) = var("GEMINI_API_KEY") {
            config.guidance.api_key = key;
        }
        config
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_positive_number("server.port", u64::from(self.server.port), 1)?;
        validation::validate_url("server.public_base_url", &self.server.public_base_url)?;
        validation::validate_path("server.static_dir", &self.server.static_dir)?;

        match self.schedule.backend {
            ScheduleBackend::Csv => validation::validate_path("schedule.path", &self.schedule.path)?,
            ScheduleBackend::GoogleSheets => {
                let sheet_id = validation::validate_required_field(
                    "schedule.sheet_id",
                    &self.schedule.sheet_id,
                )?;
                validation::validate_non_empty_string("schedule.sheet_id", sheet_id)?;
                validation::validate_required_field(
                    "schedule.access_token",
                    &self.schedule.access_token,
                )?;
                validation::validate_url("schedule.api_base", &self.schedule.api_base)?;
            }
        }

        if !self.whatsapp.api_key.is_empty() {
            validation::validate_non_empty_string("whatsapp.base_url", &self.whatsapp.base_url)?;
        }
        validation::validate_non_empty_string("whatsapp.instance", &self.whatsapp.instance)?;
        validation::validate_positive_number(
            "whatsapp.send_timeout_seconds",
            self.whatsapp.send_timeout_seconds,
            1,
        )?;

        validation::validate_url("guidance.endpoint", &self.guidance.endpoint)?;
        if self.speech.enabled {
            validation::validate_url("speech.endpoint", &self.speech.endpoint)?;
            validation::validate_path("speech.audio_dir", &self.speech.audio_dir)?;
        }

        validation::validate_reminder_offsets("reminders.offsets_days", &self.reminders.offsets_days)?;
        validation::validate_positive_number(
            "reminders.interval_seconds",
            self.reminders.interval_seconds,
            1,
        )?;
        if self.reminders.poll_replies {
            validation::validate_positive_number(
                "reminders.poll_interval_seconds",
                self.reminders.poll_interval_seconds,
                1,
            )?;
            validation::validate_range("reminders.poll_limit", self.reminders.poll_limit, 1, 100)?;
        }

        Ok(())
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
