use crate::adapters::{
    CsvScheduleStore, EvolutionClient, GeminiGuidance, GoogleSheetsStore, GoogleTranslateTts,
};
use crate::config::{AppConfig, ScheduleBackend};
use crate::core::{
    Activity, BookingService, ReminderEngine, ReplyPoller, ScheduleService, Templates,
};
use crate::domain::ports::{Messenger, ScheduleStore, SpeechSynthesizer};
use crate::utils::error::Result;
use std::sync::Arc;
use std::time::Duration;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub booking: Arc<BookingService>,
    pub schedule: Arc<ScheduleService>,
    pub messenger: Arc<dyn Messenger>,
    pub public_base_url: String,
}

impl AppState {
    pub fn new(booking: Arc<BookingService>, public_base_url: impl Into<String>) -> Self {
        let public_base_url: String = public_base_url.into();
        Self {
            schedule: booking.schedule().clone(),
            messenger: booking.messenger().clone(),
            booking,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Wires the configured adapters into the services.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let store: Arc<dyn ScheduleStore> = match config.schedule.backend {
            ScheduleBackend::Csv => Arc::new(CsvScheduleStore::new(&config.schedule.path)),
            ScheduleBackend::GoogleSheets => {
                Arc::new(GoogleSheetsStore::from_config(&config.schedule)?)
            }
        };
        tracing::info!("Schedule store: {}", store.describe());

        let speech: Option<Arc<dyn SpeechSynthesizer>> = if config.speech.enabled {
            Some(Arc::new(GoogleTranslateTts::new(
                &config.speech,
                &config.server.public_base_url,
            )))
        } else {
            None
        };

        let booking = BookingService::new(
            Arc::new(ScheduleService::new(store)),
            Arc::new(Activity::new()),
            Arc::new(EvolutionClient::new(&config.whatsapp)),
            Arc::new(GeminiGuidance::new(&config.guidance)),
            speech,
            Templates::from_config(config),
        );

        Ok(Self::new(Arc::new(booking), &config.server.public_base_url))
    }

    pub fn reminder_engine(&self, config: &AppConfig) -> ReminderEngine {
        ReminderEngine::new(
            self.schedule.clone(),
            self.booking.activity().clone(),
            self.messenger.clone(),
            self.booking.templates().clone(),
            config.reminders.offsets_days.clone(),
            Duration::from_secs(config.reminders.interval_seconds),
        )
    }

    pub fn reply_poller(&self, config: &AppConfig) -> ReplyPoller {
        ReplyPoller::new(
            self.booking.clone(),
            config.reminders.poll_limit,
            Duration::from_secs(config.reminders.poll_interval_seconds),
        )
    }
}
