pub mod adapters;
pub mod api;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliArgs;

pub use api::{app_router, AppState};
pub use config::AppConfig;
pub use crate::core::{BookingService, ReminderEngine, ReplyPoller, ScheduleService};
pub use utils::error::{AgendaError, Result};
