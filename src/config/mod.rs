pub mod toml_config;

pub use toml_config::{AppConfig, ScheduleBackend};

#[cfg(feature = "cli")]
use clap::Parser;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "sus-agenda")]
#[command(about = "Appointment booking and WhatsApp reminders for SUS clinics")]
pub struct CliArgs {
    /// Path to a TOML configuration file; environment variables are used when absent
    #[arg(short, long)]
    pub config: Option<String>,

    /// Override the listening port
    #[arg(long)]
    pub port: Option<u16>,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub json_logs: bool,

    /// Validate configuration and print a summary without starting the server
    #[arg(long)]
    pub dry_run: bool,
}

#[cfg(feature = "cli")]
impl CliArgs {
    pub fn load_config(&self) -> crate::utils::error::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::from_file(path)?,
            None => AppConfig::from_env(),
        };
        if let Some(port) = self.port {
            config.server.port = port;
        }
        Ok(config)
    }
}
