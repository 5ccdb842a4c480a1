use clap::Parser;
use std::sync::Arc;
use sus_agenda::utils::error::{AgendaError, ErrorSeverity};
use sus_agenda::utils::{logger, validation::Validate};
use sus_agenda::{app_router, AppConfig, AppState, CliArgs};

fn exit_code(e: &AgendaError) -> i32 {
    match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    }
}

fn fail(context: &str, e: AgendaError) -> ! {
    tracing::error!(
        "❌ {}: {} (Category: {:?}, Severity: {:?})",
        context,
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());
    std::process::exit(exit_code(&e).max(1));
}

fn print_summary(config: &AppConfig) {
    println!("✅ Configuration is valid");
    println!(
        "   server:    {}:{} ({})",
        config.server.host, config.server.port, config.server.public_base_url
    );
    println!(
        "   schedule:  {:?} {}",
        config.schedule.backend,
        config
            .schedule
            .sheet_id
            .as_deref()
            .unwrap_or(&config.schedule.path)
    );
    println!(
        "   whatsapp:  {}",
        if config.whatsapp.api_key.is_empty() {
            "simulation".to_string()
        } else {
            format!("{} ({})", config.whatsapp.base_url, config.whatsapp.instance)
        }
    );
    println!(
        "   guidance:  {}",
        if config.guidance.api_key.is_empty() {
            "fallback text"
        } else {
            config.guidance.model.as_str()
        }
    );
    println!("   speech:    {}", config.speech.enabled);
    println!(
        "   reminders: {} at {:?} days, poll replies: {}",
        config.reminders.enabled, config.reminders.offsets_days, config.reminders.poll_replies
    );
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("🛑 Shutting down");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    logger::init_logger(args.verbose, args.json_logs);
    tracing::info!("Starting sus-agenda v{}", env!("CARGO_PKG_VERSION"));
    if args.verbose {
        tracing::debug!("CLI args: {:?}", args);
    }

    let config = match args.load_config() {
        Ok(config) => config,
        Err(e) => fail("Failed to load configuration", e),
    };

    if let Err(e) = config.validate() {
        fail("Configuration validation failed", e);
    }

    if args.dry_run {
        print_summary(&config);
        return Ok(());
    }

    let state = match AppState::from_config(&config) {
        Ok(state) => state,
        Err(e) => fail("Failed to initialize services", e),
    };

    if config.reminders.enabled {
        Arc::new(state.reminder_engine(&config)).spawn();
        tracing::info!(
            "⏰ Reminders every {}s for {:?} days ahead",
            config.reminders.interval_seconds,
            config.reminders.offsets_days
        );
    }
    if config.reminders.poll_replies && !state.messenger.is_simulated() {
        Arc::new(state.reply_poller(&config)).spawn();
        tracing::info!(
            "📥 Polling replies every {}s",
            config.reminders.poll_interval_seconds
        );
    }

    let app = app_router(state, &config.server.static_dir);
    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = match tokio::net::TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(e) => fail("Failed to bind listener", AgendaError::IoError(e)),
    };

    tracing::info!("✅ Listening on http://{}", address);
    println!("✅ sus-agenda listening on http://{}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
