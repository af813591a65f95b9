use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use event_desk::bot::{Bot, BotDeps};
use event_desk::catalog;
use event_desk::channels::{Dispatcher, TelegramChannel};
use event_desk::config::{self, BotConfig, SessionBackend};
use event_desk::notifier::{self, Notifier};
use event_desk::onboarding::PhoneValidator;
use event_desk::session::{DbSessionStore, MemorySessionStore, SessionStore};
use event_desk::store::{Database, LibSqlBackend};

/// Event registration bot.
#[derive(Parser)]
#[command(name = "event-desk", version, about = "Event registration bot")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the bot (default).
    Run,
    /// Upsert events from a JSON file.
    ImportEvents {
        /// JSON array of {id, name, date, description}.
        file: PathBuf,
        /// Remove every registration and event first.
        #[arg(long)]
        delete_all: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run().await,
        Command::ImportEvents { file, delete_all } => {
            let db = LibSqlBackend::new_local(&config::db_path_from_env()).await?;
            let report = catalog::import_file(&db, &file, delete_all).await?;
            eprintln!(
                "Imported {} events ({} deleted first)",
                report.upserted, report.deleted
            );
            Ok(())
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let config = BotConfig::from_env()?;

    eprintln!("📅 Event Desk v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Admins: {}", config.admins.len());
    eprintln!("   Reminders: {:?} every {:?}", config.notify_policy, config.notify_interval);

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&config.db_path).await?);

    let sessions: Arc<dyn SessionStore> = match config.sessions {
        SessionBackend::Db => Arc::new(DbSessionStore::new(Arc::clone(&db))),
        SessionBackend::Memory => Arc::new(MemorySessionStore::new()),
    };

    // ── Telegram ─────────────────────────────────────────────────────────
    let telegram = Arc::new(TelegramChannel::new(config.token));
    telegram.health_check().await?;
    if let Err(e) = telegram.register_commands().await {
        tracing::warn!(error = %e, "Failed to publish bot commands");
    }
    let dispatcher: Arc<dyn Dispatcher> = Arc::clone(&telegram) as Arc<dyn Dispatcher>;

    // ── Bot ──────────────────────────────────────────────────────────────
    let bot = Bot::new(BotDeps {
        db: Arc::clone(&db),
        sessions,
        dispatcher: Arc::clone(&dispatcher),
        admins: config.admins,
        validator: PhoneValidator::new(&config.phone_patterns)?,
        offset: config.utc_offset,
    });

    // ── Reminders ────────────────────────────────────────────────────────
    let notifier = Arc::new(
        Notifier::new(
            Arc::clone(&db),
            Arc::clone(&dispatcher),
            config.notify_policy,
            config.notify_gate,
            config.utc_offset,
        )
        .with_campaign(config.notify_message),
    );
    let mut notify_handle = notifier::spawn_notifier(notifier, config.notify_interval);

    let updates = telegram.start();

    if let Some(text) = config.announcement.as_deref() {
        if let Err(e) = notifier::announce(db.as_ref(), dispatcher.as_ref(), text).await {
            tracing::error!(error = %e, "Announcement failed");
        }
    }

    tracing::info!("Event Desk running");
    tokio::select! {
        () = bot.run(updates) => {
            notify_handle.abort();
            Ok(())
        }
        joined = &mut notify_handle => {
            // The ticker loops forever, so finishing at all is a failure
            tracing::error!("Reminder task stopped");
            match joined {
                Err(e) => anyhow::bail!("reminder task failed: {e}"),
                Ok(()) => anyhow::bail!("reminder task exited"),
            }
        }
    }
}
