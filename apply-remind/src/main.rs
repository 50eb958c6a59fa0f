//! apply-remind - Manage and dispatch follow-up reminders
//!
//! Unix-style tool for the reminder queue: schedule, cancel, and list
//! reminders, or run the poll daemon that dispatches them when due.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use libautoapply::platforms::create_collaborators;
use libautoapply::types::ReminderType;
use libautoapply::{AutoApplyError, Config, Database, ReminderScheduler, Result};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "apply-remind")]
#[command(version)]
#[command(about = "Manage and dispatch follow-up reminders")]
#[command(long_about = "\
apply-remind - Manage and dispatch follow-up reminders

DESCRIPTION:
    apply-remind manages the reminder queue for submitted applications:
    follow-ups, status checks, and interview prep. Reminders fire a
    configurable number of days before their event; one already due at
    scheduling time is dispatched immediately.

COMMANDS:
    schedule    Schedule a reminder for an application
    cancel      Cancel a pending reminder
    list        List pending reminders for a user
    run         Run the dispatch daemon

USAGE EXAMPLES:
    # Remind 3 days before an interview
    apply-remind schedule app-42 alice interview_prep 2026-09-01T14:00:00Z --offset-days 3

    # Cancel a reminder
    apply-remind cancel 6f1c9c1e-...

    # List alice's pending reminders as JSON
    apply-remind list alice --format json

    # Run the daemon with a 60s poll interval
    apply-remind run --poll-interval 60

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown of the daemon

CONFIGURATION:
    Configuration file: ~/.config/autoapply/config.toml
    Database location:  ~/.local/share/autoapply/autoapply.db

    Override with environment variables:
        AUTOAPPLY_CONFIG      - Path to config file
        AUTOAPPLY_LOG_LEVEL   - Log filter (e.g. debug)

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Platform authentication error
    3 - Invalid input (bad reminder type, time format, etc.)
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Schedule a reminder for an application
    Schedule {
        /// Application the reminder belongs to
        application_id: String,

        /// User the reminder belongs to
        user_id: String,

        /// Reminder type: follow_up, status_check, or interview_prep
        reminder_type: String,

        /// Event time, RFC 3339 (e.g. 2026-09-01T14:00:00Z)
        event_time: String,

        /// Fire this many days before the event
        #[arg(long, default_value_t = 0)]
        offset_days: i64,

        /// Extra context as key=value pairs (repeatable)
        #[arg(long = "meta", value_name = "KEY=VALUE")]
        metadata: Vec<String>,
    },

    /// Cancel a pending reminder
    Cancel {
        /// Reminder job id to cancel
        job_id: String,
    },

    /// List pending reminders for a user
    List {
        /// User to list reminders for
        user_id: String,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run the dispatch daemon
    Run {
        /// Poll interval in seconds (overrides config)
        #[arg(long, value_name = "SECONDS")]
        poll_interval: Option<u64>,

        /// Run one dispatch pass and exit
        #[arg(long)]
        once: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    libautoapply::logging::init(cli.verbose, "warn");

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;

    let collaborators = create_collaborators(&config)?;
    let scheduler = ReminderScheduler::new(
        db,
        collaborators.notifier,
        Duration::from_secs(config.reminders.dispatch_timeout_secs),
    );

    match cli.command {
        Commands::Schedule {
            application_id,
            user_id,
            reminder_type,
            event_time,
            offset_days,
            metadata,
        } => {
            cmd_schedule(
                &scheduler,
                &application_id,
                &user_id,
                &reminder_type,
                &event_time,
                offset_days,
                &metadata,
            )
            .await?;
        }
        Commands::Cancel { job_id } => {
            cmd_cancel(&scheduler, &job_id).await?;
        }
        Commands::List { user_id, format } => {
            cmd_list(&scheduler, &user_id, &format).await?;
        }
        Commands::Run { poll_interval, once } => {
            let interval = poll_interval.unwrap_or(config.reminders.poll_interval_secs);
            cmd_run(&scheduler, interval, once).await?;
        }
    }

    Ok(())
}

async fn cmd_schedule(
    scheduler: &ReminderScheduler,
    application_id: &str,
    user_id: &str,
    reminder_type: &str,
    event_time: &str,
    offset_days: i64,
    metadata: &[String],
) -> Result<()> {
    let reminder_type = ReminderType::parse(reminder_type).ok_or_else(|| {
        AutoApplyError::InvalidInput(format!(
            "Unknown reminder type '{}' (expected follow_up, status_check, or interview_prep)",
            reminder_type
        ))
    })?;

    let event_time = DateTime::parse_from_rfc3339(event_time)
        .map_err(|e| {
            AutoApplyError::InvalidInput(format!("Invalid event time '{}': {}", event_time, e))
        })?
        .with_timezone(&Utc);

    let metadata = parse_metadata(metadata)?;

    let job_id = scheduler
        .schedule(
            application_id,
            user_id,
            reminder_type,
            event_time,
            offset_days,
            metadata,
        )
        .await?;

    println!("{}", job_id);
    Ok(())
}

/// Parse repeated `--meta key=value` flags into a map.
fn parse_metadata(pairs: &[String]) -> Result<HashMap<String, String>> {
    let mut metadata = HashMap::new();
    for pair in pairs {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            AutoApplyError::InvalidInput(format!("Invalid metadata '{}' (expected KEY=VALUE)", pair))
        })?;
        metadata.insert(key.to_string(), value.to_string());
    }
    Ok(metadata)
}

async fn cmd_cancel(scheduler: &ReminderScheduler, job_id: &str) -> Result<()> {
    if scheduler.cancel(job_id).await? {
        println!("Cancelled {}", job_id);
    } else {
        println!("Nothing to cancel: {} is unknown or already sent", job_id);
    }
    Ok(())
}

async fn cmd_list(scheduler: &ReminderScheduler, user_id: &str, format: &str) -> Result<()> {
    let pending = scheduler.list_pending(user_id).await?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&pending)?);
        }
        "text" => {
            if pending.is_empty() {
                println!("No pending reminders for {}", user_id);
                return Ok(());
            }
            for job in &pending {
                let when = DateTime::<Utc>::from_timestamp(job.scheduled_time, 0)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| job.scheduled_time.to_string());
                println!(
                    "{}  {}  {}  app={}",
                    job.id,
                    job.reminder_type,
                    when,
                    job.application_id
                );
            }
        }
        other => {
            return Err(AutoApplyError::InvalidInput(format!(
                "Unknown format '{}' (expected text or json)",
                other
            )));
        }
    }

    Ok(())
}

async fn cmd_run(scheduler: &ReminderScheduler, poll_interval: u64, once: bool) -> Result<()> {
    if once {
        let sent = scheduler.tick(Utc::now()).await?;
        info!("Dispatched {} reminder(s), exiting", sent);
        return Ok(());
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    scheduler
        .run_poll_loop(Duration::from_secs(poll_interval), shutdown)
        .await;
    Ok(())
}

/// Set up signal handlers for graceful shutdown
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(|e| {
        AutoApplyError::InvalidInput(format!("Signal setup failed: {}", e))
    })?;

    let shutdown_clone = shutdown.clone();
    std::thread::spawn(move || {
        for sig in signals.forever() {
            match sig {
                SIGTERM | SIGINT => {
                    info!("Received shutdown signal, stopping gracefully...");
                    shutdown_clone.store(true, Ordering::Relaxed);
                    break;
                }
                _ => {}
            }
        }
    });

    Ok(())
}
