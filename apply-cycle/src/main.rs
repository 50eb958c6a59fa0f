//! apply-cycle - Background daemon for automated application cycles
//!
//! Runs the search/dedupe/submit/log pass for every active user on a
//! fixed interval, or once for a single user.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use libautoapply::platforms::create_collaborators;
use libautoapply::session_cache::SessionCache;
use libautoapply::{Config, CycleOrchestrator, Database, RateLimiter, Result};
use tokio::time::{sleep, Duration};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "apply-cycle")]
#[command(version)]
#[command(about = "Background daemon for automated application cycles")]
#[command(long_about = "\
apply-cycle - Background daemon for automated application cycles

DESCRIPTION:
    apply-cycle is a long-running daemon that periodically runs one
    application cycle for every user with an active search config:
    search configured platforms, drop postings already applied to,
    check submission quotas, submit applications, and write an audit
    entry per cycle.

    Quota-refused candidates are parked and picked up automatically by
    a later cycle once their window opens.

USAGE:
    # Run in foreground (logs to stderr)
    apply-cycle

    # Run one cycle for a single user and exit
    apply-cycle --once --user alice

    # Run with a custom interval
    apply-cycle --interval 1800

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current cycle)

CONFIGURATION:
    Configuration file: ~/.config/autoapply/config.toml
    Database location:  ~/.local/share/autoapply/autoapply.db

    Override with environment variables:
        AUTOAPPLY_CONFIG      - Path to config file
        AUTOAPPLY_LOG_LEVEL   - Log filter (e.g. debug)

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration error
")]
struct Cli {
    /// Seconds between cycles (overrides config)
    #[arg(long, value_name = "SECONDS")]
    interval: Option<u64>,

    /// Run cycles for this user only
    #[arg(long, value_name = "USER_ID")]
    user: Option<String>,

    /// Run one pass and exit
    #[arg(long)]
    once: bool,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    libautoapply::logging::init(cli.verbose, "info");

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;

    info!("apply-cycle daemon starting");

    let collaborators = create_collaborators(&config)?;
    let rate_limiter = Arc::new(RateLimiter::new(db.clone(), config.rate_limits.clone()));
    let sessions = Arc::new(SessionCache::new(
        db.clone(),
        chrono::Duration::days(config.sessions.ttl_days),
    ));
    let orchestrator = CycleOrchestrator::new(
        db,
        rate_limiter,
        sessions.clone(),
        collaborators.search,
        collaborators.applier,
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    let interval = cli.interval.unwrap_or(config.cycle.interval_secs);
    info!("Cycle interval: {}s", interval);

    if cli.once {
        run_pass(&orchestrator, &sessions, cli.user.as_deref()).await?;
        info!("apply-cycle: ran one pass, exiting");
    } else {
        run_daemon_loop(
            &orchestrator,
            &sessions,
            cli.user.as_deref(),
            interval,
            shutdown,
        )
        .await;
    }

    info!("apply-cycle daemon stopped");
    Ok(())
}

/// Set up signal handlers for graceful shutdown
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(|e| {
        libautoapply::AutoApplyError::InvalidInput(format!("Signal setup failed: {}", e))
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

async fn run_daemon_loop(
    orchestrator: &CycleOrchestrator,
    sessions: &SessionCache,
    user: Option<&str>,
    interval: u64,
    shutdown: Arc<AtomicBool>,
) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("Shutdown requested, stopping daemon loop");
            break;
        }

        if let Err(e) = run_pass(orchestrator, sessions, user).await {
            error!("Cycle pass failed: {}", e);
        }

        // Sleep until the next pass, checking shutdown every second
        for _ in 0..interval {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            sleep(Duration::from_secs(1)).await;
        }
    }
}

/// One pass: sweep expired sessions, then run cycles.
async fn run_pass(
    orchestrator: &CycleOrchestrator,
    sessions: &SessionCache,
    user: Option<&str>,
) -> Result<()> {
    let swept = sessions.cleanup_expired(chrono::Utc::now()).await?;
    if swept > 0 {
        info!("Swept {} expired session(s)", swept);
    }

    match user {
        Some(user_id) => {
            let entry = orchestrator.run_cycle(user_id).await?;
            info!(
                "Cycle {} for {}: {} applied, {} failed",
                entry.cycle_id, user_id, entry.jobs_applied, entry.applications_failed
            );
        }
        None => {
            let entries = orchestrator.run_all().await?;
            let applied: i64 = entries.iter().map(|e| e.jobs_applied).sum();
            info!(
                "Batch finished: {} cycle(s), {} application(s) submitted",
                entries.len(),
                applied
            );
        }
    }

    Ok(())
}
