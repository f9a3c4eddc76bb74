//! STONKZ: watchlist breakout scanner.
//!
//! Entry point. Loads configuration, initialises structured logging, wires
//! the registry, market data, chart renderer and alert sink into a scan
//! controller, starts the daily ledger reset and the dashboard, then waits
//! for Ctrl+C.

use anyhow::{Context, Result};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use stonkz::chart::SparklineRenderer;
use stonkz::config::{self, NotifyConfig};
use stonkz::dashboard::{self, DashboardState};
use stonkz::engine::{
    AlertLedger, DayBoundaryScheduler, ScanController, ScanCycle, SignalBoard, SystemClock,
};
use stonkz::market::yahoo::YahooClient;
use stonkz::notify::discord::DiscordWebhook;
use stonkz::notify::{AlertSink, Dispatcher, LogSink};
use stonkz::signal::SignalEngine;
use stonkz::storage::{SqliteRegistry, TickerRegistry};

const BANNER: &str = r#"
 ____ _____ ___  _   _ _  __ _____
/ ___|_   _/ _ \| \ | | |/ /|__  /
\___ \ | || | | |  \| | ' /   / /
 ___) || || |_| | |\  | . \  / /_
|____/ |_| \___/|_| \_|_|\_\/____|

  Watchlist breakout scanner
  v0.1.0
"#;

/// How long shutdown waits for queued alerts to go out.
const DELIVERY_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var("STONKZ_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        config = %config_path,
        interval_secs = cfg.scanner.interval_secs,
        reset_time = %cfg.schedule.reset_time,
        timezone = cfg.schedule.timezone.as_deref().unwrap_or("local"),
        "STONKZ starting up"
    );

    // -- Initialise components -------------------------------------------

    let registry: Arc<dyn TickerRegistry> = Arc::new(
        SqliteRegistry::connect(&cfg.registry.database_url)
            .await
            .with_context(|| format!("Failed to open registry {}", cfg.registry.database_url))?,
    );
    let market = Arc::new(YahooClient::new(&cfg.market_data)?);
    let sink = alert_sink(&cfg.notify)?;
    let (dispatcher, delivery) = Dispatcher::spawn(sink, cfg.notify.queue_capacity);

    let ledger = Arc::new(AlertLedger::new());
    let cycle = Arc::new(ScanCycle::new(
        Arc::clone(&registry),
        market,
        SignalEngine::new(cfg.signal.clone()),
        Arc::new(SparklineRenderer::default()),
        dispatcher,
        Arc::clone(&ledger),
        Arc::new(SignalBoard::new()),
        cfg.scanner.clone(),
        cfg.notify.mention.clone(),
    ));
    let controller = Arc::new(ScanController::new(
        cycle,
        Duration::from_secs(cfg.scanner.interval_secs),
    ));

    // -- Background tasks ------------------------------------------------

    let scheduler = Arc::new(DayBoundaryScheduler::new(
        ledger,
        Arc::new(SystemClock::new(cfg.schedule.timezone()?)),
        cfg.schedule.reset_time()?,
    ));
    let reset_task = Arc::clone(&scheduler).spawn();

    if cfg.dashboard.enabled {
        let state = Arc::new(DashboardState::new(
            Arc::clone(&controller),
            registry,
            Some(scheduler),
        ));
        dashboard::spawn_dashboard(state, cfg.dashboard.port).await?;
    }

    if cfg.scanner.autostart {
        controller.start();
    } else {
        info!("Scanning idle; start it from the dashboard");
    }

    // -- Wait for shutdown -----------------------------------------------

    info!("Running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Shutdown signal received.");

    controller.stop();
    reset_task.abort();
    if delivery.finish(DELIVERY_GRACE).await {
        info!("Alert queue drained");
    }

    let stats = controller.stats();
    info!(
        cycles = stats.cycles_run,
        alerts = stats.alerts_sent,
        "STONKZ shut down cleanly."
    );

    Ok(())
}

/// Discord webhook when configured, otherwise log-only.
fn alert_sink(cfg: &NotifyConfig) -> Result<Arc<dyn AlertSink>> {
    let url = cfg
        .discord_webhook_env
        .as_deref()
        .and_then(|env| config::AppConfig::resolve_env(env).ok())
        .filter(|url| !url.trim().is_empty());

    match url {
        Some(url) => {
            info!("Alerts will be posted to the Discord webhook");
            Ok(Arc::new(DiscordWebhook::new(SecretString::new(url))?))
        }
        None => {
            warn!("No Discord webhook configured; alerts go to the log only");
            Ok(Arc::new(LogSink))
        }
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("stonkz=info"));

    let json_logging = std::env::var("STONKZ_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
