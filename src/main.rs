// Quote Pipeline - session-driven collector
// Polls the exchange session, samples quotes while the market is open,
// scores alerts and builds the daily summary after the close

use anyhow::{Context, Result};
use quote_pipeline::alert_scorer::AlertScorer;
use quote_pipeline::config::{Config, MonitoringConfig};
use quote_pipeline::daily_builder::DailyMetricsBuilder;
use quote_pipeline::db::SymbolRepository;
use quote_pipeline::notify::{
    ConnectionRegistry, HttpPushTransport, NotificationFanout, Notifier, VapidIdentity,
};
use quote_pipeline::quote_poller::QuotePoller;
use quote_pipeline::session::SessionOrchestrator;
use quote_pipeline::source::FinnhubSource;
use quote_pipeline::SqliteStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let (mut config, load_error) = match Config::load_or_default() {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };
    config.apply_env_overrides();

    init_logging(&config.monitoring);

    info!("🚀 Quote Pipeline Starting...");
    if let Some(e) = load_error {
        warn!("⚙️  No usable config file ({:#}), using defaults + environment", e);
    }
    if let Err(e) = config.validate() {
        error!("❌ Invalid configuration: {}", e);
        std::process::exit(1);
    }
    info!("⚙️  Configuration loaded");

    let store = Arc::new(SqliteStore::open(&config.database).context("Failed to open database")?);
    info!("✅ Database initialized: {}", config.database.path);

    let symbols = store.list_symbols().context("Failed to list tracked symbols")?;
    if symbols.is_empty() {
        warn!("No tracked symbols yet, the poller will idle until some are added");
    } else {
        info!("📈 Tracking {} symbols: {}", symbols.len(), symbols.join(", "));
    }

    let offset = config.session.utc_offset();
    let live_alerts = Arc::new(ConnectionRegistry::new("alerts"));
    let live_quotes = Arc::new(ConnectionRegistry::new("quotes"));

    let identity = VapidIdentity::from_config(&config.push)?;
    let transport = Arc::new(HttpPushTransport::new(identity, config.push.delivery_timeout())?);
    let fanout: Arc<dyn Notifier> = Arc::new(NotificationFanout::new(
        store.clone(),
        transport,
        Some(live_alerts.clone()),
        &config.push,
    )?);

    let scorer = Arc::new(AlertScorer::new(
        store.clone(),
        store.clone(),
        Some(fanout.clone()),
        &config.alerts,
        offset,
        config.session.trade_date_cutoff_hour,
    ));

    let source = Arc::new(FinnhubSource::new(&config.source)?);
    let poller = Arc::new(QuotePoller::new(
        store.clone(),
        store.clone(),
        source.clone(),
        Some(scorer),
        Some(live_quotes.clone()),
        &config.polling,
    ));
    let daily = Arc::new(DailyMetricsBuilder::new(
        store.clone(),
        store.clone(),
        store.clone(),
        &config.daily,
        offset,
    ));

    let orchestrator = Arc::new(SessionOrchestrator::new(
        source,
        store.clone(),
        poller.clone(),
        daily,
        Some(fanout),
        &config.session,
    ));

    let shutdown = CancellationToken::new();
    let session_task = orchestrator.spawn(shutdown.clone());
    info!("✅ Session orchestrator: Started (exchange={})", config.source.exchange);

    tokio::signal::ctrl_c().await.context("Failed to listen for ctrl-c")?;
    info!("🛑 Shutdown requested");

    shutdown.cancel();
    poller.stop().await;
    if let Err(e) = session_task.await {
        error!("Session orchestrator task failed: {}", e);
    }

    info!(
        "👋 Quote Pipeline stopped ({} live alert, {} live quote connections dropped)",
        live_alerts.len(),
        live_quotes.len()
    );
    Ok(())
}

fn init_logging(monitoring: &MonitoringConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&monitoring.log_level));

    if monitoring.json_logs {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true)
            .init();
    }
}
