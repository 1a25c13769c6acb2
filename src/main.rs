//! Cross-Exchange Arbitrage Monitor
//!
//! Process layout is one tokio task per concern: a supervised streaming
//! subscriber per exchange feeding that exchange's cache, one comparison
//! engine publishing per-cycle snapshots, and one alert consumer draining
//! them. The engine and consumer talk over unbounded channels; the exclude
//! handle writes through to SQLite and nudges the engine to reload.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use arb_monitor::config::MonitorConfig;
use arb_monitor::engine::ArbitrageEngine;
use arb_monitor::exchange::{
    ExchangeAdapter, ExchangeId, ExchangeProfile, ReconnectPolicy, SpotAdapter,
};
use arb_monitor::exclude::ExcludeStore;
use arb_monitor::monitor::{ArbitrageMonitor, ExcludeHandle};
use arb_monitor::notify::TelegramNotifier;
use arb_monitor::rates::HttpRateProvider;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("arb_monitor=info".parse()?),
        )
        .init();

    let config = MonitorConfig::from_env();
    info!("Cross-Exchange Arbitrage Monitor");
    info!(
        orderbook_threshold = config.orderbook_alert_threshold,
        trade_threshold = config.trade_alert_threshold,
        "alert thresholds loaded"
    );

    let exclude_store =
        Arc::new(ExcludeStore::open(&config.db_path).context("failed to open exclude database")?);
    exclude_store
        .migrate()
        .context("failed to initialize exclude schema")?;
    info!(path = %config.db_path.display(), "exclude database ready");

    let notifier = Arc::new(TelegramNotifier::from_env());
    if notifier.is_active() {
        info!("telegram notifications enabled");
    } else {
        info!("telegram notifications disabled (token or chat id not configured)");
    }

    // One adapter per venue, each with a supervised streaming connection.
    let mut adapters: Vec<Arc<dyn ExchangeAdapter>> = Vec::new();
    for id in ExchangeId::ALL {
        let adapter = Arc::new(SpotAdapter::new(ExchangeProfile::for_id(id)));
        spawn_stream_supervisor(adapter.clone(), config.reconnect_policy);
        adapters.push(adapter);
    }

    let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();
    let (reload_tx, reload_rx) = mpsc::unbounded_channel();

    // Kept for the whole process lifetime: dropping the last reload sender
    // stops the engine.
    let _exclude_handle = ExcludeHandle::new(exclude_store.clone(), reload_tx);

    let rate_provider = Arc::new(HttpRateProvider::new(config.usd_krw_rate_url.clone()));

    let engine = ArbitrageEngine::init(
        adapters,
        exclude_store,
        rate_provider,
        snapshot_tx,
        reload_rx,
    )
    .await;
    let engine_handle = tokio::spawn(engine.run());

    let monitor = ArbitrageMonitor::new(
        snapshot_rx,
        notifier,
        config.orderbook_alert_threshold,
        config.trade_alert_threshold,
    );
    let monitor_handle = tokio::spawn(monitor.run());

    info!("all tasks running");

    tokio::select! {
        _ = engine_handle => {
            error!("engine task exited unexpectedly");
        }
        _ = monitor_handle => {
            error!("monitor task exited unexpectedly");
        }
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("shutdown signal received"),
                Err(err) => error!(error = %err, "signal handler failed"),
            }
        }
    }

    info!("shutting down");
    Ok(())
}

/// Drive one exchange's streaming connection, rebuilding it per the
/// reconnect policy. Each fresh connection re-sends the adapter's current
/// subscription sets once the socket opens.
fn spawn_stream_supervisor(adapter: Arc<SpotAdapter>, policy: ReconnectPolicy) {
    tokio::spawn(async move {
        loop {
            let subscriber = adapter.connect_stream();

            let resub_adapter = adapter.clone();
            tokio::spawn(async move {
                if let Err(err) = resub_adapter.resubscribe().await {
                    warn!(exchange = %resub_adapter.id(), error = %err, "resubscribe failed");
                }
            });

            if let Err(err) = subscriber.run().await {
                warn!(exchange = %adapter.id(), error = %err, "stream terminated");
            }

            match policy {
                ReconnectPolicy::Never => {
                    warn!(exchange = %adapter.id(), "stream closed, not reconnecting");
                    return;
                }
                ReconnectPolicy::FixedDelay(delay) => {
                    info!(exchange = %adapter.id(), ?delay, "reconnecting stream");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    });
}
