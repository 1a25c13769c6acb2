//! Alert consumer: drains engine snapshots and turns records that clear the
//! configured thresholds into notifications.
//!
//! Threshold matching is on the absolute spread percent, so an inverted
//! market (negative spread) alerts just like a positive one. A cycle with no
//! snapshot inside the queue window is logged and skipped, never treated as
//! fatal; the consumer stops only when the engine side of the channel goes
//! away.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::exclude::{ExcludeRecord, ExcludeStore};
use crate::notify::TelegramNotifier;
use crate::rates::RateSymbol;
use crate::types::{format_comma, ArbitrageSnapshot};

/// Bounded wait for the next snapshot before the idle cycle is logged.
const QUEUE_TIMEOUT: Duration = Duration::from_secs(10);

/// Write-through handle for exclude maintenance: persists the change and
/// signals the engine to reload its exclude list.
#[derive(Clone)]
pub struct ExcludeHandle {
    store: Arc<ExcludeStore>,
    reload_tx: mpsc::UnboundedSender<bool>,
}

impl ExcludeHandle {
    pub fn new(store: Arc<ExcludeStore>, reload_tx: mpsc::UnboundedSender<bool>) -> Self {
        Self { store, reload_tx }
    }

    pub fn register(&self, record: &ExcludeRecord) -> bool {
        if !self.store.register(record) {
            return false;
        }
        let _ = self.reload_tx.send(true);
        true
    }

    pub fn revert(&self, record: &ExcludeRecord) -> bool {
        if !self.store.revert(record) {
            return false;
        }
        let _ = self.reload_tx.send(true);
        true
    }
}

pub struct ArbitrageMonitor {
    snapshot_rx: mpsc::UnboundedReceiver<ArbitrageSnapshot>,
    notifier: Arc<TelegramNotifier>,
    orderbook_threshold: f64,
    trade_threshold: f64,
}

impl ArbitrageMonitor {
    pub fn new(
        snapshot_rx: mpsc::UnboundedReceiver<ArbitrageSnapshot>,
        notifier: Arc<TelegramNotifier>,
        orderbook_threshold: f64,
        trade_threshold: f64,
    ) -> Self {
        Self {
            snapshot_rx,
            notifier,
            orderbook_threshold,
            trade_threshold,
        }
    }

    pub async fn run(mut self) {
        loop {
            match tokio::time::timeout(QUEUE_TIMEOUT, self.snapshot_rx.recv()).await {
                Ok(Some(snapshot)) => self.process(snapshot).await,
                Ok(None) => {
                    info!("snapshot channel closed, monitor stopping");
                    return;
                }
                Err(_) => debug!("no snapshot within queue window"),
            }
        }
    }

    async fn process(&self, snapshot: ArbitrageSnapshot) {
        self.log_rates(&snapshot);

        for record in &snapshot.orderbook {
            if triggered(record.arbitrage_percent, self.orderbook_threshold) {
                info!(
                    trade_symbol = %record.trade_symbol,
                    base = %record.base_exchange,
                    target = %record.target_exchange,
                    percent = ?record.arbitrage_percent,
                    "orderbook arbitrage alert"
                );
                self.notifier.send_text(&record.to_string()).await;
            }
        }
        for record in &snapshot.trade {
            if triggered(record.arbitrage_percent, self.trade_threshold) {
                info!(
                    trade_symbol = %record.trade_symbol,
                    base = %record.base_exchange,
                    target = %record.target_exchange,
                    percent = ?record.arbitrage_percent,
                    "trade arbitrage alert"
                );
                self.notifier.send_text(&record.to_string()).await;
            }
        }
    }

    fn log_rates(&self, snapshot: &ArbitrageSnapshot) {
        let fmt = |symbol: RateSymbol| {
            snapshot
                .rates
                .get(&symbol)
                .copied()
                .map(format_comma)
                .unwrap_or_else(|| "-".to_string())
        };
        info!(
            krw_btc = %fmt(RateSymbol::KrwBtc),
            krw_eth = %fmt(RateSymbol::KrwEth),
            krw_usdt = %fmt(RateSymbol::KrwUsdt),
            krw_usd = %fmt(RateSymbol::KrwUsd),
            orderbook = snapshot.orderbook.len(),
            trade = snapshot.trade.len(),
            "cycle snapshot"
        );
    }
}

/// A record alerts when it has a computed percent whose magnitude clears the
/// threshold.
fn triggered(percent: Option<f64>, threshold: f64) -> bool {
    percent.is_some_and(|p| p.abs() >= threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::ExchangeId;
    use crate::notify::{TelegramConfig, TelegramNotifier};
    use crate::types::{ArbitrageType, OrderbookArbitrage};

    #[test]
    fn threshold_matches_on_magnitude() {
        assert!(triggered(Some(3.0), 3.0));
        assert!(triggered(Some(-3.5), 3.0));
        assert!(!triggered(Some(2.99), 3.0));
        assert!(!triggered(None, 3.0));
    }

    #[tokio::test]
    async fn snapshots_with_alerts_are_processed_without_a_live_notifier() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let notifier = Arc::new(TelegramNotifier::new(TelegramConfig::default()));
        let monitor = ArbitrageMonitor::new(rx, notifier.clone(), 3.0, 5.0);

        let snapshot = ArbitrageSnapshot {
            orderbook: vec![OrderbookArbitrage::new(
                "BTC".to_string(),
                ExchangeId::Upbit,
                "KRW".to_string(),
                ExchangeId::Binance,
                "USDT".to_string(),
                Some(1000.0),
                Some(910.0),
                Some(9.0),
            )],
            ..Default::default()
        };
        monitor.process(snapshot).await;
        // Inactive notifier: the alert is dropped, not counted as sent.
        assert_eq!(notifier.stats(), (0, 0));
    }

    #[tokio::test]
    async fn exclude_handle_writes_through_and_signals_reload() {
        let store = Arc::new(ExcludeStore::open_in_memory().unwrap());
        store.migrate().unwrap();
        let (reload_tx, mut reload_rx) = mpsc::unbounded_channel();
        let handle = ExcludeHandle::new(store.clone(), reload_tx);

        let record = ExcludeRecord {
            arbitrage_type: ArbitrageType::TradePrice,
            trade_symbol: "XRP".to_string(),
            base_exchange: ExchangeId::Upbit,
            base_exchange_market: "KRW".to_string(),
            target_exchange: ExchangeId::Mexc,
            target_exchange_market: "USDT".to_string(),
        };

        assert!(handle.register(&record));
        assert_eq!(reload_rx.recv().await, Some(true));
        assert_eq!(store.list().unwrap().len(), 1);

        assert!(handle.revert(&record));
        assert_eq!(reload_rx.recv().await, Some(true));
        assert!(store.list().unwrap().is_empty());
    }
}
