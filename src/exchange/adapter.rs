//! Shared concrete adapter over the per-venue profile.
//!
//! Owns the venue's market-data cache, issues the REST symbol-discovery
//! calls, and manages the subscription sets for the streaming connection.
//! Subscription messages are replace-style: every subscribe or unsubscribe
//! re-sends the full merged set, because the streaming endpoints only accept
//! whole-set subscription frames.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use super::profile::ExchangeProfile;
use super::stream::{subscribe_frame, StreamHandle, StreamSubscriber, TOPIC_ORDERBOOK, TOPIC_TRADE};
use super::{ApiError, ApiResult, BookExtremes, ExchangeAdapter, ExchangeId};
use crate::store::{MarketDataStore, StoreError, Trade};
use crate::symbol::Symbol;

/// Attempts for each REST call before giving up.
const MAX_API_RETRY: usize = 3;

/// Bounded wait for the streaming connection to come up before a subscribe
/// frame is sent; an early subscribe must not be silently dropped.
const SUBSCRIBE_READY_TIMEOUT: Duration = Duration::from_secs(10);

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct SpotAdapter {
    profile: ExchangeProfile,
    store: Arc<MarketDataStore>,
    http: reqwest::Client,
    orderbook_symbols: Mutex<BTreeSet<String>>,
    trade_symbols: Mutex<BTreeSet<String>>,
    stream: Mutex<Option<StreamHandle>>,
}

impl SpotAdapter {
    pub fn new(profile: ExchangeProfile) -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            profile,
            store: Arc::new(MarketDataStore::new()),
            http,
            orderbook_symbols: Mutex::new(BTreeSet::new()),
            trade_symbols: Mutex::new(BTreeSet::new()),
            stream: Mutex::new(None),
        }
    }

    /// Build a fresh streaming connection bound to this adapter's cache and
    /// install its handle. The returned subscriber must be driven by the
    /// caller; a previous connection's handle is replaced.
    pub fn connect_stream(&self) -> StreamSubscriber {
        let (subscriber, handle) = StreamSubscriber::new(
            self.profile.id,
            self.profile.ws_url.to_string(),
            self.store.clone(),
        );
        *lock(&self.stream) = Some(handle);
        subscriber
    }

    /// Re-issue the current subscription sets, e.g. after a reconnect.
    pub async fn resubscribe(&self) -> ApiResult<()> {
        self.wait_ready().await?;
        let orderbook = {
            let set = lock(&self.orderbook_symbols);
            (!set.is_empty()).then(|| subscribe_frame(TOPIC_ORDERBOOK, &set))
        };
        let trade = {
            let set = lock(&self.trade_symbols);
            (!set.is_empty()).then(|| subscribe_frame(TOPIC_TRADE, &set))
        };
        if let Some(frame) = orderbook {
            self.send_frame(frame)?;
        }
        if let Some(frame) = trade {
            self.send_frame(frame)?;
        }
        Ok(())
    }

    async fn wait_ready(&self) -> ApiResult<()> {
        let mut ready = {
            let guard = lock(&self.stream);
            match guard.as_ref() {
                Some(handle) => handle.ready.clone(),
                None => {
                    return Err(ApiError::new(format!(
                        "{}: subscriber not installed",
                        self.profile.id
                    )))
                }
            }
        };
        let open = async {
            loop {
                if *ready.borrow() {
                    return true;
                }
                if ready.changed().await.is_err() {
                    return false;
                }
            }
        };
        match tokio::time::timeout(SUBSCRIBE_READY_TIMEOUT, open).await {
            Ok(true) => Ok(()),
            _ => Err(ApiError::new(format!(
                "{}: stream not ready",
                self.profile.id
            ))),
        }
    }

    fn send_frame(&self, frame: String) -> ApiResult<()> {
        let guard = lock(&self.stream);
        let handle = guard
            .as_ref()
            .ok_or_else(|| ApiError::new(format!("{}: no active stream", self.profile.id)))?;
        handle
            .outbound
            .send(frame)
            .map_err(|_| ApiError::new(format!("{}: stream closed", self.profile.id)))
    }

    async fn public_get(&self, path: &str) -> ApiResult<serde_json::Value> {
        let url = format!("{}{}", self.profile.rest_base, path);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ApiError::new(format!("{}: request failed: {e}", self.profile.id)))?;
        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ApiError::new(format!("{}: bad response body: {e}", self.profile.id)))?;
        // Error-bodied 200s carry a `message` key; check it before parsing
        // the payload.
        if let Some(message) = payload.get("message").and_then(|m| m.as_str()) {
            return Err(ApiError::new(format!(
                "{}: error response: {message}",
                self.profile.id
            )));
        }
        Ok(payload)
    }

    /// One pass over every market segment. Listing payloads are keyed by
    /// base asset under `data`; bookkeeping keys like `date` are skipped.
    async fn fetch_symbols(&self) -> ApiResult<Vec<Symbol>> {
        let mut symbols = Vec::new();
        for (path, quote) in self.profile.ticker_paths {
            let payload = self.public_get(path).await?;
            let data = payload
                .get("data")
                .and_then(|v| v.as_object())
                .ok_or_else(|| {
                    ApiError::new(format!("{}: listing without data", self.profile.id))
                })?;
            for base in data.keys() {
                if base == "date" {
                    continue;
                }
                if let Ok(symbol) = Symbol::from_parts(quote, base) {
                    symbols.push(symbol);
                }
            }
        }
        Ok(symbols)
    }

    async fn merge_and_send(
        &self,
        set: &Mutex<BTreeSet<String>>,
        topic: &str,
        symbols: &[Symbol],
    ) -> ApiResult<()> {
        self.wait_ready().await?;
        let frame = {
            let mut set = lock(set);
            for symbol in symbols {
                set.insert(self.profile.id.to_native(symbol));
            }
            subscribe_frame(topic, &set)
        };
        self.send_frame(frame)
    }

    async fn remove_and_send(
        &self,
        set: &Mutex<BTreeSet<String>>,
        topic: &str,
        symbol: &Symbol,
    ) -> ApiResult<()> {
        self.wait_ready().await?;
        let frame = {
            let mut set = lock(set);
            set.remove(&self.profile.id.to_native(symbol));
            subscribe_frame(topic, &set)
        };
        self.send_frame(frame)
    }
}

#[async_trait]
impl ExchangeAdapter for SpotAdapter {
    fn id(&self) -> ExchangeId {
        self.profile.id
    }

    async fn available_symbols(&self) -> Vec<Symbol> {
        for attempt in 1..=MAX_API_RETRY {
            match self.fetch_symbols().await {
                Ok(symbols) => return symbols,
                Err(err) => {
                    warn!(
                        exchange = %self.profile.id,
                        attempt,
                        error = %err,
                        "symbol listing failed"
                    );
                    tokio::time::sleep(err.wait_time).await;
                }
            }
        }
        warn!(exchange = %self.profile.id, "symbol listing retries exhausted");
        Vec::new()
    }

    fn orderbook_extremes(&self) -> Result<HashMap<Symbol, BookExtremes>, StoreError> {
        let books = self.store.orderbook_snapshot()?;
        let mut extremes = HashMap::new();
        for (native, book) in books {
            let Ok(symbol) = self.profile.id.to_canonical(&native) else {
                continue;
            };
            let bid = book.bids.iter().map(|level| level.price).reduce(f64::max);
            let ask = book.asks.iter().map(|level| level.price).reduce(f64::min);
            extremes.insert(symbol, BookExtremes { bid, ask });
        }
        Ok(extremes)
    }

    fn latest_trades(&self) -> Result<HashMap<Symbol, Trade>, StoreError> {
        let trades = self.store.trade_snapshot()?;
        let mut latest = HashMap::new();
        for (native, entry) in trades {
            let Ok(symbol) = self.profile.id.to_canonical(&native) else {
                continue;
            };
            latest.insert(symbol, entry.latest);
        }
        Ok(latest)
    }

    async fn subscribe_orderbook(&self, symbols: &[Symbol]) -> ApiResult<()> {
        self.merge_and_send(&self.orderbook_symbols, TOPIC_ORDERBOOK, symbols)
            .await?;
        info!(exchange = %self.profile.id, count = symbols.len(), "subscribed orderbook");
        Ok(())
    }

    async fn subscribe_trade(&self, symbols: &[Symbol]) -> ApiResult<()> {
        self.merge_and_send(&self.trade_symbols, TOPIC_TRADE, symbols)
            .await?;
        info!(exchange = %self.profile.id, count = symbols.len(), "subscribed trade");
        Ok(())
    }

    async fn unsubscribe_orderbook(&self, symbol: &Symbol) -> ApiResult<()> {
        self.remove_and_send(&self.orderbook_symbols, TOPIC_ORDERBOOK, symbol)
            .await
    }

    async fn unsubscribe_trade(&self, symbol: &Symbol) -> ApiResult<()> {
        self.remove_and_send(&self.trade_symbols, TOPIC_TRADE, symbol)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BookLevel, OrderBookEntry, TradeDirection};
    use tokio::sync::{mpsc, watch};

    fn bithumb() -> SpotAdapter {
        SpotAdapter::new(ExchangeProfile::bithumb())
    }

    /// Install a fake, already-open stream handle and return the outbound end.
    fn install_open_stream(
        adapter: &SpotAdapter,
    ) -> (watch::Sender<bool>, mpsc::UnboundedReceiver<String>) {
        let (ready_tx, ready_rx) = watch::channel(true);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        *lock(&adapter.stream) = Some(StreamHandle {
            ready: ready_rx,
            outbound: outbound_tx,
        });
        (ready_tx, outbound_rx)
    }

    #[test]
    fn extremes_pick_max_bid_and_min_ask() {
        let adapter = bithumb();
        let mut batch = HashMap::new();
        batch.insert(
            "BTC_KRW".to_string(),
            OrderBookEntry {
                bids: vec![
                    BookLevel { price: 100.0, amount: 1.0 },
                    BookLevel { price: 105.0, amount: 1.0 },
                ],
                asks: vec![
                    BookLevel { price: 110.0, amount: 1.0 },
                    BookLevel { price: 108.0, amount: 1.0 },
                ],
            },
        );
        adapter.store.replace_orderbooks(batch);

        let extremes = adapter.orderbook_extremes().unwrap();
        let symbol = Symbol::parse("KRW_BTC").unwrap();
        assert_eq!(extremes[&symbol].bid, Some(105.0));
        assert_eq!(extremes[&symbol].ask, Some(108.0));
    }

    #[test]
    fn empty_side_is_absent_not_zero() {
        let adapter = bithumb();
        let mut batch = HashMap::new();
        batch.insert(
            "XRP_KRW".to_string(),
            OrderBookEntry {
                bids: vec![BookLevel { price: 500.0, amount: 3.0 }],
                asks: vec![],
            },
        );
        adapter.store.replace_orderbooks(batch);

        let extremes = adapter.orderbook_extremes().unwrap();
        let symbol = Symbol::parse("KRW_XRP").unwrap();
        assert_eq!(extremes[&symbol].bid, Some(500.0));
        assert_eq!(extremes[&symbol].ask, None);
    }

    #[test]
    fn unpopulated_cache_is_an_explicit_failure() {
        let adapter = bithumb();
        assert!(adapter.orderbook_extremes().is_err());
        assert!(adapter.latest_trades().is_err());
    }

    #[test]
    fn latest_trades_are_keyed_canonically() {
        let adapter = bithumb();
        adapter.store.record_trades(vec![(
            "ETH_KRW".to_string(),
            TradeDirection::Buy,
            Trade { price: 3.0, amount: 2.0 },
        )]);
        let latest = adapter.latest_trades().unwrap();
        let symbol = Symbol::parse("KRW_ETH").unwrap();
        assert_eq!(latest[&symbol], Trade { price: 3.0, amount: 2.0 });
    }

    #[tokio::test]
    async fn subscribe_merges_and_sends_full_set() {
        let adapter = bithumb();
        let (_ready_tx, mut outbound_rx) = install_open_stream(&adapter);

        let btc = Symbol::parse("KRW_BTC").unwrap();
        let xrp = Symbol::parse("KRW_XRP").unwrap();

        adapter.subscribe_orderbook(&[btc]).await.unwrap();
        assert_eq!(
            outbound_rx.recv().await.unwrap(),
            r#"{"type":"orderbook","symbols":["BTC_KRW"]}"#
        );

        // Additive: the second call re-sends the merged set.
        adapter.subscribe_orderbook(&[xrp.clone()]).await.unwrap();
        assert_eq!(
            outbound_rx.recv().await.unwrap(),
            r#"{"type":"orderbook","symbols":["BTC_KRW","XRP_KRW"]}"#
        );

        adapter.unsubscribe_orderbook(&xrp).await.unwrap();
        assert_eq!(
            outbound_rx.recv().await.unwrap(),
            r#"{"type":"orderbook","symbols":["BTC_KRW"]}"#
        );
    }

    #[tokio::test]
    async fn subscribe_without_stream_fails() {
        let adapter = bithumb();
        let symbol = Symbol::parse("KRW_BTC").unwrap();
        assert!(adapter.subscribe_trade(&[symbol]).await.is_err());
    }
}
