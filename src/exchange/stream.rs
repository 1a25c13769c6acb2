//! Streaming subscriber: one persistent WebSocket connection per exchange.
//!
//! Lifecycle is Connecting -> Open -> Closed, and Closed is terminal for the
//! instance; reconnecting means building a fresh subscriber (the supervisor
//! loop in `main` does this according to [`ReconnectPolicy`]). Readiness is
//! a watch latch flipped when the connection opens; subscribe calls await it
//! instead of busy-polling.
//!
//! Inbound frames are JSON envelopes `{type, content: {list: [...]}}`. The
//! `type` discriminator selects the dispatch branch; frames with a missing or
//! unknown type are silently dropped. Order-book batches replace both sides
//! of each symbol's book wholesale (snapshot semantics); trade batches are
//! classified by the provider's sell flag.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::{ApiError, ApiResult, ExchangeId};
use crate::store::{BookLevel, MarketDataStore, OrderBookEntry, Trade, TradeDirection};

pub const TOPIC_ORDERBOOK: &str = "orderbook";
pub const TOPIC_TRADE: &str = "trade";
pub const TOPIC_CANDLE: &str = "candle";

/// What the supervisor does after a subscriber closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// The source behavior: a closed stream stays closed.
    Never,
    /// Build a fresh subscriber after the given delay.
    FixedDelay(Duration),
}

/// Outbound replace-style subscription frame carrying the full symbol set.
#[derive(Debug, Serialize)]
struct SubscribeFrame<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    symbols: Vec<&'a str>,
}

/// Serialize the full replacement set for one topic.
pub fn subscribe_frame(kind: &str, symbols: &BTreeSet<String>) -> String {
    let frame = SubscribeFrame {
        kind,
        symbols: symbols.iter().map(String::as_str).collect(),
    };
    // A struct of strings cannot fail to serialize.
    serde_json::to_string(&frame).unwrap_or_default()
}

#[derive(Debug, Deserialize)]
struct InboundFrame {
    #[serde(rename = "type")]
    kind: Option<String>,
    content: Option<FrameContent>,
}

#[derive(Debug, Deserialize)]
struct FrameContent {
    #[serde(default)]
    list: Vec<FrameEntry>,
}

/// One entry of an update batch. Order-book entries carry `side`; trade
/// entries carry the provider's sell flag (`"1"` means sell).
#[derive(Debug, Deserialize)]
struct FrameEntry {
    symbol: String,
    #[serde(default)]
    price: Option<String>,
    #[serde(default)]
    amount: Option<String>,
    #[serde(default)]
    side: Option<String>,
    #[serde(default, rename = "sellFlag")]
    sell_flag: Option<String>,
}

fn parse_f64(raw: &Option<String>) -> Option<f64> {
    raw.as_deref().and_then(|s| s.parse().ok())
}

/// Handle the owning adapter keeps: the readiness latch plus the outbound
/// frame channel.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    pub ready: watch::Receiver<bool>,
    pub outbound: mpsc::UnboundedSender<String>,
}

pub struct StreamSubscriber {
    exchange: ExchangeId,
    url: String,
    store: Arc<MarketDataStore>,
    ready_tx: watch::Sender<bool>,
    outbound_rx: mpsc::UnboundedReceiver<String>,
}

impl StreamSubscriber {
    pub fn new(
        exchange: ExchangeId,
        url: String,
        store: Arc<MarketDataStore>,
    ) -> (Self, StreamHandle) {
        let (ready_tx, ready_rx) = watch::channel(false);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        (
            Self {
                exchange,
                url,
                store,
                ready_tx,
                outbound_rx,
            },
            StreamHandle {
                ready: ready_rx,
                outbound: outbound_tx,
            },
        )
    }

    /// Drive the connection to completion. Returns `Err` when the connection
    /// closes or errors; the instance is spent either way.
    pub async fn run(mut self) -> ApiResult<()> {
        let result = self.drive().await;
        let _ = self.ready_tx.send(false);
        if let Err(err) = &result {
            warn!(exchange = %self.exchange, error = %err, "stream closed");
        }
        result
    }

    async fn drive(&mut self) -> ApiResult<()> {
        info!(exchange = %self.exchange, url = %self.url, "connecting stream");
        let (ws, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ApiError::new(format!("{}: connect failed: {e}", self.exchange)))?;
        let (mut write, mut read) = ws.split();

        let _ = self.ready_tx.send(true);
        info!(exchange = %self.exchange, "stream open");

        loop {
            tokio::select! {
                frame = self.outbound_rx.recv() => match frame {
                    Some(text) => {
                        write.send(Message::Text(text)).await.map_err(|e| {
                            ApiError::new(format!("{}: send failed: {e}", self.exchange))
                        })?;
                    }
                    // Owning adapter dropped its handle; orderly shutdown.
                    None => return Ok(()),
                },
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.dispatch(&text),
                    Some(Ok(Message::Ping(payload))) => {
                        write.send(Message::Pong(payload)).await.map_err(|e| {
                            ApiError::new(format!("{}: pong failed: {e}", self.exchange))
                        })?;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        return Err(ApiError::new(format!("{}: receive error: {e}", self.exchange)));
                    }
                    None => {
                        return Err(ApiError::new(format!("{}: connection closed", self.exchange)));
                    }
                },
            }
        }
    }

    fn dispatch(&self, text: &str) {
        let Ok(frame) = serde_json::from_str::<InboundFrame>(text) else {
            debug!(exchange = %self.exchange, "undecodable frame dropped");
            return;
        };
        let Some(kind) = frame.kind.as_deref() else {
            return;
        };
        let Some(content) = frame.content else {
            return;
        };
        match kind {
            TOPIC_ORDERBOOK => self.apply_orderbook(content.list),
            TOPIC_TRADE => self.apply_trades(content.list),
            TOPIC_CANDLE => {}
            _ => {}
        }
    }

    fn apply_orderbook(&self, list: Vec<FrameEntry>) {
        let mut batch: HashMap<String, OrderBookEntry> = HashMap::new();
        for entry in list {
            let (Some(price), Some(amount)) = (parse_f64(&entry.price), parse_f64(&entry.amount))
            else {
                continue;
            };
            let level = BookLevel { price, amount };
            let book = batch.entry(entry.symbol).or_default();
            match entry.side.as_deref() {
                Some("bid") => book.bids.push(level),
                Some("ask") => book.asks.push(level),
                _ => {}
            }
        }
        if !batch.is_empty() {
            self.store.replace_orderbooks(batch);
        }
    }

    fn apply_trades(&self, list: Vec<FrameEntry>) {
        let mut batch: Vec<(String, TradeDirection, Trade)> = Vec::new();
        for entry in list {
            let (Some(price), Some(amount)) = (parse_f64(&entry.price), parse_f64(&entry.amount))
            else {
                continue;
            };
            let direction = if entry.sell_flag.as_deref() == Some("1") {
                TradeDirection::Sell
            } else {
                TradeDirection::Buy
            };
            batch.push((entry.symbol, direction, Trade { price, amount }));
        }
        if !batch.is_empty() {
            self.store.record_trades(batch);
        }
    }
}
