//! Comparison engine: pairs up venues listing the same base asset and
//! computes the per-pair arbitrage records every cycle.
//!
//! The pair universe is fixed at startup from the discovery pass; the steady
//! state loop reads only the live caches plus the rate table, so one slow
//! venue cannot stall a cycle. Excluded pairings are filtered before the
//! snapshot is published, and a reload signal re-reads the exclude list
//! between cycles.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::exchange::{BookExtremes, ExchangeAdapter, ExchangeId};
use crate::exclude::{ExcludeRecord, ExcludeStore};
use crate::rates::{convert_to_krw, RateProvider, RateSymbol, RateTable};
use crate::store::Trade;
use crate::symbol::Symbol;
use crate::types::{
    ArbitrageSnapshot, ArbitrageType, ExchangeSymbol, OrderbookArbitrage, TradeArbitrage,
};

/// How long one cycle waits for a reload signal before proceeding. This is
/// also the effective cycle pacing when no signal arrives.
const RELOAD_POLL: Duration = Duration::from_millis(100);

/// Reference symbols the rate derivation reads from the caches.
const BTC: &str = "BTC";
const ETH: &str = "ETH";

pub struct ArbitrageEngine {
    adapters: Vec<Arc<dyn ExchangeAdapter>>,
    pairs: Vec<(ExchangeSymbol, ExchangeSymbol)>,
    exclude_store: Arc<ExcludeStore>,
    excluded_orderbook: Vec<OrderbookArbitrage>,
    excluded_trade: Vec<TradeArbitrage>,
    rate_provider: Arc<dyn RateProvider>,
    rates: RateTable,
    snapshot_tx: mpsc::UnboundedSender<ArbitrageSnapshot>,
    reload_rx: mpsc::UnboundedReceiver<bool>,
}

impl ArbitrageEngine {
    /// Discovery pass: list each venue's symbols on its compared quote
    /// currencies, build the ordered pair universe, subscribe the streaming
    /// feeds for every symbol the pairs reference, and load the exclude
    /// list.
    pub async fn init(
        adapters: Vec<Arc<dyn ExchangeAdapter>>,
        exclude_store: Arc<ExcludeStore>,
        rate_provider: Arc<dyn RateProvider>,
        snapshot_tx: mpsc::UnboundedSender<ArbitrageSnapshot>,
        reload_rx: mpsc::UnboundedReceiver<bool>,
    ) -> Self {
        let mut listings: Vec<(ExchangeId, HashMap<String, Symbol>)> = Vec::new();
        for adapter in &adapters {
            let id = adapter.id();
            let symbols: Vec<Symbol> = adapter
                .available_symbols()
                .await
                .into_iter()
                .filter(|s| id.quote_currencies().contains(&s.quote()))
                .collect();
            info!(exchange = %id, count = symbols.len(), "symbols discovered");

            let by_base = symbols
                .into_iter()
                .map(|s| (s.base().to_string(), s))
                .collect();
            listings.push((id, by_base));
        }

        // Ordered cross product: (a, b) and (b, a) are distinct pairs, since
        // base and target play different roles in the signal.
        let mut pairs = Vec::new();
        for (base_idx, (base_id, base_symbols)) in listings.iter().enumerate() {
            for (target_idx, (target_id, target_symbols)) in listings.iter().enumerate() {
                if base_idx == target_idx {
                    continue;
                }
                for (asset, base_symbol) in base_symbols {
                    if let Some(target_symbol) = target_symbols.get(asset) {
                        pairs.push((
                            ExchangeSymbol::new(*base_id, base_symbol.clone()),
                            ExchangeSymbol::new(*target_id, target_symbol.clone()),
                        ));
                    }
                }
            }
        }
        info!(pairs = pairs.len(), "pair universe built");

        // Only symbols that appear in at least one comparison pair get
        // subscribed; a listing with no counterpart venue stays cold.
        let mut referenced: HashMap<ExchangeId, BTreeSet<Symbol>> = HashMap::new();
        for (base, target) in &pairs {
            referenced
                .entry(base.exchange)
                .or_default()
                .insert(base.symbol.clone());
            referenced
                .entry(target.exchange)
                .or_default()
                .insert(target.symbol.clone());
        }
        for adapter in &adapters {
            let id = adapter.id();
            let Some(set) = referenced.get(&id) else {
                continue;
            };
            let symbols: Vec<Symbol> = set.iter().cloned().collect();
            if let Err(err) = adapter.subscribe_orderbook(&symbols).await {
                warn!(exchange = %id, error = %err, "orderbook subscription failed");
            }
            if let Err(err) = adapter.subscribe_trade(&symbols).await {
                warn!(exchange = %id, error = %err, "trade subscription failed");
            }
        }

        let mut engine = Self {
            adapters,
            pairs,
            exclude_store,
            excluded_orderbook: Vec::new(),
            excluded_trade: Vec::new(),
            rate_provider,
            rates: RateTable::new(),
            snapshot_tx,
            reload_rx,
        };
        engine.reload_excludes();
        engine
    }

    /// Main loop: poll for a reload signal, refresh rates, compute and
    /// publish one snapshot. Stops when either channel end goes away.
    pub async fn run(mut self) {
        loop {
            match tokio::time::timeout(RELOAD_POLL, self.reload_rx.recv()).await {
                Ok(Some(true)) => self.reload_excludes(),
                Ok(Some(false)) => {}
                Ok(None) => {
                    info!("reload channel closed, engine stopping");
                    return;
                }
                // No signal this cycle.
                Err(_) => {}
            }

            self.refresh_rates().await;
            let snapshot = self.compute_cycle();
            if self.snapshot_tx.send(snapshot).is_err() {
                info!("snapshot consumer gone, engine stopping");
                return;
            }
        }
    }

    fn reload_excludes(&mut self) {
        let Some(records) = self.exclude_store.list() else {
            warn!("exclude list unavailable, keeping previous exclusions");
            return;
        };
        self.excluded_orderbook.clear();
        self.excluded_trade.clear();
        for record in records {
            match record.arbitrage_type {
                ArbitrageType::OrderbookHighLow => {
                    self.excluded_orderbook.push(orderbook_probe(&record));
                }
                ArbitrageType::TradePrice => {
                    self.excluded_trade.push(trade_probe(&record));
                }
            }
        }
        info!(
            orderbook = self.excluded_orderbook.len(),
            trade = self.excluded_trade.len(),
            "exclude list loaded"
        );
    }

    fn adapter(&self, id: ExchangeId) -> Option<&Arc<dyn ExchangeAdapter>> {
        self.adapters.iter().find(|a| a.id() == id)
    }

    fn cached_trade_price(&self, id: ExchangeId, quote: &str, base: &str) -> Option<f64> {
        let adapter = self.adapter(id)?;
        let trades = adapter.latest_trades().ok()?;
        let symbol = Symbol::from_parts(quote, base).ok()?;
        trades.get(&symbol).map(|trade| trade.price)
    }

    /// Refresh the rate table. The BTC reference prices come straight from
    /// the caches; the tether rate is implied from them and the USD rate is
    /// fetched externally. A missing source keeps the previous value.
    async fn refresh_rates(&mut self) {
        if let Some(krw_btc) = self.cached_trade_price(ExchangeId::Upbit, "KRW", BTC) {
            self.rates.set(RateSymbol::KrwBtc, krw_btc);
        }
        if let Some(krw_eth) = self.cached_trade_price(ExchangeId::Upbit, "KRW", ETH) {
            self.rates.set(RateSymbol::KrwEth, krw_eth);
        }
        if let Some(usdt_btc) = self.cached_trade_price(ExchangeId::Binance, "USDT", BTC) {
            self.rates.set(RateSymbol::UsdtBtc, usdt_btc);
        }

        if let (Some(krw_btc), Some(usdt_btc)) = (
            self.rates.get(RateSymbol::KrwBtc),
            self.rates.get(RateSymbol::UsdtBtc),
        ) {
            if usdt_btc > 0.0 {
                self.rates.set(RateSymbol::KrwUsdt, krw_btc / usdt_btc);
            }
        }

        if let Some(usd_krw) = self.rate_provider.usd_krw().await {
            self.rates.set(RateSymbol::KrwUsd, usd_krw);
        }
    }

    /// One full pass over the pair universe against the current caches.
    fn compute_cycle(&self) -> ArbitrageSnapshot {
        let mut extremes: HashMap<ExchangeId, HashMap<Symbol, BookExtremes>> = HashMap::new();
        let mut trades: HashMap<ExchangeId, HashMap<Symbol, Trade>> = HashMap::new();
        for adapter in &self.adapters {
            let id = adapter.id();
            match adapter.orderbook_extremes() {
                Ok(map) => {
                    extremes.insert(id, map);
                }
                Err(err) => debug!(exchange = %id, error = %err, "orderbook cache not ready"),
            }
            match adapter.latest_trades() {
                Ok(map) => {
                    trades.insert(id, map);
                }
                Err(err) => debug!(exchange = %id, error = %err, "trade cache not ready"),
            }
        }

        let mut snapshot = ArbitrageSnapshot {
            rates: self.rates.snapshot(),
            ..Default::default()
        };
        for (base, target) in &self.pairs {
            if let Some(record) = self.orderbook_record(base, target, &extremes) {
                if !self.excluded_orderbook.contains(&record) {
                    snapshot.orderbook.push(record);
                }
            }
            if let Some(record) = self.trade_record(base, target, &trades) {
                if !self.excluded_trade.contains(&record) {
                    snapshot.trade.push(record);
                }
            }
        }
        snapshot
    }

    fn orderbook_record(
        &self,
        base: &ExchangeSymbol,
        target: &ExchangeSymbol,
        extremes: &HashMap<ExchangeId, HashMap<Symbol, BookExtremes>>,
    ) -> Option<OrderbookArbitrage> {
        let base_bid = extremes.get(&base.exchange)?.get(&base.symbol)?.bid?;
        let target_ask = extremes.get(&target.exchange)?.get(&target.symbol)?.ask?;
        if base_bid == 0.0 || target_ask == 0.0 {
            return None;
        }

        let base_bid = convert_to_krw(base.market(), base_bid, &self.rates)?;
        let target_ask = convert_to_krw(target.market(), target_ask, &self.rates)?;
        let percent = arbitrage_percent(base_bid, target_ask);

        Some(OrderbookArbitrage::new(
            base.trade().to_string(),
            base.exchange,
            base.market().to_string(),
            target.exchange,
            target.market().to_string(),
            Some(base_bid),
            Some(target_ask),
            percent,
        ))
    }

    fn trade_record(
        &self,
        base: &ExchangeSymbol,
        target: &ExchangeSymbol,
        trades: &HashMap<ExchangeId, HashMap<Symbol, Trade>>,
    ) -> Option<TradeArbitrage> {
        let base_price = trades.get(&base.exchange)?.get(&base.symbol)?.price;
        let target_price = trades.get(&target.exchange)?.get(&target.symbol)?.price;
        if base_price == 0.0 || target_price == 0.0 {
            return None;
        }

        let base_price = convert_to_krw(base.market(), base_price, &self.rates)?;
        let target_price = convert_to_krw(target.market(), target_price, &self.rates)?;
        let percent = arbitrage_percent(base_price, target_price);

        Some(TradeArbitrage::new(
            base.trade().to_string(),
            base.exchange,
            base.market().to_string(),
            target.exchange,
            target.market().to_string(),
            Some(base_price),
            Some(target_price),
            percent,
        ))
    }
}

/// Spread relative to the base side. Absent when the base value is zero.
fn arbitrage_percent(base: f64, target: f64) -> Option<f64> {
    if base == 0.0 {
        return None;
    }
    Some((base - target) / base * 100.0)
}

/// Value-free record used to match live records against an exclude entry;
/// equality covers identity fields only.
fn orderbook_probe(record: &ExcludeRecord) -> OrderbookArbitrage {
    OrderbookArbitrage::new(
        record.trade_symbol.clone(),
        record.base_exchange,
        record.base_exchange_market.clone(),
        record.target_exchange,
        record.target_exchange_market.clone(),
        None,
        None,
        None,
    )
}

fn trade_probe(record: &ExcludeRecord) -> TradeArbitrage {
    TradeArbitrage::new(
        record.trade_symbol.clone(),
        record.base_exchange,
        record.base_exchange_market.clone(),
        record.target_exchange,
        record.target_exchange_market.clone(),
        None,
        None,
        None,
    )
}
