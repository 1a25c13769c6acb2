//! Per-exchange in-memory market data cache.
//!
//! One `MarketDataStore` is owned by one exchange adapter. Its stream
//! subscriber is the single writer; the adapter's read accessors and the
//! engine are the only readers. Each data category (order book, trade,
//! candle) has its own lock, so order-book writes never block trade reads.
//!
//! Categories start out unpopulated and report that explicitly: a read before
//! the first write is `Err(NotPopulated)`, which is different from an empty
//! map after data has arrived.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{category} data not stored yet")]
    NotPopulated { category: &'static str },
}

/// A single executed trade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trade {
    pub price: f64,
    pub amount: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeDirection {
    Buy,
    Sell,
}

/// Latest trades per symbol, split by direction.
///
/// Every inbound trade overwrites its direction's slot and always `latest`.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeEntry {
    pub buy: Option<Trade>,
    pub sell: Option<Trade>,
    pub latest: Trade,
}

/// One price level of an order book side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BookLevel {
    pub price: f64,
    pub amount: f64,
}

/// Full-depth snapshot for one symbol. Replaced wholesale on every update
/// batch; no sort or uniqueness invariant is enforced here (readers compute
/// extremes themselves).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderBookEntry {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

#[derive(Debug, Default)]
pub struct MarketDataStore {
    // `None` until the category's first write; entries are never deleted.
    orderbook: Mutex<Option<HashMap<String, OrderBookEntry>>>,
    trade: Mutex<Option<HashMap<String, TradeEntry>>>,
    // Reserved category; candle frames are accepted but not yet stored.
    #[allow(dead_code)]
    candle: Mutex<Option<HashMap<String, ()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MarketDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the book for every symbol in the batch under one lock
    /// acquisition, so a reader never observes half of an update.
    pub fn replace_orderbooks(&self, batch: HashMap<String, OrderBookEntry>) {
        let mut guard = lock(&self.orderbook);
        let map = guard.get_or_insert_with(HashMap::new);
        for (symbol, entry) in batch {
            map.insert(symbol, entry);
        }
    }

    /// Fold a batch of trades into the per-symbol entries.
    pub fn record_trades(&self, batch: Vec<(String, TradeDirection, Trade)>) {
        let mut guard = lock(&self.trade);
        let map = guard.get_or_insert_with(HashMap::new);
        for (symbol, direction, trade) in batch {
            let entry = map.entry(symbol).or_insert(TradeEntry {
                buy: None,
                sell: None,
                latest: trade,
            });
            match direction {
                TradeDirection::Buy => entry.buy = Some(trade),
                TradeDirection::Sell => entry.sell = Some(trade),
            }
            entry.latest = trade;
        }
    }

    /// Immutable snapshot of the full order-book category, keyed by native
    /// symbol.
    pub fn orderbook_snapshot(&self) -> Result<HashMap<String, OrderBookEntry>, StoreError> {
        lock(&self.orderbook).clone().ok_or(StoreError::NotPopulated {
            category: "orderbook",
        })
    }

    /// Immutable snapshot of the full trade category, keyed by native symbol.
    pub fn trade_snapshot(&self) -> Result<HashMap<String, TradeEntry>, StoreError> {
        lock(&self.trade)
            .clone()
            .ok_or(StoreError::NotPopulated { category: "trade" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_store_reports_not_populated() {
        let store = MarketDataStore::new();
        assert_eq!(
            store.orderbook_snapshot(),
            Err(StoreError::NotPopulated {
                category: "orderbook"
            })
        );
        assert_eq!(
            store.trade_snapshot(),
            Err(StoreError::NotPopulated { category: "trade" })
        );
    }

    #[test]
    fn empty_after_first_write_is_not_an_error() {
        let store = MarketDataStore::new();
        store.replace_orderbooks(HashMap::new());
        assert_eq!(store.orderbook_snapshot(), Ok(HashMap::new()));
    }

    #[test]
    fn orderbook_update_replaces_wholesale() {
        let store = MarketDataStore::new();
        let mut batch = HashMap::new();
        batch.insert(
            "KRW_BTC".to_string(),
            OrderBookEntry {
                bids: vec![
                    BookLevel {
                        price: 100.0,
                        amount: 1.0,
                    },
                    BookLevel {
                        price: 105.0,
                        amount: 2.0,
                    },
                ],
                asks: vec![],
            },
        );
        store.replace_orderbooks(batch);

        // Second batch fully replaces the entry, it does not append.
        let mut batch = HashMap::new();
        batch.insert(
            "KRW_BTC".to_string(),
            OrderBookEntry {
                bids: vec![BookLevel {
                    price: 101.0,
                    amount: 3.0,
                }],
                asks: vec![BookLevel {
                    price: 110.0,
                    amount: 1.0,
                }],
            },
        );
        store.replace_orderbooks(batch);

        let snapshot = store.orderbook_snapshot().unwrap();
        let entry = &snapshot["KRW_BTC"];
        assert_eq!(entry.bids.len(), 1);
        assert_eq!(entry.bids[0].price, 101.0);
        assert_eq!(entry.asks.len(), 1);
    }

    #[test]
    fn trade_slots_update_independently_and_latest_follows() {
        let store = MarketDataStore::new();
        let buy = Trade {
            price: 10.0,
            amount: 1.0,
        };
        let sell = Trade {
            price: 11.0,
            amount: 2.0,
        };
        store.record_trades(vec![("KRW_XRP".to_string(), TradeDirection::Buy, buy)]);
        store.record_trades(vec![("KRW_XRP".to_string(), TradeDirection::Sell, sell)]);

        let snapshot = store.trade_snapshot().unwrap();
        let entry = &snapshot["KRW_XRP"];
        assert_eq!(entry.buy, Some(buy));
        assert_eq!(entry.sell, Some(sell));
        assert_eq!(entry.latest, sell);
    }
}
