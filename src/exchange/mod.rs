//! Exchange adapters: symbol discovery over REST, normalized read accessors
//! over the live cache, and subscription management for the streaming feed.
//!
//! The engine depends only on the [`ExchangeAdapter`] capability trait; the
//! shared [`SpotAdapter`] implements it once, driven by a per-venue
//! [`ExchangeProfile`].

pub mod adapter;
pub mod profile;
pub mod stream;

pub use adapter::SpotAdapter;
pub use profile::ExchangeProfile;
pub use stream::{ReconnectPolicy, StreamSubscriber};

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::store::{StoreError, Trade};
use crate::symbol::{self, MalformedSymbol, NativeOrder, Symbol};

/// The five supported venues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeId {
    Upbit,
    Bithumb,
    Binance,
    Huobi,
    Mexc,
}

impl ExchangeId {
    pub const ALL: [ExchangeId; 5] = [
        ExchangeId::Upbit,
        ExchangeId::Bithumb,
        ExchangeId::Binance,
        ExchangeId::Huobi,
        ExchangeId::Mexc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeId::Upbit => "upbit",
            ExchangeId::Bithumb => "bithumb",
            ExchangeId::Binance => "binance",
            ExchangeId::Huobi => "huobi",
            ExchangeId::Mexc => "mexc",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "upbit" => Some(ExchangeId::Upbit),
            "bithumb" => Some(ExchangeId::Bithumb),
            "binance" => Some(ExchangeId::Binance),
            "huobi" => Some(ExchangeId::Huobi),
            "mexc" => Some(ExchangeId::Mexc),
            _ => None,
        }
    }

    /// Quote currencies this venue is compared on.
    /// Upbit and Bithumb list fiat markets; the rest are tether venues.
    pub fn quote_currencies(&self) -> &'static [&'static str] {
        match self {
            ExchangeId::Upbit | ExchangeId::Bithumb => &["KRW"],
            ExchangeId::Binance | ExchangeId::Huobi | ExchangeId::Mexc => &["USDT"],
        }
    }

    /// Field order of the venue's native pair strings.
    pub fn native_order(&self) -> NativeOrder {
        match self {
            ExchangeId::Bithumb => NativeOrder::BaseQuote,
            _ => NativeOrder::QuoteBase,
        }
    }

    pub fn to_native(&self, s: &Symbol) -> String {
        symbol::to_native(self.native_order(), s)
    }

    pub fn to_canonical(&self, native: &str) -> Result<Symbol, MalformedSymbol> {
        symbol::to_canonical(self.native_order(), native)
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single failure shape for every remote call. Network errors, timeouts and
/// error-bodied responses all collapse into this; callers only get a message
/// and a suggested backoff.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ApiError {
    pub message: String,
    pub wait_time: Duration,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            wait_time: Duration::from_secs(1),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Best bid / best ask currently cached for one symbol. A side that has no
/// levels is absent rather than zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BookExtremes {
    pub bid: Option<f64>,
    pub ask: Option<f64>,
}

/// Capability set every exchange exposes to the engine.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    fn id(&self) -> ExchangeId;

    /// Canonical symbols listed on the venue. Retried internally; an empty
    /// list after exhausted retries, never an error.
    async fn available_symbols(&self) -> Vec<Symbol>;

    /// Max bid / min ask per cached symbol. Pure cache aggregation, no
    /// network. Fails only while the order-book category is unpopulated.
    fn orderbook_extremes(&self) -> Result<HashMap<Symbol, BookExtremes>, StoreError>;

    /// The `latest` trade of every cached symbol. Same failure mode.
    fn latest_trades(&self) -> Result<HashMap<Symbol, Trade>, StoreError>;

    async fn subscribe_orderbook(&self, symbols: &[Symbol]) -> ApiResult<()>;
    async fn subscribe_trade(&self, symbols: &[Symbol]) -> ApiResult<()>;
    async fn unsubscribe_orderbook(&self, symbol: &Symbol) -> ApiResult<()>;
    async fn unsubscribe_trade(&self, symbol: &Symbol) -> ApiResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_round_trips_through_strings() {
        for id in ExchangeId::ALL {
            assert_eq!(ExchangeId::from_str(id.as_str()), Some(id));
        }
        assert_eq!(ExchangeId::from_str("ftx"), None);
    }

    #[test]
    fn codec_round_trips_for_every_exchange() {
        for raw in ["KRW_BTC", "USDT_DOGE", "USD_ETH"] {
            let symbol = Symbol::parse(raw).unwrap();
            for id in ExchangeId::ALL {
                let native = id.to_native(&symbol);
                assert_eq!(id.to_canonical(&native).unwrap(), symbol, "{id}");
            }
        }
    }

    #[test]
    fn bithumb_native_is_reversed() {
        let symbol = Symbol::parse("KRW_XRP").unwrap();
        assert_eq!(ExchangeId::Bithumb.to_native(&symbol), "XRP_KRW");
        assert_eq!(ExchangeId::Upbit.to_native(&symbol), "KRW_XRP");
    }
}
