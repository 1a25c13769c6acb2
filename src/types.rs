//! Arbitrage records and the per-cycle result snapshot.
//!
//! Record equality deliberately covers the identity fields only (symbol plus
//! both exchange/market pairs). The numeric fields are display data, so an
//! exclude entry loaded without prices still matches live records. That is
//! what makes exclude matching value-independent.

use std::collections::HashMap;
use std::fmt;

use crate::exchange::ExchangeId;
use crate::rates::RateSymbol;
use crate::symbol::Symbol;

/// The two arbitrage signals computed each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArbitrageType {
    OrderbookHighLow,
    TradePrice,
}

impl ArbitrageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArbitrageType::OrderbookHighLow => "orderbook_high_low",
            ArbitrageType::TradePrice => "trade_price",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "orderbook_high_low" => Some(ArbitrageType::OrderbookHighLow),
            "trade_price" => Some(ArbitrageType::TradePrice),
            _ => None,
        }
    }
}

impl fmt::Display for ArbitrageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One side of a comparison pair: a venue plus the canonical symbol it lists
/// for the shared base asset. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeSymbol {
    pub exchange: ExchangeId,
    pub symbol: Symbol,
}

impl ExchangeSymbol {
    pub fn new(exchange: ExchangeId, symbol: Symbol) -> Self {
        Self { exchange, symbol }
    }

    /// The quote currency of the listing.
    pub fn market(&self) -> &str {
        self.symbol.quote()
    }

    /// The traded base asset.
    pub fn trade(&self) -> &str {
        self.symbol.base()
    }
}

/// Display precision for record values.
const MAX_ZERO: i32 = 2;

pub fn round2(value: f64) -> f64 {
    let factor = 10f64.powi(MAX_ZERO);
    (value * factor).round() / factor
}

/// Comma-grouped number for alert text, e.g. `12,142,111.00`.
pub fn format_comma(value: f64) -> String {
    let negative = value < 0.0;
    let text = format!("{:.2}", round2(value.abs()));
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), "00"));
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if negative { "-" } else { "" };
    format!("{sign}{grouped}.{frac_part}")
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(format_comma).unwrap_or_else(|| "-".to_string())
}

/// Order-book spread arbitrage between one base/target exchange pair.
#[derive(Debug, Clone)]
pub struct OrderbookArbitrage {
    pub trade_symbol: String,
    pub base_exchange: ExchangeId,
    pub base_exchange_market: String,
    pub target_exchange: ExchangeId,
    pub target_exchange_market: String,
    pub base_high_bid_price: Option<f64>,
    pub target_low_ask_price: Option<f64>,
    pub arbitrage_percent: Option<f64>,
}

impl OrderbookArbitrage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        trade_symbol: String,
        base_exchange: ExchangeId,
        base_exchange_market: String,
        target_exchange: ExchangeId,
        target_exchange_market: String,
        base_high_bid_price: Option<f64>,
        target_low_ask_price: Option<f64>,
        arbitrage_percent: Option<f64>,
    ) -> Self {
        Self {
            trade_symbol,
            base_exchange,
            base_exchange_market,
            target_exchange,
            target_exchange_market,
            base_high_bid_price: base_high_bid_price.map(round2),
            target_low_ask_price: target_low_ask_price.map(round2),
            arbitrage_percent: arbitrage_percent.map(round2),
        }
    }
}

// Identity fields only; numeric fields never affect exclude matching.
impl PartialEq for OrderbookArbitrage {
    fn eq(&self, other: &Self) -> bool {
        self.trade_symbol == other.trade_symbol
            && self.base_exchange == other.base_exchange
            && self.base_exchange_market == other.base_exchange_market
            && self.target_exchange == other.target_exchange
            && self.target_exchange_market == other.target_exchange_market
    }
}

impl fmt::Display for OrderbookArbitrage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "arbitrage type: orderbook high low\n\
             trade symbol: [{}]\n\
             base exchange: [{}] base exchange market: [{}]\n\
             target exchange: [{}] target exchange market: [{}]\n\
             base high bid price: [{}] target low ask price: [{}]\n\
             arbitrage percent: [{}]",
            self.trade_symbol,
            self.base_exchange,
            self.base_exchange_market,
            self.target_exchange,
            self.target_exchange_market,
            fmt_opt(self.base_high_bid_price),
            fmt_opt(self.target_low_ask_price),
            fmt_opt(self.arbitrage_percent),
        )
    }
}

/// Last-trade-price arbitrage between one base/target exchange pair.
#[derive(Debug, Clone)]
pub struct TradeArbitrage {
    pub trade_symbol: String,
    pub base_exchange: ExchangeId,
    pub base_exchange_market: String,
    pub target_exchange: ExchangeId,
    pub target_exchange_market: String,
    pub base_trade_price: Option<f64>,
    pub target_trade_price: Option<f64>,
    pub arbitrage_percent: Option<f64>,
}

impl TradeArbitrage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        trade_symbol: String,
        base_exchange: ExchangeId,
        base_exchange_market: String,
        target_exchange: ExchangeId,
        target_exchange_market: String,
        base_trade_price: Option<f64>,
        target_trade_price: Option<f64>,
        arbitrage_percent: Option<f64>,
    ) -> Self {
        Self {
            trade_symbol,
            base_exchange,
            base_exchange_market,
            target_exchange,
            target_exchange_market,
            base_trade_price: base_trade_price.map(round2),
            target_trade_price: target_trade_price.map(round2),
            arbitrage_percent: arbitrage_percent.map(round2),
        }
    }
}

impl PartialEq for TradeArbitrage {
    fn eq(&self, other: &Self) -> bool {
        self.trade_symbol == other.trade_symbol
            && self.base_exchange == other.base_exchange
            && self.base_exchange_market == other.base_exchange_market
            && self.target_exchange == other.target_exchange
            && self.target_exchange_market == other.target_exchange_market
    }
}

impl fmt::Display for TradeArbitrage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "arbitrage type: trade price\n\
             trade symbol: [{}]\n\
             base exchange: [{}] base exchange market: [{}]\n\
             target exchange: [{}] target exchange market: [{}]\n\
             base trade price: [{}] target trade price: [{}]\n\
             arbitrage percent: [{}]",
            self.trade_symbol,
            self.base_exchange,
            self.base_exchange_market,
            self.target_exchange,
            self.target_exchange_market,
            fmt_opt(self.base_trade_price),
            fmt_opt(self.target_trade_price),
            fmt_opt(self.arbitrage_percent),
        )
    }
}

/// One engine cycle's complete result: all non-excluded records plus the
/// current conversion rates. Consumers only ever need the most recent one.
#[derive(Debug, Clone, Default)]
pub struct ArbitrageSnapshot {
    pub orderbook: Vec<OrderbookArbitrage>,
    pub trade: Vec<TradeArbitrage>,
    pub rates: HashMap<RateSymbol, f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orderbook_record(percent: Option<f64>) -> OrderbookArbitrage {
        OrderbookArbitrage::new(
            "BTC".to_string(),
            ExchangeId::Upbit,
            "KRW".to_string(),
            ExchangeId::Binance,
            "USDT".to_string(),
            Some(1000.0),
            Some(910.0),
            percent,
        )
    }

    #[test]
    fn values_rounded_at_construction() {
        let record = orderbook_record(Some(9.00123));
        assert_eq!(record.arbitrage_percent, Some(9.0));

        let record = OrderbookArbitrage::new(
            "BTC".to_string(),
            ExchangeId::Upbit,
            "KRW".to_string(),
            ExchangeId::Binance,
            "USDT".to_string(),
            Some(1234.56789),
            None,
            None,
        );
        assert_eq!(record.base_high_bid_price, Some(1234.57));
        // Absent values are tolerated and skipped from rounding.
        assert_eq!(record.target_low_ask_price, None);
    }

    #[test]
    fn equality_ignores_numeric_fields() {
        let a = orderbook_record(Some(9.0));
        let b = orderbook_record(Some(-3.25));
        let c = orderbook_record(None);
        assert_eq!(a, b);
        assert_eq!(a, c);

        let mut other = orderbook_record(Some(9.0));
        other.target_exchange = ExchangeId::Huobi;
        assert_ne!(a, other);
    }

    #[test]
    fn trade_record_equality_ignores_numeric_fields() {
        let a = TradeArbitrage::new(
            "ETH".to_string(),
            ExchangeId::Bithumb,
            "KRW".to_string(),
            ExchangeId::Mexc,
            "USDT".to_string(),
            Some(10.0),
            Some(11.0),
            Some(-10.0),
        );
        let mut b = a.clone();
        b.base_trade_price = None;
        b.arbitrage_percent = Some(42.0);
        assert_eq!(a, b);
    }

    #[test]
    fn comma_formatting() {
        assert_eq!(format_comma(12_142_111.0), "12,142,111.00");
        assert_eq!(format_comma(910.5), "910.50");
        assert_eq!(format_comma(-1300.0), "-1,300.00");
        assert_eq!(format_comma(0.0), "0.00");
    }
}
