//! Canonical trading-pair symbols and per-exchange codec.
//!
//! The whole system speaks `QUOTE_BASE` (e.g. `KRW_BTC`, `USDT_ETH`).
//! Exchanges differ only in the field order of their native pair strings, so
//! the codec is a single order strategy per exchange rather than scattered
//! string handling.

use std::fmt;

use thiserror::Error;

/// A pair string that does not split into exactly two non-empty halves.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("malformed symbol: {0:?}")]
pub struct MalformedSymbol(pub String);

/// Canonical `QUOTE_BASE` trading-pair identifier.
///
/// Invariant: exactly one underscore, both halves non-empty. Enforced at
/// construction, so accessors never fail.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(String);

impl Symbol {
    pub fn parse(raw: &str) -> Result<Self, MalformedSymbol> {
        let mut parts = raw.split('_');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(quote), Some(base), None) if !quote.is_empty() && !base.is_empty() => {
                Ok(Symbol(raw.to_string()))
            }
            _ => Err(MalformedSymbol(raw.to_string())),
        }
    }

    pub fn from_parts(quote: &str, base: &str) -> Result<Self, MalformedSymbol> {
        Self::parse(&format!("{quote}_{base}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The quote currency (the original's "market"), e.g. `KRW` of `KRW_BTC`.
    pub fn quote(&self) -> &str {
        self.0.split('_').next().unwrap_or_default()
    }

    /// The base asset (the original's "trade"), e.g. `BTC` of `KRW_BTC`.
    pub fn base(&self) -> &str {
        self.0.split('_').nth(1).unwrap_or_default()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Field order of an exchange's native pair string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeOrder {
    /// Native matches the canonical order (`KRW_BTC`).
    QuoteBase,
    /// Native is reversed (`BTC_KRW` for canonical `KRW_BTC`).
    BaseQuote,
}

pub fn to_native(order: NativeOrder, symbol: &Symbol) -> String {
    match order {
        NativeOrder::QuoteBase => symbol.as_str().to_string(),
        NativeOrder::BaseQuote => format!("{}_{}", symbol.base(), symbol.quote()),
    }
}

pub fn to_canonical(order: NativeOrder, native: &str) -> Result<Symbol, MalformedSymbol> {
    let mut parts = native.split('_');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(first), Some(second), None) if !first.is_empty() && !second.is_empty() => {
            match order {
                NativeOrder::QuoteBase => Symbol::from_parts(first, second),
                NativeOrder::BaseQuote => Symbol::from_parts(second, first),
            }
        }
        _ => Err(MalformedSymbol(native.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_symbol() {
        let symbol = Symbol::parse("KRW_BTC").unwrap();
        assert_eq!(symbol.quote(), "KRW");
        assert_eq!(symbol.base(), "BTC");
        assert_eq!(symbol.as_str(), "KRW_BTC");
    }

    #[test]
    fn parse_rejects_malformed() {
        for raw in ["KRWBTC", "KRW_BTC_X", "_BTC", "KRW_", "_", ""] {
            assert!(Symbol::parse(raw).is_err(), "accepted {raw:?}");
        }
    }

    #[test]
    fn round_trip_both_orders() {
        for raw in ["KRW_BTC", "USDT_ETH", "USD_DOGE"] {
            let symbol = Symbol::parse(raw).unwrap();
            for order in [NativeOrder::QuoteBase, NativeOrder::BaseQuote] {
                let native = to_native(order, &symbol);
                assert_eq!(to_canonical(order, &native).unwrap(), symbol);
            }
        }
    }

    #[test]
    fn base_quote_order_reverses_fields() {
        let symbol = Symbol::parse("KRW_XRP").unwrap();
        assert_eq!(to_native(NativeOrder::BaseQuote, &symbol), "XRP_KRW");
        assert_eq!(
            to_canonical(NativeOrder::BaseQuote, "XRP_KRW").unwrap(),
            symbol
        );
    }

    #[test]
    fn to_canonical_rejects_malformed_native() {
        assert!(to_canonical(NativeOrder::QuoteBase, "BTCKRW").is_err());
        assert!(to_canonical(NativeOrder::BaseQuote, "A_B_C").is_err());
    }
}
