//! Cross-currency conversion rates.
//!
//! The tether rate is implied from the two BTC reference prices: Upbit's
//! KRW price divided by Binance's USDT price. The USD rate comes from an
//! external provider. All sources are best-effort; a missing source leaves
//! the previously cached value in place instead of producing a NaN.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

/// Keys of the tracked conversion rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateSymbol {
    KrwBtc,
    KrwEth,
    UsdtBtc,
    KrwUsdt,
    KrwUsd,
}

impl RateSymbol {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateSymbol::KrwBtc => "KRW_BTC",
            RateSymbol::KrwEth => "KRW_ETH",
            RateSymbol::UsdtBtc => "USDT_BTC",
            RateSymbol::KrwUsdt => "KRW_USDT",
            RateSymbol::KrwUsd => "KRW_USD",
        }
    }
}

impl fmt::Display for RateSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last known conversion rates.
#[derive(Debug, Clone, Default)]
pub struct RateTable {
    rates: HashMap<RateSymbol, f64>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, symbol: RateSymbol) -> Option<f64> {
        self.rates.get(&symbol).copied()
    }

    pub fn set(&mut self, symbol: RateSymbol, value: f64) {
        self.rates.insert(symbol, value);
    }

    pub fn snapshot(&self) -> HashMap<RateSymbol, f64> {
        self.rates.clone()
    }
}

/// Convert a quoted price into the process-wide common currency (KRW).
/// Returns `None` when the needed rate is not known yet.
pub fn convert_to_krw(quote: &str, price: f64, rates: &RateTable) -> Option<f64> {
    match quote {
        "USDT" => rates.get(RateSymbol::KrwUsdt).map(|rate| price * rate),
        "USD" => rates.get(RateSymbol::KrwUsd).map(|rate| price * rate),
        _ => Some(price),
    }
}

/// External source for the most recent USD/KRW close. Failure is an absent
/// value, never an error.
#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn usd_krw(&self) -> Option<f64>;
}

/// HTTP rate provider. Expects a payload with the most recent close first:
/// `{"recent": [{"close": 1387.2}, ...]}`.
pub struct HttpRateProvider {
    client: reqwest::Client,
    url: String,
}

impl HttpRateProvider {
    pub fn new(url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client, url }
    }
}

#[async_trait]
impl RateProvider for HttpRateProvider {
    async fn usd_krw(&self) -> Option<f64> {
        let response = match self.client.get(&self.url).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "usd/krw rate request failed");
                return None;
            }
        };
        let payload: serde_json::Value = match response.json().await {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "usd/krw rate body unreadable");
                return None;
            }
        };
        if let Some(message) = payload.get("message").and_then(|m| m.as_str()) {
            warn!(message, "usd/krw rate error response");
            return None;
        }
        payload
            .get("recent")
            .and_then(|recent| recent.as_array())
            .and_then(|entries| entries.first())
            .and_then(|entry| entry.get("close"))
            .and_then(|close| close.as_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usdt_prices_convert_with_cached_rate() {
        let mut rates = RateTable::new();
        rates.set(RateSymbol::KrwUsdt, 1300.0);
        assert_eq!(convert_to_krw("USDT", 10.0, &rates), Some(13_000.0));
    }

    #[test]
    fn krw_prices_pass_through() {
        let rates = RateTable::new();
        assert_eq!(convert_to_krw("KRW", 910.0, &rates), Some(910.0));
    }

    #[test]
    fn missing_rate_yields_absent_not_nan() {
        let rates = RateTable::new();
        assert_eq!(convert_to_krw("USDT", 10.0, &rates), None);
        assert_eq!(convert_to_krw("USD", 10.0, &rates), None);
    }

    #[test]
    fn usd_prices_use_the_external_rate() {
        let mut rates = RateTable::new();
        rates.set(RateSymbol::KrwUsd, 1400.0);
        assert_eq!(convert_to_krw("USD", 2.0, &rates), Some(2800.0));
    }
}
