//! Process configuration from environment variables, `.env` friendly.
//! Every knob has a default; a malformed value falls back with a warning
//! instead of aborting startup.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::exchange::ReconnectPolicy;

const DEFAULT_ORDERBOOK_THRESHOLD: f64 = 3.0;
const DEFAULT_TRADE_THRESHOLD: f64 = 3.0;
const DEFAULT_DB_PATH: &str = "data/exclude.db";
const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;
const DEFAULT_RATE_URL: &str =
    "https://quotation-api-cdn.dunamu.com/v1/forex/recent?codes=FRX.KRWUSD";

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Minimum absolute spread percent for an order-book alert.
    pub orderbook_alert_threshold: f64,
    /// Minimum absolute spread percent for a trade-price alert.
    pub trade_alert_threshold: f64,
    /// Location of the exclude-list database.
    pub db_path: PathBuf,
    /// Stream supervision after a disconnect. `WS_RECONNECT_DELAY_SECS=0`
    /// means a closed stream stays closed.
    pub reconnect_policy: ReconnectPolicy,
    /// Endpoint serving the recent USD/KRW close.
    pub usd_krw_rate_url: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            orderbook_alert_threshold: DEFAULT_ORDERBOOK_THRESHOLD,
            trade_alert_threshold: DEFAULT_TRADE_THRESHOLD,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            reconnect_policy: reconnect_from_secs(DEFAULT_RECONNECT_DELAY_SECS),
            usd_krw_rate_url: DEFAULT_RATE_URL.to_string(),
        }
    }
}

impl MonitorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            orderbook_alert_threshold: env_parse(
                "ORDERBOOK_ALERT_THRESHOLD",
                defaults.orderbook_alert_threshold,
            ),
            trade_alert_threshold: env_parse(
                "TRADE_ALERT_THRESHOLD",
                defaults.trade_alert_threshold,
            ),
            db_path: std::env::var("DB_PATH")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            reconnect_policy: reconnect_from_secs(env_parse(
                "WS_RECONNECT_DELAY_SECS",
                DEFAULT_RECONNECT_DELAY_SECS,
            )),
            usd_krw_rate_url: std::env::var("USD_KRW_RATE_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.usd_krw_rate_url),
        }
    }
}

fn reconnect_from_secs(secs: u64) -> ReconnectPolicy {
    if secs == 0 {
        ReconnectPolicy::Never
    } else {
        ReconnectPolicy::FixedDelay(Duration::from_secs(secs))
    }
}

fn env_parse<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) if !raw.is_empty() => raw.parse().unwrap_or_else(|_| {
            warn!(key, %raw, "unparseable value, using default");
            default
        }),
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = MonitorConfig::default();
        assert_eq!(config.orderbook_alert_threshold, 3.0);
        assert_eq!(config.trade_alert_threshold, 3.0);
        assert_eq!(config.db_path, PathBuf::from("data/exclude.db"));
        assert_eq!(
            config.reconnect_policy,
            ReconnectPolicy::FixedDelay(Duration::from_secs(5))
        );
    }

    #[test]
    fn zero_delay_disables_reconnection() {
        assert_eq!(reconnect_from_secs(0), ReconnectPolicy::Never);
        assert_eq!(
            reconnect_from_secs(7),
            ReconnectPolicy::FixedDelay(Duration::from_secs(7))
        );
    }
}
