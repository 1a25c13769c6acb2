//! Static per-venue wiring: REST endpoints, streaming URL and market
//! segments. One constructor per supported exchange.

use super::ExchangeId;

/// Description of one venue's public surface. The listing endpoints are
/// tagged with the quote currency they cover; venues with several market
/// segments (e.g. Bithumb's BTC and KRW boards) list one path per segment
/// and the results are merged.
#[derive(Debug, Clone)]
pub struct ExchangeProfile {
    pub id: ExchangeId,
    pub rest_base: &'static str,
    pub ticker_paths: &'static [(&'static str, &'static str)],
    pub ws_url: &'static str,
}

impl ExchangeProfile {
    pub fn upbit() -> Self {
        Self {
            id: ExchangeId::Upbit,
            rest_base: "https://api.upbit.com",
            ticker_paths: &[("/v1/ticker/all?market=KRW", "KRW")],
            ws_url: "wss://api.upbit.com/websocket/v1",
        }
    }

    pub fn bithumb() -> Self {
        Self {
            id: ExchangeId::Bithumb,
            rest_base: "https://api.bithumb.com",
            ticker_paths: &[
                ("/public/ticker/ALL_BTC", "BTC"),
                ("/public/ticker/ALL_KRW", "KRW"),
            ],
            ws_url: "wss://pubwss.bithumb.com/pub/ws",
        }
    }

    pub fn binance() -> Self {
        Self {
            id: ExchangeId::Binance,
            rest_base: "https://api.binance.com",
            ticker_paths: &[("/api/v3/ticker/all?market=USDT", "USDT")],
            ws_url: "wss://stream.binance.com:9443/ws",
        }
    }

    pub fn huobi() -> Self {
        Self {
            id: ExchangeId::Huobi,
            rest_base: "https://api.huobi.pro",
            ticker_paths: &[("/market/tickers?market=USDT", "USDT")],
            ws_url: "wss://api.huobi.pro/ws",
        }
    }

    pub fn mexc() -> Self {
        Self {
            id: ExchangeId::Mexc,
            rest_base: "https://api.mexc.com",
            ticker_paths: &[("/api/v3/ticker/all?market=USDT", "USDT")],
            ws_url: "wss://wbs.mexc.com/ws",
        }
    }

    pub fn for_id(id: ExchangeId) -> Self {
        match id {
            ExchangeId::Upbit => Self::upbit(),
            ExchangeId::Bithumb => Self::bithumb(),
            ExchangeId::Binance => Self::binance(),
            ExchangeId::Huobi => Self::huobi(),
            ExchangeId::Mexc => Self::mexc(),
        }
    }
}
