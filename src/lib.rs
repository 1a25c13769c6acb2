//! Cross-Exchange Arbitrage Monitor
//!
//! Watches spot markets on five exchanges, keeps per-exchange market data in
//! lock-protected caches fed by streaming subscribers, and continuously
//! compares every ordered pair of venues listing the same asset. Two signals
//! are computed per pair: the order-book high/low spread (base best bid vs
//! target best ask) and the last-trade-price spread, both converted to KRW
//! before comparison. Records that clear a configurable threshold are pushed
//! to a Telegram alert sink; uninteresting pairings can be excluded through
//! a SQLite-backed exclude list reloaded at runtime.

pub mod config;
pub mod engine;
pub mod exchange;
pub mod exclude;
pub mod monitor;
pub mod notify;
pub mod rates;
pub mod store;
pub mod symbol;
pub mod types;
