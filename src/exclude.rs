//! SQLite-backed exclude list.
//!
//! One table, `exclude_set`, keyed by the full six-field identity tuple.
//! Registration is insert-or-ignore (duplicate registration is a no-op) and
//! revert deletes by exact key. Every operation retries up to three times,
//! reopening the connection between attempts to ride out transient
//! connection loss; exhausted retries surface as a failed result, never a
//! panic. Each write is a single statement, so a failed attempt leaves no
//! partial state behind.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection};
use thiserror::Error;
use tracing::{info, warn};

use crate::exchange::ExchangeId;
use crate::types::ArbitrageType;

const MAX_RETRY: usize = 3;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS exclude_set (
        arbitrage_type         TEXT NOT NULL,
        trade_symbol           TEXT NOT NULL,
        base_exchange          TEXT NOT NULL,
        base_exchange_market   TEXT NOT NULL,
        target_exchange        TEXT NOT NULL,
        target_exchange_market TEXT NOT NULL,
        PRIMARY KEY(
            arbitrage_type, trade_symbol,
            base_exchange, base_exchange_market,
            target_exchange, target_exchange_market
        )
    )
";

#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// One suppressed arbitrage pairing; the whole tuple is the primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludeRecord {
    pub arbitrage_type: ArbitrageType,
    pub trade_symbol: String,
    pub base_exchange: ExchangeId,
    pub base_exchange_market: String,
    pub target_exchange: ExchangeId,
    pub target_exchange_market: String,
}

enum Backing {
    File(PathBuf),
    // Reopening an in-memory database would drop its contents, so retries
    // reuse the live handle.
    Memory,
}

pub struct ExcludeStore {
    conn: Mutex<Connection>,
    backing: Backing,
}

fn lock(mutex: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ExcludeStore {
    /// Open or create the exclude database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        Ok(Self {
            conn: Mutex::new(conn),
            backing: Backing::File(path),
        })
    }

    /// In-memory store (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
            backing: Backing::Memory,
        })
    }

    /// Create the exclude table if it does not exist.
    pub fn migrate(&self) -> DbResult<()> {
        lock(&self.conn).execute_batch(SCHEMA)?;
        Ok(())
    }

    fn reconnect(&self, conn: &mut Connection) {
        if let Backing::File(path) = &self.backing {
            match Connection::open(path) {
                Ok(fresh) => {
                    let _ = fresh.execute_batch(SCHEMA);
                    *conn = fresh;
                }
                Err(err) => warn!(error = %err, "exclude store reconnect failed"),
            }
        }
    }

    /// Full exclude list, or `None` after every retry has failed.
    pub fn list(&self) -> Option<Vec<ExcludeRecord>> {
        let mut conn = lock(&self.conn);
        for attempt in 1..=MAX_RETRY {
            match Self::select_all(&conn) {
                Ok(records) => return Some(records),
                Err(err) => {
                    warn!(attempt, error = %err, "exclude list read failed, reconnecting");
                    self.reconnect(&mut conn);
                }
            }
        }
        warn!("exclude list read retries exhausted");
        None
    }

    /// Insert-or-ignore on the full key; `true` once the row is durably
    /// present (idempotent). `false` only after exhausted retries.
    pub fn register(&self, record: &ExcludeRecord) -> bool {
        let mut conn = lock(&self.conn);
        for attempt in 1..=MAX_RETRY {
            let result = conn.execute(
                "INSERT OR IGNORE INTO exclude_set (
                    arbitrage_type, trade_symbol,
                    base_exchange, base_exchange_market,
                    target_exchange, target_exchange_market
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.arbitrage_type.as_str(),
                    record.trade_symbol,
                    record.base_exchange.as_str(),
                    record.base_exchange_market,
                    record.target_exchange.as_str(),
                    record.target_exchange_market,
                ],
            );
            match result {
                Ok(_) => {
                    info!(
                        arbitrage_type = %record.arbitrage_type,
                        trade_symbol = %record.trade_symbol,
                        "exclude registered"
                    );
                    return true;
                }
                Err(err) => {
                    warn!(attempt, error = %err, "register exclude failed, reconnecting");
                    self.reconnect(&mut conn);
                }
            }
        }
        warn!("register exclude retries exhausted");
        false
    }

    /// Delete by exact key; a no-op when the record is absent. `false` only
    /// after exhausted retries.
    pub fn revert(&self, record: &ExcludeRecord) -> bool {
        let mut conn = lock(&self.conn);
        for attempt in 1..=MAX_RETRY {
            let result = conn.execute(
                "DELETE FROM exclude_set
                 WHERE arbitrage_type = ?1
                   AND trade_symbol = ?2
                   AND base_exchange = ?3
                   AND base_exchange_market = ?4
                   AND target_exchange = ?5
                   AND target_exchange_market = ?6",
                params![
                    record.arbitrage_type.as_str(),
                    record.trade_symbol,
                    record.base_exchange.as_str(),
                    record.base_exchange_market,
                    record.target_exchange.as_str(),
                    record.target_exchange_market,
                ],
            );
            match result {
                Ok(_) => {
                    info!(
                        arbitrage_type = %record.arbitrage_type,
                        trade_symbol = %record.trade_symbol,
                        "exclude reverted"
                    );
                    return true;
                }
                Err(err) => {
                    warn!(attempt, error = %err, "revert exclude failed, reconnecting");
                    self.reconnect(&mut conn);
                }
            }
        }
        warn!("revert exclude retries exhausted");
        false
    }

    fn select_all(conn: &Connection) -> rusqlite::Result<Vec<ExcludeRecord>> {
        let mut stmt = conn.prepare(
            "SELECT arbitrage_type, trade_symbol,
                    base_exchange, base_exchange_market,
                    target_exchange, target_exchange_market
             FROM exclude_set",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (kind, symbol, base, base_market, target, target_market) = row?;
            let (Some(arbitrage_type), Some(base_exchange), Some(target_exchange)) = (
                ArbitrageType::from_str(&kind),
                ExchangeId::from_str(&base),
                ExchangeId::from_str(&target),
            ) else {
                warn!(%kind, %base, %target, "unrecognized exclude row skipped");
                continue;
            };
            records.push(ExcludeRecord {
                arbitrage_type,
                trade_symbol: symbol,
                base_exchange,
                base_exchange_market: base_market,
                target_exchange,
                target_exchange_market: target_market,
            });
        }
        Ok(records)
    }
}
