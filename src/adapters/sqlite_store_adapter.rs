//! SQLite storage adapter.
//!
//! Durable, replay-capable store for players, assets, the transaction log,
//! and watchlists. Account and cache state are derivable and never stored.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

use crate::domain::asset::{Asset, AssetClass};
use crate::domain::error::PapertradeError;
use crate::domain::player::Player;
use crate::domain::transaction::{Side, Transaction};
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::StorePort;

pub struct SqliteStoreAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStoreAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, PapertradeError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| PapertradeError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e: r2d2::Error| PapertradeError::Store {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, PapertradeError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| PapertradeError::Store {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    pub fn initialize_schema(&self) -> Result<(), PapertradeError> {
        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS players (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                starting_cash REAL NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS assets (
                symbol TEXT PRIMARY KEY,
                class TEXT NOT NULL,
                exchange TEXT
            );
            CREATE TABLE IF NOT EXISTS transactions (
                player_id INTEGER NOT NULL,
                id INTEGER NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                quantity REAL NOT NULL,
                price REAL NOT NULL,
                fee REAL NOT NULL,
                timestamp TEXT NOT NULL,
                cash_after REAL NOT NULL,
                PRIMARY KEY (player_id, id)
            );
            CREATE INDEX IF NOT EXISTS idx_transactions_symbol ON transactions(symbol);
            CREATE TABLE IF NOT EXISTS watchlists (
                player_id INTEGER NOT NULL,
                symbol TEXT NOT NULL,
                PRIMARY KEY (player_id, symbol)
            );",
        )
        .map_err(|e: rusqlite::Error| PapertradeError::StoreQuery {
            reason: e.to_string(),
        })?;

        Ok(())
    }

    fn conn(
        &self,
    ) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, PapertradeError> {
        self.pool
            .get()
            .map_err(|e: r2d2::Error| PapertradeError::Store {
                reason: e.to_string(),
            })
    }
}

fn query_err(e: rusqlite::Error) -> PapertradeError {
    PapertradeError::StoreQuery {
        reason: e.to_string(),
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, PapertradeError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| PapertradeError::StoreQuery {
            reason: format!("invalid timestamp '{value}': {e}"),
        })
}

impl StorePort for SqliteStoreAdapter {
    fn save_player(&self, player: &Player) -> Result<(), PapertradeError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO players (id, name, starting_cash, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                player.id as i64,
                player.name,
                player.starting_cash,
                player.created_at.to_rfc3339()
            ],
        )
        .map_err(query_err)?;
        Ok(())
    }

    fn save_asset(&self, asset: &Asset) -> Result<(), PapertradeError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO assets (symbol, class, exchange) VALUES (?1, ?2, ?3)",
            params![asset.symbol, asset.class.as_str(), asset.exchange],
        )
        .map_err(query_err)?;
        Ok(())
    }

    fn append_transaction(&self, txn: &Transaction) -> Result<(), PapertradeError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO transactions
                 (player_id, id, symbol, side, quantity, price, fee, timestamp, cash_after)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                txn.player_id as i64,
                txn.id as i64,
                txn.symbol,
                txn.side.as_str(),
                txn.quantity,
                txn.price,
                txn.fee,
                txn.timestamp.to_rfc3339(),
                txn.cash_after
            ],
        )
        .map_err(query_err)?;
        Ok(())
    }

    fn save_watchlist(&self, player_id: u64, symbols: &[String]) -> Result<(), PapertradeError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        tx.execute(
            "DELETE FROM watchlists WHERE player_id = ?1",
            params![player_id as i64],
        )
        .map_err(query_err)?;
        for symbol in symbols {
            tx.execute(
                "INSERT INTO watchlists (player_id, symbol) VALUES (?1, ?2)",
                params![player_id as i64, symbol],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        Ok(())
    }

    fn load_players(&self) -> Result<Vec<Player>, PapertradeError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id, name, starting_cash, created_at FROM players ORDER BY id")
            .map_err(query_err)?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(query_err)?;

        let mut players = Vec::new();
        for row in rows {
            let (id, name, starting_cash, created_at) = row.map_err(query_err)?;
            players.push(Player {
                id: id as u64,
                name,
                starting_cash,
                created_at: parse_timestamp(&created_at)?,
            });
        }
        Ok(players)
    }

    fn load_assets(&self) -> Result<Vec<Asset>, PapertradeError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT symbol, class, exchange FROM assets ORDER BY symbol")
            .map_err(query_err)?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })
            .map_err(query_err)?;

        let mut assets = Vec::new();
        for row in rows {
            let (symbol, class_str, exchange) = row.map_err(query_err)?;
            let class =
                AssetClass::parse(&class_str).ok_or_else(|| PapertradeError::StoreQuery {
                    reason: format!("unknown asset class '{class_str}' for {symbol}"),
                })?;
            assets.push(Asset {
                symbol,
                class,
                exchange,
            });
        }
        Ok(assets)
    }

    fn load_transactions(&self) -> Result<Vec<Transaction>, PapertradeError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT player_id, id, symbol, side, quantity, price, fee, timestamp, cash_after
                 FROM transactions ORDER BY player_id, id",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, f64>(5)?,
                    row.get::<_, f64>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, f64>(8)?,
                ))
            })
            .map_err(query_err)?;

        let mut transactions = Vec::new();
        for row in rows {
            let (player_id, id, symbol, side_str, quantity, price, fee, timestamp, cash_after) =
                row.map_err(query_err)?;
            let side = Side::parse(&side_str).ok_or_else(|| PapertradeError::StoreQuery {
                reason: format!("unknown side '{side_str}' in transaction {player_id}/{id}"),
            })?;
            transactions.push(Transaction {
                id: id as u64,
                player_id: player_id as u64,
                symbol,
                side,
                quantity,
                price,
                fee,
                timestamp: parse_timestamp(&timestamp)?,
                cash_after,
            });
        }
        Ok(transactions)
    }

    fn load_watchlists(&self) -> Result<HashMap<u64, Vec<String>>, PapertradeError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT player_id, symbol FROM watchlists ORDER BY player_id, symbol")
            .map_err(query_err)?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(query_err)?;

        let mut watchlists: HashMap<u64, Vec<String>> = HashMap::new();
        for row in rows {
            let (player_id, symbol) = row.map_err(query_err)?;
            watchlists.entry(player_id as u64).or_default().push(symbol);
        }
        Ok(watchlists)
    }
}
