//! Transactions, the atomic unit of the ledger.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }

    pub fn parse(value: &str) -> Option<Side> {
        match value.to_lowercase().as_str() {
            "buy" => Some(Side::Buy),
            "sell" => Some(Side::Sell),
            _ => None,
        }
    }
}

/// A committed trade. Immutable once appended to the ledger; corrections
/// happen via compensating transactions, never edits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    /// Monotonic per player, starting at 1.
    pub id: u64,
    pub player_id: u64,
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub price: f64,
    pub fee: f64,
    pub timestamp: DateTime<Utc>,
    /// Cash balance immediately after this transaction applied.
    pub cash_after: f64,
}

impl Transaction {
    pub fn notional(&self) -> f64 {
        self.quantity * self.price
    }

    /// Signed cash movement: buys pay notional plus fee, sells receive
    /// notional minus fee.
    pub fn cash_delta(&self) -> f64 {
        match self.side {
            Side::Buy => -(self.notional() + self.fee),
            Side::Sell => self.notional() - self.fee,
        }
    }

    /// Signed quantity movement for the holding fold.
    pub fn quantity_delta(&self) -> f64 {
        match self.side {
            Side::Buy => self.quantity,
            Side::Sell => -self.quantity,
        }
    }
}

/// A fully validated trade awaiting its ledger id.
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    pub player_id: u64,
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub price: f64,
    pub fee: f64,
    pub timestamp: DateTime<Utc>,
    pub cash_after: f64,
}

impl PendingTransaction {
    pub fn into_transaction(self, id: u64) -> Transaction {
        Transaction {
            id,
            player_id: self.player_id,
            symbol: self.symbol,
            side: self.side,
            quantity: self.quantity,
            price: self.price,
            fee: self.fee,
            timestamp: self.timestamp,
            cash_after: self.cash_after,
        }
    }
}
