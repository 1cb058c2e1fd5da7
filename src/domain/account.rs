//! Per-player account state and statistics.
//!
//! An account is the mutable aggregate derived from the ledger: cash,
//! holdings, volume-weighted average cost, and trade statistics, updated
//! incrementally as transactions commit. It is an optimization over the
//! ledger fold, never the source of truth: [`Account::reconcile`] rebuilds
//! it from a full replay.

use std::collections::HashMap;

use serde::Serialize;

use super::ledger::{Ledger, QTY_EPSILON};
use super::transaction::{Side, Transaction};

/// Running trade statistics, derivable by replay.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlayerStats {
    pub total_trades: u64,
    pub realized_pnl: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
}

#[derive(Debug)]
pub struct Account {
    player_id: u64,
    starting_cash: f64,
    cash: f64,
    holdings: HashMap<String, f64>,
    avg_cost: HashMap<String, f64>,
    stats: PlayerStats,
}

impl Account {
    pub fn new(player_id: u64, starting_cash: f64) -> Self {
        Account {
            player_id,
            starting_cash,
            cash: starting_cash,
            holdings: HashMap::new(),
            avg_cost: HashMap::new(),
            stats: PlayerStats::default(),
        }
    }

    pub fn player_id(&self) -> u64 {
        self.player_id
    }

    pub fn starting_cash(&self) -> f64 {
        self.starting_cash
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn holding(&self, symbol: &str) -> f64 {
        self.holdings.get(symbol).copied().unwrap_or(0.0)
    }

    pub fn holdings(&self) -> &HashMap<String, f64> {
        &self.holdings
    }

    /// Volume-weighted average entry price for a held symbol.
    pub fn avg_cost(&self, symbol: &str) -> Option<f64> {
        self.avg_cost.get(symbol).copied()
    }

    pub fn stats(&self) -> &PlayerStats {
        &self.stats
    }

    /// Apply a committed transaction. Returns the realized profit or loss
    /// for sells.
    ///
    /// The caller (the engine's per-player critical section) has already
    /// validated funds and holdings; apply itself never rejects.
    pub fn apply(&mut self, txn: &Transaction) -> Option<f64> {
        self.cash += txn.cash_delta();
        self.stats.total_trades += 1;

        match txn.side {
            Side::Buy => {
                let held = self.holding(&txn.symbol);
                let avg = self.avg_cost(&txn.symbol).unwrap_or(0.0);
                let new_qty = held + txn.quantity;
                let new_avg = (held * avg + txn.quantity * txn.price) / new_qty;
                self.holdings.insert(txn.symbol.clone(), new_qty);
                self.avg_cost.insert(txn.symbol.clone(), new_avg);
                None
            }
            Side::Sell => {
                let avg = self.avg_cost(&txn.symbol).unwrap_or(txn.price);
                let realized = (txn.price - avg) * txn.quantity - txn.fee;

                let remaining = self.holding(&txn.symbol) - txn.quantity;
                if remaining.abs() <= QTY_EPSILON {
                    self.holdings.remove(&txn.symbol);
                    self.avg_cost.remove(&txn.symbol);
                } else {
                    self.holdings.insert(txn.symbol.clone(), remaining);
                }

                self.stats.realized_pnl += realized;
                if realized > self.stats.best_trade {
                    self.stats.best_trade = realized;
                }
                if realized < self.stats.worst_trade {
                    self.stats.worst_trade = realized;
                }
                Some(realized)
            }
        }
    }

    /// Discard the incremental state and rebuild it by replaying the
    /// player's full transaction sequence from the ledger.
    pub fn reconcile(&mut self, ledger: &Ledger) {
        let mut rebuilt = Account::new(self.player_id, self.starting_cash);
        for txn in ledger.transactions_for(self.player_id) {
            rebuilt.apply(&txn);
        }
        *self = rebuilt;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transaction::PendingTransaction;
    use chrono::Utc;

    fn txn(id: u64, symbol: &str, side: Side, qty: f64, price: f64, fee: f64) -> Transaction {
        Transaction {
            id,
            player_id: 1,
            symbol: symbol.into(),
            side,
            quantity: qty,
            price,
            fee,
            timestamp: Utc::now(),
            cash_after: 0.0,
        }
    }

    #[test]
    fn buy_updates_cash_and_average_cost() {
        let mut account = Account::new(1, 10_000.0);
        account.apply(&txn(1, "XYZ", Side::Buy, 10.0, 50.0, 0.0));

        assert!((account.cash() - 9_500.0).abs() < f64::EPSILON);
        assert!((account.holding("XYZ") - 10.0).abs() < f64::EPSILON);
        assert!((account.avg_cost("XYZ").unwrap() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn repeated_buys_blend_average_cost() {
        let mut account = Account::new(1, 10_000.0);
        account.apply(&txn(1, "XYZ", Side::Buy, 10.0, 50.0, 0.0));
        account.apply(&txn(2, "XYZ", Side::Buy, 10.0, 70.0, 0.0));

        // (10*50 + 10*70) / 20 = 60
        assert!((account.avg_cost("XYZ").unwrap() - 60.0).abs() < f64::EPSILON);
        assert!((account.holding("XYZ") - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn sell_realizes_pnl_against_average_cost() {
        let mut account = Account::new(1, 10_000.0);
        account.apply(&txn(1, "XYZ", Side::Buy, 10.0, 50.0, 0.0));
        let realized = account.apply(&txn(2, "XYZ", Side::Sell, 5.0, 60.0, 3.0));

        // (60 - 50) * 5 - 3 = 47
        assert!((realized.unwrap() - 47.0).abs() < f64::EPSILON);
        assert!((account.stats().realized_pnl - 47.0).abs() < f64::EPSILON);
        assert!((account.stats().best_trade - 47.0).abs() < f64::EPSILON);
    }

    #[test]
    fn losing_sell_updates_worst_trade() {
        let mut account = Account::new(1, 10_000.0);
        account.apply(&txn(1, "XYZ", Side::Buy, 10.0, 50.0, 0.0));
        let realized = account.apply(&txn(2, "XYZ", Side::Sell, 10.0, 40.0, 0.0));

        assert!((realized.unwrap() - (-100.0)).abs() < f64::EPSILON);
        assert!((account.stats().worst_trade - (-100.0)).abs() < f64::EPSILON);
        assert!((account.stats().best_trade - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn selling_everything_drops_the_holding() {
        let mut account = Account::new(1, 10_000.0);
        account.apply(&txn(1, "XYZ", Side::Buy, 10.0, 50.0, 0.0));
        account.apply(&txn(2, "XYZ", Side::Sell, 10.0, 55.0, 0.0));

        assert!(account.holdings().is_empty());
        assert!(account.avg_cost("XYZ").is_none());
    }

    #[test]
    fn trade_counter_covers_both_sides() {
        let mut account = Account::new(1, 10_000.0);
        account.apply(&txn(1, "XYZ", Side::Buy, 10.0, 50.0, 0.0));
        account.apply(&txn(2, "XYZ", Side::Sell, 5.0, 60.0, 0.0));
        assert_eq!(account.stats().total_trades, 2);
    }

    #[test]
    fn reconcile_matches_incremental_state() {
        let mut ledger = Ledger::new();
        let mut incremental = Account::new(1, 10_000.0);

        let trades = [
            ("XYZ", Side::Buy, 10.0, 50.0, 5.0),
            ("ABC", Side::Buy, 4.0, 25.0, 1.0),
            ("XYZ", Side::Sell, 6.0, 55.0, 2.0),
            ("XYZ", Side::Buy, 2.0, 52.0, 1.0),
        ];
        for (symbol, side, qty, price, fee) in trades {
            let committed = ledger.append(PendingTransaction {
                player_id: 1,
                symbol: symbol.into(),
                side,
                quantity: qty,
                price,
                fee,
                timestamp: Utc::now(),
                cash_after: 0.0,
            });
            incremental.apply(&committed);
        }

        let mut reconciled = Account::new(1, 10_000.0);
        reconciled.reconcile(&ledger);

        assert!((reconciled.cash() - incremental.cash()).abs() < 1e-9);
        assert_eq!(reconciled.holdings().len(), incremental.holdings().len());
        for (symbol, qty) in incremental.holdings() {
            assert!((reconciled.holding(symbol) - qty).abs() < 1e-9);
        }
        assert_eq!(reconciled.stats(), incremental.stats());
    }
}
