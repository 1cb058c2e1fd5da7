//! Append-only transaction log and replay fold.
//!
//! The ledger is the authoritative source for a player's cash and holdings:
//! both are reconstructed by folding that player's transaction sequence from
//! their starting cash. Entries are never removed or reordered.

use std::collections::HashMap;

use super::transaction::{PendingTransaction, Transaction};

/// Holdings below this are treated as fully closed and dropped.
pub const QTY_EPSILON: f64 = 1e-9;

/// Cash and holdings reconstructed from a transaction sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerState {
    pub cash: f64,
    pub holdings: HashMap<String, f64>,
}

impl LedgerState {
    pub fn holding_qty(&self, symbol: &str) -> f64 {
        self.holdings.get(symbol).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Default)]
pub struct Ledger {
    entries: Vec<Transaction>,
    next_ids: HashMap<u64, u64>,
}

impl Ledger {
    pub fn new() -> Self {
        Ledger::default()
    }

    /// Rebuild a ledger from a durable log. Entries must already carry
    /// their committed ids; per-player id counters resume past the highest
    /// seen.
    pub fn restore(entries: Vec<Transaction>) -> Self {
        let mut next_ids: HashMap<u64, u64> = HashMap::new();
        for txn in &entries {
            let next = next_ids.entry(txn.player_id).or_insert(1);
            if txn.id >= *next {
                *next = txn.id + 1;
            }
        }
        Ledger { entries, next_ids }
    }

    /// Build the transaction a pending trade would commit as, without
    /// inserting it. Pair with [`Ledger::commit`] to split id assignment
    /// from insertion when a durable store must accept the entry first.
    pub fn stage(&self, pending: PendingTransaction) -> Transaction {
        let id = self
            .next_ids
            .get(&pending.player_id)
            .copied()
            .unwrap_or(1);
        pending.into_transaction(id)
    }

    /// Insert a staged transaction. Ids must arrive in order; a staged
    /// entry is only valid while no other transaction for the same player
    /// has been committed in between.
    pub fn commit(&mut self, txn: Transaction) {
        debug_assert_eq!(
            txn.id,
            self.next_ids.get(&txn.player_id).copied().unwrap_or(1),
            "staged transaction committed out of order"
        );
        self.next_ids.insert(txn.player_id, txn.id + 1);
        self.entries.push(txn);
    }

    /// Append a pending trade: assigns the player's next monotonic id and
    /// commits in one step.
    pub fn append(&mut self, pending: PendingTransaction) -> Transaction {
        let txn = self.stage(pending);
        self.commit(txn.clone());
        txn
    }

    /// All of a player's transactions, oldest first, append-order-stable.
    pub fn transactions_for(&self, player_id: u64) -> Vec<Transaction> {
        self.entries
            .iter()
            .filter(|t| t.player_id == player_id)
            .cloned()
            .collect()
    }

    pub fn all(&self) -> &[Transaction] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reconstruct a player's state by replaying their full sequence.
    pub fn compute_state(&self, player_id: u64, starting_cash: f64) -> LedgerState {
        let txns = self.transactions_for(player_id);
        fold(&txns, starting_cash)
    }
}

/// Deterministic, idempotent fold of an ordered transaction sequence.
///
/// Pure: no external reads, so recomputation from the same sequence always
/// yields the same state. Holdings folded down to zero are dropped.
pub fn fold(transactions: &[Transaction], starting_cash: f64) -> LedgerState {
    let mut cash = starting_cash;
    let mut holdings: HashMap<String, f64> = HashMap::new();

    for txn in transactions {
        cash += txn.cash_delta();
        *holdings.entry(txn.symbol.clone()).or_insert(0.0) += txn.quantity_delta();
    }

    holdings.retain(|_, qty| qty.abs() > QTY_EPSILON);
    LedgerState { cash, holdings }
}
