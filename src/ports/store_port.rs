//! Durable storage port trait.
//!
//! Players, assets, the transaction log, and watchlists are durable and
//! replay-capable; account and cache state are derivable and never stored.

use std::collections::HashMap;

use crate::domain::asset::Asset;
use crate::domain::error::PapertradeError;
use crate::domain::player::Player;
use crate::domain::transaction::Transaction;

pub trait StorePort: Send + Sync {
    fn save_player(&self, player: &Player) -> Result<(), PapertradeError>;

    fn save_asset(&self, asset: &Asset) -> Result<(), PapertradeError>;

    /// Persist a committed transaction. Called before the in-memory commit;
    /// a failure here aborts the trade.
    fn append_transaction(&self, txn: &Transaction) -> Result<(), PapertradeError>;

    /// Replace a player's stored watchlist with the given symbols.
    fn save_watchlist(&self, player_id: u64, symbols: &[String]) -> Result<(), PapertradeError>;

    fn load_players(&self) -> Result<Vec<Player>, PapertradeError>;

    fn load_assets(&self) -> Result<Vec<Asset>, PapertradeError>;

    /// The full transaction log, ordered per player oldest first.
    fn load_transactions(&self) -> Result<Vec<Transaction>, PapertradeError>;

    fn load_watchlists(&self) -> Result<HashMap<u64, Vec<String>>, PapertradeError>;
}
