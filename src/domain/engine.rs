//! Trade orchestration: validation, fee computation, atomic application.
//!
//! [`SimContext`] owns the registries and the ledger for one simulation;
//! several contexts can run isolated in a single process. The
//! [`SimulationEngine`] validates and executes trades against a context,
//! serializing execution per player: read-validate-append runs under the
//! player's account lock, so two concurrent trades from one player can
//! never both pass validation against the same snapshot. Trades from
//! different players do not block each other.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;

use super::account::{Account, PlayerStats};
use super::asset::{normalize_symbol, validate_symbol, Asset, AssetClass};
use super::config::SimConfig;
use super::error::{PapertradeError, TradeError};
use super::ledger::{Ledger, LedgerState};
use super::player::Player;
use super::price_cache::PriceCache;
use super::transaction::{PendingTransaction, Side, Transaction};
use crate::ports::store_port::StorePort;

/// What to do when the only available quote is a stale fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StalePolicy {
    #[default]
    Accept,
    Reject,
}

/// Committed trade plus the realized profit or loss for sells.
#[derive(Debug, Clone, Serialize)]
pub struct TradeReceipt {
    pub transaction: Transaction,
    pub realized_pnl: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HoldingView {
    pub symbol: String,
    pub quantity: f64,
    pub avg_cost: f64,
    pub last_price: f64,
    pub market_value: f64,
    pub unrealized_pnl: f64,
    /// Set when the price came from a fallback rather than a usable quote.
    pub price_degraded: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioView {
    pub player_id: u64,
    pub name: String,
    pub cash: f64,
    pub holdings: Vec<HoldingView>,
    pub total_value: f64,
    /// True when any holding was valued off a fallback price.
    pub partial: bool,
    pub stats: PlayerStats,
}

/// Point-in-time portfolio worth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Valuation {
    pub total: f64,
    pub partial: bool,
}

/// Registries and ledger for one isolated simulation.
pub struct SimContext {
    players: RwLock<HashMap<u64, Player>>,
    assets: RwLock<HashMap<String, Asset>>,
    accounts: RwLock<HashMap<u64, Arc<Mutex<Account>>>>,
    watchlists: RwLock<HashMap<u64, BTreeSet<String>>>,
    ledger: Mutex<Ledger>,
    next_player_id: AtomicU64,
}

impl SimContext {
    pub fn new() -> Self {
        SimContext {
            players: RwLock::new(HashMap::new()),
            assets: RwLock::new(HashMap::new()),
            accounts: RwLock::new(HashMap::new()),
            watchlists: RwLock::new(HashMap::new()),
            ledger: Mutex::new(Ledger::new()),
            next_player_id: AtomicU64::new(1),
        }
    }

    /// Rebuild a context from a durable store by replaying the stored
    /// transaction log into fresh accounts.
    pub fn restore(store: &dyn StorePort) -> Result<Self, PapertradeError> {
        let stored_players = store.load_players()?;
        let stored_assets = store.load_assets()?;
        let transactions = store.load_transactions()?;
        let stored_watchlists = store.load_watchlists()?;

        let ledger = Ledger::restore(transactions);

        let mut players = HashMap::new();
        let mut accounts = HashMap::new();
        let mut max_id = 0;
        for player in stored_players {
            max_id = max_id.max(player.id);
            let mut account = Account::new(player.id, player.starting_cash);
            account.reconcile(&ledger);
            accounts.insert(player.id, Arc::new(Mutex::new(account)));
            players.insert(player.id, player);
        }

        let mut assets = HashMap::new();
        for asset in stored_assets {
            assets.insert(asset.symbol.clone(), asset);
        }

        let mut watchlists: HashMap<u64, BTreeSet<String>> = HashMap::new();
        for (player_id, symbols) in stored_watchlists {
            watchlists.insert(player_id, symbols.into_iter().collect());
        }

        Ok(SimContext {
            players: RwLock::new(players),
            assets: RwLock::new(assets),
            accounts: RwLock::new(accounts),
            watchlists: RwLock::new(watchlists),
            ledger: Mutex::new(ledger),
            next_player_id: AtomicU64::new(max_id + 1),
        })
    }

    pub fn player(&self, player_id: u64) -> Option<Player> {
        let players = self.players.read().unwrap_or_else(PoisonError::into_inner);
        players.get(&player_id).cloned()
    }

    /// All players, ordered by id.
    pub fn players(&self) -> Vec<Player> {
        let players = self.players.read().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<Player> = players.values().cloned().collect();
        all.sort_by_key(|p| p.id);
        all
    }

    pub fn asset(&self, symbol: &str) -> Option<Asset> {
        let assets = self.assets.read().unwrap_or_else(PoisonError::into_inner);
        assets.get(symbol).cloned()
    }

    /// All registered assets, ordered by symbol.
    pub fn assets(&self) -> Vec<Asset> {
        let assets = self.assets.read().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<Asset> = assets.values().cloned().collect();
        all.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        all
    }

    fn account(&self, player_id: u64) -> Option<Arc<Mutex<Account>>> {
        let accounts = self.accounts.read().unwrap_or_else(PoisonError::into_inner);
        accounts.get(&player_id).cloned()
    }

    /// Union of every player's holdings and watchlist, sorted. The
    /// background refresher warms the cache for exactly this set.
    pub fn active_symbols(&self) -> Vec<String> {
        let mut symbols: BTreeSet<String> = BTreeSet::new();

        {
            let accounts = self.accounts.read().unwrap_or_else(PoisonError::into_inner);
            for account in accounts.values() {
                let account = account.lock().unwrap_or_else(PoisonError::into_inner);
                symbols.extend(account.holdings().keys().cloned());
            }
        }
        {
            let watchlists = self
                .watchlists
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            for watched in watchlists.values() {
                symbols.extend(watched.iter().cloned());
            }
        }

        symbols.into_iter().collect()
    }

    /// Audit hook: a player's state recomputed by full ledger replay,
    /// independent of the incremental account.
    pub fn replay_state(&self, player_id: u64) -> Option<LedgerState> {
        let starting_cash = self.player(player_id)?.starting_cash;
        let ledger = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
        Some(ledger.compute_state(player_id, starting_cash))
    }
}

impl Default for SimContext {
    fn default() -> Self {
        SimContext::new()
    }
}

pub struct SimulationEngine {
    ctx: Arc<SimContext>,
    cache: Arc<PriceCache>,
    config: SimConfig,
    store: Option<Arc<dyn StorePort>>,
}

impl SimulationEngine {
    pub fn new(ctx: Arc<SimContext>, cache: Arc<PriceCache>, config: SimConfig) -> Self {
        SimulationEngine {
            ctx,
            cache,
            config,
            store: None,
        }
    }

    /// Attach a durable store. New players, assets, watchlist changes, and
    /// transactions are persisted before they are committed in memory.
    pub fn with_store(mut self, store: Arc<dyn StorePort>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn context(&self) -> &Arc<SimContext> {
        &self.ctx
    }

    pub fn cache(&self) -> &Arc<PriceCache> {
        &self.cache
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn create_player(&self, name: &str) -> Result<Player, PapertradeError> {
        self.create_player_with_cash(name, self.config.starting_cash)
    }

    pub fn create_player_with_cash(
        &self,
        name: &str,
        starting_cash: f64,
    ) -> Result<Player, PapertradeError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PapertradeError::ConfigInvalid {
                section: "player".into(),
                key: "name".into(),
                reason: "name must not be empty".into(),
            });
        }
        if !(starting_cash.is_finite() && starting_cash > 0.0) {
            return Err(PapertradeError::ConfigInvalid {
                section: "player".into(),
                key: "starting_cash".into(),
                reason: "starting cash must be positive".into(),
            });
        }

        let player = Player {
            id: self.ctx.next_player_id.fetch_add(1, Ordering::SeqCst),
            name: name.to_string(),
            starting_cash,
            created_at: Utc::now(),
        };

        if let Some(store) = &self.store {
            store.save_player(&player)?;
        }

        {
            let mut accounts = self
                .ctx
                .accounts
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            accounts.insert(
                player.id,
                Arc::new(Mutex::new(Account::new(player.id, starting_cash))),
            );
        }
        {
            let mut players = self
                .ctx
                .players
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            players.insert(player.id, player.clone());
        }

        info!(
            "created player {} ({}) with {:.2} starting cash",
            player.id, player.name, starting_cash
        );
        Ok(player)
    }

    /// Register a tradable asset. Registering an identical asset twice is
    /// idempotent; conflicting re-registration is rejected since assets
    /// are immutable.
    pub fn register_asset(
        &self,
        symbol: &str,
        class: AssetClass,
        exchange: Option<&str>,
    ) -> Result<Asset, PapertradeError> {
        let symbol = normalize_symbol(symbol);
        validate_symbol(&symbol)?;

        let asset = Asset {
            symbol: symbol.clone(),
            class,
            exchange: exchange.map(str::to_string),
        };

        if let Some(existing) = self.ctx.asset(&symbol) {
            if existing == asset {
                return Ok(existing);
            }
            return Err(PapertradeError::ConfigInvalid {
                section: "asset".into(),
                key: symbol,
                reason: "already registered with different class or exchange".into(),
            });
        }

        if let Some(store) = &self.store {
            store.save_asset(&asset)?;
        }

        let mut assets = self
            .ctx
            .assets
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        assets.insert(symbol, asset.clone());
        Ok(asset)
    }

    pub fn buy(
        &self,
        player_id: u64,
        symbol: &str,
        quantity: f64,
        policy: StalePolicy,
    ) -> Result<TradeReceipt, PapertradeError> {
        self.execute(player_id, symbol, Side::Buy, quantity, policy)
    }

    pub fn sell(
        &self,
        player_id: u64,
        symbol: &str,
        quantity: f64,
    ) -> Result<TradeReceipt, PapertradeError> {
        self.execute(player_id, symbol, Side::Sell, quantity, StalePolicy::Accept)
    }

    /// Validate and apply one trade. Fails fast on the first violation:
    /// unknown symbol, invalid quantity, unavailable price, insufficient
    /// funds/holdings, then the stale-quote policy. Any failure leaves all
    /// state unchanged.
    fn execute(
        &self,
        player_id: u64,
        symbol: &str,
        side: Side,
        quantity: f64,
        policy: StalePolicy,
    ) -> Result<TradeReceipt, PapertradeError> {
        let symbol = normalize_symbol(symbol);
        let asset = self
            .ctx
            .asset(&symbol)
            .ok_or_else(|| TradeError::UnknownSymbol(symbol.clone()))?;

        if !(quantity.is_finite() && quantity > 0.0) {
            return Err(TradeError::InvalidQuantity(quantity).into());
        }

        let account_arc = self
            .ctx
            .account(player_id)
            .ok_or(TradeError::UnknownPlayer(player_id))?;

        // Per-player critical section: everything from the cash/holdings
        // read to the ledger append happens under this lock.
        let mut account = account_arc.lock().unwrap_or_else(PoisonError::into_inner);

        let now = Utc::now();
        let quote = self
            .cache
            .quote_at(&asset.symbol, now)
            .map_err(|source| TradeError::PriceUnavailable {
                symbol: asset.symbol.clone(),
                source,
            })?;

        let notional = quantity * quote.price;
        let fee = self.config.fees.fee(notional);

        let cash_delta = match side {
            Side::Buy => {
                let cost = notional + fee;
                if cost > account.cash() {
                    return Err(TradeError::InsufficientFunds {
                        required: cost,
                        available: account.cash(),
                    }
                    .into());
                }
                -cost
            }
            Side::Sell => {
                let held = account.holding(&asset.symbol);
                if quantity > held {
                    return Err(TradeError::InsufficientHoldings {
                        symbol: asset.symbol.clone(),
                        requested: quantity,
                        held,
                    }
                    .into());
                }
                notional - fee
            }
        };

        if policy == StalePolicy::Reject && quote.stale {
            return Err(TradeError::StalePrice {
                symbol: asset.symbol.clone(),
            }
            .into());
        }

        let pending = PendingTransaction {
            player_id,
            symbol: asset.symbol.clone(),
            side,
            quantity,
            // Price captured at validation time; no re-quoting between
            // validation and append.
            price: quote.price,
            fee,
            timestamp: now,
            cash_after: account.cash() + cash_delta,
        };

        let committed = {
            let mut ledger = self
                .ctx
                .ledger
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let staged = ledger.stage(pending);
            if let Some(store) = &self.store {
                store.append_transaction(&staged)?;
            }
            ledger.commit(staged.clone());
            staged
        };

        let realized_pnl = account.apply(&committed);

        info!(
            "player {} {} {} {} @ {:.2} (fee {:.2}, cash {:.2})",
            player_id,
            side.as_str(),
            quantity,
            committed.symbol,
            committed.price,
            committed.fee,
            committed.cash_after,
        );

        Ok(TradeReceipt {
            transaction: committed,
            realized_pnl,
        })
    }

    pub fn portfolio_view(&self, player_id: u64) -> Result<PortfolioView, PapertradeError> {
        self.build_view(player_id, None)
    }

    /// Portfolio valued against historical prices at `as_of`.
    pub fn portfolio_view_at(
        &self,
        player_id: u64,
        as_of: DateTime<Utc>,
    ) -> Result<PortfolioView, PapertradeError> {
        self.build_view(player_id, Some(as_of))
    }

    pub fn history(&self, player_id: u64) -> Result<Vec<Transaction>, PapertradeError> {
        if self.ctx.player(player_id).is_none() {
            return Err(TradeError::UnknownPlayer(player_id).into());
        }
        let ledger = self
            .ctx
            .ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(ledger.transactions_for(player_id))
    }

    /// Rank all players by portfolio value. Best-effort concurrent
    /// snapshot: accounts are read one at a time, so a portfolio may be
    /// observed mid-update across players. The ranking is advisory.
    pub fn leaderboard(&self) -> Vec<super::leaderboard::LeaderboardEntry> {
        let now = Utc::now();
        let rows: Vec<(Player, Valuation)> = self
            .ctx
            .players()
            .into_iter()
            .filter_map(|player| {
                let account_arc = self.ctx.account(player.id)?;
                let valuation = {
                    let account = account_arc.lock().unwrap_or_else(PoisonError::into_inner);
                    self.valuation_of(&account, now)
                };
                Some((player, valuation))
            })
            .collect();
        super::leaderboard::rank_entries(rows)
    }

    pub fn watchlist_add(&self, player_id: u64, symbol: &str) -> Result<bool, PapertradeError> {
        let symbol = normalize_symbol(symbol);
        if self.ctx.asset(&symbol).is_none() {
            return Err(TradeError::UnknownSymbol(symbol).into());
        }
        self.mutate_watchlist(player_id, |watched| watched.insert(symbol.clone()))
    }

    pub fn watchlist_remove(&self, player_id: u64, symbol: &str) -> Result<bool, PapertradeError> {
        let symbol = normalize_symbol(symbol);
        self.mutate_watchlist(player_id, |watched| watched.remove(&symbol))
    }

    pub fn watchlist(&self, player_id: u64) -> Result<Vec<String>, PapertradeError> {
        if self.ctx.player(player_id).is_none() {
            return Err(TradeError::UnknownPlayer(player_id).into());
        }
        let watchlists = self
            .ctx
            .watchlists
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(watchlists
            .get(&player_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn mutate_watchlist<F>(&self, player_id: u64, mutate: F) -> Result<bool, PapertradeError>
    where
        F: FnOnce(&mut BTreeSet<String>) -> bool,
    {
        if self.ctx.player(player_id).is_none() {
            return Err(TradeError::UnknownPlayer(player_id).into());
        }

        let mut watchlists = self
            .ctx
            .watchlists
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut updated = watchlists.get(&player_id).cloned().unwrap_or_default();
        let changed = mutate(&mut updated);

        if changed {
            if let Some(store) = &self.store {
                let symbols: Vec<String> = updated.iter().cloned().collect();
                store.save_watchlist(player_id, &symbols)?;
            }
            debug!("player {} watchlist now has {} symbols", player_id, updated.len());
            watchlists.insert(player_id, updated);
        }
        Ok(changed)
    }

    fn build_view(
        &self,
        player_id: u64,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<PortfolioView, PapertradeError> {
        let player = self
            .ctx
            .player(player_id)
            .ok_or(TradeError::UnknownPlayer(player_id))?;
        let account_arc = self
            .ctx
            .account(player_id)
            .ok_or(TradeError::UnknownPlayer(player_id))?;
        let account = account_arc.lock().unwrap_or_else(PoisonError::into_inner);

        let now = Utc::now();
        let mut symbols: Vec<&String> = account.holdings().keys().collect();
        symbols.sort();

        let mut holdings = Vec::with_capacity(symbols.len());
        let mut partial = false;
        for symbol in symbols {
            let quantity = account.holding(symbol);
            let avg_cost = account.avg_cost(symbol).unwrap_or(0.0);
            let (price, degraded) = self.resolve_price(symbol, as_of, now, &account);
            partial |= degraded;
            holdings.push(HoldingView {
                symbol: symbol.clone(),
                quantity,
                avg_cost,
                last_price: price,
                market_value: quantity * price,
                unrealized_pnl: (price - avg_cost) * quantity,
                price_degraded: degraded,
            });
        }

        let total_value = account.cash() + holdings.iter().map(|h| h.market_value).sum::<f64>();

        Ok(PortfolioView {
            player_id,
            name: player.name,
            cash: account.cash(),
            holdings,
            total_value,
            partial,
            stats: account.stats().clone(),
        })
    }

    fn valuation_of(&self, account: &Account, now: DateTime<Utc>) -> Valuation {
        let mut total = account.cash();
        let mut partial = false;
        for (symbol, quantity) in account.holdings() {
            let (price, degraded) = self.resolve_price(symbol, None, now, account);
            partial |= degraded;
            total += quantity * price;
        }
        Valuation { total, partial }
    }

    /// Resolve a holding's price for valuation. An unavailable quote falls
    /// back to the last known observation, then the player's average entry
    /// price, so one delisted or rate-limited symbol never zeroes or fails
    /// a whole portfolio.
    fn resolve_price(
        &self,
        symbol: &str,
        as_of: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        account: &Account,
    ) -> (f64, bool) {
        let direct = match as_of {
            None => self.cache.quote_at(symbol, now),
            Some(ts) => self.cache.historical(symbol, ts),
        };
        match direct {
            Ok(quote) => (quote.price, false),
            Err(_) => {
                let fallback = self
                    .cache
                    .last_known(symbol)
                    .map(|q| q.price)
                    .or_else(|| account.avg_cost(symbol));
                (fallback.unwrap_or(0.0), true)
            }
        }
    }
}
