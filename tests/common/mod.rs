#![allow(dead_code)]

use chrono::{DateTime, Utc};
use papertrade::domain::asset::AssetClass;
use papertrade::domain::config::{CacheConfig, FeeSchedule, SimConfig};
use papertrade::domain::engine::{SimContext, SimulationEngine};
use papertrade::domain::error::FeedError;
use papertrade::domain::price_cache::PriceCache;
use papertrade::domain::quote::Quote;
use papertrade::ports::price_feed_port::PriceFeed;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

/// Scriptable in-memory feed: per-symbol prices or errors, an optional
/// artificial delay, and an upstream call counter.
pub struct MockPriceFeed {
    prices: Mutex<HashMap<String, f64>>,
    errors: Mutex<HashMap<String, FeedError>>,
    delay: Option<StdDuration>,
    calls: AtomicUsize,
}

impl MockPriceFeed {
    pub fn new() -> Self {
        MockPriceFeed {
            prices: Mutex::new(HashMap::new()),
            errors: Mutex::new(HashMap::new()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_price(self, symbol: &str, price: f64) -> Self {
        self.set_price(symbol, price);
        self
    }

    pub fn with_delay(mut self, delay: StdDuration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        self.errors.lock().unwrap().remove(symbol);
        self.prices.lock().unwrap().insert(symbol.into(), price);
    }

    pub fn set_error(&self, symbol: &str, error: FeedError) {
        self.errors.lock().unwrap().insert(symbol.into(), error);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PriceFeed for MockPriceFeed {
    fn current_price(&self, symbol: &str) -> Result<Quote, FeedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if let Some(err) = self.errors.lock().unwrap().get(symbol) {
            return Err(err.clone());
        }
        self.prices
            .lock()
            .unwrap()
            .get(symbol)
            .map(|&price| Quote::live(symbol, price, Utc::now()))
            .ok_or_else(|| FeedError::SymbolUnknown(symbol.to_string()))
    }

    fn historical_price(&self, symbol: &str, as_of: DateTime<Utc>) -> Result<Quote, FeedError> {
        self.current_price(symbol)
            .map(|q| Quote::historical(symbol, q.price, as_of))
    }
}

pub fn sim_config(starting_cash: f64, fee_flat: f64, fee_rate: f64) -> SimConfig {
    SimConfig {
        starting_cash,
        fees: FeeSchedule::new(fee_flat, fee_rate),
        cache: CacheConfig::default(),
    }
}

pub fn engine_with(feed: Arc<MockPriceFeed>, config: SimConfig) -> SimulationEngine {
    let cache = Arc::new(PriceCache::new(feed, config.cache));
    SimulationEngine::new(Arc::new(SimContext::new()), cache, config)
}

/// Engine over a fresh context with one registered equity and one player.
/// Returns the engine and the player id.
pub fn engine_with_player(
    feed: Arc<MockPriceFeed>,
    config: SimConfig,
    symbol: &str,
) -> (SimulationEngine, u64) {
    let engine = engine_with(feed, config);
    engine
        .register_asset(symbol, AssetClass::Equity, None)
        .unwrap();
    let player = engine.create_player("alice").unwrap();
    (engine, player.id)
}
