//! Quote memoization over the price feed.
//!
//! Shields the engine from feed latency and unreliability: live quotes are
//! served from cache within the refresh interval, feed failures fall back
//! to the last observation within the staleness ceiling (flagged `stale`),
//! and historical lookups are cached forever keyed by rounded timestamp
//! bucket. Concurrent misses for one symbol coalesce into a single
//! upstream call.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use chrono::{DateTime, Utc};

use super::config::CacheConfig;
use super::error::FeedError;
use super::quote::Quote;
use crate::ports::price_feed_port::PriceFeed;

#[derive(Debug, Clone)]
struct CachedQuote {
    quote: Quote,
    fetched_at: DateTime<Utc>,
}

pub struct PriceCache {
    feed: Arc<dyn PriceFeed>,
    config: CacheConfig,
    live: Mutex<HashMap<String, CachedQuote>>,
    history: Mutex<HashMap<(String, i64), Quote>>,
    in_flight: Mutex<HashSet<String>>,
    fetch_done: Condvar,
}

impl PriceCache {
    pub fn new(feed: Arc<dyn PriceFeed>, config: CacheConfig) -> Self {
        PriceCache {
            feed,
            config,
            live: Mutex::new(HashMap::new()),
            history: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            fetch_done: Condvar::new(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Current quote for a symbol, refreshing from the feed when the cached
    /// observation has outlived the refresh interval.
    pub fn quote(&self, symbol: &str) -> Result<Quote, FeedError> {
        self.quote_at(symbol, Utc::now())
    }

    /// Clock-explicit variant of [`PriceCache::quote`].
    pub fn quote_at(&self, symbol: &str, now: DateTime<Utc>) -> Result<Quote, FeedError> {
        loop {
            if let Some(quote) = self.fresh(symbol, now) {
                return Ok(quote);
            }

            // Expired or missing. Claim the fetch, or wait for whoever
            // already owns it and re-check the cache.
            {
                let mut in_flight = self
                    .in_flight
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                if in_flight.contains(symbol) {
                    while in_flight.contains(symbol) {
                        in_flight = self
                            .fetch_done
                            .wait(in_flight)
                            .unwrap_or_else(PoisonError::into_inner);
                    }
                    continue;
                }
                in_flight.insert(symbol.to_string());
            }

            // A fetch may have completed between the fresh check and the
            // claim; the owner stores its result before releasing.
            if let Some(quote) = self.fresh(symbol, now) {
                self.release(symbol);
                return Ok(quote);
            }

            let result = self.feed.current_price(symbol);
            let outcome = self.absorb(symbol, result, now);
            self.release(symbol);

            return outcome;
        }
    }

    /// Batch variant with per-symbol results; a failing subset never fails
    /// the call. Expired symbols are refreshed with one upstream batch
    /// call. This path skips per-symbol coalescing; the background
    /// refresher is its expected caller.
    pub fn quote_many(&self, symbols: &[String]) -> Vec<(String, Result<Quote, FeedError>)> {
        self.quote_many_at(symbols, Utc::now())
    }

    pub fn quote_many_at(
        &self,
        symbols: &[String],
        now: DateTime<Utc>,
    ) -> Vec<(String, Result<Quote, FeedError>)> {
        let mut resolved: HashMap<String, Result<Quote, FeedError>> = HashMap::new();
        let mut expired: Vec<String> = Vec::new();

        for symbol in symbols {
            if resolved.contains_key(symbol) || expired.contains(symbol) {
                continue;
            }
            match self.fresh(symbol, now) {
                Some(quote) => {
                    resolved.insert(symbol.clone(), Ok(quote));
                }
                None => expired.push(symbol.clone()),
            }
        }

        if !expired.is_empty() {
            for (symbol, result) in self.feed.batch_current_price(&expired) {
                let outcome = self.absorb(&symbol, result, now);
                resolved.insert(symbol, outcome);
            }
        }

        symbols
            .iter()
            .map(|s| {
                let outcome = resolved
                    .get(s)
                    .cloned()
                    .unwrap_or_else(|| Err(FeedError::SymbolUnknown(s.clone())));
                (s.clone(), outcome)
            })
            .collect()
    }

    /// Historical quote, bypassing the live cache. Keyed by
    /// `(symbol, rounded bucket)` with unbounded retention since history
    /// is immutable.
    pub fn historical(&self, symbol: &str, as_of: DateTime<Utc>) -> Result<Quote, FeedError> {
        let bucket = as_of.timestamp().div_euclid(self.config.history_bucket_secs);
        let key = (symbol.to_string(), bucket);

        {
            let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(quote) = history.get(&key) {
                return Ok(quote.clone());
            }
        }

        let quote = self.feed.historical_price(symbol, as_of)?;
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, quote.clone());
        Ok(quote)
    }

    /// Most recent successful observation regardless of age. Valuation
    /// fallback; not a substitute for [`PriceCache::quote`].
    pub fn last_known(&self, symbol: &str) -> Option<Quote> {
        let live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        live.get(symbol).map(|c| c.quote.clone())
    }

    fn release(&self, symbol: &str) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(symbol);
        self.fetch_done.notify_all();
    }

    fn fresh(&self, symbol: &str, now: DateTime<Utc>) -> Option<Quote> {
        let live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        live.get(symbol).and_then(|cached| {
            if now - cached.fetched_at <= self.config.refresh_interval {
                Some(cached.quote.clone())
            } else {
                None
            }
        })
    }

    /// Store a successful fetch, or resolve a failure through the stale
    /// fallback. Fallback quotes are returned flagged, never written back.
    fn absorb(
        &self,
        symbol: &str,
        result: Result<Quote, FeedError>,
        now: DateTime<Utc>,
    ) -> Result<Quote, FeedError> {
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        match result {
            Ok(quote) => {
                live.insert(
                    symbol.to_string(),
                    CachedQuote {
                        quote: quote.clone(),
                        fetched_at: now,
                    },
                );
                Ok(quote)
            }
            Err(err) => match live.get(symbol) {
                Some(cached) if now - cached.fetched_at <= self.config.staleness_ceiling => {
                    let mut quote = cached.quote.clone();
                    quote.stale = true;
                    Ok(quote)
                }
                _ => Err(err),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedFeed {
        price: Mutex<Result<f64, FeedError>>,
        calls: AtomicUsize,
        historical_calls: AtomicUsize,
    }

    impl ScriptedFeed {
        fn new(price: f64) -> Self {
            ScriptedFeed {
                price: Mutex::new(Ok(price)),
                calls: AtomicUsize::new(0),
                historical_calls: AtomicUsize::new(0),
            }
        }

        fn set(&self, price: f64) {
            *self.price.lock().unwrap() = Ok(price);
        }

        fn fail(&self, err: FeedError) {
            *self.price.lock().unwrap() = Err(err);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl PriceFeed for ScriptedFeed {
        fn current_price(&self, symbol: &str) -> Result<Quote, FeedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.price
                .lock()
                .unwrap()
                .clone()
                .map(|price| Quote::live(symbol, price, Utc::now()))
        }

        fn historical_price(
            &self,
            symbol: &str,
            as_of: DateTime<Utc>,
        ) -> Result<Quote, FeedError> {
            self.historical_calls.fetch_add(1, Ordering::SeqCst);
            self.price
                .lock()
                .unwrap()
                .clone()
                .map(|price| Quote::historical(symbol, price, as_of))
        }
    }

    fn cache_with(feed: &Arc<ScriptedFeed>) -> PriceCache {
        PriceCache::new(feed.clone() as Arc<dyn PriceFeed>, CacheConfig::default())
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap()
    }

    #[test]
    fn serves_cached_quote_within_refresh_interval() {
        let feed = Arc::new(ScriptedFeed::new(100.0));
        let cache = cache_with(&feed);

        let first = cache.quote_at("AAPL", t0()).unwrap();
        feed.set(200.0);
        let second = cache.quote_at("AAPL", t0() + Duration::seconds(30)).unwrap();

        assert_eq!(first.price, 100.0);
        assert_eq!(second.price, 100.0);
        assert_eq!(feed.calls(), 1);
    }

    #[test]
    fn refetches_after_interval_expires() {
        let feed = Arc::new(ScriptedFeed::new(100.0));
        let cache = cache_with(&feed);

        cache.quote_at("AAPL", t0()).unwrap();
        feed.set(200.0);
        let refreshed = cache.quote_at("AAPL", t0() + Duration::seconds(61)).unwrap();

        assert_eq!(refreshed.price, 200.0);
        assert!(!refreshed.stale);
        assert_eq!(feed.calls(), 2);
    }

    #[test]
    fn feed_failure_falls_back_to_stale_quote() {
        let feed = Arc::new(ScriptedFeed::new(100.0));
        let cache = cache_with(&feed);

        cache.quote_at("AAPL", t0()).unwrap();
        feed.fail(FeedError::Timeout {
            symbol: "AAPL".into(),
            seconds: 5,
        });

        let fallback = cache.quote_at("AAPL", t0() + Duration::minutes(5)).unwrap();
        assert_eq!(fallback.price, 100.0);
        assert!(fallback.stale);
    }

    #[test]
    fn stale_fallback_is_not_written_back() {
        let feed = Arc::new(ScriptedFeed::new(100.0));
        let cache = cache_with(&feed);

        cache.quote_at("AAPL", t0()).unwrap();
        feed.fail(FeedError::RateLimited);
        cache.quote_at("AAPL", t0() + Duration::minutes(5)).unwrap();

        // Recovery: next refresh reads the feed again rather than treating
        // the fallback as a fresh observation.
        feed.set(150.0);
        let recovered = cache.quote_at("AAPL", t0() + Duration::minutes(7)).unwrap();
        assert_eq!(recovered.price, 150.0);
        assert!(!recovered.stale);
    }

    #[test]
    fn quote_unavailable_beyond_staleness_ceiling() {
        let feed = Arc::new(ScriptedFeed::new(100.0));
        let cache = cache_with(&feed);

        cache.quote_at("AAPL", t0()).unwrap();
        feed.fail(FeedError::RateLimited);

        let result = cache.quote_at("AAPL", t0() + Duration::hours(25));
        assert_eq!(result, Err(FeedError::RateLimited));
    }

    #[test]
    fn failure_with_no_prior_quote_propagates() {
        let feed = Arc::new(ScriptedFeed::new(100.0));
        feed.fail(FeedError::SymbolUnknown("ZZZZ".into()));
        let cache = cache_with(&feed);

        let result = cache.quote_at("ZZZZ", t0());
        assert_eq!(result, Err(FeedError::SymbolUnknown("ZZZZ".into())));
    }

    #[test]
    fn last_known_ignores_age() {
        let feed = Arc::new(ScriptedFeed::new(100.0));
        let cache = cache_with(&feed);

        assert!(cache.last_known("AAPL").is_none());
        cache.quote_at("AAPL", t0()).unwrap();
        let known = cache.last_known("AAPL").unwrap();
        assert_eq!(known.price, 100.0);
    }

    #[test]
    fn historical_lookups_cached_by_bucket() {
        let feed = Arc::new(ScriptedFeed::new(100.0));
        let cache = cache_with(&feed);

        let mid_hour = Utc.with_ymd_and_hms(2024, 6, 3, 12, 10, 0).unwrap();
        let same_bucket = Utc.with_ymd_and_hms(2024, 6, 3, 12, 50, 0).unwrap();
        let next_bucket = Utc.with_ymd_and_hms(2024, 6, 3, 13, 10, 0).unwrap();

        cache.historical("AAPL", mid_hour).unwrap();
        cache.historical("AAPL", same_bucket).unwrap();
        assert_eq!(feed.historical_calls.load(Ordering::SeqCst), 1);

        cache.historical("AAPL", next_bucket).unwrap();
        assert_eq!(feed.historical_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn quote_many_returns_per_symbol_results() {
        let feed = Arc::new(ScriptedFeed::new(100.0));
        let cache = cache_with(&feed);

        // Seed one symbol, then break the feed: the seeded symbol falls
        // back stale, the unseeded one errors, and neither hides the other.
        cache.quote_at("AAPL", t0()).unwrap();
        feed.fail(FeedError::RateLimited);

        let symbols = vec!["AAPL".to_string(), "MSFT".to_string()];
        let results = cache.quote_many_at(&symbols, t0() + Duration::minutes(5));

        assert_eq!(results.len(), 2);
        let aapl = results[0].1.as_ref().unwrap();
        assert!(aapl.stale);
        assert!(results[1].1.is_err());
    }

    #[test]
    fn quote_many_serves_fresh_entries_without_feed_calls() {
        let feed = Arc::new(ScriptedFeed::new(100.0));
        let cache = cache_with(&feed);

        cache.quote_at("AAPL", t0()).unwrap();
        let before = feed.calls();

        let symbols = vec!["AAPL".to_string()];
        let results = cache.quote_many_at(&symbols, t0() + Duration::seconds(10));
        assert!(results[0].1.is_ok());
        assert_eq!(feed.calls(), before);
    }
}
