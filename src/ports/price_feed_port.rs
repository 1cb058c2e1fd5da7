//! Price feed port trait.

use chrono::{DateTime, Utc};

use crate::domain::error::FeedError;
use crate::domain::quote::Quote;

/// Source of current and historical quotes.
///
/// Implementations must bound their own latency: a lookup that exceeds the
/// adapter's timeout returns [`FeedError::Timeout`] rather than blocking
/// the caller indefinitely.
pub trait PriceFeed: Send + Sync {
    fn current_price(&self, symbol: &str) -> Result<Quote, FeedError>;

    fn historical_price(&self, symbol: &str, as_of: DateTime<Utc>) -> Result<Quote, FeedError>;

    /// Batch lookup with per-symbol results; a failing subset never fails
    /// the whole call.
    fn batch_current_price(&self, symbols: &[String]) -> Vec<(String, Result<Quote, FeedError>)> {
        symbols
            .iter()
            .map(|s| (s.clone(), self.current_price(s)))
            .collect()
    }
}
