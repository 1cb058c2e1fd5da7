//! Price observations.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteSource {
    Live,
    Historical,
}

/// A price observation for a symbol at a point in time.
///
/// Produced only by the price feed or the cache; never mutated. `stale` is
/// set by the cache when an expired observation is served as a fallback
/// after a feed failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub source: QuoteSource,
    pub stale: bool,
}

impl Quote {
    pub fn live(symbol: impl Into<String>, price: f64, timestamp: DateTime<Utc>) -> Self {
        Quote {
            symbol: symbol.into(),
            price,
            timestamp,
            source: QuoteSource::Live,
            stale: false,
        }
    }

    pub fn historical(symbol: impl Into<String>, price: f64, timestamp: DateTime<Utc>) -> Self {
        Quote {
            symbol: symbol.into(),
            price,
            timestamp,
            source: QuoteSource::Historical,
            stale: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn constructors_set_source() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let live = Quote::live("AAPL", 190.0, ts);
        assert_eq!(live.source, QuoteSource::Live);
        assert!(!live.stale);

        let hist = Quote::historical("AAPL", 150.0, ts);
        assert_eq!(hist.source, QuoteSource::Historical);
    }
}
