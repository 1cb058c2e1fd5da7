//! CSV file price feed adapter.
//!
//! A deterministic offline feed for simulations and tests: one
//! `<SYMBOL>.csv` file per symbol with `timestamp,price` rows (RFC 3339
//! timestamps). The latest row serves as the current price; historical
//! queries return the latest observation at or before the requested time.

use chrono::{DateTime, Utc};
use std::fs;
use std::path::PathBuf;

use crate::domain::error::FeedError;
use crate::domain::quote::Quote;
use crate::ports::price_feed_port::PriceFeed;

pub struct CsvFeedAdapter {
    base_path: PathBuf,
}

impl CsvFeedAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{symbol}.csv"))
    }

    /// All symbols with a quote file present, sorted.
    pub fn list_symbols(&self) -> std::io::Result<Vec<String>> {
        let mut symbols = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let name = entry?.file_name();
            let name_str = name.to_string_lossy();
            if let Some(symbol) = name_str.strip_suffix(".csv") {
                symbols.push(symbol.to_string());
            }
        }
        symbols.sort();
        Ok(symbols)
    }

    fn load_rows(&self, symbol: &str) -> Result<Vec<(DateTime<Utc>, f64)>, FeedError> {
        let path = self.csv_path(symbol);
        if !path.exists() {
            return Err(FeedError::SymbolUnknown(symbol.to_string()));
        }
        let content = fs::read_to_string(&path).map_err(|e| FeedError::Transient {
            symbol: symbol.to_string(),
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut rows = Vec::new();

        for result in rdr.records() {
            let record = result.map_err(|e| FeedError::Transient {
                symbol: symbol.to_string(),
                reason: format!("CSV parse error: {e}"),
            })?;

            let ts_str = record.get(0).ok_or_else(|| FeedError::Transient {
                symbol: symbol.to_string(),
                reason: "missing timestamp column".into(),
            })?;
            let timestamp = DateTime::parse_from_rfc3339(ts_str)
                .map_err(|e| FeedError::Transient {
                    symbol: symbol.to_string(),
                    reason: format!("invalid timestamp: {e}"),
                })?
                .with_timezone(&Utc);

            let price: f64 = record
                .get(1)
                .ok_or_else(|| FeedError::Transient {
                    symbol: symbol.to_string(),
                    reason: "missing price column".into(),
                })?
                .parse()
                .map_err(|e| FeedError::Transient {
                    symbol: symbol.to_string(),
                    reason: format!("invalid price value: {e}"),
                })?;

            rows.push((timestamp, price));
        }

        rows.sort_by_key(|(ts, _)| *ts);
        Ok(rows)
    }
}

impl PriceFeed for CsvFeedAdapter {
    fn current_price(&self, symbol: &str) -> Result<Quote, FeedError> {
        let rows = self.load_rows(symbol)?;
        let (timestamp, price) = rows.last().ok_or_else(|| FeedError::Transient {
            symbol: symbol.to_string(),
            reason: "no quotes in file".into(),
        })?;
        Ok(Quote::live(symbol, *price, *timestamp))
    }

    fn historical_price(&self, symbol: &str, as_of: DateTime<Utc>) -> Result<Quote, FeedError> {
        let rows = self.load_rows(symbol)?;
        let at_or_before = rows
            .iter()
            .rev()
            .find(|(ts, _)| *ts <= as_of)
            .ok_or_else(|| FeedError::Transient {
                symbol: symbol.to_string(),
                reason: format!("no observation at or before {as_of}"),
            })?;
        Ok(Quote::historical(symbol, at_or_before.1, at_or_before.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        let csv_content = "timestamp,price\n\
            2024-01-15T10:00:00Z,100.0\n\
            2024-01-15T11:00:00Z,105.0\n\
            2024-01-15T12:00:00Z,102.5\n";
        fs::write(path.join("AAPL.csv"), csv_content).unwrap();

        fs::write(
            path.join("BTC-USD.csv"),
            "timestamp,price\n2024-01-15T10:00:00Z,42000.0\n",
        )
        .unwrap();

        (dir, path)
    }

    #[test]
    fn current_price_returns_latest_row() {
        let (_dir, path) = setup_test_data();
        let feed = CsvFeedAdapter::new(path);

        let quote = feed.current_price("AAPL").unwrap();
        assert_eq!(quote.price, 102.5);
        assert_eq!(
            quote.timestamp,
            Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
        );
        assert!(!quote.stale);
    }

    #[test]
    fn historical_price_picks_at_or_before() {
        let (_dir, path) = setup_test_data();
        let feed = CsvFeedAdapter::new(path);

        let as_of = Utc.with_ymd_and_hms(2024, 1, 15, 11, 30, 0).unwrap();
        let quote = feed.historical_price("AAPL", as_of).unwrap();
        assert_eq!(quote.price, 105.0);
    }

    #[test]
    fn historical_before_first_observation_errors() {
        let (_dir, path) = setup_test_data();
        let feed = CsvFeedAdapter::new(path);

        let as_of = Utc.with_ymd_and_hms(2024, 1, 14, 0, 0, 0).unwrap();
        let result = feed.historical_price("AAPL", as_of);
        assert!(matches!(result, Err(FeedError::Transient { .. })));
    }

    #[test]
    fn missing_symbol_is_unknown() {
        let (_dir, path) = setup_test_data();
        let feed = CsvFeedAdapter::new(path);

        let result = feed.current_price("ZZZZ");
        assert!(matches!(result, Err(FeedError::SymbolUnknown(s)) if s == "ZZZZ"));
    }

    #[test]
    fn malformed_row_is_transient() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("BAD.csv"),
            "timestamp,price\nnot-a-date,100.0\n",
        )
        .unwrap();
        let feed = CsvFeedAdapter::new(dir.path().to_path_buf());

        let result = feed.current_price("BAD");
        assert!(matches!(result, Err(FeedError::Transient { .. })));
    }

    #[test]
    fn batch_reports_per_symbol_results() {
        let (_dir, path) = setup_test_data();
        let feed = CsvFeedAdapter::new(path);

        let symbols = vec!["AAPL".to_string(), "ZZZZ".to_string()];
        let results = feed.batch_current_price(&symbols);

        assert_eq!(results.len(), 2);
        assert!(results[0].1.is_ok());
        assert!(results[1].1.is_err());
    }

    #[test]
    fn list_symbols_strips_extension() {
        let (_dir, path) = setup_test_data();
        let feed = CsvFeedAdapter::new(path);
        assert_eq!(feed.list_symbols().unwrap(), vec!["AAPL", "BTC-USD"]);
    }
}
