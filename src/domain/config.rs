//! Simulation configuration and validation.

use chrono::Duration;

use super::error::PapertradeError;

/// Trade fee: flat amount plus a fraction of notional.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeSchedule {
    pub flat: f64,
    pub rate: f64,
}

impl FeeSchedule {
    pub const FREE: FeeSchedule = FeeSchedule {
        flat: 0.0,
        rate: 0.0,
    };

    pub fn new(flat: f64, rate: f64) -> Self {
        FeeSchedule { flat, rate }
    }

    /// Fee charged on a trade of the given notional value.
    pub fn fee(&self, notional: f64) -> f64 {
        self.flat + notional * self.rate
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        FeeSchedule::FREE
    }
}

/// Price cache policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheConfig {
    /// How long a live quote is served without refetching.
    pub refresh_interval: Duration,
    /// Oldest quote age the stale fallback will serve after a feed failure.
    pub staleness_ceiling: Duration,
    /// Rounding bucket for historical lookups, in seconds.
    pub history_bucket_secs: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            refresh_interval: Duration::seconds(60),
            staleness_ceiling: Duration::hours(24),
            history_bucket_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimConfig {
    pub starting_cash: f64,
    pub fees: FeeSchedule,
    pub cache: CacheConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            starting_cash: 100_000.0,
            fees: FeeSchedule::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), PapertradeError> {
        if !(self.starting_cash.is_finite() && self.starting_cash > 0.0) {
            return Err(invalid("sim", "starting_cash", "must be positive"));
        }
        if !(self.fees.flat.is_finite() && self.fees.flat >= 0.0) {
            return Err(invalid("sim", "fee_flat", "must be non-negative"));
        }
        if !(self.fees.rate.is_finite() && (0.0..1.0).contains(&self.fees.rate)) {
            return Err(invalid("sim", "fee_rate", "must be between 0 and 1"));
        }
        if self.cache.refresh_interval <= Duration::zero() {
            return Err(invalid("cache", "refresh_interval_secs", "must be positive"));
        }
        if self.cache.staleness_ceiling < self.cache.refresh_interval {
            return Err(invalid(
                "cache",
                "staleness_ceiling_secs",
                "must be at least refresh_interval_secs",
            ));
        }
        if self.cache.history_bucket_secs <= 0 {
            return Err(invalid("cache", "history_bucket_secs", "must be positive"));
        }
        Ok(())
    }
}

fn invalid(section: &str, key: &str, reason: &str) -> PapertradeError {
    PapertradeError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_is_flat_plus_rate() {
        let fees = FeeSchedule::new(9.99, 0.01);
        let expected = 9.99 + 500.0 * 0.01;
        assert!((fees.fee(500.0) - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn free_schedule_charges_nothing() {
        assert!((FeeSchedule::FREE.fee(12_345.0) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn default_config_is_valid() {
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_starting_cash() {
        let config = SimConfig {
            starting_cash: 0.0,
            ..SimConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PapertradeError::ConfigInvalid { key, .. }) if key == "starting_cash"
        ));
    }

    #[test]
    fn rejects_fee_rate_of_one_or_more() {
        let config = SimConfig {
            fees: FeeSchedule::new(0.0, 1.0),
            ..SimConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PapertradeError::ConfigInvalid { key, .. }) if key == "fee_rate"
        ));
    }

    #[test]
    fn rejects_negative_flat_fee() {
        let config = SimConfig {
            fees: FeeSchedule::new(-1.0, 0.0),
            ..SimConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_ceiling_below_refresh_interval() {
        let config = SimConfig {
            cache: CacheConfig {
                refresh_interval: Duration::seconds(120),
                staleness_ceiling: Duration::seconds(60),
                history_bucket_secs: 3600,
            },
            ..SimConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PapertradeError::ConfigInvalid { key, .. }) if key == "staleness_ceiling_secs"
        ));
    }
}
