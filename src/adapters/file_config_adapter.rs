//! INI file configuration adapter.

use configparser::ini::Ini;
use std::path::Path;

use crate::domain::config::{CacheConfig, FeeSchedule, SimConfig};
use crate::ports::config_port::ConfigPort;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut config = Ini::new();
        config.load(path).map_err(std::io::Error::other)?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new();
        config.read(content.to_string())?;
        Ok(Self { config })
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }
}

/// Assemble a [`SimConfig`] from the recognized keys, falling back to
/// defaults for anything unset. Callers validate the result.
pub fn build_sim_config(config: &dyn ConfigPort) -> SimConfig {
    let defaults = SimConfig::default();
    SimConfig {
        starting_cash: config.get_double("sim", "starting_cash", defaults.starting_cash),
        fees: FeeSchedule::new(
            config.get_double("sim", "fee_flat", defaults.fees.flat),
            config.get_double("sim", "fee_rate", defaults.fees.rate),
        ),
        cache: CacheConfig {
            refresh_interval: config.get_duration_secs(
                "cache",
                "refresh_interval_secs",
                defaults.cache.refresh_interval.num_seconds(),
            ),
            staleness_ceiling: config.get_duration_secs(
                "cache",
                "staleness_ceiling_secs",
                defaults.cache.staleness_ceiling.num_seconds(),
            ),
            history_bucket_secs: config.get_int(
                "cache",
                "history_bucket_secs",
                defaults.cache.history_bucket_secs,
            ),
        },
    }
}
