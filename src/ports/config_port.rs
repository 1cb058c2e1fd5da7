//! Configuration access port trait.

use chrono::Duration;

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64;

    /// Seconds-valued key read as a duration.
    fn get_duration_secs(&self, section: &str, key: &str, default: i64) -> Duration {
        Duration::seconds(self.get_int(section, key, default))
    }
}
