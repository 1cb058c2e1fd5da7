//! Concrete adapter implementations for ports.

pub mod csv_feed_adapter;
pub mod file_config_adapter;
#[cfg(feature = "sqlite")]
pub mod sqlite_store_adapter;
