//! papertrade — educational market simulator engine.
//!
//! Tracks prices for a universe of equities and cryptocurrencies and lets
//! simulated players trade them with virtual cash, ranked on a leaderboard.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
