//! Player identity.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A simulation participant. Identity is immutable; each player owns
/// exactly one account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Player {
    pub id: u64,
    pub name: String,
    pub starting_cash: f64,
    pub created_at: DateTime<Utc>,
}
