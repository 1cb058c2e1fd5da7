//! Leaderboard ranking.
//!
//! A pure snapshot computation over `(player, valuation)` rows: descending
//! by total value, ties broken by earlier player creation (rewarding
//! longer-running participants), then by player id so identical inputs
//! always rank identically.

use serde::Serialize;

use super::engine::Valuation;
use super::player::Player;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub player_id: u64,
    pub name: String,
    pub total_value: f64,
    /// True when this player's valuation used a fallback price.
    pub partial: bool,
}

pub fn rank_entries(mut rows: Vec<(Player, Valuation)>) -> Vec<LeaderboardEntry> {
    rows.sort_by(|(pa, va), (pb, vb)| {
        vb.total
            .partial_cmp(&va.total)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| pa.created_at.cmp(&pb.created_at))
            .then_with(|| pa.id.cmp(&pb.id))
    });

    rows.into_iter()
        .enumerate()
        .map(|(i, (player, valuation))| LeaderboardEntry {
            rank: i + 1,
            player_id: player.id,
            name: player.name,
            total_value: valuation.total,
            partial: valuation.partial,
        })
        .collect()
}
