//! Session result
//!
//! The summary handed to whoever persists high scores. The core only
//! produces it.

use serde::{Deserialize, Serialize};

use crate::game::session::SessionState;

/// Final numbers of a finished (or interrupted) session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub player_name: String,
    pub score: u64,
    pub best_score: u64,
    pub survival_time: f32,
    pub bots_destroyed: u32,
    pub near_misses: u32,
}

/// Build the summary from session state. Scores are reported as whole points.
pub fn summarize(player_name: &str, session: &SessionState) -> SessionSummary {
    SessionSummary {
        player_name: player_name.to_string(),
        score: session.score.max(0.0).floor() as u64,
        best_score: session.best_score.max(0.0).floor() as u64,
        survival_time: session.survival_time,
        bots_destroyed: session.bots_destroyed,
        near_misses: session.near_misses,
    }
}
