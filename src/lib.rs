//! Light-cycle arena simulation core
//!
//! A deterministic, fixed-order tick for a square arena where a player and a
//! dynamic population of bots leave fading trails behind them.
//!
//! # Features
//!
//! - `scoring_worker` - Score bot candidates on a dedicated worker thread (enabled by default)
//! - `parallel_decisions` - Default bot decision and motion planning passes to the rayon pool (enabled by default)

pub mod config;
pub mod game;
pub mod util;

pub use config::SimConfig;
pub use game::input_buffer::{Intent, IntentSender};
pub use game::match_result::SessionSummary;
pub use game::session::{Session, SessionEvent, SessionPhase};
pub use game::snapshot::{decode_snapshot, encode_snapshot, Snapshot};
