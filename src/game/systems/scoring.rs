//! Candidate scoring
//!
//! The weighted-sum formula over precomputed candidate features, the panic
//! re-score, and the [`ScoringBackend`] seam that decides where the formula
//! runs: inline ([`SyncScorer`]) or on a worker thread ([`ThreadedScorer`]).
//! Both produce the same choice for the same request.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::config::ScoreWeights;

/// Feature record for one heading option
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateFeatures {
    /// Forward-projection hazard penalty
    pub danger: f32,
    /// Closeness to the target's predicted position
    pub dist_to_future: f32,
    /// Progress toward the cut-off point ahead of the target
    pub wall_intercept: f32,
    /// Ambush bonus when already ahead of the target
    pub ramming: f32,
    /// Flood-fill open area times unit
    pub free_space: f32,
    /// Escape search value
    pub exit_score: f32,
    /// Matches the greedy turn toward the target
    pub preferred: bool,
    /// Revisit penalty from the bot's cell memory
    pub loop_penalty: f32,
    /// Predicted to run into its own trail or a closed box
    pub own_trap: bool,
    /// Personality aggression
    pub aggro: f32,
    /// Personality noise bias plus flank preference
    pub noise: f32,
    /// Uniform per-candidate jitter
    pub random_jitter: f32,
}

/// Full multi-factor score of one candidate
pub fn weighted_score(f: &CandidateFeatures, w: &ScoreWeights) -> f32 {
    let mut score = -f.danger * w.danger;
    score += f.dist_to_future * w.dist_to_future;
    score += f.wall_intercept * (w.wall_intercept_base + f.aggro * w.wall_intercept_aggro);
    score += f.ramming * (w.ramming_base + f.aggro * w.ramming_aggro);
    score += f.free_space * w.free_space;
    score += f.exit_score * w.exit;
    if f.preferred {
        score += w.preferred_base + f.aggro * w.preferred_aggro;
    }
    score -= f.loop_penalty * w.loop_penalty;
    if f.own_trap {
        score -= w.own_trap;
    }
    score += f.noise * w.noise;
    score += f.random_jitter * w.jitter;
    score
}

/// Simplified survival-only score used by the panic override
#[inline]
pub fn panic_score(f: &CandidateFeatures) -> f32 {
    f.free_space + f.exit_score - f.danger
}

/// Weighted score of every candidate, in candidate order
pub fn score_candidates(options: &[CandidateFeatures], weights: &ScoreWeights) -> SmallVec<[f32; 3]> {
    options.iter().map(|f| weighted_score(f, weights)).collect()
}

/// Index of the highest-scoring candidate. Strict comparison: on ties the
/// earlier candidate wins.
pub fn best_candidate(options: &[CandidateFeatures], weights: &ScoreWeights) -> Option<usize> {
    argmax(score_candidates(options, weights).into_iter())
}

/// Strict argmax over the given order; first maximum wins
pub fn argmax(scores: impl Iterator<Item = f32>) -> Option<usize> {
    scores
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, score)| match best {
            Some((_, top)) if score <= top => best,
            _ => Some((i, score)),
        })
        .map(|(i, _)| i)
}

/// Scoring request sent to a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRequest {
    pub request_id: u64,
    pub options: Vec<CandidateFeatures>,
}

/// Scoring response: index into the request's options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreResponse {
    pub request_id: u64,
    pub best: Option<usize>,
}

impl ScoreRequest {
    /// Pure evaluation of the request
    pub fn evaluate(&self, weights: &ScoreWeights) -> ScoreResponse {
        ScoreResponse {
            request_id: self.request_id,
            best: best_candidate(&self.options, weights),
        }
    }
}

/// Result of submitting a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Scored on the calling thread
    Ready(ScoreResponse),
    /// Queued; the response arrives through `poll_responses`
    Pending,
}

/// Backend counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScorerStats {
    pub submitted: u64,
    pub scored_inline: u64,
    pub scored_remote: u64,
    pub fallbacks: u64,
}

/// Where candidate scoring runs
pub trait ScoringBackend: Send {
    fn submit(&mut self, request: ScoreRequest) -> Dispatch;

    /// Drain responses that arrived since the last call
    fn poll_responses(&mut self) -> Vec<ScoreResponse>;

    fn stats(&self) -> ScorerStats;

    fn name(&self) -> &'static str;
}

/// In-process scorer
#[derive(Debug, Clone)]
pub struct SyncScorer {
    weights: ScoreWeights,
    stats: ScorerStats,
}

impl SyncScorer {
    pub fn new(weights: ScoreWeights) -> Self {
        Self {
            weights,
            stats: ScorerStats::default(),
        }
    }
}

impl ScoringBackend for SyncScorer {
    fn submit(&mut self, request: ScoreRequest) -> Dispatch {
        self.stats.submitted += 1;
        self.stats.scored_inline += 1;
        Dispatch::Ready(request.evaluate(&self.weights))
    }

    fn poll_responses(&mut self) -> Vec<ScoreResponse> {
        Vec::new()
    }

    fn stats(&self) -> ScorerStats {
        self.stats
    }

    fn name(&self) -> &'static str {
        "sync"
    }
}

#[cfg(feature = "scoring_worker")]
pub use worker::{ScorerError, ThreadedScorer};

#[cfg(feature = "scoring_worker")]
mod worker {
    use std::sync::Arc;
    use std::thread::JoinHandle;
    use std::time::Duration;

    use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
    use parking_lot::Mutex;

    use super::*;

    /// Worker start-up errors
    #[derive(Debug, thiserror::Error)]
    pub enum ScorerError {
        #[error("failed to spawn scoring worker: {0}")]
        Spawn(#[from] std::io::Error),
    }

    /// Scorer that runs the weighted sum on a dedicated thread.
    ///
    /// Requests go through a bounded channel. A full or closed channel falls
    /// back to scoring inline with the same weights.
    pub struct ThreadedScorer {
        weights: ScoreWeights,
        requests: Option<Sender<ScoreRequest>>,
        responses: Receiver<ScoreResponse>,
        handle: Option<JoinHandle<()>>,
        /// Responses produced by the worker thread
        remote_scored: Arc<Mutex<u64>>,
        stats: ScorerStats,
    }

    impl ThreadedScorer {
        pub fn new(weights: ScoreWeights, capacity: usize) -> Result<Self, ScorerError> {
            let (request_tx, request_rx) = bounded::<ScoreRequest>(capacity.max(1));
            let (response_tx, response_rx) = bounded::<ScoreResponse>(capacity.max(1));
            let remote_scored = Arc::new(Mutex::new(0u64));

            let worker_scored = Arc::clone(&remote_scored);
            let handle = std::thread::Builder::new()
                .name("bot-scoring".to_string())
                .spawn(move || run_worker(weights, request_rx, response_tx, worker_scored))?;

            tracing::info!(capacity, "Scoring worker started");

            Ok(Self {
                weights,
                requests: Some(request_tx),
                responses: response_rx,
                handle: Some(handle),
                remote_scored,
                stats: ScorerStats::default(),
            })
        }

        /// Block until the next response or `timeout`
        pub fn recv_timeout(&mut self, timeout: Duration) -> Option<ScoreResponse> {
            match self.responses.recv_timeout(timeout) {
                Ok(response) => Some(response),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
            }
        }

        fn fallback(&mut self, request: ScoreRequest) -> Dispatch {
            self.stats.fallbacks += 1;
            self.stats.scored_inline += 1;
            Dispatch::Ready(request.evaluate(&self.weights))
        }
    }

    fn run_worker(
        weights: ScoreWeights,
        requests: Receiver<ScoreRequest>,
        responses: Sender<ScoreResponse>,
        scored: Arc<Mutex<u64>>,
    ) {
        for request in requests.iter() {
            let response = request.evaluate(&weights);
            *scored.lock() += 1;
            if responses.send(response).is_err() {
                break;
            }
        }
        tracing::debug!("Scoring worker stopped");
    }

    impl ScoringBackend for ThreadedScorer {
        fn submit(&mut self, request: ScoreRequest) -> Dispatch {
            self.stats.submitted += 1;
            let Some(sender) = self.requests.as_ref() else {
                return self.fallback(request);
            };
            match sender.try_send(request) {
                Ok(()) => Dispatch::Pending,
                Err(TrySendError::Full(request)) => {
                    tracing::debug!("Scoring worker saturated, scoring inline");
                    self.fallback(request)
                }
                Err(TrySendError::Disconnected(request)) => {
                    tracing::warn!("Scoring worker unavailable, scoring inline");
                    self.requests = None;
                    self.fallback(request)
                }
            }
        }

        fn poll_responses(&mut self) -> Vec<ScoreResponse> {
            self.responses.try_iter().collect()
        }

        fn stats(&self) -> ScorerStats {
            ScorerStats {
                scored_remote: *self.remote_scored.lock(),
                ..self.stats
            }
        }

        fn name(&self) -> &'static str {
            "worker"
        }
    }

    impl Drop for ThreadedScorer {
        fn drop(&mut self) {
            // Closing both channels ends the worker loop, even when it is
            // blocked on a full response channel
            self.requests.take();
            self.responses = crossbeam_channel::never();
            if let Some(handle) = self.handle.take() {
                if handle.join().is_err() {
                    tracing::error!("Scoring worker panicked");
                }
            }
        }
    }
}
