//! Bot decision engine
//!
//! Due bots are evaluated against the tick-stable occupancy view, in parallel
//! when enabled, and the results are applied sequentially in agent order.
//! Evaluation is a pure function of the view and the bot's state; all noise
//! comes from the bot's own decision RNG.

use hashbrown::HashMap;
use rand::Rng;
use rayon::prelude::*;
use smallvec::SmallVec;

use crate::config::{BotConfig, SimConfig};
use crate::game::spatial::{cell_key, OccupancyIndex, OwnerFilter, ProbeCache};
use crate::game::state::{
    Agent, AgentId, BotPhase, DecisionKind, Heading, PendingDecision, Turn,
};
use crate::game::systems::motion::world_speed;
use crate::game::systems::scoring::{
    argmax, panic_score, CandidateFeatures, Dispatch, ScoreRequest, ScoreResponse,
    ScorerStats, ScoringBackend,
};
use crate::game::systems::search::{find_exit, flood_fill};
use crate::util::vec2::Vec2;

/// Read-only inputs shared by every evaluation in a pass
pub struct DecisionContext<'a> {
    pub index: &'a OccupancyIndex<'a>,
    pub agents: &'a [Agent],
    pub config: &'a SimConfig,
    /// World speed before per-agent factors
    pub speed: f32,
    pub factors: SpeedFactors,
}

/// Overload speed factors for the current tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedFactors {
    pub player: f32,
    pub bot: f32,
}

impl Default for SpeedFactors {
    fn default() -> Self {
        Self { player: 1.0, bot: 1.0 }
    }
}

impl DecisionContext<'_> {
    /// Speed of `agent` this tick, overload included
    pub fn speed_of(&self, agent: &Agent) -> f32 {
        let factor = if agent.bot.is_some() {
            self.factors.bot
        } else {
            self.factors.player
        };
        self.speed * factor
    }
}

/// Result of evaluating one bot
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub agent_index: usize,
    pub target_id: Option<AgentId>,
    pub base_heading: Heading,
    pub options: SmallVec<[Turn; 3]>,
    pub features: SmallVec<[CandidateFeatures; 3]>,
    pub next_think: f32,
    pub probe_hits: u64,
    pub probe_misses: u64,
}

/// Decision counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecisionStats {
    pub evaluations: u64,
    pub panics: u64,
    pub stale_responses: u64,
    pub expired_requests: u64,
    pub probe_hits: u64,
    pub probe_misses: u64,
}

/// Nearest living other agent. The player's distance is scaled by
/// `player_priority`, so bots lean toward pressuring the player.
pub fn select_target<'a>(bot: &Agent, agents: &'a [Agent], player_priority: f32) -> Option<&'a Agent> {
    agents
        .iter()
        .filter(|a| a.alive && a.id != bot.id)
        .map(|a| {
            let d = bot.position.distance_to(a.position);
            (a, if a.is_bot() { d } else { d * player_priority })
        })
        .fold(None, |best: Option<(&Agent, f32)>, (a, d)| match best {
            Some((_, top)) if top <= d => best,
            _ => Some((a, d)),
        })
        .map(|(a, _)| a)
}

/// Stepwise forward projection. The first hazard found at step `k` costs
/// its weight times `steps - k + 1`; own trail weighs more than others.
pub fn danger(
    index: &OccupancyIndex<'_>,
    bot_id: AgentId,
    origin: Vec2,
    heading: Heading,
    config: &BotConfig,
) -> f32 {
    let dir = heading.vector();
    let steps = config.danger_steps;
    let inflate = config.danger_inflate;
    for k in 1..=steps {
        let p = origin + dir * (config.danger_step * k as f32);
        let weight = if index.wall_hit(p, inflate) {
            config.danger_wall_weight
        } else if index.segment_hit(p, OwnerFilter::Only(bot_id), Some(bot_id), inflate) {
            config.danger_own_weight
        } else if index.segment_hit(p, OwnerFilter::Except(bot_id), None, inflate) {
            config.danger_other_weight
        } else {
            continue;
        };
        return weight * (steps - k + 1) as f32;
    }
    0.0
}

/// Distance from `p` to the wall it is heading into
pub fn wall_distance(p: Vec2, heading: Heading, limit: f32) -> f32 {
    match heading {
        Heading::North => p.z + limit,
        Heading::South => limit - p.z,
        Heading::East => limit - p.x,
        Heading::West => p.x + limit,
    }
    .max(0.0)
}

/// Progress toward the cut-off point on the target's lane to the wall,
/// when the bot is closer to it than the target
pub fn wall_intercept(
    bot_position: Vec2,
    endpoint: Vec2,
    target: &Agent,
    limit: f32,
    config: &BotConfig,
) -> f32 {
    let lane = wall_distance(target.position, target.heading, limit);
    let cut = target.position + target.heading.vector() * (lane * config.intercept_lane_fraction);
    let bot_to_cut = bot_position.distance_to(cut);
    let target_to_cut = target.position.distance_to(cut);
    if bot_to_cut > config.intercept_max_range || bot_to_cut >= target_to_cut {
        return 0.0;
    }
    let progress = (bot_to_cut - endpoint.distance_to(cut)) / config.lookahead;
    config.wall_intercept_gain * progress.clamp(0.0, 1.0)
}

/// Ambush bonus: the bot is ahead of the target and the candidate closes the
/// lateral gap to the target's path
pub fn ramming(bot_position: Vec2, endpoint: Vec2, target: &Agent, config: &BotConfig) -> f32 {
    let along = target.heading.vector();
    let across = along.perpendicular();
    let rel = bot_position - target.position;
    let ahead = rel.dot(along);
    if ahead <= 0.0 || ahead > config.ram_range {
        return 0.0;
    }
    let lateral = rel.dot(across).abs();
    let lateral_after = (endpoint - target.position).dot(across).abs();
    if lateral_after >= lateral {
        return 0.0;
    }
    let alignment = 1.0 - (lateral / config.ram_range).min(1.0);
    config.ram_gain * (ahead / config.ram_range) * alignment
}

/// Forward simulation for the self-trap check: true if following `heading`
/// runs into the bot's own trail within the horizon, or ends boxed in with
/// every onward option blocked.
pub fn predicts_own_trap(
    index: &OccupancyIndex<'_>,
    bot_id: AgentId,
    origin: Vec2,
    heading: Heading,
    config: &BotConfig,
) -> bool {
    let dir = heading.vector();
    let steps = (config.trap_horizon / config.trap_step).floor() as u32;
    for k in 1..=steps {
        let p = origin + dir * (config.trap_step * k as f32);
        if index.wall_hit(p, 0.0) {
            return false;
        }
        if index.segment_hit(p, OwnerFilter::Only(bot_id), Some(bot_id), 0.0) {
            return true;
        }
    }

    let end = origin + dir * (config.trap_step * steps as f32);
    let probe_steps = (config.trap_escape_probe / config.trap_step).ceil().max(1.0) as u32;
    Turn::EVALUATION_ORDER.iter().all(|&turn| {
        let onward = heading.apply(turn).vector();
        (1..=probe_steps).any(|k| {
            index.is_point_blocked(end + onward * (config.trap_step * k as f32), Some(bot_id))
        })
    })
}

/// Compute candidate features for the bot at `agent_index`
pub fn evaluate_bot(ctx: &DecisionContext<'_>, agent_index: usize) -> Option<Evaluation> {
    let bot = ctx.agents.get(agent_index)?;
    let behavior = bot.bot.as_ref()?;
    let cfg = &ctx.config.bots;
    let half_extent = ctx.config.arena.half_extent;
    let limit = half_extent - ctx.config.arena.wall_margin;
    let personality = behavior.personality;

    let mut rng = behavior.decision_rng();
    let mut cache = ProbeCache::new();

    let target = select_target(bot, ctx.agents, cfg.player_priority);
    let future = target.map(|t| t.position + t.heading.vector() * (ctx.speed_of(t) * cfg.target_lead_time));
    let preferred_turn = future.map(|f| bot.heading.turn_toward(f - bot.position));

    let options: SmallVec<[Turn; 3]> = Turn::EVALUATION_ORDER.iter().copied().collect();
    let features = options
        .iter()
        .map(|&turn| {
            let heading = bot.heading.apply(turn);
            let endpoint = bot.position + heading.vector() * cfg.lookahead;

            let dist_to_future = future
                .map(|f| cfg.future_gain / (endpoint.distance_to(f) + cfg.future_soften))
                .unwrap_or(0.0);
            let (wall_intercept, ram) = target
                .map(|t| {
                    (
                        wall_intercept(bot.position, endpoint, t, limit, cfg),
                        ramming(bot.position, endpoint, t, cfg),
                    )
                })
                .unwrap_or((0.0, 0.0));

            let open_cells =
                flood_fill(ctx.index, &mut cache, endpoint, bot.id, cfg.free_space_budget, half_extent);
            let exit = find_exit(ctx.index, &mut cache, endpoint, bot.id, cfg, half_extent);

            let flank = match turn {
                Turn::Left if personality.flank_side < 0.0 => cfg.flank_bonus,
                Turn::Right if personality.flank_side > 0.0 => cfg.flank_bonus,
                _ => 0.0,
            };
            let visits = behavior.visits(ctx.index.cell_of(endpoint));

            CandidateFeatures {
                danger: danger(ctx.index, bot.id, bot.position, heading, cfg),
                dist_to_future,
                wall_intercept,
                ramming: ram,
                free_space: open_cells as f32 * cfg.free_space_unit,
                exit_score: exit.score(cfg),
                preferred: preferred_turn == Some(turn),
                loop_penalty: visits as f32 * cfg.loop_penalty_unit,
                own_trap: predicts_own_trap(ctx.index, bot.id, bot.position, heading, cfg),
                aggro: personality.aggression,
                noise: personality.noise_bias + flank,
                random_jitter: if cfg.jitter > 0.0 {
                    rng.gen_range(-cfg.jitter..=cfg.jitter)
                } else {
                    0.0
                },
            }
        })
        .collect();

    let next_think = rng.gen_range(cfg.think_interval_min..=cfg.think_interval_max);

    Some(Evaluation {
        agent_index,
        target_id: target.map(|t| t.id),
        base_heading: bot.heading,
        options,
        features,
        next_think,
        probe_hits: cache.hits(),
        probe_misses: cache.misses(),
    })
}

/// Turn for a scored choice, with the panic override applied: a choice
/// predicted to self-trap is replaced by the best of {left, right, straight}
/// under the survival-only score.
pub fn resolve_choice(
    options: &[Turn],
    features: &[CandidateFeatures],
    best: Option<usize>,
) -> Option<(Turn, DecisionKind)> {
    let chosen = best.filter(|&i| i < options.len() && i < features.len())?;
    if !features[chosen].own_trap {
        return Some((options[chosen], DecisionKind::Scored));
    }

    let order: SmallVec<[usize; 3]> = Turn::PANIC_ORDER
        .iter()
        .filter_map(|turn| options.iter().position(|o| o == turn))
        .filter(|&i| i < features.len())
        .collect();
    let pick = argmax(order.iter().map(|&i| panic_score(&features[i])))?;
    Some((options[order[pick]], DecisionKind::Panic))
}

/// What became of a backend response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseOutcome {
    Applied(Option<DecisionKind>),
    Stale,
}

/// Owns the scoring backend and the bookkeeping for in-flight requests
pub struct BotBrain {
    backend: Box<dyn ScoringBackend>,
    /// Request id -> bot waiting on it
    pending: HashMap<u64, AgentId>,
    next_request_id: u64,
    stats: DecisionStats,
}

impl BotBrain {
    pub fn new(backend: Box<dyn ScoringBackend>) -> Self {
        Self {
            backend,
            pending: HashMap::new(),
            next_request_id: 1,
            stats: DecisionStats::default(),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn scorer_stats(&self) -> ScorerStats {
        self.backend.stats()
    }

    pub fn stats(&self) -> DecisionStats {
        self.stats
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Forget in-flight requests. Late responses are then discarded.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.stats = DecisionStats::default();
    }

    /// Per-tick bookkeeping: cell memory, think timers and request expiry
    pub fn update_timers(&mut self, agents: &mut [Agent], now: f32, dt: f32, config: &SimConfig) {
        for agent in agents.iter_mut().filter(|a| a.alive) {
            let cell = cell_key(agent.position, config.arena.cell_size);
            let id = agent.id;
            let Some(bot) = agent.bot.as_mut() else {
                continue;
            };
            bot.remember(cell, config.bots.loop_memory);

            let expired = match &bot.phase {
                BotPhase::AwaitingScore(pending) if now > pending.expires_at => {
                    Some(pending.request_id)
                }
                BotPhase::AwaitingScore(_) => None,
                BotPhase::Cruising => {
                    bot.think_timer -= dt;
                    None
                }
            };
            if let Some(request_id) = expired {
                self.pending.remove(&request_id);
                self.stats.expired_requests += 1;
                bot.phase = BotPhase::Cruising;
                bot.think_timer = 0.0;
                tracing::trace!(bot = id, request_id, "Scoring request expired");
            }
        }
    }

    /// Apply responses that arrived from the backend. Returns how many were
    /// applied; stale ones are counted and dropped.
    pub fn collect_responses(&mut self, agents: &mut [Agent], now: f32) -> usize {
        let mut applied = 0;
        for response in self.backend.poll_responses() {
            let outcome = self
                .pending
                .remove(&response.request_id)
                .and_then(|id| agents.iter_mut().find(|a| a.id == id))
                .map_or(ResponseOutcome::Stale, |agent| {
                    Self::apply_response(agent, response, now)
                });
            match outcome {
                ResponseOutcome::Applied(kind) => {
                    if kind == Some(DecisionKind::Panic) {
                        self.stats.panics += 1;
                    }
                    applied += 1;
                }
                ResponseOutcome::Stale => {
                    self.stats.stale_responses += 1;
                    tracing::trace!(
                        request_id = response.request_id,
                        "Discarded stale scoring response"
                    );
                }
            }
        }
        applied
    }

    /// A response is applied only while its bot is alive, still waiting on
    /// that request, and inside the validity window
    fn apply_response(agent: &mut Agent, response: ScoreResponse, now: f32) -> ResponseOutcome {
        if !agent.alive {
            return ResponseOutcome::Stale;
        }
        let Some(bot) = agent.bot.as_mut() else {
            return ResponseOutcome::Stale;
        };
        let pending = match &bot.phase {
            BotPhase::AwaitingScore(p)
                if p.request_id == response.request_id && now <= p.expires_at =>
            {
                p.clone()
            }
            _ => return ResponseOutcome::Stale,
        };
        bot.phase = BotPhase::Cruising;

        let choice = resolve_choice(&pending.options, &pending.features, response.best);
        if let Some((turn, kind)) = choice {
            commit(agent, pending.base_heading, turn, kind);
        }
        ResponseOutcome::Applied(choice.map(|(_, kind)| kind))
    }

    /// Evaluate every due bot and dispatch the results. Returns the number
    /// of evaluations.
    pub fn think(
        &mut self,
        agents: &mut [Agent],
        now: f32,
        survival_time: f32,
        factors: SpeedFactors,
        config: &SimConfig,
    ) -> usize {
        let due: Vec<usize> = agents
            .iter()
            .enumerate()
            .filter(|(_, a)| {
                a.alive
                    && a.bot
                        .as_ref()
                        .map_or(false, |b| !b.is_awaiting() && b.think_timer <= 0.0)
            })
            .map(|(i, _)| i)
            .collect();
        if due.is_empty() {
            return 0;
        }

        let evaluations: Vec<Evaluation> = {
            let index = OccupancyIndex::new(agents, now, survival_time, config);
            let ctx = DecisionContext {
                index: &index,
                agents,
                config,
                speed: world_speed(&config.motion, survival_time, 1.0),
                factors,
            };
            if config.runtime.parallel_decisions {
                due.par_iter().filter_map(|&i| evaluate_bot(&ctx, i)).collect()
            } else {
                due.iter().filter_map(|&i| evaluate_bot(&ctx, i)).collect()
            }
        };

        let count = evaluations.len();
        for evaluation in evaluations {
            self.dispatch(agents, evaluation, now, config);
        }
        count
    }

    fn dispatch(&mut self, agents: &mut [Agent], evaluation: Evaluation, now: f32, config: &SimConfig) {
        let Some(agent) = agents.get_mut(evaluation.agent_index) else {
            return;
        };
        let Some(bot) = agent.bot.as_mut() else {
            return;
        };
        bot.think_timer = evaluation.next_think;
        bot.target_id = evaluation.target_id;
        bot.decisions = bot.decisions.wrapping_add(1);

        self.stats.evaluations += 1;
        self.stats.probe_hits += evaluation.probe_hits;
        self.stats.probe_misses += evaluation.probe_misses;

        let request_id = self.next_request_id;
        self.next_request_id += 1;
        let request = ScoreRequest {
            request_id,
            options: evaluation.features.to_vec(),
        };

        match self.backend.submit(request) {
            Dispatch::Ready(response) => {
                if let Some((turn, kind)) =
                    resolve_choice(&evaluation.options, &evaluation.features, response.best)
                {
                    if kind == DecisionKind::Panic {
                        self.stats.panics += 1;
                    }
                    commit(agent, evaluation.base_heading, turn, kind);
                }
            }
            Dispatch::Pending => {
                bot.phase = BotPhase::AwaitingScore(PendingDecision {
                    request_id,
                    expires_at: now + config.bots.response_validity,
                    base_heading: evaluation.base_heading,
                    options: evaluation.options,
                    features: evaluation.features,
                });
                self.pending.insert(request_id, agent.id);
            }
        }
    }
}

/// Turn the bot. A turn that would reverse the current heading is dropped.
fn commit(agent: &mut Agent, base_heading: Heading, turn: Turn, kind: DecisionKind) {
    let heading = base_heading.apply(turn);
    if heading == agent.heading.reverse() {
        return;
    }
    agent.heading = heading;
    if let Some(bot) = agent.bot.as_mut() {
        bot.last_decision = Some(kind);
        if kind == DecisionKind::Panic {
            bot.panics += 1;
        }
    }
    tracing::trace!(bot = agent.id, ?heading, ?kind, "Bot committed heading");
}
