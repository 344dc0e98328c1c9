//! Game state definitions and structures
//!
//! Agents (player and bots), their trails, power-ups and the arena-wide clock.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::config::BotConfig;
use crate::game::spatial::CellKey;
use crate::game::systems::scoring::CandidateFeatures;
use crate::util::vec2::Vec2;

/// Unique agent identifier
pub type AgentId = u32;

/// Axis-aligned heading of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Heading {
    North,
    East,
    South,
    West,
}

impl Heading {
    pub const ALL: [Heading; 4] = [Heading::North, Heading::East, Heading::South, Heading::West];

    /// Unit vector on the arena plane. North is -z.
    #[inline]
    pub fn vector(self) -> Vec2 {
        match self {
            Heading::North => Vec2::new(0.0, -1.0),
            Heading::East => Vec2::new(1.0, 0.0),
            Heading::South => Vec2::new(0.0, 1.0),
            Heading::West => Vec2::new(-1.0, 0.0),
        }
    }

    pub fn turn_left(self) -> Heading {
        match self {
            Heading::North => Heading::West,
            Heading::West => Heading::South,
            Heading::South => Heading::East,
            Heading::East => Heading::North,
        }
    }

    pub fn turn_right(self) -> Heading {
        match self {
            Heading::North => Heading::East,
            Heading::East => Heading::South,
            Heading::South => Heading::West,
            Heading::West => Heading::North,
        }
    }

    pub fn reverse(self) -> Heading {
        self.turn_left().turn_left()
    }

    #[inline]
    pub fn apply(self, turn: Turn) -> Heading {
        match turn {
            Turn::Straight => self,
            Turn::Left => self.turn_left(),
            Turn::Right => self.turn_right(),
        }
    }

    /// Greedy turn that best points toward `delta`. Never a reversal: a target
    /// straight behind resolves to the side it leans toward.
    pub fn turn_toward(self, delta: Vec2) -> Turn {
        Turn::EVALUATION_ORDER
            .iter()
            .copied()
            .map(|turn| (turn, self.apply(turn).vector().dot(delta)))
            .fold(None, |best: Option<(Turn, f32)>, (turn, align)| match best {
                Some((_, best_align)) if best_align >= align => best,
                _ => Some((turn, align)),
            })
            .map(|(turn, _)| turn)
            .unwrap_or(Turn::Straight)
    }
}

/// Relative heading option. A 180 degree reversal is not representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Turn {
    Straight,
    Left,
    Right,
}

impl Turn {
    /// Order candidates are scored in; earlier wins ties
    pub const EVALUATION_ORDER: [Turn; 3] = [Turn::Straight, Turn::Left, Turn::Right];
    /// Order the panic re-score walks
    pub const PANIC_ORDER: [Turn; 3] = [Turn::Left, Turn::Right, Turn::Straight];
}

/// Agent role, derived from whether the agent carries bot behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Player,
    Bot,
}

/// One timestamped trail point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailSample {
    pub x: f32,
    pub z: f32,
    pub created_at: f32,
}

impl TrailSample {
    #[inline]
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.z)
    }
}

/// Smallest timestamp step used to keep samples strictly ordered
const MIN_SAMPLE_TIME_STEP: f32 = 1e-4;

/// Smallest f32 strictly greater than `t`. Past roughly 2048 s, adding
/// `MIN_SAMPLE_TIME_STEP` rounds back to `t`.
fn next_representable(t: f32) -> f32 {
    if t == 0.0 {
        f32::from_bits(1)
    } else if t > 0.0 {
        f32::from_bits(t.to_bits() + 1)
    } else {
        f32::from_bits(t.to_bits() - 1)
    }
}

/// Ordered polyline of samples owned by one agent.
///
/// Keeps a conservative bounding box over its samples for broad-phase
/// rejection; the box only shrinks when the trail is pruned.
#[derive(Debug, Clone, Default)]
pub struct Trail {
    samples: VecDeque<TrailSample>,
    bounds: Option<(Vec2, Vec2)>,
}

impl Trail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample. Timestamps that do not advance past the newest sample
    /// are bumped forward so the trail stays strictly time-ordered.
    pub fn push(&mut self, position: Vec2, created_at: f32) {
        let created_at = match self.samples.back() {
            Some(last) if created_at <= last.created_at => {
                (last.created_at + MIN_SAMPLE_TIME_STEP).max(next_representable(last.created_at))
            }
            _ => created_at,
        };
        self.samples.push_back(TrailSample {
            x: position.x,
            z: position.z,
            created_at,
        });
        self.bounds = Some(match self.bounds {
            Some((min, max)) => (min.min(position), max.max(position)),
            None => (position, position),
        });
    }

    /// Remove samples created before `cutoff` from the front. Returns how many
    /// were removed.
    pub fn prune_older_than(&mut self, cutoff: f32) -> usize {
        let mut removed = 0;
        while let Some(front) = self.samples.front() {
            if front.created_at >= cutoff {
                break;
            }
            self.samples.pop_front();
            removed += 1;
        }
        if removed > 0 {
            self.recompute_bounds();
        }
        removed
    }

    fn recompute_bounds(&mut self) {
        self.bounds = self.samples.iter().fold(None, |acc, s| {
            let p = s.position();
            Some(match acc {
                Some((min, max)) => (Vec2::min(&min, p), Vec2::max(&max, p)),
                None => (p, p),
            })
        });
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.bounds = None;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrailSample> + '_ {
        self.samples.iter()
    }

    pub fn samples(&self) -> &VecDeque<TrailSample> {
        &self.samples
    }

    pub fn front(&self) -> Option<&TrailSample> {
        self.samples.front()
    }

    pub fn back(&self) -> Option<&TrailSample> {
        self.samples.back()
    }

    pub fn bounds(&self) -> Option<(Vec2, Vec2)> {
        self.bounds
    }

    /// Number of samples still at or after `cutoff`
    pub fn live_count(&self, cutoff: f32) -> usize {
        self.samples.iter().filter(|s| s.created_at >= cutoff).count()
    }
}

/// Bot personality traits
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Personality {
    /// Multiplier on ramming / intercept / preferred bonuses
    pub aggression: f32,
    /// Preferred flank: -1.0 favours left turns, +1.0 right turns
    pub flank_side: f32,
    /// Additive bias on the noise term
    pub noise_bias: f32,
}

impl Personality {
    pub fn random(rng: &mut impl Rng, config: &BotConfig) -> Self {
        Self {
            aggression: rng.gen_range(config.aggression_min..=config.aggression_max),
            flank_side: if rng.gen_bool(0.5) { -1.0 } else { 1.0 },
            noise_bias: rng.gen_range(-config.noise_bias_range..=config.noise_bias_range),
        }
    }
}

impl Default for Personality {
    fn default() -> Self {
        Self {
            aggression: 1.0,
            flank_side: 1.0,
            noise_bias: 0.0,
        }
    }
}

/// Decision waiting on the scoring worker
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDecision {
    pub request_id: u64,
    /// Sim time after which a response is stale
    pub expires_at: f32,
    /// Heading the options are relative to
    pub base_heading: Heading,
    /// Options in the order they were sent
    pub options: SmallVec<[Turn; 3]>,
    /// Features sent with the request, kept for the panic check
    pub features: SmallVec<[CandidateFeatures; 3]>,
}

/// Bot decision state machine
#[derive(Debug, Clone, PartialEq, Default)]
pub enum BotPhase {
    #[default]
    Cruising,
    AwaitingScore(PendingDecision),
}

/// How the last committed heading was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionKind {
    Scored,
    Panic,
}

/// Bot-only state
#[derive(Debug, Clone)]
pub struct BotBehaviorState {
    /// Countdown to the next decision (seconds)
    pub think_timer: f32,
    /// Recently visited coarse cells, newest at the back
    pub memory: VecDeque<CellKey>,
    pub target_id: Option<AgentId>,
    pub personality: Personality,
    /// Seed for this bot's decision noise
    pub seed: u64,
    pub phase: BotPhase,
    pub last_decision: Option<DecisionKind>,
    pub decisions: u32,
    pub panics: u32,
}

impl BotBehaviorState {
    /// Seeded behavior state; the seed fixes personality and all decision noise
    pub fn new(seed: u64, config: &BotConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let personality = Personality::random(&mut rng, config);
        let think_timer = rng.gen_range(0.0..config.think_interval_max);
        Self {
            think_timer,
            memory: VecDeque::with_capacity(config.loop_memory),
            target_id: None,
            personality,
            seed,
            phase: BotPhase::Cruising,
            last_decision: None,
            decisions: 0,
            panics: 0,
        }
    }

    /// RNG for the next decision. Depends only on the seed and how many
    /// decisions were taken, so passes can run in any order.
    pub fn decision_rng(&self) -> StdRng {
        StdRng::seed_from_u64(
            self.seed ^ u64::from(self.decisions).wrapping_mul(0x9E37_79B9_7F4A_7C15),
        )
    }

    /// Record a visited cell, dropping the oldest past `capacity`
    pub fn remember(&mut self, cell: CellKey, capacity: usize) {
        if self.memory.back() == Some(&cell) {
            return;
        }
        self.memory.push_back(cell);
        while self.memory.len() > capacity {
            self.memory.pop_front();
        }
    }

    pub fn visits(&self, cell: CellKey) -> usize {
        self.memory.iter().filter(|&&c| c == cell).count()
    }

    pub fn is_awaiting(&self) -> bool {
        matches!(self.phase, BotPhase::AwaitingScore(_))
    }
}

/// Player or bot agent
#[derive(Debug, Clone)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub position: Vec2,
    pub heading: Heading,
    pub alive: bool,
    pub trail: Trail,
    /// Defensive charges that absorb one collision each
    pub phase_charges: u32,
    /// Sim time of death
    pub died_at: Option<f32>,
    /// Heading at the time the newest sample was emitted (corner detection)
    pub sampled_heading: Heading,
    /// Arclength travelled since the newest sample
    pub since_sample: f32,
    pub bot: Option<BotBehaviorState>,
}

impl Agent {
    pub fn new_player(id: AgentId, name: String, position: Vec2, heading: Heading) -> Self {
        Self {
            id,
            name,
            position,
            heading,
            alive: true,
            trail: Trail::new(),
            phase_charges: 0,
            died_at: None,
            sampled_heading: heading,
            since_sample: 0.0,
            bot: None,
        }
    }

    pub fn new_bot(
        id: AgentId,
        position: Vec2,
        heading: Heading,
        behavior: BotBehaviorState,
    ) -> Self {
        Self {
            bot: Some(behavior),
            ..Self::new_player(id, format!("Bot-{}", id), position, heading)
        }
    }

    #[inline]
    pub fn role(&self) -> Role {
        if self.bot.is_some() {
            Role::Bot
        } else {
            Role::Player
        }
    }

    #[inline]
    pub fn is_bot(&self) -> bool {
        self.bot.is_some()
    }

    /// Put the agent back into play at a new spot. Keeps identity and personality.
    pub fn respawn(&mut self, position: Vec2, heading: Heading) {
        self.position = position;
        self.heading = heading;
        self.sampled_heading = heading;
        self.since_sample = 0.0;
        self.alive = true;
        self.died_at = None;
        self.trail.clear();
        if let Some(bot) = self.bot.as_mut() {
            bot.phase = BotPhase::Cruising;
            bot.memory.clear();
            bot.target_id = None;
        }
    }

    /// Mark dead at `now`
    pub fn destroy(&mut self, now: f32) {
        self.alive = false;
        self.died_at = Some(now);
        if let Some(bot) = self.bot.as_mut() {
            bot.phase = BotPhase::Cruising;
        }
    }
}

/// Power-up kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerupKind {
    /// Grants one phase charge
    Phase,
    /// Starts overload and shortens its cooldown
    Overload,
}

/// Power-up lying in the arena
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Powerup {
    pub id: u64,
    pub kind: PowerupKind,
    pub position: Vec2,
}

/// Arena contents: agents, power-ups and the simulation clock
#[derive(Debug, Clone, Default)]
pub struct GameState {
    /// Agents in creation order; iteration order is part of determinism
    pub agents: Vec<Agent>,
    pub powerups: Vec<Powerup>,
    /// Simulated seconds since reset
    pub sim_time: f32,
    pub tick: u64,
    next_agent_id: AgentId,
    next_powerup_id: u64,
}

impl GameState {
    pub fn new() -> Self {
        Self {
            next_agent_id: 1,
            next_powerup_id: 1,
            ..Default::default()
        }
    }

    pub fn alloc_agent_id(&mut self) -> AgentId {
        let id = self.next_agent_id;
        self.next_agent_id += 1;
        id
    }

    pub fn alloc_powerup_id(&mut self) -> u64 {
        let id = self.next_powerup_id;
        self.next_powerup_id += 1;
        id
    }

    pub fn add_agent(&mut self, agent: Agent) {
        self.next_agent_id = self.next_agent_id.max(agent.id + 1);
        self.agents.push(agent);
    }

    pub fn get_agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn get_agent_mut(&mut self, id: AgentId) -> Option<&mut Agent> {
        self.agents.iter_mut().find(|a| a.id == id)
    }

    pub fn player(&self) -> Option<&Agent> {
        self.agents.iter().find(|a| !a.is_bot())
    }

    pub fn player_mut(&mut self) -> Option<&mut Agent> {
        self.agents.iter_mut().find(|a| !a.is_bot())
    }

    pub fn player_id(&self) -> Option<AgentId> {
        self.player().map(|p| p.id)
    }

    pub fn alive_bot_count(&self) -> usize {
        self.agents.iter().filter(|a| a.is_bot() && a.alive).count()
    }

    pub fn total_samples(&self) -> usize {
        self.agents.iter().map(|a| a.trail.len()).sum()
    }
}
