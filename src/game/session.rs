//! Session driver
//!
//! `Session` owns the arena contents, the session scalars, the bot brain and
//! the intent queue, and runs one fixed-order tick per `advance(dt)`:
//!
//! 1. clamp dt, drain intents
//! 2. overload timers, bot timers and pending-request expiry
//! 3. collect scoring responses, run due bot decisions
//! 4. plan motion for every live agent against the tick-start occupancy
//!    view, then apply the plans and append trail samples
//! 5. prune expired samples
//! 6. near miss, power-ups, population, score accrual
//! 7. end-of-session check

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::SimConfig;
use crate::game::input_buffer::{Intent, IntentBuffer, IntentSender};
use crate::game::match_result::{summarize, SessionSummary};
use crate::game::snapshot::Snapshot;
use crate::game::spatial::{prune_expired, Blocker, OccupancyIndex};
use crate::game::state::{Agent, AgentId, GameState, Heading, PowerupKind, Role};
use crate::game::systems::ai::{BotBrain, SpeedFactors};
use crate::game::systems::motion::{apply_motion, plan_motions, world_speed, MotionOutcome};
use crate::game::systems::scoring::{ScoringBackend, SyncScorer};
use crate::game::systems::{arena, population};
use crate::util::vec2::Vec2;

/// Session lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    /// Reset but not started; `advance` does nothing
    #[default]
    Ready,
    Running,
    /// Player died
    Ended,
}

/// Session-wide scalars
#[derive(Debug, Clone)]
pub struct SessionState {
    pub phase: SessionPhase,
    /// Simulated seconds survived this run
    pub survival_time: f32,
    pub score: f32,
    /// Best score across resets
    pub best_score: f32,
    pub combo_multiplier: f32,
    pub near_miss_cooldown: f32,
    pub near_misses: u32,
    /// Player speed factor (overload)
    pub speed_multiplier: f32,
    /// Bot speed factor (overload)
    pub bot_speed_multiplier: f32,
    pub overload_timer: f32,
    pub overload_cooldown: f32,
    pub next_bot_join: f32,
    pub next_powerup_spawn: f32,
    pub bots_destroyed: u32,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Ready,
            survival_time: 0.0,
            score: 0.0,
            best_score: 0.0,
            combo_multiplier: 1.0,
            near_miss_cooldown: 0.0,
            near_misses: 0,
            speed_multiplier: 1.0,
            bot_speed_multiplier: 1.0,
            overload_timer: 0.0,
            overload_cooldown: 0.0,
            next_bot_join: 0.0,
            next_powerup_spawn: 0.0,
            bots_destroyed: 0,
        }
    }
}

impl SessionState {
    /// Fresh state for a new run, keeping the best score
    fn for_run(config: &SimConfig, best_score: f32) -> Self {
        Self {
            best_score,
            next_bot_join: config.population.first_join,
            next_powerup_spawn: config.powerups.spawn_interval,
            ..Default::default()
        }
    }

    pub fn start(&mut self) {
        self.phase = SessionPhase::Running;
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.phase == SessionPhase::Running
    }

    #[inline]
    pub fn overload_active(&self) -> bool {
        self.overload_timer > 0.0
    }

    /// Add points and track the best score
    pub fn add_score(&mut self, points: f32) {
        self.score += points;
        self.best_score = self.best_score.max(self.score);
    }
}

/// Something observable that happened during a tick
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    AgentDestroyed {
        id: AgentId,
        role: Role,
        cause: Blocker,
    },
    PhaseChargeConsumed {
        id: AgentId,
        remaining: u32,
    },
    NearMissAwarded {
        bonus: f32,
        multiplier: f32,
    },
    OverloadActivated {
        duration: f32,
        from_pickup: bool,
    },
    PowerupCollected {
        kind: PowerupKind,
        bonus: f32,
    },
    BotJoined {
        id: AgentId,
    },
    BotRespawned {
        id: AgentId,
    },
    SessionEnded(SessionSummary),
}

/// Scoring backend for `config`: the worker thread when enabled and it
/// starts, the inline scorer otherwise
pub fn default_backend(config: &SimConfig) -> Box<dyn ScoringBackend> {
    if config.runtime.worker_scoring {
        if let Some(worker) = worker_backend(config) {
            return worker;
        }
    }
    Box::new(SyncScorer::new(config.bots.weights))
}

#[cfg(feature = "scoring_worker")]
fn worker_backend(config: &SimConfig) -> Option<Box<dyn ScoringBackend>> {
    use crate::game::systems::scoring::ThreadedScorer;

    match ThreadedScorer::new(config.bots.weights, config.bots.worker_channel_capacity) {
        Ok(scorer) => Some(Box::new(scorer)),
        Err(e) => {
            tracing::warn!("Scoring worker unavailable ({}), scoring inline", e);
            None
        }
    }
}

#[cfg(not(feature = "scoring_worker"))]
fn worker_backend(_config: &SimConfig) -> Option<Box<dyn ScoringBackend>> {
    tracing::warn!("Built without scoring_worker, scoring inline");
    None
}

/// One play session: a player, a dynamic bot population and the rules
pub struct Session {
    config: SimConfig,
    game: GameState,
    state: SessionState,
    brain: BotBrain,
    intents: IntentBuffer,
    rng: StdRng,
}

impl Session {
    /// Create a session and reset it. It stays `Ready` until `start()`.
    pub fn new(config: SimConfig, backend: Box<dyn ScoringBackend>) -> Self {
        let rng = StdRng::seed_from_u64(config.runtime.seed);
        let mut session = Self {
            game: GameState::new(),
            state: SessionState::default(),
            brain: BotBrain::new(backend),
            intents: IntentBuffer::default(),
            rng,
            config,
        };
        session.reset();
        session
    }

    /// Create a session with [`default_backend`]
    pub fn with_default_backend(config: SimConfig) -> Self {
        let backend = default_backend(&config);
        Self::new(config, backend)
    }

    /// Clear the arena, place the player and the initial bots. Keeps the
    /// best score; the phase goes back to `Ready`.
    pub fn reset(&mut self) {
        self.game = GameState::new();
        self.state = SessionState::for_run(&self.config, self.state.best_score);
        self.rng = StdRng::seed_from_u64(self.config.runtime.seed);
        self.brain.reset();
        self.intents.clear();

        let position = Vec2::new(0.0, self.config.arena.half_extent * 0.5);
        let id = self.game.alloc_agent_id();
        let mut player = Agent::new_player(
            id,
            self.config.runtime.player_name.clone(),
            position,
            Heading::North,
        );
        player.trail.push(position, 0.0);
        self.game.add_agent(player);

        let bots = population::spawn_initial(&mut self.game, &mut self.rng, &self.config);
        tracing::info!(
            seed = self.config.runtime.seed,
            bots,
            scorer = self.brain.backend_name(),
            "Session reset"
        );
    }

    /// Ready -> Running
    pub fn start(&mut self) {
        if self.state.phase == SessionPhase::Ready {
            self.state.start();
            tracing::info!("Session started");
        }
    }

    /// Advance the simulation by `dt` seconds (clamped to `max_step`)
    pub fn advance(&mut self, dt: f32) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if !self.state.is_running() || !dt.is_finite() || dt <= 0.0 {
            return events;
        }
        let dt = dt.min(self.config.motion.max_step);

        for intent in self.intents.drain() {
            events.extend(self.apply_intent(intent));
        }

        let now = self.game.sim_time;
        arena::update_overload(&mut self.state, dt, &self.config.overload);
        self.brain.update_timers(&mut self.game.agents, now, dt, &self.config);
        self.brain.collect_responses(&mut self.game.agents, now);
        self.brain.think(
            &mut self.game.agents,
            now,
            self.state.survival_time,
            SpeedFactors {
                player: self.state.speed_multiplier,
                bot: self.state.bot_speed_multiplier,
            },
            &self.config,
        );

        events.extend(self.move_agents(now, dt));

        self.game.sim_time = now + dt;
        self.game.tick += 1;
        self.state.survival_time += dt;
        let now = self.game.sim_time;
        let survival = self.state.survival_time;

        prune_expired(&mut self.game.agents, now, survival, &self.config.trail);

        {
            let index = OccupancyIndex::new(&self.game.agents, now, survival, &self.config);
            if let Some(player) = self.game.player() {
                events.extend(arena::update_near_miss(
                    &mut self.state,
                    &index,
                    player,
                    dt,
                    &self.config.combo,
                ));
            }
        }

        events.extend(arena::update_powerups(
            &mut self.game,
            &mut self.state,
            &mut self.rng,
            &self.config,
        ));
        events.extend(population::update_population(
            &mut self.game,
            &mut self.state,
            &mut self.rng,
            &self.config,
        ));

        let player_alive = self.game.player().is_some_and(|p| p.alive);
        if player_alive {
            arena::accrue_score(&mut self.state, dt, &self.config.combo);
        } else {
            self.state.phase = SessionPhase::Ended;
            let summary = self.summary();
            tracing::info!(
                score = summary.score,
                survival = summary.survival_time,
                bots_destroyed = summary.bots_destroyed,
                "Session ended"
            );
            events.push(SessionEvent::SessionEnded(summary));
        }

        events
    }

    /// Plan every live agent against the tick-start view, then apply
    fn move_agents(&mut self, now: f32, dt: f32) -> Vec<SessionEvent> {
        let survival = self.state.survival_time;
        let motion = &self.config.motion;
        let player_speed = world_speed(motion, survival, self.state.speed_multiplier);
        let bot_speed = world_speed(motion, survival, self.state.bot_speed_multiplier);

        let rng = &mut self.rng;
        let distances: Vec<f32> = self
            .game
            .agents
            .iter()
            .map(|agent| match (agent.alive, agent.is_bot()) {
                (false, _) => 0.0,
                (true, false) => player_speed * dt,
                (true, true) => {
                    bot_speed * rng.gen_range(motion.bot_jitter_min..=motion.bot_jitter_max) * dt
                }
            })
            .collect();

        let plans = {
            let index = OccupancyIndex::new(&self.game.agents, now, survival, &self.config);
            plan_motions(
                &self.game.agents,
                &distances,
                &index,
                motion,
                self.config.runtime.parallel_decisions,
            )
        };

        let mut events = Vec::new();
        for plan in &plans {
            let Some(agent) = self.game.get_agent_mut(plan.agent_id) else {
                continue;
            };
            apply_motion(agent, plan, now, dt, &self.config.trail);

            if plan.charges_used > 0 {
                tracing::debug!(agent = agent.id, used = plan.charges_used, "Phase charge consumed");
                events.push(SessionEvent::PhaseChargeConsumed {
                    id: agent.id,
                    remaining: agent.phase_charges,
                });
            }
            if let MotionOutcome::Destroyed(cause) = plan.outcome {
                if agent.is_bot() {
                    self.state.bots_destroyed += 1;
                }
                events.push(SessionEvent::AgentDestroyed {
                    id: agent.id,
                    role: agent.role(),
                    cause,
                });
            }
        }
        events
    }

    fn apply_intent(&mut self, intent: Intent) -> Option<SessionEvent> {
        match intent {
            Intent::TurnLeft => {
                self.turn_player(Heading::turn_left);
                None
            }
            Intent::TurnRight => {
                self.turn_player(Heading::turn_right);
                None
            }
            Intent::Overload => self.activate_overload(),
        }
    }

    fn turn_player(&mut self, turn: fn(Heading) -> Heading) {
        if !self.state.is_running() {
            return;
        }
        if let Some(player) = self.game.player_mut().filter(|p| p.alive) {
            player.heading = turn(player.heading);
        }
    }

    /// Turn the player 90 degrees counter-clockwise
    pub fn turn_left(&mut self) {
        self.turn_player(Heading::turn_left);
    }

    /// Turn the player 90 degrees clockwise
    pub fn turn_right(&mut self) {
        self.turn_player(Heading::turn_right);
    }

    /// Start overload if it is off cooldown
    pub fn activate_overload(&mut self) -> Option<SessionEvent> {
        if !self.state.is_running() {
            return None;
        }
        arena::activate_overload(&mut self.state, &self.config.overload)
    }

    /// Handle for queueing intents from another thread
    pub fn intent_sender(&self) -> IntentSender {
        self.intents.sender()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.game, &self.state, &self.config.trail)
    }

    pub fn summary(&self) -> SessionSummary {
        summarize(&self.config.runtime.player_name, &self.state)
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn game(&self) -> &GameState {
        &self.game
    }

    pub fn game_mut(&mut self) -> &mut GameState {
        &mut self.game
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase
    }

    pub fn brain(&self) -> &BotBrain {
        &self.brain
    }
}
