//! Simulation configuration
//!
//! Every tuning constant of the simulation lives here. `Default` is the
//! reference configuration from `game::constants`; `load_or_default` applies
//! `LIGHTCYCLE_*` environment overrides on top of it.
//!
//! # Environment Variables
//!
//! - `LIGHTCYCLE_SEED` - RNG seed for the session and all bots (default: 0x5EED)
//! - `LIGHTCYCLE_PLAYER_NAME` - Name reported in the session summary
//! - `LIGHTCYCLE_TICK_RATE` - Driver tick rate in Hz (default: 60)
//! - `LIGHTCYCLE_ARENA_HALF_EXTENT` - Arena half side length
//! - `LIGHTCYCLE_BASE_SPEED` / `LIGHTCYCLE_MAX_SPEED` - Speed model
//! - `LIGHTCYCLE_FADE_BASE` / `LIGHTCYCLE_FADE_FLOOR` - Trail fade ages
//! - `LIGHTCYCLE_INITIAL_BOTS` / `LIGHTCYCLE_MIN_BOTS` / `LIGHTCYCLE_MAX_BOTS` - Population
//! - `LIGHTCYCLE_JOIN_INTERVAL` - Seconds between scheduled bot joins
//! - `LIGHTCYCLE_RESPAWN_BOTS` - Whether dead bots come back once their trail fades
//! - `LIGHTCYCLE_PARALLEL_DECISIONS` - Run bot decision passes on the rayon pool
//! - `LIGHTCYCLE_WORKER_SCORING` - Score candidates on a worker thread

use std::str::FromStr;

use crate::game::constants::{
    ai, arena, combo, motion, overload, population, powerups, trail, weights,
};

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be positive (got {value})")]
    NotPositive { field: &'static str, value: f32 },
    #[error("{min_field} ({min}) cannot exceed {max_field} ({max})")]
    InvertedRange {
        min_field: &'static str,
        min: f32,
        max_field: &'static str,
        max: f32,
    },
    #[error("phase nudge {nudge} must exceed twice the collision radius {radius}")]
    NudgeTooShort { nudge: f32, radius: f32 },
    #[error("min_bots ({min}) cannot exceed max_bots ({max})")]
    PopulationRange { min: usize, max: usize },
    #[error("tick rate must be at least 1")]
    ZeroTickRate,
}

/// Arena geometry
#[derive(Debug, Clone)]
pub struct ArenaConfig {
    pub half_extent: f32,
    pub wall_margin: f32,
    pub cell_size: f32,
}

/// Trail geometry and fade model
#[derive(Debug, Clone)]
pub struct TrailConfig {
    pub half_width: f32,
    pub sample_spacing: f32,
    pub grace_window: f32,
    pub fade_base: f32,
    pub fade_decay: f32,
    pub fade_floor: f32,
}

impl TrailConfig {
    /// Age after which a sample stops being a hazard. Shrinks as the run goes
    /// on, never below `fade_floor`.
    pub fn fade_age(&self, survival_time: f32) -> f32 {
        (self.fade_base - survival_time * self.fade_decay).max(self.fade_floor)
    }
}

/// Speed model and sweep
#[derive(Debug, Clone)]
pub struct MotionConfig {
    pub agent_radius: f32,
    pub base_speed: f32,
    pub speed_ramp: f32,
    pub max_speed: f32,
    pub sweep_fraction: f32,
    pub phase_nudge: f32,
    pub bot_jitter_min: f32,
    pub bot_jitter_max: f32,
    pub max_step: f32,
}

/// Weight table for the candidate score. Shared by the in-process scorer and
/// the worker so both produce the same choice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub danger: f32,
    pub dist_to_future: f32,
    pub wall_intercept_base: f32,
    pub wall_intercept_aggro: f32,
    pub ramming_base: f32,
    pub ramming_aggro: f32,
    pub free_space: f32,
    pub exit: f32,
    pub preferred_base: f32,
    pub preferred_aggro: f32,
    pub loop_penalty: f32,
    pub own_trap: f32,
    pub noise: f32,
    pub jitter: f32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            danger: weights::DANGER,
            dist_to_future: weights::DIST_TO_FUTURE,
            wall_intercept_base: weights::WALL_INTERCEPT_BASE,
            wall_intercept_aggro: weights::WALL_INTERCEPT_AGGRO,
            ramming_base: weights::RAMMING_BASE,
            ramming_aggro: weights::RAMMING_AGGRO,
            free_space: weights::FREE_SPACE,
            exit: weights::EXIT,
            preferred_base: weights::PREFERRED_BASE,
            preferred_aggro: weights::PREFERRED_AGGRO,
            loop_penalty: weights::LOOP,
            own_trap: weights::OWN_TRAP,
            noise: weights::NOISE,
            jitter: weights::JITTER,
        }
    }
}

/// Bot decision engine tuning
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub think_interval_min: f32,
    pub think_interval_max: f32,
    pub lookahead: f32,
    pub danger_steps: u32,
    pub danger_step: f32,
    pub danger_inflate: f32,
    pub danger_wall_weight: f32,
    pub danger_own_weight: f32,
    pub danger_other_weight: f32,
    pub target_lead_time: f32,
    pub player_priority: f32,
    pub future_gain: f32,
    pub future_soften: f32,
    pub wall_intercept_gain: f32,
    pub intercept_max_range: f32,
    pub intercept_lane_fraction: f32,
    pub ram_gain: f32,
    pub ram_range: f32,
    pub free_space_budget: usize,
    pub free_space_unit: f32,
    pub exit_node_budget: usize,
    pub exit_min_depth: u32,
    pub exit_min_open: usize,
    pub exit_found_bonus: f32,
    pub exit_dead_end_penalty: f32,
    pub loop_memory: usize,
    pub loop_penalty_unit: f32,
    pub trap_horizon: f32,
    pub trap_step: f32,
    pub trap_escape_probe: f32,
    pub jitter: f32,
    pub flank_bonus: f32,
    pub aggression_min: f32,
    pub aggression_max: f32,
    pub noise_bias_range: f32,
    pub response_validity: f32,
    pub worker_channel_capacity: usize,
    pub weights: ScoreWeights,
}

/// Near-miss combo and score accrual
#[derive(Debug, Clone)]
pub struct ComboConfig {
    pub near_miss_distance: f32,
    pub cooldown: f32,
    pub step: f32,
    pub cap: f32,
    pub bonus: f32,
    pub decay_per_second: f32,
    pub score_per_second: f32,
}

/// Overload ability
#[derive(Debug, Clone)]
pub struct OverloadConfig {
    pub duration: f32,
    pub cooldown: f32,
    pub player_factor: f32,
    pub bot_factor: f32,
    pub pickup_duration: f32,
    pub pickup_cooldown_refund: f32,
}

/// Power-up spawning and pickup
#[derive(Debug, Clone)]
pub struct PowerupConfig {
    pub enabled: bool,
    pub spawn_interval: f32,
    pub max_active: usize,
    pub pickup_radius: f32,
    pub score_bonus: f32,
}

/// Bot population management
#[derive(Debug, Clone)]
pub struct PopulationConfig {
    pub initial_bots: usize,
    pub min_bots: usize,
    pub max_bots: usize,
    pub first_join: f32,
    pub join_interval: f32,
    pub respawn_bots: bool,
    pub spawn_wall_clearance: f32,
    pub spawn_agent_clearance: f32,
    pub spawn_max_attempts: u32,
}

/// Session-level runtime options
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub seed: u64,
    pub player_name: String,
    pub tick_rate: u32,
    pub parallel_decisions: bool,
    pub worker_scoring: bool,
}

/// Complete simulation configuration
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub arena: ArenaConfig,
    pub trail: TrailConfig,
    pub motion: MotionConfig,
    pub bots: BotConfig,
    pub combo: ComboConfig,
    pub overload: OverloadConfig,
    pub powerups: PowerupConfig,
    pub population: PopulationConfig,
    pub runtime: RuntimeConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            arena: ArenaConfig {
                half_extent: arena::HALF_EXTENT,
                wall_margin: arena::WALL_MARGIN,
                cell_size: arena::CELL_SIZE,
            },
            trail: TrailConfig {
                half_width: trail::HALF_WIDTH,
                sample_spacing: trail::SAMPLE_SPACING,
                grace_window: trail::GRACE_WINDOW,
                fade_base: trail::FADE_BASE,
                fade_decay: trail::FADE_DECAY,
                fade_floor: trail::FADE_FLOOR,
            },
            motion: MotionConfig {
                agent_radius: motion::AGENT_RADIUS,
                base_speed: motion::BASE_SPEED,
                speed_ramp: motion::SPEED_RAMP,
                max_speed: motion::MAX_SPEED,
                sweep_fraction: motion::SWEEP_FRACTION,
                phase_nudge: motion::PHASE_NUDGE,
                bot_jitter_min: motion::BOT_JITTER_MIN,
                bot_jitter_max: motion::BOT_JITTER_MAX,
                max_step: motion::MAX_STEP,
            },
            bots: BotConfig {
                think_interval_min: ai::THINK_INTERVAL_MIN,
                think_interval_max: ai::THINK_INTERVAL_MAX,
                lookahead: ai::LOOKAHEAD,
                danger_steps: ai::DANGER_STEPS,
                danger_step: ai::DANGER_STEP,
                danger_inflate: ai::DANGER_INFLATE,
                danger_wall_weight: ai::DANGER_WALL_WEIGHT,
                danger_own_weight: ai::DANGER_OWN_WEIGHT,
                danger_other_weight: ai::DANGER_OTHER_WEIGHT,
                target_lead_time: ai::TARGET_LEAD_TIME,
                player_priority: ai::PLAYER_PRIORITY,
                future_gain: ai::FUTURE_GAIN,
                future_soften: ai::FUTURE_SOFTEN,
                wall_intercept_gain: ai::WALL_INTERCEPT_GAIN,
                intercept_max_range: ai::INTERCEPT_MAX_RANGE,
                intercept_lane_fraction: ai::INTERCEPT_LANE_FRACTION,
                ram_gain: ai::RAM_GAIN,
                ram_range: ai::RAM_RANGE,
                free_space_budget: ai::FREE_SPACE_BUDGET,
                free_space_unit: ai::FREE_SPACE_UNIT,
                exit_node_budget: ai::EXIT_NODE_BUDGET,
                exit_min_depth: ai::EXIT_MIN_DEPTH,
                exit_min_open: ai::EXIT_MIN_OPEN,
                exit_found_bonus: ai::EXIT_FOUND_BONUS,
                exit_dead_end_penalty: ai::EXIT_DEAD_END_PENALTY,
                loop_memory: ai::LOOP_MEMORY,
                loop_penalty_unit: ai::LOOP_PENALTY_UNIT,
                trap_horizon: ai::TRAP_HORIZON,
                trap_step: ai::TRAP_STEP,
                trap_escape_probe: ai::TRAP_ESCAPE_PROBE,
                jitter: ai::JITTER,
                flank_bonus: ai::FLANK_BONUS,
                aggression_min: ai::AGGRESSION_MIN,
                aggression_max: ai::AGGRESSION_MAX,
                noise_bias_range: ai::NOISE_BIAS_RANGE,
                response_validity: ai::RESPONSE_VALIDITY,
                worker_channel_capacity: ai::WORKER_CHANNEL_CAPACITY,
                weights: ScoreWeights::default(),
            },
            combo: ComboConfig {
                near_miss_distance: combo::NEAR_MISS_DISTANCE,
                cooldown: combo::COOLDOWN,
                step: combo::STEP,
                cap: combo::CAP,
                bonus: combo::BONUS,
                decay_per_second: combo::DECAY_PER_SECOND,
                score_per_second: combo::SCORE_PER_SECOND,
            },
            overload: OverloadConfig {
                duration: overload::DURATION,
                cooldown: overload::COOLDOWN,
                player_factor: overload::PLAYER_FACTOR,
                bot_factor: overload::BOT_FACTOR,
                pickup_duration: overload::PICKUP_DURATION,
                pickup_cooldown_refund: overload::PICKUP_COOLDOWN_REFUND,
            },
            powerups: PowerupConfig {
                enabled: true,
                spawn_interval: powerups::SPAWN_INTERVAL,
                max_active: powerups::MAX_ACTIVE,
                pickup_radius: powerups::PICKUP_RADIUS,
                score_bonus: powerups::SCORE_BONUS,
            },
            population: PopulationConfig {
                initial_bots: population::INITIAL_BOTS,
                min_bots: population::MIN_BOTS,
                max_bots: population::MAX_BOTS,
                first_join: population::FIRST_JOIN,
                join_interval: population::JOIN_INTERVAL,
                respawn_bots: population::RESPAWN_BOTS,
                spawn_wall_clearance: population::SPAWN_WALL_CLEARANCE,
                spawn_agent_clearance: population::SPAWN_AGENT_CLEARANCE,
                spawn_max_attempts: population::SPAWN_MAX_ATTEMPTS,
            },
            runtime: RuntimeConfig {
                seed: 0x5EED,
                player_name: "Player".to_string(),
                tick_rate: motion::TICK_RATE,
                parallel_decisions: cfg!(feature = "parallel_decisions"),
                worker_scoring: cfg!(feature = "scoring_worker"),
            },
        }
    }
}

/// Parse an environment variable into `target`, keeping the current value
/// (and warning) when the variable is malformed
fn override_from_env<T: FromStr>(key: &str, target: &mut T) {
    if let Ok(raw) = std::env::var(key) {
        match raw.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!("Invalid {} '{}', using default", key, raw),
        }
    }
}

impl SimConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        override_from_env("LIGHTCYCLE_SEED", &mut config.runtime.seed);
        if let Ok(name) = std::env::var("LIGHTCYCLE_PLAYER_NAME") {
            if !name.trim().is_empty() {
                config.runtime.player_name = name;
            }
        }
        override_from_env("LIGHTCYCLE_TICK_RATE", &mut config.runtime.tick_rate);
        override_from_env("LIGHTCYCLE_PARALLEL_DECISIONS", &mut config.runtime.parallel_decisions);
        override_from_env("LIGHTCYCLE_WORKER_SCORING", &mut config.runtime.worker_scoring);

        override_from_env("LIGHTCYCLE_ARENA_HALF_EXTENT", &mut config.arena.half_extent);
        override_from_env("LIGHTCYCLE_BASE_SPEED", &mut config.motion.base_speed);
        override_from_env("LIGHTCYCLE_MAX_SPEED", &mut config.motion.max_speed);
        override_from_env("LIGHTCYCLE_FADE_BASE", &mut config.trail.fade_base);
        override_from_env("LIGHTCYCLE_FADE_FLOOR", &mut config.trail.fade_floor);

        override_from_env("LIGHTCYCLE_INITIAL_BOTS", &mut config.population.initial_bots);
        override_from_env("LIGHTCYCLE_MIN_BOTS", &mut config.population.min_bots);
        override_from_env("LIGHTCYCLE_MAX_BOTS", &mut config.population.max_bots);
        override_from_env("LIGHTCYCLE_JOIN_INTERVAL", &mut config.population.join_interval);
        override_from_env("LIGHTCYCLE_RESPAWN_BOTS", &mut config.population.respawn_bots);

        if let Err(e) = config.validate() {
            tracing::warn!("Configuration rejected ({}), using defaults", e);
            return Self::default();
        }

        tracing::info!(
            seed = config.runtime.seed,
            arena = config.arena.half_extent,
            bots = config.population.initial_bots,
            max_bots = config.population.max_bots,
            parallel = config.runtime.parallel_decisions,
            worker = config.runtime.worker_scoring,
            "Simulation config loaded"
        );

        config
    }

    /// Distance from a trail centre line at which an agent collides
    #[inline]
    pub fn collision_radius(&self) -> f32 {
        self.trail.half_width + self.motion.agent_radius
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positives = [
            ("arena.half_extent", self.arena.half_extent),
            ("arena.cell_size", self.arena.cell_size),
            ("trail.sample_spacing", self.trail.sample_spacing),
            ("trail.fade_floor", self.trail.fade_floor),
            ("motion.agent_radius", self.motion.agent_radius),
            ("motion.base_speed", self.motion.base_speed),
            ("motion.sweep_fraction", self.motion.sweep_fraction),
            ("motion.max_step", self.motion.max_step),
            ("bots.think_interval_min", self.bots.think_interval_min),
            ("bots.lookahead", self.bots.lookahead),
            ("bots.trap_step", self.bots.trap_step),
            ("bots.danger_step", self.bots.danger_step),
        ];
        for (field, value) in positives {
            if !(value > 0.0) {
                return Err(ConfigError::NotPositive { field, value });
            }
        }

        if self.arena.wall_margin >= self.arena.half_extent {
            return Err(ConfigError::InvertedRange {
                min_field: "arena.wall_margin",
                min: self.arena.wall_margin,
                max_field: "arena.half_extent",
                max: self.arena.half_extent,
            });
        }
        if self.trail.fade_floor > self.trail.fade_base {
            return Err(ConfigError::InvertedRange {
                min_field: "trail.fade_floor",
                min: self.trail.fade_floor,
                max_field: "trail.fade_base",
                max: self.trail.fade_base,
            });
        }
        if self.motion.base_speed > self.motion.max_speed {
            return Err(ConfigError::InvertedRange {
                min_field: "motion.base_speed",
                min: self.motion.base_speed,
                max_field: "motion.max_speed",
                max: self.motion.max_speed,
            });
        }
        if self.motion.bot_jitter_min > self.motion.bot_jitter_max {
            return Err(ConfigError::InvertedRange {
                min_field: "motion.bot_jitter_min",
                min: self.motion.bot_jitter_min,
                max_field: "motion.bot_jitter_max",
                max: self.motion.bot_jitter_max,
            });
        }
        if self.bots.think_interval_min > self.bots.think_interval_max {
            return Err(ConfigError::InvertedRange {
                min_field: "bots.think_interval_min",
                min: self.bots.think_interval_min,
                max_field: "bots.think_interval_max",
                max: self.bots.think_interval_max,
            });
        }
        if self.motion.phase_nudge <= 2.0 * self.collision_radius() {
            return Err(ConfigError::NudgeTooShort {
                nudge: self.motion.phase_nudge,
                radius: self.collision_radius(),
            });
        }
        if self.population.min_bots > self.population.max_bots {
            return Err(ConfigError::PopulationRange {
                min: self.population.min_bots,
                max: self.population.max_bots,
            });
        }
        if self.runtime.tick_rate == 0 {
            return Err(ConfigError::ZeroTickRate);
        }
        Ok(())
    }
}
