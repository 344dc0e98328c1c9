//! Reference configuration. `SimConfig::default()` is built from these values;
//! every one of them can be overridden at runtime through the config layer.

/// Arena geometry
pub mod arena {
    /// Half the side length of the square arena (arena spans -HALF..HALF on both axes)
    pub const HALF_EXTENT: f32 = 90.0;
    /// Points closer than this to the boundary are blocked
    pub const WALL_MARGIN: f32 = 1.0;
    /// Coarse cell size used by bot cognition (flood fill, escape search, loop memory)
    pub const CELL_SIZE: f32 = 3.0;
}

/// Trail geometry and expiry
pub mod trail {
    /// Half the wall thickness of a trail segment
    pub const HALF_WIDTH: f32 = 0.4;
    /// Arclength between emitted trail samples
    pub const SAMPLE_SPACING: f32 = 1.0;
    /// Own samples younger than this (seconds of sim time) never self-collide
    pub const GRACE_WINDOW: f32 = 0.25;
    /// Fade age at survival time zero (seconds)
    pub const FADE_BASE: f32 = 9.0;
    /// Fade age lost per second survived
    pub const FADE_DECAY: f32 = 0.045;
    /// Fade age never drops below this
    pub const FADE_FLOOR: f32 = 3.5;
}

/// Motion and sweep constants
pub mod motion {
    /// Collision radius of every agent
    pub const AGENT_RADIUS: f32 = 1.0;
    /// Speed at survival time zero (units/s)
    pub const BASE_SPEED: f32 = 24.0;
    /// Speed gained per second survived
    pub const SPEED_RAMP: f32 = 0.42;
    /// Hard speed cap
    pub const MAX_SPEED: f32 = 52.0;
    /// Sweep sub-step length as a fraction of the agent radius
    pub const SWEEP_FRACTION: f32 = 0.5;
    /// Forward offset applied when a phase charge absorbs a hit.
    /// Must exceed twice the collision distance so the landing point is clear.
    pub const PHASE_NUDGE: f32 = 3.2;
    /// Per-tick bot speed jitter range
    pub const BOT_JITTER_MIN: f32 = 0.9;
    pub const BOT_JITTER_MAX: f32 = 1.05;
    /// Largest dt accepted by a single tick (stall protection)
    pub const MAX_STEP: f32 = 0.033;
    /// Driver tick rate in Hz
    pub const TICK_RATE: u32 = 60;
}

/// Bot decision engine constants
pub mod ai {
    /// Think interval range (seconds)
    pub const THINK_INTERVAL_MIN: f32 = 0.12;
    pub const THINK_INTERVAL_MAX: f32 = 0.22;
    /// Distance from the bot to a candidate's evaluation point
    pub const LOOKAHEAD: f32 = 6.0;

    /// Danger projection
    pub const DANGER_STEPS: u32 = 8;
    pub const DANGER_STEP: f32 = 1.5;
    pub const DANGER_INFLATE: f32 = 0.6;
    pub const DANGER_WALL_WEIGHT: f32 = 14.0;
    pub const DANGER_OWN_WEIGHT: f32 = 16.0;
    pub const DANGER_OTHER_WEIGHT: f32 = 11.0;

    /// Target prediction
    pub const TARGET_LEAD_TIME: f32 = 0.8;
    /// Player distance is multiplied by this when picking a target
    pub const PLAYER_PRIORITY: f32 = 0.6;
    pub const FUTURE_GAIN: f32 = 240.0;
    pub const FUTURE_SOFTEN: f32 = 6.0;

    /// Cut-off geometry
    pub const WALL_INTERCEPT_GAIN: f32 = 30.0;
    pub const INTERCEPT_MAX_RANGE: f32 = 70.0;
    /// Fraction of the target's lane (target -> wall) where bots try to cut in
    pub const INTERCEPT_LANE_FRACTION: f32 = 0.55;

    /// Ambush geometry
    pub const RAM_GAIN: f32 = 26.0;
    pub const RAM_RANGE: f32 = 30.0;

    /// Free-space flood fill
    pub const FREE_SPACE_BUDGET: usize = 120;
    pub const FREE_SPACE_UNIT: f32 = 0.5;

    /// Escape search
    pub const EXIT_NODE_BUDGET: usize = 200;
    pub const EXIT_MIN_DEPTH: u32 = 4;
    pub const EXIT_MIN_OPEN: usize = 3;
    pub const EXIT_FOUND_BONUS: f32 = 30.0;
    pub const EXIT_DEAD_END_PENALTY: f32 = 90.0;

    /// Anti-looping memory
    pub const LOOP_MEMORY: usize = 24;
    pub const LOOP_PENALTY_UNIT: f32 = 9.0;

    /// Self-trap forward simulation
    pub const TRAP_HORIZON: f32 = 8.0;
    pub const TRAP_STEP: f32 = 1.0;
    pub const TRAP_ESCAPE_PROBE: f32 = 4.0;

    /// Personality
    pub const JITTER: f32 = 4.0;
    pub const FLANK_BONUS: f32 = 3.0;
    pub const AGGRESSION_MIN: f32 = 0.6;
    pub const AGGRESSION_MAX: f32 = 1.4;
    pub const NOISE_BIAS_RANGE: f32 = 4.0;

    /// Worker offload
    pub const RESPONSE_VALIDITY: f32 = 0.25;
    pub const WORKER_CHANNEL_CAPACITY: usize = 64;
}

/// Score weights applied to candidate features
pub mod weights {
    pub const DANGER: f32 = 1.0;
    pub const DIST_TO_FUTURE: f32 = 1.0;
    pub const WALL_INTERCEPT_BASE: f32 = 1.05;
    pub const WALL_INTERCEPT_AGGRO: f32 = 0.35;
    pub const RAMMING_BASE: f32 = 1.0;
    pub const RAMMING_AGGRO: f32 = 0.25;
    pub const FREE_SPACE: f32 = 0.95;
    pub const EXIT: f32 = 1.0;
    pub const PREFERRED_BASE: f32 = 18.0;
    pub const PREFERRED_AGGRO: f32 = 8.0;
    pub const LOOP: f32 = 1.0;
    pub const OWN_TRAP: f32 = 260.0;
    pub const NOISE: f32 = 0.35;
    pub const JITTER: f32 = 1.0;
}

/// Near-miss combo and score accrual
pub mod combo {
    /// Player within this distance of a foreign segment earns a near miss
    pub const NEAR_MISS_DISTANCE: f32 = 7.0;
    pub const COOLDOWN: f32 = 0.24;
    pub const STEP: f32 = 0.22;
    pub const CAP: f32 = 5.0;
    /// Score bonus per near miss, multiplied by the new multiplier
    pub const BONUS: f32 = 8.0;
    /// Linear decay toward 1 when no near miss is awarded
    pub const DECAY_PER_SECOND: f32 = 0.08;
    /// Continuous time score (per second, times multiplier)
    pub const SCORE_PER_SECOND: f32 = 13.0;
}

/// Overload ability (slow motion)
pub mod overload {
    pub const DURATION: f32 = 3.5;
    pub const COOLDOWN: f32 = 9.5;
    pub const PLAYER_FACTOR: f32 = 0.56;
    pub const BOT_FACTOR: f32 = 0.45;
    /// Overload granted by a pickup
    pub const PICKUP_DURATION: f32 = 2.8;
    /// Cooldown seconds removed by a pickup
    pub const PICKUP_COOLDOWN_REFUND: f32 = 3.0;
}

/// Power-up spawning
pub mod powerups {
    pub const SPAWN_INTERVAL: f32 = 6.0;
    pub const MAX_ACTIVE: usize = 3;
    pub const PICKUP_RADIUS: f32 = 1.8;
    pub const SCORE_BONUS: f32 = 35.0;
}

/// Bot population
pub mod population {
    pub const INITIAL_BOTS: usize = 3;
    pub const MIN_BOTS: usize = 2;
    pub const MAX_BOTS: usize = 8;
    pub const FIRST_JOIN: f32 = 10.0;
    pub const JOIN_INTERVAL: f32 = 12.0;
    pub const RESPAWN_BOTS: bool = true;
    pub const SPAWN_WALL_CLEARANCE: f32 = 12.0;
    pub const SPAWN_AGENT_CLEARANCE: f32 = 14.0;
    pub const SPAWN_MAX_ATTEMPTS: u32 = 30;
}
