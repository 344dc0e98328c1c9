//! Arena rules layered on top of motion
//!
//! Near-miss combo, the overload ability, power-ups and score accrual. Every
//! function takes the state it touches and returns the events it produced.

use rand::Rng;

use crate::config::{ComboConfig, OverloadConfig, SimConfig};
use crate::game::session::{SessionEvent, SessionState};
use crate::game::spatial::{OccupancyIndex, OwnerFilter};
use crate::game::state::{Agent, GameState, Powerup, PowerupKind};
use crate::game::systems::population::find_free_point;

// ============================================================================
// Arena System Constants
// ============================================================================

/// Power-ups keep at least this far from the walls
const POWERUP_WALL_CLEARANCE: f32 = 8.0;

/// Power-ups never spawn closer than this to a live agent
const POWERUP_AGENT_CLEARANCE: f32 = 6.0;

/// Spawn attempts per power-up before giving up for this interval
const POWERUP_SPAWN_ATTEMPTS: u32 = 20;

/// Award a near miss when the player skims a foreign trail.
///
/// The player must be within `near_miss_distance` of a segment it does not
/// own without touching it, and the cooldown must have run out. Without an
/// award the multiplier decays linearly toward 1.
pub fn update_near_miss(
    session: &mut SessionState,
    index: &OccupancyIndex<'_>,
    player: &Agent,
    dt: f32,
    config: &ComboConfig,
) -> Option<SessionEvent> {
    session.near_miss_cooldown = (session.near_miss_cooldown - dt).max(0.0);

    let skimming = player.alive
        && index
            .nearest_segment_distance(player.position, OwnerFilter::Except(player.id))
            .is_some_and(|d| d < config.near_miss_distance && d >= index.collision_radius());

    if skimming && session.near_miss_cooldown <= 0.0 {
        session.combo_multiplier = (session.combo_multiplier + config.step).min(config.cap);
        let bonus = config.bonus * session.combo_multiplier;
        session.add_score(bonus);
        session.near_miss_cooldown = config.cooldown;
        session.near_misses += 1;
        tracing::debug!(
            multiplier = session.combo_multiplier,
            bonus,
            "Near miss"
        );
        return Some(SessionEvent::NearMissAwarded {
            bonus,
            multiplier: session.combo_multiplier,
        });
    }

    session.combo_multiplier = (session.combo_multiplier - config.decay_per_second * dt).max(1.0);
    None
}

/// Survival score for this tick, scaled by the combo multiplier
pub fn accrue_score(session: &mut SessionState, dt: f32, config: &ComboConfig) {
    session.add_score(config.score_per_second * dt * session.combo_multiplier);
}

/// Start overload if it is off cooldown
pub fn activate_overload(session: &mut SessionState, config: &OverloadConfig) -> Option<SessionEvent> {
    if session.overload_timer > 0.0 || session.overload_cooldown > 0.0 {
        return None;
    }
    session.overload_timer = config.duration;
    session.overload_cooldown = config.cooldown;
    apply_overload_factors(session, config);
    tracing::debug!(duration = config.duration, "Overload activated");
    Some(SessionEvent::OverloadActivated {
        duration: config.duration,
        from_pickup: false,
    })
}

/// Run the overload timers down and refresh the speed factors
pub fn update_overload(session: &mut SessionState, dt: f32, config: &OverloadConfig) {
    session.overload_timer = (session.overload_timer - dt).max(0.0);
    session.overload_cooldown = (session.overload_cooldown - dt).max(0.0);
    apply_overload_factors(session, config);
}

fn apply_overload_factors(session: &mut SessionState, config: &OverloadConfig) {
    if session.overload_timer > 0.0 {
        session.speed_multiplier = config.player_factor;
        session.bot_speed_multiplier = config.bot_factor;
    } else {
        session.speed_multiplier = 1.0;
        session.bot_speed_multiplier = 1.0;
    }
}

/// Spawn power-ups on schedule and hand out the ones the player touches
pub fn update_powerups(
    game: &mut GameState,
    session: &mut SessionState,
    rng: &mut impl Rng,
    config: &SimConfig,
) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    if !config.powerups.enabled {
        return events;
    }

    if game.sim_time >= session.next_powerup_spawn {
        session.next_powerup_spawn += config.powerups.spawn_interval;
        if game.powerups.len() < config.powerups.max_active {
            spawn_powerup(game, session.survival_time, rng, config);
        }
    }

    events.extend(collect_powerups(game, session, config));
    events
}

fn spawn_powerup(game: &mut GameState, survival_time: f32, rng: &mut impl Rng, config: &SimConfig) {
    let position = {
        let index = OccupancyIndex::new(&game.agents, game.sim_time, survival_time, config);
        find_free_point(
            &index,
            &game.agents,
            rng,
            POWERUP_WALL_CLEARANCE,
            POWERUP_AGENT_CLEARANCE,
            POWERUP_SPAWN_ATTEMPTS,
        )
    };
    let Some(position) = position else {
        tracing::debug!("No free spot for a power-up");
        return;
    };

    let kind = if rng.gen_bool(0.5) {
        PowerupKind::Phase
    } else {
        PowerupKind::Overload
    };
    let id = game.alloc_powerup_id();
    game.powerups.push(Powerup { id, kind, position });
    tracing::debug!(id, ?kind, x = position.x, z = position.z, "Power-up spawned");
}

fn collect_powerups(
    game: &mut GameState,
    session: &mut SessionState,
    config: &SimConfig,
) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    let Some(player) = game.player_mut() else {
        return events;
    };
    if !player.alive {
        return events;
    }

    let position = player.position;
    let radius_sq = config.powerups.pickup_radius * config.powerups.pickup_radius;
    let mut collected = Vec::new();
    game.powerups.retain(|p| {
        let hit = p.position.distance_sq_to(position) <= radius_sq;
        if hit {
            collected.push(p.kind);
        }
        !hit
    });

    for kind in collected {
        match kind {
            PowerupKind::Phase => {
                if let Some(player) = game.player_mut() {
                    player.phase_charges += 1;
                }
            }
            PowerupKind::Overload => {
                events.push(overload_from_pickup(session, &config.overload));
            }
        }
        session.add_score(config.powerups.score_bonus);
        events.push(SessionEvent::PowerupCollected {
            kind,
            bonus: config.powerups.score_bonus,
        });
    }
    events
}

/// Overload from a pickup: runs for at least `pickup_duration` and refunds
/// part of the cooldown
fn overload_from_pickup(session: &mut SessionState, config: &OverloadConfig) -> SessionEvent {
    session.overload_timer = session.overload_timer.max(config.pickup_duration);
    session.overload_cooldown = (session.overload_cooldown - config.pickup_cooldown_refund).max(0.0);
    apply_overload_factors(session, config);
    SessionEvent::OverloadActivated {
        duration: session.overload_timer,
        from_pickup: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{Agent, Heading};
    use crate::util::vec2::Vec2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn create_running_session() -> SessionState {
        let mut session = SessionState::default();
        session.start();
        session
    }

    fn create_player(x: f32, z: f32) -> Agent {
        Agent::new_player(1, "P".to_string(), Vec2::new(x, z), Heading::East)
    }

    fn create_wall_of(id: u32, z: f32) -> Agent {
        let mut bot = Agent::new_player(id, "B".to_string(), Vec2::ZERO, Heading::East);
        bot.trail.push(Vec2::new(-20.0, z), 0.9);
        bot.trail.push(Vec2::new(20.0, z), 1.0);
        bot.alive = false;
        bot
    }

    #[test]
    fn test_near_miss_awards_bonus_times_new_multiplier() {
        let config = SimConfig::default();
        let agents = vec![create_player(0.0, 0.0), create_wall_of(2, 6.0)];
        let index = OccupancyIndex::new(&agents, 1.0, 0.0, &config);
        let mut session = create_running_session();

        let event = update_near_miss(&mut session, &index, &agents[0], 1.0 / 60.0, &config.combo);
        let expected_multiplier = 1.0 + config.combo.step;
        assert!((session.combo_multiplier - expected_multiplier).abs() < 1e-5);
        assert!((session.score - config.combo.bonus * expected_multiplier).abs() < 1e-4);
        assert!(matches!(event, Some(SessionEvent::NearMissAwarded { .. })));
        assert_eq!(session.near_miss_cooldown, config.combo.cooldown);
    }

    #[test]
    fn test_near_miss_respects_cooldown() {
        let config = SimConfig::default();
        let agents = vec![create_player(0.0, 0.0), create_wall_of(2, 6.0)];
        let index = OccupancyIndex::new(&agents, 1.0, 0.0, &config);
        let mut session = create_running_session();

        assert!(update_near_miss(&mut session, &index, &agents[0], 0.01, &config.combo).is_some());
        assert!(update_near_miss(&mut session, &index, &agents[0], 0.01, &config.combo).is_none());
        assert_eq!(session.near_misses, 1);
    }

    #[test]
    fn test_own_trail_is_not_a_near_miss() {
        let config = SimConfig::default();
        let mut player = create_player(0.0, 0.0);
        player.trail.push(Vec2::new(-20.0, 6.0), 0.9);
        player.trail.push(Vec2::new(20.0, 6.0), 0.95);
        player.alive = true;
        let agents = vec![player];
        let index = OccupancyIndex::new(&agents, 1.0, 0.0, &config);
        let mut session = create_running_session();

        assert!(update_near_miss(&mut session, &index, &agents[0], 0.01, &config.combo).is_none());
        assert_eq!(session.score, 0.0);
    }

    #[test]
    fn test_multiplier_decays_to_one() {
        let config = SimConfig::default();
        let agents = vec![create_player(0.0, 0.0)];
        let index = OccupancyIndex::new(&agents, 1.0, 0.0, &config);
        let mut session = create_running_session();
        session.combo_multiplier = 1.1;

        update_near_miss(&mut session, &index, &agents[0], 1.0, &config.combo);
        assert!((session.combo_multiplier - (1.1 - config.combo.decay_per_second)).abs() < 1e-5);
        update_near_miss(&mut session, &index, &agents[0], 10.0, &config.combo);
        assert_eq!(session.combo_multiplier, 1.0);
    }

    #[test]
    fn test_score_accrual_uses_multiplier() {
        let config = SimConfig::default();
        let mut session = create_running_session();
        session.combo_multiplier = 2.0;
        accrue_score(&mut session, 0.5, &config.combo);
        assert!((session.score - config.combo.score_per_second).abs() < 1e-4);
        assert_eq!(session.best_score, session.score);
    }

    #[test]
    fn test_overload_cooldown() {
        let config = SimConfig::default();
        let mut session = create_running_session();

        assert!(activate_overload(&mut session, &config.overload).is_some());
        assert_eq!(session.speed_multiplier, config.overload.player_factor);
        assert_eq!(session.bot_speed_multiplier, config.overload.bot_factor);
        assert!(activate_overload(&mut session, &config.overload).is_none());

        update_overload(&mut session, config.overload.duration + 0.01, &config.overload);
        assert_eq!(session.speed_multiplier, 1.0);
        assert!(activate_overload(&mut session, &config.overload).is_none());

        update_overload(&mut session, config.overload.cooldown, &config.overload);
        assert!(activate_overload(&mut session, &config.overload).is_some());
    }

    #[test]
    fn test_powerup_pickup() {
        let config = SimConfig::default();
        let mut game = GameState::new();
        game.add_agent(create_player(0.0, 0.0));
        game.powerups.push(Powerup {
            id: 1,
            kind: PowerupKind::Phase,
            position: Vec2::new(1.0, 0.0),
        });
        game.powerups.push(Powerup {
            id: 2,
            kind: PowerupKind::Overload,
            position: Vec2::new(-1.0, 0.5),
        });
        game.powerups.push(Powerup {
            id: 3,
            kind: PowerupKind::Phase,
            position: Vec2::new(30.0, 0.0),
        });
        let mut session = create_running_session();
        session.next_powerup_spawn = f32::INFINITY;
        session.overload_cooldown = 5.0;
        let mut rng = StdRng::seed_from_u64(1);

        let events = update_powerups(&mut game, &mut session, &mut rng, &config);
        assert_eq!(game.powerups.len(), 1);
        assert_eq!(game.player().map(|p| p.phase_charges), Some(1));
        assert!((session.score - 2.0 * config.powerups.score_bonus).abs() < 1e-4);
        assert_eq!(session.overload_timer, config.overload.pickup_duration);
        assert_eq!(session.overload_cooldown, 5.0 - config.overload.pickup_cooldown_refund);
        let collected = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::PowerupCollected { .. }))
            .count();
        assert_eq!(collected, 2);
    }

    #[test]
    fn test_powerups_spawn_on_schedule_up_to_cap() {
        let config = SimConfig::default();
        let mut game = GameState::new();
        game.add_agent(create_player(0.0, 60.0));
        let mut session = create_running_session();
        let mut rng = StdRng::seed_from_u64(9);

        for i in 0..10 {
            game.sim_time = i as f32 * config.powerups.spawn_interval;
            update_powerups(&mut game, &mut session, &mut rng, &config);
        }
        assert_eq!(game.powerups.len(), config.powerups.max_active);
        for powerup in &game.powerups {
            assert!(powerup.position.x.abs() < config.arena.half_extent - POWERUP_WALL_CLEARANCE + 1e-3);
            assert!(powerup.position.z.abs() < config.arena.half_extent - POWERUP_WALL_CLEARANCE + 1e-3);
        }
    }

    #[test]
    fn test_powerups_disabled() {
        let mut config = SimConfig::default();
        config.powerups.enabled = false;
        let mut game = GameState::new();
        game.add_agent(create_player(0.0, 0.0));
        let mut session = create_running_session();
        let mut rng = StdRng::seed_from_u64(2);
        game.sim_time = 100.0;
        update_powerups(&mut game, &mut session, &mut rng, &config);
        assert!(game.powerups.is_empty());
    }
}
