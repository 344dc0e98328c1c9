//! Bot population management
//!
//! Initial roster, scheduled joins, the alive-bot floor and respawns. A dead
//! bot comes back under its old id only after its whole trail has faded.

use rand::Rng;

use crate::config::SimConfig;
use crate::game::session::{SessionEvent, SessionState};
use crate::game::spatial::{OccupancyIndex, OwnerFilter};
use crate::game::state::{Agent, AgentId, BotBehaviorState, GameState, Heading};
use crate::util::vec2::Vec2;

/// Mixes an agent id into the session seed
const BOT_SEED_MIX: u64 = 0xA24B_AED4_963E_E119;

/// Spawn points keep this much room from any live trail
const SPAWN_HAZARD_CLEARANCE: f32 = 4.0;

/// Seed for a bot's behavior state, fixed by the session seed and the id
#[inline]
pub fn bot_seed(session_seed: u64, id: AgentId) -> u64 {
    session_seed ^ u64::from(id).wrapping_mul(BOT_SEED_MIX)
}

/// Axis heading that points most directly at the arena centre
pub fn heading_toward_center(p: Vec2) -> Heading {
    if p.x.abs() > p.z.abs() {
        if p.x > 0.0 {
            Heading::West
        } else {
            Heading::East
        }
    } else if p.z > 0.0 {
        Heading::North
    } else {
        Heading::South
    }
}

/// Random point clear of walls, live agents and trails.
///
/// Tries at most `attempts` candidates; `None` when all of them fail.
pub fn find_free_point(
    index: &OccupancyIndex<'_>,
    agents: &[Agent],
    rng: &mut impl Rng,
    wall_clearance: f32,
    agent_clearance: f32,
    attempts: u32,
) -> Option<Vec2> {
    let range = index.wall_limit() - wall_clearance;
    if range <= 0.0 {
        return None;
    }
    let clearance_sq = agent_clearance * agent_clearance;

    (0..attempts)
        .map(|_| Vec2::new(rng.gen_range(-range..range), rng.gen_range(-range..range)))
        .find(|&p| {
            !index.wall_hit(p, wall_clearance)
                && !index.segment_hit(p, OwnerFilter::All, None, SPAWN_HAZARD_CLEARANCE)
                && agents
                    .iter()
                    .filter(|a| a.alive)
                    .all(|a| a.position.distance_sq_to(p) >= clearance_sq)
        })
}

fn find_spawn_point(
    game: &GameState,
    survival_time: f32,
    rng: &mut impl Rng,
    config: &SimConfig,
) -> Option<Vec2> {
    let index = OccupancyIndex::new(&game.agents, game.sim_time, survival_time, config);
    find_free_point(
        &index,
        &game.agents,
        rng,
        config.population.spawn_wall_clearance,
        config.population.spawn_agent_clearance,
        config.population.spawn_max_attempts,
    )
}

/// Add a new bot at a free spot. Returns its id, or `None` if no spot was found.
pub fn spawn_bot(
    game: &mut GameState,
    survival_time: f32,
    rng: &mut impl Rng,
    config: &SimConfig,
) -> Option<AgentId> {
    let position = find_spawn_point(game, survival_time, rng, config)?;
    let id = game.alloc_agent_id();
    let behavior = BotBehaviorState::new(bot_seed(config.runtime.seed, id), &config.bots);
    let mut bot = Agent::new_bot(id, position, heading_toward_center(position), behavior);
    bot.trail.push(position, game.sim_time);
    game.add_agent(bot);
    tracing::debug!(id, x = position.x, z = position.z, "Bot spawned");
    Some(id)
}

/// Spawn the starting roster. Returns how many bots were placed.
pub fn spawn_initial(
    game: &mut GameState,
    rng: &mut impl Rng,
    config: &SimConfig,
) -> usize {
    let wanted = config.population.initial_bots.min(config.population.max_bots);
    let placed = (0..wanted)
        .filter_map(|_| spawn_bot(game, 0.0, rng, config))
        .count();
    if placed < wanted {
        tracing::warn!(wanted, placed, "Could not place every initial bot");
    }
    placed
}

fn bot_total(game: &GameState) -> usize {
    game.agents.iter().filter(|a| a.is_bot()).count()
}

/// Respawn or retire faded bots, run scheduled joins and enforce the floor
pub fn update_population(
    game: &mut GameState,
    session: &mut SessionState,
    rng: &mut impl Rng,
    config: &SimConfig,
) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    let rules = &config.population;
    let mut alive = game.alive_bot_count();

    let faded: Vec<AgentId> = game
        .agents
        .iter()
        .filter(|a| a.is_bot() && !a.alive && a.trail.is_empty())
        .map(|a| a.id)
        .collect();

    for id in faded {
        if rules.respawn_bots && alive < rules.max_bots {
            let Some(position) = find_spawn_point(game, session.survival_time, rng, config) else {
                continue;
            };
            let now = game.sim_time;
            if let Some(bot) = game.get_agent_mut(id) {
                bot.respawn(position, heading_toward_center(position));
                bot.trail.push(position, now);
                alive += 1;
                tracing::debug!(id, "Bot respawned");
                events.push(SessionEvent::BotRespawned { id });
            }
        } else if bot_total(game) > rules.max_bots || !rules.respawn_bots {
            game.agents.retain(|a| a.id != id);
            tracing::debug!(id, "Bot retired");
        }
    }

    if game.sim_time >= session.next_bot_join {
        session.next_bot_join += rules.join_interval;
        if bot_total(game) < rules.max_bots {
            if let Some(id) = spawn_bot(game, session.survival_time, rng, config) {
                alive += 1;
                events.push(SessionEvent::BotJoined { id });
            }
        }
    }

    // Floor: bounded by min_bots attempts per tick
    for _ in 0..rules.min_bots {
        if alive >= rules.min_bots {
            break;
        }
        match spawn_bot(game, session.survival_time, rng, config) {
            Some(id) => {
                alive += 1;
                events.push(SessionEvent::BotJoined { id });
            }
            None => break,
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn create_config(initial: usize, min: usize, max: usize) -> SimConfig {
        let mut config = SimConfig::default();
        config.population.initial_bots = initial;
        config.population.min_bots = min;
        config.population.max_bots = max;
        config.population.first_join = 1_000.0;
        config.population.join_interval = 1_000.0;
        config
    }

    fn create_game_with_player() -> GameState {
        let mut game = GameState::new();
        let id = game.alloc_agent_id();
        game.add_agent(Agent::new_player(
            id,
            "P".to_string(),
            Vec2::new(0.0, 40.0),
            Heading::North,
        ));
        game
    }

    fn create_session(config: &SimConfig) -> SessionState {
        let mut session = SessionState::default();
        session.next_bot_join = config.population.first_join;
        session.start();
        session
    }

    #[test]
    fn test_heading_toward_center() {
        assert_eq!(heading_toward_center(Vec2::new(50.0, 10.0)), Heading::West);
        assert_eq!(heading_toward_center(Vec2::new(-50.0, 10.0)), Heading::East);
        assert_eq!(heading_toward_center(Vec2::new(5.0, 30.0)), Heading::North);
        assert_eq!(heading_toward_center(Vec2::new(5.0, -30.0)), Heading::South);
    }

    #[test]
    fn test_bot_seed_depends_on_id() {
        assert_ne!(bot_seed(7, 1), bot_seed(7, 2));
        assert_eq!(bot_seed(7, 3), bot_seed(7, 3));
    }

    #[test]
    fn test_spawn_initial_respects_clearance() {
        let config = create_config(4, 0, 8);
        let mut game = create_game_with_player();
        let mut rng = StdRng::seed_from_u64(11);

        let placed = spawn_initial(&mut game, &mut rng, &config);
        assert_eq!(placed, 4);

        let limit = config.arena.half_extent - config.arena.wall_margin - config.population.spawn_wall_clearance;
        for bot in game.agents.iter().filter(|a| a.is_bot()) {
            assert!(bot.position.x.abs() < limit && bot.position.z.abs() < limit);
            assert_eq!(bot.trail.len(), 1);
            for other in game.agents.iter().filter(|a| a.id != bot.id) {
                assert!(
                    bot.position.distance_to(other.position) >= config.population.spawn_agent_clearance - 1e-3
                );
            }
        }
    }

    #[test]
    fn test_floor_is_enforced() {
        let config = create_config(0, 3, 8);
        let mut game = create_game_with_player();
        let mut session = create_session(&config);
        let mut rng = StdRng::seed_from_u64(5);

        let events = update_population(&mut game, &mut session, &mut rng, &config);
        assert_eq!(game.alive_bot_count(), 3);
        assert_eq!(
            events.iter().filter(|e| matches!(e, SessionEvent::BotJoined { .. })).count(),
            3
        );
    }

    #[test]
    fn test_scheduled_join_until_cap() {
        let mut config = create_config(0, 0, 2);
        config.population.first_join = 1.0;
        config.population.join_interval = 1.0;
        let mut game = create_game_with_player();
        let mut session = create_session(&config);
        let mut rng = StdRng::seed_from_u64(3);

        for step in 1..=5 {
            game.sim_time = step as f32;
            update_population(&mut game, &mut session, &mut rng, &config);
        }
        assert_eq!(game.alive_bot_count(), 2);
        assert_eq!(session.next_bot_join, 6.0);
    }

    #[test]
    fn test_dead_bot_respawns_only_after_trail_fades() {
        let config = create_config(1, 0, 4);
        let mut game = create_game_with_player();
        let mut session = create_session(&config);
        let mut rng = StdRng::seed_from_u64(8);
        spawn_initial(&mut game, &mut rng, &config);

        let bot_id = game.agents[1].id;
        game.agents[1].destroy(0.0);

        let events = update_population(&mut game, &mut session, &mut rng, &config);
        assert!(events.is_empty());
        assert!(!game.agents[1].alive);

        game.agents[1].trail.clear();
        let events = update_population(&mut game, &mut session, &mut rng, &config);
        assert_eq!(events, vec![SessionEvent::BotRespawned { id: bot_id }]);
        assert!(game.agents[1].alive);
        assert_eq!(game.agents[1].id, bot_id);
    }

    #[test]
    fn test_faded_bot_retired_without_respawn() {
        let mut config = create_config(2, 0, 4);
        config.population.respawn_bots = false;
        let mut game = create_game_with_player();
        let mut session = create_session(&config);
        let mut rng = StdRng::seed_from_u64(4);
        spawn_initial(&mut game, &mut rng, &config);

        game.agents[1].destroy(0.0);
        game.agents[1].trail.clear();
        update_population(&mut game, &mut session, &mut rng, &config);
        assert_eq!(game.agents.len(), 2);
        assert_eq!(game.alive_bot_count(), 1);
    }

    #[test]
    fn test_find_free_point_gives_up() {
        let config = SimConfig::default();
        let agents: Vec<Agent> = Vec::new();
        let index = OccupancyIndex::new(&agents, 0.0, 0.0, &config);
        let mut rng = StdRng::seed_from_u64(1);

        let none = find_free_point(&index, &agents, &mut rng, config.arena.half_extent * 2.0, 1.0, 10);
        assert!(none.is_none());
        let some = find_free_point(&index, &agents, &mut rng, 10.0, 1.0, 10);
        assert!(some.is_some());
    }
}
