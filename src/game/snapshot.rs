//! Renderer boundary
//!
//! A read-only picture of the session after a tick: agent poses, live trail
//! polylines, power-ups and the HUD scalars. Encoded with bincode for
//! consumers in another process.

use serde::{Deserialize, Serialize};

use crate::config::TrailConfig;
use crate::game::session::{SessionPhase, SessionState};
use crate::game::state::{AgentId, GameState, Heading, Powerup, Role};
use crate::util::vec2::Vec2;

/// One agent as the renderer sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentView {
    pub id: AgentId,
    pub role: Role,
    pub x: f32,
    pub z: f32,
    pub heading: Heading,
    pub alive: bool,
    pub phase_charges: u32,
}

/// Live part of a trail, oldest point first. Alive agents end at their head.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailView {
    pub owner: AgentId,
    pub points: Vec<Vec2>,
}

/// HUD values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionScalars {
    pub phase: SessionPhase,
    pub score: f32,
    pub best_score: f32,
    pub survival_time: f32,
    pub speed_multiplier: f32,
    pub combo_multiplier: f32,
    pub overload_timer: f32,
    pub overload_cooldown: f32,
    pub phase_charges: u32,
}

/// Complete frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: u64,
    pub agents: Vec<AgentView>,
    pub trails: Vec<TrailView>,
    pub powerups: Vec<Powerup>,
    pub scalars: SessionScalars,
}

impl Snapshot {
    /// Capture the current state. Expired samples are left out.
    pub fn capture(game: &GameState, session: &SessionState, trail: &TrailConfig) -> Self {
        let cutoff = game.sim_time - trail.fade_age(session.survival_time);

        let agents = game
            .agents
            .iter()
            .map(|a| AgentView {
                id: a.id,
                role: a.role(),
                x: a.position.x,
                z: a.position.z,
                heading: a.heading,
                alive: a.alive,
                phase_charges: a.phase_charges,
            })
            .collect();

        let trails = game
            .agents
            .iter()
            .filter_map(|a| {
                let mut points: Vec<Vec2> = a
                    .trail
                    .iter()
                    .filter(|s| s.created_at >= cutoff)
                    .map(|s| s.position())
                    .collect();
                if points.is_empty() {
                    return None;
                }
                if a.alive {
                    points.push(a.position);
                }
                Some(TrailView { owner: a.id, points })
            })
            .collect();

        let phase_charges = game.player().map_or(0, |p| p.phase_charges);

        Self {
            tick: game.tick,
            agents,
            trails,
            powerups: game.powerups.clone(),
            scalars: SessionScalars {
                phase: session.phase,
                score: session.score,
                best_score: session.best_score,
                survival_time: session.survival_time,
                speed_multiplier: session.speed_multiplier,
                combo_multiplier: session.combo_multiplier,
                overload_timer: session.overload_timer,
                overload_cooldown: session.overload_cooldown,
                phase_charges,
            },
        }
    }
}

/// Encode a snapshot with bincode
pub fn encode_snapshot(snapshot: &Snapshot) -> Result<Vec<u8>, EncodeError> {
    bincode::serde::encode_to_vec(snapshot, bincode::config::standard())
        .map_err(|e| EncodeError(e.to_string()))
}

/// Decode a snapshot produced by [`encode_snapshot`]
pub fn decode_snapshot(data: &[u8]) -> Result<Snapshot, DecodeError> {
    bincode::serde::decode_from_slice(data, bincode::config::standard())
        .map(|(snapshot, _)| snapshot)
        .map_err(|e| DecodeError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

#[derive(Debug, thiserror::Error)]
#[error("Decode error: {0}")]
pub struct DecodeError(String);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::game::state::{Agent, PowerupKind};

    fn create_game() -> GameState {
        let mut game = GameState::new();
        let mut player = Agent::new_player(1, "P".to_string(), Vec2::new(0.0, 5.0), Heading::North);
        player.trail.push(Vec2::new(0.0, 20.0), 0.0);
        player.trail.push(Vec2::new(0.0, 10.0), 9.5);
        player.phase_charges = 2;
        game.add_agent(player);

        let mut dead = Agent::new_player(2, "B".to_string(), Vec2::new(30.0, 0.0), Heading::East);
        dead.trail.push(Vec2::new(20.0, 0.0), 9.0);
        dead.alive = false;
        game.add_agent(dead);

        game.powerups.push(Powerup {
            id: 1,
            kind: PowerupKind::Overload,
            position: Vec2::new(-4.0, -4.0),
        });
        game.sim_time = 10.0;
        game.tick = 600;
        game
    }

    #[test]
    fn test_capture_drops_expired_samples() {
        let config = SimConfig::default();
        let game = create_game();
        let session = SessionState::default();

        let snapshot = Snapshot::capture(&game, &session, &config.trail);
        assert_eq!(snapshot.agents.len(), 2);
        assert_eq!(snapshot.trails.len(), 2);

        // Sample at t=0 is past the fade age; the head closes the polyline
        assert_eq!(snapshot.trails[0].points, vec![Vec2::new(0.0, 10.0), Vec2::new(0.0, 5.0)]);
        // Dead agents have no head point
        assert_eq!(snapshot.trails[1].points, vec![Vec2::new(20.0, 0.0)]);
        assert_eq!(snapshot.scalars.phase_charges, 2);
        assert_eq!(snapshot.powerups.len(), 1);
    }

    #[test]
    fn test_snapshot_codec() {
        let config = SimConfig::default();
        let game = create_game();
        let session = SessionState::default();
        let snapshot = Snapshot::capture(&game, &session, &config.trail);

        let bytes = encode_snapshot(&snapshot).unwrap();
        let decoded = decode_snapshot(&bytes).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode_snapshot(&[0xff, 0xff, 0xff]).is_err());
    }
}
