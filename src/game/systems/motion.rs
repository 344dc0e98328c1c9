//! Motion and collision resolution
//!
//! Planning is read-only against the tick-start occupancy view, so every
//! agent sees the same world regardless of processing order. Plans are then
//! applied one by one: positions move, trails grow, charges are spent and
//! crashed agents are marked dead.

use rayon::prelude::*;
use smallvec::SmallVec;

use crate::config::{MotionConfig, TrailConfig};
use crate::game::spatial::{Blocker, OccupancyIndex};
use crate::game::state::{Agent, AgentId};
use crate::util::vec2::Vec2;

/// Outcome of one agent's travel for a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionOutcome {
    Moved,
    Destroyed(Blocker),
}

/// Planned travel for one agent
#[derive(Debug, Clone)]
pub struct MotionPlan {
    pub agent_id: AgentId,
    /// Straight stretches covered this tick. A phase jump starts a new leg.
    pub legs: SmallVec<[(Vec2, Vec2); 2]>,
    pub end: Vec2,
    pub charges_used: u32,
    pub outcome: MotionOutcome,
}

/// Forward speed in units/s before per-agent factors.
/// The ramp is capped at `max_speed` first, then `multiplier` applies.
pub fn world_speed(config: &MotionConfig, survival_time: f32, multiplier: f32) -> f32 {
    (config.base_speed + survival_time * config.speed_ramp).min(config.max_speed) * multiplier
}

/// Sweep `distance` along the agent's heading and decide what happens.
///
/// The path is sampled at steps no longer than `sweep_fraction * agent_radius`,
/// so a hazard cannot be skipped at any speed. The first blocked point wins.
/// A phase charge moves the agent `phase_nudge` past a trail hit; if the
/// landing point is blocked too, the same rule applies again. Walls cannot be
/// phased through: a wall hit destroys the agent without spending a charge,
/// and the crash point is held inside the wall limit.
pub fn plan_motion(
    agent: &Agent,
    distance: f32,
    index: &OccupancyIndex<'_>,
    config: &MotionConfig,
) -> MotionPlan {
    let dir = agent.heading.vector();
    let max_step = (config.sweep_fraction * config.agent_radius).max(f32::EPSILON);
    let mut legs: SmallVec<[(Vec2, Vec2); 2]> = SmallVec::new();
    let mut origin = agent.position;
    let mut remaining = distance.max(0.0);
    let mut charges = agent.phase_charges;
    let mut used = 0;
    let limit = index.wall_limit();
    let inside = |p: Vec2| Vec2::new(p.x.clamp(-limit, limit), p.z.clamp(-limit, limit));

    let finish = |legs, end, used, outcome: MotionOutcome| MotionPlan {
        agent_id: agent.id,
        legs,
        end,
        charges_used: used,
        outcome,
    };

    loop {
        let steps = ((remaining / max_step).ceil() as u32).max(1);
        let hit = (1..=steps).find_map(|i| {
            let travelled = remaining * i as f32 / steps as f32;
            let p = origin + dir * travelled;
            index
                .blocker_at(p, Some(agent.id))
                .map(|blocker| (travelled, p, blocker))
        });

        let Some((travelled, hit_point, blocker)) = hit else {
            let end = origin + dir * remaining;
            legs.push((origin, end));
            return finish(legs, end, used, MotionOutcome::Moved);
        };

        if charges == 0 || blocker == Blocker::Wall {
            let end = inside(hit_point);
            legs.push((origin, end));
            return finish(legs, end, used, MotionOutcome::Destroyed(blocker));
        }
        legs.push((origin, hit_point));
        charges -= 1;
        used += 1;
        remaining -= travelled;
        origin = hit_point + dir * config.phase_nudge;

        while let Some(blocker) = index.blocker_at(origin, Some(agent.id)) {
            if charges == 0 || blocker == Blocker::Wall {
                let end = inside(origin);
                return finish(legs, end, used, MotionOutcome::Destroyed(blocker));
            }
            charges -= 1;
            used += 1;
            origin += dir * config.phase_nudge;
        }
    }
}

/// Plan every alive agent. `distances` is indexed like `agents`.
/// Output keeps agent order whether or not the pass runs on the rayon pool.
pub fn plan_motions(
    agents: &[Agent],
    distances: &[f32],
    index: &OccupancyIndex<'_>,
    config: &MotionConfig,
    parallel: bool,
) -> Vec<MotionPlan> {
    if parallel {
        agents
            .par_iter()
            .zip(distances.par_iter())
            .filter(|(agent, _)| agent.alive)
            .map(|(agent, &distance)| plan_motion(agent, distance, index, config))
            .collect()
    } else {
        agents
            .iter()
            .zip(distances.iter())
            .filter(|(agent, _)| agent.alive)
            .map(|(agent, &distance)| plan_motion(agent, distance, index, config))
            .collect()
    }
}

/// Apply a plan covering sim time `now..now + dt`.
///
/// Emits a corner sample at the tick-start position when the heading changed
/// since the newest sample, then samples at fixed arclength along each leg
/// with timestamps interpolated across the tick.
pub fn apply_motion(agent: &mut Agent, plan: &MotionPlan, now: f32, dt: f32, config: &TrailConfig) {
    if agent.trail.is_empty() || agent.heading != agent.sampled_heading {
        agent.trail.push(agent.position, now);
        agent.sampled_heading = agent.heading;
        agent.since_sample = 0.0;
    }

    let spacing = config.sample_spacing;
    let total: f32 = plan.legs.iter().map(|(a, b)| a.distance_to(*b)).sum();
    let time_at = |arclength: f32| {
        if total > f32::EPSILON {
            now + dt * (arclength / total)
        } else {
            now + dt
        }
    };

    let mut covered = 0.0;
    for (k, &(a, b)) in plan.legs.iter().enumerate() {
        let len = a.distance_to(b);
        if k > 0 {
            // Landing point after a phase jump
            agent.trail.push(a, time_at(covered));
            agent.since_sample = 0.0;
        }
        let dir = (b - a).normalize();
        let mut next = spacing - agent.since_sample;
        while next <= len {
            agent.trail.push(a + dir * next, time_at(covered + next));
            next += spacing;
        }
        agent.since_sample = len - (next - spacing);
        covered += len;
    }

    agent.position = plan.end;
    agent.phase_charges = agent.phase_charges.saturating_sub(plan.charges_used);

    if let MotionOutcome::Destroyed(blocker) = plan.outcome {
        let crashed_at = now + dt;
        if agent
            .trail
            .back()
            .map_or(true, |s| !s.position().approx_eq(plan.end, 1e-4))
        {
            agent.trail.push(plan.end, crashed_at);
        }
        agent.destroy(crashed_at);
        tracing::debug!(
            agent = agent.id,
            ?blocker,
            x = plan.end.x,
            z = plan.end.z,
            "Agent destroyed"
        );
    }
}
