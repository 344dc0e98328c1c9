//! Bounded grid searches used by bot cognition
//!
//! Both searches walk the coarse cell grid with 4-connectivity, test cells
//! through the caller's [`ProbeCache`] and stop at an explicit node budget.

use std::collections::VecDeque;

use bitvec::prelude::*;
use smallvec::SmallVec;

use crate::config::BotConfig;
use crate::game::spatial::{CellKey, OccupancyIndex, ProbeCache, CELL_NEIGHBOURS};
use crate::game::state::AgentId;
use crate::util::vec2::Vec2;

/// Dense visited set over the arena's cell grid
struct VisitedCells {
    bits: BitVec,
    min: i32,
    width: i32,
}

impl VisitedCells {
    fn new(index: &OccupancyIndex<'_>, half_extent: f32) -> Self {
        let reach = (half_extent / index.cell_size()).ceil() as i32 + 1;
        let width = reach * 2 + 1;
        Self {
            bits: bitvec![0; (width * width) as usize],
            min: -reach,
            width,
        }
    }

    fn slot(&self, cell: CellKey) -> Option<usize> {
        let x = cell.0 - self.min;
        let z = cell.1 - self.min;
        if x < 0 || z < 0 || x >= self.width || z >= self.width {
            return None;
        }
        Some((z * self.width + x) as usize)
    }

    /// Mark a cell; false if it was already marked or lies off the grid
    fn insert(&mut self, cell: CellKey) -> bool {
        match self.slot(cell) {
            Some(slot) if !self.bits[slot] => {
                self.bits.set(slot, true);
                true
            }
            _ => false,
        }
    }
}

#[inline]
fn neighbours(cell: CellKey) -> impl Iterator<Item = CellKey> {
    CELL_NEIGHBOURS
        .iter()
        .map(move |&(dx, dz)| (cell.0 + dx, cell.1 + dz))
}

/// Count open cells reachable from `start`, up to `budget`
pub fn flood_fill(
    index: &OccupancyIndex<'_>,
    cache: &mut ProbeCache,
    start: Vec2,
    owner: AgentId,
    budget: usize,
    half_extent: f32,
) -> usize {
    let origin = index.cell_of(start);
    if budget == 0 || cache.is_cell_blocked(index, origin, Some(owner)) {
        return 0;
    }

    let mut visited = VisitedCells::new(index, half_extent);
    let mut queue = VecDeque::with_capacity(budget);
    visited.insert(origin);
    queue.push_back(origin);
    let mut count = 0;

    while let Some(cell) = queue.pop_front() {
        count += 1;
        if count >= budget {
            break;
        }
        for next in neighbours(cell) {
            if visited.insert(next) && !cache.is_cell_blocked(index, next, Some(owner)) {
                queue.push_back(next);
            }
        }
    }
    count
}

/// Escape search result
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitSearch {
    /// Found a cell with enough open neighbours at this depth
    Found { depth: u32 },
    /// Search space ran out before the budget: a pocket
    DeadEnd { explored: usize },
    /// Budget spent without a verdict
    Exhausted,
}

impl ExitSearch {
    /// Heuristic value of the search outcome
    pub fn score(self, config: &BotConfig) -> f32 {
        match self {
            ExitSearch::Found { depth } => config.exit_found_bonus - depth as f32,
            ExitSearch::DeadEnd { explored } => {
                let budget = config.exit_node_budget.max(1) as f32;
                -config.exit_dead_end_penalty * (1.0 - (explored as f32 / budget).min(1.0))
            }
            ExitSearch::Exhausted => 0.0,
        }
    }
}

/// Breadth-first search from `start` for a cell at depth >= `exit_min_depth`
/// with at least `exit_min_open` open neighbours
pub fn find_exit(
    index: &OccupancyIndex<'_>,
    cache: &mut ProbeCache,
    start: Vec2,
    owner: AgentId,
    config: &BotConfig,
    half_extent: f32,
) -> ExitSearch {
    let origin = index.cell_of(start);
    if cache.is_cell_blocked(index, origin, Some(owner)) {
        return ExitSearch::DeadEnd { explored: 0 };
    }

    let mut visited = VisitedCells::new(index, half_extent);
    let mut queue = VecDeque::with_capacity(config.exit_node_budget);
    visited.insert(origin);
    queue.push_back((origin, 0u32));
    let mut explored = 0;

    while let Some((cell, depth)) = queue.pop_front() {
        if explored >= config.exit_node_budget {
            return ExitSearch::Exhausted;
        }
        explored += 1;

        let open: SmallVec<[CellKey; 4]> = neighbours(cell)
            .filter(|&next| !cache.is_cell_blocked(index, next, Some(owner)))
            .collect();
        if depth >= config.exit_min_depth && open.len() >= config.exit_min_open {
            return ExitSearch::Found { depth };
        }
        for next in open {
            if visited.insert(next) {
                queue.push_back((next, depth + 1));
            }
        }
    }
    ExitSearch::DeadEnd { explored }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::game::state::{Agent, Heading};

    fn create_polyline(id: AgentId, points: &[(f32, f32)]) -> Agent {
        let mut agent = Agent::new_player(id, format!("W{}", id), Vec2::ZERO, Heading::North);
        for (i, &(x, z)) in points.iter().enumerate() {
            agent.trail.push(Vec2::new(x, z), i as f32 * 0.01);
        }
        agent.alive = false;
        agent
    }

    /// Closed square pocket of side `2 * r` around the origin
    fn create_pocket(r: f32) -> Vec<Agent> {
        vec![create_polyline(
            9,
            &[(-r, -r), (r, -r), (r, r), (-r, r), (-r, -r)],
        )]
    }

    #[test]
    fn test_flood_fill_open_arena_hits_budget() {
        let config = SimConfig::default();
        let agents: Vec<Agent> = Vec::new();
        let index = OccupancyIndex::new(&agents, 1.0, 0.0, &config);
        let mut cache = ProbeCache::new();

        let count = flood_fill(&index, &mut cache, Vec2::ZERO, 1, 50, config.arena.half_extent);
        assert_eq!(count, 50);
    }

    #[test]
    fn test_flood_fill_pocket_is_small() {
        let config = SimConfig::default();
        let agents = create_pocket(7.5);
        let index = OccupancyIndex::new(&agents, 1.0, 0.0, &config);
        let mut cache = ProbeCache::new();

        let inside = flood_fill(&index, &mut cache, Vec2::new(0.5, 0.5), 1, 500, config.arena.half_extent);
        assert!(inside > 0);
        assert!(inside < 25);

        let outside = flood_fill(&index, &mut cache, Vec2::new(30.0, 30.0), 1, 500, config.arena.half_extent);
        assert_eq!(outside, 500);
    }

    #[test]
    fn test_flood_fill_blocked_start() {
        let config = SimConfig::default();
        let agents: Vec<Agent> = Vec::new();
        let index = OccupancyIndex::new(&agents, 1.0, 0.0, &config);
        let mut cache = ProbeCache::new();
        let count = flood_fill(&index, &mut cache, Vec2::new(500.0, 0.0), 1, 50, config.arena.half_extent);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_exit_found_in_open_space() {
        let config = SimConfig::default();
        let agents: Vec<Agent> = Vec::new();
        let index = OccupancyIndex::new(&agents, 1.0, 0.0, &config);
        let mut cache = ProbeCache::new();

        let result = find_exit(&index, &mut cache, Vec2::ZERO, 1, &config.bots, config.arena.half_extent);
        assert_eq!(result, ExitSearch::Found { depth: config.bots.exit_min_depth });
        assert!(result.score(&config.bots) > 0.0);
    }

    #[test]
    fn test_exit_dead_end_in_pocket() {
        let config = SimConfig::default();
        let agents = create_pocket(4.5);
        let index = OccupancyIndex::new(&agents, 1.0, 0.0, &config);
        let mut cache = ProbeCache::new();

        let result = find_exit(&index, &mut cache, Vec2::new(0.5, 0.5), 1, &config.bots, config.arena.half_extent);
        assert!(matches!(result, ExitSearch::DeadEnd { .. }));
        let score = result.score(&config.bots);
        assert!(score < 0.0);
        assert!(score >= -config.bots.exit_dead_end_penalty);
    }

    #[test]
    fn test_exit_budget_exhausted_is_neutral() {
        let mut config = SimConfig::default();
        config.bots.exit_min_depth = 1_000;
        let agents: Vec<Agent> = Vec::new();
        let index = OccupancyIndex::new(&agents, 1.0, 0.0, &config);
        let mut cache = ProbeCache::new();

        let result = find_exit(&index, &mut cache, Vec2::ZERO, 1, &config.bots, config.arena.half_extent);
        assert_eq!(result, ExitSearch::Exhausted);
        assert_eq!(result.score(&config.bots), 0.0);
    }

    #[test]
    fn test_dead_end_penalty_scales_with_exploration() {
        let config = SimConfig::default();
        let tight = ExitSearch::DeadEnd { explored: 1 }.score(&config.bots);
        let roomy = ExitSearch::DeadEnd { explored: 150 }.score(&config.bots);
        assert!(tight < roomy);
    }
}
