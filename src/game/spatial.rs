//! Occupancy index over agent trails
//!
//! A read-only view of every agent's trail for one tick. Trails are tested
//! segment by segment with exact point-to-segment distance; each trail keeps
//! a bounding box that serves as the broad phase. Bots amortize repeated
//! probes of the same coarse cell with a per-pass [`ProbeCache`].

use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::config::{SimConfig, TrailConfig};
use crate::game::state::{Agent, AgentId, TrailSample};
use crate::util::vec2::Vec2;

/// Coarse grid cell key - (x, z) cell coordinates
pub type CellKey = (i32, i32);

/// Neighbour offsets for 4-connected grid walks
pub const CELL_NEIGHBOURS: [(i32, i32); 4] = [(0, -1), (1, 0), (0, 1), (-1, 0)];

/// Coarse cell containing `p`
#[inline]
pub fn cell_key(p: Vec2, cell_size: f32) -> CellKey {
    (
        (p.x / cell_size).floor() as i32,
        (p.z / cell_size).floor() as i32,
    )
}

/// Which trails a query considers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerFilter {
    All,
    Only(AgentId),
    Except(AgentId),
}

impl OwnerFilter {
    #[inline]
    pub fn admits(self, owner: AgentId) -> bool {
        match self {
            OwnerFilter::All => true,
            OwnerFilter::Only(id) => owner == id,
            OwnerFilter::Except(id) => owner != id,
        }
    }
}

/// What stopped a probe point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Blocker {
    Wall,
    /// Trail of the given owner
    Trail(AgentId),
}

/// One agent's trail as seen by the index
#[derive(Debug)]
struct IndexedTrail<'a> {
    owner: AgentId,
    samples: &'a VecDeque<TrailSample>,
    /// Index of the oldest non-expired sample
    first_live: usize,
    /// Head of an alive agent; closes the trail with the live tail
    head: Option<Vec2>,
    min: Vec2,
    max: Vec2,
}

impl IndexedTrail<'_> {
    /// Broad phase: can anything in this trail be within `radius` of `p`?
    #[inline]
    fn may_contain(&self, p: Vec2, radius: f32) -> bool {
        p.x >= self.min.x - radius
            && p.x <= self.max.x + radius
            && p.z >= self.min.z - radius
            && p.z <= self.max.z + radius
    }
}

/// Tick-stable, borrowed view of all trails
#[derive(Debug)]
pub struct OccupancyIndex<'a> {
    trails: Vec<IndexedTrail<'a>>,
    now: f32,
    fade_age: f32,
    cutoff: f32,
    grace_window: f32,
    /// Wall threshold: |x| or |z| at or past this is blocked
    wall_limit: f32,
    collision_radius: f32,
    cell_size: f32,
}

impl<'a> OccupancyIndex<'a> {
    /// Build the view for sim time `now`. Samples created before
    /// `now - fade_age(survival_time)` are invisible to every query.
    pub fn new(agents: &'a [Agent], now: f32, survival_time: f32, config: &SimConfig) -> Self {
        let fade_age = config.trail.fade_age(survival_time);
        let cutoff = now - fade_age;

        let trails = agents
            .iter()
            .filter_map(|agent| {
                let samples = agent.trail.samples();
                let first_live = samples.partition_point(|s| s.created_at < cutoff);
                if first_live >= samples.len() {
                    return None;
                }
                let (mut min, mut max) = agent.trail.bounds()?;
                let head = agent.alive.then_some(agent.position);
                if let Some(head) = head {
                    min = min.min(head);
                    max = max.max(head);
                }
                Some(IndexedTrail {
                    owner: agent.id,
                    samples,
                    first_live,
                    head,
                    min,
                    max,
                })
            })
            .collect();

        Self {
            trails,
            now,
            fade_age,
            cutoff,
            grace_window: config.trail.grace_window,
            wall_limit: config.arena.half_extent - config.arena.wall_margin,
            collision_radius: config.collision_radius(),
            cell_size: config.arena.cell_size,
        }
    }

    #[inline]
    pub fn now(&self) -> f32 {
        self.now
    }

    #[inline]
    pub fn fade_age(&self) -> f32 {
        self.fade_age
    }

    #[inline]
    pub fn collision_radius(&self) -> f32 {
        self.collision_radius
    }

    /// Coordinate magnitude at which the walls begin
    #[inline]
    pub fn wall_limit(&self) -> f32 {
        self.wall_limit
    }

    /// True if `p` is on or past the wall margin, with the margin grown by `inflate`
    #[inline]
    pub fn wall_hit(&self, p: Vec2, inflate: f32) -> bool {
        let limit = self.wall_limit - inflate;
        p.x.abs() >= limit || p.z.abs() >= limit
    }

    /// Blocked by a wall or by any live segment. Grace applies to `excluding`'s
    /// own fresh samples.
    pub fn is_point_blocked(&self, p: Vec2, excluding: Option<AgentId>) -> bool {
        self.wall_hit(p, 0.0) || self.segment_hit(p, OwnerFilter::All, excluding, 0.0)
    }

    /// First obstruction at `p`, walls before trails (trails in agent order)
    pub fn blocker_at(&self, p: Vec2, excluding: Option<AgentId>) -> Option<Blocker> {
        if self.wall_hit(p, 0.0) {
            return Some(Blocker::Wall);
        }
        let radius_sq = self.collision_radius * self.collision_radius;
        self.trails
            .iter()
            .filter(|trail| trail.may_contain(p, self.collision_radius))
            .find(|trail| {
                self.segments(trail, excluding)
                    .any(|(a, b)| p.distance_sq_to_segment(a, b) < radius_sq)
            })
            .map(|trail| Blocker::Trail(trail.owner))
    }

    /// Is `p` within collision radius (+ `inflate`) of any live segment of a
    /// trail passing `filter`? Segments of `grace_for` whose newer end is
    /// inside the grace window are skipped.
    pub fn segment_hit(
        &self,
        p: Vec2,
        filter: OwnerFilter,
        grace_for: Option<AgentId>,
        inflate: f32,
    ) -> bool {
        let radius = self.collision_radius + inflate;
        let radius_sq = radius * radius;
        self.trails
            .iter()
            .filter(|trail| filter.admits(trail.owner) && trail.may_contain(p, radius))
            .any(|trail| {
                self.segments(trail, grace_for)
                    .any(|(a, b)| p.distance_sq_to_segment(a, b) < radius_sq)
            })
    }

    /// Distance from `p` to the closest live segment passing `filter`, if any
    pub fn nearest_segment_distance(&self, p: Vec2, filter: OwnerFilter) -> Option<f32> {
        self.trails
            .iter()
            .filter(|trail| filter.admits(trail.owner))
            .flat_map(|trail| self.segments(trail, None))
            .map(|(a, b)| p.distance_sq_to_segment(a, b))
            .fold(None, |best: Option<f32>, d| Some(best.map_or(d, |b| b.min(d))))
            .map(f32::sqrt)
    }

    /// Grace cut-off for `owner`'s segments: newer ends past it are skipped
    #[inline]
    fn grace_cut(&self, owner: AgentId, grace_for: Option<AgentId>) -> f32 {
        match grace_for {
            Some(id) if id == owner => self.now - self.grace_window,
            _ => f32::INFINITY,
        }
    }

    fn segments<'s>(
        &self,
        trail: &'s IndexedTrail<'_>,
        grace_for: Option<AgentId>,
    ) -> impl Iterator<Item = (Vec2, Vec2)> + 's {
        trail_segments(
            trail.samples,
            trail.first_live,
            trail.head,
            self.now,
            self.grace_cut(trail.owner, grace_for),
        )
    }

    /// Number of trails with at least one live sample
    pub fn trail_count(&self) -> usize {
        self.trails.len()
    }

    /// Number of live samples across all trails
    pub fn live_sample_count(&self) -> usize {
        self.trails
            .iter()
            .map(|t| t.samples.len() - t.first_live)
            .sum()
    }

    /// Oldest creation time still treated as a hazard
    #[inline]
    pub fn cutoff(&self) -> f32 {
        self.cutoff
    }

    // ------------------------------------------------------------------
    // Coarse grid helpers
    // ------------------------------------------------------------------

    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    #[inline]
    pub fn cell_of(&self, p: Vec2) -> CellKey {
        cell_key(p, self.cell_size)
    }

    #[inline]
    pub fn cell_center(&self, cell: CellKey) -> Vec2 {
        Vec2::new(
            (cell.0 as f32 + 0.5) * self.cell_size,
            (cell.1 as f32 + 0.5) * self.cell_size,
        )
    }

    /// Whether the cell's centre lies inside the walls
    #[inline]
    pub fn cell_in_arena(&self, cell: CellKey) -> bool {
        !self.wall_hit(self.cell_center(cell), 0.0)
    }
}

/// Live segments of one trail, oldest first.
///
/// A segment is live while its older endpoint is. Alive agents add the live
/// tail from the newest sample to the head; a dead agent with a single live
/// sample leaves a point hazard. Segments whose newer end is past
/// `grace_cut` are skipped.
fn trail_segments(
    samples: &VecDeque<TrailSample>,
    first_live: usize,
    head: Option<Vec2>,
    now: f32,
    grace_cut: f32,
) -> impl Iterator<Item = (Vec2, Vec2)> + '_ {
    let last = samples.len() - 1;

    let pairs = (first_live..last)
        .filter(move |&i| samples[i + 1].created_at <= grace_cut)
        .map(move |i| (samples[i].position(), samples[i + 1].position()));

    let tail = head
        .filter(|_| now <= grace_cut)
        .map(|head| (samples[last].position(), head));

    let point = (head.is_none() && first_live == last && samples[last].created_at <= grace_cut)
        .then(|| (samples[last].position(), samples[last].position()));

    pairs.chain(tail).chain(point)
}

/// Drop expired samples from the front of every trail. Returns the number
/// of samples removed.
pub fn prune_expired(
    agents: &mut [Agent],
    now: f32,
    survival_time: f32,
    config: &TrailConfig,
) -> usize {
    let cutoff = now - config.fade_age(survival_time);
    agents
        .iter_mut()
        .map(|agent| agent.trail.prune_older_than(cutoff))
        .sum()
}

/// Memo of blocked/free per coarse cell for one decision pass
#[derive(Debug, Default)]
pub struct ProbeCache {
    cells: FxHashMap<CellKey, bool>,
    hits: u64,
    misses: u64,
}

impl ProbeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocked state of the cell centre, computed once per pass
    pub fn is_cell_blocked(
        &mut self,
        index: &OccupancyIndex<'_>,
        cell: CellKey,
        excluding: Option<AgentId>,
    ) -> bool {
        if let Some(&blocked) = self.cells.get(&cell) {
            self.hits += 1;
            return blocked;
        }
        self.misses += 1;
        let blocked = !index.cell_in_arena(cell)
            || index.is_point_blocked(index.cell_center(cell), excluding);
        self.cells.insert(cell, blocked);
        blocked
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.hits = 0;
        self.misses = 0;
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::Heading;

    fn create_config() -> SimConfig {
        SimConfig::default()
    }

    /// Dead agent whose trail is the given points, stamped at `t0`, `t0 + step`, ...
    fn create_trail_agent(id: AgentId, points: &[(f32, f32)], t0: f32, step: f32) -> Agent {
        let mut agent = Agent::new_player(id, format!("A{}", id), Vec2::ZERO, Heading::East);
        for (i, &(x, z)) in points.iter().enumerate() {
            agent.trail.push(Vec2::new(x, z), t0 + i as f32 * step);
        }
        agent.alive = false;
        agent
    }

    #[test]
    fn test_wall_containment() {
        let config = create_config();
        let agents: Vec<Agent> = Vec::new();
        let index = OccupancyIndex::new(&agents, 0.0, 0.0, &config);
        let limit = config.arena.half_extent - config.arena.wall_margin;

        for &v in &[limit, limit + 0.5, config.arena.half_extent, 500.0] {
            assert!(index.is_point_blocked(Vec2::new(v, 0.0), None));
            assert!(index.is_point_blocked(Vec2::new(-v, 0.0), None));
            assert!(index.is_point_blocked(Vec2::new(0.0, v), Some(1)));
            assert!(index.is_point_blocked(Vec2::new(3.0, -v), Some(1)));
        }
        assert!(!index.is_point_blocked(Vec2::new(limit - 0.01, 0.0), None));
        assert!(!index.is_point_blocked(Vec2::ZERO, None));
    }

    #[test]
    fn test_segment_hit_interior_and_filter() {
        let config = create_config();
        let agents = vec![create_trail_agent(2, &[(-5.0, 0.0), (5.0, 0.0)], 0.0, 0.1)];
        let index = OccupancyIndex::new(&agents, 1.0, 0.0, &config);

        let on_line = Vec2::new(0.0, 1.0);
        assert!(index.segment_hit(on_line, OwnerFilter::All, None, 0.0));
        assert!(index.segment_hit(on_line, OwnerFilter::Only(2), None, 0.0));
        assert!(!index.segment_hit(on_line, OwnerFilter::Except(2), None, 0.0));

        let clear = Vec2::new(0.0, 3.0);
        assert!(!index.segment_hit(clear, OwnerFilter::All, None, 0.0));
        assert!(index.segment_hit(clear, OwnerFilter::All, None, 2.0));
    }

    #[test]
    fn test_self_grace() {
        let config = create_config();
        let mut agent = Agent::new_player(1, "P".into(), Vec2::new(2.0, 0.0), Heading::East);
        agent.trail.push(Vec2::new(0.0, 0.0), 0.95);
        agent.trail.push(Vec2::new(1.0, 0.0), 0.98);
        agent.trail.push(Vec2::new(2.0, 0.0), 1.0);
        let agents = vec![agent];
        let index = OccupancyIndex::new(&agents, 1.0, 0.0, &config);

        // Coincident with its own fresh samples and live tail
        assert!(!index.is_point_blocked(Vec2::new(2.0, 0.0), Some(1)));
        assert!(!index.is_point_blocked(Vec2::new(0.5, 0.0), Some(1)));
        // Everyone else sees the hazard
        assert!(index.is_point_blocked(Vec2::new(2.0, 0.0), Some(7)));
        assert!(index.is_point_blocked(Vec2::new(0.5, 0.0), None));
    }

    #[test]
    fn test_grace_expires() {
        let config = create_config();
        let agents = vec![create_trail_agent(1, &[(0.0, 0.0), (4.0, 0.0)], 0.0, 0.1)];
        let index = OccupancyIndex::new(&agents, 2.0, 0.0, &config);
        assert!(index.is_point_blocked(Vec2::new(2.0, 0.0), Some(1)));
    }

    #[test]
    fn test_blocker_identifies_owner() {
        let config = create_config();
        let agents = vec![
            create_trail_agent(4, &[(-5.0, 0.0), (5.0, 0.0)], 0.0, 0.1),
            create_trail_agent(5, &[(-5.0, 10.0), (5.0, 10.0)], 0.0, 0.1),
        ];
        let index = OccupancyIndex::new(&agents, 1.0, 0.0, &config);

        assert_eq!(index.blocker_at(Vec2::new(0.0, 10.5), None), Some(Blocker::Trail(5)));
        assert_eq!(index.blocker_at(Vec2::new(0.0, 0.5), None), Some(Blocker::Trail(4)));
        assert_eq!(index.blocker_at(Vec2::new(0.0, 95.0), None), Some(Blocker::Wall));
        assert_eq!(index.blocker_at(Vec2::new(0.0, 5.0), None), None);
    }

    #[test]
    fn test_live_tail_blocks_others() {
        let config = create_config();
        let mut agent = Agent::new_player(1, "P".into(), Vec2::new(0.0, 10.0), Heading::South);
        agent.trail.push(Vec2::new(0.0, 0.0), 0.5);
        let agents = vec![agent];
        let index = OccupancyIndex::new(&agents, 1.0, 0.0, &config);

        assert!(index.is_point_blocked(Vec2::new(0.5, 5.0), Some(9)));
        assert!(!index.is_point_blocked(Vec2::new(0.5, 5.0), Some(1)));
    }

    #[test]
    fn test_degenerate_point_hazard() {
        let config = create_config();
        let agents = vec![create_trail_agent(3, &[(10.0, 10.0)], 0.0, 0.1)];
        let index = OccupancyIndex::new(&agents, 1.0, 0.0, &config);

        assert!(index.is_point_blocked(Vec2::new(10.5, 10.0), None));
        assert!(!index.is_point_blocked(Vec2::new(13.0, 10.0), None));
        let d = index
            .nearest_segment_distance(Vec2::new(13.0, 14.0), OwnerFilter::All)
            .unwrap();
        assert!((d - 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_expired_segments_are_ignored() {
        let config = create_config();
        let fade = config.trail.fade_age(0.0);
        let agents = vec![create_trail_agent(1, &[(0.0, 0.0), (5.0, 0.0)], 0.0, 0.1)];

        let fresh = OccupancyIndex::new(&agents, fade - 0.5, 0.0, &config);
        assert!(fresh.is_point_blocked(Vec2::new(2.5, 0.0), None));

        let stale = OccupancyIndex::new(&agents, fade + 0.5, 0.0, &config);
        assert!(!stale.is_point_blocked(Vec2::new(2.5, 0.0), None));
        assert_eq!(stale.trail_count(), 0);
    }

    #[test]
    fn test_monotonic_fade() {
        let config = create_config();
        let points: Vec<(f32, f32)> = (0..20).map(|i| (i as f32, 0.0)).collect();
        let mut agents = vec![create_trail_agent(1, &points, 0.0, 0.25)];
        let fade = config.trail.fade_age(0.0);

        let mut previous = agents[0].trail.len();
        let mut now = 0.0;
        while now < 20.0 {
            now += 0.1;
            prune_expired(&mut agents, now, 0.0, &config.trail);
            let live = agents[0].trail.live_count(now - fade);
            assert!(live <= previous);
            previous = live;
        }
        assert_eq!(previous, 0);
        assert!(agents[0].trail.is_empty());
    }

    #[test]
    fn test_prune_strictly_decreases_past_fade() {
        let config = create_config();
        let mut agents = vec![create_trail_agent(1, &[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)], 1.0, 1.0)];
        let fade = config.trail.fade_age(0.0);

        assert_eq!(prune_expired(&mut agents, 1.0 + fade, 0.0, &config.trail), 0);
        assert_eq!(prune_expired(&mut agents, 1.0 + fade + 0.01, 0.0, &config.trail), 1);
        assert_eq!(agents[0].trail.len(), 2);
    }

    #[test]
    fn test_nearest_segment_distance() {
        let config = create_config();
        let agents = vec![
            create_trail_agent(1, &[(-5.0, 0.0), (5.0, 0.0)], 0.0, 0.1),
            create_trail_agent(2, &[(-5.0, 20.0), (5.0, 20.0)], 0.0, 0.1),
        ];
        let index = OccupancyIndex::new(&agents, 1.0, 0.0, &config);
        let p = Vec2::new(0.0, 6.0);

        let all = index.nearest_segment_distance(p, OwnerFilter::All).unwrap();
        assert!((all - 6.0).abs() < 1e-4);
        let others = index.nearest_segment_distance(p, OwnerFilter::Except(1)).unwrap();
        assert!((others - 14.0).abs() < 1e-4);
        assert!(index.nearest_segment_distance(p, OwnerFilter::Only(5)).is_none());
    }

    #[test]
    fn test_probe_cache_memoizes() {
        let config = create_config();
        let agents = vec![create_trail_agent(1, &[(-30.0, 1.5), (30.0, 1.5)], 0.0, 0.1)];
        let index = OccupancyIndex::new(&agents, 1.0, 0.0, &config);
        let mut cache = ProbeCache::new();

        let blocked_cell = index.cell_of(Vec2::new(1.0, 1.0));
        assert!(cache.is_cell_blocked(&index, blocked_cell, None));
        assert!(cache.is_cell_blocked(&index, blocked_cell, None));
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.hits(), 1);

        let free_cell = index.cell_of(Vec2::new(1.0, 20.0));
        assert!(!cache.is_cell_blocked(&index, free_cell, None));

        let outside = index.cell_of(Vec2::new(200.0, 0.0));
        assert!(cache.is_cell_blocked(&index, outside, None));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_cell_round_trip() {
        let config = create_config();
        let agents: Vec<Agent> = Vec::new();
        let index = OccupancyIndex::new(&agents, 0.0, 0.0, &config);
        for &(x, z) in &[(0.1, 0.1), (-4.0, 7.5), (44.0, -44.0)] {
            let cell = index.cell_of(Vec2::new(x, z));
            assert_eq!(index.cell_of(index.cell_center(cell)), cell);
        }
    }
}
