//! Soldier spatial index
//!
//! Wraps the quadtree with an id -> entry map so soldiers can be moved or
//! removed by id. Small populations are answered by a linear scan.

use ahash::AHashMap;

use crate::core::config::SpatialConfig;
use crate::core::types::{Rect, SoldierId, TeamId, Vec2};
use crate::spatial::quadtree::{QuadEntry, QuadTree};

/// Radius/nearest queries over soldier positions
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    tree: QuadTree,
    entries: AHashMap<SoldierId, QuadEntry>,
    linear_threshold: usize,
}

impl SpatialIndex {
    pub fn new(bounds: Rect, config: &SpatialConfig) -> Self {
        Self {
            tree: QuadTree::new(bounds, config.node_capacity, config.max_depth),
            entries: AHashMap::new(),
            linear_threshold: config.linear_threshold,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: SoldierId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn position(&self, id: SoldierId) -> Option<Vec2> {
        self.entries.get(&id).map(|e| e.position)
    }

    pub fn team(&self, id: SoldierId) -> Option<TeamId> {
        self.entries.get(&id).map(|e| e.team)
    }

    fn uses_linear_scan(&self) -> bool {
        self.entries.len() < self.linear_threshold
    }

    /// Insert or replace an entry
    pub fn insert(&mut self, id: SoldierId, team: TeamId, position: Vec2) {
        if let Some(old) = self.entries.remove(&id) {
            self.tree.remove(id, old.position);
        }
        let entry = QuadEntry { id, team, position };
        self.tree.insert(entry);
        self.entries.insert(id, entry);
    }

    pub fn remove(&mut self, id: SoldierId) -> bool {
        match self.entries.remove(&id) {
            Some(old) => self.tree.remove(id, old.position),
            None => false,
        }
    }

    /// Move an existing entry; unknown ids are inserted
    pub fn update(&mut self, id: SoldierId, team: TeamId, position: Vec2) {
        if let Some(entry) = self.entries.get(&id) {
            if entry.position == position && entry.team == team {
                return;
            }
        }
        self.insert(id, team, position);
    }

    /// Replace the whole content in one pass
    pub fn rebuild(&mut self, entries: impl IntoIterator<Item = QuadEntry>) {
        let bounds = self.tree.bounds();
        self.tree.reset(bounds);
        self.entries.clear();
        for entry in entries {
            self.tree.insert(entry);
            self.entries.insert(entry.id, entry);
        }
    }

    /// Entries within `radius` of `center`, in ascending id order
    pub fn query_radius_entries(&self, center: Vec2, radius: f32) -> Vec<QuadEntry> {
        let mut found = if self.uses_linear_scan() {
            let radius_sq = radius * radius;
            self.entries
                .values()
                .filter(|e| e.position.distance_squared(&center) <= radius_sq)
                .copied()
                .collect()
        } else {
            let mut found = Vec::new();
            self.tree.query_radius(center, radius, &mut found);
            found
        };
        found.sort_unstable_by_key(|e| e.id);
        found
    }

    /// Soldier ids within `radius` of `center`, in ascending id order
    pub fn query_radius(&self, center: Vec2, radius: f32) -> Vec<SoldierId> {
        self.query_radius_entries(center, radius)
            .into_iter()
            .map(|e| e.id)
            .collect()
    }

    /// Closest soldier not on `team` within `max_radius`; ties go to the lowest id
    pub fn query_nearest_enemy(
        &self,
        position: Vec2,
        team: TeamId,
        max_radius: f32,
    ) -> Option<SoldierId> {
        self.nearest_where(position, max_radius, |e| e.team != team)
            .map(|e| e.id)
    }

    /// Closest entry accepted by `filter`
    pub fn nearest_where<F>(&self, position: Vec2, max_radius: f32, filter: F) -> Option<QuadEntry>
    where
        F: Fn(&QuadEntry) -> bool,
    {
        if !self.uses_linear_scan() {
            return self.tree.nearest(position, max_radius, filter);
        }

        let limit = max_radius * max_radius;
        self.entries
            .values()
            .filter(|e| filter(e))
            .map(|e| (e.position.distance_squared(&position), e))
            .filter(|(d2, _)| *d2 <= limit)
            .min_by(|(da, a), (db, b)| da.total_cmp(db).then(a.id.cmp(&b.id)))
            .map(|(_, e)| *e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with_threshold(linear_threshold: usize) -> SpatialIndex {
        let config = SpatialConfig {
            node_capacity: 2,
            max_depth: 6,
            linear_threshold,
        };
        SpatialIndex::new(Rect::centered(100.0, 100.0), &config)
    }

    fn populate(index: &mut SpatialIndex) {
        for i in 0..50u32 {
            let team = TeamId((i % 2) as u8);
            index.insert(SoldierId(i), team, Vec2::new(i as f32, (i % 7) as f32));
        }
    }

    #[test]
    fn test_linear_and_tree_agree() {
        let mut linear = index_with_threshold(1000);
        let mut tree = index_with_threshold(0);
        populate(&mut linear);
        populate(&mut tree);

        for center in [Vec2::new(5.0, 2.0), Vec2::new(25.0, 0.0), Vec2::new(-10.0, 4.0)] {
            assert_eq!(linear.query_radius(center, 8.0), tree.query_radius(center, 8.0));
            assert_eq!(
                linear.query_nearest_enemy(center, TeamId(0), 50.0),
                tree.query_nearest_enemy(center, TeamId(0), 50.0)
            );
        }
    }

    #[test]
    fn test_results_sorted_by_id() {
        let mut index = index_with_threshold(0);
        populate(&mut index);
        let ids = index.query_radius(Vec2::new(20.0, 3.0), 15.0);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert!(!ids.is_empty());
    }

    #[test]
    fn test_update_moves_entry() {
        let mut index = index_with_threshold(0);
        populate(&mut index);
        index.update(SoldierId(3), TeamId(1), Vec2::new(-80.0, -80.0));
        assert_eq!(index.position(SoldierId(3)), Some(Vec2::new(-80.0, -80.0)));
        assert_eq!(index.query_radius(Vec2::new(-80.0, -80.0), 1.0), vec![SoldierId(3)]);
        assert!(!index.query_radius(Vec2::new(3.0, 3.0), 0.5).contains(&SoldierId(3)));
        assert_eq!(index.len(), 50);
    }

    #[test]
    fn test_remove() {
        let mut index = index_with_threshold(0);
        populate(&mut index);
        assert!(index.remove(SoldierId(10)));
        assert!(!index.remove(SoldierId(10)));
        assert!(!index.contains(SoldierId(10)));
        assert_eq!(index.len(), 49);
    }

    #[test]
    fn test_nearest_enemy_ignores_own_team() {
        let mut index = index_with_threshold(0);
        index.insert(SoldierId(1), TeamId(0), Vec2::new(0.5, 0.0));
        index.insert(SoldierId(2), TeamId(1), Vec2::new(3.0, 0.0));
        assert_eq!(
            index.query_nearest_enemy(Vec2::ZERO, TeamId(0), 10.0),
            Some(SoldierId(2))
        );
        assert_eq!(index.query_nearest_enemy(Vec2::ZERO, TeamId(0), 2.0), None);
    }

    #[test]
    fn test_rebuild_replaces_content() {
        let mut index = index_with_threshold(0);
        populate(&mut index);
        index.rebuild([QuadEntry {
            id: SoldierId(99),
            team: TeamId(0),
            position: Vec2::ZERO,
        }]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.query_radius(Vec2::ZERO, 200.0), vec![SoldierId(99)]);
    }
}
