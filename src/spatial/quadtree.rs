//! Point quadtree over soldier positions

use crate::core::types::{Rect, SoldierId, TeamId, Vec2};

/// A point stored in the tree
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadEntry {
    pub id: SoldierId,
    pub team: TeamId,
    pub position: Vec2,
}

#[derive(Debug, Clone)]
struct Node {
    bounds: Rect,
    depth: u32,
    entries: Vec<QuadEntry>,
    children: Option<[usize; 4]>,
}

impl Node {
    fn leaf(bounds: Rect, depth: u32) -> Self {
        Self {
            bounds,
            depth,
            entries: Vec::new(),
            children: None,
        }
    }

    #[inline]
    fn quadrant(&self, p: Vec2) -> usize {
        let mid = self.bounds.center();
        (p.x >= mid.x) as usize + 2 * (p.z >= mid.z) as usize
    }
}

/// Fixed-bounds quadtree; points outside the root bounds are kept in an
/// overflow list that every query scans
#[derive(Debug, Clone)]
pub struct QuadTree {
    nodes: Vec<Node>,
    outside: Vec<QuadEntry>,
    capacity: usize,
    max_depth: u32,
    len: usize,
}

impl QuadTree {
    pub fn new(bounds: Rect, capacity: usize, max_depth: u32) -> Self {
        Self {
            nodes: vec![Node::leaf(bounds, 0)],
            outside: Vec::new(),
            capacity: capacity.max(1),
            max_depth,
            len: 0,
        }
    }

    pub fn bounds(&self) -> Rect {
        self.nodes[0].bounds
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drop every entry and reset the root to `bounds`
    pub fn reset(&mut self, bounds: Rect) {
        self.nodes.clear();
        self.nodes.push(Node::leaf(bounds, 0));
        self.outside.clear();
        self.len = 0;
    }

    pub fn insert(&mut self, entry: QuadEntry) {
        self.len += 1;
        if !self.nodes[0].bounds.contains(entry.position) {
            self.outside.push(entry);
            return;
        }

        let mut idx = 0;
        while let Some(children) = self.nodes[idx].children {
            idx = children[self.nodes[idx].quadrant(entry.position)];
        }

        self.nodes[idx].entries.push(entry);
        if self.nodes[idx].entries.len() > self.capacity && self.nodes[idx].depth < self.max_depth {
            self.split(idx);
        }
    }

    fn split(&mut self, idx: usize) {
        let bounds = self.nodes[idx].bounds;
        let depth = self.nodes[idx].depth + 1;
        let mid = bounds.center();

        let quads = [
            Rect::new(bounds.min, mid),
            Rect::new(Vec2::new(mid.x, bounds.min.z), Vec2::new(bounds.max.x, mid.z)),
            Rect::new(Vec2::new(bounds.min.x, mid.z), Vec2::new(mid.x, bounds.max.z)),
            Rect::new(mid, bounds.max),
        ];

        let first = self.nodes.len();
        for quad in quads {
            self.nodes.push(Node::leaf(quad, depth));
        }
        let children = [first, first + 1, first + 2, first + 3];

        let entries = std::mem::take(&mut self.nodes[idx].entries);
        self.nodes[idx].children = Some(children);
        for entry in entries {
            let q = self.nodes[idx].quadrant(entry.position);
            self.nodes[children[q]].entries.push(entry);
        }
    }

    /// Remove `id`, located at `position`; returns whether it was found
    pub fn remove(&mut self, id: SoldierId, position: Vec2) -> bool {
        if !self.nodes[0].bounds.contains(position) {
            return self.remove_from_outside(id);
        }

        let mut idx = 0;
        while let Some(children) = self.nodes[idx].children {
            idx = children[self.nodes[idx].quadrant(position)];
        }

        let entries = &mut self.nodes[idx].entries;
        if let Some(pos) = entries.iter().position(|e| e.id == id) {
            entries.swap_remove(pos);
            self.len -= 1;
            true
        } else {
            self.remove_from_outside(id)
        }
    }

    fn remove_from_outside(&mut self, id: SoldierId) -> bool {
        if let Some(pos) = self.outside.iter().position(|e| e.id == id) {
            self.outside.swap_remove(pos);
            self.len -= 1;
            true
        } else {
            false
        }
    }

    /// Append every entry within `radius` of `center` to `out` (unordered)
    pub fn query_radius(&self, center: Vec2, radius: f32, out: &mut Vec<QuadEntry>) {
        let radius_sq = radius * radius;
        out.extend(
            self.outside
                .iter()
                .filter(|e| e.position.distance_squared(&center) <= radius_sq),
        );

        let mut stack = vec![0usize];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            if !node.bounds.intersects_circle(center, radius) {
                continue;
            }
            match node.children {
                Some(children) => stack.extend_from_slice(&children),
                None => out.extend(
                    node.entries
                        .iter()
                        .filter(|e| e.position.distance_squared(&center) <= radius_sq),
                ),
            }
        }
    }

    /// Closest entry within `max_radius` accepted by `filter`; ties go to the lowest id
    pub fn nearest<F>(&self, center: Vec2, max_radius: f32, filter: F) -> Option<QuadEntry>
    where
        F: Fn(&QuadEntry) -> bool,
    {
        let limit = max_radius * max_radius;
        let mut best: Option<(QuadEntry, f32)> = None;

        let consider = |entry: &QuadEntry, best: &mut Option<(QuadEntry, f32)>| {
            let d2 = entry.position.distance_squared(&center);
            if d2 > limit || !filter(entry) {
                return;
            }
            let better = match best {
                None => true,
                Some((b, bd)) => d2 < *bd || (d2 == *bd && entry.id < b.id),
            };
            if better {
                *best = Some((*entry, d2));
            }
        };

        for entry in &self.outside {
            consider(entry, &mut best);
        }

        let mut stack = vec![0usize];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            let bound = best.map(|(_, d)| d).unwrap_or(limit);
            if node.bounds.distance_squared_to(center) > bound {
                continue;
            }
            match node.children {
                Some(children) => stack.extend_from_slice(&children),
                None => {
                    for entry in &node.entries {
                        consider(entry, &mut best);
                    }
                }
            }
        }

        best.map(|(e, _)| e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u32, team: u8, x: f32, z: f32) -> QuadEntry {
        QuadEntry {
            id: SoldierId(id),
            team: TeamId(team),
            position: Vec2::new(x, z),
        }
    }

    fn grid_tree() -> QuadTree {
        let mut tree = QuadTree::new(Rect::centered(50.0, 50.0), 4, 8);
        let mut id = 0;
        for x in -10..10 {
            for z in -10..10 {
                tree.insert(entry(id, (id % 2) as u8, x as f32 * 2.0, z as f32 * 2.0));
                id += 1;
            }
        }
        tree
    }

    #[test]
    fn test_insert_splits_nodes() {
        let tree = grid_tree();
        assert_eq!(tree.len(), 400);
        assert!(tree.nodes.len() > 1);
    }

    #[test]
    fn test_query_radius_matches_brute_force() {
        let tree = grid_tree();
        let center = Vec2::new(1.0, -3.0);
        let mut found = Vec::new();
        tree.query_radius(center, 5.0, &mut found);

        let mut expected = 0;
        for x in -10..10 {
            for z in -10..10 {
                if Vec2::new(x as f32 * 2.0, z as f32 * 2.0).distance(&center) <= 5.0 {
                    expected += 1;
                }
            }
        }
        assert_eq!(found.len(), expected);
    }

    #[test]
    fn test_remove() {
        let mut tree = QuadTree::new(Rect::centered(10.0, 10.0), 2, 4);
        tree.insert(entry(1, 0, 1.0, 1.0));
        tree.insert(entry(2, 0, 2.0, 2.0));
        tree.insert(entry(3, 0, -2.0, 2.0));
        assert!(tree.remove(SoldierId(2), Vec2::new(2.0, 2.0)));
        assert!(!tree.remove(SoldierId(2), Vec2::new(2.0, 2.0)));
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_points_outside_bounds_are_found() {
        let mut tree = QuadTree::new(Rect::centered(10.0, 10.0), 2, 4);
        tree.insert(entry(1, 0, 50.0, 0.0));
        let mut found = Vec::new();
        tree.query_radius(Vec2::new(49.0, 0.0), 2.0, &mut found);
        assert_eq!(found.len(), 1);
        assert!(tree.remove(SoldierId(1), Vec2::new(50.0, 0.0)));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_nearest_with_filter() {
        let tree = grid_tree();
        let nearest = tree
            .nearest(Vec2::new(0.1, 0.1), 100.0, |e| e.team == TeamId(1))
            .unwrap();
        assert_eq!(nearest.team, TeamId(1));
        assert!(nearest.position.distance(&Vec2::new(0.1, 0.1)) <= 2.1);
    }

    #[test]
    fn test_nearest_respects_max_radius() {
        let mut tree = QuadTree::new(Rect::centered(10.0, 10.0), 2, 4);
        tree.insert(entry(1, 0, 5.0, 0.0));
        assert!(tree.nearest(Vec2::ZERO, 4.0, |_| true).is_none());
        assert!(tree.nearest(Vec2::ZERO, 5.0, |_| true).is_some());
    }

    #[test]
    fn test_nearest_tie_breaks_on_lowest_id() {
        let mut tree = QuadTree::new(Rect::centered(10.0, 10.0), 1, 6);
        tree.insert(entry(9, 0, 2.0, 0.0));
        tree.insert(entry(4, 0, -2.0, 0.0));
        tree.insert(entry(6, 0, 0.0, 2.0));
        let nearest = tree.nearest(Vec2::ZERO, 10.0, |_| true).unwrap();
        assert_eq!(nearest.id, SoldierId(4));
    }

    #[test]
    fn test_coincident_points_respect_max_depth() {
        let mut tree = QuadTree::new(Rect::centered(10.0, 10.0), 1, 3);
        for id in 0..20 {
            tree.insert(entry(id, 0, 1.0, 1.0));
        }
        assert_eq!(tree.len(), 20);
        assert!(tree.nodes.iter().all(|n| n.depth <= 3));
    }
}
