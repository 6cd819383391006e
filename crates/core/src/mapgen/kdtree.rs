//! Two-dimensional k-d tree over room centres.

use crate::types::Pos;

use super::model::RoomId;

#[derive(Clone, Copy, Debug)]
struct Node {
    pos: Pos,
    room: RoomId,
    left: Option<usize>,
    right: Option<usize>,
    axis_x: bool,
}

/// Flat-array k-d tree; children are indices into `nodes`.
#[derive(Clone, Debug, Default)]
pub struct KdTree {
    nodes: Vec<Node>,
    root: Option<usize>,
}

impl KdTree {
    pub fn build(points: &[(Pos, RoomId)]) -> Self {
        let mut items = points.to_vec();
        let mut tree = Self { nodes: Vec::with_capacity(items.len()), root: None };
        tree.root = tree.build_range(&mut items, true);
        tree
    }

    fn build_range(&mut self, items: &mut [(Pos, RoomId)], axis_x: bool) -> Option<usize> {
        if items.is_empty() {
            return None;
        }
        if axis_x {
            items.sort_by_key(|(pos, _)| (pos.x, pos.y));
        } else {
            items.sort_by_key(|(pos, _)| (pos.y, pos.x));
        }
        let mid = items.len() / 2;
        let (pos, room) = items[mid];
        let index = self.nodes.len();
        self.nodes.push(Node { pos, room, left: None, right: None, axis_x });
        let (lower, rest) = items.split_at_mut(mid);
        let left = self.build_range(lower, !axis_x);
        let right = self.build_range(&mut rest[1..], !axis_x);
        self.nodes[index].left = left;
        self.nodes[index].right = right;
        Some(index)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Closest room to `target` for which `accept` holds. Ties keep the room
    /// found first.
    pub fn nearest(&self, target: Pos, accept: impl Fn(RoomId) -> bool) -> Option<(RoomId, i64)> {
        let mut best = None;
        self.search(self.root, target, &accept, &mut best);
        best.map(|(dist, room)| (room, dist))
    }

    fn search(
        &self,
        node: Option<usize>,
        target: Pos,
        accept: &dyn Fn(RoomId) -> bool,
        best: &mut Option<(i64, RoomId)>,
    ) {
        let Some(index) = node else {
            return;
        };
        let node = self.nodes[index];
        if accept(node.room) {
            let dist = squared_distance(node.pos, target);
            if best.is_none_or(|(current, _)| dist < current) {
                *best = Some((dist, node.room));
            }
        }

        let delta = if node.axis_x {
            i64::from(target.x) - i64::from(node.pos.x)
        } else {
            i64::from(target.y) - i64::from(node.pos.y)
        };
        let (near, far) = if delta < 0 { (node.left, node.right) } else { (node.right, node.left) };
        self.search(near, target, accept, best);
        let worst = best.map_or(i64::MAX, |(dist, _)| dist);
        if delta * delta <= worst {
            self.search(far, target, accept, best);
        }
    }
}

fn squared_distance(a: Pos, b: Pos) -> i64 {
    let dx = i64::from(a.x) - i64::from(b.x);
    let dy = i64::from(a.y) - i64::from(b.y);
    dx * dx + dy * dy
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use slotmap::SlotMap;

    fn ids(count: usize) -> Vec<RoomId> {
        let mut arena: SlotMap<RoomId, ()> = SlotMap::with_key();
        (0..count).map(|_| arena.insert(())).collect()
    }

    #[test]
    fn nearest_respects_the_filter() {
        let keys = ids(3);
        let tree = KdTree::build(&[
            (Pos::new(0, 0), keys[0]),
            (Pos::new(10, 0), keys[1]),
            (Pos::new(50, 50), keys[2]),
        ]);
        assert_eq!(tree.nearest(Pos::new(1, 1), |_| true).map(|(id, _)| id), Some(keys[0]));
        assert_eq!(
            tree.nearest(Pos::new(1, 1), |id| id != keys[0]).map(|(id, _)| id),
            Some(keys[1])
        );
        assert!(tree.nearest(Pos::new(1, 1), |_| false).is_none());
    }

    #[test]
    fn empty_tree_answers_nothing() {
        let tree = KdTree::build(&[]);
        assert!(tree.is_empty());
        assert!(tree.nearest(Pos::new(3, 3), |_| true).is_none());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn filtered_nearest_matches_brute_force(
            coords in prop::collection::vec((0_i32..200, 0_i32..200), 1..40),
            target in (0_i32..200, 0_i32..200),
            stride in 1_usize..4,
        ) {
            let keys = ids(coords.len());
            let points: Vec<(Pos, RoomId)> = coords
                .iter()
                .zip(&keys)
                .map(|(&(x, y), &id)| (Pos::new(x, y), id))
                .collect();
            let tree = KdTree::build(&points);
            prop_assert_eq!(tree.len(), points.len());
            let target = Pos::new(target.0, target.1);
            let allowed: Vec<RoomId> = keys.iter().copied().step_by(stride).collect();

            let expected = points
                .iter()
                .filter(|(_, id)| allowed.contains(id))
                .map(|(pos, _)| squared_distance(*pos, target))
                .min();
            let found = tree.nearest(target, |id| allowed.contains(&id)).map(|(_, dist)| dist);
            prop_assert_eq!(found, expected);
        }
    }
}
