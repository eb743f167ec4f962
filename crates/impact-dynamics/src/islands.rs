//! Connected-component partitioning of constraints.
//!
//! Two constraints couple in the impulse equations exactly when a chain of
//! shared bodies links them. Partitioning the constraint set into these
//! components keeps each complementarity problem as small as possible and
//! lets callers solve components in parallel (they share no mutable state
//! until impulses are applied).
//!
//! Detection uses a union-find (disjoint-set) structure with path
//! compression and union by rank: near-linear in the number of
//! constraints. Island order follows the first constraint seen in each
//! island, and bodies are sorted within an island, so the partition is
//! deterministic.

use crate::UnilateralConstraint;
use impact_types::BodyId;
use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One connected component of constraints and the bodies they touch.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Island {
    /// Bodies in this island, sorted by id.
    pub bodies: Vec<BodyId>,
    /// Indices into the original constraint slice.
    pub constraints: Vec<usize>,
}

impl Island {
    /// Number of bodies in the island.
    #[must_use]
    pub fn num_bodies(&self) -> usize {
        self.bodies.len()
    }

    /// Number of constraints in the island.
    #[must_use]
    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// Whether the island contains a body.
    #[must_use]
    pub fn contains_body(&self, body: BodyId) -> bool {
        self.bodies.binary_search(&body).is_ok()
    }
}

/// The constraint partition produced by island detection.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConstraintIslands {
    islands: Vec<Island>,
    body_to_island: HashMap<BodyId, usize>,
}

impl ConstraintIslands {
    /// Partition constraints into connected components over shared bodies.
    #[must_use]
    pub fn build(constraints: &[UnilateralConstraint]) -> Self {
        if constraints.is_empty() {
            return Self::default();
        }

        // Unique bodies in first-seen order.
        let mut body_ids: Vec<BodyId> = Vec::new();
        let mut body_index: HashMap<BodyId, usize> = HashMap::new();
        let mut index_of = |id: BodyId, body_ids: &mut Vec<BodyId>| -> usize {
            *body_index.entry(id).or_insert_with(|| {
                body_ids.push(id);
                body_ids.len() - 1
            })
        };

        let mut uf = UnionFind::new(0);
        for c in constraints {
            let (a, b) = c.bodies();
            let ia = index_of(a, &mut body_ids);
            uf.grow(body_ids.len());
            if let Some(b) = b {
                let ib = index_of(b, &mut body_ids);
                uf.grow(body_ids.len());
                uf.union(ia, ib);
            }
        }

        // Assign island slots in order of each root's first constraint.
        let mut root_to_island: HashMap<usize, usize> = HashMap::new();
        let mut islands: Vec<Island> = Vec::new();
        for (ci, c) in constraints.iter().enumerate() {
            let (a, _) = c.bodies();
            let root = uf.find(body_index[&a]);
            let slot = *root_to_island.entry(root).or_insert_with(|| {
                islands.push(Island::default());
                islands.len() - 1
            });
            islands[slot].constraints.push(ci);
        }

        // Assign bodies to their islands.
        let mut body_to_island: HashMap<BodyId, usize> = HashMap::new();
        for (bi, &id) in body_ids.iter().enumerate() {
            let root = uf.find(bi);
            if let Some(&slot) = root_to_island.get(&root) {
                islands[slot].bodies.push(id);
                body_to_island.insert(id, slot);
            }
        }
        for island in &mut islands {
            island.bodies.sort();
        }

        Self {
            islands,
            body_to_island,
        }
    }

    /// Number of islands.
    #[must_use]
    pub fn num_islands(&self) -> usize {
        self.islands.len()
    }

    /// All islands.
    #[must_use]
    pub fn islands(&self) -> &[Island] {
        &self.islands
    }

    /// The island index of a body, if it appears in any constraint.
    #[must_use]
    pub fn island_for_body(&self, body: BodyId) -> Option<usize> {
        self.body_to_island.get(&body).copied()
    }

    /// Whether two bodies belong to the same island.
    #[must_use]
    pub fn same_island(&self, a: BodyId, b: BodyId) -> bool {
        match (self.body_to_island.get(&a), self.body_to_island.get(&b)) {
            (Some(&x), Some(&y)) => x == y,
            _ => false,
        }
    }
}

/// Union-find with path compression and union by rank.
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    /// Extend to `n` elements, each new one its own set.
    fn grow(&mut self, n: usize) {
        while self.parent.len() < n {
            self.parent.push(self.parent.len());
            self.rank.push(0);
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, x: usize, y: usize) {
        let rx = self.find(x);
        let ry = self.find(y);
        if rx == ry {
            return;
        }
        match self.rank[rx].cmp(&self.rank[ry]) {
            std::cmp::Ordering::Less => self.parent[rx] = ry,
            std::cmp::Ordering::Greater => self.parent[ry] = rx,
            std::cmp::Ordering::Equal => {
                self.parent[ry] = rx;
                self.rank[rx] += 1;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::{ContactConstraint, LimitConstraint, LimitSide};
    use impact_types::GeomId;
    use nalgebra::{Point3, Vector3};

    fn contact(a: u64, b: u64) -> UnilateralConstraint {
        UnilateralConstraint::Contact(ContactConstraint::new(
            GeomId::new(a),
            GeomId::new(b),
            BodyId::new(a),
            BodyId::new(b),
            Point3::origin(),
            Vector3::z(),
        ))
    }

    fn limit(body: u64) -> UnilateralConstraint {
        UnilateralConstraint::Limit(LimitConstraint::new(BodyId::new(body), 0, LimitSide::Lower))
    }

    #[test]
    fn test_empty() {
        let islands = ConstraintIslands::build(&[]);
        assert_eq!(islands.num_islands(), 0);
    }

    #[test]
    fn test_chain_single_island() {
        // 0-1, 1-2 share body 1.
        let cs = vec![contact(0, 1), contact(1, 2)];
        let islands = ConstraintIslands::build(&cs);
        assert_eq!(islands.num_islands(), 1);
        assert_eq!(islands.islands()[0].num_bodies(), 3);
        assert_eq!(islands.islands()[0].num_constraints(), 2);
    }

    #[test]
    fn test_disjoint_pairs() {
        let cs = vec![contact(0, 1), contact(2, 3)];
        let islands = ConstraintIslands::build(&cs);
        assert_eq!(islands.num_islands(), 2);
        assert!(islands.same_island(BodyId::new(0), BodyId::new(1)));
        assert!(!islands.same_island(BodyId::new(0), BodyId::new(2)));
    }

    #[test]
    fn test_partition_is_disjoint_cover() {
        let cs = vec![
            contact(0, 1),
            contact(2, 3),
            contact(1, 4),
            limit(2),
            contact(5, 6),
        ];
        let islands = ConstraintIslands::build(&cs);

        // Every constraint appears in exactly one island.
        let mut seen = vec![0usize; cs.len()];
        for island in islands.islands() {
            for &ci in &island.constraints {
                seen[ci] += 1;
            }
        }
        assert!(seen.iter().all(|&s| s == 1));

        // Body-sharing constraints land together: 0-1 and 1-4.
        assert!(islands.same_island(BodyId::new(0), BodyId::new(4)));
        // The limit on body 2 joins the 2-3 contact island.
        assert_eq!(
            islands.island_for_body(BodyId::new(2)),
            islands.island_for_body(BodyId::new(3))
        );
    }

    #[test]
    fn test_limit_only_island() {
        let cs = vec![limit(9)];
        let islands = ConstraintIslands::build(&cs);
        assert_eq!(islands.num_islands(), 1);
        assert_eq!(islands.islands()[0].bodies, vec![BodyId::new(9)]);
    }

    #[test]
    fn test_cycle() {
        let cs = vec![contact(0, 1), contact(1, 2), contact(2, 0)];
        let islands = ConstraintIslands::build(&cs);
        assert_eq!(islands.num_islands(), 1);
        assert_eq!(islands.islands()[0].num_constraints(), 3);
    }

    #[test]
    fn test_island_order_deterministic() {
        let cs = vec![contact(7, 8), contact(0, 1), contact(8, 9)];
        let islands = ConstraintIslands::build(&cs);
        // First island is the one containing the first constraint.
        assert!(islands.islands()[0].contains_body(BodyId::new(7)));
        assert_eq!(islands.islands()[0].constraints, vec![0, 2]);
        assert_eq!(islands.islands()[1].constraints, vec![1]);
    }
}
