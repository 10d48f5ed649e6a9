//! Cover tree spatial index
//!
//! A cover tree stores every point in exactly one node. A node created at
//! level `l` is implicitly present at every level `<= l`, so the set `C_i` of
//! nodes present at level `i` is nested: `C_i ⊆ C_{i-1}`. Two invariants hold
//! after every insertion:
//!
//! * covering: a node at level `l` lies within `2^(l+1)` of its parent, and
//!   the parent's level is above `l`;
//! * separation: any two nodes present at level `i` are more than `2^i` apart.
//!
//! Together they bound how far a node's descendants can be from it, which is
//! what lets queries discard whole subtrees. Points at identical coordinates
//! are kept on the node that first claimed the position.
//!
//! Distances and radii are `f64`, so levels stay meaningful across the
//! whole `f32` coordinate range.

use cloudrec_core::{
    Error, IndexedPoint, NearestNeighborSearch, Neighbor, Point3f, ProgressObserver, ProgressTracker, Result,
};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::debug;

/// Highest level whose radius is finite
const MAX_LEVEL: i32 = f64::MAX_EXP - 1;

/// Covering radius of a level
fn radius(level: i32) -> f64 {
    2f64.powi(level)
}

/// Smallest level whose radius covers distance `d > 0`, at most [`MAX_LEVEL`]
fn level_for(d: f64) -> i32 {
    let mut level = (d.log2().ceil() as i32).min(MAX_LEVEL);
    while level < MAX_LEVEL && radius(level) < d {
        level += 1;
    }
    level
}

#[derive(Debug, Clone)]
struct Node {
    point: IndexedPoint,
    level: i32,
    children: Vec<usize>,
    duplicates: Vec<IndexedPoint>,
}

impl Node {
    fn new(point: IndexedPoint, level: i32) -> Self {
        Self {
            point,
            level,
            children: Vec::new(),
            duplicates: Vec::new(),
        }
    }
}

/// Candidate in the bounded result heap, ordered by distance then index
#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f64,
    point: IndexedPoint,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.point.index.cmp(&other.point.index))
    }
}

/// The k best candidates seen so far
struct KBest {
    k: usize,
    heap: BinaryHeap<Candidate>,
}

impl KBest {
    fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k + 1),
        }
    }

    fn offer(&mut self, candidate: Candidate) {
        if self.heap.len() < self.k {
            self.heap.push(candidate);
        } else if let Some(worst) = self.heap.peek() {
            if candidate < *worst {
                self.heap.pop();
                self.heap.push(candidate);
            }
        }
    }

    fn offer_node(&mut self, node: &Node, distance: f64) {
        self.offer(Candidate {
            distance,
            point: node.point,
        });
        for &point in &node.duplicates {
            self.offer(Candidate { distance, point });
        }
    }

    /// Distance of the current k-th candidate, infinite until k are known
    fn bound(&self) -> f64 {
        if self.heap.len() < self.k {
            f64::INFINITY
        } else {
            self.heap.peek().map_or(f64::INFINITY, |c| c.distance)
        }
    }

    fn into_sorted(self) -> Vec<Neighbor> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|c| Neighbor {
                point: c.point,
                distance: c.distance,
            })
            .collect()
    }
}

/// Cover tree over indexed 3D points with Euclidean distance
#[derive(Debug, Clone, Default)]
pub struct CoverTree {
    nodes: Vec<Node>,
    min_level: i32,
    len: usize,
}

impl CoverTree {
    /// Create a new empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree over `points`, tagging each with its position in the slice
    pub fn from_points(points: &[Point3f]) -> Result<Self> {
        Self::build(points, None, 0)
    }

    /// Build a tree over `points`, reporting progress every `frequency` percent.
    ///
    /// The tree is returned only once every point is inserted, so callers
    /// never observe a partially built index.
    pub fn build(
        points: &[Point3f],
        progress: Option<&dyn ProgressObserver>,
        frequency: u32,
    ) -> Result<Self> {
        let mut tree = Self::new();
        tree.nodes.try_reserve(points.len())?;

        let label = "Building cloud spatial index";
        let mut tracker = ProgressTracker::new(progress, label, points.len(), frequency);
        for (i, p) in points.iter().enumerate() {
            tracker.tick(i);
            tree.insert(IndexedPoint::new(*p, i))?;
        }

        debug!(
            "Cover tree built: {} points, {} nodes, levels {}..={}",
            tree.len,
            tree.nodes.len(),
            tree.min_level,
            tree.max_level().unwrap_or(0)
        );
        Ok(tree)
    }

    /// Number of indexed points, duplicates included
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Level of the root, `None` for an empty tree
    pub fn max_level(&self) -> Option<i32> {
        self.nodes.first().map(|root| root.level)
    }

    /// Distance from a node to the point being inserted, which must be finite
    fn insert_distance(&self, node: usize, point: &IndexedPoint) -> Result<f64> {
        let d = self.nodes[node].point.distance(&point.position);
        if d.is_finite() {
            Ok(d)
        } else {
            Err(Error::InvalidData(format!(
                "point {} has no finite distance to point {}",
                point.index, self.nodes[node].point.index
            )))
        }
    }

    /// Insert one point, preserving the covering and separation invariants
    pub fn insert(&mut self, point: IndexedPoint) -> Result<()> {
        let p = point.position;
        if !p.coords.iter().all(|c| c.is_finite()) {
            return Err(Error::InvalidData(format!(
                "point {} has non-finite coordinates",
                point.index
            )));
        }

        if self.nodes.is_empty() {
            self.nodes.push(Node::new(point, 0));
            self.min_level = 0;
            self.len = 1;
            return Ok(());
        }

        const ROOT: usize = 0;
        let d_root = self.insert_distance(ROOT, &point)?;
        if self.nodes[ROOT].point.position == p {
            self.nodes[ROOT].duplicates.push(point);
            self.len += 1;
            return Ok(());
        }

        // A lone root can be re-levelled freely; otherwise only raised.
        if self.nodes[ROOT].children.is_empty() {
            self.nodes[ROOT].level = level_for(d_root);
            self.min_level = self.nodes[ROOT].level;
        } else if d_root > radius(self.nodes[ROOT].level) {
            self.nodes[ROOT].level = level_for(d_root);
        }

        // Descend while some node one level down is within the covering
        // radius, remembering each level's cover set for the parent search.
        let mut level = self.nodes[ROOT].level;
        let mut cover: Vec<(usize, f64)> = vec![(ROOT, d_root)];
        let mut frames: Vec<(i32, Vec<(usize, f64)>)> = Vec::new();

        loop {
            let mut next: Vec<(usize, f64)> = Vec::with_capacity(cover.len() * 2);
            for &(q, dq) in &cover {
                next.push((q, dq));
                for &c in &self.nodes[q].children {
                    if self.nodes[c].level == level - 1 {
                        next.push((c, self.insert_distance(c, &point)?));
                    }
                }
            }

            if let Some(&(same, _)) = next.iter().find(|&&(q, _)| self.nodes[q].point.position == p) {
                self.nodes[same].duplicates.push(point);
                self.len += 1;
                return Ok(());
            }

            let r = radius(level);
            let nearest = next.iter().map(|&(_, d)| d).fold(f64::INFINITY, f64::min);
            if nearest > r {
                break;
            }

            frames.push((level, cover));
            cover = next.into_iter().filter(|&(_, d)| d <= r).collect();
            level -= 1;
        }

        while let Some((frame_level, frame_cover)) = frames.pop() {
            let r = radius(frame_level);
            let parent = frame_cover
                .iter()
                .filter(|&&(_, d)| d <= r)
                .min_by(|a, b| {
                    a.1.total_cmp(&b.1)
                        .then_with(|| self.nodes[a.0].point.index.cmp(&self.nodes[b.0].point.index))
                })
                .map(|&(q, _)| q);

            if let Some(parent) = parent {
                let child_level = frame_level - 1;
                let id = self.nodes.len();
                self.nodes.push(Node::new(point, child_level));
                self.nodes[parent].children.push(id);
                self.min_level = self.min_level.min(child_level);
                self.len += 1;
                return Ok(());
            }
        }

        // The root frame always holds the root within its radius.
        Err(Error::Algorithm(format!(
            "cover tree found no parent for point {}",
            point.index
        )))
    }

    /// Exact k nearest neighbors, ordered by distance then index
    pub fn k_nearest_neighbors(&self, query: &Point3f, k: usize) -> Result<Vec<Neighbor>> {
        let root = self.nodes.first().ok_or(Error::IndexNotBuilt)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut best = KBest::new(k);
        let d_root = root.point.distance(query);
        best.offer_node(root, d_root);

        let mut level = root.level;
        let mut cover: Vec<(usize, f64)> = vec![(0, d_root)];

        while level > self.min_level && !cover.is_empty() {
            let mut next: Vec<(usize, f64)> = Vec::with_capacity(cover.len() * 2);
            for &(q, dq) in &cover {
                let mut deeper = false;
                for &c in &self.nodes[q].children {
                    let child = &self.nodes[c];
                    if child.level == level - 1 {
                        let dc = child.point.distance(query);
                        best.offer_node(child, dc);
                        next.push((c, dc));
                    } else if child.level < level - 1 {
                        deeper = true;
                    }
                }
                if deeper {
                    next.push((q, dq));
                }
            }

            level -= 1;
            // Descendants of a node present at `level` lie within 2^(level+1).
            let bound = best.bound() + radius(level + 1);
            cover = next.into_iter().filter(|&(_, d)| d <= bound).collect();
        }

        Ok(best.into_sorted())
    }

    /// The single nearest indexed point
    pub fn nearest(&self, query: &Point3f) -> Result<Option<Neighbor>> {
        Ok(self.k_nearest_neighbors(query, 1)?.into_iter().next())
    }

    /// All indexed points, in node order
    pub fn points(&self) -> impl Iterator<Item = &IndexedPoint> {
        self.nodes
            .iter()
            .flat_map(|n| std::iter::once(&n.point).chain(n.duplicates.iter()))
    }

    /// Check the covering and separation invariants over the whole tree.
    ///
    /// Quadratic in the number of nodes; meant for tests and debugging.
    pub fn check_invariants(&self) -> Result<()> {
        let violation = |msg: String| Err(Error::Algorithm(msg));

        let counted: usize = self.nodes.iter().map(|n| 1 + n.duplicates.len()).sum();
        if counted != self.len {
            return violation(format!("tree holds {} points but counts {}", counted, self.len));
        }

        for (id, node) in self.nodes.iter().enumerate() {
            for &c in &node.children {
                let child = &self.nodes[c];
                if child.level >= node.level {
                    return violation(format!(
                        "child {} at level {} not below parent {} at level {}",
                        c, child.level, id, node.level
                    ));
                }
                let d = child.point.distance(&node.point.position);
                if d > radius(child.level + 1) {
                    return violation(format!(
                        "child {} is {} from parent {}, beyond covering radius {}",
                        c,
                        d,
                        id,
                        radius(child.level + 1)
                    ));
                }
            }
            for dup in &node.duplicates {
                if dup.position != node.point.position {
                    return violation(format!("duplicate {} does not match node {}", dup.index, id));
                }
            }
        }

        for a in 0..self.nodes.len() {
            for b in (a + 1)..self.nodes.len() {
                let (na, nb) = (&self.nodes[a], &self.nodes[b]);
                let shared = na.level.min(nb.level);
                let d = na.point.distance(&nb.point.position);
                if d <= radius(shared) {
                    return violation(format!(
                        "nodes {} and {} are {} apart at level {} (separation {})",
                        a,
                        b,
                        d,
                        shared,
                        radius(shared)
                    ));
                }
            }
        }

        Ok(())
    }
}

impl NearestNeighborSearch for CoverTree {
    fn find_k_nearest(&self, query: &Point3f, k: usize) -> Result<Vec<Neighbor>> {
        self.k_nearest_neighbors(query, k)
    }

    fn len(&self) -> usize {
        self.len
    }
}
