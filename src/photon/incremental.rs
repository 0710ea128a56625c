//! Photon tree grown one photon at a time.
//!
//! Nodes live in an arena and split on `depth % 3`. The tree is never
//! rebalanced, so queries are only as fast as the insertion order allows,
//! but photons can be added at any time.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::{search_dist2, Neighbours, Photon, SearchParams};
use crate::util::{BBox3f, Result, Vec3};

#[derive(Clone, Debug)]
struct Node {
    photon: Photon,
    children: [Option<u32>; 2],
}

/// Heap entry ordered by distance, farthest on top.
#[derive(Clone, Copy, Debug)]
struct Candidate {
    dist2: f32,
    index: usize,
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
        self.dist2.total_cmp(&other.dist2).then(self.index.cmp(&other.index))
    }
}

#[derive(Clone, Debug, Default)]
pub struct IncrementalPhotonMap {
    nodes: Vec<Node>,
    bbox: BBox3f,
}

impl IncrementalPhotonMap {
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut nodes = Vec::new();
        nodes.try_reserve(capacity)?;
        Ok(Self { nodes, bbox: BBox3f::EMPTY })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn bbox(&self) -> BBox3f {
        self.bbox
    }

    #[inline]
    pub fn photon(&self, index: usize) -> &Photon {
        &self.nodes[index].photon
    }

    pub fn photons(&self) -> impl Iterator<Item = &Photon> + '_ {
        self.nodes.iter().map(|n| &n.photon)
    }

    pub fn photons_mut(&mut self) -> impl Iterator<Item = &mut Photon> + '_ {
        self.nodes.iter_mut().map(|n| &mut n.photon)
    }

    /// Insert a photon, doubling the arena when it is full.
    pub fn store(&mut self, mut photon: Photon) -> Result<()> {
        if self.nodes.len() == self.nodes.capacity() {
            self.nodes.try_reserve(self.nodes.capacity().max(64))?;
        }

        let index = self.nodes.len() as u32;
        let mut depth = 0usize;
        let mut link = None;
        let mut current = if self.nodes.is_empty() { None } else { Some(0usize) };
        while let Some(at) = current {
            let axis = depth % 3;
            let node = &self.nodes[at];
            let side = usize::from(photon.position[axis] >= node.photon.position[axis]);
            link = Some((at, side));
            current = node.children[side].map(|c| c as usize);
            depth += 1;
        }

        photon.plane = (depth % 3) as u8;
        self.bbox.expand_by_point(photon.position);
        self.nodes.push(Node { photon, children: [None; 2] });
        if let Some((parent, side)) = link {
            self.nodes[parent].children[side] = Some(index);
        }
        Ok(())
    }

    /// Up to `params.max_photons` photons within the search radius,
    /// closest first.
    pub fn nearest(&self, pos: Vec3, normal: Vec3, params: &SearchParams) -> Neighbours {
        let max_dist2 = params.search_radius * params.search_radius;
        let mut heap = BinaryHeap::with_capacity(params.max_photons + 1);
        if !self.nodes.is_empty() && params.max_photons > 0 {
            self.search(0, 0, pos, normal, params, max_dist2, &mut heap);
        }

        let full = heap.len() >= params.max_photons;
        let radius2 = match heap.peek() {
            Some(top) if full => top.dist2,
            _ => max_dist2,
        };
        let sorted = heap.into_sorted_vec();
        Neighbours {
            indices: sorted.iter().map(|c| c.index).collect(),
            dist2: sorted.iter().map(|c| c.dist2).collect(),
            radius2,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn search(
        &self,
        at: usize,
        depth: usize,
        pos: Vec3,
        normal: Vec3,
        params: &SearchParams,
        max_dist2: f32,
        heap: &mut BinaryHeap<Candidate>,
    ) {
        let node = &self.nodes[at];
        let axis = depth % 3;
        let delta = pos[axis] - node.photon.position[axis];
        let (near, far) = if delta >= 0.0 { (1, 0) } else { (0, 1) };

        if let Some(child) = node.children[near] {
            self.search(child as usize, depth + 1, pos, normal, params, max_dist2, heap);
        }

        let d2 = search_dist2(node.photon.position - pos, normal, params.disk_flatten);
        if d2 < bound(heap, params.max_photons, max_dist2) {
            heap.push(Candidate { dist2: d2, index: at });
            if heap.len() > params.max_photons {
                heap.pop();
            }
        }

        if let Some(child) = node.children[far] {
            if delta * delta < bound(heap, params.max_photons, max_dist2) {
                self.search(child as usize, depth + 1, pos, normal, params, max_dist2, heap);
            }
        }
    }
}

/// Current pruning distance: the farthest kept photon once the heap is
/// full, the search radius before that.
#[inline]
fn bound(heap: &BinaryHeap<Candidate>, max: usize, max_dist2: f32) -> f32 {
    match heap.peek() {
        Some(top) if heap.len() >= max => top.dist2.min(max_dist2),
        _ => max_dist2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PhotonFilter;
    use crate::util::Color;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn params(max_photons: usize, radius: f32) -> SearchParams {
        SearchParams {
            max_photons,
            search_radius: radius,
            min_photons: 1,
            filter: PhotonFilter::None,
            disk_flatten: 0.0,
        }
    }

    fn random_map(n: usize) -> (IncrementalPhotonMap, Vec<Vec3>) {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut map = IncrementalPhotonMap::with_capacity(4).unwrap();
        let mut points = Vec::new();
        for _ in 0..n {
            let p = Vec3::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
            map.store(Photon::new(p, Color::ONE, -Vec3::Z)).unwrap();
            points.push(p);
        }
        (map, points)
    }

    #[test]
    fn test_grows_past_capacity() {
        let (map, _) = random_map(300);
        assert_eq!(map.len(), 300);
        let all = map.nearest(Vec3::ZERO, Vec3::Z, &params(1000, 100.0));
        assert_eq!(all.indices.len(), 300);
    }

    #[test]
    fn test_matches_brute_force() {
        let (map, points) = random_map(500);
        let query = Vec3::new(0.1, -0.2, 0.3);
        let found = map.nearest(query, Vec3::Z, &params(10, 0.8));

        let mut brute: Vec<(f32, usize)> = points
            .iter()
            .enumerate()
            .map(|(i, p)| ((*p - query).length_squared(), i))
            .filter(|(d, _)| *d < 0.64)
            .collect();
        brute.sort_by(|a, b| a.0.total_cmp(&b.0));
        brute.truncate(10);

        let expected: Vec<usize> = brute.iter().map(|b| b.1).collect();
        assert_eq!(found.indices, expected);
        assert_eq!(found.radius2, brute[9].0);
    }

    #[test]
    fn test_radius_limits_results() {
        let mut map = IncrementalPhotonMap::default();
        map.store(Photon::new(Vec3::ZERO, Color::ONE, -Vec3::Z)).unwrap();
        map.store(Photon::new(Vec3::new(5.0, 0.0, 0.0), Color::ONE, -Vec3::Z)).unwrap();
        let found = map.nearest(Vec3::ZERO, Vec3::Z, &params(4, 1.0));
        assert_eq!(found.indices, vec![0]);
        assert_eq!(found.radius2, 1.0);
    }
}
