//! Irradiance cache for final gathering.
//!
//! Each gathered result is stored together with the harmonic mean distance
//! `R` of the surfaces its rays hit. A query at `p` with normal `n` blends
//! every sample whose weight
//!
//! `w = 1 / (|p - p_i| / R_i + sqrt(1 - n . n_i))`
//!
//! exceeds `1 / tolerance`. Samples live in a loose octree over the photon
//! map bounds, each in the deepest node that is still no smaller than the
//! sample's reach `tolerance * R`.

use smallvec::SmallVec;

use crate::util::{BBox3f, Color, Vec3, SMALL_EPSILON};

const MAX_DEPTH: u32 = 16;

/// One cached gather result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheSample {
    pub position: Vec3,
    pub normal: Vec3,
    pub irradiance: Color,
    /// Harmonic mean distance to the surfaces seen by the gather rays.
    pub mean_distance: f32,
}

#[derive(Debug, Clone)]
struct Node {
    center: Vec3,
    half: f32,
    /// Child node indices, 0 when absent (the root is never a child).
    children: [u32; 8],
    samples: Vec<u32>,
}

impl Node {
    fn new(center: Vec3, half: f32) -> Self {
        Self { center, half, children: [0; 8], samples: Vec::new() }
    }

    #[inline]
    fn contains(&self, p: Vec3, scale: f32) -> bool {
        (p - self.center).abs().max_element() <= self.half * scale
    }

    #[inline]
    fn octant(&self, p: Vec3) -> usize {
        (p.x >= self.center.x) as usize | ((p.y >= self.center.y) as usize) << 1 | ((p.z >= self.center.z) as usize) << 2
    }
}

/// Cache of final-gather irradiance samples.
#[derive(Debug, Clone)]
pub struct IrradianceCache {
    tolerance: f32,
    nodes: Vec<Node>,
    samples: Vec<CacheSample>,
}

impl IrradianceCache {
    /// Empty cache covering `bounds`. Samples outside still work, they just
    /// stay at the root.
    pub fn new(bounds: BBox3f, tolerance: f32) -> Self {
        let (center, half) = if bounds.is_empty() {
            (Vec3::ZERO, 1.0)
        } else {
            (bounds.center(), (bounds.size().max_element() * 0.5).max(SMALL_EPSILON))
        };
        Self { tolerance, nodes: vec![Node::new(center, half)], samples: Vec::new() }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    pub fn samples(&self) -> &[CacheSample] {
        &self.samples
    }

    /// Weight of `sample` for a query, or `None` if it is out of reach.
    fn weight(&self, sample: &CacheSample, pos: Vec3, normal: Vec3) -> Option<f32> {
        let error = (pos - sample.position).length() / sample.mean_distance
            + (1.0 - sample.normal.dot(normal)).max(0.0).sqrt();
        let w = 1.0 / error.max(SMALL_EPSILON);
        (w > 1.0 / self.tolerance).then_some(w)
    }

    /// Weighted blend of the samples valid at `pos`, if there are any.
    pub fn estimate(&self, pos: Vec3, normal: Vec3) -> Option<Color> {
        let mut sum = Color::ZERO;
        let mut total = 0.0;
        let mut stack: SmallVec<[u32; 32]> = SmallVec::new();
        stack.push(0);

        while let Some(index) = stack.pop() {
            let node = &self.nodes[index as usize];
            // The root also holds samples from outside the bounds.
            if index != 0 && !node.contains(pos, 2.0) {
                continue;
            }
            for &s in &node.samples {
                let sample = &self.samples[s as usize];
                if let Some(w) = self.weight(sample, pos, normal) {
                    sum += sample.irradiance * w;
                    total += w;
                }
            }
            stack.extend(node.children.iter().copied().filter(|&c| c != 0));
        }
        (total > 0.0).then(|| sum / total)
    }

    /// Add a gather result. Samples without a finite positive mean distance
    /// are ignored.
    pub fn store(&mut self, position: Vec3, normal: Vec3, irradiance: Color, mean_distance: f32) {
        if !(mean_distance > 0.0) || !mean_distance.is_finite() {
            return;
        }
        let reach = self.tolerance * mean_distance;
        let mut index = 0usize;
        let mut depth = 0;

        if self.nodes[0].contains(position, 1.0) {
            loop {
                let node = &self.nodes[index];
                let half = node.half * 0.5;
                if depth >= MAX_DEPTH || half < reach {
                    break;
                }
                let center = node.center;
                let octant = node.octant(position);
                let child = node.children[octant];
                index = if child != 0 {
                    child as usize
                } else {
                    let offset = Vec3::new(
                        if octant & 1 != 0 { half } else { -half },
                        if octant & 2 != 0 { half } else { -half },
                        if octant & 4 != 0 { half } else { -half },
                    );
                    let created = self.nodes.len();
                    self.nodes.push(Node::new(center + offset, half));
                    self.nodes[index].children[octant] = created as u32;
                    created
                };
                depth += 1;
            }
        }

        let id = self.samples.len() as u32;
        self.samples.push(CacheSample { position, normal, irradiance, mean_distance });
        self.nodes[index].samples.push(id);
    }
}
