//! BVH nodes, triangles and the traversal-based tracer.

use super::build::{build_bvh, Bvh};
use super::{HitPoint, Ray, RayTracer};
use crate::scene::{PrimitiveRef, Sector};
use crate::util::{BBox3f, Vec3};

/// Flat BVH node.
///
/// Internal node: `left_or_first` = left child index (right is `+1`), `count` = 0.
/// Leaf node: `left_or_first` = first entry in `tri_indices`, `count` > 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct BvhNode {
    pub bounds: BBox3f,
    pub left_or_first: u32,
    pub count: u32,
}

impl BvhNode {
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.count > 0
    }
}

/// World-space triangle tagged with the primitive it came from.
#[derive(Debug, Clone)]
pub struct Triangle {
    pub v0: Vec3,
    pub v1: Vec3,
    pub v2: Vec3,
    pub primitive: PrimitiveRef,
}

impl Triangle {
    pub fn bounds(&self) -> BBox3f {
        let mut b = BBox3f::EMPTY;
        b.expand_by_point(self.v0);
        b.expand_by_point(self.v1);
        b.expand_by_point(self.v2);
        b
    }

    pub fn centroid(&self) -> Vec3 {
        (self.v0 + self.v1 + self.v2) / 3.0
    }

    /// Double-sided Moller-Trumbore test; returns the hit distance.
    #[inline]
    pub fn intersect(&self, ray: &Ray, max_t: f32) -> Option<f32> {
        let e1 = self.v1 - self.v0;
        let e2 = self.v2 - self.v0;
        let p = ray.direction.cross(e2);
        let det = e1.dot(p);
        if det.abs() < 1e-12 {
            return None;
        }
        let inv = 1.0 / det;
        let s = ray.origin - self.v0;
        let u = s.dot(p) * inv;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let q = s.cross(e1);
        let v = ray.direction.dot(q) * inv;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = e2.dot(q) * inv;
        (t > ray.min_t && t < max_t).then_some(t)
    }
}

/// Slab test; entry distance if the box is hit before `max_t`.
#[inline]
fn hit_bounds(b: &BBox3f, origin: Vec3, inv_dir: Vec3, max_t: f32) -> Option<f32> {
    let t1 = (b.min - origin) * inv_dir;
    let t2 = (b.max - origin) * inv_dir;
    let near = t1.min(t2).max_element().max(0.0);
    let far = t1.max(t2).min_element();
    (near <= far && near < max_t).then_some(near)
}

/// Reference [`RayTracer`] over a sector's triangles.
pub struct BvhTracer {
    triangles: Vec<Triangle>,
    bvh: Bvh,
}

impl BvhTracer {
    pub fn new(triangles: Vec<Triangle>) -> Self {
        let bvh = build_bvh(&triangles);
        Self { triangles, bvh }
    }

    /// Collect every primitive of the sector, lightmapped or not.
    pub fn from_sector(sector: &Sector) -> Self {
        let mut triangles = Vec::with_capacity(sector.primitive_count());
        for (o, object) in sector.objects.iter().enumerate() {
            for (p, prim) in object.primitives.iter().enumerate() {
                let [v0, v1, v2] = prim.positions(&object.vertices);
                triangles.push(Triangle { v0, v1, v2, primitive: PrimitiveRef::new(o, p) });
            }
        }
        Self::new(triangles)
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Walk the tree; `any` stops at the first accepted hit.
    fn traverse(&self, ray: &Ray, any: bool) -> Option<HitPoint> {
        if self.triangles.is_empty() {
            return None;
        }
        let inv_dir = ray.direction.recip();
        let mut best: Option<(f32, usize)> = None;
        let mut max_t = ray.max_t;
        let mut stack: Vec<u32> = Vec::with_capacity(64);
        stack.push(0);

        while let Some(index) = stack.pop() {
            let node = &self.bvh.nodes[index as usize];
            if hit_bounds(&node.bounds, ray.origin, inv_dir, max_t).is_none() {
                continue;
            }
            if !node.is_leaf() {
                stack.push(node.left_or_first + 1);
                stack.push(node.left_or_first);
                continue;
            }
            let first = node.left_or_first as usize;
            for &tri_index in &self.bvh.tri_indices[first..first + node.count as usize] {
                let tri = &self.triangles[tri_index];
                if ray.ignore == Some(tri.primitive) {
                    continue;
                }
                if let Some(t) = tri.intersect(ray, max_t) {
                    max_t = t;
                    best = Some((t, tri_index));
                    if any {
                        stack.clear();
                        break;
                    }
                }
            }
        }

        best.map(|(t, i)| HitPoint { primitive: self.triangles[i].primitive, point: ray.at(t), distance: t })
    }
}

impl RayTracer for BvhTracer {
    fn trace_closest_hit(&self, ray: &Ray) -> Option<HitPoint> {
        self.traverse(ray, false)
    }

    fn trace_any_hit(&self, ray: &Ray) -> bool {
        self.traverse(ray, true).is_some()
    }
}
