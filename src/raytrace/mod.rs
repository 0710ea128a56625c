//! Ray casting collaborator.
//!
//! The lighting stages only see the [`RayTracer`] trait. [`BvhTracer`] is the
//! bundled implementation over a sector's triangles.

mod build;
mod bvh;

pub use build::{build_bvh, Bvh};
pub use bvh::{BvhNode, BvhTracer, Triangle};

use crate::scene::PrimitiveRef;
use crate::util::Vec3;

/// Offset applied to ray origins to step off the emitting surface.
pub const RAY_EPSILON: f32 = 1e-3;

/// Ray with a parametric extent `[min_t, max_t]`.
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: Vec3,
    /// Unit direction.
    pub direction: Vec3,
    pub min_t: f32,
    pub max_t: f32,
    /// Primitive the ray must never report (usually its origin surface).
    pub ignore: Option<PrimitiveRef>,
}

impl Ray {
    /// Unbounded ray. `direction` must be normalized.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction, min_t: RAY_EPSILON, max_t: f32::INFINITY, ignore: None }
    }

    /// Ray from `from` that stops just short of `to`.
    pub fn segment(from: Vec3, to: Vec3) -> Self {
        let delta = to - from;
        let len = delta.length();
        let direction = if len > 0.0 { delta / len } else { Vec3::Z };
        Self { origin: from, direction, min_t: RAY_EPSILON, max_t: (len - RAY_EPSILON).max(0.0), ignore: None }
    }

    #[inline]
    pub fn ignoring(mut self, prim: PrimitiveRef) -> Self {
        self.ignore = Some(prim);
        self
    }

    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Closest intersection along a ray.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HitPoint {
    pub primitive: PrimitiveRef,
    pub point: Vec3,
    pub distance: f32,
}

/// Scene query interface used by every lighting stage.
pub trait RayTracer: Sync {
    /// Nearest hit inside the ray extent.
    fn trace_closest_hit(&self, ray: &Ray) -> Option<HitPoint>;

    /// True if anything blocks the ray extent.
    fn trace_any_hit(&self, ray: &Ray) -> bool {
        self.trace_closest_hit(ray).is_some()
    }
}
