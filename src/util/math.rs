//! Math type re-exports and baking-specific math utilities.
//!
//! This module re-exports types from `glam` and provides the small
//! geometric types the baker needs (bounding boxes, planes, integer rects).

pub use glam::{IVec2, Vec2, Vec3};

use bytemuck::{Pod, Zeroable};
use std::fmt;

/// RGB color; one float per channel, no alpha.
pub type Color = Vec3;

/// Epsilon for exact-position comparisons (shared edges, welded points).
pub const SMALL_EPSILON: f32 = 1e-6;

/// Epsilon used by plane classification and UV edge-crossing tests.
pub const LIGHT_EPSILON: f32 = 1e-4;

/// Perceptual luminance of a linear RGB color.
#[inline]
pub fn luminance(c: Color) -> f32 {
    0.2125 * c.x + 0.7154 * c.y + 0.0721 * c.z
}

/// Index (0=x, 1=y, 2=z) of the component with the largest magnitude.
#[inline]
pub fn dominant_axis(v: Vec3) -> usize {
    let a = v.abs();
    if a.x >= a.y && a.x >= a.z {
        0
    } else if a.y >= a.z {
        1
    } else {
        2
    }
}

/// 3D bounding box with single precision.
#[derive(Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct BBox3f {
    pub min: Vec3,
    pub max: Vec3,
}

impl BBox3f {
    /// Empty bounding box (inverted, will expand on first point).
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    /// Check if this box is empty (has no volume).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Expand this box to include a point.
    #[inline]
    pub fn expand_by_point(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Expand this box to include another box.
    #[inline]
    pub fn expand_by_box(&mut self, other: &Self) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Get the center of the box.
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the size (extents) of the box.
    #[inline]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Surface area; zero for empty boxes.
    #[inline]
    pub fn surface_area(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let s = self.size();
        2.0 * (s.x * s.y + s.y * s.z + s.z * s.x)
    }

    /// Axis with the largest extent (ties favour z, then y).
    #[inline]
    pub fn longest_axis(&self) -> usize {
        let s = self.size();
        if s.x > s.y && s.x > s.z {
            0
        } else if s.y > s.z {
            1
        } else {
            2
        }
    }
}

impl Default for BBox3f {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for BBox3f {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BBox3f({:?} - {:?})", self.min, self.max)
    }
}

/// Oriented plane `normal . p + d = 0`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub d: f32,
}

impl Plane {
    /// Plane through `origin` with the given (unit) normal.
    #[inline]
    pub fn from_normal_point(normal: Vec3, origin: Vec3) -> Self {
        Self { normal, d: -normal.dot(origin) }
    }

    /// Plane through three points, counter-clockwise winding gives the
    /// normal. Returns `None` for collinear points.
    pub fn from_points(a: Vec3, b: Vec3, c: Vec3) -> Option<Self> {
        let n = (b - a).cross(c - a);
        let len = n.length();
        if len <= SMALL_EPSILON || !len.is_finite() {
            return None;
        }
        Some(Self::from_normal_point(n / len, a))
    }

    /// Signed distance of `p` (positive on the normal side).
    #[inline]
    pub fn classify(&self, p: Vec3) -> f32 {
        self.normal.dot(p) + self.d
    }

    /// Same plane moved to pass through `origin`.
    #[inline]
    pub fn with_origin(&self, origin: Vec3) -> Self {
        Self::from_normal_point(self.normal, origin)
    }

    /// Plane with reversed orientation.
    #[inline]
    pub fn flipped(&self) -> Self {
        Self { normal: -self.normal, d: -self.d }
    }
}

/// Integer rectangle, `[xmin, xmax) x [ymin, ymax)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub xmin: i32,
    pub ymin: i32,
    pub xmax: i32,
    pub ymax: i32,
}

impl Rect {
    pub const EMPTY: Self = Self { xmin: 0, ymin: 0, xmax: 0, ymax: 0 };

    #[inline]
    pub const fn new(xmin: i32, ymin: i32, xmax: i32, ymax: i32) -> Self {
        Self { xmin, ymin, xmax, ymax }
    }

    #[inline]
    pub fn width(&self) -> i32 {
        self.xmax - self.xmin
    }

    #[inline]
    pub fn height(&self) -> i32 {
        self.ymax - self.ymin
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.xmax <= self.xmin || self.ymax <= self.ymin
    }

    /// Area in texels; zero for empty rects.
    #[inline]
    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width() as i64 * self.height() as i64
        }
    }

    #[inline]
    pub fn intersects(&self, other: &Rect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.xmin < other.xmax
            && other.xmin < self.xmax
            && self.ymin < other.ymax
            && other.ymin < self.ymax
    }

    /// True if `other` lies completely inside this rect.
    #[inline]
    pub fn contains(&self, other: &Rect) -> bool {
        other.xmin >= self.xmin
            && other.ymin >= self.ymin
            && other.xmax <= self.xmax
            && other.ymax <= self.ymax
    }
}
