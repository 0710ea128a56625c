//! Convex polygon clipping against planes.

use smallvec::SmallVec;

use super::math::{Plane, Vec3};

/// Vertex of a clipped polygon expressed as `lerp(src[a], src[b], t)`.
///
/// `t == 0` means the vertex is `src[a]` unchanged.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClipVertex {
    pub a: usize,
    pub b: usize,
    pub t: f32,
}

/// Output of clipping a polygon loop by a plane.
pub type ClipLoop = SmallVec<[ClipVertex; 8]>;

/// Split a polygon loop, given the signed distances of its vertices to the
/// splitting plane, into the part on the positive side and the part on the
/// negative side.
///
/// Distances within `epsilon` of zero count as lying on the plane, and such
/// vertices are emitted into both sides. A side with fewer than three
/// vertices comes back empty.
pub fn clip_loop(distances: &[f32], epsilon: f32) -> (ClipLoop, ClipLoop) {
    let n = distances.len();
    let mut front = ClipLoop::new();
    let mut back = ClipLoop::new();
    let snap = |d: f32| if d.abs() < epsilon { 0.0 } else { d };

    for i in 0..n {
        let j = (i + 1) % n;
        let da = snap(distances[i]);
        let db = snap(distances[j]);
        let here = ClipVertex { a: i, b: i, t: 0.0 };
        if da >= 0.0 {
            front.push(here);
        }
        if da <= 0.0 {
            back.push(here);
        }
        if (da > 0.0 && db < 0.0) || (da < 0.0 && db > 0.0) {
            let cross = ClipVertex { a: i, b: j, t: da / (da - db) };
            front.push(cross);
            back.push(cross);
        }
    }

    if front.len() < 3 {
        front.clear();
    }
    if back.len() < 3 {
        back.clear();
    }
    (front, back)
}

/// Convex 3D polygon.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Polygon {
    pub verts: SmallVec<[Vec3; 8]>,
}

impl Polygon {
    pub fn from_slice(verts: &[Vec3]) -> Self {
        Self { verts: SmallVec::from_slice(verts) }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.verts.len() < 3
    }

    /// Surface area (fan triangulation, valid for convex polygons).
    pub fn area(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let v0 = self.verts[0];
        let mut n = Vec3::ZERO;
        for w in self.verts[1..].windows(2) {
            n += (w[0] - v0).cross(w[1] - v0);
        }
        n.length() * 0.5
    }

    /// Vertex average.
    pub fn center(&self) -> Vec3 {
        if self.verts.is_empty() {
            return Vec3::ZERO;
        }
        self.verts.iter().copied().sum::<Vec3>() / self.verts.len() as f32
    }

    /// Split by `plane` into (positive side, negative side).
    pub fn split(&self, plane: &Plane, epsilon: f32) -> (Polygon, Polygon) {
        let distances: SmallVec<[f32; 8]> = self.verts.iter().map(|&p| plane.classify(p)).collect();
        let (front, back) = clip_loop(&distances, epsilon);
        (self.resolve(&front), self.resolve(&back))
    }

    fn resolve(&self, clipped: &ClipLoop) -> Polygon {
        let verts = clipped
            .iter()
            .map(|c| self.verts[c.a].lerp(self.verts[c.b], c.t))
            .collect();
        Polygon { verts }
    }
}
