//! Lightmapped triangle with its element (texel) decomposition.
//!
//! After layout every primitive owns a rectangle of lightmap texels,
//! `[min_uv, max_uv]` inclusive. Each texel is an *element*; its area is the
//! part of the triangle that falls inside the texel footprint. Texel `k`
//! covers lightmap-UV `[k - 0.5, k + 0.5)`, so element centers sit on
//! integer UVs.

use smallvec::SmallVec;

use super::vertex::VertexData;
use crate::util::{clip_loop, Color, IVec2, Plane, Polygon, Vec2, Vec3, LIGHT_EPSILON, SMALL_EPSILON};

/// Position of a primitive relative to a plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaneSide {
    Front,
    Back,
    /// All vertices lie on the plane.
    OnPlane,
    /// Vertices on both sides; a split is needed.
    Straddling,
}

/// Group of elements used as a radiosity shooter.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Patch {
    pub area: f32,
    pub center: Vec3,
    pub energy: Color,
    pub element_count: u32,
}

/// Triangle of an [`Object`](super::Object).
#[derive(Clone, Debug)]
pub struct Primitive {
    /// Indices into the owning object's [`VertexData`].
    pub indices: [usize; 3],
    pub plane: Plane,
    /// World displacement for one texel step in U (V held constant).
    pub u_form: Vec3,
    /// World displacement for one texel step in V (U held constant).
    pub v_form: Vec3,
    /// World position of lightmap-UV `min_uv - 0.5`.
    pub min_coord: Vec3,
    pub min_uv: IVec2,
    pub max_uv: IVec2,
    /// Covered area per element, row-major over `[min_uv, max_uv]`.
    pub element_areas: Vec<f32>,
    pub patches: Vec<Patch>,
    pub patch_resolution: u32,
    /// Atlas the primitive was packed into; `None` if it was dropped.
    pub lightmap: Option<usize>,
    area: f32,
}

impl Primitive {
    /// Build a primitive from three vertex indices. Returns `None` for
    /// degenerate (zero-area) triangles.
    pub fn new(indices: [usize; 3], vertices: &VertexData) -> Option<Self> {
        let [a, b, c] = indices.map(|i| vertices.position(i));
        let plane = Plane::from_points(a, b, c)?;
        let area = (b - a).cross(c - a).length() * 0.5;
        Some(Self {
            indices,
            plane,
            u_form: Vec3::ZERO,
            v_form: Vec3::ZERO,
            min_coord: Vec3::ZERO,
            min_uv: IVec2::ZERO,
            max_uv: IVec2::ZERO,
            element_areas: Vec::new(),
            patches: Vec::new(),
            patch_resolution: 0,
            lightmap: None,
            area,
        })
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.area
    }

    #[inline]
    pub fn normal(&self) -> Vec3 {
        self.plane.normal
    }

    #[inline]
    pub fn positions(&self, vertices: &VertexData) -> [Vec3; 3] {
        self.indices.map(|i| vertices.position(i))
    }

    #[inline]
    pub fn lightmap_uvs(&self, vertices: &VertexData) -> [Vec2; 3] {
        self.indices.map(|i| vertices.lightmap_uv(i))
    }

    pub fn center(&self, vertices: &VertexData) -> Vec3 {
        let [a, b, c] = self.positions(vertices);
        (a + b + c) / 3.0
    }

    /// `(min, max)` of the vertex positions along `axis` (0=x, 1=y, 2=z).
    pub fn extent(&self, axis: usize, vertices: &VertexData) -> (f32, f32) {
        self.positions(vertices)
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), p| (lo.min(p[axis]), hi.max(p[axis])))
    }

    /// Classify against `plane`, treating distances within the light epsilon
    /// as on-plane.
    pub fn classify(&self, plane: &Plane, vertices: &VertexData) -> PlaneSide {
        let mut front = false;
        let mut back = false;
        for p in self.positions(vertices) {
            let d = plane.classify(p);
            if d > LIGHT_EPSILON {
                front = true;
            } else if d < -LIGHT_EPSILON {
                back = true;
            }
        }
        match (front, back) {
            (true, true) => PlaneSide::Straddling,
            (true, false) => PlaneSide::Front,
            (false, true) => PlaneSide::Back,
            (false, false) => PlaneSide::OnPlane,
        }
    }

    /// Split by `plane` into (front pieces, back pieces).
    ///
    /// Intersection vertices are appended to `vertices`; the pieces keep this
    /// primitive's plane, form vectors and lightmap assignment. Element data
    /// is not carried over and must be rebuilt with [`Primitive::prepare`].
    pub fn split(
        &self,
        plane: &Plane,
        vertices: &mut VertexData,
    ) -> (SmallVec<[Primitive; 2]>, SmallVec<[Primitive; 2]>) {
        let distances = self.positions(vertices).map(|p| plane.classify(p));
        let (front_loop, back_loop) = clip_loop(&distances, LIGHT_EPSILON);

        let mut crossings: SmallVec<[((usize, usize), usize); 2]> = SmallVec::new();
        let mut resolve = |loop_: &crate::util::ClipLoop, vertices: &mut VertexData| {
            let mut out: SmallVec<[usize; 4]> = SmallVec::new();
            for c in loop_ {
                if c.t == 0.0 {
                    out.push(self.indices[c.a]);
                    continue;
                }
                let key = (c.a, c.b);
                let index = match crossings.iter().find(|(k, _)| *k == key) {
                    Some(&(_, index)) => index,
                    None => {
                        let v = vertices.vertices[self.indices[c.a]]
                            .lerp(&vertices.vertices[self.indices[c.b]], c.t);
                        let index = vertices.push(v);
                        crossings.push((key, index));
                        index
                    }
                };
                out.push(index);
            }
            out
        };
        let front_idx = resolve(&front_loop, vertices);
        let back_idx = resolve(&back_loop, vertices);
        (self.fan(&front_idx, vertices), self.fan(&back_idx, vertices))
    }

    fn fan(&self, loop_: &[usize], vertices: &VertexData) -> SmallVec<[Primitive; 2]> {
        let mut out = SmallVec::new();
        for k in 1..loop_.len().saturating_sub(1) {
            let indices = [loop_[0], loop_[k], loop_[k + 1]];
            let [a, b, c] = indices.map(|i| vertices.position(i));
            let area = (b - a).cross(c - a).length() * 0.5;
            if area <= SMALL_EPSILON {
                continue;
            }
            out.push(Primitive {
                indices,
                area,
                element_areas: Vec::new(),
                patches: Vec::new(),
                ..self.clone()
            });
        }
        out
    }

    /// Derive the UV-to-world form vectors from the lightmap UVs.
    ///
    /// For every vertex, the longest segment to the opposite edge along a
    /// line of constant U yields the V form vector (and constant V the U form
    /// vector). An axis with no usable crossing leaves its vector zero and
    /// the method returns `false`.
    pub fn compute_uv_transform(&mut self, vertices: &VertexData) -> bool {
        let pos = self.positions(vertices);
        let uv = self.lightmap_uvs(vertices);

        // (distance, from 3d, to 3d, from 2d, to 2d)
        let mut best_u: Option<(f32, Vec3, Vec3, Vec2, Vec2)> = None;
        let mut best_v: Option<(f32, Vec3, Vec3, Vec2, Vec2)> = None;

        for i in 0..3 {
            let (e0, e1) = ((i + 1) % 3, (i + 2) % 3);
            let c = uv[i];
            let (p0, p1) = (pos[e0], pos[e1]);
            let (t0, t1) = (uv[e0], uv[e1]);

            // Same U: a segment along V.
            if let Some(t) = edge_crossing(t0.x, t1.x, c.x) {
                let to3 = p0.lerp(p1, t);
                let to2 = t0.lerp(t1, t);
                let dist = pos[i].distance(to3);
                if best_u.map_or(true, |b| dist > b.0) {
                    best_u = Some((dist, pos[i], to3, c, to2));
                }
            }
            // Same V: a segment along U.
            if let Some(t) = edge_crossing(t0.y, t1.y, c.y) {
                let to3 = p0.lerp(p1, t);
                let to2 = t0.lerp(t1, t);
                let dist = pos[i].distance(to3);
                if best_v.map_or(true, |b| dist > b.0) {
                    best_v = Some((dist, pos[i], to3, c, to2));
                }
            }
        }

        self.v_form = Vec3::ZERO;
        self.u_form = Vec3::ZERO;
        if let Some((dist, from3, to3, from2, to2)) = best_u {
            let dv = to2.y - from2.y;
            if dist > 0.0 && dv.abs() > SMALL_EPSILON {
                self.v_form = (to3 - from3) / dv;
            }
        }
        if let Some((dist, from3, to3, from2, to2)) = best_v {
            let du = to2.x - from2.x;
            if dist > 0.0 && du.abs() > SMALL_EPSILON {
                self.u_form = (to3 - from3) / du;
            }
        }
        self.u_form != Vec3::ZERO && self.v_form != Vec3::ZERO
    }

    /// Texel rectangle touched by the lightmap UVs, inclusive on both ends.
    pub fn compute_min_max_uv(&mut self, vertices: &VertexData) {
        let uv = self.lightmap_uvs(vertices);
        let lo = uv[0].min(uv[1]).min(uv[2]);
        let hi = uv[0].max(uv[1]).max(uv[2]);
        self.min_uv = (lo + 0.5).floor().as_ivec2();
        self.max_uv = ((hi + 0.5).ceil() - 1.0).as_ivec2().max(self.min_uv);
    }

    /// Compute form vectors, element areas and (optionally) patches.
    ///
    /// The triangle is sliced into rows along V and then into cells along U;
    /// the last row and the last cell take whatever remains. Returns `false`
    /// for primitives whose UV mapping is degenerate; they end up with no
    /// elements.
    pub fn prepare(
        &mut self,
        vertices: &VertexData,
        patch_resolution: Option<u32>,
        illumination: Color,
    ) -> bool {
        self.element_areas.clear();
        self.patches.clear();
        if !self.compute_uv_transform(vertices) {
            return false;
        }
        self.compute_min_max_uv(vertices);

        let uv0 = vertices.lightmap_uv(self.indices[0]);
        let corner = self.min_uv.as_vec2() - 0.5 - uv0;
        self.min_coord = vertices.position(self.indices[0]) + self.u_form * corner.x + self.v_form * corner.y;

        let centroid = self.center(vertices);
        let u_cut = self.cut_plane(self.v_form, centroid);
        let v_cut = self.cut_plane(self.u_form, centroid);
        let (count_u, count_v) = (self.count_u(), self.count_v());
        self.element_areas.reserve(count_u * count_v);

        let mut rest = Polygon::from_slice(&self.positions(vertices));
        for v in 0..count_v {
            let row = if v + 1 < count_v {
                let cut = v_cut.with_origin(self.min_coord + self.v_form * (v + 1) as f32);
                let (ahead, row) = rest.split(&cut, LIGHT_EPSILON);
                rest = ahead;
                row
            } else {
                std::mem::take(&mut rest)
            };

            let mut row_rest = row;
            for u in 0..count_u {
                let cell = if u + 1 < count_u {
                    let cut = u_cut.with_origin(self.min_coord + self.u_form * (u + 1) as f32);
                    let (ahead, cell) = row_rest.split(&cut, LIGHT_EPSILON);
                    row_rest = ahead;
                    cell
                } else {
                    std::mem::take(&mut row_rest)
                };
                self.element_areas.push(cell.area());
            }
        }

        if let Some(res) = patch_resolution {
            self.build_patches(res.max(1), illumination);
        }
        true
    }

    /// In-plane cut plane containing `along` and the primitive normal,
    /// oriented so the centroid is on its positive side.
    fn cut_plane(&self, along: Vec3, centroid: Vec3) -> Plane {
        let normal = self.plane.normal.cross(along).normalize_or_zero();
        let plane = Plane::from_normal_point(normal, self.min_coord);
        if plane.classify(centroid) < 0.0 {
            plane.flipped()
        } else {
            plane
        }
    }

    fn build_patches(&mut self, res: u32, illumination: Color) {
        let res = res as usize;
        let (count_u, count_v) = (self.count_u(), self.count_v());
        let patches_u = count_u.div_ceil(res);
        let patches_v = count_v.div_ceil(res);
        self.patch_resolution = res as u32;
        self.patches = vec![Patch::default(); patches_u * patches_v];

        for index in 0..self.element_areas.len() {
            let area = self.element_areas[index];
            if area <= 0.0 {
                continue;
            }
            let (u, v) = self.element_uv(index);
            let center = self.element_center(index);
            let patch = &mut self.patches[(v / res) * patches_u + u / res];
            patch.area += area;
            patch.center += center;
            patch.element_count += 1;
        }

        let prim_area = self.area;
        for patch in &mut self.patches {
            if patch.element_count > 0 {
                patch.center /= patch.element_count as f32;
            }
            patch.energy = illumination * (patch.area / prim_area);
        }
    }

    #[inline]
    pub fn count_u(&self) -> usize {
        (self.max_uv.x - self.min_uv.x + 1).max(0) as usize
    }

    #[inline]
    pub fn count_v(&self) -> usize {
        (self.max_uv.y - self.min_uv.y + 1).max(0) as usize
    }

    #[inline]
    pub fn element_count(&self) -> usize {
        self.element_areas.len()
    }

    /// Local (u, v) of an element.
    #[inline]
    pub fn element_uv(&self, index: usize) -> (usize, usize) {
        let cu = self.count_u().max(1);
        (index % cu, index / cu)
    }

    /// Element index for local (u, v).
    #[inline]
    pub fn element_index(&self, u: usize, v: usize) -> usize {
        v * self.count_u() + u
    }

    /// Lightmap texel of an element.
    #[inline]
    pub fn element_texel(&self, index: usize) -> IVec2 {
        let (u, v) = self.element_uv(index);
        self.min_uv + IVec2::new(u as i32, v as i32)
    }

    /// World-space center of an element's texel footprint.
    #[inline]
    pub fn element_center(&self, index: usize) -> Vec3 {
        let (u, v) = self.element_uv(index);
        self.min_coord + self.u_form * (u as f32 + 0.5) + self.v_form * (v as f32 + 0.5)
    }

    /// World area of one whole texel on this primitive.
    #[inline]
    pub fn texel_area(&self) -> f32 {
        self.u_form.cross(self.v_form).length()
    }

    /// Fraction of the element's texel covered by the primitive.
    pub fn element_fraction(&self, index: usize) -> f32 {
        let texel = self.texel_area();
        if texel <= 0.0 {
            return 0.0;
        }
        (self.element_areas[index] / texel).min(1.0)
    }

    /// Patch owning an element.
    pub fn element_patch(&self, index: usize) -> Option<usize> {
        if self.patches.is_empty() {
            return None;
        }
        let res = self.patch_resolution.max(1) as usize;
        let (u, v) = self.element_uv(index);
        let patches_u = self.count_u().div_ceil(res);
        Some((v / res) * patches_u + u / res)
    }
}

/// Parameter along `a -> b` where the edge crosses `c`, within the light
/// epsilon. `None` if the edge does not reach `c` or has no extent.
fn edge_crossing(a: f32, b: f32, c: f32) -> Option<f32> {
    let inside = (a - LIGHT_EPSILON <= c && c <= b + LIGHT_EPSILON)
        || (b - LIGHT_EPSILON <= c && c <= a + LIGHT_EPSILON);
    let span = b - a;
    if !inside || span.abs() <= SMALL_EPSILON {
        return None;
    }
    Some(((c - a) / span).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Vertex;

    /// Triangle in the z=0 plane with lightmap UVs `pos.xy * density`.
    fn planar(points: [[f32; 2]; 3], density: f32) -> (VertexData, Primitive) {
        let verts = points
            .iter()
            .map(|p| Vertex {
                position: Vec3::new(p[0], p[1], 0.0),
                normal: Vec3::Z,
                lightmap_uv: Vec2::new(p[0], p[1]) * density,
                ..Default::default()
            })
            .collect();
        let vd = VertexData::new(verts);
        let prim = Primitive::new([0, 1, 2], &vd).unwrap();
        (vd, prim)
    }

    #[test]
    fn test_extent() {
        let (vd, prim) = planar([[0.0, -1.0], [3.0, 0.0], [1.0, 2.0]], 1.0);
        assert_eq!(prim.extent(0, &vd), (0.0, 3.0));
        assert_eq!(prim.extent(1, &vd), (-1.0, 2.0));
        assert_eq!(prim.extent(2, &vd), (0.0, 0.0));
    }

    #[test]
    fn test_degenerate_rejected() {
        let vd = VertexData::new(vec![
            Vertex::new(Vec3::ZERO, Vec3::Z),
            Vertex::new(Vec3::X, Vec3::Z),
            Vertex::new(Vec3::X * 2.0, Vec3::Z),
        ]);
        assert!(Primitive::new([0, 1, 2], &vd).is_none());
    }

    #[test]
    fn test_uv_transform_axis_aligned() {
        let (vd, mut prim) = planar([[0.0, 0.0], [2.0, 0.0], [2.0, 2.0]], 2.0);
        assert!(prim.compute_uv_transform(&vd));
        assert!((prim.u_form - Vec3::new(0.5, 0.0, 0.0)).length() < 1e-5);
        assert!((prim.v_form - Vec3::new(0.0, 0.5, 0.0)).length() < 1e-5);
        assert!((prim.texel_area() - 0.25).abs() < 1e-5);
    }

    #[test]
    fn test_uv_transform_idempotent() {
        // Tilted triangle with sheared lightmap UVs.
        let points = [Vec3::new(0.0, 0.0, 0.0), Vec3::new(2.0, 0.0, 1.0), Vec3::new(0.5, 2.0, 0.5)];
        let verts = points
            .iter()
            .map(|p| Vertex {
                position: *p,
                normal: Vec3::Z,
                lightmap_uv: Vec2::new(p.x + 0.5 * p.y, p.y) * 2.0,
                ..Default::default()
            })
            .collect();
        let vd = VertexData::new(verts);
        let mut prim = Primitive::new([0, 1, 2], &vd).unwrap();

        assert!(prim.compute_uv_transform(&vd));
        let (u_form, v_form) = (prim.u_form, prim.v_form);
        assert!(prim.compute_uv_transform(&vd));
        assert_eq!(prim.u_form, u_form);
        assert_eq!(prim.v_form, v_form);

        // The forms map UV offsets back onto the triangle.
        let uv0 = vd.lightmap_uv(0);
        for i in 1..3 {
            let d = vd.lightmap_uv(i) - uv0;
            let p = points[0] + u_form * d.x + v_form * d.y;
            assert!((p - points[i]).length() < 1e-4, "{p:?} vs {:?}", points[i]);
        }

        assert!(prim.prepare(&vd, None, Color::ZERO));
        let origin = prim.min_coord;
        assert!(prim.prepare(&vd, None, Color::ZERO));
        assert_eq!(prim.min_coord, origin);
        assert_eq!(prim.u_form, u_form);
        assert_eq!(prim.v_form, v_form);
    }

    #[test]
    fn test_element_areas_sum_to_area() {
        let (vd, mut prim) = planar([[0.0, 0.0], [2.0, 0.0], [2.0, 2.0]], 1.0);
        assert!(prim.prepare(&vd, None, Color::ZERO));
        assert_eq!(prim.min_uv, IVec2::new(0, 0));
        assert_eq!(prim.max_uv, IVec2::new(2, 2));
        assert_eq!(prim.element_count(), 9);
        let sum: f32 = prim.element_areas.iter().sum();
        assert!((sum - prim.area()).abs() < 1e-4, "sum {sum} vs {}", prim.area());
        assert!(prim.element_areas.iter().all(|&a| a >= 0.0));
    }

    #[test]
    fn test_element_areas_skewed_triangle() {
        let (vd, mut prim) = planar([[0.3, 0.1], [5.7, 1.9], [2.2, 4.4]], 1.0);
        assert!(prim.prepare(&vd, None, Color::ZERO));
        let sum: f32 = prim.element_areas.iter().sum();
        assert!((sum - prim.area()).abs() < 1e-3);
        for i in 0..prim.element_count() {
            assert!(prim.element_fraction(i) <= 1.0);
        }
    }

    #[test]
    fn test_element_center_on_integer_uv() {
        let (vd, mut prim) = planar([[0.0, 0.0], [4.0, 0.0], [4.0, 4.0]], 1.0);
        prim.prepare(&vd, None, Color::ZERO);
        let index = prim.element_index(3, 1);
        assert_eq!(prim.element_texel(index), IVec2::new(3, 1));
        assert!((prim.element_center(index) - Vec3::new(3.0, 1.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_full_texel_fraction() {
        let (vd, mut prim) = planar([[0.0, 0.0], [8.0, 0.0], [8.0, 8.0]], 1.0);
        prim.prepare(&vd, None, Color::ZERO);
        // Texel (6, 1) is well inside the triangle.
        let index = prim.element_index(6, 1);
        assert!((prim.element_fraction(index) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_patches_cover_area() {
        let (vd, mut prim) = planar([[0.0, 0.0], [4.0, 0.0], [4.0, 4.0]], 1.0);
        prim.prepare(&vd, Some(2), Color::ONE);
        assert_eq!(prim.patches.len(), 9);
        let area: f32 = prim.patches.iter().map(|p| p.area).sum();
        assert!((area - prim.area()).abs() < 1e-4);
        let energy: f32 = prim.patches.iter().map(|p| p.energy.x).sum();
        assert!((energy - 1.0).abs() < 1e-4);
        assert_eq!(prim.element_patch(prim.element_index(3, 3)), Some(4));
    }

    #[test]
    fn test_classify_and_split() {
        let (mut vd, prim) = planar([[0.0, 0.0], [2.0, 0.0], [2.0, 2.0]], 1.0);
        let plane = Plane::from_normal_point(Vec3::X, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(prim.classify(&plane, &vd), PlaneSide::Straddling);

        let (front, back) = prim.split(&plane, &mut vd);
        let front_area: f32 = front.iter().map(|p| p.area()).sum();
        let back_area: f32 = back.iter().map(|p| p.area()).sum();
        assert!((front_area + back_area - prim.area()).abs() < 1e-5);
        assert!((back_area - 0.5).abs() < 1e-5);
        // Two crossing vertices shared by both sides.
        assert_eq!(vd.len(), 5);
        for piece in front.iter().chain(back.iter()) {
            assert_eq!(piece.plane, prim.plane);
            for &i in &piece.indices {
                let v = &vd.vertices[i];
                assert!((v.lightmap_uv - v.position.truncate()).length() < 1e-5);
            }
        }
    }

    #[test]
    fn test_split_vertex_on_plane() {
        let (mut vd, prim) = planar([[0.0, 0.0], [2.0, 0.0], [2.0, 2.0]], 1.0);
        let plane = Plane::from_normal_point(Vec3::X, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(prim.classify(&plane, &vd), PlaneSide::Back);
        let (front, back) = prim.split(&plane, &mut vd);
        assert!(front.is_empty());
        assert_eq!(back.len(), 1);
        assert_eq!(vd.len(), 3);
    }
}
