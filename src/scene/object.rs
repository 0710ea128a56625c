//! Lightmapped mesh object.

use super::primitive::Primitive;
use super::vertex::{Vertex, VertexData};
use crate::util::{Color, Vec2};

/// Mesh with its own vertex pool and triangle list.
#[derive(Clone, Debug)]
pub struct Object {
    pub name: String,
    pub vertices: VertexData,
    pub primitives: Vec<Primitive>,
    /// Diffuse reflectance used when photons bounce off this object.
    pub reflectance: Color,
    /// Self-illumination used to seed radiosity patches.
    pub illumination: Color,
    /// Object takes no lightmap (still casts shadows).
    pub no_light: bool,
    /// Light the vertices instead of packing a lightmap.
    pub light_per_vertex: bool,
    /// Direct light per vertex, filled for `light_per_vertex` objects.
    pub lit_colors: Vec<Color>,
}

impl Object {
    /// Build an object from a vertex list and triangle indices.
    ///
    /// Degenerate triangles are dropped; the count of dropped triangles is
    /// returned alongside the object.
    pub fn from_triangles(name: impl Into<String>, vertices: Vec<Vertex>, triangles: &[[usize; 3]]) -> (Self, usize) {
        let vertices = VertexData::new(vertices);
        let primitives: Vec<Primitive> = triangles
            .iter()
            .filter_map(|&tri| Primitive::new(tri, &vertices))
            .collect();
        let dropped = triangles.len() - primitives.len();
        if dropped > 0 {
            tracing::debug!(dropped, "skipped degenerate triangles");
        }
        let object = Self {
            name: name.into(),
            vertices,
            primitives,
            reflectance: Color::splat(0.7),
            illumination: Color::ZERO,
            no_light: false,
            light_per_vertex: false,
            lit_colors: Vec::new(),
        };
        (object, dropped)
    }

    /// Lightmap UVs normalized to `[0, 1]` for the atlas sizes given as
    /// `(width, height)` per atlas, texel centers at `(k + 0.5) / size`.
    ///
    /// Vertices not used by a packed primitive keep `(0, 0)`.
    pub fn normalized_lightmap_uvs(&self, atlas_sizes: &[(u32, u32)]) -> Vec<Vec2> {
        let mut out = vec![Vec2::ZERO; self.vertices.len()];
        for prim in &self.primitives {
            let Some((w, h)) = prim.lightmap.and_then(|a| atlas_sizes.get(a).copied()) else {
                continue;
            };
            let size = Vec2::new(w.max(1) as f32, h.max(1) as f32);
            for &i in &prim.indices {
                out[i] = (self.vertices.lightmap_uv(i) + 0.5) / size;
            }
        }
        out
    }
}
