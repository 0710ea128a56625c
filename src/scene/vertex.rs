//! Per-object vertex storage.

use crate::util::{Vec2, Vec3};

/// Vertex of a lightmapped mesh.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    /// Texture UV, carried through splits untouched.
    pub uv: Vec2,
    /// Lightmap UV in texels. Written by the layout stage.
    pub lightmap_uv: Vec2,
    /// Opaque per-vertex payload owned by the caller.
    pub extra: Option<u32>,
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3) -> Self {
        Self { position, normal, ..Default::default() }
    }

    /// Attribute-wise interpolation; interpolated vertices carry no payload.
    pub fn lerp(&self, other: &Vertex, t: f32) -> Vertex {
        if t == 0.0 {
            return *self;
        }
        Vertex {
            position: self.position.lerp(other.position, t),
            normal: self.normal.lerp(other.normal, t).normalize_or_zero(),
            uv: self.uv.lerp(other.uv, t),
            lightmap_uv: self.lightmap_uv.lerp(other.lightmap_uv, t),
            extra: None,
        }
    }
}

/// Vertex pool shared by all primitives of one object.
#[derive(Clone, Debug, Default)]
pub struct VertexData {
    pub vertices: Vec<Vertex>,
}

impl VertexData {
    pub fn new(vertices: Vec<Vertex>) -> Self {
        Self { vertices }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    #[inline]
    pub fn position(&self, index: usize) -> Vec3 {
        self.vertices[index].position
    }

    #[inline]
    pub fn lightmap_uv(&self, index: usize) -> Vec2 {
        self.vertices[index].lightmap_uv
    }

    /// Duplicate a vertex and return the index of the copy.
    pub fn split_vertex(&mut self, index: usize) -> usize {
        let copy = self.vertices[index];
        self.push(copy)
    }

    pub fn push(&mut self, vertex: Vertex) -> usize {
        self.vertices.push(vertex);
        self.vertices.len() - 1
    }
}
