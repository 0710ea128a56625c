//! Scene model consumed by the baker.
//!
//! - [`Vertex`] / [`VertexData`] - per-object vertex pools
//! - [`Primitive`] - triangles with element decomposition
//! - [`Object`], [`Sector`], [`Light`]

mod light;
mod object;
mod primitive;
mod sector;
mod vertex;

pub use light::*;
pub use object::*;
pub use primitive::*;
pub use sector::*;
pub use vertex::*;
