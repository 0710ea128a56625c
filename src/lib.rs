//! # lightbake
//!
//! Offline static lightmap baker. Given triangulated sectors with lights it
//! packs primitives into lightmap atlases, computes ray-traced direct light
//! and photon-mapped indirect light per texel, and post-processes the atlas
//! borders so they filter cleanly at runtime.
//!
//! ## Modules
//!
//! - [`util`] - Errors, math types, polygon clipping, progress reporting
//! - [`core`] - Bake configuration and swappable buffers
//! - [`scene`] - Vertices, primitives, objects, lights, sectors
//! - [`raytrace`] - Ray tracer interface and the bundled BVH tracer
//! - [`lightmap`] - Atlas allocation, UV layout, lightmaps, fixup, image export
//! - [`photon`] - Photon maps (incremental and balanced) and density filters
//! - [`transport`] - Direct lighting, photon emission, indirect gathering
//! - [`bake`] - The per-sector pipeline
//!
//! ## Example
//!
//! ```ignore
//! use lightbake::prelude::*;
//!
//! let baker = Baker::new(BakeConfig::load("bake.json")?)?;
//! for result in baker.bake(&mut sectors, &NoProgress) {
//!     let baked = result?;
//!     baked.save_lightmaps("out", LightmapFormat::Png(Exposure::default()))?;
//! }
//! ```

pub mod util;
pub mod core;
pub mod scene;
pub mod raytrace;
pub mod lightmap;
pub mod photon;
pub mod transport;
pub mod bake;
pub mod logging;

// Re-export commonly used types
pub use util::{Color, Error, Result};
pub use bake::{Baker, BakeStats, LightmapFormat, SectorBake};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{Color, Error, NoProgress, Progress, ProgressIndicator, Result, Vec2, Vec3};
    pub use crate::core::{BakeConfig, PhotonFilter, PhotonMapKind};
    pub use crate::scene::{Light, LightKind, Object, Sector, Vertex};
    pub use crate::raytrace::{BvhTracer, Ray, RayTracer};
    pub use crate::lightmap::{Exposure, Lightmap};
    pub use crate::bake::{Baker, BakeStats, LightmapFormat, SectorBake};
}
