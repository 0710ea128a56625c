//! Lightmap storage, atlas packing and post-processing.
//!
//! - [`Lightmap`] - swappable RGB buffer with scoped [`LightmapLock`] access
//! - [`SubRectangles`] / [`GrowableSubRectangles`] - rectangle packers
//! - [`AtlasAllocator`] - bounded set of growable atlases
//! - [`LightmapLayout`] - cluster projection and packing
//! - [`fixup_lightmap`] - un-antialiasing and border dilation
//! - [`save_png`] / [`save_hdr`] - image output

mod atlas;
mod export;
mod fixup;
mod layout;
#[allow(clippy::module_inception)]
mod lightmap;
mod subrect;

pub use atlas::*;
pub use export::*;
pub use fixup::*;
pub use layout::*;
pub use lightmap::*;
pub use subrect::*;
