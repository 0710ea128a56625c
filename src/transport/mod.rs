//! Light transport: direct lighting, photon emission and gathering.
//!
//! Shading runs in parallel over primitives and produces [`Contribution`]s;
//! they are written into lightmaps and patches afterwards, one atlas lock at
//! a time.

mod direct;
mod emission;
mod indirect;
mod sampling;

pub use direct::*;
pub use emission::*;
pub use indirect::*;
pub use sampling::*;

use crate::lightmap::Lightmap;
use crate::scene::{Primitive, PrimitiveRef, Sector};
use crate::util::{Color, IVec2, Result};

/// Energy one primitive receives in a pass.
#[derive(Debug, Clone)]
pub struct Contribution {
    pub primitive: PrimitiveRef,
    pub atlas: usize,
    pub texels: Vec<(IVec2, Color)>,
    /// `(patch index, energy)` for primitives with radiosity patches.
    pub patches: Vec<(usize, Color)>,
}

impl Contribution {
    pub fn new(primitive: PrimitiveRef, atlas: usize) -> Self {
        Self { primitive, atlas, texels: Vec::new(), patches: Vec::new() }
    }

    /// Record energy for element `index` of `prim`.
    pub fn push(&mut self, prim: &Primitive, index: usize, energy: Color) {
        self.texels.push((prim.element_texel(index), energy));
        if let Some(patch) = prim.element_patch(index) {
            self.patches.push((patch, energy));
        }
    }
}

/// Accumulate contributions into their lightmaps and, if `to_patches`, into
/// the owning patches.
pub fn apply_contributions(
    sector: &mut Sector,
    lightmaps: &[Lightmap],
    results: &[Contribution],
    to_patches: bool,
) -> Result<()> {
    for (atlas, lightmap) in lightmaps.iter().enumerate() {
        let mut batch = results.iter().filter(|c| c.atlas == atlas).peekable();
        if batch.peek().is_none() {
            continue;
        }
        let mut lock = lightmap.lock()?;
        for c in batch {
            for &(texel, energy) in &c.texels {
                lock.add(texel.x, texel.y, energy);
            }
        }
    }

    if to_patches {
        for c in results.iter().filter(|c| !c.patches.is_empty()) {
            let prim = &mut sector.objects[c.primitive.object as usize].primitives[c.primitive.primitive as usize];
            for &(patch, energy) in &c.patches {
                if let Some(p) = prim.patches.get_mut(patch) {
                    p.energy += energy;
                }
            }
        }
    }
    Ok(())
}
