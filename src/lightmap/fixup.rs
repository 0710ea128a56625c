//! Coverage masks and border fixup.
//!
//! Partially covered texels at primitive borders accumulate only a fraction
//! of the light a full texel would; the mask records that fraction so it can
//! be divided back out. Uncovered texels next to covered ones are then
//! filled from their neighbours so bilinear filtering does not bleed black
//! into the edges.

use std::sync::Arc;

use super::lightmap::LightmapLock;
use crate::core::{SwapBuffer, SwapCache, SwapGuard};
use crate::scene::Sector;
use crate::util::{Color, Result};

/// Per-texel coverage of one lightmap.
#[derive(Clone)]
pub struct CoverageMask {
    width: u32,
    height: u32,
    data: Arc<SwapBuffer<f32>>,
}

impl CoverageMask {
    pub fn new(cache: &Arc<SwapCache>, width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        Self { width, height, data: SwapBuffer::new(cache, len) }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn lock(&self) -> Result<SwapGuard<'_, f32>> {
        self.data.lock()
    }
}

/// Build one mask per atlas from the element coverage of every packed
/// primitive in `sector`.
pub fn build_masks(cache: &Arc<SwapCache>, sector: &Sector, sizes: &[(u32, u32)]) -> Result<Vec<CoverageMask>> {
    let masks: Vec<CoverageMask> = sizes.iter().map(|&(w, h)| CoverageMask::new(cache, w, h)).collect();

    for object in sector.objects.iter().filter(|o| !o.no_light) {
        for prim in &object.primitives {
            let Some(mask) = prim.lightmap.and_then(|i| masks.get(i)) else {
                continue;
            };
            let width = mask.width as i32;
            let height = mask.height as i32;
            let mut data = mask.lock()?;
            for index in 0..prim.element_count() {
                if prim.element_areas[index] <= 0.0 {
                    continue;
                }
                let t = prim.element_texel(index);
                if t.x < 0 || t.y < 0 || t.x >= width || t.y >= height {
                    continue;
                }
                data[(t.y * width + t.x) as usize] += prim.element_fraction(index);
            }
        }
    }
    Ok(masks)
}

/// Un-antialias partially covered texels, then dilate into uncovered ones.
///
/// The mask is read-only; colors are rewritten in place in one row-major
/// sweep per pass. Dilation writes only texels with no coverage at all and
/// reads only texels with coverage above `epsilon`, so the in-place sweep
/// gives the same result as a separate output buffer. Texels with a trace of
/// coverage at or below `epsilon` are left as they are.
pub fn fixup_lightmap(lightmap: &mut LightmapLock<'_>, mask: &[f32], epsilon: f32) {
    let (w, h) = (lightmap.width(), lightmap.height());
    debug_assert_eq!(mask.len(), w * h);

    let colors = lightmap.texels_mut();
    for (c, &m) in colors.iter_mut().zip(mask) {
        if m > epsilon && m < 1.0 {
            *c *= 1.0 / m;
        }
    }

    for y in 0..h {
        for x in 0..w {
            if mask[y * w + x] != 0.0 {
                continue;
            }
            let mut sum = Color::ZERO;
            let mut count = 0u32;
            for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                    if (nx, ny) == (x, y) || mask[ny * w + nx] <= epsilon {
                        continue;
                    }
                    sum += colors[ny * w + nx];
                    count += 1;
                }
            }
            if count > 0 {
                colors[y * w + x] = sum / count as f32;
            }
        }
    }
}
