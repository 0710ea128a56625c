//! Writing lightmaps to image files.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::hdr::HdrEncoder;
use image::{ImageFormat, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use super::lightmap::LightmapLock;
use crate::util::{Error, Result};

/// Linear scale-and-clamp applied before quantizing to 8 bits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Exposure {
    pub scale: f32,
    pub max: f32,
}

impl Default for Exposure {
    fn default() -> Self {
        Self { scale: 0.5, max: 1.0 }
    }
}

impl Exposure {
    #[inline]
    fn to_byte(&self, v: f32) -> u8 {
        let max = self.max.max(f32::MIN_POSITIVE);
        ((v * self.scale).clamp(0.0, max) / max * 255.0).round() as u8
    }
}

/// 8-bit RGB bytes of a lightmap, row-major.
pub fn to_rgb8(lightmap: &LightmapLock<'_>, exposure: Exposure) -> Vec<u8> {
    lightmap
        .texels()
        .iter()
        .flat_map(|c| [exposure.to_byte(c.x), exposure.to_byte(c.y), exposure.to_byte(c.z)])
        .collect()
}

/// Save as an 8-bit PNG.
pub fn save_png(lightmap: &LightmapLock<'_>, path: impl AsRef<Path>, exposure: Exposure) -> Result<()> {
    let bytes = to_rgb8(lightmap, exposure);
    let img = RgbImage::from_raw(lightmap.width() as u32, lightmap.height() as u32, bytes)
        .ok_or_else(|| Error::other("lightmap buffer does not match its size"))?;
    img.save_with_format(path.as_ref(), ImageFormat::Png)?;
    tracing::debug!(path = %path.as_ref().display(), "wrote png lightmap");
    Ok(())
}

/// Save the unclamped float values as Radiance HDR.
pub fn save_hdr(lightmap: &LightmapLock<'_>, path: impl AsRef<Path>) -> Result<()> {
    let pixels: Vec<Rgb<f32>> = lightmap
        .texels()
        .iter()
        .map(|c| Rgb([c.x.max(0.0), c.y.max(0.0), c.z.max(0.0)]))
        .collect();
    let writer = BufWriter::new(File::create(path.as_ref())?);
    HdrEncoder::new(writer).encode(&pixels, lightmap.width(), lightmap.height())?;
    tracing::debug!(path = %path.as_ref().display(), "wrote hdr lightmap");
    Ok(())
}
