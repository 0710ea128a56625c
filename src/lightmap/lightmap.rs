//! Swappable RGB lightmap buffer.

use std::sync::Arc;

use crate::core::{SwapBuffer, SwapCache, SwapGuard};
use crate::util::{Color, Result};

/// `width x height` buffer of color accumulators.
///
/// The texels live in a [`SwapBuffer`]; all access goes through
/// [`Lightmap::lock`].
#[derive(Clone)]
pub struct Lightmap {
    width: u32,
    height: u32,
    data: Arc<SwapBuffer<Color>>,
}

impl Lightmap {
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

    #[inline]
    pub fn is_resident(&self) -> bool {
        self.data.is_resident()
    }

    /// Scoped access to the texels.
    pub fn lock(&self) -> Result<LightmapLock<'_>> {
        Ok(LightmapLock {
            width: self.width as usize,
            height: self.height as usize,
            texels: self.data.lock()?,
        })
    }
}

impl std::fmt::Debug for Lightmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lightmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("resident", &self.is_resident())
            .finish()
    }
}

/// Locked lightmap; the buffer can not be evicted while this lives.
pub struct LightmapLock<'a> {
    width: usize,
    height: usize,
    texels: SwapGuard<'a, Color>,
}

impl LightmapLock<'_> {
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Color {
        self.texels[self.index(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, c: Color) {
        let i = self.index(x, y);
        self.texels[i] = c;
    }

    /// Accumulate into a texel. Out-of-range texels are ignored.
    #[inline]
    pub fn add(&mut self, x: i32, y: i32, c: Color) {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return;
        }
        let i = self.index(x as usize, y as usize);
        self.texels[i] += c;
    }

    #[inline]
    pub fn texels(&self) -> &[Color] {
        &self.texels
    }

    #[inline]
    pub fn texels_mut(&mut self) -> &mut [Color] {
        &mut self.texels
    }

    pub fn clear(&mut self) {
        self.texels.fill(Color::ZERO);
    }

    /// Add a constant term to every texel.
    pub fn add_ambient(&mut self, ambient: Color) {
        for t in self.texels.iter_mut() {
            *t += ambient;
        }
    }

    /// Multiply by `scale`, then clamp each channel to `[0, max]`.
    pub fn scale_clamp(&mut self, scale: f32, max: f32) {
        for t in self.texels.iter_mut() {
            *t = (*t * scale).clamp(Color::ZERO, Color::splat(max));
        }
    }

    /// The single color of the map if every texel is within `threshold` of
    /// the first one.
    pub fn one_color(&self, threshold: f32) -> Option<Color> {
        let first = *self.texels.first()?;
        self.texels
            .iter()
            .all(|t| (*t - first).abs().max_element() <= threshold)
            .then_some(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SwapCache::new(dir.path(), 1 << 20, "lm");
        let lm = Lightmap::new(&cache, 4, 2);
        {
            let mut l = lm.lock().unwrap();
            l.add(3, 1, Color::new(1.0, 2.0, 3.0));
            l.add(3, 1, Color::ONE);
            l.add(-1, 0, Color::ONE);
            l.add(4, 0, Color::ONE);
        }
        let l = lm.lock().unwrap();
        assert_eq!(l.get(3, 1), Color::new(2.0, 3.0, 4.0));
        assert_eq!(l.texels().iter().filter(|t| **t != Color::ZERO).count(), 1);
    }

    #[test]
    fn test_scale_clamp_and_solid() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SwapCache::new(dir.path(), 1 << 20, "lm");
        let lm = Lightmap::new(&cache, 2, 2);
        let mut l = lm.lock().unwrap();
        assert_eq!(l.one_color(0.0), Some(Color::ZERO));
        l.set(0, 0, Color::new(4.0, 1.0, -1.0));
        l.scale_clamp(0.5, 1.0);
        assert_eq!(l.get(0, 0), Color::new(1.0, 0.5, 0.0));
        assert!(l.one_color(0.1).is_none());
        l.add_ambient(Color::splat(0.25));
        assert_eq!(l.get(1, 1), Color::splat(0.25));
    }

    #[test]
    fn test_survives_eviction() {
        let dir = tempfile::tempdir().unwrap();
        // One 4x4 map fits, the second forces an eviction.
        let cache = SwapCache::new(dir.path(), 16 * 12, "lm");
        let a = Lightmap::new(&cache, 4, 4);
        let b = Lightmap::new(&cache, 4, 4);
        a.lock().unwrap().set(1, 2, Color::splat(3.0));
        b.lock().unwrap().set(0, 0, Color::ONE);
        assert!(!a.is_resident());
        assert_eq!(a.lock().unwrap().get(1, 2), Color::splat(3.0));
    }
}
