//! Bounded collection of growable atlases.

use super::subrect::{GrowableSubRectangles, SubRectId};
use crate::util::Rect;

/// Where an allocation landed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AtlasSlot {
    pub atlas: usize,
    pub rect: Rect,
    pub id: SubRectId,
}

/// Packs rectangles into up to `max_atlases` atlases of at most
/// `max_width` x `max_height` texels each.
#[derive(Clone, Debug)]
pub struct AtlasAllocator {
    atlases: Vec<GrowableSubRectangles>,
    max_width: i32,
    max_height: i32,
    max_atlases: usize,
}

impl AtlasAllocator {
    pub fn new(max_width: u32, max_height: u32, max_atlases: usize) -> Self {
        Self {
            atlases: Vec::new(),
            max_width: max_width as i32,
            max_height: max_height as i32,
            max_atlases,
        }
    }

    #[inline]
    pub fn atlas_count(&self) -> usize {
        self.atlases.len()
    }

    /// Current size of every atlas, in creation order.
    pub fn atlas_sizes(&self) -> Vec<(u32, u32)> {
        self.atlases
            .iter()
            .map(|a| {
                let r = a.region();
                (r.width().max(1) as u32, r.height().max(1) as u32)
            })
            .collect()
    }

    /// Allocate a `w`x`h` rect.
    ///
    /// Existing atlases are tried in decreasing free-area order, first
    /// without growing them, then with growth; only then is a new atlas
    /// opened. Returns `None` if the rect can not be placed anywhere.
    pub fn alloc(&mut self, w: i32, h: i32) -> Option<AtlasSlot> {
        if w <= 0 || h <= 0 || w > self.max_width || h > self.max_height {
            return None;
        }

        let mut order: Vec<usize> = (0..self.atlases.len()).collect();
        order.sort_by_key(|&i| std::cmp::Reverse(self.atlases[i].free_area()));

        for &i in &order {
            if let Some((id, rect)) = self.atlases[i].alloc_no_grow(w, h) {
                return Some(AtlasSlot { atlas: i, rect, id });
            }
        }
        for &i in &order {
            if let Some((id, rect)) = self.atlases[i].alloc(w, h) {
                return Some(AtlasSlot { atlas: i, rect, id });
            }
        }
        if self.atlases.len() < self.max_atlases {
            let mut atlas = GrowableSubRectangles::new(self.max_width, self.max_height);
            let result = atlas.alloc(w, h);
            self.atlases.push(atlas);
            let atlas = self.atlases.len() - 1;
            return result.map(|(id, rect)| AtlasSlot { atlas, rect, id });
        }
        None
    }

    /// Return a slot's texels to its atlas.
    pub fn reclaim(&mut self, slot: &AtlasSlot) -> bool {
        self.atlases
            .get_mut(slot.atlas)
            .and_then(|a| a.reclaim(slot.id))
            .is_some()
    }
}
