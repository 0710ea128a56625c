//! Balanced photon map.
//!
//! Photons are collected into a flat array and, once emission is over,
//! rearranged into a left-balanced k-d tree: node `i` has children `2i` and
//! `2i + 1` (index 0 is unused). After balancing the map is read-only.

use super::{search_dist2, Neighbours, Photon, SearchParams};
use crate::util::{BBox3f, Error, Progress, Result, Vec3};

#[derive(Clone, Debug)]
pub struct BalancedPhotonMap {
    /// 1-based photon storage.
    photons: Vec<Photon>,
    bbox: BBox3f,
    balanced: bool,
}

impl Default for BalancedPhotonMap {
    fn default() -> Self {
        Self { photons: vec![Photon::default()], bbox: BBox3f::EMPTY, balanced: false }
    }
}

impl BalancedPhotonMap {
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut map = Self::default();
        map.photons.try_reserve(capacity)?;
        Ok(map)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.photons.len() - 1
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_balanced(&self) -> bool {
        self.balanced
    }

    #[inline]
    pub fn bbox(&self) -> BBox3f {
        self.bbox
    }

    /// Photon at 1-based `index`.
    #[inline]
    pub fn photon(&self, index: usize) -> &Photon {
        &self.photons[index]
    }

    pub fn photons(&self) -> impl Iterator<Item = &Photon> + '_ {
        self.photons[1..].iter()
    }

    pub fn photons_mut(&mut self) -> impl Iterator<Item = &mut Photon> + '_ {
        self.photons[1..].iter_mut()
    }

    pub fn store(&mut self, photon: Photon) -> Result<()> {
        if self.balanced {
            return Err(Error::other("photon map is balanced, no more photons can be stored"));
        }
        if self.photons.len() == self.photons.capacity() {
            self.photons.try_reserve(self.photons.capacity().max(64))?;
        }
        self.bbox.expand_by_point(photon.position);
        self.photons.push(photon);
        Ok(())
    }

    /// Build the implicit k-d tree. Subsequent calls do nothing.
    #[tracing::instrument(skip_all, fields(photons = self.len()))]
    pub fn balance(&mut self, progress: &dyn Progress) -> Result<()> {
        if self.balanced {
            return Ok(());
        }
        let n = self.len();
        if n > 1 {
            let mut org = std::mem::take(&mut self.photons);
            let mut bal = Vec::new();
            bal.try_reserve_exact(n + 1)?;
            bal.resize(n + 1, Photon::default());
            let mut bbox = self.bbox;
            let mut placed = 0usize;
            balance_segment(&mut bal, &mut org, 1, 1, n, &mut bbox, &mut |count| {
                placed += count;
                progress.set_progress(placed as f32 / n as f32);
            });
            self.photons = bal;
        }
        progress.set_progress(1.0);
        self.balanced = true;
        tracing::debug!(photons = n, "photon map balanced");
        Ok(())
    }

    /// Up to `params.max_photons` photons within the search radius.
    ///
    /// Results are in heap order, not sorted by distance.
    pub fn nearest(&self, pos: Vec3, normal: Vec3, params: &SearchParams) -> Neighbours {
        let mut np = NearestPhotons::new(pos, normal, params);
        if self.len() > 0 && params.max_photons > 0 {
            self.locate(&mut np, 1);
        }
        np.into_neighbours()
    }

    fn locate(&self, np: &mut NearestPhotons, index: usize) {
        let n = self.len();
        let p = &self.photons[index];

        if 2 * index <= n {
            let axis = p.plane as usize;
            let dist1 = np.pos[axis] - p.position[axis];
            if dist1 > 0.0 {
                if 2 * index + 1 <= n {
                    self.locate(np, 2 * index + 1);
                }
                if dist1 * dist1 < np.dist2[0] {
                    self.locate(np, 2 * index);
                }
            } else {
                self.locate(np, 2 * index);
                if dist1 * dist1 < np.dist2[0] && 2 * index + 1 <= n {
                    self.locate(np, 2 * index + 1);
                }
            }
        }

        let d2 = search_dist2(p.position - np.pos, np.normal, np.flatten);
        if d2 < np.dist2[0] {
            np.insert(index, d2);
        }
    }
}

/// Bounded max-heap over squared distances; slot 0 holds the current bound.
struct NearestPhotons {
    max: usize,
    found: usize,
    got_heap: bool,
    pos: Vec3,
    normal: Vec3,
    flatten: f32,
    dist2: Vec<f32>,
    index: Vec<usize>,
}

impl NearestPhotons {
    fn new(pos: Vec3, normal: Vec3, params: &SearchParams) -> Self {
        let max = params.max_photons;
        let mut dist2 = vec![0.0; max + 1];
        dist2[0] = params.search_radius * params.search_radius;
        Self {
            max,
            found: 0,
            got_heap: false,
            pos,
            normal,
            flatten: params.disk_flatten,
            dist2,
            index: vec![0; max + 1],
        }
    }

    fn insert(&mut self, photon: usize, d2: f32) {
        if self.found < self.max {
            self.found += 1;
            self.dist2[self.found] = d2;
            self.index[self.found] = photon;
            return;
        }

        if !self.got_heap {
            self.build_heap();
            self.got_heap = true;
            if d2 >= self.dist2[0] {
                return;
            }
        }

        // Replace the farthest photon and sift the new one down.
        let mut parent = 1;
        let mut j = 2;
        while j <= self.found {
            if j < self.found && self.dist2[j] < self.dist2[j + 1] {
                j += 1;
            }
            if d2 > self.dist2[j] {
                break;
            }
            self.dist2[parent] = self.dist2[j];
            self.index[parent] = self.index[j];
            parent = j;
            j += j;
        }
        self.index[parent] = photon;
        self.dist2[parent] = d2;
        self.dist2[0] = self.dist2[1];
    }

    fn build_heap(&mut self) {
        let half = self.found >> 1;
        for k in (1..=half).rev() {
            let mut parent = k;
            let photon = self.index[k];
            let d2 = self.dist2[k];
            while parent <= half {
                let mut j = parent + parent;
                if j < self.found && self.dist2[j] < self.dist2[j + 1] {
                    j += 1;
                }
                if d2 >= self.dist2[j] {
                    break;
                }
                self.dist2[parent] = self.dist2[j];
                self.index[parent] = self.index[j];
                parent = j;
            }
            self.dist2[parent] = d2;
            self.index[parent] = photon;
        }
        self.dist2[0] = self.dist2[1];
    }

    fn into_neighbours(mut self) -> Neighbours {
        let radius2 = self.dist2[0];
        self.index.truncate(self.found + 1);
        self.dist2.truncate(self.found + 1);
        self.index.remove(0);
        self.dist2.remove(0);
        Neighbours { indices: self.index, dist2: self.dist2, radius2 }
    }
}

/// Place the median of `org[start..=end]` at tree node `index` and recurse;
/// `report` receives the number of photons placed.
#[allow(clippy::too_many_arguments)]
fn balance_segment(
    bal: &mut [Photon],
    org: &mut [Photon],
    index: usize,
    start: usize,
    end: usize,
    bbox: &mut BBox3f,
    report: &mut dyn FnMut(usize),
) {
    let len = end - start + 1;
    let mut median = 1;
    while 4 * median <= len {
        median += median;
    }
    if 3 * median <= len {
        median += median;
        median += start - 1;
    } else {
        median = end - median + 1;
    }

    let axis = bbox.longest_axis();
    median_split(org, start, end, median, axis);
    bal[index] = org[median];
    bal[index].plane = axis as u8;
    report(1);

    let split = org[median].position[axis];
    if median > start {
        if start < median - 1 {
            let saved = bbox.max[axis];
            bbox.max[axis] = split;
            balance_segment(bal, org, 2 * index, start, median - 1, bbox, report);
            bbox.max[axis] = saved;
        } else {
            bal[2 * index] = org[start];
            report(1);
        }
    }
    if median < end {
        if median + 1 < end {
            let saved = bbox.min[axis];
            bbox.min[axis] = split;
            balance_segment(bal, org, 2 * index + 1, median + 1, end, bbox, report);
            bbox.min[axis] = saved;
        } else {
            bal[2 * index + 1] = org[end];
            report(1);
        }
    }
}

/// Partial quicksort: afterwards `p[median]` has every smaller coordinate
/// on `axis` to its left and every larger one to its right.
fn median_split(p: &mut [Photon], start: usize, end: usize, median: usize, axis: usize) {
    let mut left = start;
    let mut right = end;
    while right > left {
        let v = p[right].position[axis];
        let mut i = left - 1;
        let mut j = right;
        loop {
            i += 1;
            while p[i].position[axis] < v {
                i += 1;
            }
            j -= 1;
            while p[j].position[axis] > v && j > left {
                j -= 1;
            }
            if i >= j {
                break;
            }
            p.swap(i, j);
        }
        p.swap(i, right);
        if i >= median {
            right = i - 1;
        }
        if i <= median {
            left = i + 1;
        }
    }
}
