//! Photon maps for indirect light.
//!
//! Two storage strategies share one query contract:
//! - [`IncrementalPhotonMap`] - unbalanced tree, photons can be added any time
//! - [`BalancedPhotonMap`] - flat array balanced into an implicit k-d tree
//!
//! [`PhotonMap`] picks one per bake and adds the irradiance estimate on top.
//! [`IrradianceCache`] keeps final-gather results for reuse.

mod balanced;
mod dump;
mod filter;
mod incremental;
mod ircache;
#[allow(clippy::module_inception)]
mod photon;

pub use balanced::BalancedPhotonMap;
pub use dump::*;
pub use incremental::IncrementalPhotonMap;
pub use ircache::{CacheSample, IrradianceCache};
pub use photon::*;

use std::path::Path;

use crate::core::{IndirectProperties, PhotonFilter, PhotonMapKind};
use crate::util::{BBox3f, Color, Progress, Result, Vec3};

/// Parameters of one density query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParams {
    pub max_photons: usize,
    pub search_radius: f32,
    /// Estimates backed by fewer photons are returned as black.
    pub min_photons: usize,
    pub filter: PhotonFilter,
    /// Extra weight on distance along the surface normal.
    pub disk_flatten: f32,
}

impl From<&IndirectProperties> for SearchParams {
    fn from(p: &IndirectProperties) -> Self {
        Self {
            max_photons: p.max_density_samples,
            search_radius: p.search_radius,
            min_photons: p.min_photons,
            filter: p.filter,
            disk_flatten: p.disk_flatten,
        }
    }
}

/// Result of a nearest-photon query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Neighbours {
    /// Photon indices as understood by the map that produced them.
    pub indices: Vec<usize>,
    pub dist2: Vec<f32>,
    /// Squared radius of the sphere the photons were gathered from: the
    /// farthest photon when the query filled up, the search radius if not.
    pub radius2: f32,
}

impl Neighbours {
    #[inline]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Squared search distance, stretched along `normal` by `flatten` so the
/// search volume becomes a disk hugging the surface.
#[inline]
pub(crate) fn search_dist2(delta: Vec3, normal: Vec3, flatten: f32) -> f32 {
    let along = delta.dot(normal);
    delta.length_squared() + flatten * along * along
}

/// Storage strategy of a [`PhotonMap`].
#[derive(Clone, Debug)]
pub enum PhotonStore {
    Incremental(IncrementalPhotonMap),
    Balanced(BalancedPhotonMap),
}

/// Photon map of one sector.
#[derive(Clone, Debug)]
pub struct PhotonMap {
    store: PhotonStore,
    tables: DirectionTables,
}

impl PhotonMap {
    /// Empty map with room for `capacity` photons.
    pub fn new(kind: PhotonMapKind, capacity: usize) -> Result<Self> {
        let store = match kind {
            PhotonMapKind::Incremental => PhotonStore::Incremental(IncrementalPhotonMap::with_capacity(capacity)?),
            PhotonMapKind::Balanced => PhotonStore::Balanced(BalancedPhotonMap::with_capacity(capacity)?),
        };
        Ok(Self { store, tables: DirectionTables::new() })
    }

    pub fn kind(&self) -> PhotonMapKind {
        match self.store {
            PhotonStore::Incremental(_) => PhotonMapKind::Incremental,
            PhotonStore::Balanced(_) => PhotonMapKind::Balanced,
        }
    }

    #[inline]
    pub fn storage(&self) -> &PhotonStore {
        &self.store
    }

    #[inline]
    pub fn tables(&self) -> &DirectionTables {
        &self.tables
    }

    pub fn len(&self) -> usize {
        match &self.store {
            PhotonStore::Incremental(m) => m.len(),
            PhotonStore::Balanced(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bbox(&self) -> BBox3f {
        match &self.store {
            PhotonStore::Incremental(m) => m.bbox(),
            PhotonStore::Balanced(m) => m.bbox(),
        }
    }

    /// Store a photon travelling along `direction`.
    pub fn store(&mut self, position: Vec3, power: Color, direction: Vec3) -> Result<()> {
        let photon = Photon::new(position, power, direction);
        match &mut self.store {
            PhotonStore::Incremental(m) => m.store(photon),
            PhotonStore::Balanced(m) => m.store(photon),
        }
    }

    /// Make the map ready for queries. Balances the balanced variant.
    pub fn prepare(&mut self, progress: &dyn Progress) -> Result<()> {
        match &mut self.store {
            PhotonStore::Incremental(_) => {
                progress.set_progress(1.0);
                Ok(())
            }
            PhotonStore::Balanced(m) => m.balance(progress),
        }
    }

    /// Multiply every photon's power by `scale`.
    pub fn scale_power(&mut self, scale: f32) {
        match &mut self.store {
            PhotonStore::Incremental(m) => m.photons_mut().for_each(|p| p.power *= scale),
            PhotonStore::Balanced(m) => m.photons_mut().for_each(|p| p.power *= scale),
        }
    }

    /// Photon for an index returned by [`PhotonMap::nearest`].
    #[inline]
    pub fn photon(&self, index: usize) -> &Photon {
        match &self.store {
            PhotonStore::Incremental(m) => m.photon(index),
            PhotonStore::Balanced(m) => m.photon(index),
        }
    }

    pub fn nearest(&self, pos: Vec3, normal: Vec3, params: &SearchParams) -> Neighbours {
        match &self.store {
            PhotonStore::Incremental(m) => m.nearest(pos, normal, params),
            PhotonStore::Balanced(m) => m.nearest(pos, normal, params),
        }
    }

    /// Irradiance arriving at `pos` on a surface facing `normal`.
    ///
    /// Only photons travelling into the surface count.
    pub fn irradiance_estimate(&self, pos: Vec3, normal: Vec3, params: &SearchParams) -> Color {
        let found = self.nearest(pos, normal, params);
        if found.len() < params.min_photons.max(1) {
            return Color::ZERO;
        }
        let mut flux = Color::ZERO;
        for (&index, &d2) in found.indices.iter().zip(&found.dist2) {
            let p = self.photon(index);
            if self.tables.direction(p).dot(normal) < 0.0 {
                flux += p.power * params.filter.weight(d2, found.radius2);
            }
        }
        flux * params.filter.normalization(found.radius2)
    }

    /// Write the photons in storage order.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        match &self.store {
            PhotonStore::Incremental(m) => save_photons(path, m.len(), m.photons()),
            PhotonStore::Balanced(m) => save_photons(path, m.len(), m.photons()),
        }
    }
}
