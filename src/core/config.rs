//! Bake configuration.
//!
//! One immutable [`BakeConfig`] value is threaded through every stage.
//! All sections use `#[serde(default)]` so partial JSON files are accepted.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::util::{Error, Result};

/// Top-level bake settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BakeConfig {
    pub lightmap: LightmapProperties,
    pub direct: DirectProperties,
    pub indirect: IndirectProperties,
    pub swap: SwapProperties,
    /// Seed for every random stream in the bake.
    pub seed: u64,
}

/// Atlas layout and post-processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LightmapProperties {
    /// Texels per world unit.
    pub density: f32,
    pub max_lightmap_u: u32,
    pub max_lightmap_v: u32,
    /// Upper bound on atlases per sector.
    pub max_atlases: usize,
    /// Primitives whose normals differ by less than this share a UV cluster.
    pub normals_tolerance: f32,
    /// Elements per patch side; `None` disables radiosity patches.
    pub patch_resolution: Option<u32>,
    /// Mask values at or below this count as uncovered.
    pub fixup_epsilon: f32,
    /// Constant term added to every texel when indirect light is off.
    pub ambient: Option<[f32; 3]>,
}

impl Default for LightmapProperties {
    fn default() -> Self {
        Self {
            density: 4.0,
            max_lightmap_u: 256,
            max_lightmap_v: 256,
            max_atlases: 64,
            normals_tolerance: 1e-3,
            patch_resolution: None,
            fixup_epsilon: 1e-4,
            ambient: None,
        }
    }
}

/// Direct lighting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectProperties {
    pub enabled: bool,
    /// Sphere rays shot from every light to find lit primitives.
    pub ray_samples: usize,
    /// Use the five-point visibility test; otherwise a single center ray.
    pub multi_sample_visibility: bool,
}

impl Default for DirectProperties {
    fn default() -> Self {
        Self { enabled: true, ray_samples: 4096, multi_sample_visibility: true }
    }
}

/// Photon map storage strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhotonMapKind {
    /// Unbalanced tree grown one photon at a time.
    Incremental,
    /// Flat array balanced into an implicit k-d tree before queries.
    #[default]
    Balanced,
}

/// Density estimation kernel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum PhotonFilter {
    #[default]
    None,
    /// Cone filter with slope constant `k >= 1`.
    Cone { k: f32 },
    Gaussian,
}

/// Photon-mapped indirect light.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndirectProperties {
    pub enabled: bool,
    pub photon_map: PhotonMapKind,
    /// Photons emitted per sector across all lights.
    pub num_photons: usize,
    /// Nearest photons used per estimate.
    pub max_density_samples: usize,
    pub search_radius: f32,
    /// Estimates with fewer photons than this return black.
    pub min_photons: usize,
    pub filter: PhotonFilter,
    /// Extra weight on the normal-axis distance; 0 keeps a sphere.
    pub disk_flatten: f32,
    pub final_gather: bool,
    pub final_gather_rays: usize,
    /// Reuse final-gather results at nearby points.
    pub irradiance_cache: bool,
    /// Allowed cache error; larger values reuse samples further away.
    pub cache_tolerance: f32,
    /// Factor applied to photon energy before it enters the lightmap.
    pub indirect_scale: f32,
    /// Diffuse bounces traced per photon after its first hit.
    pub photon_bounces: u32,
    /// Write the sector's photon map here after balancing.
    pub dump_path: Option<PathBuf>,
}

impl Default for IndirectProperties {
    fn default() -> Self {
        Self {
            enabled: false,
            photon_map: PhotonMapKind::Balanced,
            num_photons: 10_000,
            max_density_samples: 50,
            search_radius: 1.0,
            min_photons: 8,
            filter: PhotonFilter::None,
            disk_flatten: 0.0,
            final_gather: false,
            final_gather_rays: 32,
            irradiance_cache: false,
            cache_tolerance: 0.25,
            indirect_scale: 1.0,
            photon_bounces: 1,
            dump_path: None,
        }
    }
}

/// Lightmap memory budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapProperties {
    /// Resident bytes per sector before buffers are evicted to disk.
    pub max_resident_bytes: usize,
    /// Directory for swap files (system temp dir when unset).
    pub swap_dir: Option<PathBuf>,
}

impl Default for SwapProperties {
    fn default() -> Self {
        Self { max_resident_bytes: 256 * 1024 * 1024, swap_dir: None }
    }
}

impl BakeConfig {
    /// Parse from a JSON string and validate.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Save as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject settings no stage can work with.
    pub fn validate(&self) -> Result<()> {
        let lm = &self.lightmap;
        if !(lm.density > 0.0 && lm.density.is_finite()) {
            return Err(Error::config(format!("density must be positive, got {}", lm.density)));
        }
        if lm.max_lightmap_u < 3 || lm.max_lightmap_v < 3 {
            return Err(Error::config("maximum lightmap size must be at least 3x3"));
        }
        if lm.max_atlases == 0 {
            return Err(Error::config("max_atlases must be at least 1"));
        }
        if lm.patch_resolution == Some(0) {
            return Err(Error::config("patch_resolution must be at least 1"));
        }
        if self.direct.enabled && self.direct.ray_samples == 0 {
            return Err(Error::config("direct.ray_samples must be at least 1"));
        }
        let ind = &self.indirect;
        if ind.enabled {
            if ind.num_photons == 0 || ind.max_density_samples == 0 {
                return Err(Error::config("photon and density sample counts must be positive"));
            }
            if !(ind.search_radius > 0.0) {
                return Err(Error::config("search_radius must be positive"));
            }
            if ind.final_gather && ind.final_gather_rays == 0 {
                return Err(Error::config("final_gather_rays must be at least 1"));
            }
            if ind.final_gather && ind.irradiance_cache && !(ind.cache_tolerance > 0.0) {
                return Err(Error::config("cache_tolerance must be positive"));
            }
            if let PhotonFilter::Cone { k } = ind.filter {
                if k < 1.0 {
                    return Err(Error::config("cone filter constant must be >= 1"));
                }
            }
            if ind.disk_flatten < 0.0 {
                return Err(Error::config("disk_flatten must not be negative"));
            }
        }
        Ok(())
    }

    /// Swap directory, falling back to the system temp dir.
    pub fn swap_dir(&self) -> PathBuf {
        self.swap.swap_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
