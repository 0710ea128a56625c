//! Sector bake pipeline.
//!
//! A [`Baker`] runs every sector as an independent rayon job:
//! layout, element preparation, direct light, photon emission and
//! gathering, then border fixup. Sectors share only the configuration.

use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::core::{BakeConfig, SwapCache};
use crate::lightmap::{build_masks, fixup_lightmap, save_hdr, save_png, Exposure, LayoutStats, Lightmap, LightmapLayout};
use crate::raytrace::BvhTracer;
use crate::scene::{Object, Sector};
use crate::transport::{
    direct_lighting, emit_photons, indirect_lighting, shade_vertices, DirectStats, EmissionStats, IndirectStats,
    VertexLightStats,
};
use crate::util::{Color, Error, Progress, ProgressSlice, Result};

/// Counters collected while baking one sector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BakeStats {
    pub layout: LayoutStats,
    /// Packed primitives whose UV mapping turned out degenerate.
    pub degenerate_primitives: usize,
    pub direct: DirectStats,
    /// Objects lit per vertex instead of through a lightmap.
    pub vertex: VertexLightStats,
    pub emission: Option<EmissionStats>,
    pub indirect: Option<IndirectStats>,
    /// Set when the indirect pass was abandoned for lack of photon storage.
    pub photon_error: Option<String>,
    pub swap_evictions: usize,
}

/// Output image encoding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightmapFormat {
    /// Radiance HDR, linear floats.
    Hdr,
    /// 8-bit PNG after exposure scale-clamp.
    Png(Exposure),
}

/// Baked lightmaps of one sector.
pub struct SectorBake {
    pub name: String,
    pub lightmaps: Vec<Lightmap>,
    pub atlas_sizes: Vec<(u32, u32)>,
    pub stats: BakeStats,
}

impl SectorBake {
    /// Normalized lightmap UVs of `object` against this sector's atlases.
    pub fn normalized_uvs(&self, object: &Object) -> Vec<crate::util::Vec2> {
        object.normalized_lightmap_uvs(&self.atlas_sizes)
    }

    /// Write one image per lightmap into `dir`, named `<sector>_lm<n>.<ext>`.
    pub fn save_lightmaps(&self, dir: impl AsRef<Path>, format: LightmapFormat) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let mut written = Vec::with_capacity(self.lightmaps.len());
        for (index, lightmap) in self.lightmaps.iter().enumerate() {
            let lock = lightmap.lock()?;
            let path = match format {
                LightmapFormat::Hdr => {
                    let path = dir.join(format!("{}_lm{index}.hdr", self.name));
                    save_hdr(&lock, &path)?;
                    path
                }
                LightmapFormat::Png(exposure) => {
                    let path = dir.join(format!("{}_lm{index}.png", self.name));
                    save_png(&lock, &path, exposure)?;
                    path
                }
            };
            written.push(path);
        }
        tracing::debug!(sector = %self.name, images = written.len(), "lightmaps saved");
        Ok(written)
    }
}

impl std::fmt::Debug for SectorBake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SectorBake")
            .field("name", &self.name)
            .field("atlas_sizes", &self.atlas_sizes)
            .field("stats", &self.stats)
            .finish()
    }
}

/// Bakes sectors with one validated configuration.
#[derive(Debug, Clone)]
pub struct Baker {
    config: BakeConfig,
}

impl Baker {
    pub fn new(config: BakeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[inline]
    pub fn config(&self) -> &BakeConfig {
        &self.config
    }

    /// Bake all sectors in parallel. Results keep the order of `sectors`.
    pub fn bake(&self, sectors: &mut [Sector], progress: &dyn Progress) -> Vec<Result<SectorBake>> {
        let n = sectors.len().max(1) as f32;
        sectors
            .par_iter_mut()
            .enumerate()
            .map(|(index, sector)| {
                let slice = ProgressSlice::new(progress, index as f32 / n, 1.0 / n);
                let result = self.bake_sector(index, sector, &slice);
                if let Err(e) = &result {
                    tracing::error!(sector = %sector.name, error = %e, "sector bake failed");
                }
                result
            })
            .collect()
    }

    /// Bake one sector; `index` keeps its random streams and swap files
    /// apart from the other sectors.
    #[tracing::instrument(skip_all, fields(sector = %sector.name))]
    pub fn bake_sector(&self, index: usize, sector: &mut Sector, progress: &dyn Progress) -> Result<SectorBake> {
        let cfg = &self.config;
        let seed = sector_seed(cfg.seed, index);
        let mut stats = BakeStats::default();

        let layout = LightmapLayout::new(&cfg.lightmap);
        stats.layout = layout.layout_objects(&mut sector.objects);
        let atlas_sizes = layout.atlas_sizes();
        stats.degenerate_primitives = prepare_elements(sector, cfg.lightmap.patch_resolution);
        if stats.degenerate_primitives > 0 {
            tracing::warn!(primitives = stats.degenerate_primitives, "skipped primitives with degenerate lightmap UVs");
        }
        progress.set_progress(0.1);
        check_cancel(progress)?;

        let tracer = BvhTracer::from_sector(sector);
        let cache = SwapCache::new(cfg.swap_dir(), cfg.swap.max_resident_bytes, format!("s{index}"));
        let lightmaps: Vec<Lightmap> = atlas_sizes.iter().map(|&(w, h)| Lightmap::new(&cache, w, h)).collect();

        if cfg.direct.enabled {
            let slice = ProgressSlice::new(progress, 0.1, 0.35);
            stats.direct = direct_lighting(sector, &lightmaps, &tracer, &cfg.direct, seed, &slice)?;
            let slice = ProgressSlice::new(progress, 0.45, 0.05);
            stats.vertex = shade_vertices(sector, &tracer, &slice)?;
        }
        check_cancel(progress)?;

        if cfg.indirect.enabled {
            let slice = ProgressSlice::new(progress, 0.5, 0.2);
            match emit_photons(sector, &tracer, &cfg.indirect, seed, &slice) {
                Ok((map, emission)) => {
                    stats.emission = Some(emission);
                    if let Some(base) = &cfg.indirect.dump_path {
                        let path = photon_dump_path(base, index);
                        map.save(&path)?;
                        tracing::info!(path = %path.display(), photons = map.len(), "photon map saved");
                    }
                    let slice = ProgressSlice::new(progress, 0.7, 0.25);
                    stats.indirect =
                        Some(indirect_lighting(sector, &lightmaps, &map, &tracer, &cfg.indirect, seed, &slice)?);
                }
                Err(Error::PhotonStorage(msg)) => {
                    tracing::error!(error = %msg, "photon storage exhausted, skipping indirect light");
                    stats.photon_error = Some(msg);
                }
                Err(e) => return Err(e),
            }
        }
        check_cancel(progress)?;

        let masks = build_masks(&cache, sector, &atlas_sizes)?;
        let ambient = cfg.lightmap.ambient.filter(|_| !cfg.indirect.enabled).map(Color::from_array);
        for (lightmap, mask) in lightmaps.iter().zip(&masks) {
            let mut lock = lightmap.lock()?;
            fixup_lightmap(&mut lock, &mask.lock()?, cfg.lightmap.fixup_epsilon);
            if let Some(ambient) = ambient {
                lock.add_ambient(ambient);
            }
        }
        drop(masks);
        tracing::debug!(atlases = lightmaps.len(), "border fixup done");
        if let Some(ambient) = ambient {
            for object in sector.objects.iter_mut().filter(|o| o.light_per_vertex && !o.no_light) {
                object.lit_colors.resize(object.vertices.len(), Color::ZERO);
                object.lit_colors.iter_mut().for_each(|c| *c += ambient);
            }
        }

        stats.swap_evictions = cache.evictions();
        progress.set_progress(1.0);
        tracing::info!(
            atlases = atlas_sizes.len(),
            clusters = stats.layout.clusters,
            dropped = stats.layout.dropped_primitives,
            lit = stats.direct.lit_elements,
            "sector baked"
        );
        Ok(SectorBake { name: sector.name.clone(), lightmaps, atlas_sizes, stats })
    }
}

/// Compute elements and patches of every packed primitive. Primitives whose
/// mapping is degenerate are unpacked; returns how many.
pub fn prepare_elements(sector: &mut Sector, patch_resolution: Option<u32>) -> usize {
    sector
        .objects
        .par_iter_mut()
        .map(|object| {
            let Object { vertices, primitives, illumination, .. } = object;
            let mut degenerate = 0;
            for prim in primitives.iter_mut().filter(|p| p.lightmap.is_some()) {
                if !prim.prepare(vertices, patch_resolution, *illumination) {
                    prim.lightmap = None;
                    degenerate += 1;
                }
            }
            degenerate
        })
        .sum()
}

/// Dump file of sector `index`: `<stem>_<index>.<ext>` next to `base`.
pub fn photon_dump_path(base: &Path, index: usize) -> PathBuf {
    let stem = base.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "photons".into());
    let name = match base.extension() {
        Some(ext) => format!("{stem}_{index}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{index}"),
    };
    base.with_file_name(name)
}

#[inline]
fn sector_seed(seed: u64, index: usize) -> u64 {
    seed ^ (index as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15)
}

#[inline]
fn check_cancel(progress: &dyn Progress) -> Result<()> {
    if progress.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Light, Vertex};
    use crate::util::{ProgressIndicator, Vec3};

    fn floor_sector(name: &str) -> Sector {
        let corners = [[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0]];
        let verts = corners
            .iter()
            .map(|c| Vertex::new(Vec3::new(c[0], c[1], 0.0), Vec3::Z))
            .collect();
        let (object, _) = Object::from_triangles("floor", verts, &[[0, 1, 2], [0, 2, 3]]);
        let mut sector = Sector::new(name);
        sector.objects.push(object);
        sector.lights.push(Light::point("l", Vec3::new(2.0, 2.0, 2.0), Color::ONE, 4.0));
        sector
    }

    fn config(dir: &Path) -> BakeConfig {
        let mut config = BakeConfig::default();
        config.lightmap.density = 1.0;
        config.direct.ray_samples = 512;
        config.swap.swap_dir = Some(dir.to_path_buf());
        config
    }

    #[test]
    fn test_dump_path_per_sector() {
        assert_eq!(photon_dump_path(Path::new("/tmp/p.bin"), 3), PathBuf::from("/tmp/p_3.bin"));
        assert_eq!(photon_dump_path(Path::new("out/photons"), 0), PathBuf::from("out/photons_0"));
    }

    #[test]
    fn test_bake_lights_floor() {
        let dir = tempfile::tempdir().unwrap();
        let baker = Baker::new(config(dir.path())).unwrap();
        let mut sector = floor_sector("room");
        let bake = baker.bake_sector(0, &mut sector, &ProgressIndicator::new()).unwrap();

        assert_eq!(bake.atlas_sizes, vec![(6, 6)]);
        assert_eq!(bake.stats.layout.clusters, 1);
        assert_eq!(bake.stats.direct.candidates, 2);
        let lock = bake.lightmaps[0].lock().unwrap();
        // Texel (3, 3) is centered right under the light: 4 / 2^2.
        let center = lock.get(3, 3);
        assert!((center - Color::ONE).length() < 1e-3, "{center:?}");
        let off = lock.get(2, 2);
        assert!(off.x > 0.5 && off.x < 0.6, "{off:?}");
        // The border ring is filled by dilation.
        assert!(lock.get(0, 0).x > 0.0);
    }

    #[test]
    fn test_ambient_only_without_indirect() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.direct.enabled = false;
        cfg.lightmap.ambient = Some([0.1, 0.2, 0.3]);
        let baker = Baker::new(cfg).unwrap();
        let mut sector = floor_sector("room");
        let bake = baker.bake_sector(0, &mut sector, &ProgressIndicator::new()).unwrap();
        let lock = bake.lightmaps[0].lock().unwrap();
        assert_eq!(lock.one_color(1e-6), Some(Color::new(0.1, 0.2, 0.3)));
    }

    #[test]
    fn test_cancelled_sector() {
        let dir = tempfile::tempdir().unwrap();
        let baker = Baker::new(config(dir.path())).unwrap();
        let progress = ProgressIndicator::new();
        progress.cancel();
        let mut sectors = vec![floor_sector("a"), floor_sector("b")];
        let results = baker.bake(&mut sectors, &progress);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| matches!(r, Err(Error::Cancelled))));
    }

    #[test]
    fn test_photon_dump_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.indirect.enabled = true;
        cfg.indirect.num_photons = 64;
        cfg.indirect.final_gather = true;
        cfg.indirect.final_gather_rays = 4;
        cfg.indirect.dump_path = Some(dir.path().join("photons.bin"));
        let baker = Baker::new(cfg).unwrap();
        let mut sector = floor_sector("room");
        let bake = baker.bake_sector(1, &mut sector, &ProgressIndicator::new()).unwrap();

        let emission = bake.stats.emission.unwrap();
        assert_eq!(emission.emitted, 64);
        let photons = crate::photon::load_photons(dir.path().join("photons_1.bin")).unwrap();
        assert_eq!(photons.len(), emission.stored);
        assert!(bake.stats.indirect.is_some());
    }

    #[test]
    fn test_per_vertex_object_skips_lightmap() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.lightmap.ambient = Some([0.1, 0.1, 0.1]);
        let baker = Baker::new(cfg).unwrap();
        let mut sector = floor_sector("room");
        let verts = [[1.0, 1.0], [2.0, 1.0], [2.0, 2.0]]
            .iter()
            .map(|c| Vertex::new(Vec3::new(c[0], c[1], 0.5), Vec3::Z))
            .collect();
        let (mut tile, _) = Object::from_triangles("tile", verts, &[[0, 1, 2]]);
        tile.light_per_vertex = true;
        sector.objects.push(tile);

        let bake = baker.bake_sector(0, &mut sector, &ProgressIndicator::new()).unwrap();
        assert_eq!(bake.stats.layout.clusters, 1);
        assert!(sector.objects[1].primitives.iter().all(|p| p.lightmap.is_none()));
        assert_eq!(bake.stats.vertex.vertices, 3);
        // Vertex 2 at (2, 2, 0.5) is straight below the light: 4 / 1.5^2, plus ambient.
        let lit = &sector.objects[1].lit_colors;
        assert!((lit[2].x - (4.0 / 2.25 + 0.1)).abs() < 1e-3, "{:?}", lit[2]);
    }
}
