//! Indirect lighting from the photon map.
//!
//! Each element either reads the photon map at its own center or, with final
//! gathering, averages photon map irradiance seen through hemisphere rays.
//! Gathered results can be reused through an [`IrradianceCache`].
//! The result goes into the lightmap only; patches never see indirect light.

use parking_lot::RwLock;
use rand::Rng;
use rayon::prelude::*;

use super::sampling::{hemisphere_direction, stream_rng};
use super::{apply_contributions, Contribution};
use crate::core::IndirectProperties;
use crate::lightmap::Lightmap;
use crate::photon::{IrradianceCache, PhotonMap, SearchParams};
use crate::raytrace::{Ray, RayTracer};
use crate::scene::{PrimitiveRef, Sector};
use crate::util::{Color, Error, Progress, ProgressState, Result, Vec3, SMALL_EPSILON};

const INDIRECT_SEED_SALT: u64 = 0xd1b5_4a32_d192_ed03;

/// Counters of one indirect pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndirectStats {
    pub elements: usize,
    pub gather_rays: usize,
    /// Gather rays that hit nothing and fell back to the element itself.
    pub gather_misses: usize,
    /// Elements answered from the irradiance cache.
    pub cache_hits: usize,
}

impl std::ops::AddAssign for IndirectStats {
    fn add_assign(&mut self, rhs: Self) {
        self.elements += rhs.elements;
        self.gather_rays += rhs.gather_rays;
        self.gather_misses += rhs.gather_misses;
        self.cache_hits += rhs.cache_hits;
    }
}

/// Irradiance query shared by every element of a pass.
pub struct Gatherer<'a> {
    pub sector: &'a Sector,
    pub map: &'a PhotonMap,
    pub tracer: &'a dyn RayTracer,
    pub params: SearchParams,
    /// Gather rays per element; zero samples the map in place.
    pub rays: usize,
    /// Final-gather reuse; ignored when `rays` is zero.
    pub cache: Option<&'a RwLock<IrradianceCache>>,
}

impl Gatherer<'_> {
    /// Irradiance at `pos` on primitive `r` facing `normal`.
    pub fn irradiance<R: Rng + ?Sized>(
        &self,
        r: PrimitiveRef,
        pos: Vec3,
        normal: Vec3,
        rng: &mut R,
        stats: &mut IndirectStats,
    ) -> Color {
        stats.elements += 1;
        if self.rays == 0 {
            return self.map.irradiance_estimate(pos, normal, &self.params);
        }

        if let Some(e) = self.cache.and_then(|c| c.read().estimate(pos, normal)) {
            stats.cache_hits += 1;
            return e;
        }

        let mut average = Color::ZERO;
        let mut hits = 0usize;
        let mut inverse_distance = 0.0;
        for k in 0..self.rays {
            let dir = hemisphere_direction(rng, normal);
            let sample = match self.tracer.trace_closest_hit(&Ray::new(pos, dir).ignoring(r)) {
                Some(hit) => {
                    hits += 1;
                    inverse_distance += 1.0 / hit.distance.max(SMALL_EPSILON);
                    let rho = self.sector.object(hit.primitive).reflectance;
                    let e = self.map.irradiance_estimate(hit.point, -dir, &self.params);
                    rho * e * (2.0 * dir.dot(normal))
                }
                None => {
                    stats.gather_misses += 1;
                    self.map.irradiance_estimate(pos, normal, &self.params)
                }
            };
            average += (sample - average) / (k + 1) as f32;
        }
        stats.gather_rays += self.rays;
        if let (Some(cache), true) = (self.cache, hits > 0) {
            cache.write().store(pos, normal, average, hits as f32 / inverse_distance);
        }
        average
    }
}

/// Add photon-mapped light to every lightmapped primitive of `sector`.
#[tracing::instrument(skip_all, fields(sector = %sector.name, photons = map.len()))]
pub fn indirect_lighting(
    sector: &mut Sector,
    lightmaps: &[Lightmap],
    map: &PhotonMap,
    tracer: &dyn RayTracer,
    props: &IndirectProperties,
    seed: u64,
    progress: &dyn Progress,
) -> Result<IndirectStats> {
    let shared: &Sector = sector;
    let cache = (props.final_gather && props.irradiance_cache)
        .then(|| RwLock::new(IrradianceCache::new(map.bbox(), props.cache_tolerance)));
    let gatherer = Gatherer {
        sector: shared,
        map,
        tracer,
        params: SearchParams::from(props),
        rays: if props.final_gather { props.final_gather_rays } else { 0 },
        cache: cache.as_ref(),
    };

    let refs: Vec<PrimitiveRef> = shared
        .primitive_refs()
        .filter(|r| !shared.object(*r).no_light && shared.primitive(*r).lightmap.is_some())
        .collect();
    let state = ProgressState::new(progress, refs.len(), 0.0, 1.0);

    let shaded: Vec<(Contribution, IndirectStats)> = refs
        .par_iter()
        .filter_map(|&r| {
            if state.is_cancelled() {
                return None;
            }
            let out = shade_indirect(&gatherer, r, props.indirect_scale, seed);
            state.advance();
            out
        })
        .collect();
    if state.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let mut stats = IndirectStats::default();
    let mut results = Vec::with_capacity(shaded.len());
    for (c, s) in shaded {
        stats += s;
        results.push(c);
    }
    apply_contributions(sector, lightmaps, &results, false)?;
    state.finish();

    tracing::info!(
        elements = stats.elements,
        gather_rays = stats.gather_rays,
        gather_misses = stats.gather_misses,
        cache_hits = stats.cache_hits,
        "indirect lighting done"
    );
    Ok(stats)
}

fn shade_indirect(
    gatherer: &Gatherer<'_>,
    r: PrimitiveRef,
    scale: f32,
    seed: u64,
) -> Option<(Contribution, IndirectStats)> {
    let prim = gatherer.sector.primitive(r);
    let atlas = prim.lightmap?;
    let normal = prim.normal();
    let mut rng = stream_rng(seed ^ INDIRECT_SEED_SALT, ((r.object as u64) << 32) | r.primitive as u64);
    let mut stats = IndirectStats::default();
    let mut out = Contribution::new(r, atlas);

    for index in 0..prim.element_count() {
        if prim.element_areas[index] <= 0.0 {
            continue;
        }
        let e = gatherer.irradiance(r, prim.element_center(index), normal, &mut rng, &mut stats);
        if e.max_element() <= 0.0 {
            continue;
        }
        out.push(prim, index, e * (prim.element_fraction(index) * scale));
    }
    Some((out, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PhotonMapKind, SwapCache};
    use crate::raytrace::BvhTracer;
    use crate::scene::{Object, Vertex};
    use crate::util::{NoProgress, Vec2};
    use std::f32::consts::PI;

    /// Unit quad in z = 0 mapped to the single texel (1, 1).
    fn receiver() -> Object {
        let corners = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        let verts = corners
            .iter()
            .map(|c| Vertex {
                position: Vec3::new(c[0], c[1], 0.0),
                normal: Vec3::Z,
                lightmap_uv: Vec2::new(c[0] + 0.5, c[1] + 0.5),
                ..Default::default()
            })
            .collect();
        let (mut object, _) = Object::from_triangles("floor", verts, &[[0, 1, 2], [0, 2, 3]]);
        for prim in &mut object.primitives {
            prim.lightmap = Some(0);
            assert!(prim.prepare(&object.vertices, None, Color::ZERO));
        }
        object
    }

    /// Downward-facing 10x10 quad at z = 1 without a lightmap.
    fn ceiling(reflectance: f32) -> Object {
        let corners = [[-5.0, -5.0], [5.0, -5.0], [5.0, 5.0], [-5.0, 5.0]];
        let verts = corners
            .iter()
            .map(|c| Vertex::new(Vec3::new(c[0], c[1], 1.0), -Vec3::Z))
            .collect();
        let (mut object, _) = Object::from_triangles("ceiling", verts, &[[0, 2, 1], [0, 3, 2]]);
        object.reflectance = Color::splat(reflectance);
        object
    }

    fn props(final_gather: bool) -> IndirectProperties {
        IndirectProperties {
            enabled: true,
            min_photons: 1,
            max_density_samples: 50,
            search_radius: 1.0,
            final_gather,
            final_gather_rays: 64,
            ..Default::default()
        }
    }

    /// Ten unit photons falling straight down onto the texel center.
    fn floor_photons() -> PhotonMap {
        let mut map = PhotonMap::new(PhotonMapKind::Incremental, 16).unwrap();
        for _ in 0..10 {
            map.store(Vec3::new(0.5, 0.5, 0.0), Color::ONE, -Vec3::Z).unwrap();
        }
        map
    }

    /// Photons arriving at the ceiling from below, irradiance ~1 everywhere.
    fn ceiling_photons() -> PhotonMap {
        let mut map = PhotonMap::new(PhotonMapKind::Balanced, 4096).unwrap();
        for i in 0..=50 {
            for j in 0..=50 {
                let pos = Vec3::new(-5.0 + 0.2 * i as f32, -5.0 + 0.2 * j as f32, 1.0);
                map.store(pos, Color::splat(0.04), Vec3::Z).unwrap();
            }
        }
        map.prepare(&NoProgress).unwrap();
        map
    }

    fn bake(sector: &mut Sector, map: &PhotonMap, props: &IndirectProperties) -> (Color, IndirectStats) {
        let dir = tempfile::tempdir().unwrap();
        let cache = SwapCache::new(dir.path(), 1 << 20, "t");
        let lightmaps = vec![Lightmap::new(&cache, 3, 3)];
        let tracer = BvhTracer::from_sector(sector);
        let stats = indirect_lighting(sector, &lightmaps, map, &tracer, props, 5, &NoProgress).unwrap();
        let texel = lightmaps[0].lock().unwrap().get(1, 1);
        (texel, stats)
    }

    #[test]
    fn test_direct_estimate_scaled() {
        let mut sector = Sector::new("s");
        sector.objects.push(receiver());
        let mut p = props(false);
        p.indirect_scale = 2.0;
        let (texel, stats) = bake(&mut sector, &floor_photons(), &p);
        // Both triangles cover half the texel: 2 * 0.5 * 2 * 10 / pi.
        assert!((texel - Color::splat(20.0 / PI)).length() < 1e-3, "{texel:?}");
        assert_eq!(stats.elements, 2);
        assert_eq!(stats.gather_rays, 0);
    }

    #[test]
    fn test_gather_misses_fall_back_in_place() {
        let mut sector = Sector::new("s");
        sector.objects.push(receiver());
        let (texel, stats) = bake(&mut sector, &floor_photons(), &props(true));
        assert_eq!(stats.gather_rays, 128);
        assert_eq!(stats.gather_misses, 128);
        assert!((texel - Color::splat(10.0 / PI)).length() < 1e-3, "{texel:?}");
    }

    #[test]
    fn test_gather_from_lit_ceiling() {
        let mut sector = Sector::new("s");
        sector.objects.push(receiver());
        sector.objects.push(ceiling(0.5));

        let (texel, stats) = bake(&mut sector, &ceiling_photons(), &props(true));
        assert!(stats.gather_misses < 45, "{}", stats.gather_misses);
        // Expect about reflectance * irradiance.
        assert!(texel.x > 0.35 && texel.x < 0.6, "{texel:?}");
    }

    #[test]
    fn test_cache_reuses_nearby_gather() {
        let mut sector = Sector::new("s");
        sector.objects.push(receiver());
        sector.objects.push(ceiling(0.5));
        let map = ceiling_photons();
        let tracer = BvhTracer::from_sector(&sector);
        let cache = RwLock::new(IrradianceCache::new(map.bbox(), 0.25));
        let gatherer = Gatherer {
            sector: &sector,
            map: &map,
            tracer: &tracer,
            params: SearchParams::from(&props(true)),
            rays: 64,
            cache: Some(&cache),
        };

        let r = PrimitiveRef::new(0, 0);
        let mut rng = stream_rng(1, 0);
        let mut stats = IndirectStats::default();
        let first = gatherer.irradiance(r, Vec3::new(0.7, 0.3, 0.0), Vec3::Z, &mut rng, &mut stats);
        let second = gatherer.irradiance(r, Vec3::new(0.75, 0.3, 0.0), Vec3::Z, &mut rng, &mut stats);
        assert_eq!(stats.gather_rays, 64);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(cache.read().len(), 1);
        assert!((first - second).length() < 1e-4, "{first:?} {second:?}");

        // Out of reach of the stored sample.
        gatherer.irradiance(r, Vec3::new(3.2, 0.3, 0.0), Vec3::Z, &mut rng, &mut stats);
        assert_eq!(stats.gather_rays, 128);
        assert_eq!(cache.read().len(), 2);
    }
}
