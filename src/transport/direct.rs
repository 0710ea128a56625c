//! Direct lighting.
//!
//! Every light shoots a fixed number of sphere rays to discover which
//! primitives it can reach; only those are shaded. Each element of a shaded
//! primitive receives `I * cos / d^2`, weighted by the element's texel
//! coverage and a five-point visibility test.
//!
//! Objects lit per vertex skip all of that: [`shade_vertices`] evaluates
//! every light at every vertex with one shadow ray.

use std::collections::BTreeSet;

use rayon::prelude::*;

use super::sampling::{sphere_direction, stream_rng};
use super::{apply_contributions, Contribution};
use crate::core::DirectProperties;
use crate::lightmap::Lightmap;
use crate::raytrace::{Ray, RayTracer};
use crate::scene::{Light, LightKind, Primitive, PrimitiveRef, Sector};
use crate::util::{Color, Error, Progress, ProgressState, Result, Vec3};

/// Counters of one direct pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectStats {
    pub lights: usize,
    pub candidates: usize,
    pub lit_elements: usize,
}

/// Counters of one per-vertex pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VertexLightStats {
    pub objects: usize,
    pub vertices: usize,
    /// Vertices that received light from at least one light.
    pub lit_vertices: usize,
}

/// Visibility share removed per blocked sample point.
const BLOCKED_SAMPLE_WEIGHT: f32 = 0.2;

/// Shadow ray origins are lifted this far off the vertex along its normal.
const VERTEX_OFFSET: f32 = 1e-3;

/// Shade every lightmapped primitive of `sector` reachable from its lights.
#[tracing::instrument(skip_all, fields(sector = %sector.name, lights = sector.lights.len()))]
pub fn direct_lighting(
    sector: &mut Sector,
    lightmaps: &[Lightmap],
    tracer: &dyn RayTracer,
    props: &DirectProperties,
    seed: u64,
    progress: &dyn Progress,
) -> Result<DirectStats> {
    let mut stats = DirectStats::default();
    let lights = sector.lights.clone();
    let state = ProgressState::new(progress, lights.len(), 0.0, 1.0);

    for (light_index, light) in lights.iter().enumerate() {
        if state.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let shared: &Sector = sector;
        let candidates = find_candidates(shared, light, tracer, props.ray_samples, seed, light_index as u64);
        tracing::debug!(light = %light.name, candidates = candidates.len(), "shading light");

        let results: Vec<Contribution> = candidates
            .par_iter()
            .filter_map(|&r| shade_primitive(shared, r, light, tracer, props.multi_sample_visibility))
            .collect();

        stats.lights += 1;
        stats.candidates += candidates.len();
        stats.lit_elements += results.iter().map(|c| c.texels.len()).sum::<usize>();
        apply_contributions(sector, lightmaps, &results, true)?;
        state.advance();
    }

    state.finish();
    tracing::info!(
        lights = stats.lights,
        candidates = stats.candidates,
        elements = stats.lit_elements,
        "direct lighting done"
    );
    Ok(stats)
}

/// Lightmapped primitives a light can reach.
///
/// Point and spot lights trace `samples` uniform sphere rays and keep every
/// primitive hit first. Directional lights have no position to shoot from,
/// so all lightmapped primitives are candidates.
pub fn find_candidates(
    sector: &Sector,
    light: &Light,
    tracer: &dyn RayTracer,
    samples: usize,
    seed: u64,
    stream: u64,
) -> Vec<PrimitiveRef> {
    let lit = |r: &PrimitiveRef| {
        let object = sector.object(*r);
        !object.no_light && sector.primitive(*r).lightmap.is_some()
    };

    if let LightKind::Directional { .. } = light.kind {
        return sector.primitive_refs().filter(lit).collect();
    }

    let mut rng = stream_rng(seed, stream);
    let mut found = BTreeSet::new();
    for _ in 0..samples {
        let dir = sphere_direction(&mut rng);
        if light.cone_factor(dir) <= 0.0 {
            continue;
        }
        if let Some(hit) = tracer.trace_closest_hit(&Ray::new(light.position, dir)) {
            found.insert(hit.primitive);
        }
    }
    found.into_iter().filter(lit).collect()
}

/// Direct light of one primitive, or `None` if nothing reaches it.
pub fn shade_primitive(
    sector: &Sector,
    r: PrimitiveRef,
    light: &Light,
    tracer: &dyn RayTracer,
    multi_sample: bool,
) -> Option<Contribution> {
    let prim = sector.primitive(r);
    let atlas = prim.lightmap?;
    let normal = prim.normal();
    let free_energy = light.free_energy();
    let mut out = Contribution::new(r, atlas);

    for index in 0..prim.element_count() {
        if prim.element_areas[index] <= 0.0 {
            continue;
        }
        let center = prim.element_center(index);
        let Some((to_light, falloff, cone)) = incidence(light, center) else { continue };
        let cos = normal.dot(to_light);
        if cos <= 0.0 || cone <= 0.0 {
            continue;
        }

        let visibility = visibility(prim, r, center, light, to_light, tracer, multi_sample);
        if visibility <= 0.0 {
            continue;
        }
        let energy = free_energy * (cos * falloff * cone * prim.element_fraction(index) * visibility);
        out.push(prim, index, energy);
    }
    (!out.texels.is_empty()).then_some(out)
}

/// Direction to the light, distance falloff and cone factor at `point`.
fn incidence(light: &Light, point: Vec3) -> Option<(Vec3, f32, f32)> {
    match light.kind {
        LightKind::Directional { direction } => Some((-direction.normalize_or_zero(), 1.0, 1.0)),
        _ => {
            let delta = light.position - point;
            let d2 = delta.length_squared();
            if d2 <= 0.0 {
                return None;
            }
            let dir = delta / d2.sqrt();
            Some((dir, 1.0 / d2, light.cone_factor(-dir)))
        }
    }
}

/// Light every vertex of the sector's `light_per_vertex` objects into
/// [`Object::lit_colors`](crate::scene::Object::lit_colors).
#[tracing::instrument(skip_all, fields(sector = %sector.name))]
pub fn shade_vertices(sector: &mut Sector, tracer: &dyn RayTracer, progress: &dyn Progress) -> Result<VertexLightStats> {
    let targets: Vec<usize> = (0..sector.objects.len())
        .filter(|&i| sector.objects[i].light_per_vertex && !sector.objects[i].no_light)
        .collect();
    let total = targets.iter().map(|&i| sector.objects[i].vertices.len()).sum();
    let state = ProgressState::new(progress, total, 0.0, 1.0);
    let mut stats = VertexLightStats::default();

    for index in targets {
        if state.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let shared: &Sector = sector;
        let colors: Vec<Color> = shared.objects[index]
            .vertices
            .vertices
            .par_iter()
            .map(|v| {
                let c = shade_point(&shared.lights, v.position, v.normal.normalize_or_zero(), tracer);
                state.advance();
                c
            })
            .collect();

        stats.objects += 1;
        stats.vertices += colors.len();
        stats.lit_vertices += colors.iter().filter(|c| c.max_element() > 0.0).count();
        sector.objects[index].lit_colors = colors;
    }

    state.finish();
    tracing::info!(objects = stats.objects, vertices = stats.vertices, lit = stats.lit_vertices, "vertex lighting done");
    Ok(stats)
}

/// Direct light at a surface point; lights it cannot see add nothing.
fn shade_point(lights: &[Light], point: Vec3, normal: Vec3, tracer: &dyn RayTracer) -> Color {
    let origin = point + normal * VERTEX_OFFSET;
    let mut out = Color::ZERO;
    for light in lights {
        let Some((to_light, falloff, cone)) = incidence(light, point) else { continue };
        let cos = normal.dot(to_light);
        if cos <= 0.0 || cone <= 0.0 {
            continue;
        }
        let ray = match light.kind {
            LightKind::Directional { .. } => Ray::new(origin, to_light),
            _ => Ray::segment(origin, light.position),
        };
        if tracer.trace_any_hit(&ray) {
            continue;
        }
        out += light.free_energy() * (cos * falloff * cone);
    }
    out
}

/// Fraction of sample points on the element that see the light.
#[allow(clippy::too_many_arguments)]
fn visibility(
    prim: &Primitive,
    r: PrimitiveRef,
    center: Vec3,
    light: &Light,
    to_light: Vec3,
    tracer: &dyn RayTracer,
    multi_sample: bool,
) -> f32 {
    let blocked = |p: Vec3| {
        let ray = match light.kind {
            LightKind::Directional { .. } => Ray::new(p, to_light),
            _ => Ray::segment(p, light.position),
        };
        tracer.trace_any_hit(&ray.ignoring(r))
    };

    if !multi_sample {
        return if blocked(center) { 0.0 } else { 1.0 };
    }

    let (hu, hv) = (prim.u_form * 0.5, prim.v_form * 0.5);
    let points = [center, center + hu, center - hu, center + hv, center - hv];
    let hidden = points.iter().filter(|p| blocked(**p)).count();
    (1.0 - BLOCKED_SAMPLE_WEIGHT * hidden as f32).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raytrace::BvhTracer;
    use crate::scene::{Object, Vertex};
    use crate::util::{NoProgress, Vec2};

    /// Unit quad in z = 0 mapped to a single texel at lightmap-UV (1, 1).
    fn one_texel_quad() -> Object {
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
        let (mut object, _) = Object::from_triangles("quad", verts, &[[0, 1, 2], [0, 2, 3]]);
        for prim in &mut object.primitives {
            prim.lightmap = Some(0);
            assert!(prim.prepare(&object.vertices, None, Color::ZERO));
        }
        object
    }

    #[test]
    fn test_unoccluded_element_energy() {
        let mut sector = Sector::new("s");
        sector.objects.push(one_texel_quad());
        sector.lights.push(Light::point("l", Vec3::new(0.5, 0.5, 2.0), Color::new(1.0, 0.5, 0.25), 8.0));
        let tracer = BvhTracer::from_sector(&sector);

        let r = PrimitiveRef::new(0, 0);
        let c = shade_primitive(&sector, r, &sector.lights[0], &tracer, true).unwrap();
        assert_eq!(c.texels.len(), 1);
        let (texel, energy) = c.texels[0];
        assert_eq!(texel, crate::util::IVec2::new(1, 1));
        // Half of the texel is covered by this triangle.
        let expected = Color::new(1.0, 0.5, 0.25) * 8.0 / 4.0 * 0.5;
        assert!((energy - expected).length() < 1e-3, "{energy:?}");
    }

    #[test]
    fn test_light_behind_surface() {
        let mut sector = Sector::new("s");
        sector.objects.push(one_texel_quad());
        sector.lights.push(Light::point("l", Vec3::new(0.5, 0.5, -2.0), Color::ONE, 1.0));
        let tracer = BvhTracer::from_sector(&sector);
        assert!(shade_primitive(&sector, PrimitiveRef::new(0, 0), &sector.lights[0], &tracer, true).is_none());
    }

    #[test]
    fn test_candidates_found_by_sphere_rays() {
        let mut sector = Sector::new("s");
        sector.objects.push(one_texel_quad());
        sector.lights.push(Light::point("l", Vec3::new(0.5, 0.5, 0.5), Color::ONE, 1.0));
        let tracer = BvhTracer::from_sector(&sector);
        let found = find_candidates(&sector, &sector.lights[0], &tracer, 2000, 0, 0);
        assert_eq!(found, vec![PrimitiveRef::new(0, 0), PrimitiveRef::new(0, 1)]);
    }

    fn per_vertex_quad() -> Object {
        let mut object = one_texel_quad();
        for prim in &mut object.primitives {
            prim.lightmap = None;
        }
        object.light_per_vertex = true;
        object
    }

    #[test]
    fn test_vertices_lit_per_vertex() {
        let mut sector = Sector::new("s");
        sector.objects.push(per_vertex_quad());
        sector.lights.push(Light::point("l", Vec3::new(0.0, 0.0, 2.0), Color::ONE, 4.0));
        let tracer = BvhTracer::from_sector(&sector);

        let stats = shade_vertices(&mut sector, &tracer, &NoProgress).unwrap();
        assert_eq!(stats, VertexLightStats { objects: 1, vertices: 4, lit_vertices: 4 });
        let lit = &sector.objects[0].lit_colors;
        // Vertex 0 sits right under the light: 4 / 2^2.
        assert!((lit[0] - Color::ONE).length() < 1e-4, "{:?}", lit[0]);
        // Vertex 2 at (1, 1, 0): d^2 = 6, cos = 2 / sqrt(6).
        let expected = 4.0 * (2.0 / 6f32.sqrt()) / 6.0;
        assert!((lit[2].x - expected).abs() < 1e-4, "{:?}", lit[2]);
    }

    #[test]
    fn test_vertex_shadowed_by_blocker() {
        let mut sector = Sector::new("s");
        sector.objects.push(per_vertex_quad());
        // Large blocker halfway up, facing down.
        let verts = [[-5.0, -5.0], [5.0, -5.0], [5.0, 5.0], [-5.0, 5.0]]
            .iter()
            .map(|c| Vertex::new(Vec3::new(c[0], c[1], 1.0), -Vec3::Z))
            .collect();
        sector.objects.push(Object::from_triangles("blocker", verts, &[[0, 2, 1], [0, 3, 2]]).0);
        sector.lights.push(Light::point("l", Vec3::new(0.5, 0.5, 2.0), Color::ONE, 4.0));
        let tracer = BvhTracer::from_sector(&sector);

        let stats = shade_vertices(&mut sector, &tracer, &NoProgress).unwrap();
        assert_eq!(stats.objects, 1);
        assert_eq!(stats.lit_vertices, 0);
        assert!(sector.objects[0].lit_colors.iter().all(|c| *c == Color::ZERO));
        assert!(sector.objects[1].lit_colors.is_empty());
    }
}
