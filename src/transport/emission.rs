//! Photon emission.

use std::f32::consts::PI;

use rayon::prelude::*;

use super::sampling::{cosine_hemisphere, sphere_direction, stream_rng};
use crate::core::IndirectProperties;
use crate::photon::PhotonMap;
use crate::raytrace::{Ray, RayTracer};
use crate::scene::{Light, Sector};
use crate::util::{luminance, Color, Error, Progress, ProgressSlice, ProgressState, Result, Vec3};

/// Keeps emission streams apart from the direct-lighting ones.
const EMISSION_SEED_SALT: u64 = 0x9e37_79b9_7f4a_7c15;

/// Photon seeds checked between cancellation polls.
const CANCEL_POLL: usize = 1024;

/// Counters of one emission pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmissionStats {
    pub emitted: usize,
    pub stored: usize,
    pub unsupported_lights: usize,
}

/// One photon before it goes into the map.
#[derive(Debug, Clone, Copy)]
struct Deposit {
    position: Vec3,
    power: Color,
    direction: Vec3,
}

/// Number of photons each light gets out of `total`, by luminous power.
/// Lights that cannot emit get zero.
pub fn photon_shares(lights: &[Light], total: usize) -> Vec<usize> {
    let power: Vec<f32> = lights
        .iter()
        .map(|l| if l.emits_photons() { luminance(l.free_energy()).max(0.0) } else { 0.0 })
        .collect();
    let sum: f32 = power.iter().sum();
    if sum <= 0.0 {
        return vec![0; lights.len()];
    }
    power.iter().map(|p| (total as f32 * p / sum).round() as usize).collect()
}

/// Emit and trace the photons of `sector`, returning a map ready for queries.
///
/// Photons are stored at diffuse hits. The first hit is kept only for final
/// gathering, where the gathered radiance has to include direct light.
#[tracing::instrument(skip_all, fields(sector = %sector.name, photons = props.num_photons))]
pub fn emit_photons(
    sector: &Sector,
    tracer: &dyn RayTracer,
    props: &IndirectProperties,
    seed: u64,
    progress: &dyn Progress,
) -> Result<(PhotonMap, EmissionStats)> {
    let mut stats = EmissionStats::default();
    for light in sector.lights.iter().filter(|l| !l.emits_photons()) {
        tracing::warn!(light = %light.name, kind = ?light.kind, "light type unsupported for indirect light");
        stats.unsupported_lights += 1;
    }

    let shares = photon_shares(&sector.lights, props.num_photons);
    let total: usize = shares.iter().sum();
    let state = ProgressState::new(progress, total, 0.0, 0.9);

    let traced: Vec<Vec<Deposit>> = sector
        .lights
        .par_iter()
        .zip(shares.par_iter())
        .enumerate()
        .map(|(index, (light, &count))| {
            trace_light(sector, light, count, tracer, props, seed, index as u64, &state)
        })
        .collect::<Result<_>>()?;

    let mut map = PhotonMap::new(props.photon_map, 2 * props.num_photons)?;
    for (light, deposits) in sector.lights.iter().zip(&traced) {
        tracing::debug!(light = %light.name, stored = deposits.len(), "photons traced");
        for d in deposits {
            map.store(d.position, d.power, d.direction)?;
        }
    }
    stats.emitted = total;
    stats.stored = map.len();

    map.prepare(&ProgressSlice::new(progress, 0.9, 0.1))?;
    tracing::info!(emitted = stats.emitted, stored = stats.stored, "photon map ready");
    Ok((map, stats))
}

#[allow(clippy::too_many_arguments)]
fn trace_light(
    sector: &Sector,
    light: &Light,
    count: usize,
    tracer: &dyn RayTracer,
    props: &IndirectProperties,
    seed: u64,
    stream: u64,
    state: &ProgressState<'_>,
) -> Result<Vec<Deposit>> {
    let mut out = Vec::new();
    if count == 0 {
        return Ok(out);
    }
    let mut rng = stream_rng(seed ^ EMISSION_SEED_SALT, stream);
    let start_power = light.free_energy() * (4.0 * PI / count as f32);

    for i in 0..count {
        if i % CANCEL_POLL == 0 && state.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let mut ray = Ray::new(light.position, sphere_direction(&mut rng));
        let mut power = start_power;

        for bounce in 0..=props.photon_bounces {
            let Some(hit) = tracer.trace_closest_hit(&ray) else { break };
            if bounce > 0 || props.final_gather {
                out.push(Deposit { position: hit.point, power, direction: ray.direction });
            }
            if bounce == props.photon_bounces {
                break;
            }
            power *= sector.object(hit.primitive).reflectance;
            if power.max_element() <= 0.0 {
                break;
            }
            let n = sector.primitive(hit.primitive).normal();
            let facing = if n.dot(ray.direction) < 0.0 { n } else { -n };
            ray = Ray::new(hit.point, cosine_hemisphere(&mut rng, facing)).ignoring(hit.primitive);
        }
        state.advance();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PhotonMapKind;
    use crate::raytrace::BvhTracer;
    use crate::scene::{LightKind, Object, Vertex};
    use crate::util::NoProgress;

    /// 10x10 quad at height `z`; `up` picks the facing.
    fn quad(z: f32, up: bool) -> Object {
        let corners = [[-5.0, -5.0], [5.0, -5.0], [5.0, 5.0], [-5.0, 5.0]];
        let normal = if up { Vec3::Z } else { -Vec3::Z };
        let verts = corners
            .iter()
            .map(|c| Vertex::new(Vec3::new(c[0], c[1], z), normal))
            .collect();
        let tris = if up { [[0, 1, 2], [0, 2, 3]] } else { [[0, 2, 1], [0, 3, 2]] };
        Object::from_triangles("quad", verts, &tris).0
    }

    fn floor() -> Object {
        quad(0.0, true)
    }

    #[test]
    fn test_shares_follow_luminance() {
        let mut spot = Light::point("spot", Vec3::ZERO, Color::ONE, 10.0);
        spot.kind = LightKind::Spot { direction: -Vec3::Z, inner_cos: 0.9, outer_cos: 0.8 };
        let lights = vec![
            Light::point("a", Vec3::ZERO, Color::ONE, 3.0),
            Light::point("b", Vec3::ZERO, Color::ONE, 1.0),
            spot,
        ];
        assert_eq!(photon_shares(&lights, 100), vec![75, 25, 0]);
        assert_eq!(photon_shares(&lights[2..], 100), vec![0]);
    }

    #[test]
    fn test_first_hits_kept_for_final_gather() {
        let mut sector = Sector::new("s");
        sector.objects.push(floor());
        sector.lights.push(Light::point("l", Vec3::new(0.0, 0.0, 1.0), Color::ONE, 1.0));
        let tracer = BvhTracer::from_sector(&sector);

        let mut props = IndirectProperties { num_photons: 200, photon_bounces: 0, ..Default::default() };
        let (map, stats) = emit_photons(&sector, &tracer, &props, 3, &NoProgress).unwrap();
        // Nothing bounces and first hits are discarded.
        assert_eq!(stats.emitted, 200);
        assert!(map.is_empty());

        props.final_gather = true;
        props.photon_map = PhotonMapKind::Incremental;
        let (map, stats) = emit_photons(&sector, &tracer, &props, 3, &NoProgress).unwrap();
        // Roughly half of the sphere points down at the floor.
        assert!(stats.stored > 60 && stats.stored < 140, "{}", stats.stored);
        assert_eq!(map.len(), stats.stored);
        let p = map.photon(0);
        assert!(p.position.z.abs() < 1e-4);
        assert!((p.power - Color::splat(4.0 * PI / 200.0)).length() < 1e-5);
    }

    #[test]
    fn test_bounces_scale_power_by_reflectance() {
        let mut sector = Sector::new("s");
        let mut a = floor();
        a.reflectance = Color::splat(0.5);
        sector.objects.push(a);
        sector.objects.push(quad(2.0, false));
        sector.lights.push(Light::point("l", Vec3::new(0.0, 0.0, 1.0), Color::ONE, 1.0));
        let tracer = BvhTracer::from_sector(&sector);

        let props = IndirectProperties { num_photons: 100, photon_bounces: 1, ..Default::default() };
        let (map, _) = emit_photons(&sector, &tracer, &props, 9, &NoProgress).unwrap();
        assert!(!map.is_empty());
        let base = 4.0 * PI / 100.0;
        for i in 1..=map.len() {
            let power = map.photon(i).power;
            assert!(power.x < base * 0.71, "{power:?}");
        }
    }

    #[test]
    fn test_unsupported_lights_counted() {
        let mut sector = Sector::new("s");
        sector.objects.push(floor());
        let mut sun = Light::point("sun", Vec3::ZERO, Color::ONE, 1.0);
        sun.kind = LightKind::Directional { direction: -Vec3::Z };
        sector.lights.push(sun);
        let tracer = BvhTracer::from_sector(&sector);
        let (map, stats) =
            emit_photons(&sector, &tracer, &IndirectProperties::default(), 0, &NoProgress).unwrap();
        assert_eq!(stats.unsupported_lights, 1);
        assert_eq!(stats.emitted, 0);
        assert!(map.is_empty());
    }
}
