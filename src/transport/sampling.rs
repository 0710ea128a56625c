//! Random direction sampling.

use std::f32::consts::PI;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::util::Vec3;

/// Independent, reproducible random stream `stream` of a bake seeded with
/// `seed`.
pub fn stream_rng(seed: u64, stream: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(stream);
    rng
}

/// Uniform direction on the unit sphere (Marsaglia's rejection method).
pub fn sphere_direction<R: Rng + ?Sized>(rng: &mut R) -> Vec3 {
    loop {
        let x1: f32 = rng.gen_range(-1.0..=1.0);
        let x2: f32 = rng.gen_range(-1.0..=1.0);
        let s = x1 * x1 + x2 * x2;
        if s >= 1.0 {
            continue;
        }
        let r = 2.0 * (1.0 - s).sqrt();
        return Vec3::new(x1 * r, x2 * r, 1.0 - 2.0 * s);
    }
}

/// Uniform direction on the hemisphere around `normal`.
pub fn hemisphere_direction<R: Rng + ?Sized>(rng: &mut R, normal: Vec3) -> Vec3 {
    let d = sphere_direction(rng);
    if d.dot(normal) < 0.0 {
        -d
    } else {
        d
    }
}

/// Cosine-weighted direction on the hemisphere around `normal`.
pub fn cosine_hemisphere<R: Rng + ?Sized>(rng: &mut R, normal: Vec3) -> Vec3 {
    let u1: f32 = rng.gen();
    let u2: f32 = rng.gen();
    let r = u1.sqrt();
    let phi = 2.0 * PI * u2;
    let (t, b) = normal.any_orthonormal_pair();
    (t * (r * phi.cos()) + b * (r * phi.sin()) + normal * (1.0 - u1).max(0.0).sqrt()).normalize_or(normal)
}
