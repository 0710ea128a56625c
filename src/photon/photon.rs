//! Photon record and its quantized direction.

use std::f32::consts::PI;

use crate::util::{Color, Vec3};

/// One stored photon.
///
/// The incoming direction is kept as two spherical angles of one byte each;
/// [`DirectionTables`] turns them back into a vector.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Photon {
    pub position: Vec3,
    pub power: Color,
    pub theta: u8,
    pub phi: u8,
    /// Splitting axis once the photon is an inner tree node.
    pub plane: u8,
}

impl Photon {
    /// Photon travelling along `direction` (unit vector).
    pub fn new(position: Vec3, power: Color, direction: Vec3) -> Self {
        let (theta, phi) = quantize_direction(direction);
        Self { position, power, theta, phi, plane: 0 }
    }
}

/// Quantize a unit vector to `(theta, phi)` bytes.
pub fn quantize_direction(dir: Vec3) -> (u8, u8) {
    let theta = (dir.z.clamp(-1.0, 1.0).acos() * (256.0 / PI)) as i32;
    let mut phi = (dir.y.atan2(dir.x) * (256.0 / (2.0 * PI))) as i32;
    if phi < 0 {
        phi += 256;
    }
    (theta.clamp(0, 255) as u8, phi.clamp(0, 255) as u8)
}

/// Sine and cosine lookup for the quantized angles.
#[derive(Clone, Debug)]
pub struct DirectionTables {
    cos_theta: [f32; 256],
    sin_theta: [f32; 256],
    cos_phi: [f32; 256],
    sin_phi: [f32; 256],
}

impl DirectionTables {
    pub fn new() -> Self {
        let mut t = Self {
            cos_theta: [0.0; 256],
            sin_theta: [0.0; 256],
            cos_phi: [0.0; 256],
            sin_phi: [0.0; 256],
        };
        for i in 0..256 {
            let angle = i as f32 * (PI / 256.0);
            t.cos_theta[i] = angle.cos();
            t.sin_theta[i] = angle.sin();
            t.cos_phi[i] = (2.0 * angle).cos();
            t.sin_phi[i] = (2.0 * angle).sin();
        }
        t
    }

    /// Direction a photon was travelling in.
    #[inline]
    pub fn direction(&self, photon: &Photon) -> Vec3 {
        let (t, p) = (photon.theta as usize, photon.phi as usize);
        Vec3::new(
            self.sin_theta[t] * self.cos_phi[p],
            self.sin_theta[t] * self.sin_phi[p],
            self.cos_theta[t],
        )
    }
}

impl Default for DirectionTables {
    fn default() -> Self {
        Self::new()
    }
}
