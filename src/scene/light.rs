//! Light sources.

use crate::util::{Color, Vec3};

/// Emission shape of a light.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LightKind {
    /// Omnidirectional point light.
    Point,
    /// Point light restricted to a cone; cosines of the half-angles.
    Spot { direction: Vec3, inner_cos: f32, outer_cos: f32 },
    /// Light arriving from infinitely far along `direction`.
    Directional { direction: Vec3 },
}

/// Scene light.
#[derive(Clone, Debug, PartialEq)]
pub struct Light {
    pub name: String,
    pub position: Vec3,
    pub color: Color,
    pub power: f32,
    pub kind: LightKind,
}

impl Light {
    pub fn point(name: impl Into<String>, position: Vec3, color: Color, power: f32) -> Self {
        Self { name: name.into(), position, color, power, kind: LightKind::Point }
    }

    /// Energy before any bounce.
    #[inline]
    pub fn free_energy(&self) -> Color {
        self.color * self.power
    }

    /// Only point-like lights can seed photons.
    #[inline]
    pub fn emits_photons(&self) -> bool {
        matches!(self.kind, LightKind::Point)
    }

    /// Angular falloff toward `dir` (unit vector from the light).
    pub fn cone_factor(&self, dir: Vec3) -> f32 {
        match self.kind {
            LightKind::Spot { direction, inner_cos, outer_cos } => {
                let c = dir.dot(direction.normalize_or_zero());
                if c >= inner_cos {
                    1.0
                } else if c <= outer_cos || inner_cos <= outer_cos {
                    0.0
                } else {
                    let t = (c - outer_cos) / (inner_cos - outer_cos);
                    t * t * (3.0 - 2.0 * t)
                }
            }
            _ => 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spot_falloff() {
        let mut light = Light::point("s", Vec3::ZERO, Color::ONE, 1.0);
        light.kind = LightKind::Spot { direction: -Vec3::Z, inner_cos: 0.9, outer_cos: 0.5 };
        assert_eq!(light.cone_factor(-Vec3::Z), 1.0);
        assert_eq!(light.cone_factor(Vec3::X), 0.0);
        let mid = light.cone_factor(Vec3::new(0.0, 0.8, -0.6));
        assert!(mid > 0.0 && mid < 1.0);
        assert!(!light.emits_photons());
    }
}
