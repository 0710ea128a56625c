//! Density estimation kernels.

use std::f32::consts::PI;

use crate::core::PhotonFilter;

const GAUSS_ALPHA: f32 = 0.918;
const GAUSS_BETA: f32 = 1.953;

/// Mean of the Gaussian weight over the search disk. With `u = d^2 / r^2`
/// uniform on `[0, 1]`, `E[exp(-b u / 2)] = (1 - exp(-b / 2)) / (b / 2)`.
fn gaussian_mean_weight() -> f32 {
    let half = GAUSS_BETA * 0.5;
    let mean_exp = (1.0 - (-half).exp()) / half;
    GAUSS_ALPHA * (1.0 - (1.0 - mean_exp) / (1.0 - (-GAUSS_BETA).exp()))
}

impl PhotonFilter {
    /// Weight of a photon at squared distance `dist2` inside a search
    /// sphere of squared radius `r2`.
    #[inline]
    pub fn weight(&self, dist2: f32, r2: f32) -> f32 {
        match *self {
            PhotonFilter::None => 1.0,
            PhotonFilter::Cone { k } => {
                let r = r2.sqrt();
                if r <= 0.0 {
                    return 1.0;
                }
                (1.0 - dist2.sqrt() / (k * r)).max(0.0)
            }
            PhotonFilter::Gaussian => {
                let e = 1.0 - (-GAUSS_BETA * dist2 / (2.0 * r2)).exp();
                GAUSS_ALPHA * (1.0 - e / (1.0 - (-GAUSS_BETA).exp()))
            }
        }
    }

    /// Factor turning the weighted power sum into irradiance.
    ///
    /// Each kernel is divided by its mean weight over the disk, so a uniform
    /// photon density gives the same estimate under every filter.
    #[inline]
    pub fn normalization(&self, r2: f32) -> f32 {
        let area = PI * r2;
        if area <= 0.0 {
            return 0.0;
        }
        match *self {
            PhotonFilter::None => 1.0 / area,
            PhotonFilter::Cone { k } => 1.0 / ((1.0 - 2.0 / (3.0 * k)) * area),
            PhotonFilter::Gaussian => 1.0 / (gaussian_mean_weight() * area),
        }
    }
}
