//! Utility types and functions for the baker.
//!
//! This module contains fundamental types used throughout the library:
//! - [`Error`] / [`Result`] - Error handling
//! - Math type re-exports from glam plus [`Plane`], [`Rect`], [`BBox3f`]
//! - [`Polygon`] clipping
//! - [`Progress`] reporting and cancellation

mod error;
mod math;
mod poly;
mod progress;

pub use error::*;
pub use math::*;
pub use poly::*;
pub use progress::*;
