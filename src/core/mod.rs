//! Core infrastructure shared by all bake stages.
//!
//! - [`BakeConfig`] - immutable bake settings
//! - [`SwapCache`] / [`SwapBuffer`] - memory-budgeted, evictable buffers

mod cache;
mod config;

pub use cache::*;
pub use config::*;
