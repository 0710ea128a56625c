//! Log output setup.
//!
//! The library only emits `tracing` events; installing a subscriber is up
//! to the application. These helpers install a `fmt` subscriber filtered by
//! `RUST_LOG`, or by `default_filter` when the variable is unset.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::util::{Error, Result};

fn filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Install the global subscriber. Fails if one is already set.
pub fn init(default_filter: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(filter(default_filter))
        .with(fmt::layer().with_target(false))
        .try_init()
        .map_err(|e| Error::other(format!("logging already initialized: {e}")))
}

/// Like [`init`], but ignores an already installed subscriber.
pub fn try_init(default_filter: &str) {
    let _ = init(default_filter);
}
