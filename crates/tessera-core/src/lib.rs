//! Tessera Core
//!
//! Shared utilities for the Tessera 2D renderer: logging bootstrap,
//! profiling hooks, math re-exports and basic geometry.

pub mod alloc;
pub mod config;
pub mod geometry;
pub mod logging;
pub mod math;
pub mod profiling;

use config::{Config, ProfilingMode};

/// Initialize logging and profiling from a [`Config`].
pub fn init(config: &Config) {
    match &config.log_filter {
        Some(filter) => logging::init_with_filter(filter),
        None => logging::init(),
    }

    match config.profiling {
        ProfilingMode::Off => {}
        #[cfg(feature = "profiling")]
        ProfilingMode::On => puffin::set_scopes_on(true),
        #[cfg(feature = "profiling")]
        ProfilingMode::WithWebserver => {
            profiling::init_profiling(profiling::ProfilingBackend::PuffinHttp)
        }
        #[cfg(not(feature = "profiling"))]
        _ => tracing::warn!("Profiling requested but the `profiling` feature is disabled"),
    }
}
