//! Optimized collection types for Tessera.
//!
//! Re-exports the AHash-backed hash collections used for name lookup tables
//! (uniform offsets, attribute bindings, uniform locations) and the
//! per-flush vertex deduplication table.

pub use ahash::{AHashMap as HashMap, AHashSet as HashSet, RandomState};
