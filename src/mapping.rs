//! Field-mapping: path resolution, transform operators, and the per-record engine.

pub mod engine;
pub mod path;
pub mod transform;
