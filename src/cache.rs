//! Cache tiers: hot in-process, warm Redis, rule namespaces, stream, orchestrator.

pub mod hot;
pub mod orchestrator;
pub mod rule_cache;
pub mod stream;
pub mod warm;
