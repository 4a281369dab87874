//! Smart multi-tier cache orchestrator and mapping rule engine for a
//! market-data gateway — single-flight origin fetches, Redis-backed warm
//! tier, and data-driven field mapping between provider payloads and the
//! gateway's standard schema.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod cache;
pub mod config;
pub mod fingerprint;
pub mod health;
pub mod mapping;
#[cfg(feature = "metrics")] pub mod metrics;
pub mod rules;
pub mod serializer;

mod error;

pub use crate::{
	cache::orchestrator::{OriginFetcher, Orchestrator, Strategy},
	config::GatewayConfig,
	error::{Error, Result},
	health::{BasicStatus, ComponentHealth, ComponentStatus, HealthReport},
};
