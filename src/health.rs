//! Health status aggregation and the internal/external status mapping.

use serde::{Deserialize, Serialize};

/// Extended internal health status as reported by an individual component.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
	/// Fully operational.
	Healthy,
	/// Operating with a known, elevated risk.
	Warning,
	/// Not usable.
	Unhealthy,
	/// Synonym for `Healthy`, used by components that model connectivity directly.
	Connected,
	/// Synonym for `Warning`.
	Degraded,
	/// Synonym for `Unhealthy`.
	Disconnected,
}
impl ComponentStatus {
	/// Project an extended status onto the three-value external status space.
	///
	/// This mapping is authoritative: `Connected`/`Disconnected` are internal
	/// synonyms and never appear in an external report.
	pub fn to_basic(self) -> BasicStatus {
		match self {
			Self::Healthy | Self::Connected => BasicStatus::Healthy,
			Self::Warning | Self::Degraded => BasicStatus::Warning,
			Self::Unhealthy | Self::Disconnected => BasicStatus::Unhealthy,
		}
	}
}

/// External, three-value health status.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BasicStatus {
	/// All reporting components are healthy.
	Healthy,
	/// At least one component is degraded but the system remains usable.
	Warning,
	/// At least one component is unusable.
	Unhealthy,
}
impl BasicStatus {
	fn severity(self) -> u8 {
		match self {
			Self::Healthy => 0,
			Self::Warning => 1,
			Self::Unhealthy => 2,
		}
	}

	/// Combine two statuses, keeping the more severe one.
	pub fn worst_of(self, other: Self) -> Self {
		if other.severity() > self.severity() { other } else { self }
	}
}

/// Per-component extended status snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComponentHealth {
	/// Component name (`hot`, `warm`, `rule_store`, `stream`).
	pub name: String,
	/// Extended status for this component.
	pub status: ComponentStatus,
	/// Optional free-form detail (e.g. the last error observed).
	pub detail: Option<String>,
}
impl ComponentHealth {
	/// Construct a healthy component report.
	pub fn healthy(name: impl Into<String>) -> Self {
		Self { name: name.into(), status: ComponentStatus::Healthy, detail: None }
	}

	/// Construct a component report with an explicit status and detail.
	pub fn with_status(name: impl Into<String>, status: ComponentStatus, detail: impl Into<String>) -> Self {
		Self { name: name.into(), status, detail: Some(detail.into()) }
	}
}

/// Full health report: a basic top-level status plus per-component detail.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthReport {
	/// Worst-of-all-components status, projected onto the external status space.
	pub basic_status: BasicStatus,
	/// Per-component extended status.
	pub components: Vec<ComponentHealth>,
}
impl HealthReport {
	/// Aggregate a set of component reports into a top-level report.
	pub fn from_components(components: Vec<ComponentHealth>) -> Self {
		let basic_status = components
			.iter()
			.map(|component| component.status.to_basic())
			.fold(BasicStatus::Healthy, BasicStatus::worst_of);

		Self { basic_status, components }
	}
}
