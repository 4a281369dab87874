//! Mapping rule, field mapping, and data-source-template data model.

// std
use std::time::{SystemTime, UNIX_EPOCH};
// crates.io
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
// self
use crate::{Error, Result};

/// API transport the rule applies to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiType {
	/// Request/response REST calls.
	Rest,
	/// Long-lived streaming pushes.
	Stream,
}

/// Target schema family a rule produces.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleListType {
	/// Live quote fields.
	QuoteFields,
	/// Semi-static instrument metadata.
	BasicInfoFields,
	/// Index composition/quote fields.
	IndexFields,
}

/// Numeric/string transform applied to a resolved field value.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transform {
	/// Multiply the resolved numeric value by `operand`.
	Multiply {
		/// Scalar multiplier.
		operand: f64,
	},
	/// Divide the resolved numeric value by `operand`.
	Divide {
		/// Scalar divisor.
		operand: f64,
	},
	/// Add `operand` to the resolved numeric value.
	Add {
		/// Scalar addend.
		operand: f64,
	},
	/// Subtract `operand` from the resolved numeric value.
	Subtract {
		/// Scalar subtrahend.
		operand: f64,
	},
	/// Substitute the resolved value into a `{value}` template string.
	Format {
		/// Template containing the literal placeholder `{value}`.
		template: String,
	},
}

/// One field extraction/transform rule within a [`MappingRule`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldMapping {
	/// Primary source path, e.g. `data.items[0].price`.
	pub source_field_path: String,
	/// Paths tried in order when the primary path resolves to undefined/null.
	#[serde(default)]
	pub fallback_paths: Vec<String>,
	/// Destination field name in the transformed output.
	pub target_field: String,
	/// Optional transform applied after resolution.
	#[serde(default)]
	pub transform: Option<Transform>,
	/// Confidence in [0, 1] this mapping produces a correct value.
	pub confidence: f64,
	/// Whether this mapping currently participates in transforms.
	#[serde(default = "default_true")]
	pub is_active: bool,
	/// Whether an unresolved value counts as a failure rather than a skip.
	#[serde(default)]
	pub is_required: bool,
	/// Human-readable description.
	#[serde(default)]
	pub description: Option<String>,
}

fn default_true() -> bool {
	true
}

/// A data-driven field-mapping rule for a `(provider, apiType, ruleListType)` tuple.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MappingRule {
	/// Stable identifier.
	pub id: String,
	/// Name, unique within `(provider, apiType, ruleListType)`.
	pub name: String,
	/// Upstream provider identifier.
	pub provider: String,
	/// Transport this rule applies to.
	pub api_type: ApiType,
	/// Target schema family.
	pub rule_list_type: RuleListType,
	/// Market this rule applies to, or `"*"` for any market.
	pub market_type: String,
	/// Whether this rule currently participates in resolution.
	pub is_active: bool,
	/// Whether this rule is the default for its tuple.
	pub is_default: bool,
	/// Mean of `fieldMappings[].confidence`; recomputed on write only.
	pub overall_confidence: f64,
	/// Number of times this rule has been applied.
	pub usage_count: u64,
	/// Applications that completed above the success threshold.
	pub successful_transformations: u64,
	/// Applications that did not.
	pub failed_transformations: u64,
	/// `successful / (successful + failed)`, or 0 when denominator is 0.
	pub success_rate: f64,
	/// Last time this rule was applied.
	pub last_used_at: Option<DateTime<Utc>>,
	/// Source template this rule was generated from, if any.
	pub source_template_id: Option<String>,
	/// Field-level mappings.
	pub field_mappings: Vec<FieldMapping>,
}
impl MappingRule {
	/// Construct a rule with zeroed statistics and a recomputed confidence.
	pub fn new(
		id: impl Into<String>,
		name: impl Into<String>,
		provider: impl Into<String>,
		api_type: ApiType,
		rule_list_type: RuleListType,
		market_type: impl Into<String>,
		field_mappings: Vec<FieldMapping>,
	) -> Self {
		let mut rule = Self {
			id: id.into(),
			name: name.into(),
			provider: provider.into(),
			api_type,
			rule_list_type,
			market_type: market_type.into(),
			is_active: true,
			is_default: false,
			overall_confidence: 0.0,
			usage_count: 0,
			successful_transformations: 0,
			failed_transformations: 0,
			success_rate: 0.0,
			last_used_at: None,
			source_template_id: None,
			field_mappings,
		};
		rule.recompute_confidence();
		rule
	}

	/// Recompute `overallConfidence` as the mean of every field mapping's
	/// confidence, active or not. The only site in this crate allowed to
	/// mutate this field; callers are the rule-store `create`/`update` paths.
	pub fn recompute_confidence(&mut self) {
		if self.field_mappings.is_empty() {
			self.overall_confidence = 0.0;
			return;
		}
		let sum: f64 = self.field_mappings.iter().map(|mapping| mapping.confidence).sum();
		self.overall_confidence = sum / self.field_mappings.len() as f64;
	}

	/// Apply one application outcome to the usage/success statistics in a
	/// single step, matching the rule store's atomic `recordApplication`.
	pub fn apply_outcome(&mut self, success: bool) {
		self.usage_count += 1;
		if success {
			self.successful_transformations += 1;
		} else {
			self.failed_transformations += 1;
		}
		let denominator = self.successful_transformations + self.failed_transformations;
		self.success_rate =
			if denominator > 0 { self.successful_transformations as f64 / denominator as f64 } else { 0.0 };
		self.last_used_at = Some(now());
	}

	/// Validate structural invariants that must hold before a rule is stored.
	pub fn validate(&self) -> Result<()> {
		if self.id.is_empty() {
			return Err(Error::RuleValidation { field: "id", reason: "must not be empty".into() });
		}
		if self.name.is_empty() {
			return Err(Error::RuleValidation { field: "name", reason: "must not be empty".into() });
		}
		if self.provider.is_empty() {
			return Err(Error::RuleValidation { field: "provider", reason: "must not be empty".into() });
		}
		if self.market_type.is_empty() {
			return Err(Error::RuleValidation { field: "market_type", reason: "must not be empty".into() });
		}
		if !(0.0..=1.0).contains(&self.overall_confidence) {
			return Err(Error::RuleValidation {
				field: "overall_confidence",
				reason: "must be within [0, 1]".into(),
			});
		}
		if self.field_mappings.is_empty() {
			return Err(Error::RuleValidation {
				field: "field_mappings",
				reason: "a rule must declare at least one field mapping".into(),
			});
		}
		for mapping in &self.field_mappings {
			if !(0.0..=1.0).contains(&mapping.confidence) {
				return Err(Error::RuleValidation {
					field: "field_mappings[].confidence",
					reason: format!("mapping targeting '{}' has confidence outside [0, 1]", mapping.target_field),
				});
			}
		}
		Ok(())
	}

	/// The `(provider, apiType, ruleListType, marketType)` tuple this rule belongs to.
	pub fn tuple_key(&self) -> (String, ApiType, RuleListType, String) {
		(self.provider.clone(), self.api_type, self.rule_list_type, self.market_type.clone())
	}
}

fn now() -> DateTime<Utc> {
	let duration = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
	DateTime::from_timestamp(duration.as_secs() as i64, duration.subsec_nanos()).unwrap_or_default()
}

/// A seed sample used only to generate candidate rules; never consulted at
/// hot-path time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataSourceTemplate {
	/// Stable identifier.
	pub id: String,
	/// Human-readable name.
	pub name: String,
	/// Upstream provider identifier.
	pub provider: String,
	/// Transport this template describes.
	pub api_type: ApiType,
	/// A representative raw payload sample.
	pub sample_data: serde_json::Value,
	/// Field paths discovered in `sample_data`.
	pub extracted_fields: Vec<String>,
	/// Confidence assigned to this template.
	pub confidence: f64,
	/// Whether this is the default template for its provider/apiType.
	pub is_default: bool,
	/// Whether this template ships as a built-in preset.
	pub is_preset: bool,
	/// Number of rules generated from this template.
	pub usage_count: u64,
	/// Last time a rule was generated from this template.
	pub last_used_at: Option<DateTime<Utc>>,
}
