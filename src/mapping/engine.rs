//! Rule-driven record transformation.

// crates.io
use serde::{Deserialize, Serialize};
use serde_json::Value;
// self
use crate::{
	mapping::{path, transform},
	rules::model::MappingRule,
};

/// Per-field transformation diagnostics, populated when requested.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldDebugInfo {
	/// Path that was actually used to resolve the value.
	pub source_path: String,
	/// Destination field.
	pub target_field: String,
	/// Value as resolved from the source, before any transform.
	pub source_value: Option<Value>,
	/// Value after transform, if the field succeeded.
	pub transformed_value: Option<Value>,
	/// Whether this field mapping succeeded.
	pub success: bool,
	/// Index into `fallbackPaths` that supplied the value, if any.
	pub fallback_used: Option<usize>,
	/// Error detail when the field failed.
	pub error: Option<String>,
}

/// Aggregate statistics for one transform invocation.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct MappingStats {
	/// Total field mappings considered (including optional-skipped).
	pub total: usize,
	/// Field mappings that produced a value.
	pub successful: usize,
	/// Required field mappings that failed to produce a value.
	pub failed: usize,
	/// Optional field mappings that resolved to nothing; excluded from
	/// `successRate`'s denominator.
	pub optional_skipped: usize,
	/// `successful / (successful + failed)`, or 0 when that denominator is 0.
	pub success_rate: f64,
}

/// Result of [`transform_record`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MappingOutcome {
	/// The transformed output object.
	pub transformed_data: Value,
	/// Whether the overall transform is considered successful
	/// (`successRate > 0.5` when the denominator is nonzero).
	pub success: bool,
	/// Field-level statistics.
	pub mapping_stats: MappingStats,
	/// Per-field diagnostics, present only when requested.
	pub debug_info: Option<Vec<FieldDebugInfo>>,
}

/// Apply `rule` to `source`, producing a transformed record and statistics.
///
/// Deterministic: the same rule and source always produce byte-identical
/// output.
#[tracing::instrument(level = "debug", skip(rule, source), fields(rule_id = %rule.id))]
pub fn transform_record(rule: &MappingRule, source: &Value, with_debug: bool) -> MappingOutcome {
	let mut output = serde_json::Map::new();
	let mut debug = with_debug.then(Vec::new);

	let mut successful = 0usize;
	let mut failed = 0usize;
	let mut optional_skipped = 0usize;

	for mapping in rule.field_mappings.iter().filter(|mapping| mapping.is_active) {
		let (resolved, fallback_used) =
			path::resolve_with_fallbacks(source, &mapping.source_field_path, &mapping.fallback_paths);

		match resolved {
			None => {
				if mapping.is_required {
					failed += 1;
					push_debug(&mut debug, mapping, None, None, false, fallback_used, Some("unresolved".into()));
				} else {
					optional_skipped += 1;
					push_debug(&mut debug, mapping, None, None, true, fallback_used, None);
				}
			},
			Some(source_value) => {
				match transform::apply(source_value, mapping.transform.as_ref(), &mapping.target_field) {
					Some(transformed) => {
						successful += 1;
						output.insert(mapping.target_field.clone(), transformed.clone());
						push_debug(
							&mut debug,
							mapping,
							Some(source_value.clone()),
							Some(transformed),
							true,
							fallback_used,
							None,
						);
					},
					None => {
						failed += 1;
						push_debug(
							&mut debug,
							mapping,
							Some(source_value.clone()),
							None,
							false,
							fallback_used,
							Some("transform failed".into()),
						);
					},
				}
			},
		}
	}

	let denominator = successful + failed;
	let success_rate = if denominator > 0 { successful as f64 / denominator as f64 } else { 0.0 };

	MappingOutcome {
		transformed_data: Value::Object(output),
		success: denominator > 0 && success_rate > 0.5,
		mapping_stats: MappingStats {
			total: successful + failed + optional_skipped,
			successful,
			failed,
			optional_skipped,
			success_rate,
		},
		debug_info: debug,
	}
}

fn push_debug(
	debug: &mut Option<Vec<FieldDebugInfo>>,
	mapping: &crate::rules::model::FieldMapping,
	source_value: Option<Value>,
	transformed_value: Option<Value>,
	success: bool,
	fallback_used: Option<usize>,
	error: Option<String>,
) {
	if let Some(entries) = debug {
		entries.push(FieldDebugInfo {
			source_path: mapping.source_field_path.clone(),
			target_field: mapping.target_field.clone(),
			source_value,
			transformed_value,
			success,
			fallback_used,
			error,
		});
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::rules::model::{ApiType, FieldMapping, RuleListType, Transform};
	use serde_json::json;

	fn rule() -> MappingRule {
		MappingRule::new(
			"r1",
			"quote-default",
			"longport",
			ApiType::Rest,
			RuleListType::QuoteFields,
			"HK",
			vec![
				FieldMapping {
					source_field_path: "lastDone".into(),
					fallback_paths: vec!["price.current".into()],
					target_field: "lastPrice".into(),
					transform: None,
					confidence: 0.9,
					is_active: true,
					is_required: true,
					description: None,
				},
				FieldMapping {
					source_field_path: "changePercent".into(),
					fallback_paths: vec![],
					target_field: "changePercent".into(),
					transform: Some(Transform::Multiply { operand: 1.0 }),
					confidence: 0.9,
					is_active: true,
					is_required: true,
					description: None,
				},
			],
		)
	}

	#[test]
	fn maps_with_fallback_and_transform_per_the_documented_scenario() {
		let source = json!({ "lastDone": "561.000", "changePercent": 0.0175 });
		let outcome = transform_record(&rule(), &source, false);

		assert_eq!(outcome.transformed_data, json!({ "lastPrice": 561.0, "changePercent": 1.75 }));
		assert_eq!(outcome.mapping_stats.total, 2);
		assert_eq!(outcome.mapping_stats.successful, 2);
		assert_eq!(outcome.mapping_stats.failed, 0);
		assert_eq!(outcome.mapping_stats.success_rate, 1.0);
		assert!(outcome.success);
	}

	#[test]
	fn required_field_unresolved_counts_as_failure() {
		let source = json!({});
		let outcome = transform_record(&rule(), &source, false);

		assert_eq!(outcome.mapping_stats.failed, 2);
		assert!(!outcome.success);
	}

	#[test]
	fn optional_unresolved_field_is_skipped_not_failed() {
		let mut rule = rule();
		rule.field_mappings[1].is_required = false;
		let source = json!({ "lastDone": "561.000" });
		let outcome = transform_record(&rule, &source, false);

		assert_eq!(outcome.mapping_stats.optional_skipped, 1);
		assert_eq!(outcome.mapping_stats.successful, 1);
		assert_eq!(outcome.mapping_stats.failed, 0);
	}

	#[test]
	fn debug_info_is_only_populated_when_requested() {
		let source = json!({ "lastDone": "561.000", "changePercent": 0.02 });
		let without_debug = transform_record(&rule(), &source, false);
		let with_debug = transform_record(&rule(), &source, true);

		assert!(without_debug.debug_info.is_none());
		assert_eq!(with_debug.debug_info.unwrap().len(), 2);
	}
}
