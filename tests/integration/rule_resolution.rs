//! Integration coverage for rule resolution, tie-break ordering, and the
//! atomic application-stats update.

// crates.io
use marketdata_cache::rules::{
	model::{ApiType, FieldMapping, MappingRule, RuleListType},
	store::{InMemoryRuleStore, RuleStore},
};
use marketdata_cache::Result;

fn mapping(confidence: f64) -> FieldMapping {
	FieldMapping {
		source_field_path: "lastDone".into(),
		fallback_paths: vec!["price.current".into()],
		target_field: "lastPrice".into(),
		transform: None,
		confidence,
		is_active: true,
		is_required: true,
		description: None,
	}
}

#[tokio::test]
async fn default_rule_wins_ties_with_a_higher_confidence_non_default() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let store = InMemoryRuleStore::new();

	let mut wildcard_default = MappingRule::new(
		"rule-default",
		"default-hk",
		"longport",
		ApiType::Rest,
		RuleListType::QuoteFields,
		"*",
		vec![mapping(0.8)],
	);
	wildcard_default.is_default = true;
	store.create(wildcard_default).await?;

	let higher_confidence_specific = MappingRule::new(
		"rule-specific",
		"specific-hk",
		"longport",
		ApiType::Rest,
		RuleListType::QuoteFields,
		"HK",
		vec![mapping(0.99)],
	);
	store.create(higher_confidence_specific).await?;

	let best = store
		.find_best_matching("longport", ApiType::Rest, RuleListType::QuoteFields, Some("HK"))
		.await?
		.expect("a candidate rule should resolve");

	assert_eq!(best.id, "rule-default", "isDefault must win over a higher-confidence non-default candidate");
	Ok(())
}

#[tokio::test]
async fn among_non_defaults_the_tie_break_falls_through_confidence_then_success_rate_then_usage() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let store = InMemoryRuleStore::new();

	store
		.create(MappingRule::new(
			"rule-a",
			"a",
			"longport",
			ApiType::Rest,
			RuleListType::QuoteFields,
			"HK",
			vec![mapping(0.9)],
		))
		.await?;
	store
		.create(MappingRule::new(
			"rule-b",
			"b",
			"longport",
			ApiType::Rest,
			RuleListType::QuoteFields,
			"HK",
			vec![mapping(0.9)],
		))
		.await?;

	// Equal confidence; rule-b earns a higher success rate through applications.
	for _ in 0..9 {
		store.record_application("rule-b", true).await?;
	}
	store.record_application("rule-b", false).await?;
	store.record_application("rule-a", true).await?;

	let best = store
		.find_best_matching("longport", ApiType::Rest, RuleListType::QuoteFields, Some("HK"))
		.await?
		.expect("a candidate rule should resolve");

	assert_eq!(best.id, "rule-b");
	Ok(())
}

#[tokio::test]
async fn setting_a_new_default_clears_the_previous_default_in_the_same_tuple() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let store = InMemoryRuleStore::new();
	let mut first = MappingRule::new(
		"rule-1",
		"first",
		"longport",
		ApiType::Rest,
		RuleListType::BasicInfoFields,
		"US",
		vec![mapping(0.7)],
	);
	first.is_default = true;
	store.create(first).await?;

	let mut second = MappingRule::new(
		"rule-2",
		"second",
		"longport",
		ApiType::Rest,
		RuleListType::BasicInfoFields,
		"US",
		vec![mapping(0.6)],
	);
	second.is_default = true;
	store.create(second).await?;

	let first = store.find_by_id("rule-1").await?.expect("rule-1 exists");
	let second = store.find_by_id("rule-2").await?.expect("rule-2 exists");

	assert!(!first.is_default, "only one default may survive per tuple");
	assert!(second.is_default);
	Ok(())
}
