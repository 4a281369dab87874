//! Integration coverage for the mapping engine's field fallback/transform
//! pipeline, and for the orchestrator's behavior when the warm tier is
//! degraded or absent.

// std
use std::{sync::Arc, time::Duration};
// crates.io
use marketdata_cache::cache::hot::HotCache;
use marketdata_cache::cache::orchestrator::{OriginFetcher, Orchestrator, Strategy};
use marketdata_cache::cache::rule_cache::RuleCache;
use marketdata_cache::cache::warm::fake::InMemoryWarmTier;
use marketdata_cache::config::GatewayConfig;
use marketdata_cache::mapping::engine::transform_record;
use marketdata_cache::rules::model::{ApiType, FieldMapping, MappingRule, RuleListType, Transform};
use marketdata_cache::serializer::{Serializer, WireFormat};
use marketdata_cache::Result;
use serde_json::json;

#[tokio::test]
async fn mapping_engine_applies_fallback_transform_and_percent_rescale() {
	let _ = tracing_subscriber::fmt::try_init();

	let rule = MappingRule::new(
		"rule-1",
		"quote-hk",
		"longport",
		ApiType::Rest,
		RuleListType::QuoteFields,
		"HK",
		vec![
			FieldMapping {
				source_field_path: "lastDone".into(),
				fallback_paths: vec![],
				target_field: "lastPrice".into(),
				transform: None,
				confidence: 0.9,
				is_active: true,
				is_required: true,
				description: None,
			},
			FieldMapping {
				source_field_path: "missingField".into(),
				fallback_paths: vec!["changePercent".into()],
				target_field: "changePercent".into(),
				transform: Some(Transform::Multiply { operand: 1.0 }),
				confidence: 0.8,
				is_active: true,
				is_required: false,
				description: None,
			},
		],
	);

	let source = json!({ "lastDone": "561.000", "changePercent": 0.0175 });
	let outcome = transform_record(&rule, &source, false);

	assert!(outcome.success);
	assert_eq!(outcome.transformed_data["lastPrice"], json!(561.0));
	assert_eq!(outcome.transformed_data["changePercent"], json!(1.75));
	assert_eq!(outcome.mapping_stats.successful, 2);
	assert_eq!(outcome.mapping_stats.failed, 0);
}

struct OnceOrigin {
	value: Arc<tokio::sync::Mutex<Option<u64>>>,
}
#[async_trait::async_trait]
impl OriginFetcher<u64> for OnceOrigin {
	async fn fetch(&self) -> Result<u64> {
		Ok(self.value.lock().await.take().unwrap_or(0))
	}
}

#[tokio::test]
async fn warm_tier_failure_does_not_block_the_hot_path() {
	let _ = tracing_subscriber::fmt::try_init();

	struct AlwaysFailingWarmTier;
	#[async_trait::async_trait]
	impl marketdata_cache::cache::warm::WarmTier for AlwaysFailingWarmTier {
		async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
			Err(marketdata_cache::Error::WarmCacheUnavailable("simulated outage".into()))
		}
		async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<()> {
			Err(marketdata_cache::Error::WarmCacheUnavailable("simulated outage".into()))
		}
		async fn del(&self, _key: &str) -> Result<bool> {
			Ok(false)
		}
		async fn del_by_pattern(&self, _pattern: &str) -> Result<u64> {
			Ok(0)
		}
		async fn health_check(&self) -> marketdata_cache::ComponentHealth {
			marketdata_cache::ComponentHealth::with_status(
				"warm",
				marketdata_cache::ComponentStatus::Unhealthy,
				"simulated outage",
			)
		}
	}

	let orchestrator = Orchestrator::new(
		Arc::new(HotCache::new(16)),
		Arc::new(AlwaysFailingWarmTier),
		Serializer::new(WireFormat::Json),
		GatewayConfig::default(),
	);
	let origin = OnceOrigin { value: Arc::new(tokio::sync::Mutex::new(Some(108))) };

	let value = orchestrator.get_or_compute("700.HK", Strategy::Strong, &origin).await.unwrap();
	assert_eq!(*value, 108);

	let health = orchestrator.health().await;
	assert_eq!(health.basic_status, marketdata_cache::BasicStatus::Unhealthy);
}

#[tokio::test]
async fn bulk_provider_invalidation_uses_scan_not_keys() {
	let _ = tracing_subscriber::fmt::try_init();

	let config = GatewayConfig::default();
	let cache = RuleCache::new(
		Arc::new(HotCache::new(16)),
		Arc::new(InMemoryWarmTier::new()),
		Serializer::new(WireFormat::Json),
		&config,
	);

	let rule = MappingRule::new(
		"rule-1",
		"quote-hk",
		"longport",
		ApiType::Rest,
		RuleListType::QuoteFields,
		"HK",
		vec![FieldMapping {
			source_field_path: "lastDone".into(),
			fallback_paths: vec![],
			target_field: "lastPrice".into(),
			transform: None,
			confidence: 0.9,
			is_active: true,
			is_required: true,
			description: None,
		}],
	);

	cache.put_best_rule("longport", ApiType::Rest, RuleListType::QuoteFields, "HK", &rule).await.unwrap();
	cache.put_provider_rules("longport", ApiType::Rest, &[rule]).await.unwrap();

	let deleted = cache.invalidate_provider("longport").await.unwrap();
	assert_eq!(deleted, 2);

	assert!(cache.get_best_rule("longport", ApiType::Rest, RuleListType::QuoteFields, "HK").await.unwrap().is_none());
	assert!(cache.get_provider_rules("longport", ApiType::Rest).await.unwrap().is_none());
}
