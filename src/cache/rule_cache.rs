//! Three-namespace rule cache: rule-by-id, best-rule, provider-rules (C5).

// std
use std::sync::Arc;
// self
use crate::{
	Result,
	cache::{hot::HotCache, warm::WarmTier},
	config::GatewayConfig,
	fingerprint::{all_rule_cache_scan_pattern, best_rule_key, provider_rules_key, provider_scan_pattern, rule_by_id_key},
	rules::model::{ApiType, MappingRule, RuleListType},
	serializer::Serializer,
};

/// Composed rule cache over an in-process shadow (C3) and Redis (C4).
pub struct RuleCache {
	hot: Arc<HotCache>,
	warm: Arc<dyn WarmTier>,
	serializer: Serializer,
	ttl: std::time::Duration,
}
impl RuleCache {
	/// Build a rule cache sharing the given hot/warm tiers.
	pub fn new(hot: Arc<HotCache>, warm: Arc<dyn WarmTier>, serializer: Serializer, config: &GatewayConfig) -> Self {
		Self { hot, warm, serializer, ttl: config.rule_cache_ttl }
	}

	async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
		if let Some(bytes) = self.hot.get(key).await {
			return Ok(Some(bytes.as_ref().clone()));
		}
		match self.warm.get(key).await {
			Ok(Some(bytes)) => {
				self.hot.set(key.to_string(), Arc::new(bytes.clone()), self.ttl).await;
				Ok(Some(bytes))
			},
			Ok(None) => Ok(None),
			Err(err) => {
				tracing::debug!(error = %err, key, "warm cache unavailable for rule lookup, treating as miss");
				Ok(None)
			},
		}
	}

	async fn write(&self, key: &str, bytes: Vec<u8>) {
		let bytes = Arc::new(bytes);
		self.hot.set(key.to_string(), bytes.clone(), self.ttl).await;
		if let Err(err) = self.warm.set(key, &bytes, self.ttl).await {
			tracing::warn!(error = %err, key, "failed to write rule cache entry to warm tier");
		}
	}

	async fn invalidate(&self, key: &str) {
		self.hot.delete(key).await;
		if let Err(err) = self.warm.del(key).await {
			tracing::warn!(error = %err, key, "failed to invalidate rule cache entry in warm tier");
		}
	}

	/// Look up a rule by id.
	pub async fn get_rule_by_id(&self, id: &str) -> Result<Option<MappingRule>> {
		let key = rule_by_id_key(id);
		match self.read(&key).await? {
			Some(bytes) => Ok(Some(self.serializer.decode(&bytes)?)),
			None => Ok(None),
		}
	}

	/// Populate `rule-by-id(rule.id)`.
	pub async fn put_rule_by_id(&self, rule: &MappingRule) -> Result<()> {
		let key = rule_by_id_key(&rule.id);
		self.write(&key, self.serializer.encode(rule)?).await;
		Ok(())
	}

	/// Look up the best-matching rule for a tuple.
	pub async fn get_best_rule(
		&self,
		provider: &str,
		api_type: ApiType,
		rule_list_type: RuleListType,
		market_type: &str,
	) -> Result<Option<MappingRule>> {
		let key = best_rule_key(provider, &api_type_str(api_type), &rule_list_type_str(rule_list_type), market_type);
		match self.read(&key).await? {
			Some(bytes) => Ok(Some(self.serializer.decode(&bytes)?)),
			None => Ok(None),
		}
	}

	/// Populate the `best-rule` namespace for a tuple.
	pub async fn put_best_rule(
		&self,
		provider: &str,
		api_type: ApiType,
		rule_list_type: RuleListType,
		market_type: &str,
		rule: &MappingRule,
	) -> Result<()> {
		let key = best_rule_key(provider, &api_type_str(api_type), &rule_list_type_str(rule_list_type), market_type);
		self.write(&key, self.serializer.encode(rule)?).await;
		Ok(())
	}

	/// Look up the rule list for a `(provider, apiType)` pair.
	pub async fn get_provider_rules(&self, provider: &str, api_type: ApiType) -> Result<Option<Vec<MappingRule>>> {
		let key = provider_rules_key(provider, &api_type_str(api_type));
		match self.read(&key).await? {
			Some(bytes) => Ok(Some(self.serializer.decode(&bytes)?)),
			None => Ok(None),
		}
	}

	/// Populate the `provider-rules` namespace for a `(provider, apiType)` pair.
	pub async fn put_provider_rules(&self, provider: &str, api_type: ApiType, rules: &[MappingRule]) -> Result<()> {
		let key = provider_rules_key(provider, &api_type_str(api_type));
		self.write(&key, self.serializer.encode(&rules.to_vec())?).await;
		Ok(())
	}

	/// Apply the coordinated invalidation rules triggered by a rule update or
	/// delete: invalidate `rule-by-id`, every matching `best-rule` key for the
	/// rule's tuple (including the wildcard market), and `provider-rules`.
	#[tracing::instrument(level = "debug", skip(self, rule))]
	pub async fn invalidate_for_rule(&self, rule: &MappingRule) {
		self.invalidate(&rule_by_id_key(&rule.id)).await;

		let api_type = api_type_str(rule.api_type);
		let rule_list_type = rule_list_type_str(rule.rule_list_type);

		self.invalidate(&best_rule_key(&rule.provider, &api_type, &rule_list_type, &rule.market_type)).await;
		if rule.market_type != "*" {
			self.invalidate(&best_rule_key(&rule.provider, &api_type, &rule_list_type, "*")).await;
		}
		self.invalidate(&provider_rules_key(&rule.provider, &api_type)).await;
	}

	/// Bulk-invalidate every cache entry owned by `provider`, via the warm
	/// tier's SCAN-based `delByPattern`; the hot tier is cleared wholesale
	/// since it carries no provider index.
	#[tracing::instrument(level = "debug", skip(self))]
	pub async fn invalidate_provider(&self, provider: &str) -> Result<u64> {
		self.hot.clear().await;
		self.warm.del_by_pattern(&provider_scan_pattern(provider)).await
	}

	/// Bulk-invalidate the entire rule cache across every provider, via the
	/// warm tier's SCAN-based `delByPattern`; the hot tier is cleared wholesale.
	#[tracing::instrument(level = "debug", skip(self))]
	pub async fn clear_all_rule_cache(&self) -> Result<u64> {
		self.hot.clear().await;
		self.warm.del_by_pattern(&all_rule_cache_scan_pattern()).await
	}

	/// Populate `rule-by-id` (and, for default rules, `best-rule`) from a
	/// warmup set. Never blocks startup; failures are logged and skipped.
	#[tracing::instrument(level = "debug", skip(self, rules))]
	pub async fn warmup(&self, rules: &[MappingRule]) {
		for rule in rules {
			if let Err(err) = self.put_rule_by_id(rule).await {
				tracing::warn!(error = %err, rule_id = %rule.id, "rule cache warmup failed for rule-by-id");
				continue;
			}
			if rule.is_default {
				let result = self
					.put_best_rule(&rule.provider, rule.api_type, rule.rule_list_type, &rule.market_type, rule)
					.await;
				if let Err(err) = result {
					tracing::warn!(error = %err, rule_id = %rule.id, "rule cache warmup failed for best-rule");
				}
			}
		}
	}
}

fn api_type_str(api_type: ApiType) -> String {
	match api_type {
		ApiType::Rest => "rest".into(),
		ApiType::Stream => "stream".into(),
	}
}

fn rule_list_type_str(rule_list_type: RuleListType) -> String {
	match rule_list_type {
		RuleListType::QuoteFields => "quote_fields".into(),
		RuleListType::BasicInfoFields => "basic_info_fields".into(),
		RuleListType::IndexFields => "index_fields".into(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		cache::warm::fake::InMemoryWarmTier,
		rules::model::{FieldMapping, MappingRule},
		serializer::WireFormat,
	};

	fn rule_cache() -> RuleCache {
		RuleCache::new(
			Arc::new(HotCache::new(16)),
			Arc::new(InMemoryWarmTier::new()),
			Serializer::new(WireFormat::Json),
			&GatewayConfig::default(),
		)
	}

	fn sample_rule(id: &str) -> MappingRule {
		MappingRule::new(id, format!("name-{id}"), "longport", ApiType::Rest, RuleListType::QuoteFields, "HK", vec![
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
		])
	}

	#[tokio::test]
	async fn rule_by_id_round_trips_through_the_hot_shadow() {
		let cache = rule_cache();
		let rule = sample_rule("r1");
		cache.put_rule_by_id(&rule).await.unwrap();

		let fetched = cache.get_rule_by_id("r1").await.unwrap().unwrap();
		assert_eq!(fetched.id, "r1");
	}

	#[tokio::test]
	async fn invalidate_for_rule_clears_all_three_namespaces() {
		let cache = rule_cache();
		let mut rule = sample_rule("r1");
		rule.is_default = true;

		cache.put_rule_by_id(&rule).await.unwrap();
		cache.put_best_rule("longport", ApiType::Rest, RuleListType::QuoteFields, "HK", &rule).await.unwrap();
		cache.put_provider_rules("longport", ApiType::Rest, &[rule.clone()]).await.unwrap();

		cache.invalidate_for_rule(&rule).await;

		assert!(cache.get_rule_by_id("r1").await.unwrap().is_none());
		assert!(
			cache
				.get_best_rule("longport", ApiType::Rest, RuleListType::QuoteFields, "HK")
				.await
				.unwrap()
				.is_none()
		);
		assert!(cache.get_provider_rules("longport", ApiType::Rest).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn invalidate_provider_uses_scan_based_bulk_delete() {
		// `rule-by-id` keys carry no provider segment (§6 persisted state
		// layout), so only the provider-scoped namespaces are reachable by
		// pattern; the hot shadow is cleared wholesale to cover the rest.
		let cache = rule_cache();
		let rule = sample_rule("r1");
		cache.put_best_rule("longport", ApiType::Rest, RuleListType::QuoteFields, "HK", &rule).await.unwrap();
		cache.put_provider_rules("longport", ApiType::Rest, &[rule.clone()]).await.unwrap();

		let deleted = cache.invalidate_provider("longport").await.unwrap();
		assert_eq!(deleted, 2);
		assert!(
			cache
				.get_best_rule("longport", ApiType::Rest, RuleListType::QuoteFields, "HK")
				.await
				.unwrap()
				.is_none()
		);
	}

	#[tokio::test]
	async fn clear_all_rule_cache_sweeps_every_provider() {
		let cache = rule_cache();
		let rule = sample_rule("r1");
		cache.put_best_rule("longport", ApiType::Rest, RuleListType::QuoteFields, "HK", &rule).await.unwrap();
		cache.put_best_rule("futu", ApiType::Rest, RuleListType::QuoteFields, "US", &rule).await.unwrap();

		let deleted = cache.clear_all_rule_cache().await.unwrap();
		assert_eq!(deleted, 2);
		assert!(
			cache
				.get_best_rule("futu", ApiType::Rest, RuleListType::QuoteFields, "US")
				.await
				.unwrap()
				.is_none()
		);
	}
}
