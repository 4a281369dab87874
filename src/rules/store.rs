//! Durable rule catalog trait and an in-memory reference implementation.

// std
use std::collections::HashMap;
// crates.io
use tokio::sync::Mutex;
// self
use crate::{
	Error, Result,
	health::{ComponentHealth, ComponentStatus},
	rules::model::{ApiType, MappingRule, RuleListType},
};

/// Filter applied to [`RuleStore::list`].
#[derive(Clone, Debug, Default)]
pub struct RuleFilter {
	/// Restrict to a single provider.
	pub provider: Option<String>,
	/// Restrict to a single API type.
	pub api_type: Option<ApiType>,
	/// Restrict to a single rule-list type.
	pub rule_list_type: Option<RuleListType>,
	/// Restrict to a single market, or `"*"`.
	pub market_type: Option<String>,
	/// Restrict to active or inactive rules.
	pub is_active: Option<bool>,
	/// Restrict to default or non-default rules.
	pub is_default: Option<bool>,
}
impl RuleFilter {
	fn matches(&self, rule: &MappingRule) -> bool {
		self.provider.as_deref().is_none_or(|value| value == rule.provider)
			&& self.api_type.is_none_or(|value| value == rule.api_type)
			&& self.rule_list_type.is_none_or(|value| value == rule.rule_list_type)
			&& self.market_type.as_deref().is_none_or(|value| value == rule.market_type)
			&& self.is_active.is_none_or(|value| value == rule.is_active)
			&& self.is_default.is_none_or(|value| value == rule.is_default)
	}
}

/// A page of [`RuleStore::list`] results.
#[derive(Clone, Debug, Default)]
pub struct RulePage {
	/// Rules in this page, in store order.
	pub items: Vec<MappingRule>,
	/// Total number of rules matching the filter, across all pages.
	pub total: usize,
}

/// Durable catalog of mapping rules.
///
/// Modeled as an async trait so a concrete backend (SQL, document store, or
/// the in-memory reference implementation below) can stand behind it.
#[async_trait::async_trait]
pub trait RuleStore: Send + Sync {
	/// Look up a rule by id.
	async fn find_by_id(&self, id: &str) -> Result<Option<MappingRule>>;

	/// Resolve the best-matching rule for a request tuple, per the
	/// deterministic tie-break: `isDefault` first, then highest
	/// `overallConfidence`, then `successRate`, then `usageCount`, then most
	/// recent `lastUsedAt`.
	async fn find_best_matching(
		&self,
		provider: &str,
		api_type: ApiType,
		rule_list_type: RuleListType,
		market_type: Option<&str>,
	) -> Result<Option<MappingRule>>;

	/// List rules matching `filter`, paginated.
	async fn list(&self, filter: RuleFilter, page: usize, limit: usize) -> Result<RulePage>;

	/// Insert a new rule. Rejects a duplicate `(provider, apiType,
	/// ruleListType, name)`. Recomputes `overallConfidence` before storing.
	async fn create(&self, rule: MappingRule) -> Result<MappingRule>;

	/// Replace a stored rule by id. Recomputes `overallConfidence` before
	/// storing. If the incoming rule sets `isDefault = true`, clears
	/// `isDefault` on every other rule of the same tuple atomically.
	async fn update(&self, rule: MappingRule) -> Result<MappingRule>;

	/// Toggle `isActive` for a rule.
	async fn set_active(&self, id: &str, is_active: bool) -> Result<()>;

	/// Remove a rule by id.
	async fn delete(&self, id: &str) -> Result<bool>;

	/// Atomically apply one application outcome to usage/success statistics.
	async fn record_application(&self, id: &str, success: bool) -> Result<()>;

	/// Health probe reported as the `ruleStore` component of the gateway's
	/// aggregate health report.
	async fn health_check(&self) -> ComponentHealth;
}

fn best_match_cmp(a: &MappingRule, b: &MappingRule) -> std::cmp::Ordering {
	use std::cmp::Ordering;

	a.is_default
		.cmp(&b.is_default)
		.then_with(|| a.overall_confidence.total_cmp(&b.overall_confidence))
		.then_with(|| a.success_rate.total_cmp(&b.success_rate))
		.then_with(|| a.usage_count.cmp(&b.usage_count))
		.then_with(|| match (a.last_used_at, b.last_used_at) {
			(Some(left), Some(right)) => left.cmp(&right),
			(Some(_), None) => Ordering::Greater,
			(None, Some(_)) => Ordering::Less,
			(None, None) => Ordering::Equal,
		})
}

/// Reference [`RuleStore`] implementation backed by a single async mutex
/// over an ordered map; suitable for tests and configuration-seeded
/// deployments.
#[derive(Default)]
pub struct InMemoryRuleStore {
	rules: Mutex<HashMap<String, MappingRule>>,
}
impl InMemoryRuleStore {
	/// Construct an empty store.
	pub fn new() -> Self {
		Self::default()
	}

	fn duplicate_name(rules: &HashMap<String, MappingRule>, candidate: &MappingRule, exclude_id: Option<&str>) -> bool {
		rules.values().any(|existing| {
			Some(existing.id.as_str()) != exclude_id
				&& existing.provider == candidate.provider
				&& existing.api_type == candidate.api_type
				&& existing.rule_list_type == candidate.rule_list_type
				&& existing.name == candidate.name
		})
	}

	fn clear_other_defaults(rules: &mut HashMap<String, MappingRule>, keep_id: &str, rule: &MappingRule) {
		if !rule.is_default {
			return;
		}
		for (id, existing) in rules.iter_mut() {
			if id != keep_id
				&& existing.provider == rule.provider
				&& existing.api_type == rule.api_type
				&& existing.rule_list_type == rule.rule_list_type
				&& existing.market_type == rule.market_type
			{
				existing.is_default = false;
			}
		}
	}
}

#[async_trait::async_trait]
impl RuleStore for InMemoryRuleStore {
	#[tracing::instrument(level = "debug", skip(self))]
	async fn find_by_id(&self, id: &str) -> Result<Option<MappingRule>> {
		Ok(self.rules.lock().await.get(id).cloned())
	}

	#[tracing::instrument(level = "debug", skip(self))]
	async fn find_best_matching(
		&self,
		provider: &str,
		api_type: ApiType,
		rule_list_type: RuleListType,
		market_type: Option<&str>,
	) -> Result<Option<MappingRule>> {
		let rules = self.rules.lock().await;
		let mut defaults_seen = Vec::new();

		let best = rules
			.values()
			.filter(|rule| {
				rule.is_active
					&& rule.provider == provider
					&& rule.api_type == api_type
					&& rule.rule_list_type == rule_list_type
					&& match market_type {
						Some(market) => rule.market_type == market || rule.market_type == "*",
						None => true,
					}
			})
			.inspect(|rule| {
				if rule.is_default {
					defaults_seen.push(rule.id.clone());
				}
			})
			.max_by(|a, b| best_match_cmp(a, b))
			.cloned();

		if defaults_seen.len() > 1 {
			tracing::warn!(rule_ids = ?defaults_seen, "multiple default rules observed for the same tuple");
		}

		Ok(best)
	}

	#[tracing::instrument(level = "debug", skip(self, filter))]
	async fn list(&self, filter: RuleFilter, page: usize, limit: usize) -> Result<RulePage> {
		let rules = self.rules.lock().await;
		let mut matching: Vec<MappingRule> = rules.values().filter(|rule| filter.matches(rule)).cloned().collect();
		matching.sort_by(|a, b| a.id.cmp(&b.id));

		let total = matching.len();
		let start = page.saturating_mul(limit).min(total);
		let end = start.saturating_add(limit).min(total);

		Ok(RulePage { items: matching[start..end].to_vec(), total })
	}

	#[tracing::instrument(level = "debug", skip(self, rule))]
	async fn create(&self, mut rule: MappingRule) -> Result<MappingRule> {
		rule.recompute_confidence();
		rule.validate()?;

		let mut rules = self.rules.lock().await;
		if rules.contains_key(&rule.id) {
			return Err(Error::RuleValidation { field: "id", reason: format!("rule '{}' already exists", rule.id) });
		}
		if Self::duplicate_name(&rules, &rule, None) {
			return Err(Error::RuleValidation {
				field: "name",
				reason: format!(
					"a rule named '{}' already exists for provider '{}', apiType {:?}, ruleListType {:?}",
					rule.name, rule.provider, rule.api_type, rule.rule_list_type
				),
			});
		}

		Self::clear_other_defaults(&mut rules, &rule.id, &rule);
		rules.insert(rule.id.clone(), rule.clone());
		Ok(rule)
	}

	#[tracing::instrument(level = "debug", skip(self, rule))]
	async fn update(&self, mut rule: MappingRule) -> Result<MappingRule> {
		rule.recompute_confidence();
		rule.validate()?;

		let mut rules = self.rules.lock().await;
		if !rules.contains_key(&rule.id) {
			return Err(Error::RuleValidation { field: "id", reason: format!("rule '{}' does not exist", rule.id) });
		}
		if Self::duplicate_name(&rules, &rule, Some(&rule.id)) {
			return Err(Error::RuleValidation {
				field: "name",
				reason: format!("a different rule named '{}' already exists for this tuple", rule.name),
			});
		}

		Self::clear_other_defaults(&mut rules, &rule.id, &rule);
		rules.insert(rule.id.clone(), rule.clone());
		Ok(rule)
	}

	#[tracing::instrument(level = "debug", skip(self))]
	async fn set_active(&self, id: &str, is_active: bool) -> Result<()> {
		let mut rules = self.rules.lock().await;
		let rule =
			rules.get_mut(id).ok_or_else(|| Error::RuleValidation { field: "id", reason: format!("rule '{id}' does not exist") })?;
		rule.is_active = is_active;
		Ok(())
	}

	#[tracing::instrument(level = "debug", skip(self))]
	async fn delete(&self, id: &str) -> Result<bool> {
		Ok(self.rules.lock().await.remove(id).is_some())
	}

	#[tracing::instrument(level = "debug", skip(self))]
	async fn record_application(&self, id: &str, success: bool) -> Result<()> {
		let mut rules = self.rules.lock().await;
		let rule =
			rules.get_mut(id).ok_or_else(|| Error::RuleValidation { field: "id", reason: format!("rule '{id}' does not exist") })?;
		rule.apply_outcome(success);
		Ok(())
	}

	async fn health_check(&self) -> ComponentHealth {
		let count = self.rules.lock().await.len();
		ComponentHealth::with_status("rule_store", ComponentStatus::Healthy, format!("{count} rules stored"))
	}
}
