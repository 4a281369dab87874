//! Bounded back-pressure for rule-application statistics updates (§5).
//!
//! Enqueue is non-blocking: a pending outcome for a rule that already has
//! one queued is coalesced into it (last write wins) rather than growing the
//! queue, so a burst of traffic against one rule cannot pile up unbounded
//! work. A semaphore bounds how many `recordApplication` calls are in
//! flight against the store at once.

// std
use std::{collections::HashMap, sync::Arc};
// crates.io
use tokio::sync::{Mutex, Semaphore};
// self
use crate::rules::store::RuleStore;

/// Default number of concurrent `recordApplication` calls allowed in flight.
pub const DEFAULT_MAX_CONCURRENT_UPDATES: usize = 50;

/// Schedules best-effort, coalesced `recordApplication` updates against a
/// [`RuleStore`] without letting burst traffic block the request path.
pub struct StatsUpdateQueue {
	store: Arc<dyn RuleStore>,
	semaphore: Arc<Semaphore>,
	pending: Arc<Mutex<HashMap<String, bool>>>,
}
impl StatsUpdateQueue {
	/// Build a queue over `store`, admitting at most `max_concurrent` updates
	/// in flight at once.
	pub fn new(store: Arc<dyn RuleStore>, max_concurrent: usize) -> Self {
		Self { store, semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))), pending: Arc::new(Mutex::new(HashMap::new())) }
	}

	/// Build a queue using [`DEFAULT_MAX_CONCURRENT_UPDATES`].
	pub fn with_default_concurrency(store: Arc<dyn RuleStore>) -> Self {
		Self::new(store, DEFAULT_MAX_CONCURRENT_UPDATES)
	}

	/// Enqueue an application outcome for `rule_id`. Never blocks the caller:
	/// if an update for this rule is already pending, its outcome is
	/// overwritten with the latest one rather than queued separately.
	#[tracing::instrument(level = "debug", skip(self))]
	pub async fn enqueue(&self, rule_id: impl Into<String>, success: bool) {
		let rule_id = rule_id.into();
		let mut pending = self.pending.lock().await;
		let already_scheduled = pending.contains_key(&rule_id);
		pending.insert(rule_id.clone(), success);
		drop(pending);

		if already_scheduled {
			// A task is already on its way to drain this rule's latest outcome.
			return;
		}

		let store = self.store.clone();
		let semaphore = self.semaphore.clone();
		let pending = self.pending.clone();
		tokio::spawn(async move {
			let Ok(_permit) = semaphore.acquire_owned().await else { return };
			let Some(success) = pending.lock().await.remove(&rule_id) else { return };
			if let Err(err) = store.record_application(&rule_id, success).await {
				tracing::warn!(rule_id, error = %err, "best-effort rule stats update failed");
			}
		});
	}

	/// Number of rules with a stats update currently queued or in flight.
	pub async fn pending_len(&self) -> usize {
		self.pending.lock().await.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::rules::model::{FieldMapping, MappingRule};
	use crate::rules::store::InMemoryRuleStore;
	use std::time::Duration;

	fn sample_rule() -> MappingRule {
		MappingRule::new(
			"r1",
			"name-r1",
			"longport",
			crate::rules::model::ApiType::Rest,
			crate::rules::model::RuleListType::QuoteFields,
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
		)
	}

	#[tokio::test]
	async fn coalesces_bursts_into_a_single_store_update() {
		let store: Arc<dyn RuleStore> = Arc::new(InMemoryRuleStore::new());
		store.create(sample_rule()).await.unwrap();
		let queue = StatsUpdateQueue::with_default_concurrency(store.clone());

		for _ in 0..20 {
			queue.enqueue("r1", true).await;
		}
		// Give the single spawned drain task a chance to run.
		tokio::time::sleep(Duration::from_millis(20)).await;

		let rule = store.find_by_id("r1").await.unwrap().unwrap();
		assert_eq!(rule.usage_count, 1, "bursts against the same rule must coalesce into one store update");
		assert_eq!(queue.pending_len().await, 0);
	}

	#[tokio::test]
	async fn distinct_rules_each_get_their_own_update() {
		let store: Arc<dyn RuleStore> = Arc::new(InMemoryRuleStore::new());
		store.create(sample_rule()).await.unwrap();
		let mut other = sample_rule();
		other.id = "r2".into();
		other.name = "name-r2".into();
		store.create(other).await.unwrap();

		let queue = StatsUpdateQueue::with_default_concurrency(store.clone());
		queue.enqueue("r1", true).await;
		queue.enqueue("r2", false).await;
		tokio::time::sleep(Duration::from_millis(20)).await;

		assert_eq!(store.find_by_id("r1").await.unwrap().unwrap().usage_count, 1);
		assert_eq!(store.find_by_id("r2").await.unwrap().unwrap().usage_count, 1);
	}
}
