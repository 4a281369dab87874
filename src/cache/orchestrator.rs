//! Strategy-dispatching, single-flight, hot→warm→origin cache orchestrator (C8).

// std
use std::{
	collections::HashMap,
	sync::Arc,
	time::{Duration, Instant},
};
// crates.io
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::Mutex;
use tracing::Instrument;
// self
use crate::{
	Error, Result,
	cache::{hot::HotCache, warm::WarmTier},
	config::GatewayConfig,
	health::{ComponentHealth, HealthReport},
	serializer::Serializer,
};

/// Request-level freshness class, selecting TTL and origin-timeout budgets.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Strategy {
	/// Very short TTL, tight origin timeout; used for live quotes.
	Strong,
	/// Longer TTL; used for query/aggregation endpoints.
	Weak,
	/// Bypass the cache entirely: call origin, never write back.
	None,
}
impl Strategy {
	fn ttl(self, config: &GatewayConfig) -> Duration {
		match self {
			Strategy::Strong => config.realtime_ttl,
			Strategy::Weak => config.warm_ttl,
			Strategy::None => Duration::ZERO,
		}
	}

	fn origin_timeout(self, config: &GatewayConfig) -> Duration {
		match self {
			Strategy::Strong => config.origin_timeout.min(config.realtime_ttl),
			Strategy::Weak | Strategy::None => config.origin_timeout,
		}
	}
}

/// External collaborator that produces a fresh value on a cache miss.
///
/// Transport-level retry is owned by the concrete implementation (typically
/// a provider adapter); this trait is a boundary only.
#[async_trait::async_trait]
pub trait OriginFetcher<T>: Send + Sync {
	/// Fetch a fresh value for the fingerprint this fetcher was built for.
	async fn fetch(&self) -> Result<T>;
}

/// Single-flight guard: at most one concurrent origin call per fingerprint.
///
/// Owns itself via `Arc` rather than borrowing, so a guard can be moved into
/// a detached `tokio::spawn`'d task: the task that actually calls origin must
/// outlive the caller that triggered it, or a cancelled caller (an external
/// `select!`/`timeout` around [`Orchestrator::get_or_compute`]) would abort
/// the in-flight origin call and strand any followers waiting on the lock.
struct SingleFlight {
	locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}
impl SingleFlight {
	fn new() -> Arc<Self> {
		Arc::new(Self { locks: Mutex::new(HashMap::new()) })
	}

	async fn acquire(self: &Arc<Self>, key: &str) -> SingleFlightGuard {
		let lock = {
			let mut locks = self.locks.lock().await;
			locks.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
		};
		let permit = lock.lock_owned().await;
		SingleFlightGuard { single_flight: self.clone(), key: key.to_string(), _permit: permit }
	}
}

struct SingleFlightGuard {
	single_flight: Arc<SingleFlight>,
	key: String,
	_permit: tokio::sync::OwnedMutexGuard<()>,
}
impl Drop for SingleFlightGuard {
	fn drop(&mut self) {
		let single_flight = self.single_flight.clone();
		let key = std::mem::take(&mut self.key);
		tokio::spawn(async move {
			let mut locks = single_flight.locks.lock().await;
			// Only remove the map entry if nobody else grabbed a fresh Arc for
			// this key in the meantime.
			if let Some(entry) = locks.get(&key) {
				if Arc::strong_count(entry) == 1 {
					locks.remove(&key);
				}
			}
		});
	}
}

/// Multi-strategy, multi-tier cache orchestrator: the entry point described
/// by `Cache.getOrCompute` in the external-interfaces section.
pub struct Orchestrator {
	hot: Arc<HotCache>,
	warm: Arc<dyn WarmTier>,
	serializer: Serializer,
	single_flight: Arc<SingleFlight>,
	config: GatewayConfig,
}
impl Orchestrator {
	/// Build an orchestrator sharing the given hot/warm tiers.
	pub fn new(hot: Arc<HotCache>, warm: Arc<dyn WarmTier>, serializer: Serializer, config: GatewayConfig) -> Self {
		Self { hot, warm, serializer, single_flight: SingleFlight::new(), config }
	}

	/// Access the shared hot cache, e.g. for admin/bulk operations.
	pub fn hot(&self) -> &Arc<HotCache> {
		&self.hot
	}

	/// Access the shared warm cache, e.g. for admin/bulk operations.
	pub fn warm(&self) -> &Arc<dyn WarmTier> {
		&self.warm
	}

	/// Resolve `fingerprint` under `strategy`, calling `origin` on a miss.
	///
	/// State machine per fingerprint: `Idle → Looking → (Hit → Idle) | (Miss →
	/// Leading → (OriginOk → WritingBack → Idle) | (OriginErr → Idle))`. Callers
	/// that arrive while a leader is resolving the same fingerprint are
	/// "Following" and receive the leader's result without calling origin
	/// themselves.
	#[tracing::instrument(level = "debug", skip(self, origin), fields(fingerprint, strategy = ?strategy))]
	pub async fn get_or_compute<T>(
		&self,
		fingerprint: &str,
		strategy: Strategy,
		origin: Arc<dyn OriginFetcher<T> + Send + Sync>,
	) -> Result<Arc<T>>
	where
		T: Serialize + DeserializeOwned + Send + Sync + 'static,
	{
		if strategy == Strategy::None {
			tracing::debug!(fingerprint, "strategy none: bypassing cache");
			return origin.fetch().await.map(Arc::new);
		}

		if let Some(bytes) = self.hot.get(fingerprint).await {
			return match self.serializer.decode::<T>(&bytes) {
				Ok(value) => {
					tracing::debug!(fingerprint, "hot cache hit");
					Ok(Arc::new(value))
				},
				Err(err) => {
					tracing::warn!(fingerprint, error = %err, "hot cache payload failed to decode, treating as miss");
					self.hot.delete(fingerprint).await;
					self.resolve_miss(fingerprint, strategy, origin).await
				},
			};
		}

		match self.warm.get(fingerprint).await {
			Ok(Some(bytes)) => match self.serializer.decode::<T>(&bytes) {
				Ok(value) => {
					tracing::debug!(fingerprint, "warm cache hit");
					self.hot.set(fingerprint.to_string(), Arc::new(bytes), strategy.ttl(&self.config)).await;
					Ok(Arc::new(value))
				},
				Err(err) => {
					tracing::warn!(fingerprint, error = %err, "warm cache payload failed to decode, treating as miss");
					self.resolve_miss(fingerprint, strategy, origin).await
				},
			},
			Ok(None) => self.resolve_miss(fingerprint, strategy, origin).await,
			Err(err) => {
				tracing::warn!(fingerprint, error = %err, "warm cache unavailable, continuing hot-only");
				self.resolve_miss(fingerprint, strategy, origin).await
			},
		}
	}

	/// Resolve a cache miss for `fingerprint`.
	///
	/// The guard-acquire, origin-fetch, and write-back run inside a detached
	/// `tokio::spawn`'d task rather than directly on the caller's own
	/// future: if the caller of `get_or_compute` is itself cancelled (e.g.
	/// dropped inside an outer `select!`/`timeout`), the spawned task keeps
	/// running to completion, so the in-flight origin call finishes and any
	/// follower blocked on the same fingerprint's lock still observes its
	/// result in the hot cache once the guard releases.
	async fn resolve_miss<T>(
		&self,
		fingerprint: &str,
		strategy: Strategy,
		origin: Arc<dyn OriginFetcher<T> + Send + Sync>,
	) -> Result<Arc<T>>
	where
		T: Serialize + DeserializeOwned + Send + Sync + 'static,
	{
		let hot = self.hot.clone();
		let warm = self.warm.clone();
		let serializer = self.serializer.clone();
		let single_flight = self.single_flight.clone();
		let fingerprint = fingerprint.to_string();
		let config = self.config.clone();

		let task = tokio::spawn(
			async move {
				let _guard = single_flight.acquire(&fingerprint).await;

				// A follower that waited on the guard may now find a value the
				// leader just wrote; re-check hot before calling origin ourselves.
				if let Some(bytes) = hot.get(&fingerprint).await {
					if let Ok(value) = serializer.decode::<T>(&bytes) {
						return Ok(Arc::new(value));
					}
				}

				let started = Instant::now();
				let value = tokio::time::timeout(strategy.origin_timeout(&config), origin.fetch())
					.await
					.map_err(|_| Error::OriginTimeout(strategy.origin_timeout(&config)))?
					.map_err(|err| Error::Origin(err.to_string()))?;

				tracing::debug!(
					fingerprint = %fingerprint,
					elapsed_ms = started.elapsed().as_millis() as u64,
					"origin call completed"
				);

				let encoded = serializer.encode(&value)?;
				let ttl = strategy.ttl(&config);

				if let Err(err) = warm.set(&fingerprint, &encoded, ttl).await {
					tracing::warn!(fingerprint = %fingerprint, error = %err, "best-effort warm cache write-back failed");
				}
				hot.set(fingerprint.clone(), Arc::new(encoded), ttl).await;

				Ok(Arc::new(value))
			}
			.in_current_span(),
		);

		task.await.map_err(|join_err| Error::Origin(format!("origin task did not complete: {join_err}")))?
	}

	/// Aggregate health across the hot and warm tiers.
	pub async fn health(&self) -> HealthReport {
		let hot_stats = self.hot.stats().await;
		let hot = ComponentHealth::healthy("hot");
		tracing::debug!(hot_size = hot_stats.size, "hot cache health check");
		let warm = self.warm.health_check().await;
		HealthReport::from_components(vec![hot, warm])
	}

	/// Idempotent bulk operation: repopulate the hot cache from a warm-cache
	/// read for each fingerprint; skips and logs individual failures.
	#[tracing::instrument(level = "debug", skip(self, fingerprints))]
	pub async fn warmup_cache(&self, fingerprints: &[String]) {
		for fingerprint in fingerprints {
			match self.warm.get(fingerprint).await {
				Ok(Some(bytes)) => {
					self.hot.set(fingerprint.clone(), Arc::new(bytes), self.config.warm_ttl).await;
				},
				Ok(None) => {},
				Err(err) => tracing::warn!(fingerprint, error = %err, "warmup skipped fingerprint"),
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{cache::warm::fake::InMemoryWarmTier, serializer::WireFormat};
	use std::sync::atomic::{AtomicUsize, Ordering};

	struct CountingOrigin {
		calls: AtomicUsize,
		value: u64,
		delay: Duration,
	}
	#[async_trait::async_trait]
	impl OriginFetcher<u64> for CountingOrigin {
		async fn fetch(&self) -> Result<u64> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			if !self.delay.is_zero() {
				tokio::time::sleep(self.delay).await;
			}
			Ok(self.value)
		}
	}

	fn orchestrator() -> Orchestrator {
		Orchestrator::new(
			Arc::new(HotCache::new(16)),
			Arc::new(InMemoryWarmTier::new()),
			Serializer::new(WireFormat::Json),
			GatewayConfig::default(),
		)
	}

	#[tokio::test]
	async fn none_strategy_always_calls_origin_and_never_caches() {
		let orchestrator = orchestrator();
		let origin = Arc::new(CountingOrigin { calls: AtomicUsize::new(0), value: 42, delay: Duration::ZERO });

		orchestrator.get_or_compute("fp1", Strategy::None, origin.clone()).await.unwrap();
		orchestrator.get_or_compute("fp1", Strategy::None, origin.clone()).await.unwrap();

		assert_eq!(origin.calls.load(Ordering::SeqCst), 2);
		assert_eq!(orchestrator.hot.stats().await.size, 0);
	}

	#[tokio::test]
	async fn a_miss_populates_hot_cache_and_a_second_read_is_a_hit() {
		let orchestrator = orchestrator();
		let origin = Arc::new(CountingOrigin { calls: AtomicUsize::new(0), value: 42, delay: Duration::ZERO });

		let first = orchestrator.get_or_compute("fp1", Strategy::Strong, origin.clone()).await.unwrap();
		let second = orchestrator.get_or_compute("fp1", Strategy::Strong, origin.clone()).await.unwrap();

		assert_eq!(*first, 42);
		assert_eq!(*second, 42);
		assert_eq!(origin.calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn concurrent_misses_on_the_same_fingerprint_call_origin_exactly_once() {
		let orchestrator = Arc::new(orchestrator());
		let origin = Arc::new(CountingOrigin { calls: AtomicUsize::new(0), value: 7, delay: Duration::from_millis(20) });

		let mut handles = Vec::new();
		for _ in 0..10 {
			let orchestrator = orchestrator.clone();
			let origin = origin.clone();
			handles.push(tokio::spawn(async move {
				orchestrator.get_or_compute("700.HK", Strategy::Strong, origin).await.unwrap()
			}));
		}

		for handle in handles {
			assert_eq!(*handle.await.unwrap(), 7);
		}

		assert_eq!(origin.calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn cancelling_the_leaders_caller_does_not_abort_the_origin_call() {
		let orchestrator = Arc::new(orchestrator());
		let origin =
			Arc::new(CountingOrigin { calls: AtomicUsize::new(0), value: 99, delay: Duration::from_millis(30) });

		let leader = {
			let orchestrator = orchestrator.clone();
			let origin = origin.clone();
			tokio::spawn(
				async move { orchestrator.get_or_compute("700.HK", Strategy::Strong, origin).await },
			)
		};

		// Simulate an outer `select!`/`timeout` dropping the leader's call
		// before origin responds.
		tokio::time::sleep(Duration::from_millis(5)).await;
		leader.abort();
		let _ = leader.await;

		// The origin fetch must still complete and populate the hot cache,
		// even though the task that triggered it was cancelled.
		tokio::time::sleep(Duration::from_millis(50)).await;

		assert_eq!(origin.calls.load(Ordering::SeqCst), 1);
		let cached = orchestrator.hot.get("700.HK").await.expect("hot cache populated despite leader cancellation");
		let value: u64 = Serializer::new(WireFormat::Json).decode(&cached).unwrap();
		assert_eq!(value, 99);
	}
}
