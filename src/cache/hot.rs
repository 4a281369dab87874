//! Bounded in-process LRU cache (C3).

// std
use std::{
	num::NonZeroUsize,
	sync::atomic::{AtomicU64, Ordering},
	time::{Duration, Instant},
};
// crates.io
use lru::LruCache;
use tokio::sync::Mutex;

/// One hot-cache entry: an opaque, already-encoded payload plus its expiry.
#[derive(Clone, Debug)]
pub struct HotEntry {
	/// Encoded payload bytes, as produced by the serializer.
	pub payload: std::sync::Arc<Vec<u8>>,
	/// Monotonic instant this entry was written.
	pub created_at: Instant,
	/// Monotonic instant after which this entry is considered expired.
	pub expires_at: Instant,
}
impl HotEntry {
	fn new(payload: std::sync::Arc<Vec<u8>>, ttl: Duration) -> Self {
		let created_at = Instant::now();
		Self { payload, created_at, expires_at: created_at + ttl }
	}

	fn is_expired(&self, now: Instant) -> bool {
		now >= self.expires_at
	}
}

/// Point-in-time statistics for the hot cache.
#[derive(Clone, Copy, Debug, Default)]
pub struct HotCacheStats {
	/// Current number of live entries.
	pub size: usize,
	/// Total hits observed.
	pub hits: u64,
	/// Total misses observed (including lazily-expired hits).
	pub misses: u64,
	/// Total entries dropped by LRU eviction.
	pub evictions: u64,
	/// `hits / (hits + misses)`, or 0 when no lookups have occurred.
	pub hit_rate: f64,
	/// Average age, in milliseconds, of currently cached entries.
	pub avg_age_ms: u64,
	/// Age, in milliseconds, of the oldest currently cached entry.
	pub oldest_age_ms: u64,
}

/// Fixed-capacity, TTL-aware, LRU-evicted in-process cache keyed by fingerprint.
pub struct HotCache {
	entries: Mutex<LruCache<String, HotEntry>>,
	hits: AtomicU64,
	misses: AtomicU64,
	evictions: AtomicU64,
}
impl HotCache {
	/// Build a hot cache with the given entry capacity.
	pub fn new(capacity: usize) -> Self {
		let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).expect("1 is nonzero"));
		Self {
			entries: Mutex::new(LruCache::new(capacity)),
			hits: AtomicU64::new(0),
			misses: AtomicU64::new(0),
			evictions: AtomicU64::new(0),
		}
	}

	/// Look up `fingerprint`. Expired entries are removed and counted as a miss.
	#[tracing::instrument(level = "debug", skip(self))]
	pub async fn get(&self, fingerprint: &str) -> Option<std::sync::Arc<Vec<u8>>> {
		let now = Instant::now();
		let mut entries = self.entries.lock().await;

		match entries.get(fingerprint) {
			Some(entry) if !entry.is_expired(now) => {
				self.hits.fetch_add(1, Ordering::Relaxed);
				Some(entry.payload.clone())
			},
			Some(_) => {
				entries.pop(fingerprint);
				self.misses.fetch_add(1, Ordering::Relaxed);
				None
			},
			None => {
				self.misses.fetch_add(1, Ordering::Relaxed);
				None
			},
		}
	}

	/// Insert or replace `fingerprint` with `payload`, expiring after `ttl`.
	#[tracing::instrument(level = "debug", skip(self, payload))]
	pub async fn set(&self, fingerprint: impl Into<String>, payload: std::sync::Arc<Vec<u8>>, ttl: Duration) {
		let mut entries = self.entries.lock().await;
		let evicted = entries.put(fingerprint.into(), HotEntry::new(payload, ttl));
		if evicted.is_some() {
			self.evictions.fetch_add(1, Ordering::Relaxed);
		}
	}

	/// Remove `fingerprint`, if present.
	pub async fn delete(&self, fingerprint: &str) {
		self.entries.lock().await.pop(fingerprint);
	}

	/// Drop all entries.
	pub async fn clear(&self) {
		self.entries.lock().await.clear();
	}

	/// Remove all currently-expired entries; intended to run on a periodic timer.
	#[tracing::instrument(level = "debug", skip(self))]
	pub async fn sweep_expired(&self) {
		let now = Instant::now();
		let mut entries = self.entries.lock().await;
		let expired: Vec<String> =
			entries.iter().filter(|(_, entry)| entry.is_expired(now)).map(|(key, _)| key.clone()).collect();
		for key in expired {
			entries.pop(&key);
		}
	}

	/// Snapshot current statistics.
	pub async fn stats(&self) -> HotCacheStats {
		let now = Instant::now();
		let entries = self.entries.lock().await;
		let hits = self.hits.load(Ordering::Relaxed);
		let misses = self.misses.load(Ordering::Relaxed);
		let total = hits + misses;

		let ages: Vec<u64> =
			entries.iter().map(|(_, entry)| now.saturating_duration_since(entry.created_at).as_millis() as u64).collect();
		let avg_age_ms = if ages.is_empty() { 0 } else { ages.iter().sum::<u64>() / ages.len() as u64 };
		let oldest_age_ms = ages.into_iter().max().unwrap_or(0);

		HotCacheStats {
			size: entries.len(),
			hits,
			misses,
			evictions: self.evictions.load(Ordering::Relaxed),
			hit_rate: if total > 0 { hits as f64 / total as f64 } else { 0.0 },
			avg_age_ms,
			oldest_age_ms,
		}
	}
}
