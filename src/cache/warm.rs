//! Redis-backed warm cache adapter (C4).

// std
use std::{
	sync::atomic::{AtomicBool, AtomicU64, Ordering},
	time::Duration,
};
// crates.io
use redis::{AsyncCommands, aio::ConnectionManager};
// self
use crate::{
	Error, Result,
	health::{ComponentHealth, ComponentStatus},
};

/// Bound on the number of `SCAN` round-trips `delByPattern` will perform
/// before giving up, so a pathological pattern cannot loop forever.
pub const MAX_SCAN_ITERATIONS: u32 = 10_000;
/// `COUNT` hint passed to each `SCAN` call.
pub const SCAN_BATCH_SIZE: u32 = 200;

/// Point-in-time statistics for the warm cache.
#[derive(Clone, Copy, Debug, Default)]
pub struct WarmCacheStats {
	/// Successful command count.
	pub commands_ok: u64,
	/// Failed command count (timeout, connection error, etc).
	pub commands_failed: u64,
	/// Whether the last health check observed the connection as healthy.
	pub healthy: bool,
}

/// Typed wrapper over a Redis connection, with bounded command timeouts and
/// a SCAN-based (never `KEYS`) bulk-delete operation.
pub struct WarmCache {
	connection: ConnectionManager,
	key_prefix: String,
	command_timeout: Duration,
	commands_ok: AtomicU64,
	commands_failed: AtomicU64,
	healthy: AtomicBool,
}
impl WarmCache {
	/// Connect to `redis_url`, wrapping the connection in a `ConnectionManager`
	/// that reconnects transparently.
	pub async fn connect(redis_url: &str, key_prefix: impl Into<String>, command_timeout: Duration) -> Result<Self> {
		let client = redis::Client::open(redis_url).map_err(Error::from)?;
		let connection = client.get_connection_manager().await.map_err(Error::from)?;

		Ok(Self {
			connection,
			key_prefix: key_prefix.into(),
			command_timeout,
			commands_ok: AtomicU64::new(0),
			commands_failed: AtomicU64::new(0),
			healthy: AtomicBool::new(true),
		})
	}

	fn namespaced(&self, key: &str) -> String {
		format!("{}:{key}", self.key_prefix)
	}

	async fn run<F, T>(&self, fut: F) -> Result<T>
	where
		F: std::future::Future<Output = redis::RedisResult<T>>,
	{
		match tokio::time::timeout(self.command_timeout, fut).await {
			Ok(Ok(value)) => {
				self.commands_ok.fetch_add(1, Ordering::Relaxed);
				self.healthy.store(true, Ordering::Relaxed);
				Ok(value)
			},
			Ok(Err(err)) => {
				self.commands_failed.fetch_add(1, Ordering::Relaxed);
				self.healthy.store(false, Ordering::Relaxed);
				Err(Error::from(err))
			},
			Err(_) => {
				self.commands_failed.fetch_add(1, Ordering::Relaxed);
				self.healthy.store(false, Ordering::Relaxed);
				Err(Error::WarmCacheUnavailable(format!("command timed out after {:?}", self.command_timeout)))
			},
		}
	}

	/// Fetch raw bytes for `key`.
	#[tracing::instrument(level = "debug", skip(self))]
	pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
		let mut connection = self.connection.clone();
		let key = self.namespaced(key);
		self.run(async move { connection.get(&key).await }).await
	}

	/// Write `value` to `key` with the given TTL.
	#[tracing::instrument(level = "debug", skip(self, value))]
	pub async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
		let mut connection = self.connection.clone();
		let key = self.namespaced(key);
		let ttl_secs = ttl.as_secs().max(1);
		self.run(async move { connection.set_ex::<_, _, ()>(&key, value, ttl_secs).await }).await
	}

	/// Fetch multiple keys in one round-trip.
	#[tracing::instrument(level = "debug", skip(self))]
	pub async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
		if keys.is_empty() {
			return Ok(Vec::new());
		}
		let mut connection = self.connection.clone();
		let namespaced: Vec<String> = keys.iter().map(|key| self.namespaced(key)).collect();
		self.run(async move { connection.mget(&namespaced).await }).await
	}

	/// Write multiple key/value/ttl tuples. Not atomic across keys.
	#[tracing::instrument(level = "debug", skip(self, entries))]
	pub async fn mset(&self, entries: &[(String, Vec<u8>, Duration)]) -> Result<()> {
		for (key, value, ttl) in entries {
			self.set(key, value, *ttl).await?;
		}
		Ok(())
	}

	/// Delete a single key.
	#[tracing::instrument(level = "debug", skip(self))]
	pub async fn del(&self, key: &str) -> Result<bool> {
		let mut connection = self.connection.clone();
		let key = self.namespaced(key);
		let removed: u64 = self.run(async move { connection.del(&key).await }).await?;
		Ok(removed > 0)
	}

	/// Delete every key matching `pattern` using incremental `SCAN`, never
	/// the blocking `KEYS` command.
	#[tracing::instrument(level = "debug", skip(self))]
	pub async fn del_by_pattern(&self, pattern: &str) -> Result<u64> {
		let namespaced_pattern = self.namespaced(pattern);
		let mut connection = self.connection.clone();
		let mut cursor: u64 = 0;
		let mut deleted = 0u64;

		for _ in 0..MAX_SCAN_ITERATIONS {
			let pattern = namespaced_pattern.clone();
			let (next_cursor, keys): (u64, Vec<String>) = self
				.run(async move {
					redis::cmd("SCAN")
						.arg(cursor)
						.arg("MATCH")
						.arg(&pattern)
						.arg("COUNT")
						.arg(SCAN_BATCH_SIZE)
						.query_async(&mut connection)
						.await
				})
				.await?;

			if !keys.is_empty() {
				let mut delete_connection = self.connection.clone();
				let removed: u64 = self.run(async move { delete_connection.del(&keys).await }).await?;
				deleted += removed;
			}

			cursor = next_cursor;
			if cursor == 0 {
				break;
			}
		}

		Ok(deleted)
	}

	/// Ping the server, recording and returning the observed health status.
	#[tracing::instrument(level = "debug", skip(self))]
	pub async fn health_check(&self) -> ComponentHealth {
		let mut connection = self.connection.clone();
		match self.run(async move { redis::cmd("PING").query_async::<String>(&mut connection).await }).await {
			Ok(_) => ComponentHealth::healthy("warm"),
			Err(err) => ComponentHealth::with_status("warm", ComponentStatus::Unhealthy, err.to_string()),
		}
	}

	/// Snapshot command counters and the last-observed health flag.
	pub fn stats(&self) -> WarmCacheStats {
		WarmCacheStats {
			commands_ok: self.commands_ok.load(Ordering::Relaxed),
			commands_failed: self.commands_failed.load(Ordering::Relaxed),
			healthy: self.healthy.load(Ordering::Relaxed),
		}
	}

	/// Whether the last command observed the connection as healthy.
	pub fn is_healthy(&self) -> bool {
		self.healthy.load(Ordering::Relaxed)
	}
}

/// Behavior [`RuleCache`](crate::cache::rule_cache::RuleCache) and
/// [`Orchestrator`](crate::cache::orchestrator::Orchestrator) depend on,
/// implemented by [`WarmCache`] and, for tests, by an in-memory fake.
#[async_trait::async_trait]
pub trait WarmTier: Send + Sync {
	/// Fetch raw bytes for `key`.
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
	/// Write `value` to `key` with the given TTL.
	async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;
	/// Delete a single key.
	async fn del(&self, key: &str) -> Result<bool>;
	/// Delete every key matching `pattern` via incremental SCAN.
	async fn del_by_pattern(&self, pattern: &str) -> Result<u64>;
	/// Probe connection health.
	async fn health_check(&self) -> ComponentHealth;
}

#[async_trait::async_trait]
impl WarmTier for WarmCache {
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
		WarmCache::get(self, key).await
	}

	async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
		WarmCache::set(self, key, value, ttl).await
	}

	async fn del(&self, key: &str) -> Result<bool> {
		WarmCache::del(self, key).await
	}

	async fn del_by_pattern(&self, pattern: &str) -> Result<u64> {
		WarmCache::del_by_pattern(self, pattern).await
	}

	async fn health_check(&self) -> ComponentHealth {
		WarmCache::health_check(self).await
	}
}

/// Test-only in-memory stand-in for [`WarmCache`], used where exercising the
/// orchestrator or rule cache without a live Redis server is required.
#[cfg(any(test, feature = "test-util"))]
pub mod fake {
	use std::{collections::HashMap, time::Duration};

	use tokio::sync::Mutex;

	use super::WarmTier;
	use crate::{
		Result,
		health::{ComponentHealth, ComponentStatus},
	};

	/// In-memory [`WarmTier`] with no real TTL enforcement or network I/O.
	#[derive(Default)]
	pub struct InMemoryWarmTier {
		entries: Mutex<HashMap<String, Vec<u8>>>,
	}
	impl InMemoryWarmTier {
		/// Build an empty fake warm tier.
		pub fn new() -> Self {
			Self::default()
		}
	}

	#[async_trait::async_trait]
	impl WarmTier for InMemoryWarmTier {
		async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
			Ok(self.entries.lock().await.get(key).cloned())
		}

		async fn set(&self, key: &str, value: &[u8], _ttl: Duration) -> Result<()> {
			self.entries.lock().await.insert(key.to_string(), value.to_vec());
			Ok(())
		}

		async fn del(&self, key: &str) -> Result<bool> {
			Ok(self.entries.lock().await.remove(key).is_some())
		}

		async fn del_by_pattern(&self, pattern: &str) -> Result<u64> {
			let mut entries = self.entries.lock().await;
			let matching: Vec<String> = entries.keys().filter(|key| glob_match(pattern, key)).cloned().collect();
			for key in &matching {
				entries.remove(key);
			}
			Ok(matching.len() as u64)
		}

		async fn health_check(&self) -> ComponentHealth {
			ComponentHealth::healthy("warm")
		}
	}

	/// Redis-style glob match: `*` matches any run of characters, everything
	/// else must match literally.
	fn glob_match(pattern: &str, candidate: &str) -> bool {
		let mut segments = pattern.split('*').peekable();
		let mut rest = candidate;

		if let Some(first) = segments.peek() {
			if !pattern.starts_with('*') && !rest.starts_with(first.as_str()) {
				return false;
			}
		}

		while let Some(segment) = segments.next() {
			if segment.is_empty() {
				if segments.peek().is_none() {
					return true;
				}
				continue;
			}
			match rest.find(segment) {
				Some(index) => rest = &rest[index + segment.len()..],
				None => return false,
			}
		}

		pattern.ends_with('*') || rest.is_empty()
	}

	#[cfg(test)]
	mod glob_tests {
		use super::glob_match;

		#[test]
		fn matches_embedded_wildcard_segments() {
			assert!(glob_match("data-mapper:*:longport:*", "data-mapper:best-rule:longport:rest:quote_fields:HK"));
			assert!(!glob_match("data-mapper:*:longport:*", "data-mapper:best-rule:futu:rest:quote_fields:HK"));
		}

		#[test]
		fn matches_exact_literal_with_no_wildcard() {
			assert!(glob_match("data-mapper:rule:r1", "data-mapper:rule:r1"));
			assert!(!glob_match("data-mapper:rule:r1", "data-mapper:rule:r2"));
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn scan_batch_size_and_iteration_cap_are_sane() {
		assert!(SCAN_BATCH_SIZE > 0);
		assert!(MAX_SCAN_ITERATIONS > 0);
	}
}
