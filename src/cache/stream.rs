//! Per-symbol latest-value stream cache (C9).

// std
use std::{collections::HashMap, sync::Arc, time::Duration};
// crates.io
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
// self
use crate::{cache::warm::WarmTier, fingerprint, health::{ComponentHealth, ComponentStatus}, serializer::Serializer};

/// A single symbol's latest pushed payload.
#[derive(Clone, Debug)]
pub struct StreamSnapshot {
	/// Instrument symbol.
	pub symbol: String,
	/// Encoded payload bytes.
	pub payload: Arc<Vec<u8>>,
	/// Timestamp the payload was produced by the provider.
	pub ts: DateTime<Utc>,
	/// Provider that produced this payload.
	pub provider: String,
	written_at: tokio::time::Instant,
}

/// On-wire form of [`StreamSnapshot`] persisted under `stream:quote:{SYMBOL}`
/// in the warm tier's separate stream database (§6). `written_at` is an
/// in-process `Instant` and has no wire representation; a snapshot loaded
/// back from the warm tier gets a fresh one stamped at load time.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct StreamSnapshotWire {
	symbol: String,
	payload: Vec<u8>,
	ts: DateTime<Utc>,
	provider: String,
}

/// External collaborator that fans a fresh push out to subscribers.
///
/// Consumed, never implemented, by this crate: the concrete fan-out layer
/// (e.g. a WebSocket broadcast hub) sits behind this trait.
#[async_trait::async_trait]
pub trait StreamBus: Send + Sync {
	/// Publish `payload` for `symbol` to every current subscriber.
	async fn publish(&self, symbol: &str, payload: &[u8]);
}

/// Per-symbol latest-value cache fed by provider push, read by WS fan-out.
///
/// Does not know about sockets; the fan-out layer is an external
/// collaborator that reads via [`StreamCache::get_latest`] or subscribes
/// through an attached [`StreamBus`].
pub struct StreamCache {
	entries: RwLock<HashMap<String, StreamSnapshot>>,
	ttl: Duration,
	bus: Option<Arc<dyn StreamBus>>,
	warm: Option<Arc<dyn WarmTier>>,
	serializer: Serializer,
}
impl StreamCache {
	/// Build a stream cache with the given per-entry TTL and no attached bus
	/// or warm-tier persistence: pushes live only in this process.
	pub fn new(ttl: Duration) -> Self {
		Self { entries: RwLock::new(HashMap::new()), ttl, bus: None, warm: None, serializer: Serializer::default() }
	}

	/// Attach a [`StreamBus`] that every subsequent [`Self::put`] also publishes to.
	pub fn with_bus(mut self, bus: Arc<dyn StreamBus>) -> Self {
		self.bus = Some(bus);
		self
	}

	/// Back this cache with a warm tier, so a push survives this process
	/// restarting. Keyed by [`fingerprint::stream_key`], which §6 places in a
	/// Redis database separate from the base hot/warm/rule-cache namespaces
	/// (a property of the `warm` tier instance passed in, not of this cache).
	pub fn with_warm_tier(mut self, warm: Arc<dyn WarmTier>, serializer: Serializer) -> Self {
		self.warm = Some(warm);
		self.serializer = serializer;
		self
	}

	/// Record a provider push for `symbol`, fan it out via the attached
	/// [`StreamBus`] if any, and best-effort persist it to the warm tier if
	/// one is attached.
	#[tracing::instrument(level = "debug", skip(self, payload))]
	pub async fn put(&self, symbol: impl Into<String>, payload: Arc<Vec<u8>>, ts: DateTime<Utc>, provider: impl Into<String>) {
		let symbol = symbol.into();
		let provider = provider.into();
		let snapshot = StreamSnapshot {
			symbol: symbol.clone(),
			payload: payload.clone(),
			ts,
			provider: provider.clone(),
			written_at: tokio::time::Instant::now(),
		};
		self.entries.write().await.insert(symbol.clone(), snapshot);

		if let Some(warm) = &self.warm {
			let wire = StreamSnapshotWire { symbol: symbol.clone(), payload: (*payload).clone(), ts, provider };
			match self.serializer.encode(&wire) {
				Ok(encoded) => {
					if let Err(err) = warm.set(&fingerprint::stream_key(&symbol), &encoded, self.ttl).await {
						tracing::warn!(symbol = %symbol, error = %err, "best-effort stream warm-tier write-back failed");
					}
				},
				Err(err) => tracing::warn!(symbol = %symbol, error = %err, "failed to encode stream snapshot for warm tier"),
			}
		}

		if let Some(bus) = &self.bus {
			bus.publish(&symbol, &payload).await;
		}
	}

	/// Read the latest snapshot for `symbol`.
	///
	/// Checks the in-process entry first (still within TTL); on a miss,
	/// falls back to the attached warm tier if one is configured, populating
	/// the in-process entry from whatever it returns.
	#[tracing::instrument(level = "debug", skip(self))]
	pub async fn get_latest(&self, symbol: &str) -> Option<StreamSnapshot> {
		{
			let entries = self.entries.read().await;
			if let Some(snapshot) = entries.get(symbol) {
				if snapshot.written_at.elapsed() < self.ttl {
					return Some(snapshot.clone());
				}
			}
		}

		let warm = self.warm.as_ref()?;
		let bytes = match warm.get(&fingerprint::stream_key(symbol)).await {
			Ok(Some(bytes)) => bytes,
			Ok(None) => return None,
			Err(err) => {
				tracing::warn!(symbol, error = %err, "stream warm-tier read failed, treating as miss");
				return None;
			},
		};
		let wire: StreamSnapshotWire = match self.serializer.decode(&bytes) {
			Ok(wire) => wire,
			Err(err) => {
				tracing::warn!(symbol, error = %err, "stream warm-tier payload failed to decode, treating as miss");
				return None;
			},
		};

		let snapshot = StreamSnapshot {
			symbol: wire.symbol,
			payload: Arc::new(wire.payload),
			ts: wire.ts,
			provider: wire.provider,
			written_at: tokio::time::Instant::now(),
		};
		self.entries.write().await.insert(symbol.to_string(), snapshot.clone());
		Some(snapshot)
	}

	/// Drop the cached snapshot for `symbol`, including the warm-tier copy
	/// if a warm tier is attached.
	pub async fn invalidate(&self, symbol: &str) {
		self.entries.write().await.remove(symbol);
		if let Some(warm) = &self.warm {
			if let Err(err) = warm.del(&fingerprint::stream_key(symbol)).await {
				tracing::warn!(symbol, error = %err, "best-effort stream warm-tier invalidate failed");
			}
		}
	}

	/// Health probe: healthy as long as the in-process map is reachable (it
	/// always is); reported for symmetry with the other tiers.
	pub async fn health_check(&self) -> ComponentHealth {
		ComponentHealth::with_status("stream", ComponentStatus::Healthy, format!("{} live symbols", self.entries.read().await.len()))
	}
}
