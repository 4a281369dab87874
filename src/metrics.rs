//! Metrics helpers and per-component telemetry bookkeeping.

// std
use std::{
	sync::{
		Arc, OnceLock,
		atomic::{AtomicU64, Ordering},
	},
	time::Duration,
};
// crates.io
use metrics::Label;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use smallvec::SmallVec;
// self
use crate::{Error, Result};

type LabelSet = SmallVec<[Label; 4]>;

const METRIC_CACHE_REQUESTS_TOTAL: &str = "gateway_cache_requests_total";
const METRIC_CACHE_HITS_TOTAL: &str = "gateway_cache_hits_total";
const METRIC_CACHE_MISSES_TOTAL: &str = "gateway_cache_misses_total";
const METRIC_ORIGIN_CALLS_TOTAL: &str = "gateway_origin_calls_total";
const METRIC_ORIGIN_DURATION: &str = "gateway_origin_duration_seconds";
const METRIC_ORIGIN_ERRORS: &str = "gateway_origin_errors_total";
const METRIC_MAPPING_TOTAL: &str = "gateway_mapping_records_total";
const METRIC_MAPPING_FIELD_FAILURES: &str = "gateway_mapping_field_failures_total";

/// Shared Prometheus handle installed by [`install_default_exporter`].
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Thread-safe metrics accumulator for a single `(provider, market)` pair.
#[derive(Debug, Default)]
pub struct GatewayMetrics {
	total_requests: AtomicU64,
	cache_hits: AtomicU64,
	origin_calls: AtomicU64,
	origin_errors: AtomicU64,
	last_origin_micros: AtomicU64,
	mapping_records: AtomicU64,
	mapping_field_failures: AtomicU64,
}
impl GatewayMetrics {
	/// Create a new metrics accumulator.
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Record a cache hit outcome.
	pub fn record_hit(&self) {
		self.total_requests.fetch_add(1, Ordering::Relaxed);
		self.cache_hits.fetch_add(1, Ordering::Relaxed);
	}

	/// Record a cache miss that fell through to origin.
	pub fn record_miss(&self) {
		self.total_requests.fetch_add(1, Ordering::Relaxed);
	}

	/// Record a successful origin call and its latency.
	pub fn record_origin_success(&self, duration: Duration) {
		self.origin_calls.fetch_add(1, Ordering::Relaxed);
		self.last_origin_micros.store(duration.as_micros() as u64, Ordering::Relaxed);
	}

	/// Record an origin call failure (including timeout).
	pub fn record_origin_error(&self) {
		self.origin_calls.fetch_add(1, Ordering::Relaxed);
		self.origin_errors.fetch_add(1, Ordering::Relaxed);
	}

	/// Record the outcome of a mapping engine transformation.
	pub fn record_mapping(&self, failed_fields: u64) {
		self.mapping_records.fetch_add(1, Ordering::Relaxed);
		self.mapping_field_failures.fetch_add(failed_fields, Ordering::Relaxed);
	}

	/// Take a point-in-time snapshot for status reporting.
	pub fn snapshot(&self) -> GatewayMetricsSnapshot {
		GatewayMetricsSnapshot {
			total_requests: self.total_requests.load(Ordering::Relaxed),
			cache_hits: self.cache_hits.load(Ordering::Relaxed),
			origin_calls: self.origin_calls.load(Ordering::Relaxed),
			origin_errors: self.origin_errors.load(Ordering::Relaxed),
			last_origin_micros: match self.last_origin_micros.load(Ordering::Relaxed) {
				0 => None,
				value => Some(value),
			},
			mapping_records: self.mapping_records.load(Ordering::Relaxed),
			mapping_field_failures: self.mapping_field_failures.load(Ordering::Relaxed),
		}
	}
}

/// Read-only snapshot of per-`(provider, market)` telemetry counters.
#[derive(Clone, Debug)]
pub struct GatewayMetricsSnapshot {
	/// Total number of cache lookups observed.
	pub total_requests: u64,
	/// Count of lookups served from a cache tier.
	pub cache_hits: u64,
	/// Count of origin calls attempted (success or failure).
	pub origin_calls: u64,
	/// Count of origin calls that failed or timed out.
	pub origin_errors: u64,
	/// Microsecond latency of the most recent successful origin call.
	pub last_origin_micros: Option<u64>,
	/// Count of records passed through the mapping engine.
	pub mapping_records: u64,
	/// Count of individual field mapping failures across all records.
	pub mapping_field_failures: u64,
}
impl GatewayMetricsSnapshot {
	/// Convenience method to compute the cache hit rate.
	pub fn hit_rate(&self) -> f64 {
		if self.total_requests == 0 {
			0.0
		} else {
			self.cache_hits as f64 / self.total_requests as f64
		}
	}

	/// Ratio of origin calls that failed or timed out.
	pub fn origin_error_rate(&self) -> f64 {
		if self.origin_calls == 0 {
			0.0
		} else {
			self.origin_errors as f64 / self.origin_calls as f64
		}
	}
}

/// Install the default Prometheus recorder backed by `metrics`.
///
/// Multiple invocations are safe; subsequent calls become no-ops once the recorder is installed.
pub fn install_default_exporter() -> Result<()> {
	if PROMETHEUS_HANDLE.get().is_some() {
		return Ok(());
	}

	let handle = PrometheusBuilder::new().install_recorder().map_err(|err| Error::Metrics(err.to_string()))?;
	let _ = PROMETHEUS_HANDLE.set(handle);

	Ok(())
}

/// Access the global Prometheus exporter handle when installed.
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
	PROMETHEUS_HANDLE.get()
}

/// Record a cache hit, tagged by provider and market.
pub fn record_cache_hit(provider: &str, market: &str) {
	let labels = base_labels(provider, market);

	metrics::counter!(METRIC_CACHE_REQUESTS_TOTAL, labels.iter()).increment(1);
	metrics::counter!(METRIC_CACHE_HITS_TOTAL, labels.iter()).increment(1);
}

/// Record a cache miss that required an origin fetch.
pub fn record_cache_miss(provider: &str, market: &str) {
	let labels = base_labels(provider, market);

	metrics::counter!(METRIC_CACHE_REQUESTS_TOTAL, labels.iter()).increment(1);
	metrics::counter!(METRIC_CACHE_MISSES_TOTAL, labels.iter()).increment(1);
}

/// Record a successful origin call along with its latency.
pub fn record_origin_success(provider: &str, market: &str, duration: Duration) {
	metrics::counter!(METRIC_ORIGIN_CALLS_TOTAL, status_labels(provider, market, "success").iter()).increment(1);
	metrics::histogram!(METRIC_ORIGIN_DURATION, base_labels(provider, market).iter()).record(duration.as_secs_f64());
}

/// Record a failed or timed-out origin call.
pub fn record_origin_error(provider: &str, market: &str) {
	metrics::counter!(METRIC_ORIGIN_CALLS_TOTAL, status_labels(provider, market, "error").iter()).increment(1);
	metrics::counter!(METRIC_ORIGIN_ERRORS, base_labels(provider, market).iter()).increment(1);
}

/// Record a mapping engine run over one record, with its count of field failures.
pub fn record_mapping(provider: &str, market: &str, failed_fields: u64) {
	let labels = base_labels(provider, market);

	metrics::counter!(METRIC_MAPPING_TOTAL, labels.iter()).increment(1);
	if failed_fields > 0 {
		metrics::counter!(METRIC_MAPPING_FIELD_FAILURES, labels.iter()).increment(failed_fields);
	}
}

fn base_labels(provider: &str, market: &str) -> LabelSet {
	let mut labels = LabelSet::with_capacity(2);

	labels.push(Label::new("provider", provider.to_owned()));
	labels.push(Label::new("market", market.to_owned()));

	labels
}

fn status_labels(provider: &str, market: &str, status: &'static str) -> LabelSet {
	let mut labels = base_labels(provider, market);

	labels.push(Label::new("status", status));

	labels
}

#[cfg(test)]
mod tests {
	// std
	use std::borrow::Borrow;
	// crates.io
	use metrics_util::{
		CompositeKey, MetricKind,
		debugging::{DebugValue, DebuggingRecorder},
	};
	// self
	use super::*;

	fn capture_metrics<F>(f: F) -> Vec<(CompositeKey, DebugValue)>
	where
		F: FnOnce(),
	{
		let recorder = DebuggingRecorder::new();
		let snapshotter = recorder.snapshotter();

		metrics::with_local_recorder(&recorder, f);

		snapshotter.snapshot().into_vec().into_iter().map(|(key, _, _, value)| (key, value)).collect()
	}

	fn counter_value(snapshot: &[(CompositeKey, DebugValue)], name: &str, labels: &[(&str, &str)]) -> u64 {
		snapshot
			.iter()
			.find_map(|(key, value)| {
				(key.kind() == MetricKind::Counter && Borrow::<str>::borrow(key.key().name()) == name && labels_match(key, labels))
					.then(|| match value {
						DebugValue::Counter(value) => *value,
						_ => 0,
					})
			})
			.unwrap_or(0)
	}

	fn last_histogram_value(snapshot: &[(CompositeKey, DebugValue)], name: &str, labels: &[(&str, &str)]) -> Option<f64> {
		snapshot.iter().find_map(|(key, value)| {
			if key.kind() == MetricKind::Histogram && Borrow::<str>::borrow(key.key().name()) == name && labels_match(key, labels) {
				if let DebugValue::Histogram(values) = value { values.last().map(|v| v.into_inner()) } else { None }
			} else {
				None
			}
		})
	}

	fn labels_match(key: &CompositeKey, expected: &[(&str, &str)]) -> bool {
		let mut labels: Vec<_> = key.key().labels().map(|label| (label.key(), label.value())).collect();

		labels.sort_unstable();

		let mut expected_sorted: Vec<_> = expected.to_vec();

		expected_sorted.sort_unstable();

		labels.len() == expected_sorted.len()
			&& labels.into_iter().zip(expected_sorted).all(|((lk, lv), (ek, ev))| lk == ek && lv == ev)
	}

	#[test]
	fn records_hits_and_misses() {
		let snapshot = capture_metrics(|| {
			record_cache_hit("longport", "HK");
			record_cache_hit("longport", "HK");
			record_cache_miss("longport", "HK");
		});
		let base = [("provider", "longport"), ("market", "HK")];

		assert_eq!(counter_value(&snapshot, "gateway_cache_requests_total", &base), 3);
		assert_eq!(counter_value(&snapshot, "gateway_cache_hits_total", &base), 2);
		assert_eq!(counter_value(&snapshot, "gateway_cache_misses_total", &base), 1);
	}

	#[test]
	#[cfg_attr(miri, ignore)]
	fn records_origin_success_and_errors() {
		let snapshot = capture_metrics(|| {
			record_origin_success("longport", "US", Duration::from_millis(20));
			record_origin_error("longport", "US");
		});
		let base = [("provider", "longport"), ("market", "US")];
		let success = [("provider", "longport"), ("market", "US"), ("status", "success")];
		let error = [("provider", "longport"), ("market", "US"), ("status", "error")];

		assert_eq!(counter_value(&snapshot, "gateway_origin_calls_total", &success), 1);
		assert_eq!(counter_value(&snapshot, "gateway_origin_calls_total", &error), 1);
		assert_eq!(counter_value(&snapshot, "gateway_origin_errors_total", &base), 1);

		let duration = last_histogram_value(&snapshot, "gateway_origin_duration_seconds", &base).expect("origin duration recorded");

		assert!((duration - 0.020).abs() < 1e-6, "expected ~20ms histogram, got {duration}");
	}

	#[test]
	fn records_mapping_field_failures() {
		let snapshot = capture_metrics(|| {
			record_mapping("longport", "HK", 2);
			record_mapping("longport", "HK", 0);
		});
		let base = [("provider", "longport"), ("market", "HK")];

		assert_eq!(counter_value(&snapshot, "gateway_mapping_records_total", &base), 2);
		assert_eq!(counter_value(&snapshot, "gateway_mapping_field_failures_total", &base), 2);
	}
}
