//! Ambient configuration for the gateway cache and mapping engine.

// std
use std::time::Duration;
// self
use crate::{Error, Result, fingerprint::FingerprintLimits};

/// Default hot-cache capacity (entries).
pub const DEFAULT_HOT_CACHE_CAPACITY: usize = 10_000;
/// Default warm-cache (Redis) TTL.
pub const DEFAULT_WARM_TTL: Duration = Duration::from_secs(60);
/// Default stream-cache hot (in-process) TTL.
pub const DEFAULT_STREAM_TTL: Duration = Duration::from_secs(5);
/// Default stream-cache warm (Redis) TTL.
pub const DEFAULT_STREAM_WARM_TTL: Duration = Duration::from_secs(30);
/// Default rule-cache TTL.
pub const DEFAULT_RULE_CACHE_TTL: Duration = Duration::from_secs(300);
/// Default threshold above which payloads are compressed before being written to Redis.
pub const DEFAULT_COMPRESSION_THRESHOLD_BYTES: usize = 1024;
/// Default origin-fetch timeout.
pub const DEFAULT_ORIGIN_TIMEOUT: Duration = Duration::from_secs(5);
/// Default TTL for `realtime.*` data (live stock/index quotes, market status).
pub const DEFAULT_REALTIME_TTL: Duration = Duration::from_secs(2);
/// Default TTL for `semiStatic.basicInfo`.
pub const DEFAULT_SEMI_STATIC_TTL: Duration = Duration::from_secs(300);
/// Default TTL for `system.healthCheck` results.
pub const DEFAULT_HEALTH_CHECK_TTL: Duration = Duration::from_secs(10);
/// Default TTL for `system.distributedLock` entries.
pub const DEFAULT_DISTRIBUTED_LOCK_TTL: Duration = Duration::from_secs(30);
/// Default TTL applied when no more specific override is configured.
pub const DEFAULT_DEFAULT_TTL: Duration = Duration::from_secs(60);
/// Default Redis connection port.
pub const DEFAULT_REDIS_PORT: u16 = 6379;

/// Top-level configuration for the cache/mapping gateway.
///
/// Construct via [`GatewayConfig::builder`] or load overrides from the
/// environment with [`GatewayConfig::from_env`]; both paths run through
/// [`GatewayConfig::validate`] before use.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
	/// Redis connection URL used by the warm cache and rule cache namespaces.
	/// Built from `redis_host`/`redis_port`/`redis_db`/`redis_tls` by
	/// default; set explicitly via [`GatewayConfigBuilder::redis_url`] to
	/// override the assembled value.
	pub redis_url: String,
	/// Redis host, used only to assemble the default `redis_url`.
	pub redis_host: String,
	/// Redis port, used only to assemble the default `redis_url`.
	pub redis_port: u16,
	/// Redis logical database index for the base warm/rule-cache namespaces.
	pub redis_db: u8,
	/// Redis logical database index for stream-cache snapshots, kept
	/// separate from `redis_db` per the documented key layout.
	pub stream_redis_db: u8,
	/// Whether to connect to Redis over TLS (`rediss://`) when assembling
	/// the default `redis_url`.
	pub redis_tls: bool,
	/// Number of entries retained in the in-process hot cache.
	pub hot_cache_capacity: usize,
	/// TTL applied to warm-cache (Redis) writes absent a more specific override.
	pub warm_ttl: Duration,
	/// TTL applied to stream-cache hot (in-process) entries.
	pub stream_ttl: Duration,
	/// TTL applied to stream-cache warm (Redis) persistence.
	pub stream_warm_ttl: Duration,
	/// TTL applied to rule-cache namespaces (rule-by-id, best-rule, provider-rules).
	pub rule_cache_ttl: Duration,
	/// TTL for `realtime.stockQuote`/`realtime.indexQuote`/`realtime.marketStatus`
	/// data: the [`Strategy::Strong`](crate::cache::orchestrator::Strategy) tier.
	pub realtime_ttl: Duration,
	/// TTL for `semiStatic.basicInfo` data.
	pub semi_static_ttl: Duration,
	/// TTL for `system.healthCheck` results.
	pub health_check_ttl: Duration,
	/// TTL for `system.distributedLock` entries.
	pub distributed_lock_ttl: Duration,
	/// TTL applied when no data-type-specific override is configured
	/// (`default.*`).
	pub default_ttl: Duration,
	/// Payload size, in bytes, above which values are compressed before storage.
	pub compression_threshold_bytes: usize,
	/// Timeout applied to a single origin-fetcher call.
	pub origin_timeout: Duration,
	/// Key prefix shared by every key this crate writes to Redis.
	pub key_prefix: String,
	/// Maximum nesting depth accepted for a fingerprint options object.
	pub max_option_depth: usize,
	/// Maximum number of fields accepted in a fingerprint options object.
	pub max_option_fields: usize,
	/// Maximum length accepted for a single canonicalized option value.
	pub max_option_value_len: usize,
	/// Whether the mapping engine should attach per-field debug diagnostics
	/// by default (`RuleEngine.transform`'s `debug` flag, §6).
	pub debug_mapping_diagnostics: bool,
}
impl Default for GatewayConfig {
	fn default() -> Self {
		let redis_host = "127.0.0.1".to_string();
		let redis_port = DEFAULT_REDIS_PORT;
		let redis_db = 0;
		let redis_tls = false;
		Self {
			redis_url: assemble_redis_url(&redis_host, redis_port, redis_db, redis_tls),
			redis_host,
			redis_port,
			redis_db,
			stream_redis_db: 1,
			redis_tls,
			hot_cache_capacity: DEFAULT_HOT_CACHE_CAPACITY,
			warm_ttl: DEFAULT_WARM_TTL,
			stream_ttl: DEFAULT_STREAM_TTL,
			stream_warm_ttl: DEFAULT_STREAM_WARM_TTL,
			rule_cache_ttl: DEFAULT_RULE_CACHE_TTL,
			realtime_ttl: DEFAULT_REALTIME_TTL,
			semi_static_ttl: DEFAULT_SEMI_STATIC_TTL,
			health_check_ttl: DEFAULT_HEALTH_CHECK_TTL,
			distributed_lock_ttl: DEFAULT_DISTRIBUTED_LOCK_TTL,
			default_ttl: DEFAULT_DEFAULT_TTL,
			compression_threshold_bytes: DEFAULT_COMPRESSION_THRESHOLD_BYTES,
			origin_timeout: DEFAULT_ORIGIN_TIMEOUT,
			key_prefix: "marketdata-cache".into(),
			max_option_depth: crate::fingerprint::MAX_OPTION_DEPTH,
			max_option_fields: crate::fingerprint::MAX_OPTION_FIELDS,
			max_option_value_len: crate::fingerprint::MAX_OPTION_VALUE_LEN,
			debug_mapping_diagnostics: false,
		}
	}
}
impl GatewayConfig {
	/// Start building a configuration from defaults.
	pub fn builder() -> GatewayConfigBuilder {
		GatewayConfigBuilder::default()
	}

	/// The [`FingerprintLimits`] this configuration implies.
	pub fn fingerprint_limits(&self) -> FingerprintLimits {
		FingerprintLimits {
			max_option_depth: self.max_option_depth,
			max_option_fields: self.max_option_fields,
			max_option_value_len: self.max_option_value_len,
		}
	}

	/// Load a configuration from environment variables, falling back to defaults
	/// for anything unset.
	///
	/// Recognized variables: `MDC_REDIS_URL`, `MDC_REDIS_HOST`, `MDC_REDIS_PORT`,
	/// `MDC_REDIS_DB`, `MDC_STREAM_REDIS_DB`, `MDC_REDIS_TLS`,
	/// `MDC_HOT_CACHE_CAPACITY`, `MDC_WARM_TTL_SECS`, `MDC_STREAM_TTL_SECS`,
	/// `MDC_STREAM_WARM_TTL_SECS`, `MDC_RULE_CACHE_TTL_SECS`,
	/// `MDC_REALTIME_TTL_SECS`, `MDC_SEMI_STATIC_TTL_SECS`,
	/// `MDC_HEALTH_CHECK_TTL_SECS`, `MDC_DISTRIBUTED_LOCK_TTL_SECS`,
	/// `MDC_DEFAULT_TTL_SECS`, `MDC_COMPRESSION_THRESHOLD_BYTES`,
	/// `MDC_ORIGIN_TIMEOUT_SECS`, `MDC_KEY_PREFIX`, `MDC_MAX_OPTION_DEPTH`,
	/// `MDC_MAX_OPTION_FIELDS`, `MDC_MAX_OPTION_VALUE_LEN`,
	/// `MDC_DEBUG_MAPPING_DIAGNOSTICS`.
	///
	/// A present-but-non-numeric value for any integer field is a configuration
	/// error, not a silently ignored override. `MDC_REDIS_URL`, when set,
	/// overrides the host/port/db/tls-assembled URL outright.
	pub fn from_env() -> Result<Self> {
		let mut config = Self::default();

		if let Ok(value) = std::env::var("MDC_REDIS_HOST") {
			config.redis_host = value;
		}
		if let Some(value) = parse_env_u16("MDC_REDIS_PORT")? {
			config.redis_port = value;
		}
		if let Some(value) = parse_env_u8("MDC_REDIS_DB")? {
			config.redis_db = value;
		}
		if let Some(value) = parse_env_u8("MDC_STREAM_REDIS_DB")? {
			config.stream_redis_db = value;
		}
		if let Some(value) = parse_env_bool("MDC_REDIS_TLS")? {
			config.redis_tls = value;
		}
		config.redis_url = assemble_redis_url(&config.redis_host, config.redis_port, config.redis_db, config.redis_tls);

		if let Ok(value) = std::env::var("MDC_REDIS_URL") {
			config.redis_url = value;
		}

		if let Ok(value) = std::env::var("MDC_KEY_PREFIX") {
			config.key_prefix = value;
		}
		if let Some(value) = parse_env_usize("MDC_HOT_CACHE_CAPACITY")? {
			config.hot_cache_capacity = value;
		}
		if let Some(value) = parse_env_usize("MDC_COMPRESSION_THRESHOLD_BYTES")? {
			config.compression_threshold_bytes = value;
		}
		if let Some(value) = parse_env_usize("MDC_MAX_OPTION_DEPTH")? {
			config.max_option_depth = value;
		}
		if let Some(value) = parse_env_usize("MDC_MAX_OPTION_FIELDS")? {
			config.max_option_fields = value;
		}
		if let Some(value) = parse_env_usize("MDC_MAX_OPTION_VALUE_LEN")? {
			config.max_option_value_len = value;
		}
		if let Some(value) = parse_env_bool("MDC_DEBUG_MAPPING_DIAGNOSTICS")? {
			config.debug_mapping_diagnostics = value;
		}
		if let Some(value) = parse_env_secs("MDC_WARM_TTL_SECS")? {
			config.warm_ttl = value;
		}
		if let Some(value) = parse_env_secs("MDC_STREAM_TTL_SECS")? {
			config.stream_ttl = value;
		}
		if let Some(value) = parse_env_secs("MDC_STREAM_WARM_TTL_SECS")? {
			config.stream_warm_ttl = value;
		}
		if let Some(value) = parse_env_secs("MDC_RULE_CACHE_TTL_SECS")? {
			config.rule_cache_ttl = value;
		}
		if let Some(value) = parse_env_secs("MDC_REALTIME_TTL_SECS")? {
			config.realtime_ttl = value;
		}
		if let Some(value) = parse_env_secs("MDC_SEMI_STATIC_TTL_SECS")? {
			config.semi_static_ttl = value;
		}
		if let Some(value) = parse_env_secs("MDC_HEALTH_CHECK_TTL_SECS")? {
			config.health_check_ttl = value;
		}
		if let Some(value) = parse_env_secs("MDC_DISTRIBUTED_LOCK_TTL_SECS")? {
			config.distributed_lock_ttl = value;
		}
		if let Some(value) = parse_env_secs("MDC_DEFAULT_TTL_SECS")? {
			config.default_ttl = value;
		}
		if let Some(value) = parse_env_secs("MDC_ORIGIN_TIMEOUT_SECS")? {
			config.origin_timeout = value;
		}

		config.validate()?;
		Ok(config)
	}

	/// Validate field invariants.
	pub fn validate(&self) -> Result<()> {
		if self.redis_url.is_empty() {
			return Err(Error::Config { field: "redis_url", reason: "must not be empty".into() });
		}
		if self.hot_cache_capacity == 0 {
			return Err(Error::Config { field: "hot_cache_capacity", reason: "must be greater than zero".into() });
		}
		if self.warm_ttl.is_zero() {
			return Err(Error::Config { field: "warm_ttl", reason: "must be greater than zero".into() });
		}
		if self.stream_ttl.is_zero() {
			return Err(Error::Config { field: "stream_ttl", reason: "must be greater than zero".into() });
		}
		if self.stream_warm_ttl.is_zero() {
			return Err(Error::Config { field: "stream_warm_ttl", reason: "must be greater than zero".into() });
		}
		if self.rule_cache_ttl.is_zero() {
			return Err(Error::Config { field: "rule_cache_ttl", reason: "must be greater than zero".into() });
		}
		if self.realtime_ttl.is_zero() {
			return Err(Error::Config { field: "realtime_ttl", reason: "must be greater than zero".into() });
		}
		if self.semi_static_ttl.is_zero() {
			return Err(Error::Config { field: "semi_static_ttl", reason: "must be greater than zero".into() });
		}
		if self.health_check_ttl.is_zero() {
			return Err(Error::Config { field: "health_check_ttl", reason: "must be greater than zero".into() });
		}
		if self.distributed_lock_ttl.is_zero() {
			return Err(Error::Config { field: "distributed_lock_ttl", reason: "must be greater than zero".into() });
		}
		if self.default_ttl.is_zero() {
			return Err(Error::Config { field: "default_ttl", reason: "must be greater than zero".into() });
		}
		if self.origin_timeout.is_zero() {
			return Err(Error::Config { field: "origin_timeout", reason: "must be greater than zero".into() });
		}
		if self.key_prefix.is_empty() {
			return Err(Error::Config { field: "key_prefix", reason: "must not be empty".into() });
		}
		if self.max_option_depth == 0 {
			return Err(Error::Config { field: "max_option_depth", reason: "must be greater than zero".into() });
		}
		if self.max_option_fields == 0 {
			return Err(Error::Config { field: "max_option_fields", reason: "must be greater than zero".into() });
		}
		if self.max_option_value_len == 0 {
			return Err(Error::Config {
				field: "max_option_value_len",
				reason: "must be greater than zero".into(),
			});
		}
		if self.redis_db == self.stream_redis_db {
			return Err(Error::Config {
				field: "stream_redis_db",
				reason: "must differ from redis_db: stream snapshots use a separate database".into(),
			});
		}
		Ok(())
	}
}

fn assemble_redis_url(host: &str, port: u16, db: u8, tls: bool) -> String {
	let scheme = if tls { "rediss" } else { "redis" };
	format!("{scheme}://{host}:{port}/{db}")
}

fn parse_env_usize(name: &'static str) -> Result<Option<usize>> {
	match std::env::var(name) {
		Ok(raw) => raw
			.parse::<usize>()
			.map(Some)
			.map_err(|_| Error::Config { field: name, reason: format!("'{raw}' is not a valid unsigned integer") }),
		Err(std::env::VarError::NotPresent) => Ok(None),
		Err(std::env::VarError::NotUnicode(_)) => {
			Err(Error::Config { field: name, reason: "value is not valid UTF-8".into() })
		},
	}
}

fn parse_env_secs(name: &'static str) -> Result<Option<Duration>> {
	Ok(parse_env_usize(name)?.map(|secs| Duration::from_secs(secs as u64)))
}

fn parse_env_u16(name: &'static str) -> Result<Option<u16>> {
	match std::env::var(name) {
		Ok(raw) => raw
			.parse::<u16>()
			.map(Some)
			.map_err(|_| Error::Config { field: name, reason: format!("'{raw}' is not a valid port number") }),
		Err(std::env::VarError::NotPresent) => Ok(None),
		Err(std::env::VarError::NotUnicode(_)) => {
			Err(Error::Config { field: name, reason: "value is not valid UTF-8".into() })
		},
	}
}

fn parse_env_u8(name: &'static str) -> Result<Option<u8>> {
	match std::env::var(name) {
		Ok(raw) => raw
			.parse::<u8>()
			.map(Some)
			.map_err(|_| Error::Config { field: name, reason: format!("'{raw}' is not a valid database index") }),
		Err(std::env::VarError::NotPresent) => Ok(None),
		Err(std::env::VarError::NotUnicode(_)) => {
			Err(Error::Config { field: name, reason: "value is not valid UTF-8".into() })
		},
	}
}

fn parse_env_bool(name: &'static str) -> Result<Option<bool>> {
	match std::env::var(name) {
		Ok(raw) => match raw.to_ascii_lowercase().as_str() {
			"1" | "true" | "yes" => Ok(Some(true)),
			"0" | "false" | "no" => Ok(Some(false)),
			_ => Err(Error::Config { field: name, reason: format!("'{raw}' is not a valid boolean") }),
		},
		Err(std::env::VarError::NotPresent) => Ok(None),
		Err(std::env::VarError::NotUnicode(_)) => {
			Err(Error::Config { field: name, reason: "value is not valid UTF-8".into() })
		},
	}
}

/// Builder for [`GatewayConfig`].
#[derive(Clone, Debug, Default)]
pub struct GatewayConfigBuilder {
	config: GatewayConfig,
}
impl GatewayConfigBuilder {
	/// Set the Redis connection URL.
	pub fn redis_url(mut self, url: impl Into<String>) -> Self {
		self.config.redis_url = url.into();
		self
	}

	/// Set the hot-cache capacity.
	pub fn hot_cache_capacity(mut self, capacity: usize) -> Self {
		self.config.hot_cache_capacity = capacity;
		self
	}

	/// Set the warm-cache TTL.
	pub fn warm_ttl(mut self, ttl: Duration) -> Self {
		self.config.warm_ttl = ttl;
		self
	}

	/// Set the stream-cache TTL.
	pub fn stream_ttl(mut self, ttl: Duration) -> Self {
		self.config.stream_ttl = ttl;
		self
	}

	/// Set the rule-cache TTL.
	pub fn rule_cache_ttl(mut self, ttl: Duration) -> Self {
		self.config.rule_cache_ttl = ttl;
		self
	}

	/// Set the compression threshold, in bytes.
	pub fn compression_threshold_bytes(mut self, bytes: usize) -> Self {
		self.config.compression_threshold_bytes = bytes;
		self
	}

	/// Set the origin-fetch timeout.
	pub fn origin_timeout(mut self, timeout: Duration) -> Self {
		self.config.origin_timeout = timeout;
		self
	}

	/// Set the shared key prefix.
	pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.config.key_prefix = prefix.into();
		self
	}

	/// Set the stream-cache warm (Redis) TTL.
	pub fn stream_warm_ttl(mut self, ttl: Duration) -> Self {
		self.config.stream_warm_ttl = ttl;
		self
	}

	/// Set the `realtime.*` TTL (the `Strong` strategy tier).
	pub fn realtime_ttl(mut self, ttl: Duration) -> Self {
		self.config.realtime_ttl = ttl;
		self
	}

	/// Set the `semiStatic.basicInfo` TTL.
	pub fn semi_static_ttl(mut self, ttl: Duration) -> Self {
		self.config.semi_static_ttl = ttl;
		self
	}

	/// Set the `system.healthCheck` TTL.
	pub fn health_check_ttl(mut self, ttl: Duration) -> Self {
		self.config.health_check_ttl = ttl;
		self
	}

	/// Set the `system.distributedLock` TTL.
	pub fn distributed_lock_ttl(mut self, ttl: Duration) -> Self {
		self.config.distributed_lock_ttl = ttl;
		self
	}

	/// Set the `default.*` fallback TTL.
	pub fn default_ttl(mut self, ttl: Duration) -> Self {
		self.config.default_ttl = ttl;
		self
	}

	/// Set the Redis host used to assemble the default `redis_url`.
	pub fn redis_host(mut self, host: impl Into<String>) -> Self {
		self.config.redis_host = host.into();
		self.config.redis_url =
			assemble_redis_url(&self.config.redis_host, self.config.redis_port, self.config.redis_db, self.config.redis_tls);
		self
	}

	/// Set the Redis port used to assemble the default `redis_url`.
	pub fn redis_port(mut self, port: u16) -> Self {
		self.config.redis_port = port;
		self.config.redis_url =
			assemble_redis_url(&self.config.redis_host, self.config.redis_port, self.config.redis_db, self.config.redis_tls);
		self
	}

	/// Set the Redis logical database index for the base namespaces.
	pub fn redis_db(mut self, db: u8) -> Self {
		self.config.redis_db = db;
		self.config.redis_url =
			assemble_redis_url(&self.config.redis_host, self.config.redis_port, self.config.redis_db, self.config.redis_tls);
		self
	}

	/// Set the Redis logical database index for stream-cache snapshots.
	pub fn stream_redis_db(mut self, db: u8) -> Self {
		self.config.stream_redis_db = db;
		self
	}

	/// Set whether to connect to Redis over TLS when assembling the default `redis_url`.
	pub fn redis_tls(mut self, tls: bool) -> Self {
		self.config.redis_tls = tls;
		self.config.redis_url =
			assemble_redis_url(&self.config.redis_host, self.config.redis_port, self.config.redis_db, self.config.redis_tls);
		self
	}

	/// Set the maximum nesting depth accepted for a fingerprint options object.
	pub fn max_option_depth(mut self, depth: usize) -> Self {
		self.config.max_option_depth = depth;
		self
	}

	/// Set the maximum number of fields accepted in a fingerprint options object.
	pub fn max_option_fields(mut self, fields: usize) -> Self {
		self.config.max_option_fields = fields;
		self
	}

	/// Set the maximum length accepted for a single canonicalized option value.
	pub fn max_option_value_len(mut self, len: usize) -> Self {
		self.config.max_option_value_len = len;
		self
	}

	/// Set whether the mapping engine attaches per-field debug diagnostics by default.
	pub fn debug_mapping_diagnostics(mut self, enabled: bool) -> Self {
		self.config.debug_mapping_diagnostics = enabled;
		self
	}

	/// Validate and produce the final configuration.
	pub fn build(self) -> Result<GatewayConfig> {
		self.config.validate()?;
		Ok(self.config)
	}
}
