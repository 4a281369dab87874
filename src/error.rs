//! Crate-wide error types and `Result` alias.

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the market-data cache core.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Redis(#[from] redis::RedisError),
	#[error(transparent)]
	Serde(#[from] serde_json::Error),
	#[cfg(feature = "msgpack")]
	#[error(transparent)]
	MsgpackEncode(#[from] rmp_serde::encode::Error),
	#[cfg(feature = "msgpack")]
	#[error(transparent)]
	MsgpackDecode(#[from] rmp_serde::decode::Error),

	#[error("Serialization failed: {0}")]
	Serialization(String),
	#[error("Warm cache unavailable: {0}")]
	WarmCacheUnavailable(String),
	#[error("Origin call timed out after {0:?}")]
	OriginTimeout(std::time::Duration),
	#[error("Origin call failed: {0}")]
	Origin(String),
	#[error(
		"No mapping rule found for provider '{provider}', apiType '{api_type}', ruleListType '{rule_list_type}', market '{market}'"
	)]
	RuleNotFound { provider: String, api_type: String, rule_list_type: String, market: String },
	#[error("Invalid fingerprint input: {0}")]
	InvalidFingerprint(String),
	#[error("Rule validation failed for {field}: {reason}")]
	RuleValidation { field: &'static str, reason: String },
	#[error("Invariant violated: {0}")]
	InvariantViolation(String),
	#[error("Cache error: {0}")]
	Cache(String),
	#[error("Metrics error: {0}")]
	Metrics(String),
	#[error("Configuration error for {field}: {reason}")]
	Config { field: &'static str, reason: String },
}
#[cfg(feature = "metrics")]
impl<T> From<metrics::SetRecorderError<T>> for Error
where
	T: std::fmt::Display,
{
	fn from(value: metrics::SetRecorderError<T>) -> Self {
		Self::Metrics(value.to_string())
	}
}
