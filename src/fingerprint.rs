//! Deterministic cache-key derivation from request tuples.

// std
use std::{collections::BTreeMap, fmt::Write as _};
// self
use crate::{Error, Result};

/// Reserved marker placed at the start of a compressed payload (§4.2).
///
/// Fingerprints must never contain this sequence: it would make a
/// fingerprint ambiguous with a framed, compressed cache value.
pub const COMPRESSION_PREFIX: &str = "COMPRESSED::";

/// Default maximum nesting depth accepted for an options object.
pub const MAX_OPTION_DEPTH: usize = 4;
/// Default maximum number of fields accepted in an options object.
pub const MAX_OPTION_FIELDS: usize = 64;
/// Default maximum length accepted for a single canonicalized scalar value.
pub const MAX_OPTION_VALUE_LEN: usize = 512;

/// Configurable bounds applied to an options object by [`validate_options`],
/// overridable via [`crate::config::GatewayConfig`] (§6: "max object depth,
/// max object fields, max string length").
#[derive(Clone, Copy, Debug)]
pub struct FingerprintLimits {
	/// Maximum nesting depth accepted for an options object.
	pub max_option_depth: usize,
	/// Maximum number of fields accepted in an options object.
	pub max_option_fields: usize,
	/// Maximum length accepted for a single canonicalized scalar value.
	pub max_option_value_len: usize,
}
impl Default for FingerprintLimits {
	fn default() -> Self {
		Self {
			max_option_depth: MAX_OPTION_DEPTH,
			max_option_fields: MAX_OPTION_FIELDS,
			max_option_value_len: MAX_OPTION_VALUE_LEN,
		}
	}
}

/// A single canonicalized option value.
#[derive(Clone, Debug, PartialEq)]
pub enum OptionValue {
	/// UTF-8 string value.
	String(String),
	/// Signed integer value.
	Integer(i64),
	/// Floating point value; formatted with Rust's default `Display`.
	Float(f64),
	/// Boolean value.
	Bool(bool),
}
impl OptionValue {
	fn canonical(&self) -> String {
		match self {
			Self::String(value) => value.clone(),
			Self::Integer(value) => value.to_string(),
			Self::Float(value) => value.to_string(),
			Self::Bool(value) => value.to_string(),
		}
	}
}

/// Inputs used to derive a deterministic request fingerprint (§3).
#[derive(Clone, Debug, Default)]
pub struct FingerprintRequest {
	/// Logical operation name, e.g. `get-stock-quote`.
	pub operation: String,
	/// Instrument symbol, e.g. `AAPL.US`.
	pub symbol: String,
	/// Upstream provider identifier, e.g. `longport`.
	pub provider: Option<String>,
	/// Market identifier, e.g. `HK`, `US`, `A`.
	pub market: Option<String>,
	/// API type, e.g. `rest` or `stream`.
	pub api_type: Option<String>,
	/// Additional option fields; canonicalized by [`fingerprint`] regardless
	/// of insertion order.
	pub options: BTreeMap<String, OptionValue>,
}
impl FingerprintRequest {
	/// Construct a request with the mandatory fields set.
	pub fn new(operation: impl Into<String>, symbol: impl Into<String>) -> Self {
		Self { operation: operation.into(), symbol: symbol.into(), ..Default::default() }
	}

	/// Attach a provider identifier.
	pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
		self.provider = Some(provider.into());
		self
	}

	/// Attach a market identifier.
	pub fn with_market(mut self, market: impl Into<String>) -> Self {
		self.market = Some(market.into());
		self
	}

	/// Attach an API type.
	pub fn with_api_type(mut self, api_type: impl Into<String>) -> Self {
		self.api_type = Some(api_type.into());
		self
	}

	/// Insert an option field, overwriting any prior value for the same key.
	pub fn with_option(mut self, key: impl Into<String>, value: OptionValue) -> Self {
		self.options.insert(key.into(), value);
		self
	}
}

/// Derive a deterministic fingerprint for the given request, using the
/// default [`FingerprintLimits`].
///
/// Two requests with the same fields (options compared by key regardless of
/// insertion order) always produce the same fingerprint, and requests that
/// differ in any field produce a different one.
pub fn fingerprint(request: &FingerprintRequest) -> Result<String> {
	fingerprint_with_limits(request, FingerprintLimits::default())
}

/// Like [`fingerprint`], but validates the options object against
/// caller-supplied `limits` instead of the built-in defaults.
pub fn fingerprint_with_limits(request: &FingerprintRequest, limits: FingerprintLimits) -> Result<String> {
	if request.operation.is_empty() {
		return Err(Error::InvalidFingerprint("operation must not be empty".into()));
	}
	if request.symbol.is_empty() {
		return Err(Error::InvalidFingerprint("symbol must not be empty".into()));
	}

	validate_options(&request.options, limits)?;

	let mut key = String::with_capacity(128);

	write!(key, "{}:{}", request.operation, request.symbol).expect("string write is infallible");

	if let Some(provider) = &request.provider {
		write!(key, ":provider:{provider}").expect("string write is infallible");
	}
	if let Some(market) = &request.market {
		write!(key, ":market:{market}").expect("string write is infallible");
	}
	if let Some(api_type) = &request.api_type {
		write!(key, ":apiType:{api_type}").expect("string write is infallible");
	}

	// BTreeMap iteration is already key-sorted, which is what gives us
	// insertion-order independence.
	for (field, value) in &request.options {
		write!(key, ":{field}={}", value.canonical()).expect("string write is infallible");
	}

	if key.contains(COMPRESSION_PREFIX) {
		return Err(Error::InvalidFingerprint(format!(
			"fingerprint must not contain the reserved sequence '{COMPRESSION_PREFIX}'"
		)));
	}

	Ok(key)
}

fn validate_options(options: &BTreeMap<String, OptionValue>, limits: FingerprintLimits) -> Result<()> {
	if options.len() > limits.max_option_fields {
		return Err(Error::InvalidFingerprint(format!(
			"options object has {} fields, exceeding the limit of {}",
			options.len(),
			limits.max_option_fields
		)));
	}

	// A flat BTreeMap<String, OptionValue> has depth 1 by construction; the
	// depth bound exists for forward compatibility with nested option values
	// and is enforced here so future value variants cannot silently exceed it.
	if limits.max_option_depth == 0 {
		return Err(Error::InvalidFingerprint("option depth bound must be positive".into()));
	}

	for (field, value) in options {
		let canonical = value.canonical();

		if canonical.len() > limits.max_option_value_len {
			return Err(Error::InvalidFingerprint(format!(
				"option '{field}' canonical value exceeds {} characters",
				limits.max_option_value_len
			)));
		}
	}

	Ok(())
}

/// Namespace prefix shared by all rule-cache keys (§4.1, §6).
pub const RULE_CACHE_NAMESPACE: &str = "data-mapper";

/// Build the `rule-by-id` cache key for the given rule id.
pub fn rule_by_id_key(id: &str) -> String {
	format!("{RULE_CACHE_NAMESPACE}:rule:{id}")
}

/// Build the `best-rule` cache key for a `(provider, apiType, ruleListType, marketType)` tuple.
pub fn best_rule_key(provider: &str, api_type: &str, rule_list_type: &str, market_type: &str) -> String {
	format!("{RULE_CACHE_NAMESPACE}:best-rule:{provider}:{api_type}:{rule_list_type}:{market_type}")
}

/// Build the `provider-rules` cache key for a `(provider, apiType)` pair.
pub fn provider_rules_key(provider: &str, api_type: &str) -> String {
	format!("{RULE_CACHE_NAMESPACE}:provider-rules:{provider}:{api_type}")
}

/// Build the scan pattern matching every rule-cache key owned by a provider.
pub fn provider_scan_pattern(provider: &str) -> String {
	format!("{RULE_CACHE_NAMESPACE}:*:{provider}:*")
}

/// Build the scan pattern matching every rule-cache key, across all providers.
pub fn all_rule_cache_scan_pattern() -> String {
	format!("{RULE_CACHE_NAMESPACE}:*")
}

/// Build the stream-cache key for a symbol (§6).
pub fn stream_key(symbol: &str) -> String {
	format!("stream:quote:{}", symbol.to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fingerprint_is_stable_under_option_insertion_order() {
		let a = FingerprintRequest::new("get-stock-quote", "AAPL.US")
			.with_provider("longport")
			.with_option("foo", OptionValue::String("1".into()))
			.with_option("bar", OptionValue::Integer(2));
		let b = FingerprintRequest::new("get-stock-quote", "AAPL.US")
			.with_provider("longport")
			.with_option("bar", OptionValue::Integer(2))
			.with_option("foo", OptionValue::String("1".into()));

		assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
	}

	#[test]
	fn differing_fields_produce_differing_fingerprints() {
		let a = FingerprintRequest::new("get-stock-quote", "AAPL.US").with_provider("longport");
		let b = FingerprintRequest::new("get-stock-quote", "AAPL.US").with_provider("futu");

		assert_ne!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
	}

	#[test]
	fn rejects_compression_prefix_collision() {
		let request = FingerprintRequest::new("COMPRESSED::get-stock-quote", "AAPL.US");

		assert!(fingerprint(&request).is_err());
	}

	#[test]
	fn rejects_oversized_options() {
		let mut request = FingerprintRequest::new("get-stock-quote", "AAPL.US");

		for i in 0..(MAX_OPTION_FIELDS + 1) {
			request = request.with_option(format!("k{i}"), OptionValue::Integer(i as i64));
		}

		assert!(fingerprint(&request).is_err());
	}

	#[test]
	fn fingerprint_with_limits_honors_a_tighter_field_count() {
		let request = FingerprintRequest::new("get-stock-quote", "AAPL.US")
			.with_option("a", OptionValue::Integer(1))
			.with_option("b", OptionValue::Integer(2));

		let limits = FingerprintLimits { max_option_fields: 1, ..FingerprintLimits::default() };
		assert!(fingerprint_with_limits(&request, limits).is_err());
		assert!(fingerprint(&request).is_ok());
	}

	#[test]
	fn rule_cache_keys_follow_the_documented_layout() {
		assert_eq!(rule_by_id_key("abc"), "data-mapper:rule:abc");
		assert_eq!(
			best_rule_key("longport", "rest", "quote_fields", "HK"),
			"data-mapper:best-rule:longport:rest:quote_fields:HK"
		);
		assert_eq!(
			provider_rules_key("longport", "rest"),
			"data-mapper:provider-rules:longport:rest"
		);
		assert_eq!(stream_key("700.hk"), "stream:quote:700.HK");
		assert_eq!(all_rule_cache_scan_pattern(), "data-mapper:*");
	}
}
