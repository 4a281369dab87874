//! Wire serialization: JSON or MessagePack, with threshold-triggered compression.

// std
use std::io::{Read as _, Write as _};
// crates.io
use serde::{Serialize, de::DeserializeOwned};
// self
use crate::{Error, Result, fingerprint::COMPRESSION_PREFIX};

/// Wire format used to encode cached payloads.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WireFormat {
	/// `serde_json`, always available.
	Json,
	/// `rmp-serde`, available behind the `msgpack` feature.
	#[cfg(feature = "msgpack")]
	MessagePack,
}

/// Payload byte size above which the serializer compresses the encoded bytes.
pub const DEFAULT_COMPRESSION_THRESHOLD_BYTES: usize = 1024;

/// Encodes and decodes cache payloads, compressing large values transparently.
#[derive(Clone, Debug)]
pub struct Serializer {
	format: WireFormat,
	compression_threshold_bytes: usize,
}
impl Default for Serializer {
	fn default() -> Self {
		Self::new(WireFormat::Json)
	}
}
impl Serializer {
	/// Build a serializer using the given wire format and the default compression threshold.
	pub fn new(format: WireFormat) -> Self {
		Self { format, compression_threshold_bytes: DEFAULT_COMPRESSION_THRESHOLD_BYTES }
	}

	/// Override the compression threshold.
	pub fn with_compression_threshold(mut self, bytes: usize) -> Self {
		self.compression_threshold_bytes = bytes;
		self
	}

	/// Encode `value`, compressing the result when it exceeds the configured threshold.
	#[tracing::instrument(level = "debug", skip(self, value))]
	pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
		let raw = match self.format {
			WireFormat::Json => serde_json::to_vec(value).map_err(Error::from)?,
			#[cfg(feature = "msgpack")]
			WireFormat::MessagePack => rmp_serde::to_vec_named(value).map_err(Error::from)?,
		};

		if raw.len() <= self.compression_threshold_bytes {
			return Ok(raw);
		}

		let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
		encoder.write_all(&raw).map_err(Error::from)?;
		let compressed = encoder.finish().map_err(Error::from)?;

		let mut framed = Vec::with_capacity(COMPRESSION_PREFIX.len() + compressed.len());
		framed.extend_from_slice(COMPRESSION_PREFIX.as_bytes());
		framed.extend_from_slice(&compressed);

		tracing::debug!(raw_len = raw.len(), compressed_len = framed.len(), "compressed cache payload");

		Ok(framed)
	}

	/// Decode bytes previously produced by [`Self::encode`].
	#[tracing::instrument(level = "debug", skip(self, bytes))]
	pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
		let prefix = COMPRESSION_PREFIX.as_bytes();

		let raw = if bytes.starts_with(prefix) {
			let mut decoder = flate2::read::GzDecoder::new(&bytes[prefix.len()..]);
			let mut out = Vec::new();
			decoder.read_to_end(&mut out).map_err(Error::from)?;
			out
		} else {
			bytes.to_vec()
		};

		match self.format {
			WireFormat::Json => serde_json::from_slice(&raw).map_err(Error::from),
			#[cfg(feature = "msgpack")]
			WireFormat::MessagePack => rmp_serde::from_slice(&raw).map_err(Error::from),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde::Deserialize;

	#[derive(Debug, Serialize, Deserialize, PartialEq)]
	struct Quote {
		symbol: String,
		price: f64,
		note: String,
	}

	#[test]
	fn round_trips_small_payloads_uncompressed() {
		let serializer = Serializer::new(WireFormat::Json);
		let quote = Quote { symbol: "AAPL.US".into(), price: 190.12, note: "ok".into() };

		let encoded = serializer.encode(&quote).unwrap();
		assert!(!encoded.starts_with(COMPRESSION_PREFIX.as_bytes()));

		let decoded: Quote = serializer.decode(&encoded).unwrap();
		assert_eq!(decoded, quote);
	}

	#[test]
	fn compresses_payloads_over_the_threshold() {
		let serializer = Serializer::new(WireFormat::Json).with_compression_threshold(8);
		let quote = Quote { symbol: "AAPL.US".into(), price: 190.12, note: "x".repeat(64) };

		let encoded = serializer.encode(&quote).unwrap();
		assert!(encoded.starts_with(COMPRESSION_PREFIX.as_bytes()));

		let decoded: Quote = serializer.decode(&encoded).unwrap();
		assert_eq!(decoded, quote);
	}

	#[cfg(feature = "msgpack")]
	#[test]
	fn round_trips_messagepack() {
		let serializer = Serializer::new(WireFormat::MessagePack);
		let quote = Quote { symbol: "700.HK".into(), price: 320.4, note: "ok".into() };

		let encoded = serializer.encode(&quote).unwrap();
		let decoded: Quote = serializer.decode(&encoded).unwrap();
		assert_eq!(decoded, quote);
	}
}
