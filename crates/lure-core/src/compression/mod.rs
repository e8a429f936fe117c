//! Payload compression for locally stored records.
//!
//! Records are stored as a self-describing envelope
//! `{"compressed": bool, "data": string}`. Compressed data is an LZ4 block
//! (size-prepended) encoded as standard base64. Records written before the
//! envelope existed are plain JSON and still decode.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Payloads smaller than this many bytes are stored as-is
pub const COMPRESSION_THRESHOLD: usize = 1024;

/// On-disk envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoredPayload {
    pub compressed: bool,
    pub data: String,
}

/// Result of [`compress_payload`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedPayload {
    pub envelope: StoredPayload,
    /// Serialized JSON size in bytes
    pub original_size: usize,
    /// Size of `envelope.data` in bytes
    pub compressed_size: usize,
}

impl CompressedPayload {
    pub const fn is_compressed(&self) -> bool {
        self.envelope.compressed
    }

    /// Serialize the envelope for storage
    pub fn to_record(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.envelope)?)
    }
}

/// Compress `value` using the default threshold.
pub fn compress_payload(value: &Value) -> CompressedPayload {
    compress_payload_with_threshold(value, COMPRESSION_THRESHOLD)
}

/// Compress `value`, storing it uncompressed when it is below `threshold`
/// or when compression would not make it smaller.
pub fn compress_payload_with_threshold(value: &Value, threshold: usize) -> CompressedPayload {
    let json = value.to_string();
    let original_size = json.len();

    if original_size < threshold {
        return uncompressed(json);
    }

    let packed = lz4_flex::compress_prepend_size(json.as_bytes());
    let encoded = STANDARD.encode(packed);
    if encoded.len() >= original_size {
        tracing::debug!(
            "Compression did not shrink payload ({} -> {} bytes); storing raw JSON",
            original_size,
            encoded.len()
        );
        return uncompressed(json);
    }

    CompressedPayload {
        compressed_size: encoded.len(),
        envelope: StoredPayload {
            compressed: true,
            data: encoded,
        },
        original_size,
    }
}

/// Serialize and compress any value.
pub fn compress_json<T: Serialize>(data: &T, threshold: usize) -> Result<CompressedPayload> {
    let value = serde_json::to_value(data)?;
    Ok(compress_payload_with_threshold(&value, threshold))
}

/// Decode a stored record back into JSON.
///
/// Accepts compressed envelopes, uncompressed envelopes and legacy raw JSON.
pub fn decompress_payload(record: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(record)
        .map_err(|error| Error::Compression(format!("record is not JSON: {error}")))?;

    match serde_json::from_value::<StoredPayload>(value.clone()) {
        Ok(envelope) => decode_envelope(&envelope),
        Err(_) => Ok(value),
    }
}

/// [`decompress_payload`] followed by deserialization into `T`.
pub fn decompress_json<T: DeserializeOwned>(record: &str) -> Result<T> {
    Ok(serde_json::from_value(decompress_payload(record)?)?)
}

fn uncompressed(json: String) -> CompressedPayload {
    let size = json.len();
    CompressedPayload {
        envelope: StoredPayload {
            compressed: false,
            data: json,
        },
        original_size: size,
        compressed_size: size,
    }
}

fn decode_envelope(envelope: &StoredPayload) -> Result<Value> {
    if !envelope.compressed {
        return serde_json::from_str(&envelope.data)
            .map_err(|error| Error::Compression(format!("stored data is not JSON: {error}")));
    }

    match inflate(&envelope.data) {
        Ok(value) => Ok(value),
        Err(error) => serde_json::from_str(&envelope.data).map_err(|_| error),
    }
}

fn inflate(data: &str) -> Result<Value> {
    let packed = STANDARD
        .decode(data)
        .map_err(|error| Error::Compression(format!("invalid base64: {error}")))?;
    let bytes = lz4_flex::decompress_size_prepended(&packed)
        .map_err(|error| Error::Compression(format!("invalid lz4 block: {error}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|error| Error::Compression(format!("inflated data is not JSON: {error}")))
}
