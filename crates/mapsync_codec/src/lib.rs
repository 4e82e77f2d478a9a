//! # mapsync Codec
//!
//! Dynamic record values and their encodings.
//!
//! Upstream profiles arrive as JSON objects whose shape is controlled by the
//! directory service, so this crate models them as an ordered [`Record`] of
//! tagged [`Value`]s instead of a fixed schema.
//!
//! Two encodings are provided:
//! - JSON, for the upstream wire protocol
//! - CBOR, for the local document store's mutation log
//!
//! ## Usage
//!
//! ```
//! use mapsync_codec::{from_cbor, to_cbor, Record, Value};
//!
//! let record = Record::new()
//!     .with("profile_url", "https://example.org/profile.json")
//!     .with("latitude", 52.52);
//!
//! let bytes = to_cbor(&record).unwrap();
//! let decoded: Record = from_cbor(&bytes).unwrap();
//! assert_eq!(decoded, record);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod record;
mod value;

pub use error::{CodecError, CodecResult};
pub use record::Record;
pub use value::Value;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes a serializable value to CBOR bytes.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn to_cbor<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    let mut buffer = Vec::new();
    ciborium::into_writer(value, &mut buffer).map_err(|e| CodecError::encoding(e.to_string()))?;
    Ok(buffer)
}

/// Decodes CBOR bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not valid CBOR for `T`.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    ciborium::from_reader(bytes).map_err(|e| CodecError::decoding(e.to_string()))
}

/// Encodes a serializable value to JSON bytes.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| CodecError::encoding(e.to_string()))
}

/// Decodes JSON bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not valid JSON for `T`.
pub fn from_json<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::decoding(e.to_string()))
}
