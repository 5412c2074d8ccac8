//! # PetalStore Codec
//!
//! Document values and their CBOR encoding.
//!
//! Records in PetalStore are dynamic documents ([`Value`]). This crate
//! provides:
//! - [`to_cbor`] / [`from_cbor`] for the bytes written to a database log
//! - [`to_value`] / [`from_value`] to move between typed Rust records and
//!   documents through serde
//!
//! ## Usage
//!
//! ```
//! use petalstore_codec::{from_value, to_value, Value};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Product {
//!     id: i64,
//!     name: String,
//! }
//!
//! let rose = Product { id: 1, name: "Red rose".into() };
//! let doc = to_value(&rose).unwrap();
//! assert_eq!(doc.get("name"), Some(&Value::from("Red rose")));
//!
//! let back: Product = from_value(doc).unwrap();
//! assert_eq!(back, rose);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod value;

pub use decoder::from_cbor;
pub use encoder::to_cbor;
pub use error::{CodecError, CodecResult};
pub use value::Value;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Converts any serializable record into a document.
///
/// # Errors
///
/// Returns [`CodecError::Conversion`] if the record cannot be serialized, or
/// a structural error if it serializes to something a document cannot hold
/// (for example a map with non-text keys).
pub fn to_value<T: Serialize + ?Sized>(record: &T) -> CodecResult<Value> {
    let cbor = ciborium::value::Value::serialized(record)
        .map_err(|e| CodecError::conversion(format!("{e:?}")))?;
    decoder::from_cbor_value(cbor)
}

/// Converts a document into a typed record.
///
/// # Errors
///
/// Returns [`CodecError::Conversion`] if the document does not match the
/// record's shape.
pub fn from_value<T: DeserializeOwned>(value: Value) -> CodecResult<T> {
    encoder::to_cbor_value(&value)
        .deserialized()
        .map_err(|e| CodecError::conversion(format!("{e:?}")))
}
