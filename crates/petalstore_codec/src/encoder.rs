//! CBOR encoder.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use ciborium::value::{Integer, Value as Cbor};

/// Encode a document to CBOR bytes.
///
/// Map keys come out in sorted order, so equal documents produce equal
/// bytes.
///
/// # Errors
///
/// Returns [`CodecError::NaNForbidden`] if the document holds a NaN, or an
/// encoding error from the CBOR writer.
pub fn to_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    if value.contains_nan() {
        return Err(CodecError::NaNForbidden);
    }

    let mut buffer = Vec::new();
    ciborium::into_writer(&to_cbor_value(value), &mut buffer)
        .map_err(|e| CodecError::encoding_failed(format!("{e:?}")))?;
    Ok(buffer)
}

/// Converts a document into ciborium's value tree.
pub(crate) fn to_cbor_value(value: &Value) -> Cbor {
    match value {
        Value::Null => Cbor::Null,
        Value::Bool(b) => Cbor::Bool(*b),
        Value::Integer(n) => Cbor::Integer(Integer::from(*n)),
        Value::Float(f) => Cbor::Float(*f),
        Value::Text(s) => Cbor::Text(s.clone()),
        Value::Bytes(b) => Cbor::Bytes(b.clone()),
        Value::Array(items) => Cbor::Array(items.iter().map(to_cbor_value).collect()),
        Value::Map(entries) => Cbor::Map(
            entries
                .iter()
                .map(|(k, v)| (Cbor::Text(k.clone()), to_cbor_value(v)))
                .collect(),
        ),
    }
}
