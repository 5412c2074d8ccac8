//! CBOR decoder.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use ciborium::value::Value as Cbor;
use std::collections::BTreeMap;

/// Decode a document from CBOR bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not valid CBOR, contain trailing data,
/// or use a shape documents cannot hold (non-text map keys, integers outside
/// the `i64` range).
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    let mut reader = bytes;
    let cbor: Cbor = ciborium::from_reader(&mut reader)
        .map_err(|e| CodecError::decoding_failed(format!("{e:?}")))?;

    if !reader.is_empty() {
        return Err(CodecError::decoding_failed(format!(
            "{} trailing bytes after document",
            reader.len()
        )));
    }

    from_cbor_value(cbor)
}

/// Converts ciborium's value tree into a document.
pub(crate) fn from_cbor_value(cbor: Cbor) -> CodecResult<Value> {
    Ok(match cbor {
        Cbor::Null => Value::Null,
        Cbor::Bool(b) => Value::Bool(b),
        Cbor::Integer(n) => {
            let wide = i128::from(n);
            Value::Integer(i64::try_from(wide).map_err(|_| CodecError::IntegerOverflow)?)
        }
        Cbor::Float(f) => {
            if f.is_nan() {
                return Err(CodecError::NaNForbidden);
            }
            Value::Float(f)
        }
        Cbor::Text(s) => Value::Text(s),
        Cbor::Bytes(b) => Value::Bytes(b),
        // Tags carry no meaning for documents; keep the tagged content.
        Cbor::Tag(_, inner) => from_cbor_value(*inner)?,
        Cbor::Array(items) => Value::Array(
            items
                .into_iter()
                .map(from_cbor_value)
                .collect::<CodecResult<Vec<_>>>()?,
        ),
        Cbor::Map(pairs) => {
            let mut entries = BTreeMap::new();
            for (k, v) in pairs {
                let key = match k {
                    Cbor::Text(key) => key,
                    other => {
                        return Err(CodecError::invalid_structure(format!(
                            "map key must be text, got {other:?}"
                        )))
                    }
                };
                entries.insert(key, from_cbor_value(v)?);
            }
            Value::Map(entries)
        }
        other => {
            return Err(CodecError::invalid_structure(format!(
                "unsupported CBOR item {other:?}"
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::to_cbor;

    #[test]
    fn decode_small_integer() {
        assert_eq!(from_cbor(&[0x0a]).unwrap(), Value::Integer(10));
        assert_eq!(from_cbor(&[0x20]).unwrap(), Value::Integer(-1));
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        assert!(matches!(
            from_cbor(&[0x01, 0x02]),
            Err(CodecError::DecodingFailed { .. })
        ));
    }

    #[test]
    fn decode_rejects_truncated_input() {
        // text of length 5 with only 2 bytes present
        assert!(from_cbor(&[0x65, b'r', b'o']).is_err());
    }

    #[test]
    fn decode_rejects_integer_key() {
        // map(1) { 1: 2 }
        assert!(matches!(
            from_cbor(&[0xa1, 0x01, 0x02]),
            Err(CodecError::InvalidStructure { .. })
        ));
    }

    #[test]
    fn decode_rejects_u64_overflow() {
        let mut bytes = vec![0x1b];
        bytes.extend_from_slice(&u64::MAX.to_be_bytes());
        assert_eq!(from_cbor(&bytes), Err(CodecError::IntegerOverflow));
    }

    #[test]
    fn decode_unwraps_tags() {
        // tag(1) 1700000000 (epoch time)
        let bytes = [0xc1, 0x1a, 0x65, 0x53, 0xf1, 0x00];
        assert_eq!(from_cbor(&bytes).unwrap(), Value::Integer(1_700_000_000));
    }

    #[test]
    fn decode_nested_document() {
        let doc = Value::map([
            ("id", Value::from(3)),
            ("bytes", Value::from(vec![1u8, 2, 3])),
            ("items", Value::Array(vec![Value::from("stem"), Value::Float(1.5)])),
        ]);
        assert_eq!(from_cbor(&to_cbor(&doc).unwrap()).unwrap(), doc);
    }
}
