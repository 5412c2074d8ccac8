//! Log record types and framing.

use crate::error::{CoreError, CoreResult};
use crate::schema::SchemaChange;
use crate::types::{DatabaseVersion, Key};
use petalstore_codec::{from_cbor, to_cbor, Value};

/// Magic bytes opening every log record.
pub const LOG_MAGIC: [u8; 4] = *b"PLOG";

/// Current log format version.
pub const LOG_VERSION: u16 = 1;

/// magic (4) + version (2) + type (1) + length (4)
pub(crate) const HEADER_SIZE: usize = 11;

pub(crate) const CRC_SIZE: usize = 4;

/// Type of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogRecordType {
    /// A committed version change.
    Upgrade = 1,
    /// A committed read-write transaction.
    Commit = 2,
}

impl LogRecordType {
    /// Converts a byte to a record type.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Upgrade),
            2 => Some(Self::Commit),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// One write inside a committed transaction.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum WriteOp {
    /// Insert or replace a record. `add` is logged as a put.
    Put { collection: String, value: Value },
    Delete { collection: String, key: Key },
    Clear { collection: String },
}

impl WriteOp {
    fn to_value(&self) -> Value {
        match self {
            Self::Put { collection, value } => Value::map([
                ("op", Value::from("put")),
                ("collection", Value::from(collection.as_str())),
                ("value", value.clone()),
            ]),
            Self::Delete { collection, key } => Value::map([
                ("op", Value::from("delete")),
                ("collection", Value::from(collection.as_str())),
                ("key", key.to_value()),
            ]),
            Self::Clear { collection } => Value::map([
                ("op", Value::from("clear")),
                ("collection", Value::from(collection.as_str())),
            ]),
        }
    }

    fn from_value(value: &Value) -> CoreResult<Self> {
        let collection = text(value, "collection")?;
        match text(value, "op")?.as_str() {
            "put" => Ok(Self::Put {
                collection,
                value: field(value, "value")?.clone(),
            }),
            "delete" => Ok(Self::Delete {
                collection,
                key: Key::from_value(field(value, "key")?)
                    .ok_or_else(|| malformed("delete key is not a valid key"))?,
            }),
            "clear" => Ok(Self::Clear { collection }),
            other => Err(malformed(format!("unknown write op {other:?}"))),
        }
    }
}

/// A committed unit of change.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LogRecord {
    Upgrade {
        old_version: DatabaseVersion,
        new_version: DatabaseVersion,
        changes: Vec<SchemaChange>,
    },
    Commit {
        writes: Vec<WriteOp>,
    },
}

impl LogRecord {
    pub(crate) fn record_type(&self) -> LogRecordType {
        match self {
            Self::Upgrade { .. } => LogRecordType::Upgrade,
            Self::Commit { .. } => LogRecordType::Commit,
        }
    }

    /// Serializes the record payload (without envelope).
    pub(crate) fn encode_payload(&self) -> CoreResult<Vec<u8>> {
        let value = match self {
            Self::Upgrade {
                old_version,
                new_version,
                changes,
            } => Value::map([
                ("oldVersion", version_value(*old_version)?),
                ("newVersion", version_value(*new_version)?),
                (
                    "changes",
                    Value::Array(changes.iter().map(SchemaChange::to_value).collect()),
                ),
            ]),
            Self::Commit { writes } => Value::map([(
                "writes",
                Value::Array(writes.iter().map(WriteOp::to_value).collect()),
            )]),
        };
        Ok(to_cbor(&value)?)
    }

    /// Deserializes a record payload.
    pub(crate) fn decode_payload(record_type: LogRecordType, payload: &[u8]) -> CoreResult<Self> {
        let value = from_cbor(payload)?;
        match record_type {
            LogRecordType::Upgrade => Ok(Self::Upgrade {
                old_version: version(&value, "oldVersion")?,
                new_version: version(&value, "newVersion")?,
                changes: array(&value, "changes")?
                    .iter()
                    .map(SchemaChange::from_value)
                    .collect::<CoreResult<_>>()?,
            }),
            LogRecordType::Commit => Ok(Self::Commit {
                writes: array(&value, "writes")?
                    .iter()
                    .map(WriteOp::from_value)
                    .collect::<CoreResult<_>>()?,
            }),
        }
    }

    /// Builds the full envelope: header, payload and trailing checksum.
    pub(crate) fn encode(&self) -> CoreResult<Vec<u8>> {
        let payload = self.encode_payload()?;
        let len = u32::try_from(payload.len())
            .map_err(|_| CoreError::invalid_operation("log record payload too large"))?;

        let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        data.extend_from_slice(&LOG_MAGIC);
        data.extend_from_slice(&LOG_VERSION.to_le_bytes());
        data.push(self.record_type().as_byte());
        data.extend_from_slice(&len.to_le_bytes());
        data.extend_from_slice(&payload);

        let crc = compute_crc32(&data);
        data.extend_from_slice(&crc.to_le_bytes());
        Ok(data)
    }
}

fn malformed(message: impl Into<String>) -> CoreError {
    CoreError::invalid_operation(format!("malformed log payload: {}", message.into()))
}

fn field<'a>(value: &'a Value, name: &str) -> CoreResult<&'a Value> {
    value
        .get(name)
        .ok_or_else(|| malformed(format!("missing field {name}")))
}

fn text(value: &Value, name: &str) -> CoreResult<String> {
    field(value, name)?
        .as_text()
        .map(str::to_string)
        .ok_or_else(|| malformed(format!("field {name} is not text")))
}

fn array<'a>(value: &'a Value, name: &str) -> CoreResult<&'a [Value]> {
    field(value, name)?
        .as_array()
        .ok_or_else(|| malformed(format!("field {name} is not an array")))
}

fn version(value: &Value, name: &str) -> CoreResult<DatabaseVersion> {
    field(value, name)?
        .as_integer()
        .and_then(|n| DatabaseVersion::try_from(n).ok())
        .ok_or_else(|| malformed(format!("field {name} is not a version")))
}

fn version_value(version: DatabaseVersion) -> CoreResult<Value> {
    i64::try_from(version)
        .map(Value::Integer)
        .map_err(|_| CoreError::invalid_operation(format!("version {version} out of range")))
}

/// Computes the CRC32 (IEEE) checksum of `data`.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}
