//! Log writer and recovery scan.

use crate::error::{CoreError, CoreResult};
use crate::log::record::{
    compute_crc32, LogRecord, LogRecordType, CRC_SIZE, HEADER_SIZE, LOG_MAGIC, LOG_VERSION,
};
use petalstore_storage::StorageBackend;
use tracing::{debug, warn};

/// Summary of a log walk, as reported by `verify`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogReport {
    /// Number of intact upgrade records.
    pub upgrades: usize,
    /// Number of intact commit records.
    pub commits: usize,
    /// Bytes covered by intact records.
    pub valid_len: u64,
    /// Total bytes in the log.
    pub total_len: u64,
    /// Offset of a torn or damaged final record, if any. Recovery drops
    /// everything from here on.
    ///
    /// A length field running past the end of the log only counts as a torn
    /// tail when no intact record follows it; otherwise the scan fails with
    /// `Corrupted`.
    pub damaged_tail: Option<u64>,
}

impl LogReport {
    /// Number of intact records.
    #[must_use]
    pub fn records(&self) -> usize {
        self.upgrades + self.commits
    }

    /// Returns true if every byte of the log belongs to an intact record.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.damaged_tail.is_none()
    }
}

/// Decoded records of a log plus where its intact prefix ends.
#[derive(Debug)]
pub(crate) struct LogScan {
    pub(crate) records: Vec<(u64, LogRecord)>,
    pub(crate) report: LogReport,
}

/// Walks every record envelope in `data`.
///
/// A record cut short by the end of the data, or a final record whose
/// checksum or payload is bad, is a damaged tail: the scan stops there and
/// reports it. Bad framing or checksums with more data behind them are
/// returned as [`CoreError::Corrupted`].
pub(crate) fn scan_log(data: &[u8]) -> CoreResult<LogScan> {
    let total = data.len();
    let mut records = Vec::new();
    let mut offset = 0usize;
    let mut damaged_tail = None;

    while offset < total {
        let at = offset as u64;
        if total - offset < HEADER_SIZE {
            damaged_tail = Some(at);
            break;
        }

        let header = &data[offset..offset + HEADER_SIZE];
        if header[0..4] != LOG_MAGIC {
            return Err(CoreError::corrupted(at, "invalid magic"));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version == 0 || version > LOG_VERSION {
            return Err(CoreError::corrupted(
                at,
                format!("unsupported format version {version}"),
            ));
        }
        let type_byte = header[6];
        let record_type = LogRecordType::from_byte(type_byte).ok_or_else(|| {
            CoreError::corrupted(at, format!("unknown record type {type_byte}"))
        })?;
        let len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;

        let end = offset + HEADER_SIZE + len + CRC_SIZE;
        if end > total {
            // A damaged length field can point past the end from the middle.
            if let Some(next) = intact_record_after(data, offset + HEADER_SIZE) {
                return Err(CoreError::corrupted(
                    at,
                    format!("record length runs past an intact record at {next}"),
                ));
            }
            damaged_tail = Some(at);
            break;
        }

        let crc_start = end - CRC_SIZE;
        let stored = u32::from_le_bytes([
            data[crc_start],
            data[crc_start + 1],
            data[crc_start + 2],
            data[crc_start + 3],
        ]);
        let decoded = if stored == compute_crc32(&data[offset..crc_start]) {
            LogRecord::decode_payload(record_type, &data[offset + HEADER_SIZE..crc_start])
        } else {
            Err(CoreError::corrupted(at, "checksum mismatch"))
        };

        match decoded {
            Ok(record) => records.push((at, record)),
            Err(_) if end == total => {
                damaged_tail = Some(at);
                break;
            }
            Err(CoreError::Corrupted { offset, message }) => {
                return Err(CoreError::Corrupted { offset, message })
            }
            Err(e) => return Err(CoreError::corrupted(at, e.to_string())),
        }
        offset = end;
    }

    let upgrades = records
        .iter()
        .filter(|(_, r)| r.record_type() == LogRecordType::Upgrade)
        .count();
    let report = LogReport {
        upgrades,
        commits: records.len() - upgrades,
        valid_len: damaged_tail.unwrap_or(total as u64),
        total_len: total as u64,
        damaged_tail,
    };

    Ok(LogScan { records, report })
}

/// Offset of the first whole record with a valid checksum at or after
/// `from`, if there is one.
fn intact_record_after(data: &[u8], from: usize) -> Option<usize> {
    let mut offset = from;
    while offset + HEADER_SIZE + CRC_SIZE <= data.len() {
        let found = data[offset..]
            .windows(LOG_MAGIC.len())
            .position(|window| window == LOG_MAGIC)?;
        let start = offset + found;
        if is_intact_record(data, start) {
            return Some(start);
        }
        offset = start + 1;
    }
    None
}

fn is_intact_record(data: &[u8], start: usize) -> bool {
    let Some(header) = data.get(start..start + HEADER_SIZE) else {
        return false;
    };
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version == 0 || version > LOG_VERSION || LogRecordType::from_byte(header[6]).is_none() {
        return false;
    }
    let len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;
    let crc_start = start + HEADER_SIZE + len;
    match data.get(crc_start..crc_start + CRC_SIZE) {
        Some(stored) => {
            let stored = u32::from_le_bytes([stored[0], stored[1], stored[2], stored[3]]);
            stored == compute_crc32(&data[start..crc_start])
        }
        None => false,
    }
}

/// Appends records to one database's log.
pub(crate) struct LogWriter {
    backend: Box<dyn StorageBackend>,
    sync_on_commit: bool,
}

impl LogWriter {
    /// Scans the backend's log, drops a damaged tail and returns the writer
    /// together with every intact record and its offset, in order.
    pub(crate) fn recover(
        mut backend: Box<dyn StorageBackend>,
        sync_on_commit: bool,
    ) -> CoreResult<(Self, Vec<(u64, LogRecord)>)> {
        let data = backend.read_all()?;
        let scan = scan_log(&data)?;

        if let Some(offset) = scan.report.damaged_tail {
            warn!(
                offset,
                dropped = scan.report.total_len - offset,
                "truncating damaged log tail"
            );
            backend.truncate(offset)?;
            backend.sync()?;
        }
        debug!(records = scan.records.len(), "log recovered");

        Ok((
            Self {
                backend,
                sync_on_commit,
            },
            scan.records,
        ))
    }

    /// Appends one record and returns the offset it was written at.
    ///
    /// If the write fails part way, the log is cut back to its previous
    /// size so later appends stay readable.
    pub(crate) fn append(&mut self, record: &LogRecord) -> CoreResult<u64> {
        let data = record.encode()?;
        let before = self.backend.size()?;

        let written = self.backend.append(&data).and_then(|offset| {
            if self.sync_on_commit {
                self.backend.sync()?;
            }
            Ok(offset)
        });

        match written {
            Ok(offset) => Ok(offset),
            Err(e) => {
                if let Err(cleanup) = self.backend.truncate(before) {
                    warn!(error = %cleanup, "could not cut back a failed log append");
                }
                Err(e.into())
            }
        }
    }

    pub(crate) fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.size()?)
    }
}
