//! Dump command implementation.

use petalstore_codec::Value;
use petalstore_core::{Connection, TransactionMode};
use std::io::Write;
use std::path::Path;

/// Prints up to `limit` records of `collection` as JSON lines.
pub fn run(
    path: &Path,
    name: &str,
    collection: &str,
    limit: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let factory = super::existing_only(path);
    let conn = factory.open(name)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let written = dump(&conn, collection, limit, &mut out)?;
    conn.close();

    eprintln!("{} record(s) from {}", written, collection);
    Ok(())
}

/// Writes the records as JSON lines and returns how many were written.
pub fn dump(
    conn: &Connection,
    collection: &str,
    limit: Option<usize>,
    out: &mut impl Write,
) -> Result<usize, Box<dyn std::error::Error>> {
    let txn = conn.transaction(&[collection], TransactionMode::ReadOnly)?;
    let records: Vec<Value> = txn.get_all(collection)?;
    txn.commit()?;

    let limit = limit.unwrap_or(usize::MAX);
    let mut written = 0;
    for record in records.iter().take(limit) {
        serde_json::to_writer(&mut *out, record)?;
        writeln!(out)?;
        written += 1;
    }
    Ok(written)
}
