//! Inspect command implementation.

use petalstore_core::{Connection, TransactionMode};
use serde::Serialize;
use std::path::Path;

/// Database inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Database name.
    pub name: String,
    /// Schema version.
    pub version: u64,
    /// Log size in bytes.
    pub log_size: u64,
    /// Per-collection statistics.
    pub collections: Vec<CollectionStats>,
}

/// Statistics for a single collection.
#[derive(Debug, Serialize)]
pub struct CollectionStats {
    /// Collection name.
    pub name: String,
    /// Primary key path.
    pub key_path: String,
    /// Number of records.
    pub records: usize,
    /// Secondary indexes.
    pub indexes: Vec<IndexStats>,
}

/// Statistics for a single index.
#[derive(Debug, Serialize)]
pub struct IndexStats {
    /// Index name.
    pub name: String,
    /// Indexed field.
    pub key_path: String,
    /// Whether the index is unique.
    pub unique: bool,
    /// Number of indexed records.
    pub entries: usize,
}

/// Runs the inspect command.
pub fn run(path: &Path, name: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let factory = super::existing_only(path);
    let conn = factory.open(name)?;
    let result = inspect(&conn)?;
    conn.close();

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Collects statistics from an open connection.
pub fn inspect(conn: &Connection) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let mut collections = Vec::new();
    for collection in conn.collection_names() {
        let Some(schema) = conn.collection_schema(&collection) else {
            continue;
        };
        let txn = conn.transaction(&[collection.as_str()], TransactionMode::ReadOnly)?;
        let records = txn.count(&collection)?;
        txn.commit()?;

        let mut indexes = Vec::new();
        for index in schema.indexes {
            indexes.push(IndexStats {
                entries: conn.index_len(&collection, &index.name)?,
                name: index.name,
                key_path: index.key_path,
                unique: index.unique,
            });
        }

        collections.push(CollectionStats {
            name: collection,
            key_path: schema.key_path,
            records,
            indexes,
        });
    }

    Ok(InspectResult {
        name: conn.name().to_string(),
        version: conn.version(),
        log_size: conn.log_size()?,
        collections,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("PetalStore Database Inspection");
    println!("==============================");
    println!();
    println!("Name:     {}", result.name);
    println!("Version:  {}", result.version);
    println!("Log size: {}", format_size(result.log_size));

    if result.collections.is_empty() {
        println!();
        println!("No collections.");
        return;
    }

    println!();
    println!("Collections:");
    for col in &result.collections {
        println!("  {} (key {}): {} records", col.name, col.key_path, col.records);
        for index in &col.indexes {
            let unique = if index.unique { ", unique" } else { "" };
            println!(
                "    index {} on {}{}: {} entries",
                index.name, index.key_path, unique, index.entries
            );
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
