//! Verify command implementation.

use petalstore_core::{CoreError, LogReport};
use std::path::Path;

/// Runs the verify command.
pub fn run(path: &Path, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying {} in {:?}", name, path);
    println!();

    let factory = super::existing_only(path);
    match factory.verify(name) {
        Ok(report) => {
            print_report(&report);
            println!();
            if report.is_clean() {
                println!("✓ Log verification passed");
            } else {
                println!("⚠ Log verification passed with a damaged tail; the next open drops it");
            }
            Ok(())
        }
        Err(CoreError::Corrupted { offset, message }) => {
            println!("  Corrupt record at offset {}: {}", offset, message);
            println!();
            println!("✗ Log verification failed");
            Err("Verification failed".into())
        }
        Err(e) => Err(e.into()),
    }
}

fn print_report(report: &LogReport) {
    println!("Log:");
    println!("  Size:            {} bytes", report.total_len);
    println!("  Intact bytes:    {}", report.valid_len);
    println!("  Upgrade records: {}", report.upgrades);
    println!("  Commit records:  {}", report.commits);
    if let Some(offset) = report.damaged_tail {
        println!(
            "  Damaged tail:    offset {} ({} bytes)",
            offset,
            report.total_len - offset
        );
    }
}
