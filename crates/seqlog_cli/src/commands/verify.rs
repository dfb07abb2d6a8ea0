//! Verify command implementation.

use seqlog_core::VerifyReport;
use std::path::Path;

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying log at {:?}", path);
    println!();

    let report = seqlog_core::verify(path)?;
    print_result(&report);

    println!();
    if report.is_ok() {
        println!("✓ Log verification passed");
        Ok(())
    } else {
        println!("✗ Log verification failed");
        Err("Verification failed".into())
    }
}

fn print_result(report: &VerifyReport) {
    println!(
        "  Records checked: {}, problems: {}",
        report.records_checked,
        report.problems.len()
    );
    if report.unindexed_bytes > 0 {
        println!(
            "  {} bytes after the last indexed record (recovered on next append)",
            report.unindexed_bytes
        );
    }
    for problem in &report.problems {
        println!("    ERROR: {}", problem);
    }
}
