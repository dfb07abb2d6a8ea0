//! Input command implementation.
//!
//! Appends each line read as one record and echoes it with its index. An
//! empty line ends the session.

use seqlog_core::{Appender, LogConfig};
use std::io::{BufRead, Write};
use std::path::Path;
use tracing::debug;

/// Runs the input command.
pub fn run<R: BufRead, W: Write>(
    path: &Path,
    config: LogConfig,
    input: R,
    mut out: W,
) -> Result<(), Box<dyn std::error::Error>> {
    let appender = Appender::open_with_config(path, config)?;

    for line in input.lines() {
        let line = line?;
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            break;
        }

        let index = appender.append(line.as_bytes())?;
        writeln!(out, "[{index}] {line}")?;
        out.flush()?;
    }

    let stats = appender.stats().snapshot();
    debug!(records = stats.records_appended, syncs = stats.syncs, "input finished");
    appender.close()?;
    Ok(())
}
