//! Output command implementation.
//!
//! Prints records as `[index] text`. When caught up it sleeps for the poll
//! interval and tries again, or exits if not following.

use seqlog_core::{StartPosition, Tailer};
use std::io::Write;
use std::path::Path;
use std::thread;
use std::time::Duration;

/// Options for the output command.
#[derive(Debug, Clone)]
pub struct Options {
    /// Where to start reading.
    pub start: StartPosition,
    /// Wait between polls when caught up.
    pub poll_interval: Duration,
    /// Keep waiting for new records once caught up.
    pub follow: bool,
}

/// Runs the output command.
pub fn run<W: Write>(
    path: &Path,
    options: &Options,
    mut out: W,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut tailer = Tailer::open(path, options.start)?;

    loop {
        match tailer.poll()? {
            Some(record) => {
                writeln!(
                    out,
                    "[{}] {}",
                    record.index,
                    String::from_utf8_lossy(&record.payload)
                )?;
            }
            None if options.follow => {
                out.flush()?;
                thread::sleep(options.poll_interval);
            }
            None => break,
        }
    }

    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use seqlog_core::Appender;
    use tempfile::tempdir;

    fn options(start: StartPosition) -> Options {
        Options {
            start,
            poll_interval: Duration::from_millis(1),
            follow: false,
        }
    }

    #[test]
    fn prints_records_with_indices() {
        let temp = tempdir().unwrap();
        let appender = Appender::open(temp.path()).unwrap();
        appender.append(b"first").unwrap();
        appender.append(b"second").unwrap();

        let mut out = Vec::new();
        run(temp.path(), &options(StartPosition::Beginning), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "[0] first\n[1] second\n");

        let mut out = Vec::new();
        run(temp.path(), &options(StartPosition::Index(1)), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "[1] second\n");
    }

    #[test]
    fn end_prints_nothing_when_caught_up() {
        let temp = tempdir().unwrap();
        let appender = Appender::open(temp.path()).unwrap();
        appender.append(b"old").unwrap();

        let mut out = Vec::new();
        run(temp.path(), &options(StartPosition::End), &mut out).unwrap();
        assert!(out.is_empty());
    }
}
