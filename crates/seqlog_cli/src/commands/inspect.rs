//! Inspect command implementation.

use seqlog_core::LogSummary;
use serde::Serialize;
use std::path::Path;

/// Log inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Log path.
    pub path: String,
    /// Number of published records.
    pub records: u64,
    /// Highest published index.
    pub highest_index: Option<u64>,
    /// Number of segment files.
    pub segment_count: usize,
    /// Total segment bytes.
    pub segment_bytes: u64,
    /// Index file size in bytes.
    pub index_bytes: u64,
    /// Per-segment details (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<SegmentStats>>,
}

/// Statistics for a single segment.
#[derive(Debug, Serialize)]
pub struct SegmentStats {
    /// Segment ID.
    pub id: u32,
    /// Size in bytes.
    pub size: u64,
}

impl InspectResult {
    fn from_summary(path: &Path, summary: &LogSummary, show_segments: bool) -> Self {
        Self {
            path: path.display().to_string(),
            records: summary.records,
            highest_index: summary.highest_index,
            segment_count: summary.segments.len(),
            segment_bytes: summary.segment_bytes(),
            index_bytes: summary.index_bytes,
            segments: show_segments.then(|| {
                summary
                    .segments
                    .iter()
                    .map(|s| SegmentStats {
                        id: s.id.as_u32(),
                        size: s.size,
                    })
                    .collect()
            }),
        }
    }
}

/// Runs the inspect command.
pub fn run(path: &Path, show_segments: bool, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let summary = seqlog_core::inspect(path)?;
    let result = InspectResult::from_summary(path, &summary, show_segments);

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

fn print_text_output(result: &InspectResult) {
    println!("seqlog Inspection");
    println!("=================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Records:");
    println!("  Published:     {}", result.records);
    match result.highest_index {
        Some(index) => println!("  Highest index: {index}"),
        None => println!("  Highest index: (empty)"),
    }
    println!();
    println!("Storage:");
    println!("  Segments:      {}", result.segment_count);
    println!("  Segment size:  {}", format_size(result.segment_bytes));
    println!("  Index size:    {}", format_size(result.index_bytes));

    if let Some(segments) = &result.segments {
        println!();
        println!("Segments:");
        for seg in segments {
            println!("  [{}] {}", seg.id, format_size(seg.size));
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
