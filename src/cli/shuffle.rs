use crate::cli::count::format_size;
use crate::error::Result;
use crate::shuffle::{ShuffleOptions, ShuffleOrchestrator, ShuffleReport};
use std::path::Path;

/// Shuffle the lines of `input` into `output`, holding at most
/// `options.buffer_size` bytes of line data (times the slack factor) in memory.
/// Returns a report of how the work was split up.
pub fn shuffle_file(input: &Path, output: &Path, options: &ShuffleOptions) -> Result<ShuffleReport> {
    ShuffleOrchestrator::new(input, output, options).run()
}

/// Human-readable summary of a finished shuffle
pub fn describe_report(report: &ShuffleReport) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "Shuffled {} lines ({})\n",
        report.lines,
        format_size(report.input_bytes)
    ));
    output.push_str(&format!(
        "  Buckets: {} ({} re-bucketed, depth {})\n",
        report.buckets, report.rebucketed, report.max_depth_reached
    ));
    output.push_str(&format!(
        "  Peak resident: {} of {} buffer (slack {:.2})\n",
        format_size(report.peak_resident_bytes),
        format_size(report.buffer_size),
        report.slack
    ));
    output
}
