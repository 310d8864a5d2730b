use crate::error::Result;
use crate::lines::{check_paths, line_content, LineReader, LineWriter};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Outcome of a dedupe run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DedupeReport {
    pub lines_read: u64,
    pub lines_written: u64,
}

impl DedupeReport {
    pub fn duplicates(&self) -> u64 {
        self.lines_read - self.lines_written
    }
}

/// Copy `input` to `output` keeping only the first occurrence of each line.
/// Lines are compared by content; a missing final terminator does not make
/// a line distinct.
pub fn dedupe_file(input: &Path, output: &Path) -> Result<DedupeReport> {
    check_paths(input, output)?;

    let mut reader = LineReader::open(input)?;
    let mut writer = LineWriter::create(output)?;
    let mut seen: HashSet<blake3::Hash> = HashSet::new();
    let mut tail_kept = false;

    while let Some(line) = reader.next_line()? {
        if seen.insert(blake3::hash(line_content(&line))) {
            writer.write_line(line)?;
            tail_kept = true;
        } else {
            tail_kept = false;
        }
    }

    let report = DedupeReport {
        lines_read: reader.lines_read(),
        lines_written: writer.lines_written(),
    };
    writer.finish(reader.unterminated_tail() && tail_kept)?;

    debug!(
        lines_read = report.lines_read,
        duplicates = report.duplicates(),
        distinct = seen.len(),
        "dedupe complete"
    );
    Ok(report)
}
