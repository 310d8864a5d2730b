use crate::error::{NewlineError, Result};
use crate::lines::{count_lines, estimate_size_bytes};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Line and byte totals of a file
#[derive(Debug, Clone, Serialize)]
pub struct CountReport {
    pub path: PathBuf,
    pub lines: u64,
    pub bytes: u64,
}

pub fn count_file(path: &Path) -> Result<CountReport> {
    if !path.is_file() {
        return Err(NewlineError::InputNotFound(path.to_path_buf()));
    }

    Ok(CountReport {
        path: path.to_path_buf(),
        lines: count_lines(path)?,
        bytes: estimate_size_bytes(path)?,
    })
}

/// Human-readable summary of a file's size
pub fn show_count(path: &Path) -> Result<String> {
    let report = count_file(path)?;

    let mut output = String::new();
    output.push_str(&format!("File: {}\n", report.path.display()));
    output.push_str(&format!("Lines: {}\n", report.lines));
    output.push_str(&format!("Size: {}\n", format_size(report.bytes)));
    if report.lines > 0 {
        output.push_str(&format!(
            "Average line: {:.1} bytes\n",
            report.bytes as f64 / report.lines as f64
        ));
    }

    Ok(output)
}

pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
