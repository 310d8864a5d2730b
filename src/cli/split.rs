use crate::error::{NewlineError, Result};
use crate::lines::{count_lines, LineReader, LineWriter};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Splits one file into numbered parts.
/// Part `i` is written to `{stem}-{i}{.ext}` where stem and extension come
/// from the prefix, which defaults to the input path without its extension.
pub struct Split {
    input: PathBuf,
    prefix: PathBuf,
    total_lines: u64,
}

impl Split {
    pub fn new(input: &Path, prefix: Option<&Path>) -> Result<Self> {
        if !input.is_file() {
            return Err(NewlineError::InputNotFound(input.to_path_buf()));
        }

        Ok(Self {
            input: input.to_path_buf(),
            prefix: prefix
                .map(Path::to_path_buf)
                .unwrap_or_else(|| input.with_extension("")),
            total_lines: count_lines(input)?,
        })
    }

    pub fn total_lines(&self) -> u64 {
        self.total_lines
    }

    pub fn output_filename(&self, index: usize) -> PathBuf {
        let mut name: OsString = self.prefix.with_extension("").into_os_string();
        name.push(format!("-{}", index));
        if let Some(ext) = self.prefix.extension() {
            name.push(".");
            name.push(ext);
        }
        PathBuf::from(name)
    }

    /// Split into `n` parts of `ceil(total / n)` lines; fewer files are
    /// created when the input runs out first
    pub fn split_by_parts(&self, n: usize) -> Result<Vec<PathBuf>> {
        if n == 0 {
            return Err(NewlineError::InvalidArgument(
                "number of parts must be at least 1".into(),
            ));
        }
        if self.total_lines == 0 {
            return Ok(Vec::new());
        }

        // Every part gets at least one line, so parts past the line count stay empty
        let per_file = self.total_lines.div_ceil(n as u64);
        let parts = n.min(self.total_lines as usize);
        self.split_file(&vec![per_file; parts])
    }

    /// Split into files of `size` lines, the last taking the remainder
    pub fn split_by_size(&self, size: u64) -> Result<Vec<PathBuf>> {
        if size == 0 {
            return Err(NewlineError::InvalidArgument(
                "lines per file must be at least 1".into(),
            ));
        }
        if self.total_lines == 0 {
            return Ok(Vec::new());
        }

        let n = self.total_lines.div_ceil(size);
        let mut plan = vec![size; (n - 1) as usize];
        plan.push(self.total_lines - size * (n - 1));
        self.split_file(&plan)
    }

    /// Split by relative weights. Weights are normalized, each part is
    /// rounded half to even and the last part absorbs the rounding error.
    pub fn split_by_proportion(&self, proportions: &[f64]) -> Result<Vec<PathBuf>> {
        if proportions.is_empty() || proportions.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(NewlineError::InvalidArgument(format!(
                "proportions must be positive numbers: {:?}",
                proportions
            )));
        }
        if self.total_lines == 0 {
            return Ok(Vec::new());
        }

        let sum: f64 = proportions.iter().sum();
        let total = self.total_lines;
        let mut plan: Vec<u64> = proportions
            .iter()
            .map(|p| (p / sum * total as f64).round_ties_even() as u64)
            .collect();
        let head: u64 = plan[..plan.len() - 1].iter().sum();
        if let Some(last) = plan.last_mut() {
            *last = total.saturating_sub(head);
        }
        self.split_file(&plan)
    }

    fn split_file(&self, lines_per_file: &[u64]) -> Result<Vec<PathBuf>> {
        let mut reader = LineReader::open(&self.input)?;
        let mut created = Vec::new();

        for (index, &count) in lines_per_file.iter().enumerate() {
            let path = self.output_filename(index);
            let mut writer = LineWriter::create(&path)?;
            for _ in 0..count {
                match reader.next_line()? {
                    Some(line) => writer.write_line(line)?,
                    None => break,
                }
            }
            let written = writer.lines_written();
            writer.finish(reader.unterminated_tail())?;
            debug!(part = index, lines = written, path = %path.display(), "wrote split part");
            created.push(path);

            if reader.lines_read() >= self.total_lines {
                break;
            }
        }

        Ok(created)
    }
}
