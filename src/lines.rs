//! Line reading and writing shared by every tool in the crate.
//!
//! A [`Line`] is the raw bytes of one record including its `\n` terminator.
//! [`LineReader`] normalizes an unterminated final line by appending `\n` and
//! remembers that it did so; [`LineWriter`] keeps one line of lookahead so the
//! last line it writes can drop that terminator again. Together they keep the
//! input's final-boundary convention no matter how lines are reordered.

use crate::error::{NewlineError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// One record, always ending in [`LINE_TERMINATOR`] while in flight.
pub type Line = Vec<u8>;

pub const LINE_TERMINATOR: u8 = b'\n';

/// Forward-only line reader
pub struct LineReader<R> {
    inner: R,
    unterminated_tail: bool,
    lines_read: u64,
}

impl LineReader<BufReader<File>> {
    /// Open a file for line-by-line reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            unterminated_tail: false,
            lines_read: 0,
        }
    }

    /// Read the next line, or `None` at end of input
    pub fn next_line(&mut self) -> Result<Option<Line>> {
        let mut line = Vec::new();
        if self.inner.read_until(LINE_TERMINATOR, &mut line)? == 0 {
            return Ok(None);
        }
        if line.last() != Some(&LINE_TERMINATOR) {
            line.push(LINE_TERMINATOR);
            self.unterminated_tail = true;
        }
        self.lines_read += 1;
        Ok(Some(line))
    }

    /// Whether the last line read had no terminator in the source
    pub fn unterminated_tail(&self) -> bool {
        self.unterminated_tail
    }

    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }
}

impl<R: BufRead> Iterator for LineReader<R> {
    type Item = Result<Line>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_line().transpose()
    }
}

/// Appending line writer with one line of lookahead
pub struct LineWriter<W: Write> {
    inner: W,
    pending: Option<Line>,
    lines_written: u64,
}

impl LineWriter<BufWriter<File>> {
    /// Create (or truncate) a file for writing
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| output_error(e, path))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> LineWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            pending: None,
            lines_written: 0,
        }
    }

    pub fn write_line(&mut self, line: Line) -> Result<()> {
        if let Some(previous) = self.pending.replace(line) {
            self.inner.write_all(&previous)?;
        }
        self.lines_written += 1;
        Ok(())
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    /// Write the held-back line and flush.
    /// With `unterminated_tail` set, the final line is written without its terminator.
    pub fn finish(mut self, unterminated_tail: bool) -> Result<W> {
        if let Some(mut last) = self.pending.take() {
            if unterminated_tail && last.last() == Some(&LINE_TERMINATOR) {
                last.pop();
            }
            self.inner.write_all(&last)?;
        }
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Content of a line without its terminator
pub fn line_content(line: &[u8]) -> &[u8] {
    line.strip_suffix(&[LINE_TERMINATOR]).unwrap_or(line)
}

/// Count lines in a file in a single forward scan.
/// A final line without a terminator still counts.
pub fn count_lines(path: &Path) -> Result<u64> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(64 * 1024, file);
    let mut count = 0u64;
    let mut last = None;

    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            break;
        }
        count += buf.iter().filter(|&&b| b == LINE_TERMINATOR).count() as u64;
        last = buf.last().copied();
        let consumed = buf.len();
        reader.consume(consumed);
    }

    if matches!(last, Some(b) if b != LINE_TERMINATOR) {
        count += 1;
    }
    Ok(count)
}

/// Whether a non-empty file's last byte is something other than a terminator
pub fn has_unterminated_tail(path: &Path) -> Result<bool> {
    let mut file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != LINE_TERMINATOR)
}

/// Size of a file in bytes, used for bucket sizing
pub fn estimate_size_bytes(path: &Path) -> Result<u64> {
    Ok(std::fs::metadata(path)?.len())
}

/// Directory an output file will be created in
pub fn output_dir(output: &Path) -> PathBuf {
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Classify a failure to create output at `path`.
/// Permission problems are the caller's to fix; anything else stays an IO error.
pub fn output_error(err: std::io::Error, path: &Path) -> NewlineError {
    match err.kind() {
        ErrorKind::PermissionDenied => NewlineError::OutputNotWritable(path.to_path_buf()),
        _ => NewlineError::Io(err),
    }
}

/// Validate an input/output pair before any tool touches the filesystem
pub fn check_paths(input: &Path, output: &Path) -> Result<()> {
    if !input.is_file() {
        return Err(NewlineError::InputNotFound(input.to_path_buf()));
    }

    let dir = output_dir(output);
    if !dir.is_dir() {
        return Err(NewlineError::OutputDirMissing(dir));
    }

    if output.exists() && std::fs::canonicalize(output)? == std::fs::canonicalize(input)? {
        return Err(NewlineError::OutputIsInput(output.to_path_buf()));
    }
    Ok(())
}
