//! Transient per-bucket line storage for the external shuffle.
//!
//! A [`BucketStore`] accepts appends during the partition pass. Sealing it
//! consumes the store and yields [`SealedBuckets`], the only type that can
//! hand bucket contents back, so nothing is readable before partitioning has
//! finished. Buckets live in memory until the store's resident bytes would
//! exceed the budget; then every buffer is appended to its bucket's file in a
//! private temporary directory that is removed when the store is dropped.

use crate::error::{NewlineError, Result};
use crate::lines::{Line, LineReader};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// Resident line bytes across every store of one shuffle
#[derive(Debug, Default, Clone, Copy)]
pub struct ResidentGauge {
    current: u64,
    peak: u64,
}

impl ResidentGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&mut self, bytes: u64) {
        self.current += bytes;
        self.peak = self.peak.max(self.current);
    }

    pub fn release(&mut self, bytes: u64) {
        self.current = self.current.saturating_sub(bytes);
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn peak(&self) -> u64 {
        self.peak
    }
}

/// Memory limits a store works under
#[derive(Debug, Clone, Copy)]
pub struct BucketLimits {
    /// Resident bytes allowed while partitioning
    pub budget: u64,
    /// Multiplier over `budget` a single drained bucket may reach
    pub slack: f64,
    /// Extra bytes a drained bucket may hold: 1 when the input's last line
    /// had no terminator and one was added in flight, else 0
    pub tail_allowance: u64,
}

impl BucketLimits {
    pub fn new(budget: u64, slack: f64) -> Self {
        Self {
            budget,
            slack,
            tail_allowance: 0,
        }
    }

    /// Account for the terminator added to an unterminated final line,
    /// so bucket sizes are measured in source bytes
    pub fn with_unterminated_tail(mut self, unterminated: bool) -> Self {
        self.tail_allowance = u64::from(unterminated);
        self
    }

    /// Largest bucket that is drained into memory rather than re-bucketed
    pub fn drain_limit(&self) -> u64 {
        ((self.budget as f64 * self.slack) as u64).max(self.budget) + self.tail_allowance
    }
}

/// Buckets below this index keep their spill file open between spills;
/// the rest reopen it each time so a store never holds more descriptors
pub const MAX_OPEN_SPILL_FILES: usize = 256;

#[derive(Debug, Default)]
struct Bucket {
    buffer: Vec<Line>,
    buffered_bytes: u64,
    spill: Option<PathBuf>,
    file: Option<File>,
    bytes: u64,
    lines: u64,
}

impl Bucket {
    fn spill_path(&mut self, dir: &Path, index: usize) -> &Path {
        self.spill
            .get_or_insert_with(|| dir.join(format!("bucket-{:06}.lines", index)))
    }

    /// Append the in-memory buffer to the spill file; returns bytes released.
    /// `opened` counts every file open this call performs.
    fn spill(
        &mut self,
        dir: &Path,
        index: usize,
        keep_open: bool,
        opened: &mut usize,
    ) -> Result<u64> {
        if self.buffer.is_empty() {
            return Ok(0);
        }

        let file = match self.file.take() {
            Some(file) => file,
            None => {
                *opened += 1;
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(self.spill_path(dir, index))?
            }
        };

        let mut writer = BufWriter::new(&file);
        for line in std::mem::take(&mut self.buffer) {
            writer.write_all(&line)?;
        }
        writer.flush()?;
        drop(writer);

        if keep_open {
            self.file = Some(file);
        }
        Ok(std::mem::take(&mut self.buffered_bytes))
    }
}

/// Bucket storage during the partition phase (append only)
pub struct BucketStore {
    dir: TempDir,
    depth: usize,
    limits: BucketLimits,
    buckets: Vec<Bucket>,
    resident: u64,
    spills: usize,
    files_opened: usize,
}

impl BucketStore {
    /// Create `bucket_count` empty buckets backed by a fresh temporary directory.
    /// `depth` is the re-bucketing level (0 for the top-level partition).
    pub fn new(
        bucket_count: usize,
        limits: BucketLimits,
        depth: usize,
        temp_root: Option<&Path>,
    ) -> Result<Self> {
        if bucket_count == 0 {
            return Err(NewlineError::InvalidArgument(
                "bucket count must be at least 1".into(),
            ));
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix("newline-buckets-");
        let dir = match temp_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };

        Ok(Self {
            dir,
            depth,
            limits,
            buckets: (0..bucket_count).map(|_| Bucket::default()).collect(),
            resident: 0,
            spills: 0,
            files_opened: 0,
        })
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Number of times buffers were flushed to disk
    pub fn spills(&self) -> usize {
        self.spills
    }

    /// Number of spill files opened so far
    pub fn files_opened(&self) -> usize {
        self.files_opened
    }

    pub fn append(&mut self, index: usize, line: Line, gauge: &mut ResidentGauge) -> Result<()> {
        if index >= self.buckets.len() {
            return Err(NewlineError::InvalidArgument(format!(
                "bucket {} out of range (0..{})",
                index,
                self.buckets.len()
            )));
        }

        let len = line.len() as u64;
        if self.resident > 0 && self.resident + len > self.limits.budget {
            self.spill_all(gauge)?;
        }

        let bucket = &mut self.buckets[index];
        bucket.buffer.push(line);
        bucket.buffered_bytes += len;
        bucket.bytes += len;
        bucket.lines += 1;
        self.resident += len;
        gauge.acquire(len);
        Ok(())
    }

    fn spill_all(&mut self, gauge: &mut ResidentGauge) -> Result<()> {
        let dir = self.dir.path();
        let mut released = 0;
        for (index, bucket) in self.buckets.iter_mut().enumerate() {
            let keep_open = index < MAX_OPEN_SPILL_FILES;
            released += bucket.spill(dir, index, keep_open, &mut self.files_opened)?;
        }

        self.resident -= released;
        gauge.release(released);
        self.spills += 1;
        debug!(depth = self.depth, bytes = released, "spilled bucket buffers");
        Ok(())
    }

    /// Finish partitioning. No appends are possible afterwards.
    /// Stores with more than one bucket flush every buffer so the
    /// recombination phase starts with nothing resident.
    pub fn seal(mut self, gauge: &mut ResidentGauge) -> Result<SealedBuckets> {
        if self.buckets.len() > 1 {
            self.spill_all(gauge)?;
        }
        for bucket in &mut self.buckets {
            bucket.file = None;
        }

        Ok(SealedBuckets {
            dir: self.dir,
            depth: self.depth,
            limits: self.limits,
            buckets: self.buckets.into_iter().map(Some).collect(),
        })
    }
}

/// A drained bucket's lines, loaded into memory
#[derive(Debug)]
pub struct ResidentBucket {
    pub lines: Vec<Line>,
    pub bytes: u64,
}

/// A bucket too large to load; its lines sit in a spill file.
/// The file is deleted when this value is dropped.
#[derive(Debug)]
pub struct OversizedBucket {
    path: PathBuf,
    bytes: u64,
    lines: u64,
    depth: usize,
}

impl OversizedBucket {
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn lines(&self) -> u64 {
        self.lines
    }

    /// Depth of the store this bucket came from
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn reader(&self) -> Result<LineReader<BufReader<File>>> {
        LineReader::open(&self.path)
    }
}

impl Drop for OversizedBucket {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Result of draining one bucket
#[derive(Debug)]
pub enum BucketPayload {
    /// Small enough to shuffle directly
    Resident(ResidentBucket),
    /// Still over the drain limit; must be re-partitioned
    Oversized(OversizedBucket),
}

/// Bucket storage after partitioning (drain only, once per bucket)
pub struct SealedBuckets {
    dir: TempDir,
    depth: usize,
    limits: BucketLimits,
    buckets: Vec<Option<Bucket>>,
}

impl SealedBuckets {
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Bytes held by a bucket that has not been drained yet
    pub fn bucket_bytes(&self, index: usize) -> Option<u64> {
        self.buckets.get(index)?.as_ref().map(|b| b.bytes)
    }

    /// Take a bucket's contents. Each bucket can be drained exactly once.
    pub fn drain(&mut self, index: usize, gauge: &mut ResidentGauge) -> Result<BucketPayload> {
        let mut bucket = self
            .buckets
            .get_mut(index)
            .and_then(Option::take)
            .ok_or_else(|| {
                NewlineError::InvalidArgument(format!(
                    "bucket {} is out of range or already drained",
                    index
                ))
            })?;
        let dir = self.dir.path();

        if bucket.bytes > self.limits.drain_limit() {
            let mut opened = 0;
            gauge.release(bucket.spill(dir, index, false, &mut opened)?);
            let path = bucket.spill_path(dir, index).to_path_buf();
            debug!(
                depth = self.depth,
                bucket = index,
                bytes = bucket.bytes,
                "bucket exceeds drain limit"
            );
            return Ok(BucketPayload::Oversized(OversizedBucket {
                path,
                bytes: bucket.bytes,
                lines: bucket.lines,
                depth: self.depth,
            }));
        }

        let mut lines = Vec::with_capacity(bucket.lines as usize);
        if let Some(path) = bucket.spill.take() {
            let mut reader = LineReader::open(&path)?;
            while let Some(line) = reader.next_line()? {
                gauge.acquire(line.len() as u64);
                lines.push(line);
            }
            drop(reader);
            fs::remove_file(&path)?;
        }
        lines.append(&mut bucket.buffer);

        Ok(BucketPayload::Resident(ResidentBucket {
            lines,
            bytes: bucket.bytes,
        }))
    }
}
