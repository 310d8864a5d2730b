//! Two-phase bounded-memory shuffle.
//!
//! ```text
//! Init → Sizing → Partitioning → Recombining → Done
//!   └──────────┴──────────┴─────────────┴──→ Failed
//! ```
//!
//! Partitioning sends every line to a uniformly random bucket sized to fit the
//! buffer. Recombining drains buckets in index order, shuffles each in memory
//! and appends it to the output. Random bucket assignment followed by a
//! uniform shuffle inside each bucket gives a uniform permutation overall, so
//! the bucket order itself does not need to be randomized.
//!
//! A bucket that comes out larger than `slack × buffer_size` is re-partitioned
//! into sub-buckets one level deeper instead of being loaded. Past
//! `max_depth`, or when a single line is larger than the drain limit, the
//! shuffle fails with `ResourceExhausted`.
//!
//! The output is staged in a temporary file next to the destination and only
//! renamed into place once every line has been written.

use super::assign::{bucket_count, BucketAssigner};
use super::cancel::CancelFlag;
use super::memory::InMemoryShuffler;
use super::store::{
    BucketLimits, BucketPayload, BucketStore, OversizedBucket, ResidentBucket, ResidentGauge,
    SealedBuckets,
};
use crate::config::{DEFAULT_BUFFER_SIZE, DEFAULT_MAX_DEPTH, DEFAULT_SLACK};
use crate::error::{NewlineError, Result};
use crate::lines::{
    check_paths, estimate_size_bytes, has_unterminated_tail, output_dir, output_error, LineReader,
    LineWriter,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

type OutputWriter = LineWriter<BufWriter<NamedTempFile>>;

/// Options for the shuffle command
#[derive(Debug, Clone)]
pub struct ShuffleOptions {
    /// Resident line bytes allowed at once
    pub buffer_size: u64,
    /// Fixed seed for reproducible output; OS entropy when `None`
    pub seed: Option<u64>,
    /// Drained-bucket overshoot allowed before re-bucketing (>= 1.0)
    pub slack: f64,
    /// Deepest re-bucketing level before giving up
    pub max_depth: usize,
    /// Where bucket directories are created; system temp dir when `None`
    pub temp_dir: Option<PathBuf>,
    pub cancel: CancelFlag,
}

impl Default for ShuffleOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            seed: None,
            slack: DEFAULT_SLACK,
            max_depth: DEFAULT_MAX_DEPTH,
            temp_dir: None,
            cancel: CancelFlag::new(),
        }
    }
}

/// Lifecycle of one shuffle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShuffleState {
    Init,
    Sizing,
    Partitioning,
    Recombining,
    Done,
    Failed,
}

/// Summary of a completed shuffle
#[derive(Debug, Clone, Default, Serialize)]
pub struct ShuffleReport {
    pub input_bytes: u64,
    pub lines: u64,
    pub buckets: usize,
    /// Buckets that exceeded the drain limit and were re-partitioned
    pub rebucketed: usize,
    pub max_depth_reached: usize,
    pub peak_resident_bytes: u64,
    pub buffer_size: u64,
    pub slack: f64,
}

/// Drives a single shuffle from validation to the final rename
pub struct ShuffleOrchestrator<'a> {
    input: &'a Path,
    output: &'a Path,
    options: &'a ShuffleOptions,
    state: ShuffleState,
    gauge: ResidentGauge,
    report: ShuffleReport,
    unterminated_input: bool,
}

impl<'a> ShuffleOrchestrator<'a> {
    pub fn new(input: &'a Path, output: &'a Path, options: &'a ShuffleOptions) -> Self {
        Self {
            input,
            output,
            options,
            state: ShuffleState::Init,
            gauge: ResidentGauge::new(),
            report: ShuffleReport {
                buffer_size: options.buffer_size,
                slack: options.slack,
                ..Default::default()
            },
            unterminated_input: false,
        }
    }

    pub fn state(&self) -> ShuffleState {
        self.state
    }

    /// Run to completion. On error nothing is left at the output path
    /// and every temporary bucket file has been removed.
    pub fn run(&mut self) -> Result<ShuffleReport> {
        match self.execute() {
            Ok(()) => {
                self.report.peak_resident_bytes = self.gauge.peak();
                info!(
                    input = %self.input.display(),
                    output = %self.output.display(),
                    lines = self.report.lines,
                    buckets = self.report.buckets,
                    rebucketed = self.report.rebucketed,
                    peak_resident_bytes = self.report.peak_resident_bytes,
                    "shuffle complete"
                );
                Ok(self.report.clone())
            }
            Err(e) => {
                warn!(state = ?self.state, error = %e, "shuffle failed");
                self.transition(ShuffleState::Failed);
                Err(e)
            }
        }
    }

    fn transition(&mut self, next: ShuffleState) {
        debug!(from = ?self.state, to = ?next, "shuffle state");
        self.state = next;
    }

    fn limits(&self) -> BucketLimits {
        BucketLimits::new(self.options.buffer_size, self.options.slack)
            .with_unterminated_tail(self.unterminated_input)
    }

    fn validate(&self) -> Result<()> {
        if self.options.buffer_size == 0 {
            return Err(NewlineError::InvalidBufferSize(0));
        }
        if !self.options.slack.is_finite() || self.options.slack < 1.0 {
            return Err(NewlineError::InvalidArgument(format!(
                "slack must be at least 1.0, got {}",
                self.options.slack
            )));
        }
        check_paths(self.input, self.output)
    }

    fn execute(&mut self) -> Result<()> {
        self.validate()?;

        self.transition(ShuffleState::Sizing);
        let input_bytes = estimate_size_bytes(self.input)?;
        self.report.input_bytes = input_bytes;
        self.unterminated_input = has_unterminated_tail(self.input)?;

        let dir = output_dir(self.output);
        let staged = tempfile::Builder::new()
            .prefix(".newline-shuffle-")
            .tempfile_in(&dir)
            .map_err(|e| output_error(e, &dir))?;
        let mut writer = LineWriter::new(BufWriter::new(staged));
        let mut unterminated_tail = false;

        if input_bytes > 0 {
            let mut master = match self.options.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let buckets = bucket_count(input_bytes, self.options.buffer_size);
            self.report.buckets = buckets;

            self.options.cancel.check()?;
            self.transition(ShuffleState::Partitioning);
            let mut reader = LineReader::open(self.input)?;
            let mut store = BucketStore::new(
                buckets,
                self.limits(),
                0,
                self.options.temp_dir.as_deref(),
            )?;
            self.report.lines = BucketAssigner::new(&mut master, buckets).partition(
                &mut reader,
                &mut store,
                &mut self.gauge,
                &self.options.cancel,
            )?;
            unterminated_tail = reader.unterminated_tail();
            let sealed = store.seal(&mut self.gauge)?;

            self.options.cancel.check()?;
            self.transition(ShuffleState::Recombining);
            self.recombine(sealed, &mut master, &mut writer)?;
        }

        let staged = writer
            .finish(unterminated_tail)?
            .into_inner()
            .map_err(|e| e.into_error())?;
        staged.as_file().sync_all()?;
        staged.persist(self.output).map_err(|e| e.error)?;
        self.transition(ShuffleState::Done);
        Ok(())
    }

    fn recombine(
        &mut self,
        mut sealed: SealedBuckets,
        master: &mut StdRng,
        writer: &mut OutputWriter,
    ) -> Result<()> {
        for index in 0..sealed.bucket_count() {
            self.options.cancel.check()?;
            match sealed.drain(index, &mut self.gauge)? {
                BucketPayload::Resident(bucket) => self.emit(bucket, master, writer)?,
                BucketPayload::Oversized(bucket) => self.rebucket(bucket, master, writer)?,
            }
        }
        Ok(())
    }

    fn emit(
        &mut self,
        bucket: ResidentBucket,
        master: &mut StdRng,
        writer: &mut OutputWriter,
    ) -> Result<()> {
        let ResidentBucket { mut lines, bytes } = bucket;
        InMemoryShuffler::from_seed(master.gen()).shuffle(&mut lines);
        for line in lines {
            writer.write_line(line)?;
        }
        self.gauge.release(bytes);
        Ok(())
    }

    fn rebucket(
        &mut self,
        bucket: OversizedBucket,
        master: &mut StdRng,
        writer: &mut OutputWriter,
    ) -> Result<()> {
        let depth = bucket.depth() + 1;
        if bucket.lines() <= 1 || depth > self.options.max_depth {
            return Err(NewlineError::ResourceExhausted {
                bytes: bucket.bytes(),
                budget: self.options.buffer_size,
                depth: bucket.depth(),
            });
        }

        let buckets = bucket_count(bucket.bytes(), self.options.buffer_size).max(2);
        info!(
            depth,
            bytes = bucket.bytes(),
            lines = bucket.lines(),
            buckets,
            "re-bucketing oversized bucket"
        );
        self.report.rebucketed += 1;
        self.report.max_depth_reached = self.report.max_depth_reached.max(depth);

        let mut store = BucketStore::new(
            buckets,
            self.limits(),
            depth,
            self.options.temp_dir.as_deref(),
        )?;
        let mut reader = bucket.reader()?;
        BucketAssigner::new(&mut *master, buckets).partition(
            &mut reader,
            &mut store,
            &mut self.gauge,
            &self.options.cancel,
        )?;
        drop(reader);
        drop(bucket);

        let sealed = store.seal(&mut self.gauge)?;
        self.recombine(sealed, master, writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::shuffle::shuffle_file;
    use std::fs;
    use tempfile::tempdir;

    fn numbered(n: usize) -> String {
        (0..n).map(|i| format!("Line {}\n", i)).collect()
    }

    fn sorted_lines(text: &str) -> Vec<String> {
        let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
        lines.sort();
        lines
    }

    fn seeded(buffer_size: u64, seed: u64) -> ShuffleOptions {
        ShuffleOptions {
            buffer_size,
            seed: Some(seed),
            ..Default::default()
        }
    }

    #[test]
    fn test_states_reach_done() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("input.txt");
        let output = dir.path().join("output.txt");
        fs::write(&input, numbered(100)).unwrap();

        let options = seeded(256, 1);
        let mut orchestrator = ShuffleOrchestrator::new(&input, &output, &options);
        assert_eq!(orchestrator.state(), ShuffleState::Init);

        let report = orchestrator.run().unwrap();
        assert_eq!(orchestrator.state(), ShuffleState::Done);
        assert_eq!(report.lines, 100);
        assert!(report.buckets > 1);
    }

    #[test]
    fn test_failure_sets_failed_state() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("missing.txt");
        let output = dir.path().join("output.txt");

        let options = ShuffleOptions::default();
        let mut orchestrator = ShuffleOrchestrator::new(&input, &output, &options);
        assert!(matches!(
            orchestrator.run(),
            Err(NewlineError::InputNotFound(_))
        ));
        assert_eq!(orchestrator.state(), ShuffleState::Failed);
    }

    #[test]
    fn test_same_seed_same_output() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("input.txt");
        let first = dir.path().join("first.txt");
        let second = dir.path().join("second.txt");
        fs::write(&input, numbered(2_000)).unwrap();

        shuffle_file(&input, &first, &seeded(1024, 99)).unwrap();
        shuffle_file(&input, &second, &seeded(1024, 99)).unwrap();

        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    }

    #[test]
    fn test_rebucketing_keeps_every_line() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("input.txt");
        let output = dir.path().join("output.txt");
        let text = numbered(5_000);
        fs::write(&input, &text).unwrap();

        // No slack: ordinary binomial variation pushes buckets over the limit
        let options = ShuffleOptions {
            buffer_size: 2_000,
            seed: Some(5),
            slack: 1.0,
            ..Default::default()
        };
        let report = shuffle_file(&input, &output, &options).unwrap();

        assert!(report.rebucketed > 0, "expected oversized buckets: {:?}", report);
        assert!(report.max_depth_reached >= 1);
        assert!(report.peak_resident_bytes <= 2_000 + 16);
        assert_eq!(
            sorted_lines(&fs::read_to_string(&output).unwrap()),
            sorted_lines(&text)
        );
    }

    #[test]
    fn test_unsplittable_line_exhausts_resources() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("input.txt");
        let output = dir.path().join("output.txt");
        let mut text = numbered(20);
        text.push_str(&"x".repeat(500));
        text.push('\n');
        fs::write(&input, &text).unwrap();

        let result = shuffle_file(&input, &output, &seeded(64, 3));
        assert!(matches!(
            result,
            Err(NewlineError::ResourceExhausted { budget: 64, .. })
        ));
        assert!(!output.exists());
    }

    #[test]
    fn test_depth_cap_exhausts_resources() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("input.txt");
        let output = dir.path().join("output.txt");
        fs::write(&input, numbered(5_000)).unwrap();

        let options = ShuffleOptions {
            buffer_size: 2_000,
            seed: Some(5),
            slack: 1.0,
            max_depth: 0,
            ..Default::default()
        };
        let result = shuffle_file(&input, &output, &options);
        assert!(matches!(
            result,
            Err(NewlineError::ResourceExhausted { depth: 0, .. })
        ));
        assert!(!output.exists());
    }

    #[test]
    fn test_cancelled_shuffle_cleans_up() {
        let dir = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let input = dir.path().join("input.txt");
        let output = dir.path().join("output.txt");
        fs::write(&input, numbered(1_000)).unwrap();

        let options = ShuffleOptions {
            buffer_size: 512,
            temp_dir: Some(scratch.path().to_path_buf()),
            ..Default::default()
        };
        options.cancel.cancel();

        let result = shuffle_file(&input, &output, &options);
        assert!(matches!(result, Err(NewlineError::Cancelled)));
        assert!(!output.exists());
        assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
        // Only the input remains next to the output
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_configuration_errors() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("input.txt");
        let output = dir.path().join("output.txt");
        fs::write(&input, numbered(3)).unwrap();

        let zero = ShuffleOptions {
            buffer_size: 0,
            ..Default::default()
        };
        let err = shuffle_file(&input, &output, &zero).unwrap_err();
        assert!(matches!(err, NewlineError::InvalidBufferSize(0)));
        assert!(err.is_configuration());

        let loose = ShuffleOptions {
            slack: 0.5,
            ..Default::default()
        };
        assert!(shuffle_file(&input, &output, &loose)
            .unwrap_err()
            .is_configuration());

        let err = shuffle_file(&input, &input, &ShuffleOptions::default()).unwrap_err();
        assert!(matches!(err, NewlineError::OutputIsInput(_)));
        assert_eq!(fs::read_to_string(&input).unwrap(), numbered(3));
    }

    #[test]
    fn test_overwrites_existing_output() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("input.txt");
        let output = dir.path().join("output.txt");
        fs::write(&input, "a\nb\n").unwrap();
        fs::write(&output, "stale content that is much longer than the input\n").unwrap();

        shuffle_file(&input, &output, &seeded(1024, 0)).unwrap();
        assert_eq!(
            sorted_lines(&fs::read_to_string(&output).unwrap()),
            vec!["a", "b"]
        );
    }

    #[test]
    fn test_unterminated_last_line_convention() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("input.txt");
        let output = dir.path().join("output.txt");
        fs::write(&input, "one\ntwo\nthree").unwrap();

        for seed in 0..10 {
            shuffle_file(&input, &output, &seeded(8, seed)).unwrap();
            let text = fs::read_to_string(&output).unwrap();
            assert!(!text.ends_with('\n'), "seed {}: {:?}", seed, text);
            assert_eq!(text.matches('\n').count(), 2);
            assert_eq!(sorted_lines(&text), vec!["one", "three", "two"]);
        }
    }

    #[test]
    fn test_unterminated_input_measured_in_source_bytes() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("input.txt");
        let output = dir.path().join("output.txt");

        // Each input's size equals the buffer, and its last line has no terminator
        let cases = [
            ("hello", 5, 1.0),
            ("a", 1, DEFAULT_SLACK),
            ("one\ntwo", 7, 1.0),
        ];
        for (text, buffer_size, slack) in cases {
            fs::write(&input, text).unwrap();
            let options = ShuffleOptions {
                buffer_size,
                seed: Some(0),
                slack,
                ..Default::default()
            };

            let report = shuffle_file(&input, &output, &options).unwrap();
            let shuffled = fs::read_to_string(&output).unwrap();
            assert_eq!(report.buckets, 1, "{:?}", text);
            assert_eq!(report.rebucketed, 0, "{:?}", text);
            assert_eq!(shuffled.len(), text.len());
            assert!(!shuffled.ends_with('\n'));
            assert_eq!(sorted_lines(&shuffled), sorted_lines(text));
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_unwritable_output_dir_is_configuration_error() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let input = dir.path().join("input.txt");
        let locked = dir.path().join("locked");
        fs::write(&input, "a\nb\n").unwrap();
        fs::create_dir(&locked).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();

        // Privileged users write through directory permissions
        if tempfile::tempfile_in(&locked).is_ok() {
            return;
        }

        let result = shuffle_file(&input, &locked.join("out.txt"), &ShuffleOptions::default());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let err = result.unwrap_err();
        assert!(matches!(err, NewlineError::OutputNotWritable(_)));
        assert!(err.is_configuration());
    }
}
