use super::cancel::CancelFlag;
use super::store::{BucketStore, ResidentGauge};
use crate::error::{NewlineError, Result};
use crate::lines::LineReader;
use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use std::io::BufRead;
use tracing::debug;

/// Number of buckets needed so each is expected to hold about `budget` bytes.
/// Never less than one.
pub fn bucket_count(estimated_bytes: u64, budget: u64) -> usize {
    if budget == 0 {
        return 1;
    }
    estimated_bytes.div_ceil(budget).max(1) as usize
}

/// Sends every line to a uniformly chosen bucket
pub struct BucketAssigner<R> {
    rng: R,
    buckets: Uniform<usize>,
    bucket_count: usize,
}

impl<R: Rng> BucketAssigner<R> {
    pub fn new(rng: R, bucket_count: usize) -> Self {
        let bucket_count = bucket_count.max(1);
        Self {
            rng,
            buckets: Uniform::new(0, bucket_count),
            bucket_count,
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    /// Draw the bucket for the next line
    pub fn assign(&mut self) -> usize {
        self.buckets.sample(&mut self.rng)
    }

    /// Single forward pass: every line read goes straight into its bucket.
    /// Returns the number of lines partitioned.
    pub fn partition<B: BufRead>(
        &mut self,
        reader: &mut LineReader<B>,
        store: &mut BucketStore,
        gauge: &mut ResidentGauge,
        cancel: &CancelFlag,
    ) -> Result<u64> {
        if store.bucket_count() != self.bucket_count {
            return Err(NewlineError::InvalidArgument(format!(
                "assigner draws from {} buckets but the store has {}",
                self.bucket_count,
                store.bucket_count()
            )));
        }

        let mut lines = 0u64;
        while let Some(line) = reader.next_line()? {
            let index = self.assign();
            store.append(index, line, gauge)?;
            lines += 1;
            cancel.check()?;
        }

        debug!(
            lines,
            buckets = self.bucket_count,
            spills = store.spills(),
            files_opened = store.files_opened(),
            "partition pass complete"
        );
        Ok(lines)
    }
}
