//! Newline Tools - line-oriented file utilities
//!
//! Treats a text file as a sequence of `\n`-terminated records and provides
//! shuffling, splitting, deduplication, sampling and counting over it.
//!
//! ## External Shuffle
//!
//! Files larger than memory are shuffled in two phases under a byte budget:
//!
//! ```text
//! Input → Partition (uniform random bucket per line) → Spill → Drain bucket → Fisher–Yates → Output
//! ```
//!
//! - **Partition**: `ceil(size / budget)` buckets, each line assigned independently
//! - **Spill**: bucket buffers move to temporary files whenever the budget fills
//! - **Drain**: buckets are loaded one at a time; oversized ones are re-partitioned
//! - **Output**: staged next to the destination and renamed into place
//!
//! ## Example
//!
//! ```no_run
//! use newline_tools::cli::{dedupe_file, shuffle_file, Split};
//! use newline_tools::shuffle::ShuffleOptions;
//! use std::path::Path;
//!
//! // Shuffle with a 16 MiB budget
//! let options = ShuffleOptions {
//!     buffer_size: 16 << 20,
//!     seed: Some(7),
//!     ..Default::default()
//! };
//! shuffle_file(Path::new("corpus.txt"), Path::new("shuffled.txt"), &options).unwrap();
//!
//! // Drop repeated lines
//! dedupe_file(Path::new("shuffled.txt"), Path::new("unique.txt")).unwrap();
//!
//! // Train/validation/test split
//! Split::new(Path::new("unique.txt"), None)
//!     .unwrap()
//!     .split_by_proportion(&[0.8, 0.1, 0.1])
//!     .unwrap();
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod lines;
pub mod shuffle;

pub use error::{NewlineError, Result};
pub use lines::{count_lines, estimate_size_bytes, Line, LineReader, LineWriter};
pub use shuffle::{CancelFlag, ShuffleOptions, ShuffleOrchestrator, ShuffleReport, ShuffleState};
