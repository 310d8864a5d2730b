use crate::error::{NewlineError, Result};
use crate::lines::{check_paths, count_lines, Line, LineReader, LineWriter};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// How sampled lines are chosen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleMethod {
    /// One pass, keeping `size` lines in memory (Algorithm R)
    #[default]
    Reservoir,
    /// Two passes: draw distinct line numbers, then copy them in input order
    Index,
}

impl FromStr for SampleMethod {
    type Err = NewlineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "reservoir" => Ok(Self::Reservoir),
            "index" => Ok(Self::Index),
            _ => Err(NewlineError::UnsupportedMethod(s.to_string())),
        }
    }
}

impl fmt::Display for SampleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reservoir => write!(f, "reservoir"),
            Self::Index => write!(f, "index"),
        }
    }
}

/// Uniform random sample of lines without replacement
pub struct Sample {
    input: PathBuf,
    output: PathBuf,
    size: u64,
}

impl Sample {
    pub fn new(input: &Path, output: &Path, size: u64) -> Self {
        Self {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            size,
        }
    }

    /// Write the sample and return the number of lines written.
    /// When `size` covers the whole input every line is written in input order.
    pub fn sample(&self, method: SampleMethod, seed: Option<u64>) -> Result<u64> {
        check_paths(&self.input, &self.output)?;

        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let written = match method {
            SampleMethod::Reservoir => self.reservoir(&mut rng)?,
            SampleMethod::Index => self.index(&mut rng)?,
        };
        debug!(%method, size = self.size, written, "sample complete");
        Ok(written)
    }

    fn reservoir(&self, rng: &mut StdRng) -> Result<u64> {
        let size = self.size as usize;
        let mut reader = LineReader::open(&self.input)?;
        let mut reservoir: Vec<(u64, Line)> = Vec::new();

        while let Some(line) = reader.next_line()? {
            let seen = reader.lines_read() - 1;
            if reservoir.len() < size {
                reservoir.push((seen, line));
            } else {
                let slot = rng.gen_range(0..=seen) as usize;
                if slot < size {
                    reservoir[slot] = (seen, line);
                }
            }
        }

        let last_index = reader.lines_read().checked_sub(1);
        let tail_kept = reader.unterminated_tail()
            && reservoir.iter().any(|(index, _)| Some(*index) == last_index);

        let mut writer = LineWriter::create(&self.output)?;
        for (_, line) in reservoir {
            writer.write_line(line)?;
        }
        let written = writer.lines_written();
        writer.finish(tail_kept)?;
        Ok(written)
    }

    fn index(&self, rng: &mut StdRng) -> Result<u64> {
        let total = count_lines(&self.input)?;
        let selected: Vec<u64> = if self.size >= total {
            (0..total).collect()
        } else {
            let mut picks: Vec<u64> =
                rand::seq::index::sample(rng, total as usize, self.size as usize)
                    .into_iter()
                    .map(|i| i as u64)
                    .collect();
            picks.sort_unstable();
            picks
        };

        let mut reader = LineReader::open(&self.input)?;
        let mut writer = LineWriter::create(&self.output)?;
        let mut wanted = selected.iter().peekable();
        let mut tail_kept = false;

        while let Some(&&next) = wanted.peek() {
            let Some(line) = reader.next_line()? else {
                break;
            };
            if reader.lines_read() - 1 == next {
                writer.write_line(line)?;
                wanted.next();
                tail_kept = reader.lines_read() == total;
            }
        }

        let written = writer.lines_written();
        writer.finish(tail_kept && reader.unterminated_tail())?;
        Ok(written)
    }
}
