use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Fisher–Yates shuffle in place.
/// Walks from the last position down, swapping each with a uniform pick from
/// `[0, i]`. `gen_range` rejection-samples, so there is no modulo bias.
pub fn shuffle_in_place<T, R: Rng + ?Sized>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}

/// Uniform shuffler for sequences that already fit in memory
pub struct InMemoryShuffler {
    rng: StdRng,
}

impl InMemoryShuffler {
    /// Deterministic shuffler; the same seed always yields the same orderings
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Shuffler seeded from OS entropy
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        shuffle_in_place(items, &mut self.rng);
    }

    /// Draw a random permutation of `0..n`
    pub fn permutation(&mut self, n: usize) -> Vec<usize> {
        let mut permutation: Vec<usize> = (0..n).collect();
        self.shuffle(&mut permutation);
        permutation
    }
}
