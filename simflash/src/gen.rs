//! Image generation.
//!
//! Seeded pseudo-random firmware payloads for tests.  A fixed seed gives a
//! reproducible image, so a test can regenerate the same bytes it flashed
//! and compare.

use rand::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;

pub struct GeneratedImage {
    pub data: Vec<u8>,
}

pub struct GenBuilder {
    /// Total size of the image in bytes.
    size: usize,
    /// Seed for the PRNG.
    seed: u64,
}

impl Default for GenBuilder {
    fn default() -> Self {
        GenBuilder {
            size: 12_000,
            seed: 1,
        }
    }
}

impl GenBuilder {
    pub fn size(&mut self, size: usize) -> &mut Self {
        self.size = size;
        self
    }

    pub fn seed(&mut self, seed: u64) -> &mut Self {
        self.seed = seed;
        self
    }

    pub fn build(&self) -> GeneratedImage {
        let mut rng = Xoshiro256Plus::seed_from_u64(self.seed);
        let mut data = vec![0u8; self.size];
        rng.fill_bytes(&mut data);
        GeneratedImage { data }
    }
}

#[cfg(test)]
mod tests {
    use super::GenBuilder;

    #[test]
    fn same_seed_same_image() {
        let a = GenBuilder::default().size(5000).seed(7).build();
        let b = GenBuilder::default().size(5000).seed(7).build();
        assert_eq!(a.data, b.data);
    }

    #[test]
    fn different_seed_different_image() {
        let a = GenBuilder::default().size(5000).seed(7).build();
        let b = GenBuilder::default().size(5000).seed(8).build();
        assert_ne!(a.data, b.data);
    }
}
