// SPDX-License-Identifier: MPL-2.0

//! Tool for generating pseudorandom field elements.
//!
//! `Prng` expands a seed stream into a sequence of field elements by rejection sampling: the
//! stream is consumed one encoded-element-sized chunk at a time, the chunk is decoded as a
//! little-endian integer, bits above the modulus bit length are masked off, and the candidate is
//! kept only if it is less than the modulus. The output is a deterministic function of the seed
//! stream.

use crate::field::FieldElement;
use crate::vdaf::prg::{Prg, PrgAes128, Seed, SeedStream, SeedStreamAes128};
use std::marker::PhantomData;

const BUFFER_SIZE_IN_ELEMENTS: usize = 128;

/// Errors propagated by methods in this module.
#[derive(Debug, thiserror::Error)]
pub enum PrngError {
    /// Failure when calling getrandom().
    #[error("getrandom: {0}")]
    GetRandom(#[from] getrandom::Error),
}

/// This type implements an iterator that generates a pseudorandom sequence of field elements. The
/// sequence is derived from a seed stream by rejection sampling.
pub(crate) struct Prng<F, S> {
    phantom: PhantomData<F>,
    seed_stream: S,
    buffer: Vec<u8>,
    buffer_index: usize,
}

impl<F: FieldElement> Prng<F, SeedStreamAes128> {
    /// Create a [`Prng`] from a freshly generated seed.
    pub(crate) fn new() -> Result<Self, PrngError> {
        let seed = Seed::generate()?;
        Ok(Self::from_seed_stream(PrgAes128::seed_stream(&seed, b"")))
    }
}

impl<F, S> Prng<F, S>
where
    F: FieldElement,
    S: SeedStream,
{
    /// Create a [`Prng`] from a seed stream.
    pub(crate) fn from_seed_stream(mut seed_stream: S) -> Self {
        let mut buffer = vec![0; BUFFER_SIZE_IN_ELEMENTS * F::ENCODED_SIZE];
        seed_stream.fill(&mut buffer);

        Self {
            phantom: PhantomData,
            seed_stream,
            buffer,
            buffer_index: 0,
        }
    }
}

impl<F, S> Iterator for Prng<F, S>
where
    F: FieldElement,
    S: SeedStream,
{
    type Item = F;

    fn next(&mut self) -> Option<F> {
        loop {
            if self.buffer_index + F::ENCODED_SIZE > self.buffer.len() {
                self.seed_stream.fill(&mut self.buffer);
                self.buffer_index = 0;
            }

            let chunk = &self.buffer[self.buffer_index..self.buffer_index + F::ENCODED_SIZE];
            self.buffer_index += F::ENCODED_SIZE;

            match F::try_from_random(chunk) {
                Ok(x) => return Some(x),
                Err(crate::field::FieldError::ModulusOverflow) => continue, // reject this sample
                Err(err) => panic!("unexpected error: {err}"),
            }
        }
    }
}
