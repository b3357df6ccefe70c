// SPDX-License-Identifier: MPL-2.0

//! This module provides wrappers around internal components of this crate that we want to
//! benchmark, but which we don't want to expose in the public API.

use crate::fft::discrete_fourier_transform;
use crate::field::FieldElement;
use crate::prng::Prng;
use crate::vdaf::prg::{Prg, PrgAes128, Seed};

/// Sets `outp` to the Discrete Fourier Transform (DFT) of `inp`.
pub fn benchmarked_iterative_fft<F: FieldElement>(outp: &mut [F], inp: &[F]) {
    discrete_fourier_transform(outp, inp, inp.len()).unwrap();
}

/// Expand a seed into a vector of `len` pseudorandom field elements.
pub fn benchmarked_prng_expand<F: FieldElement>(seed: &Seed<16>, len: usize) -> Vec<F> {
    Prng::from_seed_stream(PrgAes128::seed_stream(seed, b"bench"))
        .take(len)
        .collect()
}
