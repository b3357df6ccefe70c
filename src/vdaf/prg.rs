// SPDX-License-Identifier: MPL-2.0

//! Seed derivation and seed expansion.
//!
//! All pseudorandomness in the VDAF flows through a [`Prg`]: a short seed and a
//! domain-separation info string are turned into either another seed or an arbitrarily long
//! byte stream. Reads from the stream are cumulative, so requesting `a` bytes followed by `b`
//! bytes yields the same output as a single request for `a + b` bytes.

use crate::codec::{CodecError, Decode, Encode};
use aes::{
    cipher::{
        generic_array::GenericArray, FromBlockCipher, NewBlockCipher,
        StreamCipher as AesStreamCipher,
    },
    Aes128, Aes128Ctr,
};
use cmac::{Cmac, Mac, NewMac};
use std::{
    fmt::Debug,
    io::{Cursor, Read},
};

/// A source of random bytes, with the same shape as [`getrandom::getrandom`]. Deterministic
/// test hooks substitute a fixed pattern here to pin down entire protocol transcripts.
pub type RandSource = fn(&mut [u8]) -> Result<(), getrandom::Error>;

/// A fixed-size input to a [`Prg`].
#[derive(Clone, Debug, Eq)]
pub struct Seed<const L: usize>(pub(crate) [u8; L]);

impl<const L: usize> Seed<L> {
    /// Draw a fresh seed from the system's entropy source.
    pub fn generate() -> Result<Self, getrandom::Error> {
        Self::from_rand_source(getrandom::getrandom)
    }

    /// Draw a fresh seed from the given randomness source.
    pub(crate) fn from_rand_source(rand_source: RandSource) -> Result<Self, getrandom::Error> {
        let mut bytes = [0; L];
        rand_source(&mut bytes)?;
        Ok(Self(bytes))
    }

    /// The all-zero seed, the identity element for [`Self::xor`].
    pub(crate) fn zero() -> Self {
        Self([0; L])
    }

    /// Combine two seeds byte-wise by XOR.
    pub(crate) fn xor(&self, other: &Self) -> Self {
        let mut bytes = [0; L];
        for (out, (x, y)) in bytes.iter_mut().zip(self.0.iter().zip(other.0.iter())) {
            *out = x ^ y;
        }
        Self(bytes)
    }
}

impl<const L: usize> PartialEq for Seed<L> {
    fn eq(&self, other: &Self) -> bool {
        // Seed comparisons gate verification decisions, so inspect every byte instead of
        // stopping at the first mismatch.
        let mut diff = 0;
        for (x, y) in self.0.iter().zip(other.0.iter()) {
            diff |= x ^ y;
        }
        diff == 0
    }
}

impl<const L: usize> Encode for Seed<L> {
    fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&self.0);
    }

    fn encoded_len(&self) -> Option<usize> {
        Some(L)
    }
}

impl<const L: usize> Decode for Seed<L> {
    fn decode(bytes: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        let mut seed = Self::zero();
        bytes.read_exact(&mut seed.0)?;
        Ok(seed)
    }
}

/// An unbounded stream of pseudorandom bytes.
pub trait SeedStream {
    /// Write the next `buf.len()` bytes of the stream into `buf`.
    fn fill(&mut self, buf: &mut [u8]);
}

/// A pseudorandom generator keyed by a [`Seed`]. The generator absorbs an info string used
/// for domain separation, then is finalized into either a derived seed or a byte stream.
pub trait Prg<const L: usize>: Clone + Debug {
    /// The stream type this PRG expands into.
    type SeedStream: SeedStream;

    /// Key the PRG with `seed`.
    fn init(seed: &Seed<L>) -> Self;

    /// Absorb the next fragment of the info string. Fragmentation is immaterial: the output
    /// depends only on the concatenation of the fragments.
    fn update(&mut self, data: &[u8]);

    /// Finalize into the pseudorandom byte stream.
    fn into_seed_stream(self) -> Self::SeedStream;

    /// Finalize into a derived seed, taken from the front of the byte stream.
    fn into_seed(self) -> Seed<L> {
        let mut stream = self.into_seed_stream();
        let mut seed = Seed::zero();
        stream.fill(&mut seed.0);
        seed
    }

    /// Shorthand for keying the PRG with `seed`, absorbing `info`, and finalizing into a
    /// stream.
    fn seed_stream(seed: &Seed<L>, info: &[u8]) -> Self::SeedStream {
        let mut prg = Self::init(seed);
        prg.update(info);
        prg.into_seed_stream()
    }
}

/// The AES128-based PRG. The info string is absorbed by AES128-CMAC keyed with the seed, and
/// the resulting tag keys AES128 in CTR mode with a zero IV; the key stream is the output.
#[derive(Clone, Debug)]
pub struct PrgAes128(Cmac<Aes128>);

impl Prg<16> for PrgAes128 {
    type SeedStream = SeedStreamAes128;

    fn init(seed: &Seed<16>) -> Self {
        // A 16-byte CMAC key is always well-formed.
        Self(Cmac::new_from_slice(&seed.0).unwrap())
    }

    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn into_seed_stream(self) -> SeedStreamAes128 {
        let key = self.0.finalize().into_bytes();
        SeedStreamAes128::new(&key, &[0; 16])
    }
}

/// The key stream of AES128 running in CTR mode over a zero message.
pub struct SeedStreamAes128(Aes128Ctr);

impl SeedStreamAes128 {
    pub(crate) fn new(key: &[u8], iv: &[u8]) -> Self {
        let cipher = Aes128::new(GenericArray::from_slice(key));
        Self(Aes128Ctr::from_block_cipher(
            cipher,
            GenericArray::from_slice(iv),
        ))
    }
}

impl SeedStream for SeedStreamAes128 {
    fn fill(&mut self, buf: &mut [u8]) {
        // CTR mode XORs the key stream into the buffer, so clear it first to read the raw
        // stream.
        for byte in buf.iter_mut() {
            *byte = 0;
        }
        self.0.apply_keystream(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Reading the stream in two pieces produces the same bytes as reading it at once.
    #[test]
    fn stream_is_cumulative() {
        let seed = Seed::<16>::generate().unwrap();

        let mut whole = [0; 48];
        PrgAes128::seed_stream(&seed, b"info").fill(&mut whole);

        let mut pieces = [0; 48];
        let mut stream = PrgAes128::seed_stream(&seed, b"info");
        stream.fill(&mut pieces[..7]);
        stream.fill(&mut pieces[7..]);

        assert_eq!(whole, pieces);
    }

    #[test]
    fn seed_derivation_is_deterministic() {
        let seed = Seed::<16>::generate().unwrap();

        let mut prg = PrgAes128::init(&seed);
        prg.update(b"info");
        prg.update(b" string");
        let want = prg.into_seed();

        // Info string fragmentation must not matter.
        let mut prg = PrgAes128::init(&seed);
        prg.update(b"info string");
        assert_eq!(prg.into_seed(), want);

        let mut prg = PrgAes128::init(&seed);
        prg.update(b"another string");
        assert_ne!(prg.into_seed(), want);
    }

    #[test]
    fn seed_codec() {
        let seed = Seed::<16>::generate().unwrap();
        let bytes = seed.get_encoded();
        assert_eq!(bytes.len(), 16);
        assert_eq!(Seed::get_decoded(&bytes).unwrap(), seed);
    }

    #[test]
    fn seed_xor() {
        let left = Seed::<16>([1; 16]);
        let right = Seed::<16>([3; 16]);

        assert_eq!(left.xor(&right), Seed([2; 16]));
        assert_eq!(left.xor(&Seed::zero()), left);
        assert_eq!(left.xor(&left), Seed::zero());
    }
}
