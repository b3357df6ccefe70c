// SPDX-License-Identifier: MPL-2.0

//! Finite field arithmetic over GF(p) for primes `p < 2^128`.
//!
//! Elements are kept in the Montgomery domain. Each parameter set fixes the prime, the
//! Montgomery constants, and a table of principal roots of unity of power-of-two order, which
//! the FFT layer consumes. Multiplication comes in two flavors, selected per parameter set:
//! one for word sizes with a primitive double-width type and one that works in half-word
//! limbs.

use num_traits::{
    ops::overflowing::{OverflowingAdd, OverflowingSub},
    AsPrimitive, ConstOne, ConstZero, PrimInt, Unsigned, WrappingAdd, WrappingMul, WrappingSub,
};

/// For each parameter set we pre-compute the 1st, 2nd, 4th, ..., 2^20-th principal roots of
/// unity. The largest of these supports an NTT over inputs of size 2^20, the largest input the
/// proof system ever interpolates over.
pub(crate) const MAX_ROOTS: usize = 20;

/// The machine word in which field elements are stored and operated on.
///
/// Implemented by `u32`, `u64`, and `u128`.
pub(crate) trait Word:
    'static
    + Unsigned
    + PrimInt
    + OverflowingAdd
    + OverflowingSub
    + WrappingAdd
    + WrappingSub
    + WrappingMul
    + ConstZero
    + ConstOne
    + From<bool>
{
    /// Word size in bits.
    const BITS: usize;
}

impl Word for u32 {
    const BITS: usize = Self::BITS as usize;
}

impl Word for u64 {
    const BITS: usize = Self::BITS as usize;
}

impl Word for u128 {
    const BITS: usize = Self::BITS as usize;
}

/// Parameters of a prime field GF(p) whose modulus fits in one `W`-bit word.
pub(crate) trait FieldParameters<W: Word> {
    /// The prime modulus `p`.
    const PRIME: W;
    /// `-p^(-1) mod b`, where `b` is the base the REDC rounds reduce by (`2^LOG2_BASE`).
    const MU: W;
    /// The square of the Montgomery radix, reduced mod p. Multiplying by `R2` maps an integer
    /// into the Montgomery domain.
    const R2: W;
    /// Generator of the subgroup of order `2^NUM_ROOTS`, in the Montgomery domain.
    const G: W;
    /// Base-2 logarithm of the order of `G`.
    const NUM_ROOTS: usize;
    /// All-ones mask of the same bit length as `p`, used for rejection sampling.
    const BIT_MASK: W;
    /// `ROOTS[l]` is a principal root of unity of order `2^l`, obtained by repeatedly
    /// squaring `G`. `ROOTS[0]` is one by definition.
    const ROOTS: [W; MAX_ROOTS + 1];
    /// Base-2 logarithm of the base used for multiprecision arithmetic. At most 64, since
    /// processors multiply at most 64-bit integers.
    #[cfg(test)]
    const LOG2_BASE: usize;
    /// Base-2 logarithm of the Montgomery radix `R`.
    #[cfg(test)]
    const LOG2_RADIX: usize;
}

/// Arithmetic over GF(p). Everything except multiplication is word-size agnostic and provided
/// here; multiplication depends on whether a product of two words fits in a primitive
/// integer.
pub(crate) trait FieldOps<W: Word>: FieldParameters<W> {
    /// Addition. The result is in [0, p) so long as both operands are.
    #[inline(always)]
    fn add(x: W, y: W) -> W {
        let (sum, carried) = x.overflowing_add(&y);

        // Subtract p, then keep the unreduced sum only if the subtraction borrowed more than
        // the addition carried. Both outcomes are computed so the choice costs a mask, not a
        // branch.
        let (reduced, borrowed) = sum.overflowing_sub(&Self::PRIME);
        let (_, keep_sum) =
            <W as From<bool>>::from(carried).overflowing_sub(&<W as From<bool>>::from(borrowed));
        let mask = W::ZERO.wrapping_sub(&<W as From<bool>>::from(keep_sum));
        (sum & mask) | (reduced & !mask)
    }

    /// Subtraction. The result is in [0, p) so long as both operands are.
    #[inline(always)]
    fn sub(x: W, y: W) -> W {
        let (diff, borrowed) = x.overflowing_sub(&y);
        // Add p back when the subtraction wrapped below zero.
        let mask = W::ZERO.wrapping_sub(&<W as From<bool>>::from(borrowed));
        diff.wrapping_add(&(mask & Self::PRIME))
    }

    /// Negation, i.e., `-x (mod p)`.
    #[inline(always)]
    fn neg(x: W) -> W {
        Self::sub(W::ZERO, x)
    }

    /// Conditional final subtraction of `p`, mapping [0, 2p) to [0, p).
    #[inline(always)]
    fn modp(x: W) -> W {
        Self::sub(x, Self::PRIME)
    }

    /// Multiplication of Montgomery-domain elements. The result is in [0, p).
    fn mul(x: W, y: W) -> W;

    /// Modular exponentiation, i.e., `x^exp (mod p)`. Runtime is linear in the bit length of
    /// `exp`.
    fn pow(x: W, exp: W) -> W {
        // Square-and-multiply, scanning the exponent from its highest set bit down.
        let mut out = Self::ROOTS[0];
        for bit in (0..W::BITS - (exp.leading_zeros() as usize)).rev() {
            out = Self::mul(out, out);
            if (exp >> bit) & W::ONE == W::ONE {
                out = Self::mul(out, x);
            }
        }
        out
    }

    /// Modular inversion, i.e., `x^-1 (mod p)`, computed as `x^(p-2)`. Runtime is linear in
    /// the bit length of `p`.
    #[inline(always)]
    fn inv(x: W) -> W {
        Self::pow(x, Self::PRIME - W::ONE - W::ONE)
    }

    /// Maps an integer in [0, p) to the Montgomery domain.
    #[inline(always)]
    fn montgomery(x: W) -> W {
        Self::modp(Self::mul(x, Self::R2))
    }

    /// Maps a Montgomery-domain element back to its integer residue in [0, p).
    #[inline(always)]
    fn residue(x: W) -> W {
        Self::modp(Self::mul(x, W::ONE))
    }
}

/// Montgomery multiplication ([REDC]) for moduli whose word has a primitive double-width
/// type, so the full product fits in `Self::DoubleWord`.
///
/// [REDC]: https://www.ams.org/journals/mcom/1985-44-170/S0025-5718-1985-0777282-X/S0025-5718-1985-0777282-X.pdf
pub(crate) trait SingleWordMul<W>: FieldParameters<W>
where
    W: Word + AsPrimitive<Self::DoubleWord>,
{
    type DoubleWord: Word + AsPrimitive<W>;

    fn mul(x: W, y: W) -> W {
        let wide_split = |v: Self::DoubleWord| -> (W, W) { ((v >> W::BITS).as_(), v.as_()) };

        // Full double-width product.
        let (hi, lo) = wide_split(x.as_() * y.as_());

        // One REDC round: adding q*p with q = lo * mu mod 2^W zeroes the low word, so
        // dividing by the radix is just dropping that word.
        let q = Self::MU.wrapping_mul(&lo);
        let (qp_hi, qp_lo) = wide_split(Self::PRIME.as_() * q.as_());
        let (_, carried) = lo.overflowing_add(&qp_lo);
        let (top, mid) =
            wide_split(hi.as_() + qp_hi.as_() + <Self::DoubleWord as From<bool>>::from(carried));

        // `mid`, plus a possible carry bit in `top`, is in [0, 2p); fold it into [0, p)
        // without branching on the value.
        let (reduced, borrowed) = mid.overflowing_sub(&Self::PRIME);
        let (_, keep_mid) = top.overflowing_sub(&<W as From<bool>>::from(borrowed));
        let mask = W::ZERO.wrapping_sub(&<W as From<bool>>::from(keep_mid));
        (mid & mask) | (reduced & !mask)
    }
}

/// Montgomery multiplication ([REDC]) for moduli whose word has no primitive double-width
/// type. The product is accumulated from half-word limbs.
///
/// [REDC]: https://www.ams.org/journals/mcom/1985-44-170/S0025-5718-1985-0777282-X/S0025-5718-1985-0777282-X.pdf
pub(crate) trait SplitWordMul<W>: FieldParameters<W>
where
    W: Word + AsPrimitive<Self::HalfWord>,
{
    type HalfWord: Word + AsPrimitive<W>;
    const MU: Self::HalfWord;

    fn mul(x: W, y: W) -> W {
        let half = W::BITS / 2;
        let limb_mask = (W::ONE << half) - W::ONE;
        let lo = |v: W| v & limb_mask;
        let hi = |v: W| v >> half;

        // Add `val` into the limb at `idx`, rippling the carry upward. Limbs stay below
        // 2^(W/2), so the sums below never overflow a word.
        let add_limb = |acc: &mut [W; 5], mut idx: usize, mut val: W| {
            while val != W::ZERO {
                let t = acc[idx] + val;
                acc[idx] = lo(t);
                val = hi(t);
                idx += 1;
            }
        };

        // Schoolbook product of the half-word limbs of x and y. The total stays below
        // 2^(2W+1), so the top limb only ever holds a carry bit.
        let mut acc = [W::ZERO; 5];
        let (x1, x0) = (hi(x), lo(x));
        let (y1, y0) = (hi(y), lo(y));
        for &(idx, a, b) in [(0, x0, y0), (1, x0, y1), (1, x1, y0), (2, x1, y1)].iter() {
            let t = a * b;
            add_limb(&mut acc, idx, lo(t));
            add_limb(&mut acc, idx + 1, hi(t));
        }

        // Two REDC rounds, one per low limb: adding q*p with q = acc[round] * mu mod 2^(W/2)
        // zeroes that limb, so the division by the radix is a plain limb shift.
        let (p1, p0) = (hi(Self::PRIME), lo(Self::PRIME));
        for round in 0..2 {
            let q: W = <Self as SplitWordMul<W>>::MU
                .wrapping_mul(&acc[round].as_())
                .as_();
            for &(idx, p_limb) in [(round, p0), (round + 1, p1)].iter() {
                let t = p_limb * q;
                add_limb(&mut acc, idx, lo(t));
                add_limb(&mut acc, idx + 1, hi(t));
            }
        }

        // The reduced value lives in the upper limbs and is in [0, 2p); fold it into [0, p)
        // without branching on the value.
        let z = acc[2] | (acc[3] << half);
        let (reduced, borrowed) = z.overflowing_sub(&Self::PRIME);
        let (_, keep_z) = acc[4].overflowing_sub(&<W as From<bool>>::from(borrowed));
        let mask = W::ZERO.wrapping_sub(&<W as From<bool>>::from(keep_z));
        (z & mask) | (reduced & !mask)
    }
}

macro_rules! impl_single_word_mul {
    ($params:ident, $W:ty, $W2:ty) => {
        const _: () = assert!(<$W2>::BITS == 2 * <$W>::BITS);
        impl $crate::fp::SingleWordMul<$W> for $params {
            type DoubleWord = $W2;
        }
        impl $crate::fp::FieldOps<$W> for $params {
            #[inline(always)]
            fn mul(x: $W, y: $W) -> $W {
                <Self as $crate::fp::SingleWordMul<_>>::mul(x, y)
            }
        }
    };
}

macro_rules! impl_split_word_mul {
    ($params:ident, $W:ty, $W2:ty) => {
        const _: () = assert!(2 * <$W2>::BITS == <$W>::BITS);
        impl $crate::fp::SplitWordMul<$W> for $params {
            type HalfWord = $W2;
            const MU: Self::HalfWord = {
                let mu = <$params as FieldParameters<$W>>::MU;
                assert!(mu <= (<$W2>::MAX as $W));
                mu as $W2
            };
        }
        impl $crate::fp::FieldOps<$W> for $params {
            #[inline(always)]
            fn mul(x: $W, y: $W) -> $W {
                <Self as $crate::fp::SplitWordMul<_>>::mul(x, y)
            }
        }
    };
}

/// Parameters for GF(p) with `p` fitting in a u32 word.
pub(crate) struct FP32;

impl_single_word_mul!(FP32, u32, u64);

impl FieldParameters<u32> for FP32 {
    const PRIME: u32 = 4293918721;
    const MU: u32 = 4293918719;
    const R2: u32 = 266338049;
    const G: u32 = 3903828692;
    const NUM_ROOTS: usize = 20;
    const BIT_MASK: u32 = 4294967295;
    const ROOTS: [u32; MAX_ROOTS + 1] = [
        1048575, 4292870146, 1189722990, 3984864191, 2523259768, 2828840154, 1658715539,
        1534972560, 3732920810, 3229320047, 2836564014, 2170197442, 3760663902, 2144268387,
        3849278021, 1395394315, 574397626, 125025876, 3755041587, 2680072542, 3903828692,
    ];
    #[cfg(test)]
    const LOG2_BASE: usize = 32;
    #[cfg(test)]
    const LOG2_RADIX: usize = 32;
}

/// Parameters for GF(p) with `p` fitting in a u64 word.
pub(crate) struct FP64;

impl_single_word_mul!(FP64, u64, u128);

impl FieldParameters<u64> for FP64 {
    const PRIME: u64 = 18446744069414584321;
    const MU: u64 = 18446744069414584319;
    const R2: u64 = 18446744065119617025;
    const G: u64 = 15733474329512464024;
    const NUM_ROOTS: usize = 32;
    const BIT_MASK: u64 = 18446744073709551615;
    const ROOTS: [u64; MAX_ROOTS + 1] = [
        4294967295,
        18446744065119617026,
        18446744069414518785,
        18374686475393433601,
        268435456,
        18446673700670406657,
        18446744069414584193,
        576460752303421440,
        16576810576923738718,
        6647628942875889800,
        10087739294013848503,
        2135208489130820273,
        10781050935026037169,
        3878014442329970502,
        1205735313231991947,
        2523909884358325590,
        13797134855221748930,
        12267112747022536458,
        430584883067102937,
        10135969988448727187,
        6815045114074884550,
    ];
    #[cfg(test)]
    const LOG2_BASE: usize = 64;
    #[cfg(test)]
    const LOG2_RADIX: usize = 64;
}

/// Parameters for GF(p) with `p` fitting in a u128 word.
pub(crate) struct FP128;

impl_split_word_mul!(FP128, u128, u64);

impl FieldParameters<u128> for FP128 {
    const PRIME: u128 = 340282366920938462946865773367900766209;
    const MU: u128 = 18446744073709551615;
    const R2: u128 = 403909908237944342183153;
    const G: u128 = 107630958476043550189608038630704257141;
    const NUM_ROOTS: usize = 66;
    const BIT_MASK: u128 = 340282366920938463463374607431768211455;
    const ROOTS: [u128; MAX_ROOTS + 1] = [
        516508834063867445247,
        340282366920938462430356939304033320962,
        129526470195413442198896969089616959958,
        169031622068548287099117778531474117974,
        81612939378432101163303892927894236156,
        122401220764524715189382260548353967708,
        199453575871863981432000940507837456190,
        272368408887745135168960576051472383806,
        24863773656265022616993900367764287617,
        257882853788779266319541142124730662203,
        323732363244658673145040701829006542956,
        57532865270871759635014308631881743007,
        149571414409418047452773959687184934208,
        177018931070866797456844925926211239962,
        268896136799800963964749917185333891349,
        244556960591856046954834420512544511831,
        118945432085812380213390062516065622346,
        202007153998709986841225284843501908420,
        332677126194796691532164818746739771387,
        258279638927684931537542082169183965856,
        148221243758794364405224645520862378432,
    ];
    #[cfg(test)]
    const LOG2_BASE: usize = 64;
    #[cfg(test)]
    const LOG2_RADIX: usize = 128;
}

/// Compute the ceiling of the base-2 logarithm of `x`.
pub(crate) fn log2(x: u128) -> u128 {
    let floor = (127 - x.leading_zeros()) as u128;
    floor + ((x > 1 << floor) as u128)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Debug;
    use modinverse::modinverse;
    use num_bigint::{BigInt, ToBigInt};
    use num_traits::AsPrimitive;
    use rand::{
        distributions::{Distribution, Uniform},
        thread_rng, Rng,
    };

    #[test]
    fn test_log2() {
        assert_eq!(log2(1), 0);
        assert_eq!(log2(2), 1);
        assert_eq!(log2(5), 3);
        assert_eq!(log2(8), 3);
        assert_eq!(log2(9), 4);
        assert_eq!(log2(1 << 20), 20);
        assert_eq!(log2((1 << 20) + 1), 21);
        assert_eq!(log2(u128::MAX), 128);
        assert_eq!(log2(1 << 127), 127);
    }

    // Cross-check a parameter set against bignum arithmetic: the declared constants first,
    // then the word operations on randomized inputs.
    fn field_ops_test<T, W>(expected_p: W, expected_g: W, log2_order: usize)
    where
        T: FieldOps<W>,
        W: Word + AsPrimitive<u128> + ToBigInt + for<'a> TryFrom<&'a BigInt> + Debug,
        for<'a> <W as TryFrom<&'a BigInt>>::Error: Debug,
    {
        let p = T::PRIME.as_();
        let big_p = p.to_bigint().unwrap();

        assert_eq!(T::PRIME, expected_p, "prime mismatch");
        assert_eq!(T::NUM_ROOTS, log2_order, "subgroup order mismatch");

        // The generator has order 2^log2_order, and no smaller power-of-two order.
        assert_eq!(T::G, T::montgomery(expected_g), "generator mismatch");
        assert_eq!(T::residue(T::pow(T::G, W::ONE << log2_order)), W::ONE);
        assert_ne!(
            T::residue(T::pow(T::G, W::ONE << (log2_order / 2))),
            W::ONE
        );

        // mu = -p^(-1) mod 2^LOG2_BASE.
        let base = 1i128 << T::LOG2_BASE;
        let mu = modinverse((-(p as i128)).rem_euclid(base), base)
            .expect("-p has no inverse modulo the base");
        assert_eq!(T::MU.as_(), mu as u128, "mu mismatch");

        // r2 = R^2 mod p for the Montgomery radix R.
        let big_r = (BigInt::from(1) << T::LOG2_RADIX) % &big_p;
        assert_eq!(
            T::R2.to_bigint().unwrap(),
            (&big_r * &big_r) % &big_p,
            "r2 mismatch"
        );

        // The root table is the square chain of the generator, ending at one.
        let mut root = T::G;
        for l in (0..=log2_order).rev() {
            if l <= MAX_ROOTS {
                assert_eq!(T::ROOTS[l], root, "root {l} mismatch");
            }
            root = T::mul(root, root);
        }
        assert_eq!(T::residue(T::ROOTS[0]), W::ONE, "first root is not one");

        // The bit mask spans exactly the bit length of p.
        assert_eq!(
            T::BIT_MASK.to_bigint().unwrap(),
            (BigInt::from(1) << big_p.bits()) - 1,
            "bit mask mismatch"
        );

        // Compare the word arithmetic against bignum arithmetic, biasing the inputs towards
        // values near the modulus, the mask, and the limb boundaries.
        let mut edge_cases = vec![
            0u128,
            1,
            p - 1,
            T::BIT_MASK.as_() - p,
            T::BIT_MASK.as_() - p + 1,
        ];
        if p > u64::MAX as u128 {
            edge_cases.extend([
                u64::MAX as u128,
                1 << 64,
                p & u64::MAX as u128,
                p & !(u64::MAX as u128),
                p & !(u64::MAX as u128) | 1,
            ]);
        }

        let uniform = Uniform::from(0..p);
        let mut rng = thread_rng();
        let mut draw = || {
            let int = if rng.gen_ratio(1, 3) {
                edge_cases[rng.gen_range(0..edge_cases.len())]
            } else {
                uniform.sample(&mut rng)
            };
            let big = int.to_bigint().unwrap();
            (T::montgomery(W::try_from(&big).unwrap()), big)
        };

        let big_zero = BigInt::from(0);
        for _ in 0..1000 {
            let (x, big_x) = draw();
            let (y, big_y) = draw();

            assert_eq!(
                T::residue(T::add(x, y)).to_bigint().unwrap(),
                (&big_x + &big_y) % &big_p
            );
            assert_eq!(
                T::residue(T::sub(x, y)).to_bigint().unwrap(),
                ((&big_x - &big_y) % &big_p + &big_p) % &big_p
            );
            assert_eq!(
                T::residue(T::neg(x)).to_bigint().unwrap(),
                (&big_p - &big_x) % &big_p
            );
            assert_eq!(
                T::residue(T::mul(x, y)).to_bigint().unwrap(),
                (&big_x * &big_y) % &big_p
            );

            let inv = T::inv(x);
            assert_eq!(
                T::residue(inv).to_bigint().unwrap(),
                big_x.modpow(&(&big_p - BigInt::from(2)), &big_p)
            );
            if big_x == big_zero {
                assert_eq!(T::residue(T::mul(inv, x)), W::ZERO);
            } else {
                assert_eq!(T::residue(T::mul(inv, x)), W::ONE);
            }
        }
    }

    #[test]
    fn check_fp32_parameters() {
        field_ops_test::<FP32, u32>(4293918721, 3925978153, 20);
    }

    #[test]
    fn check_fp64_parameters() {
        field_ops_test::<FP64, u64>(18446744069414584321, 1753635133440165772, 32);
    }

    #[test]
    fn check_fp128_parameters() {
        field_ops_test::<FP128, u128>(
            340282366920938462946865773367900766209,
            145091266659756586618791329697897684742,
            66,
        );
    }
}
