// SPDX-License-Identifier: MPL-2.0

//! Finite field arithmetic.
//!
//! Each field carries a "generator" of a multiplicative subgroup of order
//! `2^n` for some `n`, which supplies the roots of unity the FFT layer
//! interpolates over. Elements encode as fixed-width little-endian byte
//! strings; vectors of elements encode as the concatenation of their
//! elements' encodings.

use crate::{
    codec::{CodecError, Decode, Encode},
    fp::{FieldOps, FieldParameters, FP128, FP32, FP64},
    prng::{Prng, PrngError},
};
use serde::{
    de::{DeserializeOwned, Visitor},
    Deserialize, Deserializer, Serialize, Serializer,
};
use std::{
    cmp::min,
    convert::TryFrom,
    fmt::{self, Debug, Display, Formatter},
    hash::Hash,
    io::{Cursor, Read},
    marker::PhantomData,
    ops::{Add, AddAssign, BitAnd, Div, DivAssign, Mul, MulAssign, Neg, Shl, Shr, Sub, SubAssign},
};

/// Possible errors from finite field operations.
#[derive(Debug, thiserror::Error)]
pub enum FieldError {
    /// Input sizes do not match.
    #[error("input sizes do not match")]
    InputSizeMismatch,
    /// Returned when decoding a `FieldElement` from a byte string that is too short.
    #[error("short read from bytes")]
    ShortRead,
    /// Returned when decoding a `FieldElement` from a byte string that encodes an integer greater
    /// than or equal to the field modulus.
    #[error("read from byte slice exceeds modulus")]
    ModulusOverflow,
}

/// Objects with this trait represent an element of `GF(p)` for some prime `p`.
pub trait FieldElement:
    Sized
    + Debug
    + Copy
    + PartialEq
    + Eq
    + Hash
    + Add<Output = Self>
    + AddAssign
    + Sub<Output = Self>
    + SubAssign
    + Mul<Output = Self>
    + MulAssign
    + Div<Output = Self>
    + DivAssign
    + Neg<Output = Self>
    + Display
    + From<<Self as FieldElement>::Integer>
    + for<'a> TryFrom<&'a [u8], Error = FieldError>
    // NOTE Ideally we would require `Into<[u8; Self::ENCODED_SIZE]>` instead of `Into<Vec<u8>>`,
    // since the former avoids a heap allocation, but that isn't expressible yet[1]. The
    // implementations provide the array conversion themselves.
    // [1]: https://github.com/rust-lang/rust/issues/60551
    + Into<Vec<u8>>
    + Encode
    + Decode
    + Serialize
    + DeserializeOwned
    + 'static // NOTE This bound is needed for downcasting a `dyn Gadget<F>` to a concrete type.
{
    /// Size in bytes of an encoded field element.
    const ENCODED_SIZE: usize;

    /// The error returned if converting `usize` to an `Integer` fails.
    type IntegerTryFromError: std::error::Error;

    /// The integer representation of a field element.
    type Integer: Copy
        + Debug
        + Eq
        + Ord
        + BitAnd<Output = <Self as FieldElement>::Integer>
        + Div<Output = <Self as FieldElement>::Integer>
        + Shl<Output = <Self as FieldElement>::Integer>
        + Shr<Output = <Self as FieldElement>::Integer>
        + Sub<Output = <Self as FieldElement>::Integer>
        + From<Self>
        + TryFrom<usize, Error = Self::IntegerTryFromError>;

    /// Modular exponentiation, i.e., `self^exp (mod p)`.
    fn pow(&self, exp: Self::Integer) -> Self;

    /// Modular inversion, i.e., `self^-1 (mod p)`. If `self` is 0, then the output is undefined.
    fn inv(&self) -> Self;

    /// Returns the prime modulus `p`.
    fn modulus() -> Self::Integer;

    /// Interprets the next [`Self::ENCODED_SIZE`] bytes from the input slice as an element of the
    /// field. The `m` most significant bits are cleared, where `m` is equal to the length of
    /// [`Self::Integer`] in bits minus the length of the modulus in bits.
    ///
    /// # Errors
    ///
    /// An error is returned if the provided slice is too small to encode a field element or if the
    /// masked integer is greater than or equal to the field modulus. The latter is how the
    /// rejection-sampling PRNG discards candidates, so its probability depends only on the
    /// distance between the modulus and the next power of two.
    ///
    /// # Warnings
    ///
    /// This function should only be used to convert pseudorandom byte strings into field
    /// elements. Use [`Decode::decode`] to deserialize field elements.
    #[doc(hidden)]
    fn try_from_random(bytes: &[u8]) -> Result<Self, FieldError>;

    /// Returns the size of the multiplicative subgroup generated by `generator()`.
    fn generator_order() -> Self::Integer;

    /// Returns the generator of the multiplicative subgroup of size `generator_order()`.
    fn generator() -> Self;

    /// Returns the `2^l`-th principal root of unity for any `l <= 20`. Note that the `2^0`-th
    /// principal root of unity is 1 by definition.
    fn root(l: usize) -> Option<Self>;

    /// Returns the additive identity.
    fn zero() -> Self;

    /// Returns the multiplicative identity.
    fn one() -> Self;

    /// Convert a slice of field elements into a vector of bytes.
    ///
    /// # Notes
    ///
    /// Ideally we would implement `From<&[F: FieldElement]> for Vec<u8>`, but the orphan rule and
    /// the stdlib's blanket implementations of `Into` make this impossible.
    fn slice_into_byte_vec(values: &[Self]) -> Vec<u8> {
        let mut vec = Vec::with_capacity(values.len() * Self::ENCODED_SIZE);
        for elem in values {
            vec.append(&mut (*elem).into());
        }
        vec
    }

    /// Convert a slice of bytes into a vector of field elements. The slice is interpreted as a
    /// sequence of [`Self::ENCODED_SIZE`]-byte sequences.
    ///
    /// # Errors
    ///
    /// Returns an error if the length of the provided byte slice is not a multiple of the size of
    /// a field element, or if any of the chunks is an invalid encoding.
    fn byte_slice_into_vec(bytes: &[u8]) -> Result<Vec<Self>, FieldError> {
        if bytes.len() % Self::ENCODED_SIZE != 0 {
            return Err(FieldError::ShortRead);
        }
        let mut vec = Vec::with_capacity(bytes.len() / Self::ENCODED_SIZE);
        for chunk in bytes.chunks_exact(Self::ENCODED_SIZE) {
            vec.push(Self::try_from(chunk)?);
        }
        Ok(vec)
    }
}

/// serde Visitor implementation used to generically deserialize `FieldElement`
/// values from byte arrays.
struct FieldElementVisitor<F: FieldElement> {
    phantom: PhantomData<F>,
}

impl<'de, F: FieldElement> Visitor<'de> for FieldElementVisitor<F> {
    type Value = F;

    fn expecting(&self, formatter: &mut Formatter) -> fmt::Result {
        formatter.write_fmt(format_args!("an array of {} bytes", F::ENCODED_SIZE))
    }

    fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Self::Value::try_from(v).map_err(E::custom)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: serde::de::SeqAccess<'de>,
    {
        let mut bytes = vec![];
        while let Some(byte) = seq.next_element()? {
            bytes.push(byte);
        }

        self.visit_bytes(&bytes)
    }
}

macro_rules! make_field {
    (
        $(#[$meta:meta])*
        $elem:ident, $int:ident, $fp:ident, $encoding_size:literal,
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
        pub struct $elem($int);

        impl $elem {
            /// Attempts to instantiate an `$elem` from the first `Self::ENCODED_SIZE` bytes in
            /// the provided slice, interpreted as a little-endian integer. The decoded value is
            /// bitwise-ANDed with `mask` before checking it against the field modulus.
            ///
            /// # Errors
            ///
            /// An error is returned if the provided slice is not long enough to encode a field
            /// element or if the masked value is greater than or equal to the field modulus.
            fn try_from_bytes(bytes: &[u8], mask: $int) -> Result<Self, FieldError> {
                if Self::ENCODED_SIZE > bytes.len() {
                    return Err(FieldError::ShortRead);
                }

                let mut buf = [0; Self::ENCODED_SIZE];
                buf.copy_from_slice(&bytes[..Self::ENCODED_SIZE]);
                let int = $int::from_le_bytes(buf) & mask;

                if int >= $fp::PRIME {
                    return Err(FieldError::ModulusOverflow);
                }
                Ok(Self($fp::montgomery(int)))
            }
        }

        impl Add for $elem {
            type Output = $elem;
            fn add(self, rhs: Self) -> Self {
                Self($fp::add(self.0, rhs.0))
            }
        }

        impl Add for &$elem {
            type Output = $elem;
            fn add(self, rhs: Self) -> $elem {
                *self + *rhs
            }
        }

        impl AddAssign for $elem {
            fn add_assign(&mut self, rhs: Self) {
                *self = *self + rhs;
            }
        }

        impl Sub for $elem {
            type Output = $elem;
            fn sub(self, rhs: Self) -> Self {
                Self($fp::sub(self.0, rhs.0))
            }
        }

        impl Sub for &$elem {
            type Output = $elem;
            fn sub(self, rhs: Self) -> $elem {
                *self - *rhs
            }
        }

        impl SubAssign for $elem {
            fn sub_assign(&mut self, rhs: Self) {
                *self = *self - rhs;
            }
        }

        impl Mul for $elem {
            type Output = $elem;
            fn mul(self, rhs: Self) -> Self {
                Self($fp::mul(self.0, rhs.0))
            }
        }

        impl Mul for &$elem {
            type Output = $elem;
            fn mul(self, rhs: Self) -> $elem {
                *self * *rhs
            }
        }

        impl MulAssign for $elem {
            fn mul_assign(&mut self, rhs: Self) {
                *self = *self * rhs;
            }
        }

        impl Div for $elem {
            type Output = $elem;
            #[allow(clippy::suspicious_arithmetic_impl)]
            fn div(self, rhs: Self) -> Self {
                self * rhs.inv()
            }
        }

        impl Div for &$elem {
            type Output = $elem;
            fn div(self, rhs: Self) -> $elem {
                *self / *rhs
            }
        }

        impl DivAssign for $elem {
            fn div_assign(&mut self, rhs: Self) {
                *self = *self / rhs;
            }
        }

        impl Neg for $elem {
            type Output = $elem;
            fn neg(self) -> Self {
                Self($fp::neg(self.0))
            }
        }

        impl Neg for &$elem {
            type Output = $elem;
            fn neg(self) -> $elem {
                -(*self)
            }
        }

        impl From<$int> for $elem {
            fn from(x: $int) -> Self {
                Self($fp::montgomery(x % $fp::PRIME))
            }
        }

        impl From<$elem> for $int {
            fn from(x: $elem) -> Self {
                $fp::residue(x.0)
            }
        }

        impl PartialEq<$int> for $elem {
            fn eq(&self, rhs: &$int) -> bool {
                $fp::residue(self.0) == *rhs
            }
        }

        impl<'a> TryFrom<&'a [u8]> for $elem {
            type Error = FieldError;

            fn try_from(bytes: &[u8]) -> Result<Self, FieldError> {
                Self::try_from_bytes(bytes, $int::MAX)
            }
        }

        impl From<$elem> for [u8; $elem::ENCODED_SIZE] {
            fn from(elem: $elem) -> Self {
                $fp::residue(elem.0).to_le_bytes()
            }
        }

        impl From<$elem> for Vec<u8> {
            fn from(elem: $elem) -> Self {
                <[u8; $elem::ENCODED_SIZE]>::from(elem).to_vec()
            }
        }

        impl Display for $elem {
            fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
                write!(f, "{}", $fp::residue(self.0))
            }
        }

        impl Debug for $elem {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", $fp::residue(self.0))
            }
        }

        impl Encode for $elem {
            fn encode(&self, bytes: &mut Vec<u8>) {
                let slice = <[u8; $elem::ENCODED_SIZE]>::from(*self);
                bytes.extend_from_slice(&slice);
            }

            fn encoded_len(&self) -> Option<usize> {
                Some(Self::ENCODED_SIZE)
            }
        }

        impl Decode for $elem {
            fn decode(bytes: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
                let mut value = [0u8; $elem::ENCODED_SIZE];
                bytes.read_exact(&mut value)?;
                $elem::try_from(value.as_slice()).map_err(|err| {
                    CodecError::Other(Box::new(err) as Box<dyn std::error::Error + Send + Sync>)
                })
            }
        }

        // We provide custom [`serde::Serialize`] and [`serde::Deserialize`] implementations
        // because the derived implementations would represent `FieldElement` values as the
        // backing integer, which is not what we want because (1) we can be more compact and (2)
        // [some serializers don't support `u128`](https://github.com/serde-rs/json/issues/625).
        impl Serialize for $elem {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let bytes: [u8; $elem::ENCODED_SIZE] = (*self).into();
                serializer.serialize_bytes(&bytes)
            }
        }

        impl<'de> Deserialize<'de> for $elem {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<$elem, D::Error> {
                deserializer.deserialize_bytes(FieldElementVisitor { phantom: PhantomData })
            }
        }

        impl FieldElement for $elem {
            const ENCODED_SIZE: usize = $encoding_size;
            type Integer = $int;
            type IntegerTryFromError = <Self::Integer as TryFrom<usize>>::Error;

            fn pow(&self, exp: Self::Integer) -> Self {
                Self($fp::pow(self.0, exp))
            }

            fn inv(&self) -> Self {
                Self($fp::inv(self.0))
            }

            fn modulus() -> Self::Integer {
                $fp::PRIME
            }

            fn try_from_random(bytes: &[u8]) -> Result<Self, FieldError> {
                $elem::try_from_bytes(bytes, $fp::BIT_MASK)
            }

            fn generator() -> Self {
                Self($fp::G)
            }

            fn generator_order() -> Self::Integer {
                (1 as $int) << $fp::NUM_ROOTS
            }

            fn root(l: usize) -> Option<Self> {
                if l < min($fp::ROOTS.len(), $fp::NUM_ROOTS + 1) {
                    Some(Self($fp::ROOTS[l]))
                } else {
                    None
                }
            }

            fn zero() -> Self {
                Self(0)
            }

            fn one() -> Self {
                Self($fp::ROOTS[0])
            }
        }
    };
}

make_field!(
    /// `GF(4293918721)`, a 32-bit field. Defined for use in small-scale tests; not used by the
    /// standard VDAF instantiations.
    Field32,
    u32,
    FP32,
    4,
);

make_field!(
    /// `GF(18446744069414584321)`, a 64-bit field.
    Field64,
    u64,
    FP64,
    8,
);

make_field!(
    /// `GF(340282366920938462946865773367900766209)`, a 128-bit field.
    Field128,
    u128,
    FP128,
    16,
);

/// Merge two vectors of field elements by summing `other_vector` into `accumulator`.
///
/// # Errors
///
/// Fails if the two vectors do not have the same length.
pub(crate) fn merge_vector<F: FieldElement>(
    accumulator: &mut [F],
    other_vector: &[F],
) -> Result<(), FieldError> {
    if accumulator.len() != other_vector.len() {
        return Err(FieldError::InputSizeMismatch);
    }
    for (a, o) in accumulator.iter_mut().zip(other_vector.iter()) {
        *a += *o;
    }

    Ok(())
}

/// Subtract `other_vector` element-wise from `accumulator`.
///
/// # Errors
///
/// Fails if the two vectors do not have the same length.
pub(crate) fn sub_vector<F: FieldElement>(
    accumulator: &mut [F],
    other_vector: &[F],
) -> Result<(), FieldError> {
    if accumulator.len() != other_vector.len() {
        return Err(FieldError::InputSizeMismatch);
    }
    for (a, o) in accumulator.iter_mut().zip(other_vector.iter()) {
        *a -= *o;
    }

    Ok(())
}

/// Compute the inner product of two vectors of field elements.
///
/// # Errors
///
/// Fails if the two vectors do not have the same length.
pub fn inner_product<F: FieldElement>(left: &[F], right: &[F]) -> Result<F, FieldError> {
    if left.len() != right.len() {
        return Err(FieldError::InputSizeMismatch);
    }

    let mut out = F::zero();
    for (x, y) in left.iter().zip(right.iter()) {
        out += *x * *y;
    }
    Ok(out)
}

/// Outputs an additive secret sharing of the input.
#[cfg(test)]
pub(crate) fn split_vector<F: FieldElement>(
    inp: &[F],
    num_shares: usize,
) -> Result<Vec<Vec<F>>, PrngError> {
    if num_shares == 0 {
        return Ok(vec![]);
    }

    let mut outp = Vec::with_capacity(num_shares);
    outp.push(inp.to_vec());

    for _ in 1..num_shares {
        let share: Vec<F> = random_vector(inp.len())?;
        for (x, y) in outp[0].iter_mut().zip(&share) {
            *x -= *y;
        }
        outp.push(share);
    }

    Ok(outp)
}

/// Generate a vector of uniformly distributed random field elements.
pub fn random_vector<F: FieldElement>(len: usize) -> Result<Vec<F>, PrngError> {
    Ok(Prng::new()?.take(len).collect())
}

/// Decode the next `count` field elements from the cursor.
pub(crate) fn decode_fieldvec<F: FieldElement>(
    count: usize,
    input: &mut Cursor<&[u8]>,
) -> Result<Vec<F>, CodecError> {
    let mut vec = Vec::with_capacity(count);
    for _ in 0..count {
        vec.push(F::decode(input)?);
    }
    Ok(vec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fp::MAX_ROOTS;
    use assert_matches::assert_matches;

    #[test]
    fn test_endianness() {
        let encoded: [u8; Field32::ENCODED_SIZE] = Field32::from(0x12_34_56_78).into();
        assert_eq!(encoded, [0x78, 0x56, 0x34, 0x12]);
    }

    #[test]
    fn test_accumulate() {
        let mut lhs = vec![Field32::from(1); 10];
        let rhs = vec![Field32::from(2); 10];

        merge_vector(&mut lhs, &rhs).unwrap();

        lhs.iter().for_each(|f| assert_eq!(*f, Field32::from(3)));
        rhs.iter().for_each(|f| assert_eq!(*f, Field32::from(2)));

        let wrong_len = vec![Field32::zero(); 9];
        let result = merge_vector(&mut lhs, &wrong_len);
        assert_matches!(result, Err(FieldError::InputSizeMismatch));

        sub_vector(&mut lhs, &rhs).unwrap();
        lhs.iter().for_each(|f| assert_eq!(*f, Field32::from(1)));
        assert_matches!(
            sub_vector(&mut lhs, &wrong_len),
            Err(FieldError::InputSizeMismatch)
        );
    }

    #[test]
    fn test_inner_product() {
        let lhs: Vec<Field64> = vec![1.into(), 2.into(), 3.into()];
        let rhs: Vec<Field64> = vec![4.into(), 5.into(), 6.into()];
        assert_eq!(inner_product(&lhs, &rhs).unwrap(), Field64::from(32));

        assert_matches!(
            inner_product(&lhs, &rhs[..2]),
            Err(FieldError::InputSizeMismatch)
        );
    }

    #[test]
    fn test_split() {
        let data: Vec<Field64> = random_vector(7).unwrap();
        let mut shares = split_vector(&data, 3).unwrap();
        assert_eq!(shares.len(), 3);

        let mut accumulator = shares.pop().unwrap();
        for share in shares.iter() {
            assert_ne!(share, &data);
            merge_vector(&mut accumulator, share).unwrap();
        }
        assert_eq!(accumulator, data);
    }

    // Some checks in this function, like `assert_eq!(one - one, zero)`, trip the clippy lint for
    // tautological comparisons, but we have a legitimate need to verify these basics.
    #[allow(clippy::eq_op)]
    fn field_element_test<F: FieldElement>() {
        let elems: Vec<F> = random_vector(200).unwrap();
        let int_modulus = F::modulus();
        let int_one = F::Integer::try_from(1).unwrap();
        let zero = F::zero();
        let one = F::one();
        let two = F::from(F::Integer::try_from(2).unwrap());
        let four = F::from(F::Integer::try_from(4).unwrap());

        // add
        assert_eq!(F::from(int_modulus - int_one) + one, zero);
        assert_eq!(one + one, two);

        // sub
        assert_eq!(zero - one, F::from(int_modulus - int_one));
        assert_eq!(one - one, zero);
        assert_eq!(one - F::from(int_modulus - int_one), two);

        // add + sub
        for chunk in elems.chunks_exact(2) {
            let (f, g) = (chunk[0], chunk[1]);
            assert_eq!(f + g - f - g, zero);
            assert_eq!(f + g - g, f);
            assert_eq!(f + g - f, g);
        }

        // mul
        assert_eq!(two * two, four);
        assert_eq!(two * one, two);
        assert_eq!(two * zero, zero);

        // div
        assert_eq!(four / two, two);
        assert_eq!(two / two, one);
        assert_eq!(zero / two, zero);
        assert_eq!(two / zero, zero); // Undefined behavior
        assert_eq!(zero.inv(), zero); // Undefined behavior

        // mul + div
        for f in elems.iter() {
            if *f == zero {
                continue;
            }
            assert_eq!(*f * f.inv(), one);
            assert_eq!(f.inv() * *f, one);
        }

        // pow
        assert_eq!(two.pow(F::Integer::try_from(0).unwrap()), one);
        assert_eq!(two.pow(int_one), two);
        assert_eq!(two.pow(F::Integer::try_from(2).unwrap()), four);
        assert_eq!(two.pow(int_modulus - int_one), one);

        // roots
        let mut int_order = F::generator_order();
        for l in 0..MAX_ROOTS + 1 {
            assert_eq!(
                F::generator().pow(int_order),
                F::root(l).unwrap(),
                "failure for F::root({l})"
            );
            int_order = int_order >> int_one;
        }

        // serialization
        let test_inputs = vec![zero, one, elems[0], F::from(int_modulus - int_one)];
        for want in test_inputs.iter() {
            let bytes: Vec<u8> = (*want).into();

            assert_eq!(bytes.len(), F::ENCODED_SIZE);
            assert_eq!(want.encoded_len().unwrap(), F::ENCODED_SIZE);

            let got = F::get_decoded(&bytes).unwrap();
            assert_eq!(got, *want);
            assert_eq!(want.get_encoded(), bytes);
        }

        let serialized_vec = F::slice_into_byte_vec(&test_inputs);
        let deserialized = F::byte_slice_into_vec(&serialized_vec).unwrap();
        assert_eq!(deserialized, test_inputs);

        // a partial chunk is rejected
        let result = F::byte_slice_into_vec(&serialized_vec[..serialized_vec.len() - 1]);
        assert_matches!(result, Err(FieldError::ShortRead));

        // serde round trip
        for want in test_inputs.iter() {
            let json = serde_json::to_string(want).unwrap();
            let got: F = serde_json::from_str(&json).unwrap();
            assert_eq!(got, *want);
        }
    }

    #[test]
    fn test_field32() {
        field_element_test::<Field32>();
    }

    #[test]
    fn test_field64() {
        field_element_test::<Field64>();
    }

    #[test]
    fn test_field128() {
        field_element_test::<Field128>();
    }
}
