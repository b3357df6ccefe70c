// SPDX-License-Identifier: MPL-2.0

//! A collection of [`Type`] implementations.

use crate::field::FieldElement;
use crate::flp::gadgets::{Mul, Range2};
use crate::flp::{try_from_usize, try_into_field_integer, FlpError, Gadget, Type};
use std::convert::TryFrom;
use std::fmt::{self, Debug};
use std::marker::PhantomData;
use std::mem::size_of;

/// The counter type. Each measurement is `0` or `1` and the aggregate result is the sum of the
/// measurements.
#[derive(Clone, PartialEq, Eq)]
pub struct Count<F> {
    phantom: PhantomData<F>,
}

impl<F> Count<F> {
    /// Return a new [`Count`] type instance.
    pub fn new() -> Self {
        Self {
            phantom: PhantomData,
        }
    }
}

impl<F> Default for Count<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> Debug for Count<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Count").finish()
    }
}

impl<F: FieldElement> Type for Count<F> {
    type Measurement = F::Integer;
    type AggregateResult = F::Integer;
    type Field = F;

    fn encode_measurement(&self, value: &F::Integer) -> Result<Vec<F>, FlpError> {
        let one = F::Integer::try_from(1).unwrap();
        if *value > one {
            return Err(FlpError::Encode(format!(
                "unexpected measurement: got {value:?}; want 0 or 1"
            )));
        }

        Ok(vec![F::from(*value)])
    }

    fn decode_result(&self, data: &[F]) -> Result<F::Integer, FlpError> {
        decode_result(data)
    }

    fn gadget(&self) -> Vec<Box<dyn Gadget<F>>> {
        vec![Box::new(Mul::new(1))]
    }

    fn valid(
        &self,
        g: &mut Vec<Box<dyn Gadget<F>>>,
        input: &[F],
        joint_rand: &[F],
        _num_shares: usize,
    ) -> Result<F, FlpError> {
        self.valid_call_check(input, joint_rand)?;
        Ok(g[0].call(&[input[0], input[0]])? - input[0])
    }

    fn truncate(&self, input: Vec<F>) -> Result<Vec<F>, FlpError> {
        self.truncate_call_check(&input)?;
        Ok(input)
    }

    fn input_len(&self) -> usize {
        1
    }

    fn output_len(&self) -> usize {
        1
    }

    fn joint_rand_len(&self) -> usize {
        0
    }
}

/// The sum type. Each measurement is an integer in `[0, 2^bits)` and the aggregate is the sum
/// of the measurements.
///
/// The measurement is encoded in binary, and the validity circuit checks that every "bit" of
/// the encoding is in fact a zero or a one. Each range check is blinded by a power of the joint
/// randomness so that a single circuit output covers all of them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sum<F: FieldElement> {
    bits: usize,
    phantom: PhantomData<F>,
}

impl<F: FieldElement> Sum<F> {
    /// Return a new [`Sum`] type parameter. Each value of this type is an integer in range
    /// `[0, 2^bits)`.
    pub fn new(bits: usize) -> Result<Self, FlpError> {
        if bits == 0 {
            return Err(FlpError::InvalidParameter(
                "bits cannot be zero".to_string(),
            ));
        }

        if bits >= size_of::<F::Integer>() << 3 {
            return Err(FlpError::InvalidParameter(
                "bit length exceeds the field's integer representation".to_string(),
            ));
        }

        let bits_int = try_into_field_integer::<F>(bits)?;
        if F::modulus() >> bits_int == F::Integer::from(F::zero()) {
            return Err(FlpError::InvalidParameter(
                "bit length exceeds the field modulus".to_string(),
            ));
        }

        Ok(Self {
            bits,
            phantom: PhantomData,
        })
    }
}

impl<F: FieldElement> Type for Sum<F> {
    type Measurement = F::Integer;
    type AggregateResult = F::Integer;
    type Field = F;

    fn encode_measurement(&self, summand: &F::Integer) -> Result<Vec<F>, FlpError> {
        let bits_int = try_into_field_integer::<F>(self.bits)?;
        let one = F::Integer::try_from(1).unwrap();
        if *summand >> bits_int != F::Integer::from(F::zero()) {
            return Err(FlpError::Encode(format!(
                "unexpected measurement: got {summand:?}; want an integer in [0, 2^{})",
                self.bits
            )));
        }

        // Little-endian bit decomposition of the measurement.
        let mut int = *summand;
        let mut encoded = Vec::with_capacity(self.bits);
        for _ in 0..self.bits {
            encoded.push(F::from(int & one));
            int = int >> one;
        }
        Ok(encoded)
    }

    fn decode_result(&self, data: &[F]) -> Result<F::Integer, FlpError> {
        decode_result(data)
    }

    fn gadget(&self) -> Vec<Box<dyn Gadget<F>>> {
        vec![Box::new(Range2::new(self.bits))]
    }

    fn valid(
        &self,
        g: &mut Vec<Box<dyn Gadget<F>>>,
        input: &[F],
        joint_rand: &[F],
        _num_shares: usize,
    ) -> Result<F, FlpError> {
        self.valid_call_check(input, joint_rand)?;

        // Each bit's range check is weighted by the next power of the joint randomness.
        let mut out = F::zero();
        let mut r = joint_rand[0];
        for bit in input.iter() {
            out += r * g[0].call(&[*bit])?;
            r *= joint_rand[0];
        }

        Ok(out)
    }

    fn truncate(&self, input: Vec<F>) -> Result<Vec<F>, FlpError> {
        self.truncate_call_check(&input)?;
        Ok(vec![decode_bitvector(&input)])
    }

    fn input_len(&self) -> usize {
        self.bits
    }

    fn output_len(&self) -> usize {
        1
    }

    fn joint_rand_len(&self) -> usize {
        1
    }
}

/// The histogram type. Each measurement is an unsigned integer and the aggregate is a histogram
/// counting the number of measurements that fall into each bucket. The bucket boundaries are
/// fixed in advance; a measurement falls into the first bucket whose boundary is at least the
/// measurement, or into the unbounded top bucket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Histogram<F: FieldElement> {
    buckets: Vec<F::Integer>,
}

impl<F: FieldElement> Histogram<F> {
    /// Return a new [`Histogram`] type with the given bucket boundaries.
    pub fn new(buckets: Vec<F::Integer>) -> Result<Self, FlpError> {
        if buckets.windows(2).any(|w| w[0] >= w[1]) {
            return Err(FlpError::InvalidParameter(
                "bucket boundaries must be sorted and distinct".to_string(),
            ));
        }

        Ok(Self { buckets })
    }
}

impl<F: FieldElement> Type for Histogram<F> {
    type Measurement = F::Integer;
    type AggregateResult = Vec<F::Integer>;
    type Field = F;

    fn encode_measurement(&self, measurement: &F::Integer) -> Result<Vec<F>, FlpError> {
        let bucket = self
            .buckets
            .iter()
            .position(|boundary| measurement <= boundary)
            .unwrap_or(self.buckets.len());

        let mut encoded = vec![F::zero(); self.input_len()];
        encoded[bucket] = F::one();
        Ok(encoded)
    }

    fn decode_result(&self, data: &[F]) -> Result<Vec<F::Integer>, FlpError> {
        if data.len() != self.output_len() {
            return Err(FlpError::Decode("unexpected input length".into()));
        }
        Ok(data.iter().map(|elem| F::Integer::from(*elem)).collect())
    }

    fn gadget(&self) -> Vec<Box<dyn Gadget<F>>> {
        vec![Box::new(Range2::new(self.input_len()))]
    }

    fn valid(
        &self,
        g: &mut Vec<Box<dyn Gadget<F>>>,
        input: &[F],
        joint_rand: &[F],
        num_shares: usize,
    ) -> Result<F, FlpError> {
        self.valid_call_check(input, joint_rand)?;

        // Check that each bucket of `input` is a zero or a one.
        let mut range_check = F::zero();
        let mut r = joint_rand[0];
        for bucket in input.iter() {
            range_check += r * g[0].call(&[*bucket])?;
            r *= joint_rand[0];
        }

        // Check that the buckets sum to one. The constant term is distributed across the
        // shares so that the per-share outputs sum to the output for the whole input.
        let mut sum_check = -try_from_usize::<F>(num_shares)?.inv();
        for bucket in input.iter() {
            sum_check += *bucket;
        }

        Ok(joint_rand[1] * range_check + joint_rand[1] * joint_rand[1] * sum_check)
    }

    fn truncate(&self, input: Vec<F>) -> Result<Vec<F>, FlpError> {
        self.truncate_call_check(&input)?;
        Ok(input)
    }

    fn input_len(&self) -> usize {
        self.buckets.len() + 1
    }

    fn output_len(&self) -> usize {
        self.input_len()
    }

    fn joint_rand_len(&self) -> usize {
        2
    }
}

// Decode a vector of field elements as the little-endian binary encoding of a single element.
fn decode_bitvector<F: FieldElement>(input: &[F]) -> F {
    let mut decoded = F::zero();
    let mut weight = F::one();
    for bit in input.iter() {
        decoded += weight * *bit;
        weight += weight;
    }
    decoded
}

fn decode_result<F: FieldElement>(data: &[F]) -> Result<F::Integer, FlpError> {
    if data.len() != 1 {
        return Err(FlpError::Decode("unexpected input length".into()));
    }
    Ok(F::Integer::from(data[0]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{Field128, Field64};
    use crate::flp::tests::run_flp;
    use assert_matches::assert_matches;

    #[test]
    fn test_count() {
        let typ: Count<Field64> = Count::new();

        assert_eq!(typ.encode_measurement(&0).unwrap(), [Field64::zero()]);
        assert_eq!(typ.encode_measurement(&1).unwrap(), [Field64::one()]);
        assert_matches!(typ.encode_measurement(&2), Err(FlpError::Encode(_)));

        // Lengths fixed by the single degree-2, arity-2 gadget called once.
        assert_eq!(typ.proof_len(), 5);
        assert_eq!(typ.verifier_len(), 4);
        assert_eq!(typ.prove_rand_len(), 2);
        assert_eq!(typ.query_rand_len(), 1);

        for measurement in [0, 1] {
            let input = typ.encode_measurement(&measurement).unwrap();
            assert!(run_flp(&typ, &input, 2).unwrap());
            assert_eq!(typ.truncate(input).unwrap(), [Field64::from(measurement)]);
        }

        assert!(!run_flp(&typ, &[Field64::from(1337)], 2).unwrap());
    }

    #[test]
    fn test_sum() {
        let typ: Sum<Field128> = Sum::new(8).unwrap();

        assert_matches!(
            Sum::<Field128>::new(0),
            Err(FlpError::InvalidParameter(_))
        );
        assert_matches!(typ.encode_measurement(&256), Err(FlpError::Encode(_)));

        // P = next_pow2(8 + 1) = 16.
        assert_eq!(typ.proof_len(), 1 + 2 * 15 + 1);
        assert_eq!(typ.verifier_len(), 3);
        assert_eq!(typ.prove_rand_len(), 1);
        assert_eq!(typ.query_rand_len(), 1);

        for measurement in [0u128, 1, 100, 255] {
            let input = typ.encode_measurement(&measurement).unwrap();
            assert_eq!(input.len(), 8);
            assert!(run_flp(&typ, &input, 2).unwrap());
            assert_eq!(typ.truncate(input).unwrap(), [Field128::from(measurement)]);
        }

        // An input with a non-bit entry is rejected.
        let mut input = typ.encode_measurement(&100).unwrap();
        input[3] = Field128::from(2);
        assert!(!run_flp(&typ, &input, 2).unwrap());
    }

    #[test]
    fn test_histogram() {
        let typ: Histogram<Field128> = Histogram::new(vec![1, 10, 100]).unwrap();

        assert_matches!(
            Histogram::<Field128>::new(vec![10, 10]),
            Err(FlpError::InvalidParameter(_))
        );
        assert_matches!(
            Histogram::<Field128>::new(vec![10, 1]),
            Err(FlpError::InvalidParameter(_))
        );

        assert_eq!(typ.input_len(), 4);
        // P = next_pow2(4 + 1) = 8.
        assert_eq!(typ.proof_len(), 1 + 2 * 7 + 1);
        assert_eq!(typ.verifier_len(), 3);
        assert_eq!(typ.joint_rand_len(), 2);

        // Bucket selection: first boundary at least the measurement; top bucket is unbounded.
        for (measurement, bucket) in [(0, 0), (1, 0), (2, 1), (10, 1), (50, 2), (101, 3)] {
            let input = typ.encode_measurement(&measurement).unwrap();
            let mut want = vec![Field128::zero(); 4];
            want[bucket] = Field128::one();
            assert_eq!(input, want);
            assert!(run_flp(&typ, &input, 2).unwrap());
        }

        // Inputs that are not one-hot are rejected.
        let zeroes = vec![Field128::zero(); 4];
        assert!(!run_flp(&typ, &zeroes, 2).unwrap());

        let mut two_hot = vec![Field128::zero(); 4];
        two_hot[1] = Field128::one();
        two_hot[3] = Field128::one();
        assert!(!run_flp(&typ, &two_hot, 2).unwrap());

        let mut out_of_range = vec![Field128::zero(); 4];
        out_of_range[2] = Field128::from(3);
        assert!(!run_flp(&typ, &out_of_range, 2).unwrap());

        // The sum check's `1/num_shares` term compensates for share-wise evaluation, so the
        // protocol accepts valid inputs for larger cohorts too.
        let input = typ.encode_measurement(&42).unwrap();
        for num_shares in [3, 5] {
            assert!(run_flp(&typ, &input, num_shares).unwrap());
        }
    }
}
