// SPDX-License-Identifier: MPL-2.0

//! Implementation of the generic Fully Linear Proof (FLP) system specified in
//! \[[BBCG+19](https://ia.cr/2019/188), Theorem 4.3\].
//!
//! The proof system is comprised of three algorithms. The first, [`Type::prove`], is run by the
//! prover in order to generate a proof of a statement's validity. The second and third,
//! [`Type::query`] and [`Type::decide`], are run by the verifier in order to check the proof.
//! In our setting the statement is that an encoded measurement satisfies the validity circuit of
//! some [`Type`].
//!
//! The types of statements that can be proven are arithmetic circuits over a finite field in
//! which all non-affine operations are isolated in a distinguished sub-circuit, called the
//! "gadget", that is invoked some fixed number of times. During proof generation, the inputs
//! wired into each gadget invocation are interpolated into "wire polynomials" over a grid of
//! roots of unity, and the gadget identity applied to the wire polynomials yields the "gadget
//! polynomial" that makes up the bulk of the proof. The verifier spot-checks the gadget
//! polynomial at a random point, which is sound because the polynomial has low degree.
//!
//! Crucially, everything the verifier computes from the input and proof up to the final
//! [`Type::decide`] call is a *linear* function of the pair (input, proof). Queries can
//! therefore be run over additive secret shares of the input and proof, and the resulting
//! verifier shares sum up to the verifier message for the underlying input. This is the
//! property the Prio3 VDAF relies on to validate submissions it only ever sees in shares.

pub mod gadgets;
pub mod types;

use crate::fft::{discrete_fourier_transform, discrete_fourier_transform_inv_finish, FftError};
use crate::field::{FieldElement, FieldError};
use crate::fp::log2;
use crate::polynomial::poly_eval;
use std::any::Any;
use std::convert::TryFrom;
use std::fmt::Debug;

/// Errors propagated by methods in this module.
#[derive(Debug, thiserror::Error)]
pub enum FlpError {
    /// Calling [`Type::encode_measurement`] returned an error, e.g., because the measurement was
    /// out of range.
    #[error("encode error: {0}")]
    Encode(String),

    /// Calling [`Type::decode_result`] returned an error.
    #[error("decode error: {0}")]
    Decode(String),

    /// Calling [`Type::truncate`] returned an error.
    #[error("truncate error: {0}")]
    Truncate(String),

    /// Calling a validity circuit returned an error.
    #[error("validity circuit error: {0}")]
    Valid(String),

    /// Calling [`Type::query`] returned an error.
    #[error("query error: {0}")]
    Query(String),

    /// Calling [`Type::decide`] returned an error.
    #[error("decide error: {0}")]
    Decide(String),

    /// The query randomness coincides with a point on the wire-polynomial interpolation grid.
    /// Evaluating the proof there would leak a gadget output, so the session must be retried
    /// with fresh query randomness.
    #[error("query aborted: {0}")]
    Abort(&'static str),

    /// Calling a gadget returned an error.
    #[error("gadget error: {0}")]
    Gadget(String),

    /// A [`Type`] was instantiated with an invalid parameter.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Returned if an FFT operation propagates an error.
    #[error("FFT error: {0}")]
    Fft(#[from] FftError),

    /// Returned if a field operation encountered an error.
    #[error("field error: {0}")]
    Field(#[from] FieldError),
}

/// The sub-circuit associated with some validity circuit. A gadget is called either on a
/// sequence of field elements or, during proof generation, on a sequence of wire polynomials.
pub trait Gadget<F: FieldElement>: Debug {
    /// Evaluates the gadget on input `inp` and returns the output.
    fn call(&mut self, inp: &[F]) -> Result<F, FlpError>;

    /// Evaluate the gadget on a sequence of polynomials, writing the coefficients of the output
    /// polynomial into `outp`.
    fn call_poly(&mut self, outp: &mut [F], inp: &[Vec<F>]) -> Result<(), FlpError>;

    /// Returns the arity of the gadget, i.e., the expected length of the input to `call`.
    fn arity(&self) -> usize;

    /// Returns the circuit's arithmetic degree, which bounds the degree of the output of
    /// `call_poly` relative to its inputs.
    fn degree(&self) -> usize;

    /// Returns the number of times the gadget is called by the validity circuit.
    fn calls(&self) -> usize;

    /// This call is used to downcast a `Box<dyn Gadget<F>>` to a concrete type.
    fn as_any(&mut self) -> &mut dyn Any;
}

/// A validity circuit and the measurement encoding that goes with it.
///
/// An instance of `Type` fixes the field, the gadgets, and the circuit [`Type::valid`] that
/// decides whether an encoded measurement is well formed. The provided methods implement the
/// proof system for the circuit.
pub trait Type: Sized + Eq + Clone + Debug {
    /// The type of raw measurement being aggregated.
    type Measurement: Clone + Debug;

    /// The type of aggregate result for this type.
    type AggregateResult: Clone + Debug;

    /// The field used for this type.
    type Field: FieldElement;

    /// Encodes a measurement as a vector of [`Self::input_len`] field elements.
    fn encode_measurement(
        &self,
        measurement: &Self::Measurement,
    ) -> Result<Vec<Self::Field>, FlpError>;

    /// Decodes an aggregate result.
    fn decode_result(&self, data: &[Self::Field]) -> Result<Self::AggregateResult, FlpError>;

    /// Returns the sequence of gadgets associated with the validity circuit.
    fn gadget(&self) -> Vec<Box<dyn Gadget<Self::Field>>>;

    /// Evaluates the validity circuit on an input and returns the output: zero if the input is
    /// valid, non-zero (with high probability over the joint randomness) otherwise.
    ///
    /// When the input is an additive secret share, `num_shares` is the total number of shares;
    /// circuits use it to distribute constant terms so that the outputs of the per-share
    /// evaluations sum up to the output for the whole input.
    fn valid(
        &self,
        gadgets: &mut Vec<Box<dyn Gadget<Self::Field>>>,
        input: &[Self::Field],
        joint_rand: &[Self::Field],
        num_shares: usize,
    ) -> Result<Self::Field, FlpError>;

    /// Constructs an aggregatable output from an encoded input. Calling this method is only safe
    /// once the input has been validated.
    fn truncate(&self, input: Vec<Self::Field>) -> Result<Vec<Self::Field>, FlpError>;

    /// The length in field elements of the encoded input returned by
    /// [`Self::encode_measurement`].
    fn input_len(&self) -> usize;

    /// The length in field elements of the output of [`Self::truncate`].
    fn output_len(&self) -> usize;

    /// The length in field elements of the random input consumed by the validity circuit.
    fn joint_rand_len(&self) -> usize;

    /// The length in field elements of the random input consumed by the prover: one wire seed
    /// per gadget input wire.
    fn prove_rand_len(&self) -> usize {
        self.gadget().iter().map(|g| g.arity()).sum()
    }

    /// The length in field elements of the random input consumed by the verifier: one
    /// evaluation point per gadget.
    fn query_rand_len(&self) -> usize {
        self.gadget().len()
    }

    /// The length in field elements of the proof generated for this type.
    fn proof_len(&self) -> usize {
        self.gadget()
            .iter()
            .map(|g| {
                let p = (1 + g.calls()).next_power_of_two();
                g.arity() + g.degree() * (p - 1) + 1
            })
            .sum()
    }

    /// The length in field elements of the verifier message constructed by [`Self::query`].
    fn verifier_len(&self) -> usize {
        1 + self
            .gadget()
            .iter()
            .map(|g| 1 + g.arity())
            .sum::<usize>()
    }

    /// Check whether `input` and `joint_rand` have the length expected by `valid`.
    fn valid_call_check(
        &self,
        input: &[Self::Field],
        joint_rand: &[Self::Field],
    ) -> Result<(), FlpError> {
        if input.len() != self.input_len() {
            return Err(FlpError::Valid(format!(
                "unexpected input length: got {}; want {}",
                input.len(),
                self.input_len(),
            )));
        }

        if joint_rand.len() != self.joint_rand_len() {
            return Err(FlpError::Valid(format!(
                "unexpected joint randomness length: got {}; want {}",
                joint_rand.len(),
                self.joint_rand_len()
            )));
        }

        Ok(())
    }

    /// Check if the length of `input` matches the length expected by [`Self::truncate`].
    fn truncate_call_check(&self, input: &[Self::Field]) -> Result<(), FlpError> {
        if input.len() != self.input_len() {
            return Err(FlpError::Truncate(format!(
                "unexpected input length: got {}; want {}",
                input.len(),
                self.input_len()
            )));
        }

        Ok(())
    }

    /// Generate a proof of an input's validity. The proof is the concatenation, over the
    /// gadgets, of the wire-polynomial seeds followed by the coefficients of the gadget
    /// polynomial. High-order coefficients that happen to be zero are serialized explicitly:
    /// the proof length is fixed by [`Self::proof_len`].
    fn prove(
        &self,
        input: &[Self::Field],
        prove_rand: &[Self::Field],
        joint_rand: &[Self::Field],
    ) -> Result<Vec<Self::Field>, FlpError> {
        if prove_rand.len() != self.prove_rand_len() {
            return Err(FlpError::Valid(format!(
                "unexpected prove randomness length: got {}; want {}",
                prove_rand.len(),
                self.prove_rand_len()
            )));
        }

        // Run the validity circuit with a sequence of "shim" gadgets that record the value of
        // each input wire of each gadget evaluation.
        let mut prove_rand_len = 0;
        let mut shims = self
            .gadget()
            .into_iter()
            .map(|inner| {
                let inner_arity = inner.arity();
                let shim = Box::new(ProveShimGadget::new(
                    inner,
                    &prove_rand[prove_rand_len..prove_rand_len + inner_arity],
                )) as Box<dyn Gadget<Self::Field>>;
                prove_rand_len += inner_arity;
                shim
            })
            .collect::<Vec<_>>();

        // Create a buffer for the proof. The buffer is longer than the proof itself: the length
        // of each chunk is rounded up to the full interpolation grid so that FFT-based gadgets
        // have room to work in. The buffer is truncated to the proof length below.
        let data_len = shims
            .iter()
            .map(|shim| {
                let p = (1 + shim.calls()).next_power_of_two();
                shim.arity() + shim.degree() * p
            })
            .sum();
        let mut proof = vec![Self::Field::zero(); data_len];

        let _ = self.valid(&mut shims, input, joint_rand, 1)?;

        // Construct the proof.
        let mut proof_len = 0;
        for shim in shims.iter_mut() {
            let gadget = shim
                .as_any()
                .downcast_mut::<ProveShimGadget<Self::Field>>()
                .unwrap();

            let g_arity = gadget.arity();
            let g_deg = gadget.degree();
            let p = (1 + gadget.calls()).next_power_of_two();
            let p_inv = try_from_usize::<Self::Field>(p)?.inv();

            // Interpolate the wire polynomials `f[0], ..., f[g_arity-1]` from the points
            // recorded during the validity-circuit evaluation and append each wire seed
            // `f[j](1)` to the proof.
            let mut f = vec![vec![Self::Field::zero(); p]; g_arity];
            for (wire, wire_vals) in gadget.f_vals.iter().enumerate() {
                proof[proof_len + wire] = wire_vals[0];
                discrete_fourier_transform(&mut f[wire], wire_vals, p)?;
                discrete_fourier_transform_inv_finish(&mut f[wire], p, p_inv);
            }

            // Construct the gadget polynomial `G(f[0], ..., f[g_arity-1])` and append its
            // coefficients to the proof.
            gadget.inner.call_poly(&mut proof[proof_len + g_arity..], &f)?;
            proof_len += g_arity + g_deg * (p - 1) + 1;
        }

        proof.truncate(proof_len);
        Ok(proof)
    }

    /// Query an input and proof, returning the verifier message. When the input and proof are
    /// additive secret shares, each aggregator queries its shares with the same `query_rand` and
    /// `joint_rand` and the verifier shares sum to the verifier message for the whole input.
    ///
    /// Parameters:
    /// * `input` is the input or input share.
    /// * `proof` is the proof or proof share.
    /// * `query_rand` is the verifier's random input, one element per gadget.
    /// * `joint_rand` is the random input shared by the prover and verifier.
    /// * `num_shares` is the number of shares the input and proof were split into.
    fn query(
        &self,
        input: &[Self::Field],
        proof: &[Self::Field],
        query_rand: &[Self::Field],
        joint_rand: &[Self::Field],
        num_shares: usize,
    ) -> Result<Vec<Self::Field>, FlpError> {
        if proof.len() != self.proof_len() {
            return Err(FlpError::Query(format!(
                "unexpected proof length: got {}; want {}",
                proof.len(),
                self.proof_len()
            )));
        }

        if query_rand.len() != self.query_rand_len() {
            return Err(FlpError::Query(format!(
                "unexpected query randomness length: got {}; want {}",
                query_rand.len(),
                self.query_rand_len()
            )));
        }

        // Run the validity circuit with a sequence of "shim" gadgets that record the inputs to
        // each gadget evaluation and substitute the evaluation itself with a lookup into the
        // gadget polynomial read from the proof. The verifier never evaluates a gadget.
        let mut proof_len = 0;
        let mut shims = self
            .gadget()
            .into_iter()
            .map(|inner| {
                let p = (1 + inner.calls()).next_power_of_two();
                let next_len = inner.arity() + inner.degree() * (p - 1) + 1;
                let shim = Box::new(QueryShimGadget::new(
                    inner,
                    &proof[proof_len..proof_len + next_len],
                )?) as Box<dyn Gadget<Self::Field>>;
                proof_len += next_len;
                Ok(shim)
            })
            .collect::<Result<Vec<_>, FlpError>>()?;

        // Allocate space for the verifier message: the output of the validity circuit and, for
        // each gadget, the wire polynomials and the gadget polynomial evaluated at the query
        // randomness.
        let mut verifier = Vec::with_capacity(self.verifier_len());
        let v = self.valid(&mut shims, input, joint_rand, num_shares)?;
        verifier.push(v);

        let mut proof_len = 0;
        for (shim, t) in shims.iter_mut().zip(query_rand.iter()) {
            let gadget = shim
                .as_any()
                .downcast_mut::<QueryShimGadget<Self::Field>>()
                .unwrap();

            let g_arity = gadget.arity();
            let g_deg = gadget.degree();
            let p = (1 + gadget.calls()).next_power_of_two();

            // If the query randomness lands on the interpolation grid, then evaluating the wire
            // polynomials would disclose a gadget output. The caller must retry with fresh
            // query randomness.
            if t.pow(try_into_field_integer::<Self::Field>(p)?) == Self::Field::one() {
                return Err(FlpError::Abort(
                    "query randomness coincides with interpolation point",
                ));
            }

            // Reconstruct the wire polynomials, exactly as in `prove`, and evaluate each at the
            // query randomness.
            let p_inv = try_from_usize::<Self::Field>(p)?.inv();
            let mut f = vec![Self::Field::zero(); p];
            for wire_vals in gadget.f_vals.iter() {
                discrete_fourier_transform(&mut f, wire_vals, p)?;
                discrete_fourier_transform_inv_finish(&mut f, p, p_inv);
                verifier.push(poly_eval(&f, *t));
            }

            // Evaluate the gadget polynomial at the query randomness.
            let next_len = g_arity + g_deg * (p - 1) + 1;
            verifier.push(poly_eval(
                &proof[proof_len + g_arity..proof_len + next_len],
                *t,
            ));
            proof_len += next_len;
        }

        Ok(verifier)
    }

    /// Returns true if the verifier message indicates that the input it was generated from is
    /// valid. The message must be the sum of all of the aggregators' verifier shares.
    fn decide(&self, verifier: &[Self::Field]) -> Result<bool, FlpError> {
        if verifier.len() != self.verifier_len() {
            return Err(FlpError::Decide(format!(
                "unexpected verifier length: got {}; want {}",
                verifier.len(),
                self.verifier_len()
            )));
        }

        // Check that the output of the validity circuit is zero.
        if verifier[0] != Self::Field::zero() {
            return Ok(false);
        }

        // Check that each gadget polynomial agrees with the gadget applied to the wire
        // polynomials at the query randomness.
        let mut verifier_len = 1;
        for mut gadget in self.gadget() {
            let next_len = 1 + gadget.arity();

            let e = gadget.call(&verifier[verifier_len..verifier_len + next_len - 1])?;
            if e != verifier[verifier_len + next_len - 1] {
                return Ok(false);
            }

            verifier_len += next_len;
        }

        Ok(true)
    }
}

pub(crate) fn try_from_usize<F: FieldElement>(val: usize) -> Result<F, FlpError> {
    Ok(F::from(try_into_field_integer::<F>(val)?))
}

pub(crate) fn try_into_field_integer<F: FieldElement>(
    val: usize,
) -> Result<F::Integer, FlpError> {
    F::Integer::try_from(val)
        .map_err(|err| FlpError::Valid(format!("integer conversion of {val} failed: {err}")))
}

// A "shim" gadget used during proof generation to record the points at which the wire
// polynomials are interpolated. The first point of each wire is the seed drawn from the prove
// randomness; the subsequent points are the gadget inputs observed while evaluating the
// validity circuit.
#[derive(Debug)]
struct ProveShimGadget<F: FieldElement> {
    inner: Box<dyn Gadget<F>>,

    /// Points at which the wire polynomials are interpolated.
    f_vals: Vec<Vec<F>>,

    /// The number of times the gadget has been called so far.
    ct: usize,
}

impl<F: FieldElement> ProveShimGadget<F> {
    fn new(inner: Box<dyn Gadget<F>>, prove_rand: &[F]) -> Self {
        let mut f_vals = vec![vec![F::zero(); 1 + inner.calls()]; inner.arity()];
        for (wire_vals, seed) in f_vals.iter_mut().zip(prove_rand.iter()) {
            wire_vals[0] = *seed;
        }

        Self {
            inner,
            f_vals,
            ct: 1,
        }
    }
}

impl<F: FieldElement> Gadget<F> for ProveShimGadget<F> {
    fn call(&mut self, inp: &[F]) -> Result<F, FlpError> {
        for (wire_vals, inp_val) in self.f_vals.iter_mut().zip(inp.iter()) {
            wire_vals[self.ct] = *inp_val;
        }
        self.ct += 1;
        self.inner.call(inp)
    }

    fn call_poly(&mut self, outp: &mut [F], inp: &[Vec<F>]) -> Result<(), FlpError> {
        self.inner.call_poly(outp, inp)
    }

    fn arity(&self) -> usize {
        self.inner.arity()
    }

    fn degree(&self) -> usize {
        self.inner.degree()
    }

    fn calls(&self) -> usize {
        self.inner.calls()
    }

    fn as_any(&mut self) -> &mut dyn Any {
        self
    }
}

// A "shim" gadget used during query generation. It records the points at which the wire
// polynomials are interpolated and substitutes each gadget evaluation with the corresponding
// evaluation of the gadget polynomial read from the proof.
#[derive(Debug)]
struct QueryShimGadget<F: FieldElement> {
    inner: Box<dyn Gadget<F>>,

    /// Points at which the wire polynomials are interpolated.
    f_vals: Vec<Vec<F>>,

    /// Evaluations of the gadget polynomial at the interpolation grid.
    p_vals: Vec<F>,

    /// Distance between interpolation points in `p_vals`.
    step: usize,

    /// The number of times the gadget has been called so far.
    ct: usize,
}

impl<F: FieldElement> QueryShimGadget<F> {
    fn new(inner: Box<dyn Gadget<F>>, proof_chunk: &[F]) -> Result<Self, FlpError> {
        let g_arity = inner.arity();
        let g_calls = inner.calls();
        let g_deg = inner.degree();
        let m = (1 + g_calls).next_power_of_two();

        // The first `g_arity` elements of the proof chunk are the wire seeds.
        let mut f_vals = vec![vec![F::zero(); 1 + g_calls]; g_arity];
        for (wire_vals, seed) in f_vals.iter_mut().zip(proof_chunk.iter()) {
            wire_vals[0] = *seed;
        }

        // Evaluate the gadget polynomial at the roots of unity the wire polynomials are
        // interpolated over.
        let p = m * g_deg;
        let size = p.next_power_of_two();
        let mut p_vals = vec![F::zero(); size];
        discrete_fourier_transform(&mut p_vals, &proof_chunk[g_arity..], size)?;
        let step = (1 << (log2(p as u128) - log2(m as u128))) as usize;

        Ok(Self {
            inner,
            f_vals,
            p_vals,
            step,
            ct: 1,
        })
    }
}

impl<F: FieldElement> Gadget<F> for QueryShimGadget<F> {
    fn call(&mut self, inp: &[F]) -> Result<F, FlpError> {
        for (wire_vals, inp_val) in self.f_vals.iter_mut().zip(inp.iter()) {
            wire_vals[self.ct] = *inp_val;
        }
        let outp = self.p_vals[self.ct * self.step];
        self.ct += 1;
        Ok(outp)
    }

    fn call_poly(&mut self, _outp: &mut [F], _inp: &[Vec<F>]) -> Result<(), FlpError> {
        Err(FlpError::Gadget(
            "call_poly is not available while querying".into(),
        ))
    }

    fn arity(&self) -> usize {
        self.inner.arity()
    }

    fn degree(&self) -> usize {
        self.inner.degree()
    }

    fn calls(&self) -> usize {
        self.inner.calls()
    }

    fn as_any(&mut self) -> &mut dyn Any {
        self
    }
}
