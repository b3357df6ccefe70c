// SPDX-License-Identifier: MPL-2.0

//! This module defines an API for Verifiable Distributed Aggregation Functions (VDAFs): multi-
//! party protocols for computing an aggregate over client measurements without any single
//! party learning an individual measurement.
//!
//! The protocol runs between three kinds of actors: each *Client* splits its measurement into
//! input shares, one per *Aggregator*; the Aggregators run a preparation phase over each set of
//! shares to validate it and recover output shares, which they accumulate locally; finally, the
//! *Collector* combines the Aggregators' aggregate shares into the aggregate result. The traits
//! in this module define those roles; [`prio3`] provides the concrete construction.
//!
//! [BBCG+19]: https://ia.cr/2019/188
//! [CGB17]: https://crypto.stanford.edu/prio/

use crate::codec::{CodecError, Decode, Encode, ParameterizedDecode};
use crate::field::{decode_fieldvec, FieldElement, FieldError};
use crate::flp::FlpError;
use crate::prng::PrngError;
use crate::vdaf::prg::Seed;
use std::fmt::Debug;
use std::io::Cursor;

/// Errors emitted by this module.
#[derive(Debug, thiserror::Error)]
pub enum VdafError {
    /// The caller supplied invalid input, e.g., mismatched share counts or vector lengths.
    #[error("invalid input: {0}")]
    Input(String),

    /// A prepare state machine was stepped out of order. The affected measurement must be
    /// dropped.
    #[error("invalid prepare state: {0}")]
    State(&'static str),

    /// A prepare message check failed: the input shares do not carry a valid measurement. The
    /// affected measurement must be dropped.
    #[error("verification failed: {0}")]
    Verify(&'static str),

    /// An error occurred while encoding or decoding a message.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Field error.
    #[error("field error: {0}")]
    Field(#[from] FieldError),

    /// An error propagated by the proof system.
    #[error("flp error: {0}")]
    Flp(#[from] FlpError),

    /// PRNG error.
    #[error("prng error: {0}")]
    Prng(#[from] PrngError),

    /// Failure when calling getrandom().
    #[error("getrandom: {0}")]
    GetRandom(#[from] getrandom::Error),
}

/// An additive share of a vector of field elements.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Share<F, const L: usize> {
    /// An uncompressed share, typically sent to the leader.
    Leader(Vec<F>),

    /// A compressed share, typically sent to a helper. The helper recovers its vector by
    /// expanding the seed.
    Helper(Seed<L>),
}

/// Parameters needed to decode a [`Share`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ShareDecodingParameter {
    Leader(usize),
    Helper,
}

impl<F: FieldElement, const L: usize> ParameterizedDecode<ShareDecodingParameter>
    for Share<F, L>
{
    fn decode_with_param(
        decoding_parameter: &ShareDecodingParameter,
        bytes: &mut Cursor<&[u8]>,
    ) -> Result<Self, CodecError> {
        match decoding_parameter {
            ShareDecodingParameter::Leader(share_length) => {
                let data = decode_fieldvec(*share_length, bytes)?;
                Ok(Self::Leader(data))
            }
            ShareDecodingParameter::Helper => {
                let seed = Seed::decode(bytes)?;
                Ok(Self::Helper(seed))
            }
        }
    }
}

impl<F: FieldElement, const L: usize> Encode for Share<F, L> {
    fn encode(&self, bytes: &mut Vec<u8>) {
        match self {
            Share::Leader(share_data) => {
                for x in share_data {
                    x.encode(bytes);
                }
            }
            Share::Helper(share_seed) => {
                share_seed.encode(bytes);
            }
        }
    }

    fn encoded_len(&self) -> Option<usize> {
        match self {
            Share::Leader(share_data) => Some(share_data.len() * F::ENCODED_SIZE),
            Share::Helper(_) => Some(L),
        }
    }
}

/// The base trait for VDAF schemes. This trait is inherited by traits [`Client`],
/// [`Aggregator`], and [`Collector`], which define the roles of the various parties involved in
/// the execution of the VDAF.
pub trait Vdaf: Clone + Debug {
    /// The type of Client measurement to be aggregated.
    type Measurement: Clone + Debug;

    /// The aggregate result of the VDAF execution.
    type AggregateResult: Clone + Debug;

    /// The aggregation parameter, used by the Aggregators to map their input shares to output
    /// shares.
    type AggregationParam: Clone + Debug;

    /// The public parameter used by Clients to shard their measurement into input shares.
    type PublicParam: Clone + Debug;

    /// A verification parameter, used by an Aggregator in the Prepare process to ensure that
    /// the Aggregators have recovered valid output shares. Verification parameters are secret
    /// from the Clients and the Collector.
    type VerifyParam: Clone + Debug;

    /// An input share sent by a Client.
    type InputShare: Clone + Debug + ParameterizedDecode<Self::VerifyParam> + Encode;

    /// An output share recovered from an input share by an Aggregator.
    type OutputShare: Clone + Debug;

    /// An Aggregator's share of the aggregate result.
    type AggregateShare: Aggregatable<OutputShare = Self::OutputShare> + Encode;

    /// Generates the long-lived parameters used by the Clients and Aggregators.
    fn setup(&self) -> Result<(Self::PublicParam, Vec<Self::VerifyParam>), VdafError>;

    /// The number of Aggregators. The Client generates as many input shares as there are
    /// Aggregators.
    fn num_aggregators(&self) -> usize;
}

/// The Client's role in the execution of a VDAF.
pub trait Client: Vdaf {
    /// Shards a measurement into a sequence of input shares, one for each Aggregator.
    fn shard(
        &self,
        public_param: &Self::PublicParam,
        measurement: &Self::Measurement,
    ) -> Result<Vec<Self::InputShare>, VdafError>;
}

/// The Aggregator's role in the execution of a VDAF.
pub trait Aggregator: Vdaf {
    /// State of the Aggregator during the Prepare process.
    type PrepareStep: Clone + Debug;

    /// The type of messages exchanged among the Aggregators during the Prepare process.
    type PrepareMessage: Clone + Debug + ParameterizedDecode<Self::PrepareStep> + Encode;

    /// Begins the Prepare process with the other Aggregators. The result of this process is
    /// the Aggregator's output share. The nonce must be unique per measurement for the
    /// lifetime of the verification parameter.
    fn prepare_init(
        &self,
        verify_param: &Self::VerifyParam,
        agg_param: &Self::AggregationParam,
        nonce: &[u8],
        input_share: &Self::InputShare,
    ) -> Result<Self::PrepareStep, VdafError>;

    /// Preprocess a round of prepare messages into a single input to
    /// [`Aggregator::prepare_step`]. This computation is public: it involves no secret state.
    fn prepare_preprocess<M: IntoIterator<Item = Self::PrepareMessage>>(
        &self,
        inputs: M,
    ) -> Result<Self::PrepareMessage, VdafError>;

    /// Compute the next state transition from the current state and the previous round of
    /// input messages.
    fn prepare_step(
        &self,
        state: Self::PrepareStep,
        input: Option<Self::PrepareMessage>,
    ) -> PrepareTransition<Self::PrepareStep, Self::PrepareMessage, Self::OutputShare>;

    /// Compute the Aggregator's first message.
    fn prepare_start(
        &self,
        state: Self::PrepareStep,
    ) -> Result<(Self::PrepareStep, Self::PrepareMessage), VdafError> {
        match self.prepare_step(state, None) {
            PrepareTransition::Continue(new_state, output) => Ok((new_state, output)),
            PrepareTransition::Fail(err) => Err(err),
            PrepareTransition::Finish(_) => Err(VdafError::State(
                "start() resulted in early Finish transition",
            )),
        }
    }

    /// Recover the Aggregator's output share from the combined prepare message of the previous
    /// round.
    fn prepare_finish(
        &self,
        state: Self::PrepareStep,
        input: Self::PrepareMessage,
    ) -> Result<Self::OutputShare, VdafError> {
        match self.prepare_step(state, Some(input)) {
            PrepareTransition::Continue(_, _) => Err(VdafError::State(
                "finish() resulted in Continue transition",
            )),
            PrepareTransition::Fail(err) => Err(err),
            PrepareTransition::Finish(output_share) => Ok(output_share),
        }
    }

    /// Aggregates a sequence of output shares into an aggregate share.
    fn aggregate<M: IntoIterator<Item = Self::OutputShare>>(
        &self,
        agg_param: &Self::AggregationParam,
        output_shares: M,
    ) -> Result<Self::AggregateShare, VdafError>;
}

/// The Collector's role in the execution of a VDAF.
pub trait Collector: Vdaf {
    /// Combines aggregate shares into the aggregate result.
    fn unshard<M: IntoIterator<Item = Self::AggregateShare>>(
        &self,
        agg_param: &Self::AggregationParam,
        agg_shares: M,
    ) -> Result<Self::AggregateResult, VdafError>;
}

/// A state transition of an Aggregator during the Prepare process.
#[derive(Debug)]
pub enum PrepareTransition<S, M, O> {
    /// Continue processing: store the new state and send the outbound message to the other
    /// Aggregators.
    Continue(S, M),

    /// Finish processing and return the output share.
    Finish(O),

    /// Fail and return an error. The measurement's state machine is permanently terminated.
    Fail(VdafError),
}

/// An aggregate share resulting from aggregating output shares together that can be merged with
/// aggregate shares of the same type.
pub trait Aggregatable: Clone + Debug + From<Self::OutputShare> {
    /// Type of output shares that can be accumulated into an aggregate share.
    type OutputShare;

    /// Update an aggregate share by merging it with another (`agg_share`).
    fn merge(&mut self, agg_share: &Self) -> Result<(), VdafError>;

    /// Update an aggregate share by adding `output_share`.
    fn accumulate(&mut self, output_share: &Self::OutputShare) -> Result<(), VdafError>;
}

/// An output share comprised of a vector of field elements.
#[derive(Clone, Debug)]
pub struct OutputShare<F>(Vec<F>);

impl<F> AsRef<[F]> for OutputShare<F> {
    fn as_ref(&self) -> &[F] {
        &self.0
    }
}

impl<F> From<Vec<F>> for OutputShare<F> {
    fn from(other: Vec<F>) -> Self {
        Self(other)
    }
}

/// An aggregate share suitable for VDAFs whose output shares and aggregate shares are vectors
/// of field elements, where an output share needs no special transformation to be merged into
/// an aggregate share.
#[derive(Clone, Debug)]
pub struct AggregateShare<F>(Vec<F>);

impl<F> AsRef<[F]> for AggregateShare<F> {
    fn as_ref(&self) -> &[F] {
        &self.0
    }
}

impl<F> From<OutputShare<F>> for AggregateShare<F> {
    fn from(other: OutputShare<F>) -> Self {
        Self(other.0)
    }
}

impl<F> From<Vec<F>> for AggregateShare<F> {
    fn from(other: Vec<F>) -> Self {
        Self(other)
    }
}

impl<F: FieldElement> Aggregatable for AggregateShare<F> {
    type OutputShare = OutputShare<F>;

    fn merge(&mut self, agg_share: &Self) -> Result<(), VdafError> {
        self.sum(agg_share.as_ref())
    }

    fn accumulate(&mut self, output_share: &Self::OutputShare) -> Result<(), VdafError> {
        // An output share is already in aggregatable form.
        self.sum(output_share.as_ref())
    }
}

impl<F: FieldElement> AggregateShare<F> {
    fn sum(&mut self, other: &[F]) -> Result<(), VdafError> {
        if self.0.len() != other.len() {
            return Err(VdafError::Input(format!(
                "cannot sum shares of different lengths (left = {}, right = {})",
                self.0.len(),
                other.len()
            )));
        }

        for (x, y) in self.0.iter_mut().zip(other) {
            *x += *y;
        }

        Ok(())
    }
}

impl<F: FieldElement> Encode for AggregateShare<F> {
    fn encode(&self, bytes: &mut Vec<u8>) {
        for elem in &self.0 {
            elem.encode(bytes);
        }
    }

    fn encoded_len(&self) -> Option<usize> {
        Some(self.0.len() * F::ENCODED_SIZE)
    }
}

impl<F: FieldElement> ParameterizedDecode<usize> for AggregateShare<F> {
    fn decode_with_param(
        vector_length: &usize,
        bytes: &mut Cursor<&[u8]>,
    ) -> Result<Self, CodecError> {
        decode_fieldvec(*vector_length, bytes).map(Self)
    }
}

/// Execute the complete VDAF for a batch of measurements, routing every message through its
/// encoded form, and return the aggregate result.
#[cfg(test)]
pub(crate) fn run_vdaf<V, M>(
    vdaf: &V,
    agg_param: &V::AggregationParam,
    measurements: M,
) -> Result<V::AggregateResult, VdafError>
where
    V: Client + Aggregator + Collector,
    M: IntoIterator<Item = V::Measurement>,
{
    let (public_param, verify_params) = vdaf.setup()?;

    // One running aggregate share per aggregator, seeded by the first measurement's output
    // shares.
    let mut agg_shares: Vec<V::AggregateShare> = Vec::new();
    for measurement in measurements.into_iter() {
        // Nonces MUST be unique per measurement.
        let mut nonce = [0; 16];
        getrandom::getrandom(&mut nonce)?;

        let input_shares = vdaf.shard(&public_param, &measurement)?;
        let out_shares = run_vdaf_prepare(vdaf, &verify_params, agg_param, &nonce, input_shares)?;
        if agg_shares.is_empty() {
            agg_shares = out_shares
                .into_iter()
                .map(V::AggregateShare::from)
                .collect();
        } else {
            for (agg_share, out_share) in agg_shares.iter_mut().zip(out_shares) {
                agg_share.accumulate(&out_share)?;
            }
        }
    }

    vdaf.unshard(agg_param, agg_shares)
}

/// Run the prepare phase for a single measurement's input shares, routing every message through
/// its encoded form, and return one output share per aggregator.
#[cfg(test)]
pub(crate) fn run_vdaf_prepare<V, M>(
    vdaf: &V,
    verify_params: &[V::VerifyParam],
    agg_param: &V::AggregationParam,
    nonce: &[u8],
    input_shares: M,
) -> Result<Vec<V::OutputShare>, VdafError>
where
    V: Client + Aggregator + Collector,
    M: IntoIterator<Item = V::InputShare>,
{
    // Each aggregator consumes its input share off the wire and emits its prepare share.
    let mut states = Vec::with_capacity(verify_params.len());
    let mut prep_shares = Vec::with_capacity(verify_params.len());
    for (verify_param, input_share) in verify_params.iter().zip(input_shares) {
        let decoded =
            V::InputShare::get_decoded_with_param(verify_param, &input_share.get_encoded())?;
        let state = vdaf.prepare_init(verify_param, agg_param, nonce, &decoded)?;
        let (state, prep_share) = vdaf.prepare_start(state)?;
        states.push(state);
        prep_shares.push(prep_share.get_encoded());
    }

    // Combining the prepare shares is a public computation; every aggregator arrives at the
    // same message.
    let prep_msg = vdaf.prepare_preprocess(
        prep_shares
            .iter()
            .map(|encoded| V::PrepareMessage::get_decoded_with_param(&states[0], encoded))
            .collect::<Result<Vec<_>, _>>()?,
    )?;

    // Each aggregator consumes the combined message and releases its output share.
    let encoded_msg = prep_msg.get_encoded();
    let mut out_shares = Vec::with_capacity(states.len());
    for state in states.into_iter() {
        let msg = V::PrepareMessage::get_decoded_with_param(&state, &encoded_msg)?;
        out_shares.push(vdaf.prepare_finish(state, msg)?);
    }

    Ok(out_shares)
}

pub mod prg;
pub mod prio3;
