// SPDX-License-Identifier: MPL-2.0

//! Implementation of the Prio3 VDAF.
//!
//! **WARNING:** Neither this code nor the cryptographic construction it implements has
//! undergone significant security analysis. Use at your own risk.
//!
//! Prio3 is based on the Prio system designed by Dan Boneh and Henry Corrigan-Gibbs and
//! presented at NSDI 2017 [[CGB17]]. However, it incorporates techniques from Boneh et al.,
//! CRYPTO 2019 [[BBCG+19]], that lead to substantial improvements in terms of run time and
//! communication cost.
//!
//! Prio3 is a transformation of a Fully Linear Proof (FLP) system into a VDAF. The base type,
//! [`Prio3`], supports a wide variety of aggregation functions, some of which are instantiated
//! here:
//!
//! - [`Prio3Aes128Count`] for aggregating a counter
//! - [`Prio3Aes128Sum`] for computing the sum of bounded integers
//! - [`Prio3Aes128Histogram`] for estimating a distribution via a histogram
//!
//! Additional types can be constructed from [`Prio3`] as needed.
//!
//! [BBCG+19]: https://ia.cr/2019/188
//! [CGB17]: https://crypto.stanford.edu/prio/

use crate::codec::{CodecError, Decode, Encode, ParameterizedDecode};
use crate::field::{decode_fieldvec, sub_vector, Field128, Field64, FieldElement};
use crate::flp::types::{Count, Histogram, Sum};
use crate::flp::Type;
use crate::prng::Prng;
use crate::vdaf::prg::{Prg, PrgAes128, RandSource, Seed};
use crate::vdaf::{
    Aggregatable, AggregateShare, Aggregator, Client, Collector, OutputShare, PrepareTransition,
    Share, ShareDecodingParameter, Vdaf, VdafError,
};
use std::io::Cursor;
use std::marker::PhantomData;

/// Domain-separation tag mixed into every PRG info string used by Prio3.
const DST: &[u8] = b"vdaf-00 prio3";

/// The info-string prefix that separates per-measurement query randomness from the per-share
/// expansions, which are tagged with an aggregator ID in `[0, 255)`.
const QUERY_RAND_PREFIX: u8 = 255;

/// The count type. Each measurement is an integer in `[0, 2)` and the aggregate result is the
/// sum.
pub type Prio3Aes128Count = Prio3<Count<Field64>, PrgAes128, 16>;

impl Prio3Aes128Count {
    /// Construct an instance of Prio3Aes128Count with the given number of aggregators.
    pub fn new(num_aggregators: u8) -> Result<Self, VdafError> {
        check_num_aggregators(num_aggregators)?;

        Ok(Prio3 {
            num_aggregators,
            typ: Count::new(),
            phantom: PhantomData,
        })
    }
}

/// The sum type. Each measurement is an integer in `[0, 2^bits)` for some `0 < bits < 64` and
/// the aggregate is the sum.
pub type Prio3Aes128Sum = Prio3<Sum<Field128>, PrgAes128, 16>;

impl Prio3Aes128Sum {
    /// Construct an instance of Prio3Aes128Sum with the given number of aggregators and
    /// required bit length. The bit length must not exceed 64.
    pub fn new(num_aggregators: u8, bits: usize) -> Result<Self, VdafError> {
        check_num_aggregators(num_aggregators)?;
        if bits > 64 {
            return Err(VdafError::Input(format!(
                "bit length ({bits}) exceeds limit for aggregate type (64)"
            )));
        }

        Ok(Prio3 {
            num_aggregators,
            typ: Sum::new(bits)?,
            phantom: PhantomData,
        })
    }
}

/// The histogram type. Each measurement is an unsigned integer and the result is a histogram
/// representation of the distribution. The bucket boundaries are fixed in advance.
pub type Prio3Aes128Histogram = Prio3<Histogram<Field128>, PrgAes128, 16>;

impl Prio3Aes128Histogram {
    /// Constructs an instance of Prio3Aes128Histogram with the given number of aggregators and
    /// desired histogram bucket boundaries.
    pub fn new(num_aggregators: u8, buckets: &[u64]) -> Result<Self, VdafError> {
        check_num_aggregators(num_aggregators)?;
        let buckets = buckets.iter().map(|bucket| *bucket as u128).collect();

        Ok(Prio3 {
            num_aggregators,
            typ: Histogram::new(buckets)?,
            phantom: PhantomData,
        })
    }
}

/// The base type for Prio3.
///
/// An instance of Prio3 is determined by:
///
/// - a [`Type`](crate::flp::Type) that defines the set of valid input measurements; and
/// - a [`Prg`](crate::vdaf::prg::Prg) for deriving vectors of field elements from seeds.
///
/// New instances can be defined by aliasing the base type. For example, [`Prio3Aes128Count`] is
/// an alias for `Prio3<Count<Field64>, PrgAes128, 16>`.
#[derive(Clone, Debug)]
pub struct Prio3<T, P, const L: usize>
where
    T: Type,
    P: Prg<L>,
{
    num_aggregators: u8,
    typ: T,
    phantom: PhantomData<P>,
}

impl<T, P, const L: usize> Prio3<T, P, L>
where
    T: Type,
    P: Prg<L>,
{
    /// The output length of the underlying FLP.
    pub fn output_len(&self) -> usize {
        self.typ.output_len()
    }

    /// The verifier length of the underlying FLP.
    pub fn verifier_len(&self) -> usize {
        self.typ.verifier_len()
    }

    // Expand a seed into `len` pseudorandom field elements.
    fn expand(seed: &Seed<L>, info: &[u8], len: usize) -> Vec<T::Field> {
        Prng::from_seed_stream(P::seed_stream(seed, info)).take(len).collect()
    }

    // Info string for expanding the input and proof shares of the aggregator with the given ID.
    fn share_info(agg_id: u8) -> Vec<u8> {
        [DST, &[agg_id]].concat()
    }

    // Derive an aggregator's contribution to the joint randomness seed from its blind and its
    // input share.
    fn derive_joint_rand_part(blind: &Seed<L>, agg_id: u8, input_share: &[T::Field]) -> Seed<L> {
        let mut prg = P::init(blind);
        prg.update(&[agg_id]);
        for x in input_share {
            let encoded: Vec<u8> = (*x).into();
            prg.update(&encoded);
        }
        prg.into_seed()
    }

    fn setup_with_rand_source(
        &self,
        rand_source: RandSource,
    ) -> Result<((), Vec<Prio3VerifyParam<L>>), VdafError> {
        let query_rand_init = Seed::from_rand_source(rand_source)?;
        Ok((
            (),
            (0..self.num_aggregators)
                .map(|aggregator_id| Prio3VerifyParam {
                    query_rand_init: query_rand_init.clone(),
                    aggregator_id,
                    input_len: self.typ.input_len(),
                    proof_len: self.typ.proof_len(),
                    joint_rand_len: self.typ.joint_rand_len(),
                })
                .collect(),
        ))
    }

    #[allow(clippy::type_complexity)]
    fn shard_with_rand_source(
        &self,
        measurement: &T::Measurement,
        rand_source: RandSource,
    ) -> Result<Vec<Prio3InputShare<T::Field, L>>, VdafError> {
        let num_aggregators = self.num_aggregators;
        let input = self.typ.encode_measurement(measurement)?;

        // Generate the input shares. Each helper share is the expansion of a fresh seed; the
        // leader share is the difference between the input and the expanded helper shares.
        let mut helper_input_seeds = Vec::with_capacity(num_aggregators as usize - 1);
        let mut helper_input_shares = Vec::with_capacity(num_aggregators as usize - 1);
        let mut leader_input_share = input.clone();
        for agg_id in 1..num_aggregators {
            let seed = Seed::from_rand_source(rand_source)?;
            let share = Self::expand(&seed, &Self::share_info(agg_id), self.typ.input_len());
            sub_vector(&mut leader_input_share, &share)?;
            helper_input_seeds.push(seed);
            helper_input_shares.push(share);
        }

        // Derive the joint randomness. Each share contributes a "part" bound to its blind and
        // its input share; the parts XOR into the joint randomness seed, and each share's
        // stored hint is the XOR of every *other* part, so an aggregator recovers the seed by
        // combining the hint with the part it derives itself.
        let (joint_rand, joint_rand_params) = if self.typ.joint_rand_len() > 0 {
            let mut blinds = Vec::with_capacity(num_aggregators as usize);
            let mut parts = Vec::with_capacity(num_aggregators as usize);
            for agg_id in 0..num_aggregators {
                let input_share = if agg_id == 0 {
                    &leader_input_share
                } else {
                    &helper_input_shares[agg_id as usize - 1]
                };
                let blind = Seed::from_rand_source(rand_source)?;
                parts.push(Self::derive_joint_rand_part(&blind, agg_id, input_share));
                blinds.push(blind);
            }

            let joint_rand_seed = parts
                .iter()
                .fold(Seed::zero(), |accumulated, part| accumulated.xor(part));

            let joint_rand_params = blinds
                .into_iter()
                .zip(parts.into_iter())
                .map(|(blind, part)| JointRandParam {
                    seed_hint: part.xor(&joint_rand_seed),
                    blind,
                })
                .collect::<Vec<_>>();

            (
                Self::expand(&joint_rand_seed, DST, self.typ.joint_rand_len()),
                Some(joint_rand_params),
            )
        } else {
            (Vec::new(), None)
        };

        // Run the proof-generation algorithm.
        let prove_rand = Self::expand(
            &Seed::from_rand_source(rand_source)?,
            DST,
            self.typ.prove_rand_len(),
        );
        let mut leader_proof_share = self.typ.prove(&input, &prove_rand, &joint_rand)?;

        // Generate the proof shares.
        let mut helper_proof_seeds = Vec::with_capacity(num_aggregators as usize - 1);
        for agg_id in 1..num_aggregators {
            let seed = Seed::from_rand_source(rand_source)?;
            let share = Self::expand(&seed, &Self::share_info(agg_id), self.typ.proof_len());
            sub_vector(&mut leader_proof_share, &share)?;
            helper_proof_seeds.push(seed);
        }

        // Prep the output messages.
        let mut joint_rand_params = joint_rand_params
            .map(|mut params| params.drain(..).map(Some).collect::<Vec<_>>())
            .unwrap_or_else(|| vec![None; num_aggregators as usize]);

        let mut out = Vec::with_capacity(num_aggregators as usize);
        out.push(Prio3InputShare {
            input_share: Share::Leader(leader_input_share),
            proof_share: Share::Leader(leader_proof_share),
            joint_rand_param: joint_rand_params[0].take(),
        });

        for (j, (input_seed, proof_seed)) in helper_input_seeds
            .into_iter()
            .zip(helper_proof_seeds.into_iter())
            .enumerate()
        {
            out.push(Prio3InputShare {
                input_share: Share::Helper(input_seed),
                proof_share: Share::Helper(proof_seed),
                joint_rand_param: joint_rand_params[j + 1].take(),
            });
        }

        Ok(out)
    }
}

#[cfg(any(test, feature = "test-util"))]
impl<T, P, const L: usize> Prio3<T, P, L>
where
    T: Type,
    P: Prg<L>,
{
    /// Generate verification parameters from constant randomness of repeated `0x01` bytes.
    /// This method is not secure. It is used for reproducing deterministic transcripts.
    pub fn test_vec_setup(&self) -> Result<((), Vec<Prio3VerifyParam<L>>), VdafError> {
        self.setup_with_rand_source(|buf| {
            buf.fill(1);
            Ok(())
        })
    }

    /// Shard a measurement with constant randomness of repeated `0x01` bytes. This method is
    /// not secure. It is used for reproducing deterministic transcripts.
    pub fn test_vec_shard(
        &self,
        measurement: &T::Measurement,
    ) -> Result<Vec<Prio3InputShare<T::Field, L>>, VdafError> {
        self.shard_with_rand_source(measurement, |buf| {
            buf.fill(1);
            Ok(())
        })
    }
}

impl<T, P, const L: usize> Vdaf for Prio3<T, P, L>
where
    T: Type,
    P: Prg<L>,
{
    type Measurement = T::Measurement;
    type AggregateResult = T::AggregateResult;
    type AggregationParam = ();
    type PublicParam = ();
    type VerifyParam = Prio3VerifyParam<L>;
    type InputShare = Prio3InputShare<T::Field, L>;
    type OutputShare = OutputShare<T::Field>;
    type AggregateShare = AggregateShare<T::Field>;

    fn setup(&self) -> Result<((), Vec<Prio3VerifyParam<L>>), VdafError> {
        self.setup_with_rand_source(getrandom::getrandom)
    }

    fn num_aggregators(&self) -> usize {
        self.num_aggregators as usize
    }
}

/// The verification parameter used by each Aggregator to evaluate the FLP on the recovered
/// input shares. The query-randomness seed is shared by all of the Aggregators and MUST be kept
/// secret from the Clients and the Collector.
#[derive(Clone, Debug)]
pub struct Prio3VerifyParam<const L: usize> {
    /// Key used to derive the query randomness from the nonce.
    query_rand_init: Seed<L>,

    /// The identity of the aggregator.
    aggregator_id: u8,

    /// Length in field elements of an encoded input.
    input_len: usize,

    /// Length in field elements of a proof.
    proof_len: usize,

    /// Length in field elements of the joint randomness.
    joint_rand_len: usize,
}

/// The state of each Aggregator's share of the joint randomness derivation.
#[derive(Clone, Debug, Eq, PartialEq)]
struct JointRandParam<const L: usize> {
    /// The blinding factor, used to derive this aggregator's contribution to the joint
    /// randomness seed.
    blind: Seed<L>,

    /// The XOR of every other aggregator's contribution to the joint randomness seed.
    seed_hint: Seed<L>,
}

/// The message sent by the Client to each Aggregator. This includes the Client's input share
/// and the Aggregator's share of the proof.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Prio3InputShare<F, const L: usize> {
    /// The input share.
    input_share: Share<F, L>,

    /// The proof share.
    proof_share: Share<F, L>,

    /// The blind and hint seeds from which the Aggregator recovers the joint randomness seed.
    /// Not present when the underlying type requires no joint randomness.
    joint_rand_param: Option<JointRandParam<L>>,
}

impl<F: FieldElement, const L: usize> Encode for Prio3InputShare<F, L> {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.input_share.encode(bytes);
        self.proof_share.encode(bytes);
        if let Some(ref param) = self.joint_rand_param {
            param.blind.encode(bytes);
            param.seed_hint.encode(bytes);
        }
    }
}

impl<F: FieldElement, const L: usize> ParameterizedDecode<Prio3VerifyParam<L>>
    for Prio3InputShare<F, L>
{
    fn decode_with_param(
        verify_param: &Prio3VerifyParam<L>,
        bytes: &mut Cursor<&[u8]>,
    ) -> Result<Self, CodecError> {
        let (input_decoder, proof_decoder) = if verify_param.aggregator_id == 0 {
            (
                ShareDecodingParameter::Leader(verify_param.input_len),
                ShareDecodingParameter::Leader(verify_param.proof_len),
            )
        } else {
            (
                ShareDecodingParameter::Helper,
                ShareDecodingParameter::Helper,
            )
        };

        let input_share = Share::decode_with_param(&input_decoder, bytes)?;
        let proof_share = Share::decode_with_param(&proof_decoder, bytes)?;
        let joint_rand_param = if verify_param.joint_rand_len > 0 {
            Some(JointRandParam {
                blind: Seed::decode(bytes)?,
                seed_hint: Seed::decode(bytes)?,
            })
        } else {
            None
        };

        Ok(Prio3InputShare {
            input_share,
            proof_share,
            joint_rand_param,
        })
    }
}

/// The message exchanged among the Aggregators during the Prepare process. A single
/// Aggregator's message carries its verifier share and its contribution to the joint randomness
/// seed; the combined message produced by [`Aggregator::prepare_preprocess`] carries the sum of
/// the verifier shares and the XOR of the seed contributions.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Prio3PrepareMessage<F, const L: usize> {
    /// A share of (or the sum of all shares of) the FLP verifier message.
    verifier: Vec<F>,

    /// A contribution to (or the combination of all contributions to) the joint randomness
    /// seed.
    joint_rand_seed: Option<Seed<L>>,
}

impl<F: FieldElement, const L: usize> Encode for Prio3PrepareMessage<F, L> {
    fn encode(&self, bytes: &mut Vec<u8>) {
        for x in &self.verifier {
            x.encode(bytes);
        }
        if let Some(ref seed) = self.joint_rand_seed {
            seed.encode(bytes);
        }
    }

    fn encoded_len(&self) -> Option<usize> {
        let mut len = self.verifier.len() * F::ENCODED_SIZE;
        if self.joint_rand_seed.is_some() {
            len += L;
        }
        Some(len)
    }
}

impl<F: FieldElement, const L: usize> ParameterizedDecode<Prio3PrepareStep<F, L>>
    for Prio3PrepareMessage<F, L>
{
    fn decode_with_param(
        step: &Prio3PrepareStep<F, L>,
        bytes: &mut Cursor<&[u8]>,
    ) -> Result<Self, CodecError> {
        let verifier = decode_fieldvec(step.verifier_len(), bytes)?;
        let joint_rand_seed = if step.has_joint_rand() {
            Some(Seed::decode(bytes)?)
        } else {
            None
        };

        Ok(Prio3PrepareMessage {
            verifier,
            joint_rand_seed,
        })
    }
}

/// State of each Aggregator during the Prepare process.
#[derive(Clone, Debug)]
pub enum Prio3PrepareStep<F, const L: usize> {
    /// Ready to emit this aggregator's prepare message.
    Ready {
        /// The candidate output share, produced by truncating the input share.
        out_share: OutputShare<F>,
        /// The joint randomness seed this aggregator derived from its input share.
        joint_rand_seed: Option<Seed<L>>,
        /// The outbound prepare message.
        prep_share: Prio3PrepareMessage<F, L>,
    },
    /// Waiting for the combined prepare message of all of the aggregators.
    Waiting {
        /// The candidate output share.
        out_share: OutputShare<F>,
        /// The joint randomness seed this aggregator derived from its input share.
        joint_rand_seed: Option<Seed<L>>,
        /// Length in field elements of the verifier message.
        verifier_len: usize,
    },
}

impl<F, const L: usize> Prio3PrepareStep<F, L> {
    fn verifier_len(&self) -> usize {
        match self {
            Self::Ready { prep_share, .. } => prep_share.verifier.len(),
            Self::Waiting { verifier_len, .. } => *verifier_len,
        }
    }

    fn has_joint_rand(&self) -> bool {
        match self {
            Self::Ready {
                joint_rand_seed, ..
            }
            | Self::Waiting {
                joint_rand_seed, ..
            } => joint_rand_seed.is_some(),
        }
    }
}

impl<T, P, const L: usize> Client for Prio3<T, P, L>
where
    T: Type,
    P: Prg<L>,
{
    fn shard(
        &self,
        _public_param: &(),
        measurement: &T::Measurement,
    ) -> Result<Vec<Prio3InputShare<T::Field, L>>, VdafError> {
        self.shard_with_rand_source(measurement, getrandom::getrandom)
    }
}

impl<T, P, const L: usize> Aggregator for Prio3<T, P, L>
where
    T: Type,
    P: Prg<L>,
{
    type PrepareStep = Prio3PrepareStep<T::Field, L>;
    type PrepareMessage = Prio3PrepareMessage<T::Field, L>;

    fn prepare_init(
        &self,
        verify_param: &Prio3VerifyParam<L>,
        _agg_param: &(),
        nonce: &[u8],
        msg: &Prio3InputShare<T::Field, L>,
    ) -> Result<Prio3PrepareStep<T::Field, L>, VdafError> {
        let agg_id = verify_param.aggregator_id;
        if usize::from(agg_id) >= self.num_aggregators as usize {
            return Err(VdafError::Input("unexpected aggregator id".to_string()));
        }

        // Create a reference to the (expanded) input share.
        let expanded_input_share: Option<Vec<T::Field>> = match msg.input_share {
            Share::Leader(_) => None,
            Share::Helper(ref seed) => Some(Self::expand(
                seed,
                &Self::share_info(agg_id),
                self.typ.input_len(),
            )),
        };
        let input_share = match msg.input_share {
            Share::Leader(ref data) => data,
            Share::Helper(_) => expanded_input_share.as_ref().unwrap(),
        };

        if input_share.len() != self.typ.input_len() {
            return Err(VdafError::Input("unexpected input share length".to_string()));
        }

        // Create a reference to the (expanded) proof share.
        let expanded_proof_share: Option<Vec<T::Field>> = match msg.proof_share {
            Share::Leader(_) => None,
            Share::Helper(ref seed) => Some(Self::expand(
                seed,
                &Self::share_info(agg_id),
                self.typ.proof_len(),
            )),
        };
        let proof_share = match msg.proof_share {
            Share::Leader(ref data) => data,
            Share::Helper(_) => expanded_proof_share.as_ref().unwrap(),
        };

        // The output share is the truncated input share; it is only released if the
        // verification below and in `prepare_finish` succeeds.
        let out_share = OutputShare::from(self.typ.truncate(input_share.clone())?);

        // Derive the per-measurement query randomness from the shared key and the nonce.
        let mut query_rand_prg = P::init(&verify_param.query_rand_init);
        query_rand_prg.update(&[QUERY_RAND_PREFIX]);
        query_rand_prg.update(nonce);
        let query_rand = Self::expand(
            &query_rand_prg.into_seed(),
            DST,
            self.typ.query_rand_len(),
        );

        // Recover the joint randomness seed from the blind and the hint.
        let (joint_rand_seed, joint_rand_seed_part, joint_rand) =
            if self.typ.joint_rand_len() > 0 {
                let param = msg.joint_rand_param.as_ref().ok_or_else(|| {
                    VdafError::Input("missing joint randomness parameters".to_string())
                })?;

                let part = Self::derive_joint_rand_part(&param.blind, agg_id, input_share);
                let joint_rand_seed = param.seed_hint.xor(&part);

                let joint_rand =
                    Self::expand(&joint_rand_seed, DST, self.typ.joint_rand_len());
                (Some(joint_rand_seed), Some(part), joint_rand)
            } else {
                (None, None, Vec::new())
            };

        // Run the query-generation algorithm.
        let verifier_share = self.typ.query(
            input_share,
            proof_share,
            &query_rand,
            &joint_rand,
            self.num_aggregators as usize,
        )?;

        Ok(Prio3PrepareStep::Ready {
            out_share,
            joint_rand_seed,
            prep_share: Prio3PrepareMessage {
                verifier: verifier_share,
                joint_rand_seed: joint_rand_seed_part,
            },
        })
    }

    fn prepare_preprocess<M: IntoIterator<Item = Prio3PrepareMessage<T::Field, L>>>(
        &self,
        inputs: M,
    ) -> Result<Prio3PrepareMessage<T::Field, L>, VdafError> {
        let mut verifier = vec![T::Field::zero(); self.typ.verifier_len()];
        let mut joint_rand_seed = Seed::zero();
        let mut count = 0;
        for share in inputs.into_iter() {
            count += 1;

            if share.verifier.len() != verifier.len() {
                return Err(VdafError::Input(format!(
                    "unexpected verifier share length: got {}; want {}",
                    share.verifier.len(),
                    verifier.len(),
                )));
            }

            for (x, y) in verifier.iter_mut().zip(share.verifier) {
                *x += y;
            }

            if self.typ.joint_rand_len() > 0 {
                let seed = share.joint_rand_seed.ok_or_else(|| {
                    VdafError::Input("missing joint randomness seed share".to_string())
                })?;
                joint_rand_seed = joint_rand_seed.xor(&seed);
            }
        }

        if count != self.num_aggregators {
            return Err(VdafError::Input(format!(
                "unexpected message count: got {}; want {}",
                count, self.num_aggregators,
            )));
        }

        let joint_rand_seed = if self.typ.joint_rand_len() > 0 {
            Some(joint_rand_seed)
        } else {
            None
        };

        Ok(Prio3PrepareMessage {
            verifier,
            joint_rand_seed,
        })
    }

    fn prepare_step(
        &self,
        state: Prio3PrepareStep<T::Field, L>,
        input: Option<Prio3PrepareMessage<T::Field, L>>,
    ) -> PrepareTransition<
        Prio3PrepareStep<T::Field, L>,
        Prio3PrepareMessage<T::Field, L>,
        OutputShare<T::Field>,
    > {
        match (state, input) {
            (
                Prio3PrepareStep::Ready {
                    out_share,
                    joint_rand_seed,
                    prep_share,
                },
                None,
            ) => {
                let verifier_len = prep_share.verifier.len();
                PrepareTransition::Continue(
                    Prio3PrepareStep::Waiting {
                        out_share,
                        joint_rand_seed,
                        verifier_len,
                    },
                    prep_share,
                )
            }

            (
                Prio3PrepareStep::Waiting {
                    out_share,
                    joint_rand_seed,
                    ..
                },
                Some(msg),
            ) => {
                if let Some(joint_rand_seed) = joint_rand_seed {
                    // Check that the aggregators agree on the joint randomness; a mismatch
                    // means some input share was not generated honestly.
                    match msg.joint_rand_seed {
                        Some(ref check) if *check == joint_rand_seed => (),
                        _ => {
                            return PrepareTransition::Fail(VdafError::Verify(
                                "joint randomness check failed",
                            ))
                        }
                    }
                }

                match self.typ.decide(&msg.verifier) {
                    Ok(true) => PrepareTransition::Finish(out_share),
                    Ok(false) => {
                        PrepareTransition::Fail(VdafError::Verify("proof verifier check failed"))
                    }
                    Err(err) => PrepareTransition::Fail(err.into()),
                }
            }

            (Prio3PrepareStep::Ready { .. }, Some(_)) => PrepareTransition::Fail(
                VdafError::State("got prepare message before emitting prepare share"),
            ),

            (Prio3PrepareStep::Waiting { .. }, None) => {
                PrepareTransition::Fail(VdafError::State("missing prepare message"))
            }
        }
    }

    fn aggregate<M: IntoIterator<Item = OutputShare<T::Field>>>(
        &self,
        _agg_param: &(),
        output_shares: M,
    ) -> Result<AggregateShare<T::Field>, VdafError> {
        let mut agg_share = AggregateShare::from(vec![T::Field::zero(); self.typ.output_len()]);
        for output_share in output_shares.into_iter() {
            agg_share.accumulate(&output_share)?;
        }

        Ok(agg_share)
    }
}

impl<T, P, const L: usize> Collector for Prio3<T, P, L>
where
    T: Type,
    P: Prg<L>,
{
    fn unshard<M: IntoIterator<Item = AggregateShare<T::Field>>>(
        &self,
        _agg_param: &(),
        agg_shares: M,
    ) -> Result<T::AggregateResult, VdafError> {
        let mut agg = AggregateShare::from(vec![T::Field::zero(); self.typ.output_len()]);
        for agg_share in agg_shares.into_iter() {
            agg.merge(&agg_share)?;
        }

        Ok(self.typ.decode_result(agg.as_ref())?)
    }
}

impl<'a, F, T, P, const L: usize> ParameterizedDecode<(&'a Prio3<T, P, L>, &'a ())>
    for AggregateShare<F>
where
    F: FieldElement,
    T: Type,
    P: Prg<L>,
{
    fn decode_with_param(
        (vdaf, _): &(&'a Prio3<T, P, L>, &'a ()),
        bytes: &mut Cursor<&[u8]>,
    ) -> Result<Self, CodecError> {
        decode_fieldvec(vdaf.output_len(), bytes).map(Self::from)
    }
}

fn check_num_aggregators(num_aggregators: u8) -> Result<(), VdafError> {
    if num_aggregators < 2 {
        return Err(VdafError::Input(format!(
            "at least two aggregators are required; got {num_aggregators}"
        )));
    } else if num_aggregators > 254 {
        return Err(VdafError::Input(format!(
            "number of aggregators must not exceed 254; got {num_aggregators}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flp::FlpError;
    use crate::vdaf::{run_vdaf, run_vdaf_prepare};
    use assert_matches::assert_matches;

    #[test]
    fn test_prio3_count() {
        let prio3 = Prio3Aes128Count::new(2).unwrap();

        assert_eq!(run_vdaf(&prio3, &(), [1, 0, 0, 1, 1]).unwrap(), 3);

        let prio3_extra_helper = Prio3Aes128Count::new(3).unwrap();
        assert_eq!(
            run_vdaf(&prio3_extra_helper, &(), [1, 0, 0, 1, 1]).unwrap(),
            3,
        );
    }

    #[test]
    fn test_prio3_sum() {
        let prio3 = Prio3Aes128Sum::new(3, 16).unwrap();

        assert_eq!(
            run_vdaf(&prio3, &(), [0, (1 << 16) - 1, 0, 1, 1]).unwrap(),
            1 << 16
        );

        let (_, verify_params) = prio3.setup().unwrap();
        let nonce = [0; 16];

        // Tampering with the blind breaks the joint randomness agreement.
        let mut input_shares = prio3.shard(&(), &1).unwrap();
        input_shares[0].joint_rand_param.as_mut().unwrap().blind.0[0] ^= 255;
        let result = run_vdaf_prepare(&prio3, &verify_params, &(), &nonce, input_shares);
        assert_matches!(result, Err(VdafError::Verify(_)));

        // Tampering with the hint breaks the joint randomness agreement.
        let mut input_shares = prio3.shard(&(), &1).unwrap();
        input_shares[0]
            .joint_rand_param
            .as_mut()
            .unwrap()
            .seed_hint
            .0[0] ^= 255;
        let result = run_vdaf_prepare(&prio3, &verify_params, &(), &nonce, input_shares);
        assert_matches!(result, Err(VdafError::Verify(_)));

        // Tampering with the input share invalidates the measurement.
        let mut input_shares = prio3.shard(&(), &1).unwrap();
        assert_matches!(input_shares[0].input_share, Share::Leader(ref mut data) => {
            data[0] += Field128::one();
        });
        let result = run_vdaf_prepare(&prio3, &verify_params, &(), &nonce, input_shares);
        assert_matches!(result, Err(VdafError::Verify(_)));

        // Tampering with the proof share invalidates the proof.
        let mut input_shares = prio3.shard(&(), &1).unwrap();
        assert_matches!(input_shares[0].proof_share, Share::Leader(ref mut data) => {
            data[0] += Field128::one();
        });
        let result = run_vdaf_prepare(&prio3, &verify_params, &(), &nonce, input_shares);
        assert_matches!(result, Err(VdafError::Verify(_)));
    }

    #[test]
    fn test_prio3_histogram() {
        let prio3 = Prio3Aes128Histogram::new(2, &[0, 10, 20]).unwrap();

        assert_eq!(
            run_vdaf(&prio3, &(), [0, 10, 20, 9999]).unwrap(),
            vec![1, 1, 1, 1]
        );

        assert_eq!(run_vdaf(&prio3, &(), [0]).unwrap(), vec![1, 0, 0, 0]);
        assert_eq!(run_vdaf(&prio3, &(), [5]).unwrap(), vec![0, 1, 0, 0]);
        assert_eq!(run_vdaf(&prio3, &(), [10]).unwrap(), vec![0, 1, 0, 0]);
        assert_eq!(run_vdaf(&prio3, &(), [15]).unwrap(), vec![0, 0, 1, 0]);
        assert_eq!(run_vdaf(&prio3, &(), [20]).unwrap(), vec![0, 0, 1, 0]);
        assert_eq!(run_vdaf(&prio3, &(), [25]).unwrap(), vec![0, 0, 0, 1]);
    }

    #[test]
    fn test_prio3_input_share_encoding() {
        for (prio3, measurement) in [
            (Prio3Aes128Sum::new(2, 8).unwrap(), 100),
            (Prio3Aes128Sum::new(3, 8).unwrap(), 100),
        ] {
            let (_, verify_params) = prio3.setup().unwrap();
            let input_shares = prio3.shard(&(), &measurement).unwrap();

            for (verify_param, input_share) in verify_params.iter().zip(input_shares.iter()) {
                let encoded = input_share.get_encoded();
                let decoded =
                    Prio3InputShare::get_decoded_with_param(verify_param, &encoded).unwrap();
                assert_eq!(&decoded, input_share);

                // Trailing garbage is rejected.
                let mut long = encoded.clone();
                long.push(0);
                assert_matches!(
                    Prio3InputShare::<Field128, 16>::get_decoded_with_param(verify_param, &long),
                    Err(CodecError::BytesLeftOver(1))
                );
            }
        }

        // No joint randomness: the blind and hint are absent from the encoding.
        let prio3 = Prio3Aes128Count::new(2).unwrap();
        let (_, verify_params) = prio3.setup().unwrap();
        let input_shares = prio3.shard(&(), &1).unwrap();
        assert!(input_shares[0].joint_rand_param.is_none());
        let encoded = input_shares[1].get_encoded();
        assert_eq!(encoded.len(), 32); // input share seed + proof share seed
        let decoded = Prio3InputShare::get_decoded_with_param(&verify_params[1], &encoded).unwrap();
        assert_eq!(&decoded, &input_shares[1]);
    }

    #[test]
    fn test_prio3_prepare_state_machine_order() {
        let prio3 = Prio3Aes128Count::new(2).unwrap();
        let (_, verify_params) = prio3.setup().unwrap();
        let nonce = [0; 16];
        let input_shares = prio3.shard(&(), &1).unwrap();

        let mut states = Vec::new();
        let mut prep_shares = Vec::new();
        for (verify_param, input_share) in verify_params.iter().zip(input_shares.iter()) {
            let state = prio3
                .prepare_init(verify_param, &(), &nonce, input_share)
                .unwrap();
            let (state, prep_share) = prio3.prepare_start(state).unwrap();
            states.push(state);
            prep_shares.push(prep_share);
        }
        let prep_msg = prio3.prepare_preprocess(prep_shares).unwrap();

        // Asking a waiting state for another prepare share is out of order.
        assert_matches!(
            prio3.prepare_step(states[0].clone(), None),
            PrepareTransition::Fail(VdafError::State(_))
        );

        // Feeding a prepare message to a state that has not emitted its share is out of order.
        let fresh = prio3
            .prepare_init(&verify_params[0], &(), &nonce, &input_shares[0])
            .unwrap();
        assert_matches!(
            prio3.prepare_step(fresh, Some(prep_msg.clone())),
            PrepareTransition::Fail(VdafError::State(_))
        );

        // The in-order transitions succeed.
        for state in states.into_iter() {
            prio3.prepare_finish(state, prep_msg.clone()).unwrap();
        }
    }

    #[test]
    fn test_prio3_num_aggregators() {
        assert_matches!(Prio3Aes128Count::new(0), Err(VdafError::Input(_)));
        assert_matches!(Prio3Aes128Count::new(1), Err(VdafError::Input(_)));
        Prio3Aes128Count::new(2).unwrap();
        Prio3Aes128Count::new(254).unwrap();
        assert_matches!(Prio3Aes128Count::new(255), Err(VdafError::Input(_)));
    }

    // End-to-end scenarios with all randomness pinned to repeated 0x01 bytes.
    mod deterministic {
        use super::*;

        fn run_deterministic<T, P, const L: usize>(
            prio3: &Prio3<T, P, L>,
            measurements: &[T::Measurement],
        ) -> Result<T::AggregateResult, VdafError>
        where
            T: Type,
            P: Prg<L>,
        {
            let (_, verify_params) = prio3.test_vec_setup()?;

            let mut out_shares_per_agg = vec![Vec::new(); prio3.num_aggregators()];
            for (i, measurement) in measurements.iter().enumerate() {
                // Nonces must be distinct per measurement.
                let nonce = [i as u8 + 1; 16];
                let input_shares = prio3.test_vec_shard(measurement)?;
                let out_shares =
                    run_vdaf_prepare(prio3, &verify_params, &(), &nonce, input_shares)?;
                for (agg, out_share) in out_shares_per_agg.iter_mut().zip(out_shares) {
                    agg.push(out_share);
                }
            }

            let agg_shares = out_shares_per_agg
                .into_iter()
                .map(|out_shares| prio3.aggregate(&(), out_shares))
                .collect::<Result<Vec<_>, _>>()?;
            prio3.unshard(&(), agg_shares)
        }

        #[test]
        fn count() {
            let prio3 = Prio3Aes128Count::new(2).unwrap();
            assert_eq!(run_deterministic(&prio3, &[1]).unwrap(), 1);
        }

        #[test]
        fn sum() {
            let prio3 = Prio3Aes128Sum::new(2, 8).unwrap();
            assert_eq!(run_deterministic(&prio3, &[100]).unwrap(), 100);
        }

        #[test]
        fn sum_out_of_range() {
            let prio3 = Prio3Aes128Sum::new(2, 8).unwrap();
            assert_matches!(
                prio3.test_vec_shard(&256),
                Err(VdafError::Flp(FlpError::Encode(_)))
            );
        }

        #[test]
        fn histogram() {
            let prio3 = Prio3Aes128Histogram::new(2, &[1, 10, 100]).unwrap();
            assert_eq!(
                run_deterministic(&prio3, &[50]).unwrap(),
                vec![0, 0, 1, 0]
            );
        }

        #[test]
        fn count_batch() {
            let prio3 = Prio3Aes128Count::new(2).unwrap();
            assert_eq!(run_deterministic(&prio3, &[1, 1]).unwrap(), 2);
        }

        // Distinct nonces yield distinct query randomness, visible as distinct prepare shares
        // for the same input shares.
        #[test]
        fn nonce_binds_query_randomness() {
            let prio3 = Prio3Aes128Count::new(2).unwrap();
            let (_, verify_params) = prio3.test_vec_setup().unwrap();
            let input_shares = prio3.test_vec_shard(&1).unwrap();

            let mut prep_shares = Vec::new();
            for nonce in [[1; 16], [2; 16]] {
                let state = prio3
                    .prepare_init(&verify_params[0], &(), &nonce, &input_shares[0])
                    .unwrap();
                let (_, prep_share) = prio3.prepare_start(state).unwrap();
                prep_shares.push(prep_share.get_encoded());
            }
            assert_ne!(prep_shares[0], prep_shares[1]);
        }

        // Flipping a byte of an encoded input share is caught by verification.
        #[test]
        fn tampered_input_share() {
            let prio3 = Prio3Aes128Count::new(2).unwrap();
            let (_, verify_params) = prio3.test_vec_setup().unwrap();
            let nonce = [1; 16];
            let input_shares = prio3.test_vec_shard(&1).unwrap();

            // Flip a byte of the helper's input share seed.
            let mut encoded = input_shares[1].get_encoded();
            encoded[0] ^= 1;
            let tampered =
                Prio3InputShare::get_decoded_with_param(&verify_params[1], &encoded).unwrap();

            let result = run_vdaf_prepare(
                &prio3,
                &verify_params,
                &(),
                &nonce,
                [input_shares[0].clone(), tampered],
            );
            assert_matches!(result, Err(VdafError::Verify(_)));
        }
    }
}
