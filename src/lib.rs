// SPDX-License-Identifier: MPL-2.0

#![warn(missing_docs)]

//! Verifiable Distributed Aggregation Functions.
//!
//! This crate implements the cryptographic core of a VDAF: a multi-party
//! protocol in which a set of non-colluding aggregation servers computes an
//! aggregate statistic over measurements uploaded by many clients, without any
//! server learning an individual measurement. Each measurement is secret
//! shared among the aggregators, and a fully linear proof (FLP) of the
//! measurement's validity is shared alongside it so that malformed inputs can
//! be filtered out before they corrupt the aggregate.
//!
//! The building blocks live in the bottom-level modules: NTT-friendly prime
//! fields ([`field`]), polynomial and FFT machinery ([`polynomial`], [`fft`]),
//! and a seed-expanding pseudorandom generator ([`vdaf::prg`]). The [`flp`]
//! module implements the proof system of \[[BBCG+19](https://ia.cr/2019/188),
//! Theorem 4.3\] for gadget-structured validity circuits, and [`vdaf::prio3`]
//! lifts it into the Prio3 VDAF with ready-made instantiations for counters,
//! bounded sums, and histograms.

pub mod benchmarked;
pub mod codec;
pub mod fft;
pub mod field;
pub mod flp;
mod fp;
pub mod polynomial;
pub mod prng;
pub mod vdaf;
