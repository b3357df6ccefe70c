// SPDX-License-Identifier: MPL-2.0

use criterion::{criterion_group, criterion_main, Criterion};

use vdaf::benchmarked::{benchmarked_iterative_fft, benchmarked_prng_expand};
use vdaf::field::{random_vector, Field128, FieldElement};
use vdaf::flp::types::Sum;
use vdaf::flp::Type;
use vdaf::vdaf::prg::Seed;
use vdaf::vdaf::prio3::Prio3Aes128Count;
use vdaf::vdaf::{Aggregator, Client, Vdaf};

// Speed test for generating random field element vectors via the PRG.
pub fn prng(c: &mut Criterion) {
    let test_sizes = [16, 256, 1024, 4096];
    let seed = Seed::generate().unwrap();
    for size in test_sizes.iter() {
        c.bench_function(&format!("prng {size}"), |b| {
            b.iter(|| benchmarked_prng_expand::<Field128>(&seed, *size))
        });
    }
}

// Speed test for the iterative FFT.
pub fn fft(c: &mut Criterion) {
    let test_sizes = [16, 256, 1024, 4096];
    for size in test_sizes.iter() {
        let inp: Vec<Field128> = random_vector(*size).unwrap();
        let mut outp = vec![Field128::zero(); *size];

        c.bench_function(&format!("fft {size}"), |b| {
            b.iter(|| {
                benchmarked_iterative_fft(&mut outp, &inp);
            })
        });
    }
}

// Speed test for generating and querying a proof of a bounded sum.
pub fn flp(c: &mut Criterion) {
    let typ: Sum<Field128> = Sum::new(32).unwrap();
    let input = typ.encode_measurement(&1337).unwrap();
    let joint_rand = random_vector(typ.joint_rand_len()).unwrap();
    let prove_rand = random_vector(typ.prove_rand_len()).unwrap();
    let query_rand = random_vector(typ.query_rand_len()).unwrap();

    c.bench_function("flp prove", |b| {
        b.iter(|| typ.prove(&input, &prove_rand, &joint_rand).unwrap())
    });

    let proof = typ.prove(&input, &prove_rand, &joint_rand).unwrap();
    c.bench_function("flp query", |b| {
        b.iter(|| {
            typ.query(&input, &proof, &query_rand, &joint_rand, 1)
                .unwrap()
        })
    });
}

// Speed test for sharding and preparing a counter measurement.
pub fn prio3(c: &mut Criterion) {
    let prio3 = Prio3Aes128Count::new(2).unwrap();
    let (_, verify_params) = prio3.setup().unwrap();
    let nonce = [0; 16];

    c.bench_function("prio3 shard", |b| b.iter(|| prio3.shard(&(), &1).unwrap()));

    let input_shares = prio3.shard(&(), &1).unwrap();
    c.bench_function("prio3 prepare_init", |b| {
        b.iter(|| {
            prio3
                .prepare_init(&verify_params[0], &(), &nonce, &input_shares[0])
                .unwrap()
        })
    });
}

criterion_group!(benches, prng, fft, flp, prio3);
criterion_main!(benches);
