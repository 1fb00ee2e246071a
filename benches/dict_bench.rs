// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Insertion and lookup throughput over an on-memory dictionary.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use talpa::{AttributeMap, Dictionary, FixedClock, FormatVersion, UnigramProperty};

fn test_words() -> Vec<String> {
    // Deterministic pseudo-words; enough spread to force splits and chains.
    let mut words = Vec::new();
    let alphabet = b"etaoinshrdlu";
    let mut state = 0x2545_F491u32;
    for _ in 0..2000 {
        state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        let len = 3 + (state % 8) as usize;
        let mut word = String::new();
        let mut s = state;
        for _ in 0..len {
            word.push(alphabet[(s % alphabet.len() as u32) as usize] as char);
            s = s.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        }
        words.push(word);
    }
    words
}

fn build_dict(words: &[String]) -> Dictionary {
    let mut dict = Dictionary::create_on_memory(
        FormatVersion::V403,
        "en",
        &AttributeMap::new(),
        Box::new(FixedClock::new(1_700_000_000)),
    )
    .unwrap();
    for (i, word) in words.iter().enumerate() {
        dict.add_unigram(word, &UnigramProperty::with_probability((i % 120) as u8));
    }
    dict
}

fn bench_insert(c: &mut Criterion) {
    let words = test_words();
    c.bench_function("insert_2000_words", |b| {
        b.iter(|| black_box(build_dict(&words)))
    });
}

fn bench_lookup(c: &mut Criterion) {
    let words = test_words();
    let dict = build_dict(&words);
    c.bench_function("lookup_2000_words", |b| {
        b.iter(|| {
            for word in &words {
                black_box(dict.get_probability(word));
            }
        })
    });
}

criterion_group!(benches, bench_insert, bench_lookup);
criterion_main!(benches);
