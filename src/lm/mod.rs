// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! The probability model: entries, the forgetting curve, and the n-gram store.

pub mod content;
pub mod decay;
pub mod probability;

pub use content::{LanguageModelContent, NgramEntryDump, MAX_PREV_WORD_COUNT, NGRAM_ORDER_COUNT};
pub use decay::ForgettingCurve;
pub use probability::{
    blend_bigram_probability, HistoricalInfo, ProbabilityEntry, MAX_BIGRAM_ENCODED_PROBABILITY,
    MAX_PROBABILITY,
};
