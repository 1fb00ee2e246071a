// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Probability entries: the per-word payload stored in the trie map.
//!
//! Two shapes share one 54-bit encoding. Static dictionaries store a flat
//! probability byte; decaying dictionaries store historical info — timestamp,
//! forgetting-curve level, occurrence count — and derive the probability at
//! read time. The flags byte sits at a fixed position so decoding never needs
//! out-of-band format knowledge, and the "not valid" flag lets an entry be
//! logically absent while its slot still exists.

use crate::lm::decay::{MAX_COUNT, MAX_LEVEL};

// ============================================================================
// PROBABILITY SCALE
// ============================================================================

/// Top of the probability scale.
pub const MAX_PROBABILITY: u8 = 127;

/// Range of the encoded bigram delta (0..=15).
pub const MAX_BIGRAM_ENCODED_PROBABILITY: u8 = 15;

/// Blend a unigram probability with a bigram delta: the delta maps onto the
/// gap between the unigram probability and the top of the scale.
pub fn blend_bigram_probability(unigram_probability: u8, bigram_delta: u8) -> u8 {
    let unigram = u32::from(unigram_probability.min(MAX_PROBABILITY));
    let delta = u32::from(bigram_delta.min(MAX_BIGRAM_ENCODED_PROBABILITY));
    let blended = unigram
        + (delta + 1) * (u32::from(MAX_PROBABILITY) - unigram)
            / (u32::from(MAX_BIGRAM_ENCODED_PROBABILITY) + 1);
    blended.min(u32::from(MAX_PROBABILITY)) as u8
}

// ============================================================================
// ENTRY FLAGS
// ============================================================================

pub const FLAG_NOT_A_VALID_ENTRY: u8 = 0x01;
pub const FLAG_REPRESENTS_BEGINNING_OF_SENTENCE: u8 = 0x02;
pub const FLAG_IS_NOT_A_WORD: u8 = 0x04;
pub const FLAG_IS_POSSIBLY_OFFENSIVE: u8 = 0x08;
pub const FLAG_HAS_HISTORICAL_INFO: u8 = 0x10;

// Encoding layout (54 bits total, fits the trie map's value range):
//   flags:      bits 46..54
//   flat:       probability in bits 0..8
//   historical: timestamp bits 14..46, level bits 10..14, count bits 0..10
const FLAGS_SHIFT: u32 = 46;
const TIMESTAMP_SHIFT: u32 = 14;
const LEVEL_SHIFT: u32 = 10;
const LEVEL_MASK: u64 = 0xF;
const COUNT_MASK: u64 = 0x3FF;

// ============================================================================
// HISTORICAL INFO
// ============================================================================

/// Forgetting-curve state for one entry of a decaying dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoricalInfo {
    /// Seconds since epoch of the most recent observation.
    pub timestamp: u32,
    /// Forgetting-curve level, 0..=15.
    pub level: u8,
    /// Occurrences at the current level, saturating at the field width.
    pub count: u16,
}

impl HistoricalInfo {
    pub fn new(timestamp: u32, level: u8, count: u16) -> Self {
        Self {
            timestamp,
            level: level.min(MAX_LEVEL),
            count: count.min(MAX_COUNT),
        }
    }
}

// ============================================================================
// PROBABILITY ENTRY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbabilityEntry {
    flags: u8,
    probability: u8,
    historical_info: Option<HistoricalInfo>,
}

impl ProbabilityEntry {
    /// Flat entry for static dictionaries.
    pub fn new(probability: u8) -> Self {
        Self {
            flags: 0,
            probability: probability.min(MAX_PROBABILITY),
            historical_info: None,
        }
    }

    /// Entry carrying forgetting-curve state.
    pub fn new_historical(info: HistoricalInfo) -> Self {
        Self {
            flags: FLAG_HAS_HISTORICAL_INFO,
            probability: 0,
            historical_info: Some(info),
        }
    }

    /// Placeholder entry: present in storage, logically absent. Used for
    /// auto-created n-gram target words.
    pub fn invalid() -> Self {
        Self {
            flags: FLAG_NOT_A_VALID_ENTRY,
            probability: 0,
            historical_info: None,
        }
    }

    pub fn with_flag(mut self, flag: u8, set: bool) -> Self {
        if set {
            self.flags |= flag;
        } else {
            self.flags &= !flag;
        }
        self
    }

    pub fn with_historical_info(mut self, info: HistoricalInfo) -> Self {
        self.flags |= FLAG_HAS_HISTORICAL_INFO;
        self.historical_info = Some(info);
        self
    }

    pub fn is_valid(&self) -> bool {
        self.flags & FLAG_NOT_A_VALID_ENTRY == 0
    }

    pub fn is_beginning_of_sentence(&self) -> bool {
        self.flags & FLAG_REPRESENTS_BEGINNING_OF_SENTENCE != 0
    }

    pub fn is_not_a_word(&self) -> bool {
        self.flags & FLAG_IS_NOT_A_WORD != 0
    }

    pub fn is_possibly_offensive(&self) -> bool {
        self.flags & FLAG_IS_POSSIBLY_OFFENSIVE != 0
    }

    pub fn has_historical_info(&self) -> bool {
        self.flags & FLAG_HAS_HISTORICAL_INFO != 0
    }

    /// Flat probability. For historical entries the forgetting curve owns the
    /// probability; callers go through `ForgettingCurve::decode_probability`.
    pub fn probability(&self) -> u8 {
        self.probability
    }

    pub fn historical_info(&self) -> Option<&HistoricalInfo> {
        self.historical_info.as_ref()
    }

    // ------------------------------------------------------------------
    // Wire form
    // ------------------------------------------------------------------

    pub fn encode(&self) -> u64 {
        let flags = (u64::from(self.flags)) << FLAGS_SHIFT;
        match &self.historical_info {
            Some(info) => {
                flags
                    | (u64::from(info.timestamp) << TIMESTAMP_SHIFT)
                    | ((u64::from(info.level) & LEVEL_MASK) << LEVEL_SHIFT)
                    | (u64::from(info.count) & COUNT_MASK)
            }
            None => flags | u64::from(self.probability),
        }
    }

    pub fn decode(encoded: u64) -> Self {
        let flags = ((encoded >> FLAGS_SHIFT) & 0xFF) as u8;
        if flags & FLAG_HAS_HISTORICAL_INFO != 0 {
            let timestamp = ((encoded >> TIMESTAMP_SHIFT) & 0xFFFF_FFFF) as u32;
            let level = ((encoded >> LEVEL_SHIFT) & LEVEL_MASK) as u8;
            let count = (encoded & COUNT_MASK) as u16;
            Self {
                flags,
                probability: 0,
                historical_info: Some(HistoricalInfo {
                    timestamp,
                    level,
                    count,
                }),
            }
        } else {
            Self {
                flags,
                probability: (encoded & 0xFF) as u8,
                historical_info: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::trie_map::MAX_VALUE;

    #[test]
    fn flat_entry_roundtrip() {
        let entry = ProbabilityEntry::new(120)
            .with_flag(FLAG_IS_NOT_A_WORD, true);
        let decoded = ProbabilityEntry::decode(entry.encode());
        assert_eq!(decoded, entry);
        assert!(decoded.is_valid());
        assert!(decoded.is_not_a_word());
        assert_eq!(decoded.probability(), 120);
    }

    #[test]
    fn historical_entry_roundtrip() {
        let info = HistoricalInfo::new(1_700_000_000, 13, 999);
        let entry = ProbabilityEntry::new_historical(info);
        let decoded = ProbabilityEntry::decode(entry.encode());
        assert_eq!(decoded.historical_info(), Some(&info));
        assert!(decoded.has_historical_info());
    }

    #[test]
    fn encoding_fits_the_trie_map_value_range() {
        let worst = ProbabilityEntry::new_historical(HistoricalInfo::new(u32::MAX, 15, 0x3FF))
            .with_flag(0xFF, true);
        assert!(worst.encode() <= MAX_VALUE);
    }

    #[test]
    fn invalid_entries_are_logically_absent() {
        let entry = ProbabilityEntry::invalid();
        assert!(!entry.is_valid());
        let decoded = ProbabilityEntry::decode(entry.encode());
        assert!(!decoded.is_valid());
    }

    #[test]
    fn bigram_blend_matches_the_formula() {
        // delta maps onto the gap between unigram and max.
        assert_eq!(blend_bigram_probability(120, 15), 127);
        assert_eq!(blend_bigram_probability(120, 0), 120);
        // Example from the scale midpoint: gap 7, delta 8 -> 120 + 9*7/16.
        assert_eq!(blend_bigram_probability(120, 8), 120 + (9 * 7) / 16);
        assert_eq!(blend_bigram_probability(0, 15), 127);
        assert_eq!(blend_bigram_probability(MAX_PROBABILITY, 15), MAX_PROBABILITY);
    }

    #[test]
    fn blend_is_monotone_in_delta() {
        for unigram in [0u8, 30, 90, 127] {
            let mut previous = 0;
            for delta in 0..=MAX_BIGRAM_ENCODED_PROBABILITY {
                let blended = blend_bigram_probability(unigram, delta);
                assert!(blended >= previous);
                previous = blended;
            }
        }
    }
}
