// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Transient views exchanged with the host: word properties and n-gram
//! contexts. Nothing in this module is persisted; everything is materialized
//! from the trie and the language-model content at query time.

use crate::content::ShortcutTarget;
use crate::lm::HistoricalInfo;

/// The ordered previous-word context of an n-gram operation, nearest word
/// first. Ephemeral: built by the caller, consumed by one operation.
#[derive(Debug, Clone, Default)]
pub struct NgramContext {
    prev_words: Vec<Vec<u32>>,
    begins_with_beginning_of_sentence: bool,
}

impl NgramContext {
    pub fn new(prev_words: Vec<Vec<u32>>, begins_with_beginning_of_sentence: bool) -> Self {
        Self {
            prev_words,
            begins_with_beginning_of_sentence,
        }
    }

    /// Context of a single previous word.
    pub fn of_word(word: &[u32]) -> Self {
        Self::new(vec![word.to_vec()], false)
    }

    /// Sentence-initial context: the only "previous word" is the
    /// beginning-of-sentence marker.
    pub fn beginning_of_sentence() -> Self {
        Self::new(Vec::new(), true)
    }

    pub fn prev_words(&self) -> &[Vec<u32>] {
        &self.prev_words
    }

    pub fn begins_with_beginning_of_sentence(&self) -> bool {
        self.begins_with_beginning_of_sentence
    }

    pub fn is_empty(&self) -> bool {
        self.prev_words.is_empty() && !self.begins_with_beginning_of_sentence
    }
}

/// Payload of a unigram add.
#[derive(Debug, Clone)]
pub struct UnigramProperty {
    pub probability: u8,
    pub is_not_a_word: bool,
    pub is_possibly_offensive: bool,
    pub is_beginning_of_sentence: bool,
    pub shortcuts: Vec<ShortcutTarget>,
}

impl UnigramProperty {
    pub fn with_probability(probability: u8) -> Self {
        Self {
            probability,
            is_not_a_word: false,
            is_possibly_offensive: false,
            is_beginning_of_sentence: false,
            shortcuts: Vec::new(),
        }
    }
}

/// One stored n-gram as reported back to the host: the target word seen from
/// a context.
#[derive(Debug, Clone)]
pub struct NgramProperty {
    pub target_code_points: Vec<u32>,
    pub probability: u8,
    pub historical_info: Option<HistoricalInfo>,
}

/// The fully materialized view of one stored word.
#[derive(Debug, Clone)]
pub struct WordProperty {
    pub code_points: Vec<u32>,
    pub probability: u8,
    pub is_not_a_word: bool,
    pub is_possibly_offensive: bool,
    pub is_beginning_of_sentence: bool,
    pub has_ngrams: bool,
    pub has_shortcuts: bool,
    pub historical_info: Option<HistoricalInfo>,
    pub shortcuts: Vec<ShortcutTarget>,
    pub ngrams: Vec<NgramProperty>,
}
