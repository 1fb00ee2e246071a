// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Language-model content: probability entries keyed by context chains.
//!
//! The root level of the trie map holds one entry per word (keyed by terminal
//! id). Each entry's next-level sub-map extends the *context*: walking
//! root → prev₁ → prev₂ and then looking up a target id reads the trigram
//! entry for "target after prev₂ prev₁". The store does no backoff itself —
//! composing shorter contexts is the caller's policy.
//!
//! Global counters track how many entries exist per n-gram order. They drive
//! the decay/truncation policy for continuously learned dictionaries and are
//! halved (never reset) when a fixed-width counter approaches overflow, which
//! preserves relative magnitudes without wraparound.

use std::collections::HashMap;
use std::io;

use crate::buffer::OriginalContent;
use crate::lm::decay::ForgettingCurve;
use crate::lm::probability::ProbabilityEntry;
use crate::table::{TrieMap, ROOT_BITMAP_ENTRY_INDEX};

// ============================================================================
// LIMITS
// ============================================================================

/// Longest supported context: two previous words (trigrams).
pub const MAX_PREV_WORD_COUNT: usize = 2;

/// N-gram orders tracked by the global counters.
pub const NGRAM_ORDER_COUNT: usize = MAX_PREV_WORD_COUNT + 1;

/// Halve all counters once any of them reaches this.
const COUNTER_HALVING_THRESHOLD: u32 = u32::MAX / 2;

/// Orders may overshoot their configured maximum by 20% before a decay pass
/// becomes mandatory.
pub const ENTRY_COUNT_OVERSHOOT_NUMERATOR: u32 = 12;
pub const ENTRY_COUNT_OVERSHOOT_DENOMINATOR: u32 = 10;

/// One exported n-gram entry: the context chain (nearest previous word
/// first), the target word id, and the raw entry.
#[derive(Debug, Clone)]
pub struct NgramEntryDump {
    pub prev_word_ids: Vec<u32>,
    pub word_id: u32,
    pub entry: ProbabilityEntry,
}

pub struct LanguageModelContent {
    map: TrieMap,
    counters: [u32; NGRAM_ORDER_COUNT],
}

impl LanguageModelContent {
    pub fn new(max_additional_size: usize) -> io::Result<Self> {
        Ok(Self {
            map: TrieMap::new(max_additional_size)?,
            counters: [0; NGRAM_ORDER_COUNT],
        })
    }

    pub fn from_content(
        map_content: OriginalContent,
        counters: [u32; NGRAM_ORDER_COUNT],
        max_additional_size: usize,
    ) -> Self {
        Self {
            map: TrieMap::from_content(map_content, max_additional_size),
            counters,
        }
    }

    pub fn counters(&self) -> &[u32; NGRAM_ORDER_COUNT] {
        &self.counters
    }

    pub fn map_to_vec(&self) -> Vec<u8> {
        self.map.to_vec()
    }

    pub fn is_near_size_limit(&self) -> bool {
        self.map.is_near_size_limit()
    }

    // ------------------------------------------------------------------
    // Unigram entries
    // ------------------------------------------------------------------

    pub fn probability_entry(&self, word_id: u32) -> io::Result<Option<ProbabilityEntry>> {
        Ok(self.map.get(word_id)?.map(ProbabilityEntry::decode))
    }

    pub fn set_probability_entry(
        &mut self,
        word_id: u32,
        entry: &ProbabilityEntry,
    ) -> io::Result<()> {
        let existed_valid = self
            .map
            .get(word_id)?
            .map(|v| ProbabilityEntry::decode(v).is_valid())
            .unwrap_or(false);
        self.map.put(word_id, entry.encode())?;
        // Counters track logically present entries only; placeholders are
        // free.
        if entry.is_valid() && !existed_valid {
            self.increment_counter(0);
        } else if !entry.is_valid() && existed_valid {
            self.counters[0] = self.counters[0].saturating_sub(1);
        }
        Ok(())
    }

    /// Remove a word's root entry. Sub-maps hanging off it (contexts through
    /// this word) die with it; the entry counts are re-derived by the next
    /// GC, so only the unigram counter is adjusted here.
    pub fn remove_probability_entry(&mut self, word_id: u32) -> io::Result<bool> {
        let removed = self.map.remove(word_id)?;
        if removed {
            self.counters[0] = self.counters[0].saturating_sub(1);
        }
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // N-gram entries
    // ------------------------------------------------------------------

    /// Entry for `word_id` after the context `prev_word_ids` (nearest
    /// previous word first).
    pub fn ngram_probability_entry(
        &self,
        prev_word_ids: &[u32],
        word_id: u32,
    ) -> io::Result<Option<ProbabilityEntry>> {
        let Some(level) = self.context_level(prev_word_ids)? else {
            return Ok(None);
        };
        Ok(self.map.get_at(word_id, level)?.map(ProbabilityEntry::decode))
    }

    /// Store an n-gram entry, materializing the context chain. The nearest
    /// previous word must already have a root entry (the dictionary layer
    /// guarantees that); deeper waypoints are auto-created as placeholder
    /// entries when absent.
    pub fn set_ngram_probability_entry(
        &mut self,
        prev_word_ids: &[u32],
        word_id: u32,
        entry: &ProbabilityEntry,
    ) -> io::Result<bool> {
        if prev_word_ids.is_empty() || prev_word_ids.len() > MAX_PREV_WORD_COUNT {
            return Ok(false);
        }
        let mut level = ROOT_BITMAP_ENTRY_INDEX;
        for (i, &prev_id) in prev_word_ids.iter().enumerate() {
            if self.map.get_at(prev_id, level)?.is_none() {
                if i == 0 {
                    return Ok(false);
                }
                self.map
                    .put_at(prev_id, ProbabilityEntry::invalid().encode(), level)?;
            }
            match self.map.get_next_level_index(prev_id, level)? {
                Some(next) => level = next,
                None => return Ok(false),
            }
        }
        let existed_valid = self
            .map
            .get_at(word_id, level)?
            .map(|v| ProbabilityEntry::decode(v).is_valid())
            .unwrap_or(false);
        self.map.put_at(word_id, entry.encode(), level)?;
        if entry.is_valid() && !existed_valid {
            self.increment_counter(prev_word_ids.len());
        } else if !entry.is_valid() && existed_valid {
            let order = prev_word_ids.len();
            self.counters[order] = self.counters[order].saturating_sub(1);
        }
        Ok(true)
    }

    pub fn remove_ngram_probability_entry(
        &mut self,
        prev_word_ids: &[u32],
        word_id: u32,
    ) -> io::Result<bool> {
        if prev_word_ids.is_empty() || prev_word_ids.len() > MAX_PREV_WORD_COUNT {
            return Ok(false);
        }
        let Some(level) = self.context_level(prev_word_ids)? else {
            return Ok(false);
        };
        let removed = self.map.remove_at(word_id, level)?;
        if removed {
            let order = prev_word_ids.len();
            self.counters[order] = self.counters[order].saturating_sub(1);
        }
        Ok(removed)
    }

    fn context_level(&self, prev_word_ids: &[u32]) -> io::Result<Option<u32>> {
        let mut level = ROOT_BITMAP_ENTRY_INDEX;
        for &prev_id in prev_word_ids {
            match self.map.read_next_level_index(prev_id, level)? {
                Some(next) => level = next,
                None => return Ok(None),
            }
        }
        Ok(Some(level))
    }

    // ------------------------------------------------------------------
    // Iteration / export
    // ------------------------------------------------------------------

    /// Every entry in the store, unigrams included (empty context chain).
    pub fn export_entries(&self) -> io::Result<Vec<NgramEntryDump>> {
        let mut out = Vec::new();
        let mut chain = Vec::new();
        self.export_level(ROOT_BITMAP_ENTRY_INDEX, &mut chain, &mut out)?;
        Ok(out)
    }

    fn export_level(
        &self,
        level: u32,
        chain: &mut Vec<u32>,
        out: &mut Vec<NgramEntryDump>,
    ) -> io::Result<()> {
        for entry in self.map.entries_at(level)? {
            out.push(NgramEntryDump {
                prev_word_ids: chain.clone(),
                word_id: entry.key,
                entry: ProbabilityEntry::decode(entry.value),
            });
            if let Some(next) = entry.next_level {
                if chain.len() < MAX_PREV_WORD_COUNT {
                    chain.push(entry.key);
                    self.export_level(next, chain, out)?;
                    chain.pop();
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Decay & truncation
    // ------------------------------------------------------------------

    /// Whether the per-order counts demand a decay pass.
    pub fn needs_truncation(&self, max_counts: &[u32; NGRAM_ORDER_COUNT]) -> bool {
        self.counters.iter().zip(max_counts).any(|(&count, &max)| {
            count > max / ENTRY_COUNT_OVERSHOOT_DENOMINATOR * ENTRY_COUNT_OVERSHOOT_NUMERATOR
        })
    }

    /// The decay pass over every entry: apply elapsed-time level decay, drop
    /// entries that decayed out, then evict by ascending priority until each
    /// order is back under its maximum. Counters are recomputed from what
    /// actually survived.
    pub fn update_all_probability_entries(
        &mut self,
        curve: &ForgettingCurve,
        now: u32,
        max_counts: &[u32; NGRAM_ORDER_COUNT],
    ) -> io::Result<()> {
        let entries = self.export_entries()?;
        let mut survivors: Vec<NgramEntryDump> = Vec::with_capacity(entries.len());
        for mut dump in entries {
            let Some(info) = dump.entry.historical_info().copied() else {
                // Entries without historical info (placeholders) pass
                // through the decay pass untouched.
                survivors.push(dump);
                continue;
            };
            match curve.decay(&info, now) {
                Some(updated) => {
                    dump.entry = dump.entry.with_historical_info(updated);
                    survivors.push(dump);
                }
                None => self.drop_entry(&dump)?,
            }
        }

        // Per-order truncation by ascending priority.
        for order in 0..NGRAM_ORDER_COUNT {
            let mut of_order: Vec<&NgramEntryDump> = survivors
                .iter()
                .filter(|d| d.prev_word_ids.len() == order && d.entry.is_valid())
                .collect();
            let max = max_counts[order] as usize;
            if of_order.len() <= max {
                continue;
            }
            of_order.sort_by_key(|d| {
                d.entry
                    .historical_info()
                    .map(ForgettingCurve::priority)
                    .unwrap_or((0, 0, 0))
            });
            let evict: Vec<NgramEntryDump> = of_order[..of_order.len() - max]
                .iter()
                .map(|d| (*d).clone())
                .collect();
            for dump in &evict {
                self.drop_entry(dump)?;
            }
            survivors.retain(|d| {
                !(d.prev_word_ids.len() == order
                    && evict
                        .iter()
                        .any(|e| e.word_id == d.word_id && e.prev_word_ids == d.prev_word_ids))
            });
        }

        // Write back surviving historical updates and recount (valid
        // entries only; placeholders don't occupy quota).
        let mut counters = [0u32; NGRAM_ORDER_COUNT];
        for dump in &survivors {
            let order = dump.prev_word_ids.len();
            if dump.entry.is_valid() {
                counters[order] = counters[order].saturating_add(1);
            }
            if dump.prev_word_ids.is_empty() {
                self.map.put(dump.word_id, dump.entry.encode())?;
            } else if let Some(level) = self.context_level(&dump.prev_word_ids)? {
                self.map.put_at(dump.word_id, dump.entry.encode(), level)?;
            }
        }
        self.counters = counters;
        Ok(())
    }

    /// Remove one entry, or invalidate it in place when it still anchors a
    /// context chain other entries depend on.
    fn drop_entry(&mut self, dump: &NgramEntryDump) -> io::Result<()> {
        let level = match self.context_level(&dump.prev_word_ids)? {
            Some(level) => level,
            None => return Ok(()),
        };
        let has_descendants = match self.map.read_next_level_index(dump.word_id, level)? {
            Some(next) => !self.map.entries_at(next)?.is_empty(),
            None => false,
        };
        if has_descendants {
            self.map
                .put_at(dump.word_id, ProbabilityEntry::invalid().encode(), level)?;
        } else {
            self.map.remove_at(dump.word_id, level)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // GC
    // ------------------------------------------------------------------

    /// Rebuild into a fresh store, renumbering word ids through `id_map` and
    /// dropping every entry touching a dead id. Counters are recomputed.
    pub fn run_gc(
        &self,
        id_map: &HashMap<u32, u32>,
        max_additional_size: usize,
    ) -> io::Result<LanguageModelContent> {
        let mut fresh = LanguageModelContent::new(max_additional_size)?;
        'entry: for dump in self.export_entries()? {
            let Some(&new_word_id) = id_map.get(&dump.word_id) else {
                continue;
            };
            let mut new_chain = Vec::with_capacity(dump.prev_word_ids.len());
            for prev in &dump.prev_word_ids {
                match id_map.get(prev) {
                    Some(&mapped) => new_chain.push(mapped),
                    None => continue 'entry,
                }
            }
            if new_chain.is_empty() {
                fresh.set_probability_entry(new_word_id, &dump.entry)?;
            } else {
                // Context waypoints are exported before their descendants
                // (pre-order), so the chain's entries already exist.
                fresh.set_ngram_probability_entry(&new_chain, new_word_id, &dump.entry)?;
            }
        }
        Ok(fresh)
    }

    fn increment_counter(&mut self, order: usize) {
        if self.counters[order] >= COUNTER_HALVING_THRESHOLD {
            for counter in &mut self.counters {
                *counter /= 2;
            }
        }
        self.counters[order] = self.counters[order].saturating_add(1);
    }
}
