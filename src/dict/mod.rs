// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! The dictionary facade: everything the host calls.
//!
//! A `Dictionary` owns its buffer set (trie, terminal table, language-model
//! content, shortcut content) plus the header policy and, for decaying
//! dictionaries, the forgetting curve. All operations run synchronously on
//! the calling thread; the host serializes writers.
//!
//! Error surface follows the engine-wide contract: open and flush return
//! `io::Result`; lookups return `Option`; mutations return `bool`. Corruption
//! detected anywhere flips a sticky flag — after that, mutations are refused
//! and lookups degrade to empty results instead of crashing the host.

pub mod io;
pub mod property;

use std::cell::Cell;
use std::io::ErrorKind;
use std::io::Result as IoResult;
use std::path::Path;

use crate::buffer::codepoints::{code_points_of, MAX_WORD_LENGTH};
use crate::buffer::{ExtendableBuffer, MAX_DICTIONARY_SIZE, MAX_DICT_EXTENDED_REGION_SIZE};
use crate::clock::Clock;
use crate::content::{ShortcutContent, TerminalPositionLookupTable};
use crate::gc::GarbageCollector;
use crate::header::{
    AttributeMap, FormatVersion, HeaderPolicy, BIGRAM_COUNT_KEY, EXTENDED_REGION_SIZE_KEY,
    LAST_DECAYED_TIME_KEY, TRIGRAM_COUNT_KEY, UNIGRAM_COUNT_KEY,
};
use crate::lm::probability::{
    FLAG_IS_NOT_A_WORD, FLAG_IS_POSSIBLY_OFFENSIVE, FLAG_REPRESENTS_BEGINNING_OF_SENTENCE,
};
use crate::lm::{
    blend_bigram_probability, ForgettingCurve, LanguageModelContent, ProbabilityEntry,
    MAX_PREV_WORD_COUNT, MAX_PROBABILITY, NGRAM_ORDER_COUNT,
};
use crate::trie::{PtNodeReader, PtNodeWriter};
use crate::update::{UpdateEngine, WordAttributes, ROOT_ARRAY_POS};

use property::{NgramContext, NgramProperty, UnigramProperty, WordProperty};

// ============================================================================
// OPERATIONAL LIMITS
// ============================================================================

/// Head-room kept below the hard dictionary cap; a dynamic operation that
/// could not fit in this margin must wait for GC instead.
const DYNAMIC_OPERATION_SAFETY_MARGIN: usize = 1024;

/// Internal word standing in for "beginning of sentence" in n-gram contexts.
/// Encoded through the 3-byte code-point path, so it can never collide with
/// typed text.
const BEGINNING_OF_SENTENCE_CODE_POINT: u32 = 0x0A;

/// Supported `get_property` queries.
pub const UNIGRAM_COUNT_QUERY: &str = "UNIGRAM_COUNT";
pub const BIGRAM_COUNT_QUERY: &str = "BIGRAM_COUNT";
pub const MAX_UNIGRAM_COUNT_QUERY: &str = "MAX_UNIGRAM_COUNT";
pub const MAX_BIGRAM_COUNT_QUERY: &str = "MAX_BIGRAM_COUNT";

// ============================================================================
// DICTIONARY
// ============================================================================

pub struct Dictionary {
    header: HeaderPolicy,
    trie: ExtendableBuffer,
    terminal_table: TerminalPositionLookupTable,
    lm: LanguageModelContent,
    shortcuts: ShortcutContent,
    curve: Option<ForgettingCurve>,
    clock: Box<dyn Clock>,
    corrupted: Cell<bool>,
    updatable: bool,
    extended_region_size: usize,
}

impl Dictionary {
    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Create an empty on-memory dictionary.
    pub fn create_on_memory(
        version: FormatVersion,
        locale: &str,
        attributes: &AttributeMap,
        clock: Box<dyn Clock>,
    ) -> IoResult<Self> {
        let header =
            HeaderPolicy::new_for_dictionary(version, locale, attributes, clock.now());
        if !header.is_valid() {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "Decaying dictionary requires historical info",
            ));
        }
        if header.is_decaying_dict() && !version.supports_historical_info() {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("Version {} cannot store historical info", version.raw()),
            ));
        }
        let mut trie = ExtendableBuffer::with_max_additional_size(MAX_DICTIONARY_SIZE);
        {
            let mut writer = PtNodeWriter::new(&mut trie, header.code_point_table());
            writer.write_empty_array()?;
        }
        let curve = Self::build_curve(&header);
        Ok(Self {
            header,
            trie,
            terminal_table: TerminalPositionLookupTable::new(),
            lm: LanguageModelContent::new(MAX_DICTIONARY_SIZE)?,
            shortcuts: ShortcutContent::new(),
            curve,
            clock,
            corrupted: Cell::new(false),
            updatable: true,
            extended_region_size: 0,
        })
    }

    /// Open an existing dictionary directory. Fails closed: any format error
    /// yields an error, never a partially initialized instance.
    pub fn open(dict_dir: &Path, updatable: bool, clock: Box<dyn Clock>) -> IoResult<Self> {
        let header_bytes = std::fs::read(io::dict_file_path(dict_dir, io::HEADER_FILE_EXTENSION)?)?;
        let header = HeaderPolicy::read_from_bytes(&header_bytes)?;

        let body = io::open_body(
            &io::dict_file_path(dict_dir, io::BODY_FILE_EXTENSION)?,
            updatable,
        )?;
        let sections = io::BodySections::parse(body.bytes())?;

        let trie = ExtendableBuffer::from_original(
            body.section(sections.trie),
            MAX_DICTIONARY_SIZE,
        );
        let terminal_table = TerminalPositionLookupTable::from_content(
            body.section(sections.terminal_table),
            MAX_DICTIONARY_SIZE,
        );
        let lm = LanguageModelContent::from_content(
            body.section(sections.lm_map),
            sections.counters,
            MAX_DICTIONARY_SIZE,
        );
        let shortcuts = ShortcutContent::from_content(
            body.section(sections.shortcut_index),
            body.section(sections.shortcut_table),
            body.section(sections.shortcut_strings),
        );
        let curve = Self::build_curve(&header);
        let extended_region_size = header.extended_region_size();
        Ok(Self {
            header,
            trie,
            terminal_table,
            lm,
            shortcuts,
            curve,
            clock,
            corrupted: Cell::new(false),
            updatable,
            extended_region_size,
        })
    }

    /// Write the dictionary to `dict_dir` as-is (no compaction). The growth
    /// since the last compaction is recorded as the extended region.
    pub fn flush(&mut self, dict_dir: &Path) -> IoResult<()> {
        let extended = self.extended_region_size + self.trie.additional_size();
        self.write_files(dict_dir, extended)
    }

    /// Run a decay pass (for decaying dictionaries) and a full GC, then
    /// write the compacted result.
    pub fn flush_with_gc(&mut self, dict_dir: &Path) -> IoResult<()> {
        self.run_gc()?;
        self.write_files(dict_dir, 0)
    }

    pub fn header(&self) -> &HeaderPolicy {
        &self.header
    }

    pub fn is_corrupted(&self) -> bool {
        self.corrupted.get()
    }

    pub fn is_updatable(&self) -> bool {
        self.updatable
    }

    // ------------------------------------------------------------------
    // Unigram operations
    // ------------------------------------------------------------------

    pub fn add_unigram(&mut self, word: &str, property: &UnigramProperty) -> bool {
        if !self.can_mutate() {
            return false;
        }
        let code_points = code_points_of(word);
        let result = self.add_unigram_entry(&code_points, property);
        self.guard_mutation(result)
    }

    pub fn remove_unigram(&mut self, word: &str) -> bool {
        if !self.can_mutate() {
            return false;
        }
        let code_points = code_points_of(word);
        let result = (|| {
            let removed_id = {
                let mut engine = UpdateEngine::new(
                    &mut self.trie,
                    &mut self.terminal_table,
                    self.header.code_point_table(),
                );
                engine.remove_word(&code_points)?
            };
            match removed_id {
                Some(id) => {
                    self.lm.remove_probability_entry(id)?;
                    Ok(true)
                }
                None => Ok(false),
            }
        })();
        self.guard_mutation(result)
    }

    pub fn get_probability(&self, word: &str) -> Option<u8> {
        let result = (|| {
            let Some(id) = self.word_id(&code_points_of(word))? else {
                return Ok(None);
            };
            let Some(entry) = self.lm.probability_entry(id)? else {
                return Ok(None);
            };
            Ok(self.entry_probability(&entry))
        })();
        self.guard_lookup(result)
    }

    pub fn get_word_id(&self, word: &str) -> Option<u32> {
        let result = self.word_id(&code_points_of(word));
        self.guard_lookup(result)
    }

    // ------------------------------------------------------------------
    // N-gram operations
    // ------------------------------------------------------------------

    pub fn add_ngram(&mut self, context: &NgramContext, word: &str, probability: u8) -> bool {
        if !self.can_mutate() || context.is_empty() {
            return false;
        }
        let code_points = code_points_of(word);
        let result = (|| {
            // The target word is auto-created as a placeholder when absent,
            // so a learned n-gram never dangles.
            let target_id = match self.word_id(&code_points)? {
                Some(id) => id,
                None => self.create_placeholder_word(&code_points)?,
            };
            let Some(prev_ids) = self.resolve_or_create_prev_word_ids(context)? else {
                return Ok(false);
            };
            let existing = self.lm.ngram_probability_entry(&prev_ids, target_id)?;
            let entry = self.build_entry(probability, existing.as_ref(), 0);
            self.lm
                .set_ngram_probability_entry(&prev_ids, target_id, &entry)
        })();
        self.guard_mutation(result)
    }

    pub fn remove_ngram(&mut self, context: &NgramContext, word: &str) -> bool {
        if !self.can_mutate() || context.is_empty() {
            return false;
        }
        let result = (|| {
            let Some(target_id) = self.word_id(&code_points_of(word))? else {
                return Ok(false);
            };
            let Some(prev_ids) = self.resolve_prev_word_ids(context)? else {
                return Ok(false);
            };
            self.lm.remove_ngram_probability_entry(&prev_ids, target_id)
        })();
        self.guard_mutation(result)
    }

    /// Probability of `word` after `context`, blending the n-gram delta into
    /// the unigram probability. Falls back to the plain unigram probability
    /// when no entry exists for the full context.
    pub fn get_ngram_probability(&self, context: &NgramContext, word: &str) -> Option<u8> {
        let result = (|| {
            let Some(id) = self.word_id(&code_points_of(word))? else {
                return Ok(None);
            };
            let Some(unigram_entry) = self.lm.probability_entry(id)? else {
                return Ok(None);
            };
            let unigram = self.entry_probability(&unigram_entry);
            let Some(prev_ids) = self.resolve_prev_word_ids(context)? else {
                return Ok(unigram);
            };
            let Some(entry) = self.lm.ngram_probability_entry(&prev_ids, id)? else {
                return Ok(unigram);
            };
            if !entry.is_valid() {
                return Ok(unigram);
            }
            match (self.curve.as_ref(), entry.historical_info()) {
                (Some(curve), Some(info)) => {
                    Ok(Some(curve.probability_of(info, self.clock.now())))
                }
                _ => {
                    // The stored n-gram value is reduced to a 0..15 delta and
                    // mapped onto the gap between the context head word's
                    // probability and the top of the scale.
                    let base = self
                        .lm
                        .probability_entry(prev_ids[0])?
                        .and_then(|e| self.entry_probability(&e))
                        .unwrap_or(0);
                    let delta = entry.probability() >> 3;
                    Ok(Some(blend_bigram_probability(base, delta)))
                }
            }
        })();
        self.guard_lookup(result)
    }

    // ------------------------------------------------------------------
    // Word properties & iteration
    // ------------------------------------------------------------------

    pub fn get_word_property(&self, word: &str) -> Option<WordProperty> {
        let code_points = code_points_of(word);
        let result = (|| {
            let reader = PtNodeReader::new(&self.trie, self.header.code_point_table());
            let Some(node) = reader.find_terminal_node(&code_points, ROOT_ARRAY_POS)? else {
                return Ok(None);
            };
            let id = node.terminal_id.expect("terminal node carries an id");
            let Some(entry) = self.lm.probability_entry(id)? else {
                return Ok(None);
            };
            let shortcuts = self.shortcuts.shortcuts(id)?;
            let ngrams = self.collect_ngrams_from(id)?;
            Ok(Some(WordProperty {
                code_points,
                probability: self.entry_probability(&entry).unwrap_or(0),
                is_not_a_word: node.flags.is_not_a_word() || entry.is_not_a_word(),
                is_possibly_offensive: node.flags.is_possibly_offensive()
                    || entry.is_possibly_offensive(),
                is_beginning_of_sentence: entry.is_beginning_of_sentence(),
                has_ngrams: !ngrams.is_empty(),
                has_shortcuts: !shortcuts.is_empty(),
                historical_info: entry.historical_info().copied(),
                shortcuts,
                ngrams,
            }))
        })();
        self.guard_lookup(result)
    }

    /// Iterate stored words. Token 0 starts; the returned token feeds the
    /// next call; token 0 in the result means iteration is done.
    pub fn get_next_word_and_token(&self, token: u32) -> Option<(Vec<u32>, u32)> {
        let result = (|| {
            let reader = PtNodeReader::new(&self.trie, self.header.code_point_table());
            let size = self.terminal_table.size();
            let mut id = token;
            while id < size {
                if let Some(pos) = self.terminal_table.get_terminal_node_position(id)? {
                    let node = reader.read_node(pos)?;
                    if node.is_terminal() && node.terminal_id == Some(id) {
                        let word = reader.word_code_points(node.head_pos)?;
                        let mut next = id + 1;
                        while next < size {
                            if self.terminal_table.get_terminal_node_position(next)?.is_some() {
                                break;
                            }
                            next += 1;
                        }
                        let next_token = if next < size { next } else { 0 };
                        return Ok(Some((word, next_token)));
                    }
                }
                id += 1;
            }
            Ok(None)
        })();
        self.guard_lookup(result)
    }

    // ------------------------------------------------------------------
    // Policy & diagnostics
    // ------------------------------------------------------------------

    /// Whether compaction should run. With `minds_block_by_gc` the caller is
    /// latency-sensitive, so only size pressure counts; otherwise decay
    /// housekeeping is reason enough.
    pub fn needs_to_run_gc(&self, minds_block_by_gc: bool) -> bool {
        if self.corrupted.get() {
            return false;
        }
        let size_pressure = self.trie.is_near_size_limit()
            || self.lm.is_near_size_limit()
            || self.extended_region_size + self.trie.additional_size()
                > MAX_DICT_EXTENDED_REGION_SIZE
            || self.trie.tail_position() + DYNAMIC_OPERATION_SAFETY_MARGIN >= MAX_DICTIONARY_SIZE;
        if minds_block_by_gc {
            return size_pressure;
        }
        size_pressure
            || (self.header.is_decaying_dict() && self.lm.needs_truncation(&self.max_counts()))
    }

    /// Diagnostic string queries (see the `*_QUERY` constants).
    pub fn get_property(&self, query: &str) -> String {
        match query {
            UNIGRAM_COUNT_QUERY => self.lm.counters()[0].to_string(),
            BIGRAM_COUNT_QUERY => self.lm.counters()[1].to_string(),
            MAX_UNIGRAM_COUNT_QUERY => self.header.max_unigram_count().to_string(),
            MAX_BIGRAM_COUNT_QUERY => self.header.max_bigram_count().to_string(),
            _ => String::new(),
        }
    }

    // ------------------------------------------------------------------
    // GC & serialization
    // ------------------------------------------------------------------

    fn run_gc(&mut self) -> IoResult<()> {
        let now = self.clock.now();
        if let Some(curve) = self.curve.as_ref() {
            let max_counts = self.max_counts();
            self.lm.update_all_probability_entries(curve, now, &max_counts)?;
            self.header
                .attributes_mut()
                .set_int(LAST_DECAYED_TIME_KEY, now);
        }
        let outcome = GarbageCollector::new(
            &mut self.trie,
            &mut self.terminal_table,
            &self.lm,
            &self.shortcuts,
            self.header.code_point_table(),
            self.curve.as_ref(),
            now,
        )
        .run(MAX_DICTIONARY_SIZE, MAX_DICTIONARY_SIZE)?;
        self.trie = outcome.trie;
        self.terminal_table = outcome.terminal_table;
        self.lm = outcome.lm;
        self.shortcuts = outcome.shortcuts;
        self.extended_region_size = 0;
        Ok(())
    }

    fn write_files(&mut self, dict_dir: &Path, extended_region_size: usize) -> IoResult<()> {
        let counters = *self.lm.counters();
        let attrs = self.header.attributes_mut();
        attrs.set_int(UNIGRAM_COUNT_KEY, counters[0]);
        attrs.set_int(BIGRAM_COUNT_KEY, counters[1]);
        attrs.set_int(TRIGRAM_COUNT_KEY, counters[2]);
        attrs.set_int(EXTENDED_REGION_SIZE_KEY, extended_region_size as u32);

        let header_bytes = self.header.write_to_vec();
        let (sc_index, sc_table, sc_strings) = self.shortcuts.to_vecs();
        let body = io::write_body(
            &self.trie.to_vec(),
            &self.terminal_table.to_vec(),
            &self.lm.map_to_vec(),
            &counters,
            &sc_index,
            &sc_table,
            &sc_strings,
        );
        io::flush_to_dir(dict_dir, &header_bytes, &body)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn build_curve(header: &HeaderPolicy) -> Option<ForgettingCurve> {
        if header.is_decaying_dict() {
            Some(ForgettingCurve::new(
                header.forgetting_curve_table_id(),
                header.forgetting_curve_duration(),
                header.forgetting_curve_occurrences_to_level_up(),
            ))
        } else {
            None
        }
    }

    fn max_counts(&self) -> [u32; NGRAM_ORDER_COUNT] {
        [
            self.header.max_unigram_count(),
            self.header.max_bigram_count(),
            self.header.max_trigram_count(),
        ]
    }

    fn add_unigram_entry(
        &mut self,
        code_points: &[u32],
        property: &UnigramProperty,
    ) -> IoResult<bool> {
        if code_points.is_empty() || code_points.len() > MAX_WORD_LENGTH {
            return Ok(false);
        }
        let added = {
            let mut engine = UpdateEngine::new(
                &mut self.trie,
                &mut self.terminal_table,
                self.header.code_point_table(),
            );
            engine.add_word(
                code_points,
                WordAttributes {
                    is_not_a_word: property.is_not_a_word,
                    is_possibly_offensive: property.is_possibly_offensive,
                },
            )?
        };
        let existing = self.lm.probability_entry(added.terminal_id)?;
        let mut flags = 0u8;
        if property.is_not_a_word {
            flags |= FLAG_IS_NOT_A_WORD;
        }
        if property.is_possibly_offensive {
            flags |= FLAG_IS_POSSIBLY_OFFENSIVE;
        }
        if property.is_beginning_of_sentence {
            flags |= FLAG_REPRESENTS_BEGINNING_OF_SENTENCE;
        }
        let entry = self
            .build_entry(property.probability, existing.as_ref(), flags);
        self.lm.set_probability_entry(added.terminal_id, &entry)?;
        for shortcut in &property.shortcuts {
            self.shortcuts.add_shortcut(
                added.terminal_id,
                &shortcut.code_points,
                shortcut.probability,
            )?;
        }
        Ok(true)
    }

    /// Entry construction shared by unigram and n-gram adds: decaying
    /// dictionaries record an occurrence, static ones store the probability.
    fn build_entry(
        &self,
        probability: u8,
        existing: Option<&ProbabilityEntry>,
        extra_flags: u8,
    ) -> ProbabilityEntry {
        let mut entry = match self.curve.as_ref() {
            Some(curve) => {
                let info = curve.on_occurrence(
                    existing.and_then(|e| e.historical_info()),
                    self.clock.now(),
                );
                ProbabilityEntry::new_historical(info)
            }
            None => ProbabilityEntry::new(probability),
        };
        if extra_flags != 0 {
            entry = entry.with_flag(extra_flags, true);
        }
        entry
    }

    fn word_id(&self, code_points: &[u32]) -> IoResult<Option<u32>> {
        let reader = PtNodeReader::new(&self.trie, self.header.code_point_table());
        Ok(reader
            .find_terminal_node(code_points, ROOT_ARRAY_POS)?
            .and_then(|node| node.terminal_id))
    }

    /// Create a word that exists structurally but has no probability yet.
    fn create_placeholder_word(&mut self, code_points: &[u32]) -> IoResult<u32> {
        let added = {
            let mut engine = UpdateEngine::new(
                &mut self.trie,
                &mut self.terminal_table,
                self.header.code_point_table(),
            );
            engine.add_word(code_points, WordAttributes::default())?
        };
        if self.lm.probability_entry(added.terminal_id)?.is_none() {
            self.lm
                .set_probability_entry(added.terminal_id, &ProbabilityEntry::invalid())?;
        }
        Ok(added.terminal_id)
    }

    /// Resolve the context to terminal ids, nearest previous word first.
    /// Read-only: an unresolvable context yields `None`.
    fn resolve_prev_word_ids(&self, context: &NgramContext) -> IoResult<Option<Vec<u32>>> {
        let mut ids = Vec::new();
        for word in context.prev_words() {
            if ids.len() >= MAX_PREV_WORD_COUNT {
                break;
            }
            match self.word_id(word)? {
                Some(id) => ids.push(id),
                None => return Ok(None),
            }
        }
        if context.begins_with_beginning_of_sentence() && ids.len() < MAX_PREV_WORD_COUNT {
            match self.word_id(&[BEGINNING_OF_SENTENCE_CODE_POINT])? {
                Some(id) => ids.push(id),
                None => return Ok(None),
            }
        }
        if ids.is_empty() {
            return Ok(None);
        }
        Ok(Some(ids))
    }

    /// Like [`Self::resolve_prev_word_ids`], but auto-creates missing
    /// previous words (and the BoS marker) for the learning path.
    fn resolve_or_create_prev_word_ids(
        &mut self,
        context: &NgramContext,
    ) -> IoResult<Option<Vec<u32>>> {
        let mut ids = Vec::new();
        for word in context.prev_words().to_vec() {
            if ids.len() >= MAX_PREV_WORD_COUNT {
                break;
            }
            match self.word_id(&word)? {
                Some(id) => ids.push(id),
                None => ids.push(self.create_placeholder_word(&word)?),
            }
        }
        if context.begins_with_beginning_of_sentence() && ids.len() < MAX_PREV_WORD_COUNT {
            let bos = [BEGINNING_OF_SENTENCE_CODE_POINT];
            match self.word_id(&bos)? {
                Some(id) => ids.push(id),
                None => {
                    let id = self.create_placeholder_word(&bos)?;
                    // The marker is a real (if untypeable) word with the top
                    // probability, so sentence-initial contexts always
                    // resolve.
                    self.lm.set_probability_entry(
                        id,
                        &ProbabilityEntry::new(MAX_PROBABILITY)
                            .with_flag(FLAG_REPRESENTS_BEGINNING_OF_SENTENCE, true)
                            .with_flag(FLAG_IS_NOT_A_WORD, true),
                    )?;
                    ids.push(id);
                }
            }
        }
        if ids.is_empty() {
            return Ok(None);
        }
        Ok(Some(ids))
    }

    fn collect_ngrams_from(&self, word_id: u32) -> IoResult<Vec<NgramProperty>> {
        let mut out = Vec::new();
        let dumps = self.lm.export_entries()?;
        let reader = PtNodeReader::new(&self.trie, self.header.code_point_table());
        for dump in dumps {
            if dump.prev_word_ids.as_slice() != [word_id] || !dump.entry.is_valid() {
                continue;
            }
            let Some(pos) = self.terminal_table.get_terminal_node_position(dump.word_id)? else {
                continue;
            };
            let target = reader.word_code_points(reader.read_node(pos)?.head_pos)?;
            let probability = match (self.curve.as_ref(), dump.entry.historical_info()) {
                (Some(curve), Some(info)) => curve.probability_of(info, self.clock.now()),
                _ => dump.entry.probability(),
            };
            out.push(NgramProperty {
                target_code_points: target,
                probability,
                historical_info: dump.entry.historical_info().copied(),
            });
        }
        Ok(out)
    }

    fn entry_probability(&self, entry: &ProbabilityEntry) -> Option<u8> {
        if !entry.is_valid() {
            return None;
        }
        match (self.curve.as_ref(), entry.historical_info()) {
            (Some(curve), Some(info)) => Some(curve.probability_of(info, self.clock.now())),
            _ => Some(entry.probability()),
        }
    }

    fn can_mutate(&self) -> bool {
        self.updatable
            && !self.corrupted.get()
            && self.trie.is_writable()
            && self.trie.tail_position() + DYNAMIC_OPERATION_SAFETY_MARGIN < MAX_DICTIONARY_SIZE
    }

    /// Map a lookup result onto the neutral-failure contract, latching the
    /// corruption flag on structural errors.
    fn guard_lookup<T>(&self, result: IoResult<Option<T>>) -> Option<T> {
        match result {
            Ok(value) => value,
            Err(error) => {
                self.note_error(&error);
                None
            }
        }
    }

    fn guard_mutation(&self, result: IoResult<bool>) -> bool {
        match result {
            Ok(value) => value,
            Err(error) => {
                self.note_error(&error);
                false
            }
        }
    }

    fn note_error(&self, error: &std::io::Error) {
        match error.kind() {
            // Capacity and writability failures are recoverable (run GC,
            // retry); anything structural latches the corruption flag.
            ErrorKind::OutOfMemory | ErrorKind::PermissionDenied => {}
            _ => {
                eprintln!("Dictionary error, treating as corrupted: {}", error);
                self.corrupted.set(true);
            }
        }
    }
}
