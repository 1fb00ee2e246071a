// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Shortcut content: per-word expansion targets ("omw" → "on my way").
//!
//! A block-sparse table maps a terminal id to the head of its shortcut list
//! in the string pool. List entries are contiguous: `[flags][probability]
//! [target code points, 0x1F-terminated]`, with bit 0 of the flags marking
//! "another entry follows". Lists are immutable once written — updating one
//! rewrites the whole list at the pool tail and repoints the table, leaving
//! the old bytes for GC.

use std::collections::HashMap;
use std::io;

use crate::buffer::codepoints::{decode_code_points, encode_code_points};
use crate::buffer::{ExtendableBuffer, OriginalContent, DEFAULT_MAX_ADDITIONAL_BUFFER_SIZE};
use crate::table::SparseTable;

/// Probability given to whitelist shortcuts (always-offered corrections).
pub const WHITELIST_SHORTCUT_PROBABILITY: u8 = 15;

const FLAG_HAS_NEXT: u8 = 0x01;

const SPARSE_TABLE_BLOCK_SIZE: usize = 64;
const SPARSE_TABLE_DATA_SIZE: usize = 4;

/// One shortcut target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutTarget {
    pub code_points: Vec<u32>,
    pub probability: u8,
}

pub struct ShortcutContent {
    table: SparseTable,
    strings: ExtendableBuffer,
}

impl ShortcutContent {
    pub fn new() -> Self {
        Self {
            table: SparseTable::new(SPARSE_TABLE_BLOCK_SIZE, SPARSE_TABLE_DATA_SIZE),
            strings: ExtendableBuffer::new(),
        }
    }

    pub fn from_content(
        index: OriginalContent,
        table: OriginalContent,
        strings: OriginalContent,
    ) -> Self {
        Self {
            table: SparseTable::from_content(
                index,
                table,
                SPARSE_TABLE_BLOCK_SIZE,
                SPARSE_TABLE_DATA_SIZE,
                DEFAULT_MAX_ADDITIONAL_BUFFER_SIZE,
            ),
            strings: ExtendableBuffer::from_original(strings, DEFAULT_MAX_ADDITIONAL_BUFFER_SIZE),
        }
    }

    pub fn shortcuts(&self, terminal_id: u32) -> io::Result<Vec<ShortcutTarget>> {
        let Some(head) = self.table.get(terminal_id)? else {
            return Ok(Vec::new());
        };
        self.read_list(head as usize)
    }

    /// Add or replace one target in the word's list. The updated list is
    /// rewritten at the pool tail.
    pub fn add_shortcut(
        &mut self,
        terminal_id: u32,
        target: &[u32],
        probability: u8,
    ) -> io::Result<()> {
        let mut targets = self.shortcuts(terminal_id)?;
        match targets.iter_mut().find(|t| t.code_points == target) {
            Some(existing) => existing.probability = probability,
            None => targets.push(ShortcutTarget {
                code_points: target.to_vec(),
                probability,
            }),
        }
        let head = self.write_list(&targets)?;
        self.table.set(terminal_id, head as u32)
    }

    /// Copy surviving lists into a fresh content, renumbering terminal ids.
    pub fn run_gc(&self, id_map: &HashMap<u32, u32>, id_count: u32) -> io::Result<ShortcutContent> {
        let mut fresh = ShortcutContent::new();
        for old_id in 0..id_count {
            let Some(&new_id) = id_map.get(&old_id) else {
                continue;
            };
            let targets = self.shortcuts(old_id)?;
            if targets.is_empty() {
                continue;
            }
            let head = fresh.write_list(&targets)?;
            fresh.table.set(new_id, head as u32)?;
        }
        Ok(fresh)
    }

    /// Serialized sub-buffers: (lookup index, address table, string pool).
    pub fn to_vecs(&self) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
        let (index, table) = self.table.to_vecs();
        (index, table, self.strings.to_vec())
    }

    fn read_list(&self, head: usize) -> io::Result<Vec<ShortcutTarget>> {
        let mut out = Vec::new();
        let mut pos = head;
        loop {
            let flags = self.strings.read_uint(1, pos)? as u8;
            let probability = self.strings.read_uint(1, pos + 1)? as u8;
            let (region, local) = self.strings.region_at(pos + 2)?;
            let decoded = decode_code_points(region, local, None)?;
            pos += 2 + decoded.consumed;
            out.push(ShortcutTarget {
                code_points: decoded.code_points,
                probability,
            });
            if flags & FLAG_HAS_NEXT == 0 {
                return Ok(out);
            }
        }
    }

    fn write_list(&mut self, targets: &[ShortcutTarget]) -> io::Result<usize> {
        debug_assert!(!targets.is_empty());
        let mut bytes = Vec::new();
        for (i, target) in targets.iter().enumerate() {
            let flags = if i + 1 < targets.len() { FLAG_HAS_NEXT } else { 0 };
            bytes.push(flags);
            bytes.push(target.probability);
            encode_code_points(&target.code_points, None, true, &mut bytes);
        }
        self.strings.write_bytes_at_tail(&bytes)
    }
}

impl Default for ShortcutContent {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::codepoints::code_points_of;

    #[test]
    fn empty_word_has_no_shortcuts() {
        let content = ShortcutContent::new();
        assert!(content.shortcuts(3).unwrap().is_empty());
    }

    #[test]
    fn add_and_read_back() {
        let mut content = ShortcutContent::new();
        content
            .add_shortcut(1, &code_points_of("on my way"), WHITELIST_SHORTCUT_PROBABILITY)
            .unwrap();
        content.add_shortcut(1, &code_points_of("oh my word"), 3).unwrap();

        let targets = content.shortcuts(1).unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].code_points, code_points_of("on my way"));
        assert_eq!(targets[0].probability, WHITELIST_SHORTCUT_PROBABILITY);
        assert_eq!(targets[1].probability, 3);
    }

    #[test]
    fn re_adding_a_target_updates_in_one_slot() {
        let mut content = ShortcutContent::new();
        content.add_shortcut(0, &code_points_of("brb"), 2).unwrap();
        content.add_shortcut(0, &code_points_of("brb"), 9).unwrap();
        let targets = content.shortcuts(0).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].probability, 9);
    }

    #[test]
    fn gc_remaps_ids_and_drops_dead_ones() {
        let mut content = ShortcutContent::new();
        content.add_shortcut(0, &code_points_of("a"), 1).unwrap();
        content.add_shortcut(2, &code_points_of("c"), 3).unwrap();

        let mut id_map = HashMap::new();
        id_map.insert(2u32, 0u32); // id 0 died, id 2 became 0
        let fresh = content.run_gc(&id_map, 3).unwrap();
        assert!(fresh.shortcuts(1).unwrap().is_empty());
        let targets = fresh.shortcuts(0).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].code_points, code_points_of("c"));
    }

    #[test]
    fn reload_from_flushed_buffers() {
        let mut content = ShortcutContent::new();
        content.add_shortcut(5, &code_points_of("tty"), 7).unwrap();
        let (index, table, strings) = content.to_vecs();
        let reloaded = ShortcutContent::from_content(
            OriginalContent::Owned(index),
            OriginalContent::Owned(table),
            OriginalContent::Owned(strings),
        );
        let targets = reloaded.shortcuts(5).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].code_points, code_points_of("tty"));
    }
}
