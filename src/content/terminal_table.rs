// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Terminal-position lookup table: terminal id → node position.
//!
//! The terminal id is the stable external handle for a word; the language
//! model and shortcut content key everything by it. The table is dense and
//! append-only: ids are handed out in order, freed slots are stamped invalid
//! and only reclaimed when the GC compacts the table and hands back an
//! old-id → new-id map.

use std::collections::HashMap;
use std::io;

use crate::buffer::{ExtendableBuffer, OriginalContent};

/// Slot value for a freed id.
const INVALID_POSITION: u32 = 0xFFFF_FFFF;

const ENTRY_SIZE: usize = 4;

pub struct TerminalPositionLookupTable {
    buffer: ExtendableBuffer,
}

impl TerminalPositionLookupTable {
    pub fn new() -> Self {
        Self {
            buffer: ExtendableBuffer::new(),
        }
    }

    pub fn from_content(content: OriginalContent, max_additional_size: usize) -> Self {
        Self {
            buffer: ExtendableBuffer::from_original(content, max_additional_size),
        }
    }

    /// Number of ids ever allocated (freed slots included).
    pub fn size(&self) -> u32 {
        (self.buffer.tail_position() / ENTRY_SIZE) as u32
    }

    pub fn get_terminal_node_position(&self, terminal_id: u32) -> io::Result<Option<usize>> {
        if terminal_id >= self.size() {
            return Ok(None);
        }
        let value = self
            .buffer
            .read_uint(ENTRY_SIZE, terminal_id as usize * ENTRY_SIZE)?;
        if value == INVALID_POSITION {
            Ok(None)
        } else {
            Ok(Some(value as usize))
        }
    }

    pub fn set_terminal_node_position(&mut self, terminal_id: u32, pos: usize) -> io::Result<()> {
        self.buffer
            .write_uint(pos as u32, ENTRY_SIZE, terminal_id as usize * ENTRY_SIZE)
    }

    /// Hand out the next id, pointing at `pos`.
    pub fn allocate_terminal_id(&mut self, pos: usize) -> io::Result<u32> {
        let id = self.size();
        self.set_terminal_node_position(id, pos)?;
        Ok(id)
    }

    /// Free an id; the slot stays until GC.
    pub fn invalidate(&mut self, terminal_id: u32) -> io::Result<()> {
        self.buffer.write_uint(
            INVALID_POSITION,
            ENTRY_SIZE,
            terminal_id as usize * ENTRY_SIZE,
        )
    }

    /// Compact into a fresh table, dropping freed slots. Returns the new
    /// table and the old-id → new-id map; surviving ids keep their relative
    /// order. Positions in the new table are placeholders — the GC rewrites
    /// them once node positions in the new trie buffer are known.
    pub fn compact(&self) -> io::Result<(TerminalPositionLookupTable, HashMap<u32, u32>)> {
        let mut new_table = TerminalPositionLookupTable::new();
        let mut id_map = HashMap::new();
        for old_id in 0..self.size() {
            if let Some(pos) = self.get_terminal_node_position(old_id)? {
                let new_id = new_table.allocate_terminal_id(pos)?;
                id_map.insert(old_id, new_id);
            }
        }
        Ok((new_table, id_map))
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.buffer.to_vec()
    }
}

impl Default for TerminalPositionLookupTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_dense_and_stable() {
        let mut table = TerminalPositionLookupTable::new();
        assert_eq!(table.allocate_terminal_id(100).unwrap(), 0);
        assert_eq!(table.allocate_terminal_id(200).unwrap(), 1);
        assert_eq!(table.get_terminal_node_position(0).unwrap(), Some(100));
        assert_eq!(table.get_terminal_node_position(1).unwrap(), Some(200));
        assert_eq!(table.get_terminal_node_position(2).unwrap(), None);
    }

    #[test]
    fn invalidated_ids_read_absent_but_keep_their_slot() {
        let mut table = TerminalPositionLookupTable::new();
        table.allocate_terminal_id(100).unwrap();
        table.allocate_terminal_id(200).unwrap();
        table.invalidate(0).unwrap();
        assert_eq!(table.get_terminal_node_position(0).unwrap(), None);
        assert_eq!(table.get_terminal_node_position(1).unwrap(), Some(200));
        // The slot is not recycled before GC.
        assert_eq!(table.allocate_terminal_id(300).unwrap(), 2);
    }

    #[test]
    fn compact_renumbers_densely_in_order() {
        let mut table = TerminalPositionLookupTable::new();
        for pos in [10usize, 20, 30, 40] {
            table.allocate_terminal_id(pos).unwrap();
        }
        table.invalidate(1).unwrap();
        let (compacted, id_map) = table.compact().unwrap();
        assert_eq!(compacted.size(), 3);
        assert_eq!(id_map.get(&0), Some(&0));
        assert_eq!(id_map.get(&1), None);
        assert_eq!(id_map.get(&2), Some(&1));
        assert_eq!(id_map.get(&3), Some(&2));
        assert_eq!(compacted.get_terminal_node_position(1).unwrap(), Some(30));
    }

    #[test]
    fn reload_from_flushed_bytes() {
        let mut table = TerminalPositionLookupTable::new();
        table.allocate_terminal_id(11).unwrap();
        table.allocate_terminal_id(22).unwrap();
        table.invalidate(0).unwrap();
        let bytes = table.to_vec();

        let reloaded = TerminalPositionLookupTable::from_content(
            OriginalContent::Owned(bytes),
            1024,
        );
        assert_eq!(reloaded.size(), 2);
        assert_eq!(reloaded.get_terminal_node_position(0).unwrap(), None);
        assert_eq!(reloaded.get_terminal_node_position(1).unwrap(), Some(22));
    }
}
