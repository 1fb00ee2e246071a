// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Decoded view of one Patricia-trie node.
//!
//! A `PtNodeParams` is produced by the reader from the raw record and is the
//! only node representation the rest of the engine touches. Positions are
//! absolute buffer positions; the on-wire relative offsets never escape the
//! reader/writer pair.

use crate::trie::flags::{Lifecycle, NodeFlags};

/// One decoded node.
///
/// `stored_pos` is where reading started — the record a sibling scan steps
/// over. `head_pos` is where the live content actually is, which differs when
/// the stored record was a moved tombstone. `stored_size` is the byte size of
/// the record at `stored_pos`; sibling iteration advances by it.
#[derive(Debug, Clone)]
pub struct PtNodeParams {
    pub stored_pos: usize,
    pub stored_size: usize,
    pub head_pos: usize,
    pub flags: NodeFlags,
    pub parent_pos: Option<usize>,
    pub code_points: Vec<u32>,
    pub terminal_id: Option<u32>,
    pub children_pos: Option<usize>,
    /// Absolute positions of the patchable fields of the record at
    /// `head_pos`, so in-place updates don't re-derive the layout.
    pub parent_field_pos: usize,
    pub terminal_field_pos: Option<usize>,
    pub children_field_pos: usize,
}

impl PtNodeParams {
    pub fn lifecycle(&self) -> Lifecycle {
        self.flags.lifecycle()
    }

    pub fn is_deleted(&self) -> bool {
        self.lifecycle() == Lifecycle::Deleted
    }

    /// Whether this node currently represents a stored word.
    pub fn is_terminal(&self) -> bool {
        self.flags.is_usable_terminal()
    }

    /// Skippable during search but still part of sibling chains.
    pub fn is_searchable(&self) -> bool {
        !self.is_deleted()
    }
}
