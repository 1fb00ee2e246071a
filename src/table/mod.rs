// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Generic index structures shared by the dictionary contents.
//!
//! `SparseTable` maps dense small-integer ids to values without paying for
//! every id ever seen; `TrieMap` is the hashed multi-level map n-gram
//! probabilities live in.

pub mod sparse;
pub mod trie_map;

pub use sparse::SparseTable;
pub use trie_map::{TrieMap, TrieMapEntry, MAX_VALUE, ROOT_BITMAP_ENTRY_INDEX};
