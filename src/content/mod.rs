// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Per-terminal-id dictionary contents that live beside the trie buffer.

pub mod shortcuts;
pub mod terminal_table;

pub use shortcuts::{ShortcutContent, ShortcutTarget, WHITELIST_SHORTCUT_PROBABILITY};
pub use terminal_table::TerminalPositionLookupTable;
