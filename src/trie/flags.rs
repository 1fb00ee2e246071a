// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! The PtNode flags byte.
//!
//! The top two bits carry the lifecycle state. A freshly written node is
//! `11`; tombstoning flips it to moved (`01`) or deleted (`10`), and a
//! terminal that lost its word but still anchors children becomes `00`
//! (will-become-non-terminal) until the next GC rewrites it for real. The
//! low six bits are plain attribute flags.

/// Lifecycle of a stored node. Decoded once per read; everything downstream
/// branches on this instead of re-inspecting raw bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Live,
    Moved,
    Deleted,
    WillBecomeNonTerminal,
}

const LIFECYCLE_MASK: u8 = 0xC0;
const LIFECYCLE_LIVE: u8 = 0xC0;
const LIFECYCLE_MOVED: u8 = 0x40;
const LIFECYCLE_DELETED: u8 = 0x80;
const LIFECYCLE_WILL_BECOME_NON_TERMINAL: u8 = 0x00;

pub const FLAG_HAS_MULTIPLE_CHARS: u8 = 0x20;
pub const FLAG_IS_TERMINAL: u8 = 0x10;
pub const FLAG_HAS_SHORTCUTS: u8 = 0x08;
pub const FLAG_HAS_BIGRAMS: u8 = 0x04;
pub const FLAG_IS_NOT_A_WORD: u8 = 0x02;
pub const FLAG_IS_POSSIBLY_OFFENSIVE: u8 = 0x01;

/// Thin wrapper so flag logic stays in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeFlags(u8);

impl NodeFlags {
    pub fn new_live(
        has_multiple_chars: bool,
        is_terminal: bool,
        is_not_a_word: bool,
        is_possibly_offensive: bool,
    ) -> Self {
        let mut raw = LIFECYCLE_LIVE;
        if has_multiple_chars {
            raw |= FLAG_HAS_MULTIPLE_CHARS;
        }
        if is_terminal {
            raw |= FLAG_IS_TERMINAL;
        }
        if is_not_a_word {
            raw |= FLAG_IS_NOT_A_WORD;
        }
        if is_possibly_offensive {
            raw |= FLAG_IS_POSSIBLY_OFFENSIVE;
        }
        NodeFlags(raw)
    }

    pub fn from_raw(raw: u8) -> Self {
        NodeFlags(raw)
    }

    pub fn raw(self) -> u8 {
        self.0
    }

    pub fn lifecycle(self) -> Lifecycle {
        match self.0 & LIFECYCLE_MASK {
            LIFECYCLE_LIVE => Lifecycle::Live,
            LIFECYCLE_MOVED => Lifecycle::Moved,
            LIFECYCLE_DELETED => Lifecycle::Deleted,
            _ => Lifecycle::WillBecomeNonTerminal,
        }
    }

    pub fn with_lifecycle(self, lifecycle: Lifecycle) -> Self {
        let bits = match lifecycle {
            Lifecycle::Live => LIFECYCLE_LIVE,
            Lifecycle::Moved => LIFECYCLE_MOVED,
            Lifecycle::Deleted => LIFECYCLE_DELETED,
            Lifecycle::WillBecomeNonTerminal => LIFECYCLE_WILL_BECOME_NON_TERMINAL,
        };
        NodeFlags((self.0 & !LIFECYCLE_MASK) | bits)
    }

    pub fn has_multiple_chars(self) -> bool {
        self.0 & FLAG_HAS_MULTIPLE_CHARS != 0
    }

    /// Whether the record carries a terminal-id field. True for
    /// will-become-non-terminal nodes too; the field stays in place so the
    /// node can be resurrected by a later insert without moving.
    pub fn has_terminal_field(self) -> bool {
        self.0 & FLAG_IS_TERMINAL != 0
    }

    /// Whether the node currently represents a word.
    pub fn is_usable_terminal(self) -> bool {
        self.has_terminal_field() && self.lifecycle() == Lifecycle::Live
    }

    pub fn has_shortcuts(self) -> bool {
        self.0 & FLAG_HAS_SHORTCUTS != 0
    }

    pub fn has_bigrams(self) -> bool {
        self.0 & FLAG_HAS_BIGRAMS != 0
    }

    pub fn is_not_a_word(self) -> bool {
        self.0 & FLAG_IS_NOT_A_WORD != 0
    }

    pub fn is_possibly_offensive(self) -> bool {
        self.0 & FLAG_IS_POSSIBLY_OFFENSIVE != 0
    }

    pub fn with_flag(self, flag: u8, set: bool) -> Self {
        if set {
            NodeFlags(self.0 | flag)
        } else {
            NodeFlags(self.0 & !flag)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_nodes_are_live() {
        let flags = NodeFlags::new_live(true, true, false, false);
        assert_eq!(flags.lifecycle(), Lifecycle::Live);
        assert!(flags.has_multiple_chars());
        assert!(flags.is_usable_terminal());
    }

    #[test]
    fn lifecycle_transitions_keep_attribute_bits() {
        let flags = NodeFlags::new_live(true, true, true, false);
        let deleted = flags.with_lifecycle(Lifecycle::Deleted);
        assert_eq!(deleted.lifecycle(), Lifecycle::Deleted);
        assert!(deleted.has_multiple_chars());
        assert!(deleted.is_not_a_word());
        assert!(!deleted.is_usable_terminal());
        // Terminal field survives tombstoning; readers need it for sizing.
        assert!(deleted.has_terminal_field());
    }

    #[test]
    fn will_become_non_terminal_keeps_the_field() {
        let flags = NodeFlags::new_live(false, true, false, false)
            .with_lifecycle(Lifecycle::WillBecomeNonTerminal);
        assert!(flags.has_terminal_field());
        assert!(!flags.is_usable_terminal());
    }
}
