//! Memory-mapped, incrementally updatable Patricia-trie dictionary engine
//! for predictive text.
//!
//! Talpa stores words, their unigram probabilities, n-gram probabilities,
//! shortcuts, and usage-decay metadata in a compact binary format that can be
//! opened straight off an mmap and mutated in place by appending — plus the
//! garbage collector that compacts it all back down.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌─────────────┐
//! │  buffer    │──▶│ table        │──▶│  lm         │
//! │ (regions,  │   │ (sparse,     │   │ (entries,   │
//! │  codecs)   │   │  trie map)   │   │  decay)     │
//! └────────────┘   └──────────────┘   └─────────────┘
//!        │                 │                 │
//!        ▼                 ▼                 ▼
//! ┌────────────┐   ┌──────────────┐   ┌─────────────┐
//! │  trie      │──▶│ update       │──▶│  gc         │
//! │ (PtNode    │   │ (insert,     │   │ (five-phase │
//! │  model)    │   │  remove)     │   │  compaction)│
//! └────────────┘   └──────────────┘   └─────────────┘
//!        │                 │                 │
//!        └────────┬────────┴────────┬────────┘
//!                 ▼                 ▼
//!          ┌────────────┐   ┌──────────────┐
//!          │  header    │   │  dict        │
//!          │ (format,   │   │ (facade,     │
//!          │  attrs)    │   │  file I/O)   │
//!          └────────────┘   └──────────────┘
//! ```
//!
//! # Contracts worth knowing
//!
//! - **Single-threaded**: no internal locking; the host serializes access.
//! - **Append-only mutation**: stored bytes change meaning only at GC time;
//!   everything else is tail writes plus fixed-width in-place patches.
//! - **Fail closed, degrade soft**: format errors abort an open; corruption
//!   detected later flips a sticky flag and operations return empty results
//!   instead of crashing the host keyboard.

// Module declarations
pub mod buffer;
pub mod clock;
pub mod content;
pub mod dict;
pub mod gc;
pub mod header;
pub mod lm;
pub mod table;
pub mod trie;
pub mod update;

// Re-exports for the public API
pub use clock::{Clock, FixedClock, SystemClock};
pub use content::{ShortcutTarget, WHITELIST_SHORTCUT_PROBABILITY};
pub use dict::property::{NgramContext, NgramProperty, UnigramProperty, WordProperty};
pub use dict::{
    Dictionary, BIGRAM_COUNT_QUERY, MAX_BIGRAM_COUNT_QUERY, MAX_UNIGRAM_COUNT_QUERY,
    UNIGRAM_COUNT_QUERY,
};
pub use header::{AttributeMap, FormatVersion, HeaderPolicy};
pub use lm::{HistoricalInfo, MAX_PROBABILITY};
