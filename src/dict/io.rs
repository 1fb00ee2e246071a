// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! On-disk layout: the `<name>.header` / `<name>.body` file pair.
//!
//! The body is a sequence of length-prefixed sub-buffers in fixed order:
//! trie, terminal-position lookup table, language-model content (trie map +
//! global entry counters), shortcut content (lookup index + address table +
//! string pool). Read-only opens map the body once and hand each structure a
//! range of the shared map; updatable opens copy the ranges out so in-place
//! patches work.
//!
//! Flush stages both files in a scratch directory and renames it over the
//! target, so a crash mid-write never leaves a half-written dictionary
//! behind.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::Mmap;

use crate::buffer::codec::read_uint;
use crate::buffer::OriginalContent;
use crate::lm::NGRAM_ORDER_COUNT;

/// Extension of the header file.
pub const HEADER_FILE_EXTENSION: &str = "header";

/// Extension of the body file.
pub const BODY_FILE_EXTENSION: &str = "body";

const LENGTH_PREFIX_SIZE: usize = 4;

// ============================================================================
// SECTION LAYOUT
// ============================================================================

/// Byte ranges of every sub-buffer inside a body file.
#[derive(Debug, Clone)]
pub struct BodySections {
    pub trie: (usize, usize),
    pub terminal_table: (usize, usize),
    pub lm_map: (usize, usize),
    pub counters: [u32; NGRAM_ORDER_COUNT],
    pub shortcut_index: (usize, usize),
    pub shortcut_table: (usize, usize),
    pub shortcut_strings: (usize, usize),
}

impl BodySections {
    /// Parse the section table out of raw body bytes.
    pub fn parse(bytes: &[u8]) -> io::Result<Self> {
        let mut pos = 0;
        let trie = read_section(bytes, &mut pos)?;
        let terminal_table = read_section(bytes, &mut pos)?;

        // Language-model section: nested trie-map prefix plus the counters.
        let (lm_start, lm_end) = read_section(bytes, &mut pos)?;
        let map_len = read_uint(bytes, 4, lm_start)? as usize;
        let map_start = lm_start + LENGTH_PREFIX_SIZE;
        let counters_start = map_start + map_len;
        if counters_start + NGRAM_ORDER_COUNT * 4 != lm_end {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Language-model section size mismatch",
            ));
        }
        let mut counters = [0u32; NGRAM_ORDER_COUNT];
        for (i, counter) in counters.iter_mut().enumerate() {
            *counter = read_uint(bytes, 4, counters_start + i * 4)?;
        }

        // Shortcut section: three nested sub-buffers.
        let (sc_start, sc_end) = read_section(bytes, &mut pos)?;
        let mut sc_pos = sc_start;
        let shortcut_index = read_section(bytes, &mut sc_pos)?;
        let shortcut_table = read_section(bytes, &mut sc_pos)?;
        let shortcut_strings = read_section(bytes, &mut sc_pos)?;
        if sc_pos != sc_end {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Shortcut section size mismatch",
            ));
        }

        if pos != bytes.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Trailing {} bytes after the last body section", bytes.len() - pos),
            ));
        }
        Ok(Self {
            trie,
            terminal_table,
            lm_map: (map_start, counters_start),
            counters,
            shortcut_index,
            shortcut_table,
            shortcut_strings,
        })
    }
}

fn read_section(bytes: &[u8], pos: &mut usize) -> io::Result<(usize, usize)> {
    let len = read_uint(bytes, 4, *pos)? as usize;
    let start = *pos + LENGTH_PREFIX_SIZE;
    let end = start.checked_add(len).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "Body section length overflow")
    })?;
    if end > bytes.len() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("Body section truncated: {}..{} > {}", start, end, bytes.len()),
        ));
    }
    *pos = end;
    Ok((start, end))
}

// ============================================================================
// BODY CONTENT SOURCES
// ============================================================================

/// Where section bytes come from after an open.
pub enum BodySource {
    /// Shared read-only map of the whole body file.
    Mapped(Arc<Mmap>),
    /// Owned copy (updatable opens).
    Owned(Vec<u8>),
}

impl BodySource {
    pub fn bytes(&self) -> &[u8] {
        match self {
            BodySource::Mapped(map) => map,
            BodySource::Owned(bytes) => bytes,
        }
    }

    /// Materialize one section range as an original-region backing.
    pub fn section(&self, range: (usize, usize)) -> OriginalContent {
        match self {
            BodySource::Mapped(map) => OriginalContent::Mapped {
                map: Arc::clone(map),
                start: range.0,
                len: range.1 - range.0,
            },
            BodySource::Owned(bytes) => {
                OriginalContent::Owned(bytes[range.0..range.1].to_vec())
            }
        }
    }
}

/// Open a body file. Updatable dictionaries get owned copies; read-only ones
/// share one mmap.
pub fn open_body(path: &Path, updatable: bool) -> io::Result<BodySource> {
    if updatable {
        Ok(BodySource::Owned(fs::read(path)?))
    } else {
        let file = fs::File::open(path)?;
        // SAFETY: the map is read-only and dictionaries are treated as
        // immutable while open; a concurrently truncated file surfaces as an
        // I/O fault, which the process-level contract excludes.
        #[allow(unsafe_code)]
        let map = unsafe { Mmap::map(&file)? };
        Ok(BodySource::Mapped(Arc::new(map)))
    }
}

// ============================================================================
// SERIALIZATION
// ============================================================================

/// Assemble a body file from the serialized sub-buffers.
pub fn write_body(
    trie: &[u8],
    terminal_table: &[u8],
    lm_map: &[u8],
    counters: &[u32; NGRAM_ORDER_COUNT],
    shortcut_index: &[u8],
    shortcut_table: &[u8],
    shortcut_strings: &[u8],
) -> Vec<u8> {
    let mut lm = Vec::with_capacity(LENGTH_PREFIX_SIZE + lm_map.len() + NGRAM_ORDER_COUNT * 4);
    push_section(&mut lm, lm_map);
    for counter in counters {
        lm.extend_from_slice(&counter.to_be_bytes());
    }

    let mut shortcuts = Vec::new();
    push_section(&mut shortcuts, shortcut_index);
    push_section(&mut shortcuts, shortcut_table);
    push_section(&mut shortcuts, shortcut_strings);

    let mut out = Vec::new();
    push_section(&mut out, trie);
    push_section(&mut out, terminal_table);
    push_section(&mut out, &lm);
    push_section(&mut out, &shortcuts);
    out
}

fn push_section(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

// ============================================================================
// DIRECTORY LAYOUT & ATOMIC SWAP
// ============================================================================

/// `<dir>/<name>.<ext>` where `<name>` is the directory's own name.
pub fn dict_file_path(dict_dir: &Path, extension: &str) -> io::Result<PathBuf> {
    let name = dict_dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Dictionary path {:?} has no usable name", dict_dir),
            )
        })?;
    Ok(dict_dir.join(format!("{}.{}", name, extension)))
}

/// Write header and body into a staging directory, then swap it over the
/// target directory.
pub fn flush_to_dir(dict_dir: &Path, header: &[u8], body: &[u8]) -> io::Result<()> {
    let staging = dict_dir.with_extension("staging");
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    let name = dict_dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Unusable dictionary name"))?;
    write_file(&staging.join(format!("{}.{}", name, HEADER_FILE_EXTENSION)), header)?;
    write_file(&staging.join(format!("{}.{}", name, BODY_FILE_EXTENSION)), body)?;

    if dict_dir.exists() {
        fs::remove_dir_all(dict_dir)?;
    }
    fs::rename(&staging, dict_dir)
}

fn write_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_roundtrip() {
        let body = write_body(
            &[1, 2, 3],
            &[4, 5],
            &[6, 7, 8, 9],
            &[10, 11, 12],
            &[13],
            &[14, 15],
            &[16],
        );
        let sections = BodySections::parse(&body).unwrap();
        assert_eq!(&body[sections.trie.0..sections.trie.1], &[1, 2, 3]);
        assert_eq!(
            &body[sections.terminal_table.0..sections.terminal_table.1],
            &[4, 5]
        );
        assert_eq!(&body[sections.lm_map.0..sections.lm_map.1], &[6, 7, 8, 9]);
        assert_eq!(sections.counters, [10, 11, 12]);
        assert_eq!(
            &body[sections.shortcut_index.0..sections.shortcut_index.1],
            &[13]
        );
        assert_eq!(
            &body[sections.shortcut_table.0..sections.shortcut_table.1],
            &[14, 15]
        );
        assert_eq!(
            &body[sections.shortcut_strings.0..sections.shortcut_strings.1],
            &[16]
        );
    }

    #[test]
    fn truncated_body_fails_closed() {
        let body = write_body(&[1, 2, 3], &[], &[], &[0, 0, 0], &[], &[], &[]);
        assert!(BodySections::parse(&body[..body.len() - 2]).is_err());
        assert!(BodySections::parse(&body[..3]).is_err());
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let mut body = write_body(&[1], &[], &[], &[0, 0, 0], &[], &[], &[]);
        body.push(0xAA);
        assert!(BodySections::parse(&body).is_err());
    }
}
