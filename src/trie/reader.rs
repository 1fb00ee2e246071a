// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Node and array decoding, moved-node redirection, and exact word lookup.
//!
//! All position arithmetic for the node record format lives here and in the
//! writer; nothing else in the engine parses raw node bytes. Reads are
//! defensive throughout: every offset is bounds-checked, redirect chains are
//! hop-limited, and sibling scans are capped, so a corrupted or malicious
//! buffer produces an error instead of a hang.

use std::io;

use crate::buffer::codec::decode_s24;
use crate::buffer::codepoints::{decode_code_point, CodePointTable};
use crate::buffer::ExtendableBuffer;
use crate::trie::flags::{Lifecycle, NodeFlags};
use crate::trie::node::PtNodeParams;

// ============================================================================
// RECORD LAYOUT
// ============================================================================

pub const FLAGS_FIELD_SIZE: usize = 1;
pub const PARENT_FIELD_SIZE: usize = 3;
pub const TERMINAL_ID_FIELD_SIZE: usize = 4;
pub const CHILDREN_FIELD_SIZE: usize = 3;
pub const FORWARD_LINK_FIELD_SIZE: usize = 3;

// ============================================================================
// SAFETY CEILINGS (bound every loop over untrusted bytes)
// ============================================================================

/// Most nodes a single operation may visit before the dictionary is declared
/// corrupted.
pub const MAX_VISITED_NODE_COUNT: usize = 100_000;

/// Most node arrays a single operation may visit.
pub const MAX_VISITED_ARRAY_COUNT: usize = 100_000;

/// Longest tolerated moved-node redirect chain. The writer keeps chains
/// short, but a reader must survive whatever is on disk.
pub const MAX_MOVE_CHAIN_HOPS: usize = 8;

/// Deepest trie descent; bounded by the longest storable word.
pub const MAX_SEARCH_DEPTH: usize = crate::buffer::codepoints::MAX_WORD_LENGTH;

// ============================================================================
// READER
// ============================================================================

/// Read-side view over a trie buffer.
pub struct PtNodeReader<'a> {
    buffer: &'a ExtendableBuffer,
    code_point_table: Option<&'a CodePointTable>,
}

impl<'a> PtNodeReader<'a> {
    pub fn new(buffer: &'a ExtendableBuffer, code_point_table: Option<&'a CodePointTable>) -> Self {
        Self {
            buffer,
            code_point_table,
        }
    }

    /// Decode the node stored at `pos`, following moved redirects to the live
    /// record. Deleted nodes are returned as-is; callers skip them but still
    /// use `stored_size` to reach the next sibling.
    pub fn read_node(&self, pos: usize) -> io::Result<PtNodeParams> {
        let first = self.read_record(pos)?;
        let stored_size = first.size;
        let mut current_pos = pos;
        let mut record = first;
        let mut hops = 0;
        while record.flags.lifecycle() == Lifecycle::Moved {
            hops += 1;
            if hops > MAX_MOVE_CHAIN_HOPS {
                return Err(corruption(pos, "Moved-node chain too long"));
            }
            // A moved record repurposes its parent field as the forward
            // pointer to the relocated node.
            if record.parent_offset == 0 {
                return Err(corruption(current_pos, "Moved node without forward offset"));
            }
            current_pos = self.resolve_offset(current_pos, record.parent_offset)?;
            record = self.read_record(current_pos)?;
        }

        let parent_pos = if record.parent_offset == 0 {
            None
        } else {
            Some(self.resolve_offset(current_pos, record.parent_offset)?)
        };
        let children_pos = if record.children_offset == 0 {
            None
        } else {
            Some(self.resolve_offset(current_pos, record.children_offset)?)
        };
        Ok(PtNodeParams {
            stored_pos: pos,
            stored_size,
            head_pos: current_pos,
            flags: record.flags,
            parent_pos,
            code_points: record.code_points,
            terminal_id: record.terminal_id,
            children_pos,
            parent_field_pos: current_pos + FLAGS_FIELD_SIZE,
            terminal_field_pos: record.terminal_field_pos,
            children_field_pos: record.children_field_pos,
        })
    }

    /// Array header at `pos`: `(node count, first node position)`.
    ///
    /// Counts below 0x80 take one byte; larger arrays set the top bit and
    /// spill into a second byte.
    pub fn read_array_header(&self, pos: usize) -> io::Result<(usize, usize)> {
        let first = self.buffer.read_uint(1, pos)?;
        if first & 0x80 == 0 {
            Ok((first as usize, pos + 1))
        } else {
            let second = self.buffer.read_uint(1, pos + 1)?;
            Ok(((((first & 0x7F) << 8) | second) as usize, pos + 2))
        }
    }

    /// Forward link stored at `field_pos`; `None` when the chain ends.
    pub fn read_forward_link(&self, field_pos: usize) -> io::Result<Option<usize>> {
        let raw = self.buffer.read_uint(FORWARD_LINK_FIELD_SIZE, field_pos)?;
        let offset = decode_s24(raw);
        if offset == 0 {
            Ok(None)
        } else {
            Ok(Some(self.resolve_offset(field_pos, offset)?))
        }
    }

    // ------------------------------------------------------------------
    // Exact word lookup
    // ------------------------------------------------------------------

    /// Position of the terminal node storing `word`, descending from the
    /// array at `root_pos`. Linear sibling scan; mismatching nodes are
    /// skipped via their stored size.
    pub fn find_terminal_node(
        &self,
        word: &[u32],
        root_pos: usize,
    ) -> io::Result<Option<PtNodeParams>> {
        if word.is_empty() {
            return Ok(None);
        }
        let mut array_pos = root_pos;
        let mut index = 0;
        let mut visited_nodes = 0;
        let mut visited_arrays = 0;
        'descend: for _ in 0..=MAX_SEARCH_DEPTH {
            // Walk the sibling chain (including forward-linked continuation
            // arrays) looking for a node starting with word[index].
            let mut chain_pos = array_pos;
            loop {
                visited_arrays += 1;
                if visited_arrays > MAX_VISITED_ARRAY_COUNT {
                    return Err(corruption(chain_pos, "Array guard tripped during lookup"));
                }
                let (count, mut node_pos) = self.read_array_header(chain_pos)?;
                for _ in 0..count {
                    visited_nodes += 1;
                    if visited_nodes > MAX_VISITED_NODE_COUNT {
                        return Err(corruption(node_pos, "Node guard tripped during lookup"));
                    }
                    let node = self.read_node(node_pos)?;
                    node_pos += node.stored_size;
                    if !node.is_searchable() {
                        continue;
                    }
                    if node.code_points.first() != Some(&word[index]) {
                        continue;
                    }
                    let rest = &word[index..];
                    if rest.len() < node.code_points.len()
                        || rest[..node.code_points.len()] != node.code_points[..]
                    {
                        // Shares the first code point but diverges inside the
                        // node: no other sibling can match.
                        return Ok(None);
                    }
                    index += node.code_points.len();
                    if index == word.len() {
                        return Ok(if node.is_terminal() { Some(node) } else { None });
                    }
                    match node.children_pos {
                        Some(children) => {
                            array_pos = children;
                            continue 'descend;
                        }
                        None => return Ok(None),
                    }
                }
                match self.read_forward_link(node_pos)? {
                    Some(next) => chain_pos = next,
                    None => return Ok(None),
                }
            }
        }
        Err(corruption(array_pos, "Trie deeper than the longest word"))
    }

    /// Rebuild a word's code points by walking parent links from its terminal
    /// node. Used by iteration and property queries.
    pub fn word_code_points(&self, terminal_node_pos: usize) -> io::Result<Vec<u32>> {
        let mut reversed_chunks: Vec<Vec<u32>> = Vec::new();
        let mut pos = Some(terminal_node_pos);
        let mut hops = 0;
        while let Some(p) = pos {
            hops += 1;
            if hops > MAX_SEARCH_DEPTH {
                return Err(corruption(p, "Parent chain longer than the longest word"));
            }
            let node = self.read_node(p)?;
            reversed_chunks.push(node.code_points.clone());
            pos = node.parent_pos;
        }
        let mut out = Vec::new();
        for chunk in reversed_chunks.into_iter().rev() {
            out.extend(chunk);
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Raw record decoding
    // ------------------------------------------------------------------

    fn read_record(&self, pos: usize) -> io::Result<RawRecord> {
        let (region, local) = self.buffer.region_at(pos)?;
        let base = pos - local;

        let flags_raw = *region
            .get(local)
            .ok_or_else(|| corruption(pos, "Node flags out of bounds"))?;
        let flags = NodeFlags::from_raw(flags_raw);

        let mut cursor = local + FLAGS_FIELD_SIZE;
        let parent_raw = read_u24(region, cursor, pos)?;
        let parent_offset = decode_s24(parent_raw);
        cursor += PARENT_FIELD_SIZE;

        let mut code_points = Vec::new();
        let (first_cp, consumed) = decode_code_point(region, cursor, self.code_point_table)?;
        cursor += consumed;
        match first_cp {
            Some(cp) => code_points.push(cp),
            None => return Err(corruption(pos, "Node starts with a terminator byte")),
        }
        if flags.has_multiple_chars() {
            loop {
                if code_points.len() > crate::buffer::codepoints::MAX_WORD_LENGTH {
                    return Err(corruption(pos, "Node code points exceed the word limit"));
                }
                let (cp, consumed) = decode_code_point(region, cursor, self.code_point_table)?;
                cursor += consumed;
                match cp {
                    Some(cp) => code_points.push(cp),
                    None => break,
                }
            }
        }

        let (terminal_id, terminal_field_pos) = if flags.has_terminal_field() {
            let id = read_u32(region, cursor, pos)?;
            let field_pos = base + cursor;
            cursor += TERMINAL_ID_FIELD_SIZE;
            (Some(id), Some(field_pos))
        } else {
            (None, None)
        };

        let children_field_pos = base + cursor;
        let children_raw = read_u24(region, cursor, pos)?;
        let children_offset = decode_s24(children_raw);
        cursor += CHILDREN_FIELD_SIZE;

        Ok(RawRecord {
            flags,
            parent_offset,
            code_points,
            terminal_id,
            children_offset,
            terminal_field_pos,
            children_field_pos,
            size: cursor - local,
        })
    }

    fn resolve_offset(&self, from: usize, offset: i32) -> io::Result<usize> {
        let target = from as i64 + i64::from(offset);
        if target < 0 || target as usize >= self.buffer.tail_position() {
            return Err(corruption(from, "Relative offset points outside the buffer"));
        }
        Ok(target as usize)
    }
}

struct RawRecord {
    flags: NodeFlags,
    parent_offset: i32,
    code_points: Vec<u32>,
    terminal_id: Option<u32>,
    children_offset: i32,
    terminal_field_pos: Option<usize>,
    children_field_pos: usize,
    size: usize,
}

fn read_u24(region: &[u8], local: usize, pos: usize) -> io::Result<u32> {
    crate::buffer::codec::read_uint(region, 3, local).map_err(|_| corruption(pos, "Truncated node field"))
}

fn read_u32(region: &[u8], local: usize, pos: usize) -> io::Result<u32> {
    crate::buffer::codec::read_uint(region, 4, local).map_err(|_| corruption(pos, "Truncated node field"))
}

fn corruption(pos: usize, message: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("{} (at position {})", message, pos),
    )
}
