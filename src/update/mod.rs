// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! The dynamic update engine: word insertion and removal over a live trie.
//!
//! Insertion is a state machine over the match between the new word and the
//! existing structure: full match updates in place, a divergence inside a
//! multi-char node splits it, an exhausted prefix grows a children array, and
//! a miss at the end of a sibling chain appends a forward-linked array. The
//! one rule behind every branch: bytes already written never change meaning —
//! records are patched only in fixed-width fields, everything else becomes a
//! tail write plus a moved tombstone.
//!
//! Removal never reclaims bytes. A leaf terminal is stamped deleted; a
//! terminal with children is stamped will-become-non-terminal and keeps
//! anchoring its subtree until the GC rewrites it.

use std::io;

use crate::buffer::codepoints::{CodePointTable, MAX_WORD_LENGTH};
use crate::buffer::ExtendableBuffer;
use crate::content::TerminalPositionLookupTable;
use crate::trie::reader::{MAX_VISITED_ARRAY_COUNT, MAX_VISITED_NODE_COUNT};
use crate::trie::{Lifecycle, NewNodeSpec, PtNodeParams, PtNodeReader, PtNodeWriter};

/// Position of the root node array in a trie buffer.
pub const ROOT_ARRAY_POS: usize = 0;

/// Outcome of an insertion.
#[derive(Debug, Clone, Copy)]
pub struct AddedWord {
    pub terminal_id: u32,
    /// False when the word already existed and only its payload changes.
    pub newly_created: bool,
}

/// Word-level attribute flags carried on the terminal node.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordAttributes {
    pub is_not_a_word: bool,
    pub is_possibly_offensive: bool,
}

pub struct UpdateEngine<'a> {
    buffer: &'a mut ExtendableBuffer,
    terminal_table: &'a mut TerminalPositionLookupTable,
    code_point_table: Option<&'a CodePointTable>,
}

enum SiblingSearch {
    Matched(PtNodeParams),
    /// No live sibling starts with the wanted code point; the chain's last
    /// forward-link field is where a new array gets hooked in.
    NotFound { link_field_pos: usize },
}

impl<'a> UpdateEngine<'a> {
    pub fn new(
        buffer: &'a mut ExtendableBuffer,
        terminal_table: &'a mut TerminalPositionLookupTable,
        code_point_table: Option<&'a CodePointTable>,
    ) -> Self {
        Self {
            buffer,
            terminal_table,
            code_point_table,
        }
    }

    /// Insert `word`, returning its terminal id. Existing words are returned
    /// as-is (`newly_created == false`); the caller owns the probability
    /// update either way.
    pub fn add_word(&mut self, word: &[u32], attributes: WordAttributes) -> io::Result<AddedWord> {
        if word.is_empty() || word.len() > MAX_WORD_LENGTH {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Word length {} outside the storable range", word.len()),
            ));
        }
        let mut array_pos = ROOT_ARRAY_POS;
        let mut parent_of_array: Option<usize> = None;
        let mut index = 0;
        // The descent is bounded by the word itself; every iteration either
        // consumes code points or terminates.
        for _ in 0..=word.len() {
            match self.search_chain(array_pos, word[index])? {
                SiblingSearch::NotFound { link_field_pos } => {
                    return self.append_array(link_field_pos, parent_of_array, &word[index..], attributes);
                }
                SiblingSearch::Matched(node) => {
                    let rest = &word[index..];
                    let common = common_prefix_len(&node.code_points, rest);
                    if common < node.code_points.len() {
                        return self.split_node(&node, common, rest, attributes);
                    }
                    index += common;
                    if index == word.len() {
                        return self.set_terminal(&node, attributes);
                    }
                    match node.children_pos {
                        Some(children) => {
                            parent_of_array = Some(node.head_pos);
                            array_pos = children;
                        }
                        None => {
                            return self.add_children(&node, &word[index..], attributes);
                        }
                    }
                }
            }
        }
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "Insertion descended past the word length (corrupted trie?)",
        ))
    }

    /// Tombstone `word`. Returns the freed terminal id, or `None` when the
    /// word is not stored.
    pub fn remove_word(&mut self, word: &[u32]) -> io::Result<Option<u32>> {
        let node = {
            let reader = PtNodeReader::new(self.buffer, self.code_point_table);
            match reader.find_terminal_node(word, ROOT_ARRAY_POS)? {
                Some(node) => node,
                None => return Ok(None),
            }
        };
        let id = node
            .terminal_id
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "Terminal node without id"))?;
        let lifecycle = if node.children_pos.is_some() {
            Lifecycle::WillBecomeNonTerminal
        } else {
            Lifecycle::Deleted
        };
        {
            let mut writer = PtNodeWriter::new(self.buffer, self.code_point_table);
            writer.set_lifecycle(node.head_pos, lifecycle)?;
        }
        self.terminal_table.invalidate(id)?;
        Ok(Some(id))
    }

    // ------------------------------------------------------------------
    // Insertion branches
    // ------------------------------------------------------------------

    /// Full match on an existing node: make it a word.
    fn set_terminal(
        &mut self,
        node: &PtNodeParams,
        attributes: WordAttributes,
    ) -> io::Result<AddedWord> {
        if node.is_terminal() {
            return Ok(AddedWord {
                terminal_id: node.terminal_id.expect("terminal node carries an id"),
                newly_created: false,
            });
        }
        if let Some(field_pos) = node.terminal_field_pos {
            // A will-become-non-terminal node still has its id field; revive
            // it in place with a fresh id.
            let id = self.terminal_table.size();
            let mut writer = PtNodeWriter::new(self.buffer, self.code_point_table);
            writer.update_terminal_id(field_pos, id)?;
            writer.set_lifecycle(node.head_pos, Lifecycle::Live)?;
            let allocated = self.terminal_table.allocate_terminal_id(node.head_pos)?;
            debug_assert_eq!(allocated, id);
            return Ok(AddedWord {
                terminal_id: id,
                newly_created: true,
            });
        }
        // A genuinely non-terminal node has no room for an id: rewrite it at
        // the tail as a terminal and tombstone the original.
        let id = self.terminal_table.size();
        let written = {
            let mut writer = PtNodeWriter::new(self.buffer, self.code_point_table);
            let written = writer.write_node(&NewNodeSpec {
                code_points: node.code_points.clone(),
                parent_pos: node.parent_pos,
                terminal_id: Some(id),
                children_pos: node.children_pos,
                is_not_a_word: attributes.is_not_a_word,
                is_possibly_offensive: attributes.is_possibly_offensive,
            })?;
            writer.mark_moved(node.head_pos, written.head_pos)?;
            written
        };
        let allocated = self.terminal_table.allocate_terminal_id(written.head_pos)?;
        debug_assert_eq!(allocated, id);
        Ok(AddedWord {
            terminal_id: id,
            newly_created: true,
        })
    }

    /// Prefix exhausted on a childless node: grow a children array holding
    /// the remaining suffix.
    fn add_children(
        &mut self,
        node: &PtNodeParams,
        suffix: &[u32],
        attributes: WordAttributes,
    ) -> io::Result<AddedWord> {
        let id = self.terminal_table.size();
        let written = {
            let mut writer = PtNodeWriter::new(self.buffer, self.code_point_table);
            let (array_pos, written) = writer.write_array(&[NewNodeSpec {
                code_points: suffix.to_vec(),
                parent_pos: Some(node.head_pos),
                terminal_id: Some(id),
                children_pos: None,
                is_not_a_word: attributes.is_not_a_word,
                is_possibly_offensive: attributes.is_possibly_offensive,
            }])?;
            writer.update_children_pos(node.head_pos, node.children_field_pos, Some(array_pos))?;
            written
        };
        let allocated = self
            .terminal_table
            .allocate_terminal_id(written[0].head_pos)?;
        debug_assert_eq!(allocated, id);
        Ok(AddedWord {
            terminal_id: id,
            newly_created: true,
        })
    }

    /// No sibling matched anywhere in the chain: chain on a new array.
    fn append_array(
        &mut self,
        link_field_pos: usize,
        parent_pos: Option<usize>,
        suffix: &[u32],
        attributes: WordAttributes,
    ) -> io::Result<AddedWord> {
        let id = self.terminal_table.size();
        let written = {
            let mut writer = PtNodeWriter::new(self.buffer, self.code_point_table);
            let (array_pos, written) = writer.write_array(&[NewNodeSpec {
                code_points: suffix.to_vec(),
                parent_pos,
                terminal_id: Some(id),
                children_pos: None,
                is_not_a_word: attributes.is_not_a_word,
                is_possibly_offensive: attributes.is_possibly_offensive,
            }])?;
            writer.update_forward_link(link_field_pos, array_pos)?;
            written
        };
        let allocated = self
            .terminal_table
            .allocate_terminal_id(written[0].head_pos)?;
        debug_assert_eq!(allocated, id);
        Ok(AddedWord {
            terminal_id: id,
            newly_created: true,
        })
    }

    /// Divergence inside a multi-char node: split into a prefix part plus a
    /// children array carrying the old suffix (and the new word's suffix
    /// when it extends past the split).
    fn split_node(
        &mut self,
        node: &PtNodeParams,
        common: usize,
        rest: &[u32],
        attributes: WordAttributes,
    ) -> io::Result<AddedWord> {
        debug_assert!(common > 0 && common < node.code_points.len());
        let word_ends_at_split = rest.len() == common;
        let new_id = self.terminal_table.size();

        // The old node's word (if any) moves into the suffix node. A
        // tombstoned terminal (will-become-non-terminal) lost its id already
        // and comes back as a plain structural node.
        let old_suffix_id = if node.is_terminal() { node.terminal_id } else { None };

        let (prefix_head, old_suffix_head, new_terminal_head) = {
            let mut writer = PtNodeWriter::new(self.buffer, self.code_point_table);
            let prefix = writer.write_node(&NewNodeSpec {
                code_points: node.code_points[..common].to_vec(),
                parent_pos: node.parent_pos,
                terminal_id: if word_ends_at_split { Some(new_id) } else { None },
                children_pos: None, // patched to the array below
                is_not_a_word: word_ends_at_split && attributes.is_not_a_word,
                is_possibly_offensive: word_ends_at_split && attributes.is_possibly_offensive,
            })?;

            let mut specs = vec![NewNodeSpec {
                code_points: node.code_points[common..].to_vec(),
                parent_pos: Some(prefix.head_pos),
                terminal_id: old_suffix_id,
                children_pos: node.children_pos,
                is_not_a_word: node.flags.is_not_a_word(),
                is_possibly_offensive: node.flags.is_possibly_offensive(),
            }];
            if !word_ends_at_split {
                specs.push(NewNodeSpec {
                    code_points: rest[common..].to_vec(),
                    parent_pos: Some(prefix.head_pos),
                    terminal_id: Some(new_id),
                    children_pos: None,
                    is_not_a_word: attributes.is_not_a_word,
                    is_possibly_offensive: attributes.is_possibly_offensive,
                });
            }
            let (array_pos, written) = writer.write_array(&specs)?;
            writer.update_children_pos(prefix.head_pos, prefix.children_field_pos, Some(array_pos))?;
            writer.mark_moved(node.head_pos, prefix.head_pos)?;
            (
                prefix.head_pos,
                written[0].head_pos,
                written.get(1).map(|w| w.head_pos),
            )
        };

        // The original node's children must re-parent onto the suffix node;
        // left alone they would resolve through the tombstone to the prefix
        // and lose the split-off code points during word reconstruction.
        if let Some(children_chain) = node.children_pos {
            let child_heads = self.collect_child_heads(children_chain)?;
            let mut writer = PtNodeWriter::new(self.buffer, self.code_point_table);
            for (head, parent_field) in child_heads {
                writer.update_parent_pos(head, parent_field, Some(old_suffix_head))?;
            }
        }

        if let Some(old_id) = old_suffix_id {
            self.terminal_table
                .set_terminal_node_position(old_id, old_suffix_head)?;
        }
        let new_terminal_pos = if word_ends_at_split {
            prefix_head
        } else {
            new_terminal_head.expect("split writes the new suffix node")
        };
        let allocated = self.terminal_table.allocate_terminal_id(new_terminal_pos)?;
        debug_assert_eq!(allocated, new_id);
        Ok(AddedWord {
            terminal_id: new_id,
            newly_created: true,
        })
    }

    /// Resolved (head, parent-field) pairs of every node in one array chain.
    fn collect_child_heads(&self, chain_pos: usize) -> io::Result<Vec<(usize, usize)>> {
        let reader = PtNodeReader::new(self.buffer, self.code_point_table);
        let mut out = Vec::new();
        let mut pos = chain_pos;
        let mut visited = 0;
        loop {
            visited += 1;
            if visited > MAX_VISITED_ARRAY_COUNT {
                return Err(chain_corruption(pos));
            }
            let (count, mut cursor) = reader.read_array_header(pos)?;
            for _ in 0..count {
                let node = reader.read_node(cursor)?;
                cursor += node.stored_size;
                out.push((node.head_pos, node.parent_field_pos));
            }
            match reader.read_forward_link(cursor)? {
                Some(next) => pos = next,
                None => return Ok(out),
            }
        }
    }

    // ------------------------------------------------------------------
    // Sibling-chain scan
    // ------------------------------------------------------------------

    fn search_chain(&self, array_pos: usize, code_point: u32) -> io::Result<SiblingSearch> {
        let reader = PtNodeReader::new(self.buffer, self.code_point_table);
        let mut chain_pos = array_pos;
        let mut visited_nodes = 0;
        let mut visited_arrays = 0;
        loop {
            visited_arrays += 1;
            if visited_arrays > MAX_VISITED_ARRAY_COUNT {
                return Err(chain_corruption(chain_pos));
            }
            let (count, mut pos) = reader.read_array_header(chain_pos)?;
            for _ in 0..count {
                visited_nodes += 1;
                if visited_nodes > MAX_VISITED_NODE_COUNT {
                    return Err(chain_corruption(pos));
                }
                let node = reader.read_node(pos)?;
                pos += node.stored_size;
                if node.is_searchable() && node.code_points.first() == Some(&code_point) {
                    return Ok(SiblingSearch::Matched(node));
                }
            }
            match reader.read_forward_link(pos)? {
                Some(next) => chain_pos = next,
                None => return Ok(SiblingSearch::NotFound { link_field_pos: pos }),
            }
        }
    }
}

fn common_prefix_len(a: &[u32], b: &[u32]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

fn chain_corruption(pos: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("Sibling chain guard tripped at position {}", pos),
    )
}
