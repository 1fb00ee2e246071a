// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Garbage collection: full-dictionary compaction.
//!
//! Five phases, in order:
//! 1. **Mark** — postorder over the live trie; terminals whose probability
//!    entry is gone (or decayed out) lose their word: childless ones become
//!    deleted, structural ones become will-become-non-terminal and free their
//!    terminal id.
//! 2. **Copy** — array-level preorder over the old buffer, writing only live
//!    nodes into a fresh buffer. Forward-linked chains merge into single
//!    arrays; moved tombstones are resolved and inlined. Old→new maps are
//!    recorded for node heads and array heads.
//! 3. **Renumber** — the terminal table is compacted; freed slots vanish and
//!    surviving ids are renumbered densely in order.
//! 4. **Remap contents** — language-model and shortcut content are rebuilt
//!    through the id map; entries touching dead ids are dropped.
//! 5. **Relink** — every copied node's parent, children, and terminal-id
//!    fields are rewritten through the maps from phases 2 and 3.
//!
//! Apart from phase 1's tombstoning (which only formalizes already-dead
//! words), nothing touches the old buffers: a failure at any phase leaves the
//! dictionary exactly as consistent as it was.

use std::collections::HashMap;
use std::io;

use crate::buffer::codepoints::CodePointTable;
use crate::buffer::ExtendableBuffer;
use crate::content::{ShortcutContent, TerminalPositionLookupTable};
use crate::lm::{ForgettingCurve, LanguageModelContent};
use crate::trie::{
    traverse, Lifecycle, NewNodeSpec, PtNodeParams, PtNodeReader, PtNodeWriter, Traverse,
    TraversalListener,
};
use crate::update::ROOT_ARRAY_POS;

/// The fresh buffer set produced by a successful collection.
pub struct GcOutcome {
    pub trie: ExtendableBuffer,
    pub terminal_table: TerminalPositionLookupTable,
    pub lm: LanguageModelContent,
    pub shortcuts: ShortcutContent,
    pub live_word_count: u32,
}

pub struct GarbageCollector<'a> {
    trie: &'a mut ExtendableBuffer,
    terminal_table: &'a mut TerminalPositionLookupTable,
    lm: &'a LanguageModelContent,
    shortcuts: &'a ShortcutContent,
    code_point_table: Option<&'a CodePointTable>,
    /// Present for decaying dictionaries; drives word-validity checks.
    curve: Option<&'a ForgettingCurve>,
    now: u32,
}

/// Deferred field rewrites for one node copied in phase 2.
struct Relink {
    new_head: usize,
    new_parent_field: usize,
    new_terminal_field: Option<usize>,
    new_children_field: usize,
    old_parent_head: Option<usize>,
    old_children_chain: Option<usize>,
    old_terminal_id: Option<u32>,
}

impl<'a> GarbageCollector<'a> {
    pub fn new(
        trie: &'a mut ExtendableBuffer,
        terminal_table: &'a mut TerminalPositionLookupTable,
        lm: &'a LanguageModelContent,
        shortcuts: &'a ShortcutContent,
        code_point_table: Option<&'a CodePointTable>,
        curve: Option<&'a ForgettingCurve>,
        now: u32,
    ) -> Self {
        Self {
            trie,
            terminal_table,
            lm,
            shortcuts,
            code_point_table,
            curve,
            now,
        }
    }

    pub fn run(
        mut self,
        max_trie_size: usize,
        max_lm_size: usize,
    ) -> io::Result<GcOutcome> {
        // Phase 1: mark words that no longer exist.
        self.mark_useless_nodes()?;

        // Phase 2: copy live nodes into a fresh buffer.
        let mut new_trie = ExtendableBuffer::with_max_additional_size(max_trie_size);
        let mut node_map: HashMap<usize, usize> = HashMap::new();
        let mut array_map: HashMap<usize, usize> = HashMap::new();
        let mut relinks: Vec<Relink> = Vec::new();
        self.copy_live_nodes(&mut new_trie, &mut node_map, &mut array_map, &mut relinks)?;

        // Phase 3: renumber terminal ids densely.
        let (mut new_terminal_table, id_map) = self.terminal_table.compact()?;
        {
            let reader = PtNodeReader::new(self.trie, self.code_point_table);
            for (&old_id, &new_id) in &id_map {
                let old_pos = self
                    .terminal_table
                    .get_terminal_node_position(old_id)?
                    .ok_or_else(|| gc_error("Compacted id lost its position"))?;
                let resolved = reader.read_node(old_pos)?.head_pos;
                let new_pos = *node_map
                    .get(&resolved)
                    .ok_or_else(|| gc_error("Live terminal was not copied"))?;
                new_terminal_table.set_terminal_node_position(new_id, new_pos)?;
            }
        }

        // Phase 4: rebuild the id-keyed contents through the map.
        let new_lm = self.lm.run_gc(&id_map, max_lm_size)?;
        let new_shortcuts = self.shortcuts.run_gc(&id_map, self.terminal_table.size())?;

        // Phase 5: rewrite position- and id-dependent fields in the copy.
        {
            let old_reader = PtNodeReader::new(self.trie, self.code_point_table);
            // Resolve old parent heads against the old buffer first; the
            // writer then owns the new buffer.
            let mut resolved_links = Vec::with_capacity(relinks.len());
            for link in &relinks {
                let parent_new = match link.old_parent_head {
                    None => None,
                    Some(old_parent) => {
                        let resolved = old_reader.read_node(old_parent)?.head_pos;
                        Some(*node_map.get(&resolved).ok_or_else(|| {
                            gc_error("Parent of a live node was not copied")
                        })?)
                    }
                };
                let children_new = match link.old_children_chain {
                    None => None,
                    Some(chain) => array_map.get(&chain).copied(),
                };
                let id_new = match link.old_terminal_id {
                    None => None,
                    Some(old_id) => Some(*id_map.get(&old_id).ok_or_else(|| {
                        gc_error("Terminal id of a live word was not renumbered")
                    })?),
                };
                resolved_links.push((link, parent_new, children_new, id_new));
            }
            let mut writer = PtNodeWriter::new(&mut new_trie, self.code_point_table);
            for (link, parent_new, children_new, id_new) in resolved_links {
                writer.update_parent_pos(link.new_head, link.new_parent_field, parent_new)?;
                writer.update_children_pos(link.new_head, link.new_children_field, children_new)?;
                if let (Some(field), Some(id)) = (link.new_terminal_field, id_new) {
                    writer.update_terminal_id(field, id)?;
                }
            }
        }

        let live_word_count = new_terminal_table.size();
        Ok(GcOutcome {
            trie: new_trie,
            terminal_table: new_terminal_table,
            lm: new_lm,
            shortcuts: new_shortcuts,
            live_word_count,
        })
    }

    // ------------------------------------------------------------------
    // Phase 1: marking
    // ------------------------------------------------------------------

    /// Postorder mark pass, driven by the traversal helper. The listener
    /// collects lifecycle decisions and freed ids while the reader walks;
    /// both are applied once the walk completes, so reading and writing
    /// never interleave on the same buffer.
    fn mark_useless_nodes(&mut self) -> io::Result<()> {
        let mut listener = MarkingListener {
            lm: self.lm,
            curve: self.curve,
            now: self.now,
            frames: Vec::new(),
            decisions: Vec::new(),
            freed_ids: Vec::new(),
        };
        {
            let reader = PtNodeReader::new(self.trie, self.code_point_table);
            traverse(&reader, ROOT_ARRAY_POS, &mut listener)?;
        }
        for id in listener.freed_ids {
            self.terminal_table.invalidate(id)?;
        }
        let mut writer = PtNodeWriter::new(self.trie, self.code_point_table);
        for (head_pos, lifecycle) in listener.decisions {
            writer.set_lifecycle(head_pos, lifecycle)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Phase 2: copying
    // ------------------------------------------------------------------

    fn copy_live_nodes(
        &mut self,
        new_trie: &mut ExtendableBuffer,
        node_map: &mut HashMap<usize, usize>,
        array_map: &mut HashMap<usize, usize>,
        relinks: &mut Vec<Relink>,
    ) -> io::Result<()> {
        let mut queue: Vec<usize> = vec![ROOT_ARRAY_POS];
        let mut is_root = true;
        while let Some(chain_pos) = queue.pop() {
            let live: Vec<PtNodeParams> = self
                .collect_chain(chain_pos)?
                .into_iter()
                .filter(|n| n.lifecycle() == Lifecycle::Live || n.lifecycle() == Lifecycle::WillBecomeNonTerminal)
                .collect();
            if live.is_empty() {
                if is_root {
                    let mut writer = PtNodeWriter::new(new_trie, self.code_point_table);
                    let pos = writer.write_empty_array()?;
                    array_map.insert(chain_pos, pos);
                }
                is_root = false;
                continue;
            }
            is_root = false;

            let specs: Vec<NewNodeSpec> = live
                .iter()
                .map(|node| NewNodeSpec {
                    code_points: node.code_points.clone(),
                    parent_pos: None,   // relinked in phase 5
                    terminal_id: if node.is_terminal() { node.terminal_id } else { None },
                    children_pos: None, // relinked in phase 5
                    is_not_a_word: node.flags.is_not_a_word(),
                    is_possibly_offensive: node.flags.is_possibly_offensive(),
                })
                .collect();
            let (new_array_pos, written) = {
                let mut writer = PtNodeWriter::new(new_trie, self.code_point_table);
                writer.write_array(&specs)?
            };
            array_map.insert(chain_pos, new_array_pos);
            for (node, out) in live.iter().zip(&written) {
                node_map.insert(node.head_pos, out.head_pos);
                relinks.push(Relink {
                    new_head: out.head_pos,
                    new_parent_field: out.parent_field_pos,
                    new_terminal_field: out.terminal_field_pos,
                    new_children_field: out.children_field_pos,
                    old_parent_head: node.parent_pos,
                    old_children_chain: node.children_pos,
                    old_terminal_id: if node.is_terminal() { node.terminal_id } else { None },
                });
                if let Some(children) = node.children_pos {
                    queue.push(children);
                }
            }
        }
        Ok(())
    }

    /// All stored slots of one forward-linked chain, resolved through moved
    /// tombstones, tombstoned slots included.
    fn collect_chain(&self, chain_pos: usize) -> io::Result<Vec<PtNodeParams>> {
        let reader = PtNodeReader::new(self.trie, self.code_point_table);
        let mut out = Vec::new();
        let mut pos = chain_pos;
        let mut visited_arrays = 0;
        loop {
            visited_arrays += 1;
            if visited_arrays > crate::trie::reader::MAX_VISITED_ARRAY_COUNT {
                return Err(gc_error("Array guard tripped during GC"));
            }
            let (count, mut cursor) = reader.read_array_header(pos)?;
            for _ in 0..count {
                if out.len() > crate::trie::reader::MAX_VISITED_NODE_COUNT {
                    return Err(gc_error("Node guard tripped during GC"));
                }
                let node = reader.read_node(cursor)?;
                cursor += node.stored_size;
                out.push(node);
            }
            match reader.read_forward_link(cursor)? {
                Some(next) => pos = next,
                None => return Ok(out),
            }
        }
    }
}

// ============================================================================
// MARKING LISTENER
// ============================================================================

/// Liveness state for one array chain being walked.
struct MarkFrame {
    any_live: bool,
    /// A visited node whose verdict waits on its children's liveness; the
    /// traversal descends immediately after the visit, so at most one per
    /// frame is ever pending.
    pending: Option<PtNodeParams>,
}

/// Computes postorder liveness verdicts during a preorder walk: leaf nodes
/// are judged on sight, nodes with children when their sub-chain ascends.
struct MarkingListener<'x> {
    lm: &'x LanguageModelContent,
    curve: Option<&'x ForgettingCurve>,
    now: u32,
    frames: Vec<MarkFrame>,
    decisions: Vec<(usize, Lifecycle)>,
    freed_ids: Vec<u32>,
}

impl MarkingListener<'_> {
    fn word_is_alive(&self, node: &PtNodeParams) -> io::Result<bool> {
        let Some(id) = node.terminal_id else {
            return Ok(false);
        };
        let Some(entry) = self.lm.probability_entry(id)? else {
            return Ok(false);
        };
        if !entry.is_valid() {
            // Placeholder entries (auto-created n-gram targets) keep their
            // node alive; they carry no probability but the word is stored.
            return Ok(!entry.has_historical_info());
        }
        match (self.curve, entry.historical_info()) {
            (Some(curve), Some(info)) => Ok(curve.is_alive(info, self.now)),
            _ => Ok(true),
        }
    }

    /// Judge a node whose children's liveness is known. Returns whether the
    /// node still represents a live word.
    fn judge(&mut self, node: &PtNodeParams, live_children: bool) -> io::Result<bool> {
        let word_alive = node.is_terminal() && self.word_is_alive(node)?;
        if node.is_terminal() && !word_alive {
            if let Some(id) = node.terminal_id {
                self.freed_ids.push(id);
            }
            self.decisions.push((
                node.head_pos,
                if live_children {
                    Lifecycle::WillBecomeNonTerminal
                } else {
                    Lifecycle::Deleted
                },
            ));
        } else if !node.is_terminal() && !live_children {
            // Structural leftovers with nothing under them.
            self.decisions.push((node.head_pos, Lifecycle::Deleted));
        }
        Ok(word_alive)
    }
}

impl TraversalListener for MarkingListener<'_> {
    fn on_descend(&mut self, _array_pos: usize) -> io::Result<()> {
        self.frames.push(MarkFrame {
            any_live: false,
            pending: None,
        });
        Ok(())
    }

    fn on_visiting_node(&mut self, node: &PtNodeParams) -> io::Result<Traverse> {
        if !node.is_searchable() {
            return Ok(Traverse::Continue);
        }
        if node.children_pos.is_some() {
            let frame = self.frames.last_mut().ok_or_else(|| {
                gc_error("Node visited outside an array frame")
            })?;
            frame.pending = Some(node.clone());
        } else {
            let word_alive = self.judge(node, false)?;
            let frame = self.frames.last_mut().ok_or_else(|| {
                gc_error("Node visited outside an array frame")
            })?;
            frame.any_live |= word_alive;
        }
        Ok(Traverse::Continue)
    }

    fn on_ascend(&mut self) -> io::Result<()> {
        let child = self.frames.pop().ok_or_else(|| {
            gc_error("Ascend without a matching descend")
        })?;
        let parent = self
            .frames
            .last_mut()
            .ok_or_else(|| gc_error("Ascend above the root frame"))?;
        let node = parent
            .pending
            .take()
            .ok_or_else(|| gc_error("Ascend without a pending parent node"))?;
        let word_alive = self.judge(&node, child.any_live)?;
        let parent = self
            .frames
            .last_mut()
            .ok_or_else(|| gc_error("Ascend above the root frame"))?;
        parent.any_live |= word_alive || child.any_live;
        Ok(())
    }
}

fn gc_error(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("GC failed: {}", message))
}
