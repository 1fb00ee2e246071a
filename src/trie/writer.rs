// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Node and array encoding plus the in-place patch operations.
//!
//! New records only ever go to the buffer tail; existing records are patched
//! in place only where the field width cannot change (flag bytes, 3-byte
//! offset fields, the 4-byte terminal id). Anything wider becomes a move:
//! write the replacement at the tail, stamp the old record as moved with a
//! forward offset. That discipline is what keeps every stored offset valid
//! until the next GC.

use std::io;

use crate::buffer::codec::{encode_s24, MAX_S24_MAGNITUDE};
use crate::buffer::codepoints::{encode_code_points, CodePointTable};
use crate::buffer::ExtendableBuffer;
use crate::trie::flags::{Lifecycle, NodeFlags};
use crate::trie::reader::{
    CHILDREN_FIELD_SIZE, FLAGS_FIELD_SIZE, FORWARD_LINK_FIELD_SIZE, PARENT_FIELD_SIZE,
    TERMINAL_ID_FIELD_SIZE,
};

/// Everything needed to emit one fresh node record.
#[derive(Debug, Clone)]
pub struct NewNodeSpec {
    pub code_points: Vec<u32>,
    pub parent_pos: Option<usize>,
    pub terminal_id: Option<u32>,
    pub children_pos: Option<usize>,
    pub is_not_a_word: bool,
    pub is_possibly_offensive: bool,
}

/// Field positions of a node the writer just emitted.
#[derive(Debug, Clone, Copy)]
pub struct WrittenNode {
    pub head_pos: usize,
    pub parent_field_pos: usize,
    pub terminal_field_pos: Option<usize>,
    pub children_field_pos: usize,
    pub end_pos: usize,
}

/// Write-side view over a trie buffer.
pub struct PtNodeWriter<'a> {
    buffer: &'a mut ExtendableBuffer,
    code_point_table: Option<&'a CodePointTable>,
}

impl<'a> PtNodeWriter<'a> {
    pub fn new(
        buffer: &'a mut ExtendableBuffer,
        code_point_table: Option<&'a CodePointTable>,
    ) -> Self {
        Self {
            buffer,
            code_point_table,
        }
    }

    /// Write an empty node array (the shape of a fresh dictionary's root).
    pub fn write_empty_array(&mut self) -> io::Result<usize> {
        let pos = self.buffer.tail_position();
        self.buffer.write_bytes_at_tail(&[0u8; 1 + FORWARD_LINK_FIELD_SIZE])?;
        Ok(pos)
    }

    /// Write a standalone node record at the tail (no surrounding array).
    /// Standalone records are only reachable through moved-node redirects.
    pub fn write_node(&mut self, spec: &NewNodeSpec) -> io::Result<WrittenNode> {
        let head = self.buffer.tail_position();
        let bytes = self.encode_node(spec, head)?;
        self.buffer.write_bytes_at_tail(&bytes.record)?;
        Ok(WrittenNode {
            head_pos: head,
            parent_field_pos: head + FLAGS_FIELD_SIZE,
            terminal_field_pos: bytes.terminal_field_offset.map(|o| head + o),
            children_field_pos: head + bytes.children_field_offset,
            end_pos: head + bytes.record.len(),
        })
    }

    /// Write a new node array containing `specs` at the tail, returning the
    /// array position and the emitted nodes in order. Counts of 0x80 and up
    /// take the two-byte header form.
    pub fn write_array(&mut self, specs: &[NewNodeSpec]) -> io::Result<(usize, Vec<WrittenNode>)> {
        if specs.is_empty() || specs.len() >= 0x8000 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Node array size {} out of range", specs.len()),
            ));
        }
        let array_pos = self.buffer.tail_position();
        if specs.len() < 0x80 {
            self.buffer.write_bytes_at_tail(&[specs.len() as u8])?;
        } else {
            let raw = 0x8000 | specs.len() as u16;
            self.buffer.write_bytes_at_tail(&raw.to_be_bytes())?;
        }
        let mut written = Vec::with_capacity(specs.len());
        for spec in specs {
            written.push(self.write_node(spec)?);
        }
        self.buffer.write_bytes_at_tail(&[0u8; FORWARD_LINK_FIELD_SIZE])?;
        Ok((array_pos, written))
    }

    // ------------------------------------------------------------------
    // In-place patches
    // ------------------------------------------------------------------

    pub fn set_lifecycle(&mut self, head_pos: usize, lifecycle: Lifecycle) -> io::Result<()> {
        let raw = self.buffer.read_uint(1, head_pos)? as u8;
        let updated = NodeFlags::from_raw(raw).with_lifecycle(lifecycle);
        self.buffer.write_uint(u32::from(updated.raw()), 1, head_pos)
    }

    /// Stamp `old_pos` as moved, pointing readers at `new_pos`.
    pub fn mark_moved(&mut self, old_pos: usize, new_pos: usize) -> io::Result<()> {
        self.set_lifecycle(old_pos, Lifecycle::Moved)?;
        self.write_offset_field(old_pos + FLAGS_FIELD_SIZE, old_pos, new_pos)
    }

    /// Point a node's parent field at `parent_pos` (or clear it). Only the
    /// GC's relink pass uses this; live updates never change parentage.
    pub fn update_parent_pos(
        &mut self,
        head_pos: usize,
        parent_field_pos: usize,
        parent_pos: Option<usize>,
    ) -> io::Result<()> {
        match parent_pos {
            Some(target) => self.write_offset_field(parent_field_pos, head_pos, target),
            None => self.buffer.write_uint(0, PARENT_FIELD_SIZE, parent_field_pos),
        }
    }

    /// Point a node's children field at `children_pos` (or clear it).
    pub fn update_children_pos(
        &mut self,
        head_pos: usize,
        children_field_pos: usize,
        children_pos: Option<usize>,
    ) -> io::Result<()> {
        match children_pos {
            Some(target) => self.write_offset_field(children_field_pos, head_pos, target),
            None => self
                .buffer
                .write_uint(0, CHILDREN_FIELD_SIZE, children_field_pos),
        }
    }

    /// Overwrite the terminal-id field of a record that already has one.
    pub fn update_terminal_id(&mut self, terminal_field_pos: usize, id: u32) -> io::Result<()> {
        self.buffer
            .write_uint(id, TERMINAL_ID_FIELD_SIZE, terminal_field_pos)
    }

    /// Chain a continuation array: patch the forward-link field at
    /// `field_pos` to reach `array_pos`.
    pub fn update_forward_link(&mut self, field_pos: usize, array_pos: usize) -> io::Result<()> {
        self.write_offset_field(field_pos, field_pos, array_pos)
    }

    // ------------------------------------------------------------------
    // Encoding internals
    // ------------------------------------------------------------------

    fn encode_node(&self, spec: &NewNodeSpec, head_pos: usize) -> io::Result<EncodedNode> {
        debug_assert!(!spec.code_points.is_empty());
        let flags = NodeFlags::new_live(
            spec.code_points.len() > 1,
            spec.terminal_id.is_some(),
            spec.is_not_a_word,
            spec.is_possibly_offensive,
        );
        let mut record = vec![flags.raw()];

        let parent_raw = relative_offset(head_pos, spec.parent_pos)?;
        push_u24(&mut record, parent_raw);

        encode_code_points(
            &spec.code_points,
            self.code_point_table,
            spec.code_points.len() > 1,
            &mut record,
        );

        let terminal_field_offset = spec.terminal_id.map(|id| {
            let offset = record.len();
            record.extend_from_slice(&id.to_be_bytes());
            offset
        });

        let children_field_offset = record.len();
        let children_raw = relative_offset(head_pos, spec.children_pos)?;
        push_u24(&mut record, children_raw);

        Ok(EncodedNode {
            record,
            terminal_field_offset,
            children_field_offset,
        })
    }

    fn write_offset_field(
        &mut self,
        field_pos: usize,
        base_pos: usize,
        target: usize,
    ) -> io::Result<()> {
        let raw = encode_s24(target as i32 - base_pos as i32).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::OutOfMemory,
                format!(
                    "Offset {} -> {} exceeds the 24-bit field (max {})",
                    base_pos, target, MAX_S24_MAGNITUDE
                ),
            )
        })?;
        self.buffer.write_uint(raw, PARENT_FIELD_SIZE, field_pos)
    }
}

struct EncodedNode {
    record: Vec<u8>,
    terminal_field_offset: Option<usize>,
    children_field_offset: usize,
}

fn relative_offset(head_pos: usize, target: Option<usize>) -> io::Result<u32> {
    match target {
        None => Ok(0),
        Some(target) => encode_s24(target as i32 - head_pos as i32).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::OutOfMemory,
                "Node offset exceeds the 24-bit field",
            )
        }),
    }
}

fn push_u24(out: &mut Vec<u8>, raw: u32) {
    out.push((raw >> 16) as u8);
    out.push((raw >> 8) as u8);
    out.push(raw as u8);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trie::reader::PtNodeReader;

    fn buffer() -> ExtendableBuffer {
        ExtendableBuffer::with_max_additional_size(1024 * 1024)
    }

    #[test]
    fn node_roundtrip() {
        let mut buf = buffer();
        let mut writer = PtNodeWriter::new(&mut buf, None);
        let node = writer
            .write_node(&NewNodeSpec {
                code_points: crate::buffer::codepoints::code_points_of("cat"),
                parent_pos: None,
                terminal_id: Some(7),
                children_pos: None,
                is_not_a_word: false,
                is_possibly_offensive: false,
            })
            .unwrap();

        let reader = PtNodeReader::new(&buf, None);
        let decoded = reader.read_node(node.head_pos).unwrap();
        assert_eq!(decoded.code_points, crate::buffer::codepoints::code_points_of("cat"));
        assert_eq!(decoded.terminal_id, Some(7));
        assert!(decoded.is_terminal());
        assert_eq!(decoded.parent_pos, None);
        assert_eq!(decoded.children_pos, None);
        assert_eq!(decoded.stored_size, decoded.head_pos.abs_diff(node.end_pos));
    }

    #[test]
    fn array_roundtrip_with_siblings() {
        let mut buf = buffer();
        let mut writer = PtNodeWriter::new(&mut buf, None);
        let (array_pos, written) = writer
            .write_array(&[
                NewNodeSpec {
                    code_points: vec![u32::from(b'a')],
                    parent_pos: None,
                    terminal_id: Some(0),
                    children_pos: None,
                    is_not_a_word: false,
                    is_possibly_offensive: false,
                },
                NewNodeSpec {
                    code_points: crate::buffer::codepoints::code_points_of("bee"),
                    parent_pos: None,
                    terminal_id: None,
                    children_pos: None,
                    is_not_a_word: false,
                    is_possibly_offensive: false,
                },
            ])
            .unwrap();

        let reader = PtNodeReader::new(&buf, None);
        let (count, mut pos) = reader.read_array_header(array_pos).unwrap();
        assert_eq!(count, 2);
        let first = reader.read_node(pos).unwrap();
        assert_eq!(first.head_pos, written[0].head_pos);
        pos += first.stored_size;
        let second = reader.read_node(pos).unwrap();
        assert_eq!(second.code_points.len(), 3);
        assert!(!second.is_terminal());
        pos += second.stored_size;
        assert_eq!(reader.read_forward_link(pos).unwrap(), None);
    }

    #[test]
    fn moved_nodes_redirect_transparently() {
        let mut buf = buffer();
        let mut writer = PtNodeWriter::new(&mut buf, None);
        let spec = NewNodeSpec {
            code_points: crate::buffer::codepoints::code_points_of("dog"),
            parent_pos: None,
            terminal_id: None,
            children_pos: None,
            is_not_a_word: false,
            is_possibly_offensive: false,
        };
        let old = writer.write_node(&spec).unwrap();
        let new = writer
            .write_node(&NewNodeSpec {
                terminal_id: Some(3),
                ..spec
            })
            .unwrap();
        writer.mark_moved(old.head_pos, new.head_pos).unwrap();

        let reader = PtNodeReader::new(&buf, None);
        let resolved = reader.read_node(old.head_pos).unwrap();
        assert_eq!(resolved.head_pos, new.head_pos);
        assert_eq!(resolved.stored_pos, old.head_pos);
        assert_eq!(resolved.terminal_id, Some(3));
        // Sibling stepping still uses the tombstone's own size.
        assert_eq!(resolved.stored_size, old.end_pos - old.head_pos);
    }

    #[test]
    fn forward_link_patch_connects_chains() {
        let mut buf = buffer();
        let mut writer = PtNodeWriter::new(&mut buf, None);
        let root = writer.write_empty_array().unwrap();
        let (second, _) = writer
            .write_array(&[NewNodeSpec {
                code_points: vec![u32::from(b'z')],
                parent_pos: None,
                terminal_id: Some(1),
                children_pos: None,
                is_not_a_word: false,
                is_possibly_offensive: false,
            }])
            .unwrap();
        // The empty root's forward-link field sits right after its count byte.
        writer.update_forward_link(root + 1, second).unwrap();

        let reader = PtNodeReader::new(&buf, None);
        let (count, first_node) = reader.read_array_header(root).unwrap();
        assert_eq!(count, 0);
        assert_eq!(reader.read_forward_link(first_node).unwrap(), Some(second));
    }
}
