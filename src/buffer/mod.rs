// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! The growable two-region buffer every dictionary structure lives in.
//!
//! An `ExtendableBuffer` is an address space stitched from two parts: the
//! *original* region, whose size is fixed when the dictionary is opened (and
//! which may be a read-only mmap view), and the *additional* region, an
//! in-memory tail that grows in fixed steps as the update engine appends
//! nodes. Positions below the original size address the original region;
//! everything above addresses the additional region at `pos - original_size`.
//!
//! Growth is bounded. When the additional region would exceed its cap the
//! write fails with `OutOfMemory`, which upstream policy turns into
//! "run GC first" — never into undefined behavior. The 90% "near size limit"
//! signal exists so policy can compact before hitting the hard wall.

pub mod codec;
pub mod codepoints;

use std::io;
use std::sync::Arc;

use memmap2::Mmap;

// ============================================================================
// SIZE LIMITS
// ============================================================================

/// The additional region grows in steps of this many bytes.
pub const EXTEND_STEP_SIZE: usize = 128 * 1024;

/// Default cap for the additional region of auxiliary buffers.
pub const DEFAULT_MAX_ADDITIONAL_BUFFER_SIZE: usize = 1024 * 1024;

/// Hard cap for a whole dictionary (trie buffer included), matching the
/// mobile-host memory budget.
pub const MAX_DICTIONARY_SIZE: usize = 8 * 1024 * 1024;

/// How much un-compacted (flushed-but-not-GCed) growth a dictionary may
/// accumulate before compaction is demanded.
pub const MAX_DICT_EXTENDED_REGION_SIZE: usize = 1024 * 1024;

/// Percentage of the additional-region cap at which `is_near_size_limit`
/// starts reporting true.
pub const NEAR_SIZE_LIMIT_THRESHOLD_PERCENTILE: usize = 90;

// ============================================================================
// ORIGINAL REGION
// ============================================================================

/// Backing storage for the fixed-size original region.
///
/// Read-only opens keep a shared mmap view (the whole body file is mapped
/// once; each section references its range). Updatable opens own a copy, so
/// in-place flag and offset patches work without touching the file.
pub enum OriginalContent {
    Owned(Vec<u8>),
    Mapped {
        map: Arc<Mmap>,
        start: usize,
        len: usize,
    },
}

impl OriginalContent {
    pub fn empty() -> Self {
        OriginalContent::Owned(Vec::new())
    }

    pub fn len(&self) -> usize {
        match self {
            OriginalContent::Owned(v) => v.len(),
            OriginalContent::Mapped { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        match self {
            OriginalContent::Owned(v) => v.as_slice(),
            OriginalContent::Mapped { map, start, len } => &map[*start..*start + *len],
        }
    }

    fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        match self {
            OriginalContent::Owned(v) => Some(v.as_mut_slice()),
            OriginalContent::Mapped { .. } => None,
        }
    }
}

// ============================================================================
// EXTENDABLE BUFFER
// ============================================================================

/// Two-region growable byte buffer. See the module docs for the address model.
pub struct ExtendableBuffer {
    original: OriginalContent,
    additional: Vec<u8>,
    max_additional_size: usize,
}

impl ExtendableBuffer {
    /// Fresh, empty buffer with the default additional-region cap.
    pub fn new() -> Self {
        Self::with_max_additional_size(DEFAULT_MAX_ADDITIONAL_BUFFER_SIZE)
    }

    pub fn with_max_additional_size(max_additional_size: usize) -> Self {
        Self {
            original: OriginalContent::empty(),
            additional: Vec::new(),
            max_additional_size,
        }
    }

    /// Wrap existing content as the original region.
    pub fn from_original(original: OriginalContent, max_additional_size: usize) -> Self {
        Self {
            original,
            additional: Vec::new(),
            max_additional_size,
        }
    }

    pub fn original_size(&self) -> usize {
        self.original.len()
    }

    pub fn additional_size(&self) -> usize {
        self.additional.len()
    }

    /// One past the last written byte; the position appends land at.
    pub fn tail_position(&self) -> usize {
        self.original.len() + self.additional.len()
    }

    /// Whether in-place writes into the original region are possible.
    pub fn is_writable(&self) -> bool {
        matches!(self.original, OriginalContent::Owned(_)) || self.original.is_empty()
    }

    /// Saturation signal: the additional region has crossed
    /// `NEAR_SIZE_LIMIT_THRESHOLD_PERCENTILE` percent of its cap.
    pub fn is_near_size_limit(&self) -> bool {
        self.additional.len()
            >= self.max_additional_size / 100 * NEAR_SIZE_LIMIT_THRESHOLD_PERCENTILE
    }

    // ------------------------------------------------------------------
    // Region resolution
    // ------------------------------------------------------------------

    /// Resolve `pos` to `(region slice, local position)` for reading.
    ///
    /// Reads never straddle the region boundary; records are always written
    /// whole into one region, so a straddling read means corruption.
    pub fn region_at(&self, pos: usize) -> io::Result<(&[u8], usize)> {
        let orig_len = self.original.len();
        if pos < orig_len {
            Ok((self.original.as_slice(), pos))
        } else if pos <= self.tail_position() {
            Ok((self.additional.as_slice(), pos - orig_len))
        } else {
            Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("Position {} beyond buffer tail {}", pos, self.tail_position()),
            ))
        }
    }

    // ------------------------------------------------------------------
    // Integer access
    // ------------------------------------------------------------------

    pub fn read_uint(&self, size: usize, pos: usize) -> io::Result<u32> {
        let (region, local) = self.region_at(pos)?;
        codec::read_uint(region, size, local)
    }

    /// Write a big-endian integer, extending the additional region when the
    /// write lands at or beyond its tail.
    ///
    /// Failure modes: `PermissionDenied` for writes into a read-only original
    /// region, `OutOfMemory` when growth would exceed the cap.
    pub fn write_uint(&mut self, data: u32, size: usize, pos: usize) -> io::Result<()> {
        let orig_len = self.original.len();
        if pos < orig_len {
            if pos + size > orig_len {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Write at {} straddles the region boundary", pos),
                ));
            }
            let region = self.original.as_mut_slice().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    "Write into read-only original region",
                )
            })?;
            return codec::write_uint(region, data, size, pos);
        }
        let local = pos - orig_len;
        self.ensure_additional_size(local + size)?;
        codec::write_uint(&mut self.additional, data, size, local)
    }

    /// Append raw bytes at the tail.
    pub fn write_bytes_at_tail(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let pos = self.tail_position();
        let local = self.additional.len();
        self.ensure_additional_size(local + bytes.len())?;
        self.additional[local..local + bytes.len()].copy_from_slice(bytes);
        Ok(pos)
    }

    /// Overwrite raw bytes at an arbitrary position inside the written range.
    pub fn write_bytes(&mut self, bytes: &[u8], pos: usize) -> io::Result<()> {
        let orig_len = self.original.len();
        if pos < orig_len {
            if pos + bytes.len() > orig_len {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Write at {} straddles the region boundary", pos),
                ));
            }
            let region = self.original.as_mut_slice().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    "Write into read-only original region",
                )
            })?;
            region[pos..pos + bytes.len()].copy_from_slice(bytes);
            return Ok(());
        }
        let local = pos - orig_len;
        self.ensure_additional_size(local + bytes.len())?;
        self.additional[local..local + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Copy the entire logical content (original + additional) out.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.tail_position());
        out.extend_from_slice(self.original.as_slice());
        out.extend_from_slice(&self.additional);
        out
    }

    fn ensure_additional_size(&mut self, needed: usize) -> io::Result<()> {
        if needed <= self.additional.len() {
            return Ok(());
        }
        if needed > self.max_additional_size {
            return Err(io::Error::new(
                io::ErrorKind::OutOfMemory,
                format!(
                    "Buffer extension to {} exceeds cap {}",
                    needed, self.max_additional_size
                ),
            ));
        }
        // Reserve in whole extension steps (clamped to the cap) so growth is
        // amortized; the logical length tracks exactly what was written.
        if needed > self.additional.capacity() {
            let stepped = needed.div_ceil(EXTEND_STEP_SIZE) * EXTEND_STEP_SIZE;
            let target = stepped.min(self.max_additional_size);
            self.additional
                .reserve_exact(target - self.additional.len());
        }
        self.additional.resize(needed, 0);
        Ok(())
    }
}

impl Default for ExtendableBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_read_roundtrip_in_additional_region() {
        let mut buf = ExtendableBuffer::new();
        buf.write_uint(0xCAFE, 2, 0).unwrap();
        assert_eq!(buf.read_uint(2, 0).unwrap(), 0xCAFE);
        assert_eq!(buf.tail_position(), 2);
    }

    #[test]
    fn positions_cross_the_original_boundary() {
        let original = OriginalContent::Owned(vec![0xAA; 10]);
        let mut buf = ExtendableBuffer::from_original(original, 1024);
        assert_eq!(buf.read_uint(1, 9).unwrap(), 0xAA);

        // Write at the boundary: lands at additional[0].
        buf.write_uint(0xBB, 1, 10).unwrap();
        assert_eq!(buf.read_uint(1, 10).unwrap(), 0xBB);
        assert_eq!(buf.additional_size(), 1);

        // In-place rewrite inside the owned original region.
        buf.write_uint(0x11, 1, 3).unwrap();
        assert_eq!(buf.read_uint(1, 3).unwrap(), 0x11);
    }

    #[test]
    fn growth_is_capped() {
        let mut buf = ExtendableBuffer::with_max_additional_size(16);
        assert!(buf.write_uint(1, 4, 0).is_ok());
        let err = buf.write_uint(1, 4, 20).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::OutOfMemory);
        // The failed write must not have changed the tail.
        assert_eq!(buf.tail_position(), 4);
    }

    #[test]
    fn near_size_limit_trips_at_ninety_percent() {
        let mut buf = ExtendableBuffer::with_max_additional_size(1000);
        assert!(!buf.is_near_size_limit());
        buf.write_bytes_at_tail(&vec![0u8; 899]).unwrap();
        assert!(!buf.is_near_size_limit());
        buf.write_bytes_at_tail(&[0u8]).unwrap();
        assert!(buf.is_near_size_limit());
    }

    #[test]
    fn reads_past_tail_fail() {
        let buf = ExtendableBuffer::new();
        assert!(buf.read_uint(1, 0).is_err());
    }

    #[test]
    fn to_vec_concatenates_regions() {
        let original = OriginalContent::Owned(vec![1, 2, 3]);
        let mut buf = ExtendableBuffer::from_original(original, 1024);
        buf.write_bytes_at_tail(&[4, 5]).unwrap();
        assert_eq!(buf.to_vec(), vec![1, 2, 3, 4, 5]);
    }
}
