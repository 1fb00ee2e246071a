// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Code-point string codec with the 1-byte alphabet-table optimization.
//!
//! Characters a dictionary uses constantly (the locale's alphabet, mostly)
//! should cost one byte, not three. A leading byte in `[0x20, 0xFF]` IS the
//! character — either literally, or through a 256-entry substitution table the
//! dictionary ships in its header. Everything else is a raw 3-byte code point,
//! whose high byte is always below 0x1F, so the decoder never has to guess.
//!
//! 0x1F terminates a string and is never a legal leading byte otherwise.

use std::io;

/// Reserved string terminator.
pub const TERMINATOR: u8 = 0x1F;

/// Lowest byte of the 1-byte character window.
pub const MIN_ONE_BYTE: u32 = 0x20;

/// Highest byte of the 1-byte character window.
pub const MAX_ONE_BYTE: u32 = 0xFF;

/// Longest word the engine stores, in code points. Matches the input-method
/// contract; also bounds decoder loops on corrupted data.
pub const MAX_WORD_LENGTH: usize = 48;

/// Optional 256-entry remapping of 1-byte characters to arbitrary code points.
///
/// Entry `i` gives the code point decoded for raw byte `i`. Bytes below the
/// window or equal to the terminator are never consulted. The reverse mapping
/// is precomputed because encoding runs on every insert.
#[derive(Debug, Clone)]
pub struct CodePointTable {
    forward: Vec<u32>,
    // (code point, byte) pairs sorted by code point for binary search
    reverse: Vec<(u32, u8)>,
}

impl CodePointTable {
    /// Build from the header attribute payload: entry per byte value, in
    /// order, for bytes 0x20..=0xFF (224 entries).
    pub fn from_attribute(code_points: &[u32]) -> Option<Self> {
        if code_points.len() != (MAX_ONE_BYTE - MIN_ONE_BYTE + 1) as usize {
            return None;
        }
        let mut forward = vec![0u32; 256];
        let mut reverse = Vec::with_capacity(code_points.len());
        for (i, &cp) in code_points.iter().enumerate() {
            let byte = MIN_ONE_BYTE as usize + i;
            forward[byte] = cp;
            reverse.push((cp, byte as u8));
        }
        reverse.sort_unstable();
        Some(Self { forward, reverse })
    }

    /// The attribute payload this table serializes back to.
    pub fn to_attribute(&self) -> Vec<u32> {
        self.forward[MIN_ONE_BYTE as usize..].to_vec()
    }

    fn decode(&self, byte: u8) -> u32 {
        self.forward[byte as usize]
    }

    fn encode(&self, code_point: u32) -> Option<u8> {
        self.reverse
            .binary_search_by_key(&code_point, |&(cp, _)| cp)
            .ok()
            .map(|i| self.reverse[i].1)
    }
}

/// Decoded string plus the number of bytes consumed.
pub struct DecodedCodePoints {
    pub code_points: Vec<u32>,
    pub consumed: usize,
}

/// Encode one code point, appending 1 or 3 bytes.
pub fn encode_code_point(code_point: u32, table: Option<&CodePointTable>, out: &mut Vec<u8>) {
    if let Some(table) = table {
        if let Some(byte) = table.encode(code_point) {
            out.push(byte);
            return;
        }
    } else if (MIN_ONE_BYTE..=MAX_ONE_BYTE).contains(&code_point) {
        out.push(code_point as u8);
        return;
    }
    // Raw path: any scalar value fits in 24 bits with a high byte < 0x1F.
    out.push((code_point >> 16) as u8);
    out.push((code_point >> 8) as u8);
    out.push(code_point as u8);
}

/// Encode a whole string. `terminated` appends the 0x1F terminator.
pub fn encode_code_points(
    code_points: &[u32],
    table: Option<&CodePointTable>,
    terminated: bool,
    out: &mut Vec<u8>,
) {
    for &cp in code_points {
        encode_code_point(cp, table, out);
    }
    if terminated {
        out.push(TERMINATOR);
    }
}

/// Decode one code point at `pos`. Returns `(code point, consumed)`; a
/// terminator decodes as `(None, 1)`.
pub fn decode_code_point(
    bytes: &[u8],
    pos: usize,
    table: Option<&CodePointTable>,
) -> io::Result<(Option<u32>, usize)> {
    let first = *bytes.get(pos).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("Code point read out of bounds at {}", pos),
        )
    })?;
    if first == TERMINATOR {
        return Ok((None, 1));
    }
    if u32::from(first) >= MIN_ONE_BYTE {
        let cp = match table {
            Some(table) => table.decode(first),
            None => u32::from(first),
        };
        return Ok((Some(cp), 1));
    }
    let rest = bytes.get(pos + 1..pos + 3).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("Truncated 3-byte code point at {}", pos),
        )
    })?;
    let cp = (u32::from(first) << 16) | (u32::from(rest[0]) << 8) | u32::from(rest[1]);
    Ok((Some(cp), 3))
}

/// Decode a 0x1F-terminated string starting at `pos`.
///
/// Stops with an error after `MAX_WORD_LENGTH` code points; a missing
/// terminator on corrupted input must not become an unbounded scan.
pub fn decode_code_points(
    bytes: &[u8],
    pos: usize,
    table: Option<&CodePointTable>,
) -> io::Result<DecodedCodePoints> {
    let mut code_points = Vec::new();
    let mut cursor = pos;
    loop {
        let (cp, consumed) = decode_code_point(bytes, cursor, table)?;
        cursor += consumed;
        match cp {
            None => {
                return Ok(DecodedCodePoints {
                    code_points,
                    consumed: cursor - pos,
                })
            }
            Some(cp) => {
                if code_points.len() >= MAX_WORD_LENGTH {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "Unterminated code point string (possible corruption)",
                    ));
                }
                code_points.push(cp);
            }
        }
    }
}

/// Convert a Rust string to the code-point form the trie stores.
pub fn code_points_of(word: &str) -> Vec<u32> {
    word.chars().map(|c| c as u32).collect()
}

/// Convert stored code points back to a Rust string, skipping invalid scalars
/// (they cannot appear in well-formed dictionaries, but corrupted ones must
/// not panic the host).
pub fn string_of(code_points: &[u32]) -> String {
    code_points
        .iter()
        .filter_map(|&cp| char::from_u32(cp))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_is_one_byte() {
        let mut out = Vec::new();
        encode_code_points(&code_points_of("cat"), None, true, &mut out);
        assert_eq!(out, vec![b'c', b'a', b't', TERMINATOR]);
    }

    #[test]
    fn non_latin_takes_three_bytes() {
        let mut out = Vec::new();
        encode_code_point('語' as u32, None, &mut out);
        assert_eq!(out.len(), 3);
        assert!(out[0] < TERMINATOR);
        let (cp, consumed) = decode_code_point(&out, 0, None).unwrap();
        assert_eq!(cp, Some('語' as u32));
        assert_eq!(consumed, 3);
    }

    #[test]
    fn control_range_takes_three_bytes() {
        // 0x0A is below the 1-byte window; it must round-trip via the raw path.
        let mut out = Vec::new();
        encode_code_point(0x0A, None, &mut out);
        assert_eq!(out, vec![0x00, 0x00, 0x0A]);
    }

    #[test]
    fn string_roundtrip_mixed() {
        let word: Vec<u32> = "naïve語".chars().map(|c| c as u32).collect();
        let mut out = Vec::new();
        encode_code_points(&word, None, true, &mut out);
        let decoded = decode_code_points(&out, 0, None).unwrap();
        assert_eq!(decoded.code_points, word);
        assert_eq!(decoded.consumed, out.len());
    }

    #[test]
    fn table_substitutes_frequent_characters() {
        // Map the whole window to shifted code points; 0x20 -> U+3042 etc.
        let payload: Vec<u32> = (0..224).map(|i| 0x3042 + i).collect();
        let table = CodePointTable::from_attribute(&payload).unwrap();

        let mut out = Vec::new();
        encode_code_point(0x3042, Some(&table), &mut out);
        assert_eq!(out, vec![0x20]);

        let (cp, consumed) = decode_code_point(&out, 0, Some(&table)).unwrap();
        assert_eq!(cp, Some(0x3042));
        assert_eq!(consumed, 1);

        // A code point inside the raw window but absent from the table must
        // fall back to 3 bytes, or decoding would remap it wrongly.
        let mut out = Vec::new();
        encode_code_point(u32::from(b'a'), Some(&table), &mut out);
        assert_eq!(out.len(), 3);
        let (cp, _) = decode_code_point(&out, 0, Some(&table)).unwrap();
        assert_eq!(cp, Some(u32::from(b'a')));
    }

    #[test]
    fn unterminated_string_is_rejected() {
        let bytes = vec![b'a'; MAX_WORD_LENGTH + 4];
        assert!(decode_code_points(&bytes, 0, None).is_err());
    }
}
