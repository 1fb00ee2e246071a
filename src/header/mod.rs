// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Dictionary header: magic, version, and the attribute map.
//!
//! The header is the only part of the format that is self-describing: after
//! the fixed 12 bytes (magic, version, flags, size) it is nothing but
//! 0x1F-terminated code-point-string key/value pairs until `header_size`.
//! Everything configurable about a dictionary — locale, decay policy, entry
//! caps, the code-point substitution table — travels in those pairs.
//!
//! Version policy is an allow-list. Legacy formats (the old inline-probability
//! trie) are recognized and rejected with a hard error rather than silently
//! upgraded; unknown magic or version fails detection closed.

use std::io;

use crate::buffer::codec::{read_uint, write_uint};
use crate::buffer::codepoints::{
    code_points_of, decode_code_points, encode_code_points, string_of, CodePointTable,
};

// ============================================================================
// FORMAT CONSTANTS
// ============================================================================

/// Magic number at offset 0 of every dictionary header.
pub const MAGIC_NUMBER: u32 = 0x9BC1_3AFE;

/// Fixed part of the header: magic (4) + version (2) + flags (2) + size (4).
pub const FIXED_HEADER_SIZE: usize = 12;

/// Header flags field; no flags are defined, the field must be zero.
const HEADER_FLAGS: u32 = 0;

/// Raw version values recognized as legacy and rejected outright.
const LEGACY_VERSIONS: [u16; 4] = [2, 201, 202, 401];

// ============================================================================
// ATTRIBUTE KEYS
// ============================================================================

pub const DICTIONARY_NAME_KEY: &str = "dictionary";
pub const LOCALE_KEY: &str = "locale";
pub const VERSION_ATTRIBUTE_KEY: &str = "version";
pub const CREATED_TIME_KEY: &str = "date";
pub const LAST_DECAYED_TIME_KEY: &str = "LAST_DECAYED_TIME";
pub const USES_FORGETTING_CURVE_KEY: &str = "USES_FORGETTING_CURVE";
pub const HAS_HISTORICAL_INFO_KEY: &str = "HAS_HISTORICAL_INFO";
pub const MAX_UNIGRAM_ENTRY_COUNT_KEY: &str = "MAX_UNIGRAM_ENTRY_COUNT";
pub const MAX_BIGRAM_ENTRY_COUNT_KEY: &str = "MAX_BIGRAM_ENTRY_COUNT";
pub const MAX_TRIGRAM_ENTRY_COUNT_KEY: &str = "MAX_TRIGRAM_ENTRY_COUNT";
pub const UNIGRAM_COUNT_KEY: &str = "UNIGRAM_COUNT";
pub const BIGRAM_COUNT_KEY: &str = "BIGRAM_COUNT";
pub const TRIGRAM_COUNT_KEY: &str = "TRIGRAM_COUNT";
pub const EXTENDED_REGION_SIZE_KEY: &str = "EXTENDED_REGION_SIZE";
pub const FORGETTING_CURVE_TABLE_ID_KEY: &str = "FORGETTING_CURVE_PROBABILITY_VALUES_TABLE_ID";
pub const FORGETTING_CURVE_DURATION_KEY: &str =
    "FORGETTING_CURVE_DURATION_TO_LEVEL_DOWN_IN_SECONDS";
pub const FORGETTING_CURVE_OCCURRENCES_KEY: &str = "FORGETTING_CURVE_OCCURRENCES_TO_LEVEL_UP";
pub const CODE_POINT_TABLE_KEY: &str = "CODE_POINT_TABLE";

// Defaults applied when an attribute is absent.
pub const DEFAULT_MAX_UNIGRAM_ENTRY_COUNT: u32 = 10_000;
pub const DEFAULT_MAX_BIGRAM_ENTRY_COUNT: u32 = 12_000;
pub const DEFAULT_MAX_TRIGRAM_ENTRY_COUNT: u32 = 12_000;

// ============================================================================
// FORMAT VERSION
// ============================================================================

/// Supported on-disk format versions.
///
/// 402 is the older dynamic format: flat probabilities only, no code-point
/// table. 403 adds historical info (forgetting curve) and the 1-byte
/// substitution table. Both read and write through the same codecs, selected
/// at runtime by this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatVersion {
    V402,
    V403,
}

impl FormatVersion {
    pub fn from_raw(raw: u16) -> io::Result<Self> {
        match raw {
            402 => Ok(FormatVersion::V402),
            403 => Ok(FormatVersion::V403),
            v if LEGACY_VERSIONS.contains(&v) => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Legacy dictionary version {} is not supported", v),
            )),
            v => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unknown dictionary version {}", v),
            )),
        }
    }

    pub fn raw(self) -> u16 {
        match self {
            FormatVersion::V402 => 402,
            FormatVersion::V403 => 403,
        }
    }

    pub fn supports_historical_info(self) -> bool {
        matches!(self, FormatVersion::V403)
    }

    pub fn supports_code_point_table(self) -> bool {
        matches!(self, FormatVersion::V403)
    }
}

// ============================================================================
// ATTRIBUTE MAP
// ============================================================================

/// Ordered key → value map of code-point strings.
///
/// Keys are ASCII in practice and kept as `String`; values stay as raw code
/// points because the code-point table attribute is not text.
#[derive(Debug, Clone, Default)]
pub struct AttributeMap {
    entries: Vec<(String, Vec<u32>)>,
}

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&[u32]> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    /// Insert or overwrite, preserving first-insertion order.
    pub fn set(&mut self, key: &str, value: Vec<u32>) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key.to_string(), value));
        }
    }

    pub fn set_string(&mut self, key: &str, value: &str) {
        self.set(key, code_points_of(value));
    }

    pub fn set_int(&mut self, key: &str, value: u32) {
        self.set_string(key, &value.to_string());
    }

    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.set_string(key, if value { "1" } else { "0" });
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).map(string_of)
    }

    /// Integer accessor. Any non-digit content yields the default — attribute
    /// values come from files and must never crash the parse.
    pub fn get_int(&self, key: &str, default: u32) -> u32 {
        match self.get_string(key) {
            Some(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
                s.parse().unwrap_or(default)
            }
            _ => default,
        }
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get_string(key).as_deref() {
            Some("1") => true,
            Some("0") => false,
            _ => default,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u32])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

// ============================================================================
// HEADER POLICY
// ============================================================================

/// Parsed header plus the typed view the rest of the engine consults.
#[derive(Debug)]
pub struct HeaderPolicy {
    version: FormatVersion,
    attributes: AttributeMap,
    code_point_table: Option<CodePointTable>,
}

impl HeaderPolicy {
    /// Create the header for a fresh on-memory dictionary.
    pub fn new_for_dictionary(
        version: FormatVersion,
        locale: &str,
        extra_attributes: &AttributeMap,
        created_time: u32,
    ) -> Self {
        let mut attributes = AttributeMap::new();
        attributes.set_string(VERSION_ATTRIBUTE_KEY, &version.raw().to_string());
        attributes.set_string(LOCALE_KEY, locale);
        attributes.set_int(CREATED_TIME_KEY, created_time);
        attributes.set_int(LAST_DECAYED_TIME_KEY, created_time);
        for (key, value) in extra_attributes.iter() {
            attributes.set(key, value.to_vec());
        }
        let code_point_table = if version.supports_code_point_table() {
            attributes
                .get(CODE_POINT_TABLE_KEY)
                .and_then(CodePointTable::from_attribute)
        } else {
            None
        };
        Self {
            version,
            attributes,
            code_point_table,
        }
    }

    /// Parse a header from raw bytes. Fails closed on bad magic, unsupported
    /// version, nonzero flags, or a truncated attribute region.
    pub fn read_from_bytes(bytes: &[u8]) -> io::Result<Self> {
        if bytes.len() < FIXED_HEADER_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("Header too short: {} bytes", bytes.len()),
            ));
        }
        let magic = read_uint(bytes, 4, 0)?;
        if magic != MAGIC_NUMBER {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Bad magic number {:#010x}", magic),
            ));
        }
        let version = FormatVersion::from_raw(read_uint(bytes, 2, 4)? as u16)?;
        let flags = read_uint(bytes, 2, 6)?;
        if flags != HEADER_FLAGS {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unsupported header flags {:#06x}", flags),
            ));
        }
        let header_size = read_uint(bytes, 4, 8)? as usize;
        if header_size < FIXED_HEADER_SIZE || header_size > bytes.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Header size {} out of range", header_size),
            ));
        }

        let mut attributes = AttributeMap::new();
        let mut pos = FIXED_HEADER_SIZE;
        while pos < header_size {
            let key = decode_code_points(&bytes[..header_size], pos, None)?;
            pos += key.consumed;
            let value = decode_code_points(&bytes[..header_size], pos, None)?;
            pos += value.consumed;
            attributes
                .entries
                .push((string_of(&key.code_points), value.code_points));
        }

        let code_point_table = if version.supports_code_point_table() {
            attributes
                .get(CODE_POINT_TABLE_KEY)
                .and_then(CodePointTable::from_attribute)
        } else {
            None
        };

        let policy = Self {
            version,
            attributes,
            code_point_table,
        };
        if !policy.is_valid() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Decaying dictionary without historical info",
            ));
        }
        Ok(policy)
    }

    /// Serialize, recomputing the header-size field.
    pub fn write_to_vec(&self) -> Vec<u8> {
        let mut body = Vec::new();
        for (key, value) in self.attributes.iter() {
            encode_code_points(&code_points_of(key), None, true, &mut body);
            encode_code_points(value, None, true, &mut body);
        }
        let total = FIXED_HEADER_SIZE + body.len();
        let mut out = vec![0u8; FIXED_HEADER_SIZE];
        write_uint(&mut out, MAGIC_NUMBER, 4, 0).expect("fixed header fits");
        write_uint(&mut out, u32::from(self.version.raw()), 2, 4).expect("fixed header fits");
        write_uint(&mut out, HEADER_FLAGS, 2, 6).expect("fixed header fits");
        write_uint(&mut out, total as u32, 4, 8).expect("fixed header fits");
        out.extend_from_slice(&body);
        out
    }

    // ------------------------------------------------------------------
    // Typed accessors
    // ------------------------------------------------------------------

    pub fn version(&self) -> FormatVersion {
        self.version
    }

    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut AttributeMap {
        &mut self.attributes
    }

    pub fn code_point_table(&self) -> Option<&CodePointTable> {
        self.code_point_table.as_ref()
    }

    pub fn locale(&self) -> String {
        self.attributes.get_string(LOCALE_KEY).unwrap_or_default()
    }

    pub fn is_decaying_dict(&self) -> bool {
        self.attributes.get_bool(USES_FORGETTING_CURVE_KEY, false)
    }

    pub fn has_historical_info(&self) -> bool {
        self.attributes.get_bool(HAS_HISTORICAL_INFO_KEY, false)
    }

    /// A decaying dictionary must carry historical info for its words.
    pub fn is_valid(&self) -> bool {
        !(self.is_decaying_dict() && !self.has_historical_info())
    }

    pub fn created_time(&self) -> u32 {
        self.attributes.get_int(CREATED_TIME_KEY, 0)
    }

    pub fn last_decayed_time(&self) -> u32 {
        self.attributes.get_int(LAST_DECAYED_TIME_KEY, 0)
    }

    pub fn max_unigram_count(&self) -> u32 {
        self.attributes
            .get_int(MAX_UNIGRAM_ENTRY_COUNT_KEY, DEFAULT_MAX_UNIGRAM_ENTRY_COUNT)
    }

    pub fn max_bigram_count(&self) -> u32 {
        self.attributes
            .get_int(MAX_BIGRAM_ENTRY_COUNT_KEY, DEFAULT_MAX_BIGRAM_ENTRY_COUNT)
    }

    pub fn max_trigram_count(&self) -> u32 {
        self.attributes
            .get_int(MAX_TRIGRAM_ENTRY_COUNT_KEY, DEFAULT_MAX_TRIGRAM_ENTRY_COUNT)
    }

    pub fn extended_region_size(&self) -> usize {
        self.attributes.get_int(EXTENDED_REGION_SIZE_KEY, 0) as usize
    }

    pub fn forgetting_curve_table_id(&self) -> u32 {
        self.attributes.get_int(FORGETTING_CURVE_TABLE_ID_KEY, 1)
    }

    pub fn forgetting_curve_duration(&self) -> u32 {
        self.attributes.get_int(
            FORGETTING_CURVE_DURATION_KEY,
            crate::lm::decay::DEFAULT_DURATION_TO_LEVEL_DOWN_IN_SECONDS,
        )
    }

    pub fn forgetting_curve_occurrences_to_level_up(&self) -> u32 {
        self.attributes.get_int(
            FORGETTING_CURVE_OCCURRENCES_KEY,
            crate::lm::decay::DEFAULT_OCCURRENCES_TO_LEVEL_UP,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_header(version: FormatVersion) -> HeaderPolicy {
        HeaderPolicy::new_for_dictionary(version, "en", &AttributeMap::new(), 1_000_000)
    }

    #[test]
    fn roundtrip_preserves_attributes() {
        let mut header = minimal_header(FormatVersion::V403);
        header.attributes_mut().set_bool(USES_FORGETTING_CURVE_KEY, true);
        header.attributes_mut().set_bool(HAS_HISTORICAL_INFO_KEY, true);
        header.attributes_mut().set_int(MAX_UNIGRAM_ENTRY_COUNT_KEY, 5000);

        let bytes = header.write_to_vec();
        let parsed = HeaderPolicy::read_from_bytes(&bytes).unwrap();
        assert_eq!(parsed.version(), FormatVersion::V403);
        assert_eq!(parsed.locale(), "en");
        assert!(parsed.is_decaying_dict());
        assert!(parsed.has_historical_info());
        assert_eq!(parsed.max_unigram_count(), 5000);
        assert_eq!(parsed.created_time(), 1_000_000);
    }

    #[test]
    fn bad_magic_fails_closed() {
        let mut bytes = minimal_header(FormatVersion::V403).write_to_vec();
        bytes[0] ^= 0xFF;
        assert!(HeaderPolicy::read_from_bytes(&bytes).is_err());
    }

    #[test]
    fn legacy_version_is_rejected_with_hard_error() {
        let mut bytes = minimal_header(FormatVersion::V403).write_to_vec();
        // Patch the version field to the legacy static-trie value.
        bytes[4] = 0;
        bytes[5] = 202;
        let err = HeaderPolicy::read_from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("Legacy"));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut bytes = minimal_header(FormatVersion::V403).write_to_vec();
        bytes[4] = 0xAB;
        bytes[5] = 0xCD;
        assert!(HeaderPolicy::read_from_bytes(&bytes).is_err());
    }

    #[test]
    fn truncated_header_is_rejected() {
        let bytes = minimal_header(FormatVersion::V403).write_to_vec();
        assert!(HeaderPolicy::read_from_bytes(&bytes[..8]).is_err());
        assert!(HeaderPolicy::read_from_bytes(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn decaying_without_historical_info_is_invalid() {
        let mut header = minimal_header(FormatVersion::V403);
        header.attributes_mut().set_bool(USES_FORGETTING_CURVE_KEY, true);
        assert!(!header.is_valid());
        let bytes = header.write_to_vec();
        assert!(HeaderPolicy::read_from_bytes(&bytes).is_err());
    }

    #[test]
    fn int_accessor_rejects_non_digits() {
        let mut header = minimal_header(FormatVersion::V402);
        header.attributes_mut().set_string(MAX_UNIGRAM_ENTRY_COUNT_KEY, "12x4");
        assert_eq!(header.max_unigram_count(), DEFAULT_MAX_UNIGRAM_ENTRY_COUNT);
        header.attributes_mut().set_string(MAX_UNIGRAM_ENTRY_COUNT_KEY, "");
        assert_eq!(header.max_unigram_count(), DEFAULT_MAX_UNIGRAM_ENTRY_COUNT);
        header.attributes_mut().set_string(MAX_UNIGRAM_ENTRY_COUNT_KEY, "1234");
        assert_eq!(header.max_unigram_count(), 1234);
    }
}
