//! `VS_VERSIONINFO` decoder.
//!
//! The version resource is a tree of length-prefixed blocks: the outer
//! `VS_VERSION_INFO` block carries a fixed binary file-version record, then
//! a `StringFileInfo` block holding one or more `StringTable`s of UTF-16
//! key/value pairs, everything padded to 4-byte alignment. Malware routinely
//! ships truncated or hand-mangled resources, so the decoder keeps every
//! well-formed entry it reaches and stops at the first malformed one -- a
//! decoding failure never fails the scan, partial absence is itself signal.

use std::collections::BTreeMap;

use serde::Serialize;

/// String metadata decoded from a version resource. A `None` field means the
/// resource was present but did not carry that key; callers distinguish this
/// from the resource being absent entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub company_name: Option<String>,
    pub product_name: Option<String>,
    pub file_description: Option<String>,
    pub legal_copyright: Option<String>,
    pub file_version: Option<String>,
    pub product_version: Option<String>,
    pub internal_name: Option<String>,
    pub original_filename: Option<String>,
    pub comments: Option<String>,
    /// Keys the scanner does not interpret, preserved verbatim.
    pub other: BTreeMap<String, String>,
}

impl VersionInfo {
    fn insert(&mut self, key: &str, value: String) {
        match key {
            "CompanyName" => self.company_name = Some(value),
            "ProductName" => self.product_name = Some(value),
            "FileDescription" => self.file_description = Some(value),
            "LegalCopyright" => self.legal_copyright = Some(value),
            "FileVersion" => self.file_version = Some(value),
            "ProductVersion" => self.product_version = Some(value),
            "InternalName" => self.internal_name = Some(value),
            "OriginalFilename" => self.original_filename = Some(value),
            "Comments" => self.comments = Some(value),
            _ => {
                self.other.insert(key.to_owned(), value);
            }
        }
    }
}

/// Header common to every block in the resource: total length, value
/// length, type tag, then a UTF-16 NUL-terminated key.
struct Block {
    w_length: u16,
    w_value_length: u16,
    w_type: u16,
    key: String,
    value_off: usize,
    end: usize,
}

fn u16_at(data: &[u8], off: usize) -> Option<u16> {
    let b = data.get(off..off + 2)?;
    Some(u16::from_le_bytes([b[0], b[1]]))
}

fn align4(off: usize) -> usize {
    (off + 3) & !3
}

/// Read a UTF-16LE NUL-terminated string starting at `off`, bounded by
/// `end`. Returns the string and the offset just past the terminator. A
/// missing terminator consumes the remainder of the bound.
fn read_utf16z(data: &[u8], off: usize, end: usize) -> Option<(String, usize)> {
    let end = end.min(data.len());
    if off >= end {
        return None;
    }
    let mut units = Vec::new();
    let mut pos = off;
    while pos + 2 <= end {
        let unit = u16::from_le_bytes([data[pos], data[pos + 1]]);
        pos += 2;
        if unit == 0 {
            break;
        }
        units.push(unit);
    }
    let s = char::decode_utf16(units.into_iter())
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect();
    Some((s, pos))
}

/// Read exactly `chars` UTF-16 code units (clipped to the bound), with
/// trailing NULs stripped.
fn read_utf16_value(data: &[u8], off: usize, chars: usize, end: usize) -> String {
    let end = end.min(data.len());
    let mut units = Vec::new();
    let mut pos = off;
    while units.len() < chars && pos + 2 <= end {
        units.push(u16::from_le_bytes([data[pos], data[pos + 1]]));
        pos += 2;
    }
    while units.last() == Some(&0) {
        units.pop();
    }
    char::decode_utf16(units.into_iter())
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

fn read_block(data: &[u8], off: usize, parent_end: usize) -> Option<Block> {
    let limit = parent_end.min(data.len());
    if off + 6 > limit {
        return None;
    }
    let w_length = u16_at(data, off)?;
    let w_value_length = u16_at(data, off + 2)?;
    let w_type = u16_at(data, off + 4)?;
    if (w_length as usize) < 6 {
        return None;
    }
    let end = (off + w_length as usize).min(limit);
    let (key, key_end) = read_utf16z(data, off + 6, end)?;
    Some(Block {
        w_length,
        w_value_length,
        w_type,
        key,
        value_off: align4(key_end),
        end,
    })
}

/// Decode the string tables of a `VS_VERSIONINFO` resource.
///
/// Returns `None` when the outer block is not readable at all; otherwise
/// `Some`, possibly with every field unset when the string tables are
/// missing or mangled. When multiple localized `StringTable`s exist only
/// the first one is read.
pub fn decode(data: &[u8]) -> Option<VersionInfo> {
    let root = read_block(data, 0, data.len())?;
    if root.key != "VS_VERSION_INFO" {
        return None;
    }

    let mut info = VersionInfo::default();

    // Children start past the VS_FIXEDFILEINFO value (w_value_length bytes).
    let mut off = align4(root.value_off + root.w_value_length as usize);
    while off < root.end {
        let Some(child) = read_block(data, off, root.end) else {
            break;
        };
        if child.key == "StringFileInfo" {
            decode_string_file_info(data, &child, &mut info);
            break;
        }
        // Skip VarFileInfo and anything else.
        off = align4(off + child.w_length as usize);
    }

    Some(info)
}

fn decode_string_file_info(data: &[u8], sfi: &Block, info: &mut VersionInfo) {
    // Children are StringTables keyed by a language/codepage identifier the
    // scanner does not interpret. Only the first table is consulted; if its
    // header is unreadable the whole lookup gives up.
    let off = align4(sfi.value_off);
    if off >= sfi.end {
        return;
    }
    let Some(table) = read_block(data, off, sfi.end) else {
        return;
    };
    decode_string_table(data, &table, info);
}

fn decode_string_table(data: &[u8], table: &Block, info: &mut VersionInfo) {
    let mut off = align4(table.value_off);
    while off < table.end {
        let Some(entry) = read_block(data, off, table.end) else {
            break;
        };
        // For textual entries (wType 1) the value length is in UTF-16 code
        // units; some linkers emit wType 0 with a byte count instead.
        let chars = if entry.w_type == 1 {
            entry.w_value_length as usize
        } else {
            entry.w_value_length as usize / 2
        };
        let value = read_utf16_value(data, entry.value_off, chars, entry.end);
        info.insert(&entry.key, value);
        off = align4(off + entry.w_length as usize);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{build_version_info, build_version_info_tables};

    #[test]
    fn decodes_recognized_keys() {
        let blob = build_version_info(&[
            ("CompanyName", "Contoso"),
            ("ProductName", "Widget Studio"),
            ("FileDescription", "Widget runtime"),
            ("LegalCopyright", "(c) Contoso Ltd."),
            ("FileVersion", "1.2.3.4"),
            ("ProductVersion", "1.2"),
            ("InternalName", "widget"),
            ("OriginalFilename", "widget.exe"),
        ]);

        let info = decode(&blob).unwrap();
        assert_eq!(info.company_name.as_deref(), Some("Contoso"));
        assert_eq!(info.product_name.as_deref(), Some("Widget Studio"));
        assert_eq!(info.file_description.as_deref(), Some("Widget runtime"));
        assert_eq!(info.legal_copyright.as_deref(), Some("(c) Contoso Ltd."));
        assert_eq!(info.file_version.as_deref(), Some("1.2.3.4"));
        assert_eq!(info.product_version.as_deref(), Some("1.2"));
        assert_eq!(info.internal_name.as_deref(), Some("widget"));
        assert_eq!(info.original_filename.as_deref(), Some("widget.exe"));
        assert!(info.other.is_empty());
    }

    #[test]
    fn unrecognized_keys_are_preserved() {
        let blob = build_version_info(&[
            ("CompanyName", "Contoso"),
            ("PrivateBuild", "nightly-42"),
        ]);

        let info = decode(&blob).unwrap();
        assert_eq!(info.company_name.as_deref(), Some("Contoso"));
        assert_eq!(info.other.get("PrivateBuild").map(String::as_str), Some("nightly-42"));
    }

    #[test]
    fn empty_value_is_present_not_absent() {
        let blob = build_version_info(&[("CompanyName", "")]);
        let info = decode(&blob).unwrap();
        assert_eq!(info.company_name.as_deref(), Some(""));
        assert_eq!(info.product_name, None);
    }

    #[test]
    fn resource_without_string_tables_decodes_empty() {
        // Outer block with fixed file info only.
        let blob = build_version_info(&[]);
        let info = decode(&blob).unwrap();
        assert_eq!(info, VersionInfo::default());
    }

    #[test]
    fn first_string_table_wins_over_later_locales() {
        let english: &[(&str, &str)] = &[
            ("CompanyName", "Contoso"),
            ("ProductName", "Widget Studio"),
        ];
        let german: &[(&str, &str)] = &[
            ("CompanyName", "Contoso GmbH"),
            ("Comments", "deutsche Ausgabe"),
        ];
        let blob = build_version_info_tables(&[("040904b0", english), ("040704b0", german)]);

        let info = decode(&blob).unwrap();
        assert_eq!(info.company_name.as_deref(), Some("Contoso"));
        assert_eq!(info.product_name.as_deref(), Some("Widget Studio"));
        // Entries unique to the second table are not merged in.
        assert_eq!(info.comments, None);
    }

    #[test]
    fn unreadable_first_table_yields_empty_info() {
        let english: &[(&str, &str)] = &[("CompanyName", "Contoso")];
        let german: &[(&str, &str)] = &[("CompanyName", "Contoso GmbH")];
        let mut blob = build_version_info_tables(&[("040904b0", english), ("040704b0", german)]);

        // Make the first table's wLength nonsense. The lookup stops there
        // rather than scanning ahead to the second table.
        let key: Vec<u8> = "040904b0".encode_utf16().flat_map(u16::to_le_bytes).collect();
        let table = blob.windows(key.len()).position(|w| w == key).unwrap() - 6;
        blob[table..table + 2].copy_from_slice(&2u16.to_le_bytes());

        let info = decode(&blob).unwrap();
        assert_eq!(info, VersionInfo::default());
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(decode(&[]), None);
        assert_eq!(decode(&[0xFF; 4]), None);
        assert_eq!(decode(b"this is not a version resource at all"), None);
    }

    #[test]
    fn truncated_resource_keeps_decoded_entries() {
        let blob = build_version_info(&[
            ("CompanyName", "Contoso"),
            ("ProductName", "Widget Studio"),
        ]);

        // Cut the buffer in the middle of the second string entry. The
        // first entry must survive.
        let cut = blob.len() - 10;
        let info = decode(&blob[..cut]).unwrap();
        assert_eq!(info.company_name.as_deref(), Some("Contoso"));
    }

    #[test]
    fn non_ascii_values_decode() {
        let blob = build_version_info(&[("CompanyName", "Bücher GmbH \u{2013} München")]);
        let info = decode(&blob).unwrap();
        assert_eq!(info.company_name.as_deref(), Some("Bücher GmbH \u{2013} München"));
    }
}
