//! PE structural parser.
//!
//! Parses just enough of the DOS/NT headers to recover the section table and
//! the file offset of the embedded `VS_VERSIONINFO` resource. Every offset
//! and length read from the file is untrusted: all range accesses are
//! bounds-checked, and locally malformed structures (one bad section, one
//! bad resource node) degrade to partial data instead of failing the parse.

use thiserror::Error;

const MZ_MAGIC: [u8; 2] = *b"MZ";
const PE_SIG: [u8; 4] = *b"PE\0\0";
/// File offset of `e_lfanew`, the pointer to the NT headers.
const E_LFANEW_OFFSET: usize = 0x3C;
const COFF_HEADER_SIZE: usize = 20;
const SECTION_HEADER_SIZE: usize = 40;
const OPT_MAGIC_PE32PLUS: u16 = 0x20B;
/// Resource table is data directory index 2.
const RESOURCE_DIR_INDEX: usize = 2;
/// Resource type id of `VS_VERSIONINFO` (RT_VERSION).
const RT_VERSION: u32 = 16;

// Hostile headers can declare absurd counts; cap them the way other PE
// tooling does rather than trusting the file.
const MAX_SECTIONS: usize = 96;
const MAX_RESOURCE_NODES: usize = 10_000;

const IMAGE_SCN_MEM_EXECUTE: u32 = 0x2000_0000;
const IMAGE_SCN_MEM_READ: u32 = 0x4000_0000;
const IMAGE_SCN_MEM_WRITE: u32 = 0x8000_0000;

/// Typed parse failure. Anything that makes further parsing unsafe aborts
/// with one of these; the caller downgrades it to an opaque-bytes record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Missing `MZ` or `PE\0\0` magic: not a PE image at all.
    #[error("not a PE image")]
    NotPe,
    /// Headers declare structures that extend past the end of the buffer.
    #[error("truncated PE: {0} extends past end of file")]
    Truncated(&'static str),
}

/// One entry of the section table.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    /// Section name, from the fixed 8-byte field with NUL padding trimmed.
    pub name: String,
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub raw_offset: u32,
    pub raw_size: u32,
    pub characteristics: u32,
    /// Set when `raw_offset + raw_size` exceeds the file; the section is
    /// kept so the rest of the table can still be analyzed.
    pub truncated: bool,
}

impl Section {
    pub fn is_executable(&self) -> bool {
        self.characteristics & IMAGE_SCN_MEM_EXECUTE != 0
    }

    pub fn is_writable(&self) -> bool {
        self.characteristics & IMAGE_SCN_MEM_WRITE != 0
    }

    pub fn is_readable(&self) -> bool {
        self.characteristics & IMAGE_SCN_MEM_READ != 0
    }

    /// The section's raw byte range, or `None` for truncated sections.
    pub fn raw_range(&self) -> Option<std::ops::Range<usize>> {
        if self.truncated {
            return None;
        }
        let start = self.raw_offset as usize;
        Some(start..start + self.raw_size as usize)
    }
}

/// File offset and size of a located resource payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLocation {
    pub offset: usize,
    pub size: usize,
}

/// Parsed structural view of a PE buffer. Only constructible through
/// [`parse`], after both header magics have been verified.
#[derive(Debug, Clone, PartialEq)]
pub struct PeImage {
    pub machine: u16,
    pub timestamp: u32,
    pub sections: Vec<Section>,
    /// Location of the `VS_VERSIONINFO` resource, if the image carries one.
    pub version_resource: Option<ResourceLocation>,
}

fn u16_at(data: &[u8], off: usize) -> Option<u16> {
    let b = data.get(off..off + 2)?;
    Some(u16::from_le_bytes([b[0], b[1]]))
}

fn u32_at(data: &[u8], off: usize) -> Option<u32> {
    let b = data.get(off..off + 4)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Parse the structural skeleton of a PE image.
///
/// Deterministic and idempotent: parsing the same buffer twice yields
/// structurally equal results.
pub fn parse(data: &[u8]) -> Result<PeImage, ParseError> {
    if data.len() < 2 || data[..2] != MZ_MAGIC {
        return Err(ParseError::NotPe);
    }
    let e_lfanew = u32_at(data, E_LFANEW_OFFSET).ok_or(ParseError::NotPe)? as usize;
    match data.get(e_lfanew..e_lfanew + 4) {
        Some(sig) if *sig == PE_SIG => {}
        _ => return Err(ParseError::NotPe),
    }

    let coff = e_lfanew + 4;
    if coff + COFF_HEADER_SIZE > data.len() {
        return Err(ParseError::Truncated("COFF header"));
    }
    let machine = u16_at(data, coff).ok_or(ParseError::Truncated("COFF header"))?;
    let number_of_sections =
        u16_at(data, coff + 2).ok_or(ParseError::Truncated("COFF header"))? as usize;
    let timestamp = u32_at(data, coff + 4).ok_or(ParseError::Truncated("COFF header"))?;
    let opt_header_size =
        u16_at(data, coff + 16).ok_or(ParseError::Truncated("COFF header"))? as usize;

    if number_of_sections > MAX_SECTIONS {
        return Err(ParseError::Truncated("section table"));
    }

    let opt = coff + COFF_HEADER_SIZE;
    let resource_dir = resource_directory(data, opt, opt_header_size);

    let table = opt + opt_header_size;
    let table_end = table + number_of_sections * SECTION_HEADER_SIZE;
    if table_end > data.len() {
        return Err(ParseError::Truncated("section table"));
    }

    let mut sections = Vec::with_capacity(number_of_sections);
    for i in 0..number_of_sections {
        sections.push(parse_section(data, table + i * SECTION_HEADER_SIZE));
    }

    let version_resource = resource_dir
        .and_then(|(rva, size)| find_version_resource(data, &sections, rva, size));

    Ok(PeImage {
        machine,
        timestamp,
        sections,
        version_resource,
    })
}

/// Read the resource data directory entry (RVA, size) out of the optional
/// header, if one is present. The directory table sits at a different offset
/// for PE32 and PE32+ images.
fn resource_directory(data: &[u8], opt: usize, opt_size: usize) -> Option<(u32, u32)> {
    let magic = u16_at(data, opt)?;
    let dirs_base = if magic == OPT_MAGIC_PE32PLUS {
        opt + 112
    } else {
        opt + 96
    };
    let num_dirs = u32_at(data, dirs_base - 4)? as usize;
    if RESOURCE_DIR_INDEX >= num_dirs.min(16) {
        return None;
    }
    let entry = dirs_base + RESOURCE_DIR_INDEX * 8;
    // Stay within the declared optional header.
    if entry + 8 > opt + opt_size {
        return None;
    }
    let rva = u32_at(data, entry)?;
    let size = u32_at(data, entry + 4)?;
    if rva == 0 || size == 0 {
        return None;
    }
    Some((rva, size))
}

fn parse_section(data: &[u8], base: usize) -> Section {
    // Caller has verified the full 40-byte header is in range.
    let name_bytes = &data[base..base + 8];
    let name_end = name_bytes.iter().position(|&b| b == 0).unwrap_or(8);
    let name = String::from_utf8_lossy(&name_bytes[..name_end]).into_owned();

    let virtual_size = u32_at(data, base + 8).unwrap_or(0);
    let virtual_address = u32_at(data, base + 12).unwrap_or(0);
    let raw_size = u32_at(data, base + 16).unwrap_or(0);
    let raw_offset = u32_at(data, base + 20).unwrap_or(0);
    let characteristics = u32_at(data, base + 36).unwrap_or(0);

    let truncated = raw_offset as u64 + raw_size as u64 > data.len() as u64;

    Section {
        name,
        virtual_size,
        virtual_address,
        raw_offset,
        raw_size,
        characteristics,
        truncated,
    }
}

/// Map an RVA to a file offset through the section table. Header fields are
/// untrusted u32s, so the translation is done in u64 and rejected if it lands
/// past the corresponding section's raw data.
fn rva_to_file_offset(sections: &[Section], rva: u32) -> Option<usize> {
    for s in sections {
        if s.truncated {
            continue;
        }
        if rva >= s.virtual_address && rva - s.virtual_address < s.raw_size {
            let offset = (rva - s.virtual_address) as u64 + s.raw_offset as u64;
            return usize::try_from(offset).ok();
        }
    }
    None
}

/// A directory node queued during the resource tree walk, tagged with the
/// resource type id it was reached through.
struct QueuedDir {
    /// Offset relative to the start of the resource section.
    offset: usize,
    depth: u8,
    type_id: u32,
}

/// Walk the three-level resource directory tree (type, name/id, language)
/// and locate the first `RT_VERSION` leaf. The walk is breadth-first with
/// an explicit queue and a node budget, so hostile trees cannot recurse or
/// loop unboundedly. Malformed nodes are skipped, not fatal.
fn find_version_resource(
    data: &[u8],
    sections: &[Section],
    rsrc_rva: u32,
    rsrc_size: u32,
) -> Option<ResourceLocation> {
    let rsrc_offset = rva_to_file_offset(sections, rsrc_rva)?;
    let rsrc_end = (rsrc_offset + rsrc_size as usize).min(data.len());
    let rsrc = data.get(rsrc_offset..rsrc_end)?;

    let mut queue = std::collections::VecDeque::new();
    queue.push_back(QueuedDir {
        offset: 0,
        depth: 0,
        type_id: 0,
    });

    let mut visited = 0usize;
    while let Some(dir) = queue.pop_front() {
        // Directory header: 12 bytes of metadata, then entry counts.
        let named = match u16_at(rsrc, dir.offset + 12) {
            Some(n) => n as usize,
            None => continue,
        };
        let ids = match u16_at(rsrc, dir.offset + 14) {
            Some(n) => n as usize,
            None => continue,
        };

        for i in 0..named + ids {
            visited += 1;
            if visited > MAX_RESOURCE_NODES {
                return None;
            }

            let entry = dir.offset + 16 + i * 8;
            let (Some(name_or_id), Some(raw_offset)) =
                (u32_at(rsrc, entry), u32_at(rsrc, entry + 4))
            else {
                break;
            };

            // At the root level the entry id is the resource type; deeper
            // levels inherit the type they were reached through.
            let type_id = if dir.depth == 0 {
                name_or_id & 0x7FFF_FFFF
            } else {
                dir.type_id
            };

            if raw_offset & 0x8000_0000 != 0 {
                // Subdirectory: the remaining bits are its offset within
                // the resource section.
                if dir.depth < 2 {
                    queue.push_back(QueuedDir {
                        offset: (raw_offset & 0x7FFF_FFFF) as usize,
                        depth: dir.depth + 1,
                        type_id,
                    });
                }
            } else if type_id == RT_VERSION {
                // Leaf: a data entry giving the payload's RVA and size.
                let data_entry = raw_offset as usize;
                let (Some(payload_rva), Some(payload_size)) =
                    (u32_at(rsrc, data_entry), u32_at(rsrc, data_entry + 4))
                else {
                    continue;
                };
                let offset = match rva_to_file_offset(sections, payload_rva) {
                    Some(o) => o,
                    None => continue,
                };
                if offset >= data.len() {
                    continue;
                }
                let size = (payload_size as usize).min(data.len() - offset);
                return Some(ResourceLocation { offset, size });
            }
        }
    }

    None
}
