//! Synthetic PE fixtures for tests. Builds minimal but structurally honest
//! PE32 images in memory, so no binary test assets are checked in.

const E_LFANEW: usize = 0x80;
const COFF: usize = E_LFANEW + 4;
const OPT: usize = COFF + 20;
const OPT_SIZE: usize = 224; // PE32: 96 bytes + 16 data directories
const SECTION_TABLE: usize = OPT + OPT_SIZE;
const FILE_ALIGN: usize = 0x200;
const SECTION_ALIGN: u32 = 0x1000;

fn put_u16(buf: &mut [u8], off: usize, v: u16) {
    buf[off..off + 2].copy_from_slice(&v.to_le_bytes());
}

fn put_u32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

fn utf16z(s: &str) -> Vec<u8> {
    s.encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(u16::to_le_bytes)
        .collect()
}

fn pad4(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

/// One length-prefixed version-info block: header, UTF-16 key, padding,
/// value, padding, then already-encoded child blocks.
fn block(key: &str, w_value_length: u16, w_type: u16, value: &[u8], children: &[Vec<u8>]) -> Vec<u8> {
    let mut b = vec![0u8; 6];
    put_u16(&mut b, 4, w_type);
    b.extend(utf16z(key));
    pad4(&mut b);
    b.extend_from_slice(value);
    for child in children {
        pad4(&mut b);
        b.extend_from_slice(child);
    }
    let len = b.len() as u16;
    put_u16(&mut b, 0, len);
    put_u16(&mut b, 2, w_value_length);
    b
}

/// Encode a `VS_VERSIONINFO` blob holding one localized StringTable per
/// `(language_id, entries)` pair, in the given order. An empty slice
/// produces a resource with fixed file info but no string tables at all.
pub fn build_version_info_tables(tables: &[(&str, &[(&str, &str)])]) -> Vec<u8> {
    // VS_FIXEDFILEINFO: 52 bytes, starts with its signature.
    let mut fixed = vec![0u8; 52];
    put_u32(&mut fixed, 0, 0xFEEF_04BD);

    if tables.is_empty() {
        return block("VS_VERSION_INFO", 52, 0, &fixed, &[]);
    }

    let encoded_tables: Vec<Vec<u8>> = tables
        .iter()
        .map(|(lang, pairs)| {
            let entries: Vec<Vec<u8>> = pairs
                .iter()
                .map(|(key, value)| {
                    let encoded = utf16z(value);
                    let chars = (encoded.len() / 2) as u16;
                    block(key, chars, 1, &encoded, &[])
                })
                .collect();
            block(lang, 0, 1, &[], &entries)
        })
        .collect();

    let sfi = block("StringFileInfo", 0, 1, &[], &encoded_tables);
    block("VS_VERSION_INFO", 52, 0, &fixed, &[sfi])
}

/// Single-table shorthand: one US-English StringTable with the given
/// entries.
pub fn build_version_info(pairs: &[(&str, &str)]) -> Vec<u8> {
    if pairs.is_empty() {
        return build_version_info_tables(&[]);
    }
    build_version_info_tables(&[("040904b0", pairs)])
}

/// Builds a minimal PE32 image: DOS stub, COFF + optional header, section
/// table, file-aligned section data, and optionally a `.rsrc` section with
/// a three-level resource directory tree around a version-info blob.
pub struct PeBuilder {
    machine: u16,
    timestamp: u32,
    sections: Vec<(String, Vec<u8>, u32)>,
    version: Option<Vec<u8>>,
}

impl PeBuilder {
    pub fn new() -> Self {
        Self {
            machine: 0x014C,
            timestamp: 0x6000_0000,
            sections: Vec::new(),
            version: None,
        }
    }

    pub fn machine(mut self, machine: u16) -> Self {
        self.machine = machine;
        self
    }

    pub fn timestamp(mut self, timestamp: u32) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn section(mut self, name: &str, data: Vec<u8>, characteristics: u32) -> Self {
        self.sections.push((name.to_owned(), data, characteristics));
        self
    }

    pub fn version_info(mut self, blob: Vec<u8>) -> Self {
        self.version = Some(blob);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut sections = self.sections;
        if let Some(blob) = &self.version {
            let rsrc_va = SECTION_ALIGN * (sections.len() as u32 + 1);
            let rsrc = resource_tree(rsrc_va, blob);
            sections.push((".rsrc".to_owned(), rsrc, 0x4000_0040));
        }

        let headers_end = SECTION_TABLE + sections.len() * 40;
        let mut file = vec![0u8; headers_end];

        file[0] = b'M';
        file[1] = b'Z';
        put_u32(&mut file, 0x3C, E_LFANEW as u32);
        file[E_LFANEW..E_LFANEW + 4].copy_from_slice(b"PE\0\0");

        put_u16(&mut file, COFF, self.machine);
        put_u16(&mut file, COFF + 2, sections.len() as u16);
        put_u32(&mut file, COFF + 4, self.timestamp);
        put_u16(&mut file, COFF + 16, OPT_SIZE as u16);
        put_u16(&mut file, COFF + 18, 0x0102); // EXECUTABLE_IMAGE | 32BIT_MACHINE

        put_u16(&mut file, OPT, 0x010B); // PE32
        put_u32(&mut file, OPT + 92, 16); // NumberOfRvaAndSizes

        // Lay out raw data on FILE_ALIGN boundaries and fill in the table.
        let mut raw_offset = headers_end.div_ceil(FILE_ALIGN) * FILE_ALIGN;
        for (i, (name, data, characteristics)) in sections.iter().enumerate() {
            let hdr = SECTION_TABLE + i * 40;
            let name_bytes = name.as_bytes();
            file[hdr..hdr + name_bytes.len().min(8)]
                .copy_from_slice(&name_bytes[..name_bytes.len().min(8)]);
            let va = SECTION_ALIGN * (i as u32 + 1);
            put_u32(&mut file, hdr + 8, data.len() as u32); // VirtualSize
            put_u32(&mut file, hdr + 12, va);
            put_u32(&mut file, hdr + 16, data.len() as u32); // SizeOfRawData
            put_u32(&mut file, hdr + 20, raw_offset as u32);
            put_u32(&mut file, hdr + 36, *characteristics);

            if name == ".rsrc" && self.version.is_some() {
                put_u32(&mut file, OPT + 96 + 2 * 8, va);
                put_u32(&mut file, OPT + 96 + 2 * 8 + 4, data.len() as u32);
            }

            file.resize(raw_offset, 0);
            file.extend_from_slice(data);
            raw_offset = file.len().div_ceil(FILE_ALIGN) * FILE_ALIGN;
        }

        file
    }
}

/// Three-level resource directory (type 16 / id 1 / lang 0x0409) whose only
/// leaf points at `blob`, laid out at fixed offsets within the section.
fn resource_tree(section_va: u32, blob: &[u8]) -> Vec<u8> {
    let mut rsrc = vec![0u8; 0x58];

    // Root directory: one id entry, RT_VERSION, pointing at a subdirectory.
    put_u16(&mut rsrc, 14, 1);
    put_u32(&mut rsrc, 16, 16);
    put_u32(&mut rsrc, 20, 0x18 | 0x8000_0000);

    // Name/id level.
    put_u16(&mut rsrc, 0x18 + 14, 1);
    put_u32(&mut rsrc, 0x28, 1);
    put_u32(&mut rsrc, 0x2C, 0x30 | 0x8000_0000);

    // Language level: the leaf entry points at a data entry.
    put_u16(&mut rsrc, 0x30 + 14, 1);
    put_u32(&mut rsrc, 0x40, 0x0409);
    put_u32(&mut rsrc, 0x44, 0x48);

    // Data entry: RVA and size of the version blob at 0x58.
    put_u32(&mut rsrc, 0x48, section_va + 0x58);
    put_u32(&mut rsrc, 0x4C, blob.len() as u32);

    rsrc.extend_from_slice(blob);
    rsrc
}
