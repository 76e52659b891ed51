//! Dalvik executable container.
//!
//! Classes are exposed as views over the fields the confusion tasks may
//! rewrite in place: the source file index and each code item's debug info
//! offset. Both live in records owned by a single class, so rewriting them
//! never leaks into another item, and neither alters the section layout. A
//! save only has to write the fields back and re-seal the header.
//!
//! Interface lists are never exposed: a `type_list` may be shared
//! with other classes and with method prototypes.

use crate::chunk::{Reader, get_u32, put_u32};
use crate::result::{Error, Result};
use sha1::{Digest, Sha1};

pub const DEX_MAGIC: &[u8; 4] = b"dex\n";
pub const HEADER_SIZE: usize = 0x70;
pub const NO_INDEX: u32 = 0xFFFF_FFFF;

const CHECKSUM_OFFSET: usize = 8;
const SIGNATURE_OFFSET: usize = 12;
const FILE_SIZE_OFFSET: usize = 32;
const CLASS_DEF_SIZE: usize = 32;
const CODE_DEBUG_INFO_OFFSET: usize = 8;

/// Reads an unsigned LEB128 value, advancing `pos`.
pub fn read_uleb128(data: &[u8], pos: &mut usize) -> Result<u32> {
    let mut result = 0u32;
    for shift in (0..35).step_by(7) {
        let byte = *data
            .get(*pos)
            .ok_or_else(|| Error::MalformedDex(format!("uleb128 runs past end at {pos}")))?;
        *pos += 1;
        result |= ((byte & 0x7f) as u32) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
    }
    Err(Error::MalformedDex(format!("uleb128 longer than 5 bytes before {pos}")))
}

pub fn write_uleb128(buf: &mut Vec<u8>, mut value: u32) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeItem {
    offset: usize,
    pub debug_info_off: u32,
}

/// Mutable view of one `class_def_item`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DexClass {
    def_offset: usize,
    pub class_idx: u32,
    pub source_file_idx: u32,
    pub code_items: Vec<CodeItem>,
}

#[derive(Debug, Clone, Copy)]
struct Section {
    size: u32,
    offset: u32,
}

#[derive(Debug, Clone)]
pub struct DexFile {
    data: Vec<u8>,
    string_ids: Section,
    type_ids: Section,
    classes: Vec<DexClass>,
}

impl DexFile {
    pub fn read(data: Vec<u8>) -> Result<Self> {
        if data.len() < HEADER_SIZE || &data[..4] != DEX_MAGIC {
            return Err(Error::MalformedDex("missing dex header".into()));
        }

        let mut reader = Reader::at(&data, FILE_SIZE_OFFSET);
        let file_size = reader.u32()? as usize;
        if file_size > data.len() {
            return Err(Error::MalformedDex(format!(
                "declared size {file_size} exceeds {} bytes",
                data.len()
            )));
        }
        reader.seek(56)?;
        let string_ids = section(&mut reader)?;
        let type_ids = section(&mut reader)?;
        reader.seek(96)?;
        let class_defs = section(&mut reader)?;

        let mut classes = Vec::with_capacity(class_defs.size as usize);
        for index in 0..class_defs.size as usize {
            let def_offset = class_defs.offset as usize + index * CLASS_DEF_SIZE;
            classes.push(read_class(&data[..file_size], def_offset)?);
        }

        Ok(Self {
            data,
            string_ids,
            type_ids,
            classes,
        })
    }

    pub fn classes(&self) -> &[DexClass] {
        &self.classes
    }

    pub fn classes_mut(&mut self) -> &mut [DexClass] {
        &mut self.classes
    }

    /// Decoded string `index`, `None` when out of range.
    pub fn string(&self, index: u32) -> Option<String> {
        if index >= self.string_ids.size {
            return None;
        }
        let id_offset = self.string_ids.offset as usize + index as usize * 4;
        let mut reader = Reader::at(&self.data, id_offset);
        let mut pos = reader.u32().ok()? as usize;
        let _utf16_len = read_uleb128(&self.data, &mut pos).ok()?;
        let end = pos + self.data.get(pos..)?.iter().position(|b| *b == 0)?;
        Some(String::from_utf8_lossy(&self.data[pos..end]).into_owned())
    }

    pub fn type_descriptor(&self, type_idx: u32) -> Option<String> {
        if type_idx >= self.type_ids.size {
            return None;
        }
        let mut reader = Reader::at(&self.data, self.type_ids.offset as usize + type_idx as usize * 4);
        self.string(reader.u32().ok()?)
    }

    pub fn declared_size(&self) -> usize {
        get_u32(&self.data, FILE_SIZE_OFFSET) as usize
    }

    /// Writes every class view back into the underlying bytes.
    ///
    /// Field offsets were bounds-checked when the views were read.
    pub fn refresh(&mut self) {
        for class in &self.classes {
            put_u32(&mut self.data, class.def_offset + 16, class.source_file_idx);
            for code in &class.code_items {
                put_u32(&mut self.data, code.offset + CODE_DEBUG_INFO_OFFSET, code.debug_info_off);
            }
        }
    }

    /// Drops trailing bytes beyond the declared file size.
    pub fn shrink(&mut self) -> Result<()> {
        let declared = self.declared_size();
        if declared < HEADER_SIZE {
            return Err(Error::MalformedDex(format!("declared size {declared} below header")));
        }
        self.data.truncate(declared);
        Ok(())
    }

    /// Recomputes file size, SHA-1 signature and Adler-32 checksum.
    pub fn refresh_full(&mut self) -> Result<()> {
        let size = u32::try_from(self.data.len()).map_err(|_| Error::FieldOverflow {
            field: "dex file size",
            value: self.data.len(),
        })?;
        put_u32(&mut self.data, FILE_SIZE_OFFSET, size);

        let signature = Sha1::digest(&self.data[SIGNATURE_OFFSET + 20..]);
        self.data[SIGNATURE_OFFSET..SIGNATURE_OFFSET + 20].copy_from_slice(&signature);

        let checksum = adler::adler32_slice(&self.data[SIGNATURE_OFFSET..]);
        put_u32(&mut self.data, CHECKSUM_OFFSET, checksum);
        Ok(())
    }

    pub fn checksum(&self) -> u32 {
        get_u32(&self.data, CHECKSUM_OFFSET)
    }

    pub fn signature(&self) -> &[u8] {
        &self.data[SIGNATURE_OFFSET..SIGNATURE_OFFSET + 20]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

fn section(reader: &mut Reader<'_>) -> Result<Section> {
    Ok(Section {
        size: reader.u32()?,
        offset: reader.u32()?,
    })
}

fn read_class(data: &[u8], def_offset: usize) -> Result<DexClass> {
    let mut reader = Reader::at(data, def_offset);
    let class_idx = reader.u32()?;
    let _access_flags = reader.u32()?;
    let _superclass_idx = reader.u32()?;
    let _interfaces_off = reader.u32()?;
    let source_file_idx = reader.u32()?;
    let _annotations_off = reader.u32()?;
    let class_data_off = reader.u32()?;

    let mut code_items = Vec::new();
    if class_data_off != 0 {
        let mut pos = class_data_off as usize;
        let static_fields = read_uleb128(data, &mut pos)?;
        let instance_fields = read_uleb128(data, &mut pos)?;
        let direct_methods = read_uleb128(data, &mut pos)?;
        let virtual_methods = read_uleb128(data, &mut pos)?;

        for _ in 0..static_fields + instance_fields {
            read_uleb128(data, &mut pos)?;
            read_uleb128(data, &mut pos)?;
        }
        for _ in 0..direct_methods + virtual_methods {
            read_uleb128(data, &mut pos)?;
            read_uleb128(data, &mut pos)?;
            let code_off = read_uleb128(data, &mut pos)? as usize;
            if code_off == 0 {
                continue;
            }
            reader.seek(code_off + CODE_DEBUG_INFO_OFFSET)?;
            code_items.push(CodeItem {
                offset: code_off,
                debug_info_off: reader.u32()?,
            });
        }
    }

    Ok(DexClass {
        def_offset,
        class_idx,
        source_file_idx,
        code_items,
    })
}
