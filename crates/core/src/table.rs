//! Compiled resource table (`resources.arsc`).
//!
//! Only the parts the confusion passes touch are modelled: the global value
//! pool, each package's type and key pools, and chunks placed ahead of the
//! global pool. Type spec, type and library chunks are carried as raw bytes
//! and only inspected to locate string values naming archive entries.

use crate::chunk::{
    ChunkHeader, RES_NULL_TYPE, RES_STRING_POOL_TYPE, RES_TABLE_PACKAGE_TYPE, RES_TABLE_TYPE,
    RES_TABLE_TYPE_SPEC_TYPE, RES_TABLE_TYPE_TYPE, Reader, begin_chunk, checked_u16, checked_u32,
    finish_chunk, get_u16, get_u32, put_u32, write_u8, write_u16, write_u32,
};
use crate::result::{Error, Result};
use crate::string_pool::StringPool;
use crate::xml::TYPE_STRING;

const TABLE_HEADER_SIZE: u16 = 12;
const PACKAGE_HEADER_SIZE: u16 = 288;
const PACKAGE_NAME_LEN: usize = 128;
const TYPE_STRINGS_FIELD: usize = 268;
const KEY_STRINGS_FIELD: usize = 276;

const TYPE_HEADER_SIZE: u16 = 84;
const TYPE_SPEC_HEADER_SIZE: u16 = 16;
const CONFIG_SIZE: u32 = 64;

const FLAG_SPARSE: u8 = 0x01;
const FLAG_OFFSET16: u8 = 0x02;

const ENTRY_FLAG_COMPLEX: u16 = 0x0001;
const ENTRY_FLAG_COMPACT: u16 = 0x0008;
const NO_ENTRY: u32 = 0xFFFF_FFFF;
const NO_ENTRY16: u16 = 0xFFFF;

/// A chunk of a type the loader does not interpret.
///
/// Header extra bytes sit between the 8 byte chunk header and the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownChunk {
    pub chunk_type: u16,
    pub header_extra: Vec<u8>,
    pub body: Vec<u8>,
}

impl UnknownChunk {
    pub fn new(header_extra: Vec<u8>, body: Vec<u8>) -> Self {
        Self {
            chunk_type: RES_NULL_TYPE,
            header_extra,
            body,
        }
    }

    pub fn parse(data: &[u8], offset: usize) -> Result<Self> {
        let header = ChunkHeader::read(data, offset)?;
        Ok(Self {
            chunk_type: header.chunk_type,
            header_extra: data[header.start + 8..header.body_start()].to_vec(),
            body: data[header.body_start()..header.end()].to_vec(),
        })
    }

    pub fn write(&self, buf: &mut Vec<u8>) -> Result<()> {
        let header_size = checked_u16("unknown chunk header", 8 + self.header_extra.len())?;
        let start = begin_chunk(buf, self.chunk_type, header_size);
        buf.extend_from_slice(&self.header_extra);
        buf.extend_from_slice(&self.body);
        finish_chunk(buf, start)
    }
}

/// Encodes `text` as a NUL padded UTF-16 field of `byte_len` bytes.
pub fn fixed_length_string(text: &str, byte_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(byte_len);
    for unit in text.encode_utf16() {
        if out.len() + 2 > byte_len.saturating_sub(2) {
            break;
        }
        write_u16(&mut out, unit);
    }
    out.resize(byte_len, 0);
    out
}

/// Decodes a NUL terminated UTF-16 field.
pub fn read_fixed_length_string(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| get_u16(pair, 0))
        .take_while(|unit| *unit != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

/// A string-typed value found in a TYPE chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringValueRef {
    pub type_name: String,
    pub string_index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePackage {
    header: Vec<u8>,
    pub type_strings: StringPool,
    pub key_strings: StringPool,
    chunks: Vec<Vec<u8>>,
}

impl TablePackage {
    pub fn new(id: u32, name: &str) -> Self {
        let mut header = Vec::with_capacity(PACKAGE_HEADER_SIZE as usize);
        write_u16(&mut header, RES_TABLE_PACKAGE_TYPE);
        write_u16(&mut header, PACKAGE_HEADER_SIZE);
        write_u32(&mut header, 0);
        write_u32(&mut header, id);
        header.extend_from_slice(&fixed_length_string(name, PACKAGE_NAME_LEN * 2));
        header.resize(PACKAGE_HEADER_SIZE as usize, 0);
        Self {
            header,
            type_strings: StringPool::new(false),
            key_strings: StringPool::new(true),
            chunks: Vec::new(),
        }
    }

    fn parse(data: &[u8], chunk: &ChunkHeader) -> Result<Self> {
        if (chunk.header_size as usize) < KEY_STRINGS_FIELD + 4 {
            return Err(Error::MalformedTable(format!(
                "package header at {} is only {} bytes",
                chunk.start, chunk.header_size
            )));
        }
        let mut header = data[chunk.start..chunk.body_start()].to_vec();
        let mut reader = Reader::new(&header);
        reader.seek(TYPE_STRINGS_FIELD)?;
        let type_offset = chunk.start + reader.u32()? as usize;
        reader.seek(KEY_STRINGS_FIELD)?;
        let key_offset = chunk.start + reader.u32()? as usize;
        // derived on write
        for field in [4, TYPE_STRINGS_FIELD, KEY_STRINGS_FIELD] {
            put_u32(&mut header, field, 0);
        }

        let mut type_strings = None;
        let mut key_strings = None;
        let mut chunks = Vec::new();
        let mut offset = chunk.body_start();
        while offset < chunk.end() {
            let inner = ChunkHeader::read(&data[..chunk.end()], offset)?;
            if inner.start == type_offset {
                type_strings = Some(StringPool::parse(data, inner.start)?);
            } else if inner.start == key_offset {
                key_strings = Some(StringPool::parse(data, inner.start)?);
            } else {
                chunks.push(inner.slice(data).to_vec());
            }
            offset = inner.end();
        }

        Ok(Self {
            header,
            type_strings: type_strings
                .ok_or_else(|| Error::MalformedTable("package has no type string pool".into()))?,
            key_strings: key_strings
                .ok_or_else(|| Error::MalformedTable("package has no key string pool".into()))?,
            chunks,
        })
    }

    pub fn id(&self) -> u32 {
        get_u32(&self.header, 8)
    }

    pub fn name(&self) -> String {
        read_fixed_length_string(&self.header[12..12 + PACKAGE_NAME_LEN * 2])
    }

    /// Name of the type with 1-based `type_id`.
    pub fn type_name(&self, type_id: u8) -> Option<&str> {
        type_id
            .checked_sub(1)
            .and_then(|index| self.type_strings.get(index as u32))
    }

    /// Raw chunks other than the two string pools, in file order.
    pub fn chunks(&self) -> &[Vec<u8>] {
        &self.chunks
    }

    /// Appends a type spec and a single-config type chunk whose entries are
    /// plain string values.
    ///
    /// `entries` pairs a key pool index with a global pool index; entry ids
    /// follow slice order.
    pub fn push_string_type(&mut self, type_id: u8, entries: &[(u32, u32)]) -> Result<()> {
        let count = checked_u32("entry count", entries.len())?;

        let mut spec = Vec::new();
        let start = begin_chunk(&mut spec, RES_TABLE_TYPE_SPEC_TYPE, TYPE_SPEC_HEADER_SIZE);
        write_u8(&mut spec, type_id);
        write_u8(&mut spec, 0);
        write_u16(&mut spec, 0);
        write_u32(&mut spec, count);
        for _ in entries {
            write_u32(&mut spec, 0);
        }
        finish_chunk(&mut spec, start)?;

        let mut chunk = Vec::new();
        let start = begin_chunk(&mut chunk, RES_TABLE_TYPE_TYPE, TYPE_HEADER_SIZE);
        write_u8(&mut chunk, type_id);
        write_u8(&mut chunk, 0);
        write_u16(&mut chunk, 0);
        write_u32(&mut chunk, count);
        let entries_start = TYPE_HEADER_SIZE as usize + entries.len() * 4;
        write_u32(&mut chunk, checked_u32("entries start", entries_start)?);
        write_u32(&mut chunk, CONFIG_SIZE);
        chunk.resize(start + TYPE_HEADER_SIZE as usize, 0);
        for index in 0..entries.len() {
            write_u32(&mut chunk, checked_u32("entry offset", index * 16)?);
        }
        for (key, string_index) in entries {
            write_u16(&mut chunk, 8);
            write_u16(&mut chunk, 0);
            write_u32(&mut chunk, *key);
            write_u16(&mut chunk, 8);
            write_u8(&mut chunk, 0);
            write_u8(&mut chunk, TYPE_STRING);
            write_u32(&mut chunk, *string_index);
        }
        finish_chunk(&mut chunk, start)?;

        self.chunks.push(spec);
        self.chunks.push(chunk);
        Ok(())
    }

    /// Every plain string value in this package's TYPE chunks.
    pub fn string_values(&self) -> Result<Vec<(u8, u32)>> {
        let mut out = Vec::new();
        for raw in &self.chunks {
            let header = ChunkHeader::read(raw, 0)?;
            if header.chunk_type == RES_TABLE_TYPE_TYPE {
                collect_type_strings(raw, &header, &mut out)?;
            }
        }
        Ok(out)
    }

    fn write(&self, buf: &mut Vec<u8>) -> Result<()> {
        let start = buf.len();
        buf.extend_from_slice(&self.header);
        let type_offset = buf.len() - start;
        buf.extend_from_slice(&self.type_strings.to_bytes()?);
        let key_offset = buf.len() - start;
        buf.extend_from_slice(&self.key_strings.to_bytes()?);
        for chunk in &self.chunks {
            buf.extend_from_slice(chunk);
        }

        put_u32(buf, start + TYPE_STRINGS_FIELD, checked_u32("type strings", type_offset)?);
        put_u32(buf, start + KEY_STRINGS_FIELD, checked_u32("key strings", key_offset)?);
        finish_chunk(buf, start)
    }

    fn refresh(&mut self) -> Result<()> {
        let type_count = self.type_strings.len();
        for raw in &self.chunks {
            let header = ChunkHeader::read(raw, 0)?;
            if matches!(
                header.chunk_type,
                RES_TABLE_TYPE_TYPE | RES_TABLE_TYPE_SPEC_TYPE
            ) {
                let id = *raw.get(8).ok_or_else(|| {
                    Error::MalformedTable("type chunk without id".into())
                })?;
                if id == 0 || id as usize > type_count {
                    return Err(Error::MalformedTable(format!(
                        "type id {id} outside type pool of {type_count} in package {}",
                        self.id()
                    )));
                }
            }
        }
        Ok(())
    }
}

fn collect_type_strings(raw: &[u8], header: &ChunkHeader, out: &mut Vec<(u8, u32)>) -> Result<()> {
    let mut reader = Reader::at(raw, 8);
    let type_id = reader.u8()?;
    let flags = reader.u8()?;
    reader.skip(2)?;
    let entry_count = reader.u32()? as usize;
    let entries_start = reader.u32()? as usize;

    reader.seek(header.body_start())?;
    let mut offsets = Vec::with_capacity(entry_count);
    for _ in 0..entry_count {
        let offset = if flags & FLAG_SPARSE != 0 {
            let _index = reader.u16()?;
            Some(reader.u16()? as usize * 4)
        } else if flags & FLAG_OFFSET16 != 0 {
            let value = reader.u16()?;
            (value != NO_ENTRY16).then_some(value as usize * 4)
        } else {
            let value = reader.u32()?;
            (value != NO_ENTRY).then_some(value as usize)
        };
        offsets.extend(offset);
    }

    for offset in offsets {
        reader.seek(entries_start + offset)?;
        let size = reader.u16()?;
        let entry_flags = reader.u16()?;
        let key_or_data = reader.u32()?;

        if entry_flags & ENTRY_FLAG_COMPACT != 0 {
            if (entry_flags >> 8) as u8 == TYPE_STRING {
                out.push((type_id, key_or_data));
            }
            continue;
        }
        if entry_flags & ENTRY_FLAG_COMPLEX != 0 {
            continue;
        }
        reader.seek(entries_start + offset + size as usize)?;
        let _value_size = reader.u16()?;
        let _res0 = reader.u8()?;
        let data_type = reader.u8()?;
        let data = reader.u32()?;
        if data_type == TYPE_STRING {
            out.push((type_id, data));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableChunk {
    Package(TablePackage),
    Unknown(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceTable {
    leading: Vec<UnknownChunk>,
    pub string_pool: StringPool,
    pub chunks: Vec<TableChunk>,
}

impl ResourceTable {
    pub fn new(string_pool: StringPool) -> Self {
        Self {
            leading: Vec::new(),
            string_pool,
            chunks: Vec::new(),
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = ChunkHeader::read(data, 0)?;
        header.expect(RES_TABLE_TYPE)?;

        let mut leading = Vec::new();
        let mut string_pool = None;
        let mut chunks = Vec::new();
        let mut offset = header.body_start();
        while offset < header.end() {
            let chunk = ChunkHeader::read(&data[..header.end()], offset)?;
            match chunk.chunk_type {
                RES_STRING_POOL_TYPE if string_pool.is_none() => {
                    string_pool = Some(StringPool::parse(data, chunk.start)?);
                }
                RES_TABLE_PACKAGE_TYPE => {
                    chunks.push(TableChunk::Package(TablePackage::parse(data, &chunk)?));
                }
                _ if string_pool.is_none() => leading.push(UnknownChunk::parse(data, chunk.start)?),
                _ => chunks.push(TableChunk::Unknown(chunk.slice(data).to_vec())),
            }
            offset = chunk.end();
        }

        Ok(Self {
            leading,
            string_pool: string_pool
                .ok_or_else(|| Error::MalformedTable("missing global string pool".into()))?,
            chunks,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let start = begin_chunk(&mut buf, RES_TABLE_TYPE, TABLE_HEADER_SIZE);
        write_u32(&mut buf, checked_u32("package count", self.packages().count())?);
        for chunk in &self.leading {
            chunk.write(&mut buf)?;
        }
        buf.extend_from_slice(&self.string_pool.to_bytes()?);
        for chunk in &self.chunks {
            match chunk {
                TableChunk::Package(package) => package.write(&mut buf)?,
                TableChunk::Unknown(raw) => buf.extend_from_slice(raw),
            }
        }
        finish_chunk(&mut buf, start)?;
        Ok(buf)
    }

    /// The slot placed ahead of the global string pool.
    pub fn first_placeholder(&self) -> Option<&UnknownChunk> {
        self.leading.first()
    }

    /// Fills the first placeholder slot, replacing whatever occupied it.
    pub fn set_first_placeholder(&mut self, chunk: UnknownChunk) {
        match self.leading.first_mut() {
            Some(slot) => *slot = chunk,
            None => self.leading.push(chunk),
        }
    }

    pub fn packages(&self) -> impl Iterator<Item = &TablePackage> {
        self.chunks.iter().filter_map(|chunk| match chunk {
            TableChunk::Package(package) => Some(package),
            TableChunk::Unknown(_) => None,
        })
    }

    pub fn packages_mut(&mut self) -> impl Iterator<Item = &mut TablePackage> {
        self.chunks.iter_mut().filter_map(|chunk| match chunk {
            TableChunk::Package(package) => Some(package),
            TableChunk::Unknown(_) => None,
        })
    }

    pub fn push_package(&mut self, package: TablePackage) {
        self.chunks.push(TableChunk::Package(package));
    }

    /// String values of every package, tagged with their type name.
    pub fn string_value_refs(&self) -> Result<Vec<StringValueRef>> {
        let mut refs = Vec::new();
        for package in self.packages() {
            for (type_id, string_index) in package.string_values()? {
                let type_name = package.type_name(type_id).ok_or_else(|| {
                    Error::MalformedTable(format!("type id {type_id} has no name"))
                })?;
                refs.push(StringValueRef {
                    type_name: type_name.to_string(),
                    string_index,
                });
            }
        }
        Ok(refs)
    }

    /// Re-validates every package against its pools.
    pub fn refresh(&mut self) -> Result<()> {
        for package in self.packages_mut() {
            package.refresh()?;
        }
        for value in self.string_value_refs()? {
            self.string_pool.check_ref(value.string_index)?;
        }
        Ok(())
    }
}
