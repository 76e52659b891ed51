//! Little-endian chunk primitives shared by the binary XML and resource table codecs.
//!
//! Every structure in both formats starts with a `ResChunk_header`:
//!
//! ```text
//! u16 type | u16 header_size | u32 size
//! ```
//!
//! `header_size` covers the type specific header fields, `size` covers the
//! whole chunk including its body.

use crate::result::{Error, Result};
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::io::{self, Cursor};

pub const RES_NULL_TYPE: u16 = 0x0000;
pub const RES_STRING_POOL_TYPE: u16 = 0x0001;
pub const RES_TABLE_TYPE: u16 = 0x0002;
pub const RES_XML_TYPE: u16 = 0x0003;

pub const RES_XML_START_NAMESPACE_TYPE: u16 = 0x0100;
pub const RES_XML_END_NAMESPACE_TYPE: u16 = 0x0101;
pub const RES_XML_START_ELEMENT_TYPE: u16 = 0x0102;
pub const RES_XML_END_ELEMENT_TYPE: u16 = 0x0103;
pub const RES_XML_CDATA_TYPE: u16 = 0x0104;
pub const RES_XML_RESOURCE_MAP_TYPE: u16 = 0x0180;

pub const RES_TABLE_PACKAGE_TYPE: u16 = 0x0200;
pub const RES_TABLE_TYPE_TYPE: u16 = 0x0201;
pub const RES_TABLE_TYPE_SPEC_TYPE: u16 = 0x0202;
pub const RES_TABLE_LIBRARY_TYPE: u16 = 0x0203;

/// Size of the bare chunk header.
pub const CHUNK_HEADER_SIZE: usize = 8;

/// A parsed chunk header together with its absolute position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub chunk_type: u16,
    pub header_size: u16,
    pub size: u32,
    /// Absolute offset of the header inside the parsed buffer.
    pub start: usize,
}

impl ChunkHeader {
    /// Reads and validates a chunk header at `offset`.
    pub fn read(data: &[u8], offset: usize) -> Result<Self> {
        let mut reader = Reader::at(data, offset);
        let chunk_type = reader.u16()?;
        let header_size = reader.u16()?;
        let size = reader.u32()?;

        if (header_size as usize) < CHUNK_HEADER_SIZE || size < header_size as u32 {
            return Err(Error::TruncatedChunk {
                offset,
                msg: format!("invalid sizing header={header_size} size={size}"),
            });
        }
        let end = offset
            .checked_add(size as usize)
            .ok_or_else(|| Error::TruncatedChunk {
                offset,
                msg: "size overflow".into(),
            })?;
        if end > data.len() {
            return Err(Error::TruncatedChunk {
                offset,
                msg: format!("chunk ends at {end}, data ends at {}", data.len()),
            });
        }

        Ok(Self {
            chunk_type,
            header_size,
            size,
            start: offset,
        })
    }

    /// Absolute offset one past the last byte of the chunk.
    pub fn end(&self) -> usize {
        self.start + self.size as usize
    }

    /// Absolute offset of the chunk body.
    pub fn body_start(&self) -> usize {
        self.start + self.header_size as usize
    }

    /// Raw bytes of the whole chunk.
    pub fn slice<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.start..self.end()]
    }

    /// Fails unless the chunk is of type `expected`.
    pub fn expect(&self, expected: u16) -> Result<()> {
        if self.chunk_type != expected {
            return Err(Error::UnexpectedChunk {
                offset: self.start,
                expected,
                found: self.chunk_type,
            });
        }
        Ok(())
    }
}

/// Bounds-checked little-endian cursor.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::at(data, 0)
    }

    pub fn at(data: &'a [u8], pos: usize) -> Self {
        let mut cursor = Cursor::new(data);
        cursor.set_position(pos as u64);
        Self { cursor }
    }

    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    pub fn remaining(&self) -> usize {
        self.cursor.get_ref().len().saturating_sub(self.position())
    }

    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.cursor.get_ref().len() {
            return Err(truncated(self.position(), "seek past end"));
        }
        self.cursor.set_position(pos as u64);
        Ok(())
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.seek(self.position().saturating_add(len))
    }

    pub fn u8(&mut self) -> Result<u8> {
        let at = self.position();
        self.cursor.read_u8().map_err(|err| short_read(at, 1, err))
    }

    pub fn u16(&mut self) -> Result<u16> {
        let at = self.position();
        self.cursor
            .read_u16::<LittleEndian>()
            .map_err(|err| short_read(at, 2, err))
    }

    pub fn u32(&mut self) -> Result<u32> {
        let at = self.position();
        self.cursor
            .read_u32::<LittleEndian>()
            .map_err(|err| short_read(at, 4, err))
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let data: &'a [u8] = *self.cursor.get_ref();
        let at = self.position();
        let end = at
            .checked_add(len)
            .filter(|end| *end <= data.len())
            .ok_or_else(|| truncated(at, &format!("need {len} bytes")))?;
        self.cursor.set_position(end as u64);
        Ok(&data[at..end])
    }
}

fn truncated(offset: usize, msg: &str) -> Error {
    Error::TruncatedChunk {
        offset,
        msg: msg.to_string(),
    }
}

fn short_read(offset: usize, len: usize, err: io::Error) -> Error {
    truncated(offset, &format!("need {len} bytes: {err}"))
}

pub fn write_u8(buf: &mut Vec<u8>, value: u8) {
    buf.push(value);
}

pub fn write_u16(buf: &mut Vec<u8>, value: u16) {
    let mut bytes = [0u8; 2];
    LittleEndian::write_u16(&mut bytes, value);
    buf.extend_from_slice(&bytes);
}

pub fn write_u32(buf: &mut Vec<u8>, value: u32) {
    let mut bytes = [0u8; 4];
    LittleEndian::write_u32(&mut bytes, value);
    buf.extend_from_slice(&bytes);
}

pub fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    LittleEndian::write_u16(&mut buf[offset..offset + 2], value);
}

pub fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    LittleEndian::write_u32(&mut buf[offset..offset + 4], value);
}

/// Little-endian `u16` at `offset`. Callers check bounds.
pub fn get_u16(buf: &[u8], offset: usize) -> u16 {
    LittleEndian::read_u16(&buf[offset..offset + 2])
}

/// Little-endian `u32` at `offset`. Callers check bounds.
pub fn get_u32(buf: &[u8], offset: usize) -> u32 {
    LittleEndian::read_u32(&buf[offset..offset + 4])
}

pub fn align_to_four(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

/// Writes a chunk header with a zero size and returns its start offset.
///
/// Pair with [`finish_chunk`] once the body has been written.
pub fn begin_chunk(buf: &mut Vec<u8>, chunk_type: u16, header_size: u16) -> usize {
    let start = buf.len();
    write_u16(buf, chunk_type);
    write_u16(buf, header_size);
    write_u32(buf, 0);
    start
}

/// Pads the chunk to a four byte boundary and patches its size field.
pub fn finish_chunk(buf: &mut Vec<u8>, chunk_start: usize) -> Result<()> {
    align_to_four(buf);
    let size = checked_u32("chunk size", buf.len() - chunk_start)?;
    put_u32(buf, chunk_start + 4, size);
    Ok(())
}

pub fn checked_u16(field: &'static str, value: usize) -> Result<u16> {
    u16::try_from(value).map_err(|_| Error::FieldOverflow { field, value })
}

pub fn checked_u32(field: &'static str, value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::FieldOverflow { field, value })
}
