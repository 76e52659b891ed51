//! `ResStringPool` codec shared by binary XML documents and resource tables.

use crate::chunk::{
    ChunkHeader, RES_STRING_POOL_TYPE, Reader, align_to_four, begin_chunk, checked_u32,
    finish_chunk, put_u32, write_u16, write_u32,
};
use crate::result::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};

/// Pool strings are sorted (only meaningful to the loader's binary search).
pub const SORTED_FLAG: u32 = 0x0000_0001;
/// Pool strings are stored as UTF-8 instead of UTF-16.
pub const UTF8_FLAG: u32 = 0x0000_0100;

const STRING_POOL_HEADER_SIZE: u16 = 28;
const SPAN_END: u32 = 0xFFFF_FFFF;

/// Decoded string pool.
///
/// Style spans are kept as their raw `u32` words (name, first char, last char
/// triples) so styled strings survive a round trip untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringPool {
    strings: Vec<String>,
    styles: Vec<Vec<u32>>,
    flags: u32,
}

impl StringPool {
    /// Creates an empty pool with the given encoding.
    pub fn new(utf8: bool) -> Self {
        Self {
            strings: Vec::new(),
            styles: Vec::new(),
            flags: if utf8 { UTF8_FLAG } else { 0 },
        }
    }

    /// Parses the string pool chunk starting at `offset`.
    pub fn parse(data: &[u8], offset: usize) -> Result<Self> {
        let header = ChunkHeader::read(data, offset)?;
        header.expect(RES_STRING_POOL_TYPE)?;

        let mut reader = Reader::at(data, header.start + 8);
        let string_count = reader.u32()? as usize;
        let style_count = reader.u32()? as usize;
        let flags = reader.u32()?;
        let strings_start = reader.u32()? as usize;
        let styles_start = reader.u32()? as usize;

        reader.seek(header.body_start())?;
        let mut string_offsets = Vec::with_capacity(string_count.min(reader.remaining() / 4));
        for _ in 0..string_count {
            string_offsets.push(reader.u32()? as usize);
        }
        let mut style_offsets = Vec::with_capacity(style_count.min(reader.remaining() / 4));
        for _ in 0..style_count {
            style_offsets.push(reader.u32()? as usize);
        }

        let utf8 = flags & UTF8_FLAG != 0;
        let limit = header.end();
        let strings_base = header.start + strings_start;

        let mut strings = Vec::with_capacity(string_offsets.len());
        for string_offset in string_offsets {
            let absolute = strings_base + string_offset;
            let text = if utf8 {
                read_utf8_string(data, absolute, limit)?
            } else {
                read_utf16_string(data, absolute, limit)?
            };
            strings.push(text);
        }

        let mut styles = Vec::with_capacity(style_offsets.len());
        if style_count > 0 {
            let styles_base = header.start + styles_start;
            for style_offset in style_offsets {
                let mut reader = Reader::at(&data[..limit], styles_base + style_offset);
                let mut words = Vec::new();
                loop {
                    let word = reader.u32()?;
                    if word == SPAN_END {
                        break;
                    }
                    words.push(word);
                }
                styles.push(words);
            }
        }

        Ok(Self {
            strings,
            styles,
            flags,
        })
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn is_utf8(&self) -> bool {
        self.flags & UTF8_FLAG != 0
    }

    pub fn set_utf8(&mut self, utf8: bool) {
        if utf8 {
            self.flags |= UTF8_FLAG;
        } else {
            self.flags &= !UTF8_FLAG;
        }
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn get(&self, index: u32) -> Option<&str> {
        self.strings.get(index as usize).map(String::as_str)
    }

    /// Replaces the string at `index`.
    pub fn set(&mut self, index: u32, value: impl Into<String>) -> Result<()> {
        let len = self.strings.len();
        let slot = self
            .strings
            .get_mut(index as usize)
            .ok_or(Error::StringOutOfRange { index, len })?;
        *slot = value.into();
        // in-place edits can break ordering
        self.flags &= !SORTED_FLAG;
        Ok(())
    }

    pub fn index_of(&self, value: &str) -> Option<u32> {
        self.strings
            .iter()
            .position(|s| s == value)
            .map(|index| index as u32)
    }

    /// Appends `value` unconditionally and returns its index.
    pub fn append(&mut self, value: impl Into<String>) -> u32 {
        self.strings.push(value.into());
        self.flags &= !SORTED_FLAG;
        (self.strings.len() - 1) as u32
    }

    /// Returns the index of `value`, appending it when it is not present at
    /// or after `min_index`.
    pub fn get_or_append(&mut self, value: &str, min_index: usize) -> u32 {
        match self
            .strings
            .iter()
            .skip(min_index)
            .position(|s| s == value)
        {
            Some(position) => (min_index + position) as u32,
            None => self.append(value),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.strings.iter().map(String::as_str)
    }

    /// Fails if `index` does not name a string (the "no string" sentinel is allowed).
    pub fn check_ref(&self, index: u32) -> Result<()> {
        if index != u32::MAX && index as usize >= self.strings.len() {
            return Err(Error::StringOutOfRange {
                index,
                len: self.strings.len(),
            });
        }
        Ok(())
    }

    /// Encodes the pool as a regular string pool chunk.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.to_bytes_with_type(RES_STRING_POOL_TYPE)
    }

    /// Encodes the pool with an arbitrary chunk type in its header.
    ///
    /// Used to build decoy chunks whose body is a well formed string pool.
    pub fn to_bytes_with_type(&self, chunk_type: u16) -> Result<Vec<u8>> {
        let utf8 = self.is_utf8();

        let mut string_data = Vec::new();
        let mut string_offsets = Vec::with_capacity(self.strings.len());
        for text in &self.strings {
            string_offsets.push(checked_u32("string offset", string_data.len())?);
            if utf8 {
                write_utf8_string(&mut string_data, text)?;
            } else {
                write_utf16_string(&mut string_data, text)?;
            }
        }
        align_to_four(&mut string_data);

        let mut style_data = Vec::new();
        let mut style_offsets = Vec::with_capacity(self.styles.len());
        if !self.styles.is_empty() {
            for words in &self.styles {
                style_offsets.push(checked_u32("style offset", style_data.len())?);
                for word in words {
                    write_u32(&mut style_data, *word);
                }
                write_u32(&mut style_data, SPAN_END);
            }
            write_u32(&mut style_data, SPAN_END);
            write_u32(&mut style_data, SPAN_END);
        }

        let mut chunk = Vec::new();
        let start = begin_chunk(&mut chunk, chunk_type, STRING_POOL_HEADER_SIZE);
        write_u32(&mut chunk, checked_u32("string count", self.strings.len())?);
        write_u32(&mut chunk, checked_u32("style count", self.styles.len())?);
        write_u32(&mut chunk, self.flags);
        let strings_start_at = chunk.len();
        write_u32(&mut chunk, 0);
        let styles_start_at = chunk.len();
        write_u32(&mut chunk, 0);

        for offset in string_offsets {
            write_u32(&mut chunk, offset);
        }
        for offset in style_offsets {
            write_u32(&mut chunk, offset);
        }

        let strings_start = if self.strings.is_empty() {
            0
        } else {
            checked_u32("strings start", chunk.len())?
        };
        put_u32(&mut chunk, strings_start_at, strings_start);
        chunk.extend_from_slice(&string_data);

        if !self.styles.is_empty() {
            let styles_start = checked_u32("styles start", chunk.len())?;
            put_u32(&mut chunk, styles_start_at, styles_start);
            chunk.extend_from_slice(&style_data);
        }

        finish_chunk(&mut chunk, start)?;
        Ok(chunk)
    }
}

fn read_utf8_length(data: &[u8], offset: usize, limit: usize) -> Result<(usize, usize)> {
    if offset >= limit {
        return Err(Error::MalformedStringPool("utf-8 length out of bounds".into()));
    }
    let first = data[offset];
    if first & 0x80 == 0 {
        return Ok((first as usize, 1));
    }
    if offset + 1 >= limit {
        return Err(Error::MalformedStringPool("truncated utf-8 length".into()));
    }
    let length = (((first & 0x7F) as usize) << 8) | data[offset + 1] as usize;
    Ok((length, 2))
}

fn read_utf16_length(data: &[u8], offset: usize, limit: usize) -> Result<(usize, usize)> {
    if offset + 2 > limit {
        return Err(Error::MalformedStringPool("utf-16 length out of bounds".into()));
    }
    let first = LittleEndian::read_u16(&data[offset..]);
    if first & 0x8000 == 0 {
        return Ok((first as usize, 2));
    }
    if offset + 4 > limit {
        return Err(Error::MalformedStringPool("truncated utf-16 length".into()));
    }
    let second = LittleEndian::read_u16(&data[offset + 2..]);
    Ok(((((first & 0x7FFF) as usize) << 16) | second as usize, 4))
}

fn read_utf8_string(data: &[u8], offset: usize, limit: usize) -> Result<String> {
    let (_, char_len_size) = read_utf8_length(data, offset, limit)?;
    let cursor = offset + char_len_size;
    let (byte_len, byte_len_size) = read_utf8_length(data, cursor, limit)?;
    let cursor = cursor + byte_len_size;
    if cursor + byte_len > limit {
        return Err(Error::MalformedStringPool(
            "utf-8 string exceeds chunk bounds".into(),
        ));
    }
    let text = std::str::from_utf8(&data[cursor..cursor + byte_len])
        .map_err(|err| Error::MalformedStringPool(err.to_string()))?;
    Ok(text.to_string())
}

fn read_utf16_string(data: &[u8], offset: usize, limit: usize) -> Result<String> {
    let (char_count, length_size) = read_utf16_length(data, offset, limit)?;
    let cursor = offset + length_size;
    let byte_len = char_count * 2;
    if cursor + byte_len > limit {
        return Err(Error::MalformedStringPool(
            "utf-16 string exceeds chunk bounds".into(),
        ));
    }
    let mut units = vec![0u16; char_count];
    LittleEndian::read_u16_into(&data[cursor..cursor + byte_len], &mut units);
    String::from_utf16(&units).map_err(|err| Error::MalformedStringPool(err.to_string()))
}

fn write_utf8_length(buf: &mut Vec<u8>, len: usize) -> Result<()> {
    if len > 0x7FFF {
        return Err(Error::FieldOverflow {
            field: "utf-8 string length",
            value: len,
        });
    }
    if len > 0x7F {
        buf.push(0x80 | (len >> 8) as u8);
    }
    buf.push((len & 0xFF) as u8);
    Ok(())
}

fn write_utf8_string(buf: &mut Vec<u8>, text: &str) -> Result<()> {
    write_utf8_length(buf, text.encode_utf16().count())?;
    write_utf8_length(buf, text.len())?;
    buf.extend_from_slice(text.as_bytes());
    buf.push(0);
    Ok(())
}

fn write_utf16_string(buf: &mut Vec<u8>, text: &str) -> Result<()> {
    let units: Vec<u16> = text.encode_utf16().collect();
    let len = units.len();
    if len > 0x7FFF_FFFF {
        return Err(Error::FieldOverflow {
            field: "utf-16 string length",
            value: len,
        });
    }
    if len > 0x7FFF {
        write_u16(buf, 0x8000 | (len >> 16) as u16);
    }
    write_u16(buf, (len & 0xFFFF) as u16);
    for unit in units {
        write_u16(buf, unit);
    }
    write_u16(buf, 0);
    Ok(())
}
