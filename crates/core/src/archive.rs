//! Zip container entries held fully in memory.

use crate::result::{Error, Result};
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const STORED_ALIGNMENT: u16 = 4;
const NATIVE_LIB_ALIGNMENT: u16 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryMethod {
    Stored,
    Deflated,
}

impl EntryMethod {
    fn from_zip(method: CompressionMethod) -> Self {
        if method == CompressionMethod::Stored {
            EntryMethod::Stored
        } else {
            EntryMethod::Deflated
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub method: EntryMethod,
}

impl ArchiveEntry {
    pub fn new(name: impl Into<String>, data: Vec<u8>, method: EntryMethod) -> Self {
        Self {
            name: name.into(),
            data,
            method,
        }
    }

    /// A replacement carrying `data` under this entry's name and attributes.
    pub fn with_data(&self, data: Vec<u8>) -> Self {
        Self {
            name: self.name.clone(),
            data,
            method: self.method,
        }
    }
}

/// Ordered archive entries. Directory records are dropped on read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Archive {
    entries: Vec<ArchiveEntry>,
}

impl Archive {
    pub fn from_entries(entries: Vec<ArchiveEntry>) -> Self {
        Self { entries }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|source| Error::FileRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::read(bytes)
    }

    pub fn read(bytes: Vec<u8>) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let mut file = archive.by_index(index)?;
            if file.is_dir() {
                continue;
            }
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            entries.push(ArchiveEntry {
                name: file.name().to_string(),
                data,
                method: EntryMethod::from_zip(file.compression()),
            });
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ArchiveEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ArchiveEntry> {
        self.entries.iter_mut().find(|entry| entry.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn push(&mut self, entry: ArchiveEntry) {
        self.entries.push(entry);
    }

    /// Swaps in `entry` for the entry of the same name.
    pub fn replace(&mut self, entry: ArchiveEntry) -> Result<ArchiveEntry> {
        let slot = self
            .get_mut(&entry.name)
            .ok_or_else(|| Error::NoSuchEntry(entry.name.clone()))?;
        Ok(std::mem::replace(slot, entry))
    }

    pub fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        if self.contains(new) {
            return Err(Error::PathCollision(new.to_string()));
        }
        let entry = self
            .get_mut(old)
            .ok_or_else(|| Error::NoSuchEntry(old.to_string()))?;
        entry.name = new.to_string();
        Ok(())
    }

    /// Writes the entries listed in `order` (indices into [`Archive::entries`]).
    ///
    /// `stored` decides per entry whether it is written uncompressed.
    pub fn write<W: Write + Seek>(
        &self,
        writer: W,
        order: &[usize],
        stored: impl Fn(&ArchiveEntry) -> bool,
    ) -> Result<W> {
        let mut zip = ZipWriter::new(writer);
        for index in order {
            let entry = self
                .entries
                .get(*index)
                .ok_or_else(|| Error::NoSuchEntry(format!("entry #{index}")))?;
            let options = if stored(entry) {
                let alignment = if entry.name.ends_with(".so") {
                    NATIVE_LIB_ALIGNMENT
                } else {
                    STORED_ALIGNMENT
                };
                SimpleFileOptions::default()
                    .compression_method(CompressionMethod::Stored)
                    .with_alignment(alignment)
            } else {
                SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
            };
            zip.start_file(entry.name.as_str(), options)?;
            zip.write_all(&entry.data)?;
        }
        Ok(zip.finish()?)
    }

    pub fn to_bytes(&self, stored: impl Fn(&ArchiveEntry) -> bool) -> Result<Vec<u8>> {
        let order: Vec<usize> = (0..self.entries.len()).collect();
        Ok(self.write(Cursor::new(Vec::new()), &order, stored)?.into_inner())
    }
}
