//! The in-memory application package.
//!
//! `ApkModule` owns the archive entries together with the decoded manifest
//! and resource table. The decoded structures are the source of truth while
//! the module is alive and are re-encoded into their entries on write.

use crate::archive::{Archive, ArchiveEntry, EntryMethod};
use crate::result::{Error, Result};
use crate::table::{ResourceTable, read_fixed_length_string};
use crate::xml::XmlDocument;
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::{BTreeSet, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const MANIFEST_PATH: &str = "AndroidManifest.xml";
pub const TABLE_PATH: &str = "resources.arsc";

/// Text written into the resource table's attribution chunk header.
pub const PROTECTOR_SIGNATURE: &str = "veil apk protector";
/// Text written into the attribution chunk body.
pub const CODEC_SIGNATURE: &str = "veil resource codec";
/// Byte length of each attribution field.
pub const SIGNATURE_FIELD_LEN: usize = 256;

/// Set of entry paths currently present in the package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathIndex {
    paths: HashSet<String>,
}

impl PathIndex {
    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    fn insert(&mut self, path: &str) -> bool {
        self.paths.insert(path.to_string())
    }

    fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        if self.paths.contains(new) {
            return Err(Error::PathCollision(new.to_string()));
        }
        if !self.paths.remove(old) {
            return Err(Error::NoSuchEntry(old.to_string()));
        }
        self.paths.insert(new.to_string());
        Ok(())
    }
}

impl<S: Into<String>> FromIterator<S> for PathIndex {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            paths: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Paths that must be written without compression.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UncompressedFiles {
    paths: BTreeSet<String>,
}

impl UncompressedFiles {
    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn add(&mut self, path: impl Into<String>) {
        self.paths.insert(path.into());
    }

    pub fn remove(&mut self, path: &str) -> bool {
        self.paths.remove(path)
    }

    /// Moves the registration of `old` to `new`; a no-op if `old` is absent.
    pub fn replace_path(&mut self, old: &str, new: &str) {
        if self.paths.remove(old) {
            self.paths.insert(new.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// A resource-table-referenced archive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResFile {
    path: String,
    string_refs: Vec<u32>,
    type_names: Vec<String>,
}

impl ResFile {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Type names of every table entry pointing at this file, in table order.
    pub fn type_names(&self) -> &[String] {
        &self.type_names
    }

    /// The representative type used for keep decisions.
    pub fn pick_one_type(&self) -> Option<&str> {
        self.type_names.first().map(String::as_str)
    }
}

/// Result of the prior-protection check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtectionStatus {
    Clean,
    Protected { reason: String },
}

impl ProtectionStatus {
    pub fn is_protected(&self) -> bool {
        matches!(self, ProtectionStatus::Protected { .. })
    }
}

#[derive(Debug)]
pub struct ApkModule {
    archive: Archive,
    manifest: XmlDocument,
    table: Option<ResourceTable>,
    path_index: PathIndex,
    uncompressed: UncompressedFiles,
    source: Option<PathBuf>,
}

impl ApkModule {
    pub fn load(path: &Path) -> Result<Self> {
        debug!("loading package {}", path.display());
        let mut module = Self::from_archive(Archive::open(path)?)?;
        module.source = Some(path.to_path_buf());
        Ok(module)
    }

    pub fn from_entries(entries: Vec<ArchiveEntry>) -> Result<Self> {
        Self::from_archive(Archive::from_entries(entries))
    }

    pub fn from_archive(archive: Archive) -> Result<Self> {
        let manifest = XmlDocument::parse(&archive.get(MANIFEST_PATH).ok_or(Error::MissingManifest)?.data)?;
        let table = archive
            .get(TABLE_PATH)
            .map(|entry| ResourceTable::parse(&entry.data))
            .transpose()?;

        let mut path_index = PathIndex::default();
        let mut uncompressed = UncompressedFiles::default();
        for entry in archive.entries() {
            if !path_index.insert(&entry.name) {
                return Err(Error::PathCollision(entry.name.clone()));
            }
            if entry.method == EntryMethod::Stored {
                uncompressed.add(entry.name.as_str());
            }
        }

        Ok(Self {
            archive,
            manifest,
            table,
            path_index,
            uncompressed,
            source: None,
        })
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn manifest(&self) -> &XmlDocument {
        &self.manifest
    }

    pub fn manifest_mut(&mut self) -> &mut XmlDocument {
        &mut self.manifest
    }

    pub fn has_table(&self) -> bool {
        self.table.is_some()
    }

    pub fn table(&self) -> Result<&ResourceTable> {
        self.table.as_ref().ok_or(Error::MissingTable)
    }

    pub fn table_mut(&mut self) -> Result<&mut ResourceTable> {
        self.table.as_mut().ok_or(Error::MissingTable)
    }

    pub fn path_index(&self) -> &PathIndex {
        &self.path_index
    }

    pub fn contains_file_path(&self, path: &str) -> bool {
        self.path_index.contains(path)
    }

    pub fn uncompressed_files(&self) -> &UncompressedFiles {
        &self.uncompressed
    }

    pub fn uncompressed_files_mut(&mut self) -> &mut UncompressedFiles {
        &mut self.uncompressed
    }

    pub fn entry(&self, path: &str) -> Option<&ArchiveEntry> {
        self.archive.get(path)
    }

    pub fn entry_method(&self, path: &str) -> Option<EntryMethod> {
        self.archive.get(path).map(|entry| entry.method)
    }

    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.archive.entries().iter().map(|entry| entry.name.as_str())
    }

    /// Resource files referenced by the table that exist as archive entries,
    /// in order of first reference.
    pub fn list_res_files(&self) -> Result<Vec<ResFile>> {
        let Some(table) = &self.table else {
            return Ok(Vec::new());
        };

        let mut files: Vec<ResFile> = Vec::new();
        for value in table.string_value_refs()? {
            let Some(path) = table.string_pool.get(value.string_index) else {
                continue;
            };
            if !self.archive.contains(path) {
                continue;
            }
            match files.iter_mut().find(|file| file.path == path) {
                Some(file) => {
                    if !file.string_refs.contains(&value.string_index) {
                        file.string_refs.push(value.string_index);
                    }
                    file.type_names.push(value.type_name);
                }
                None => files.push(ResFile {
                    path: path.to_string(),
                    string_refs: vec![value.string_index],
                    type_names: vec![value.type_name],
                }),
            }
        }
        Ok(files)
    }

    /// Moves a resource file to `new_path`, updating the table values, the
    /// archive entry and the path index together.
    pub fn set_res_file_path(&mut self, file: &mut ResFile, new_path: &str) -> Result<()> {
        if self.path_index.contains(new_path) {
            return Err(Error::PathCollision(new_path.to_string()));
        }
        let table = self.table.as_mut().ok_or(Error::MissingTable)?;
        for index in &file.string_refs {
            table.string_pool.set(*index, new_path)?;
        }
        self.archive.rename(&file.path, new_path)?;
        self.path_index.rename(&file.path, new_path)?;
        file.path = new_path.to_string();
        Ok(())
    }

    /// Names of bytecode containers (`classes*.dex` at the archive root).
    pub fn list_dex_files(&self) -> Vec<String> {
        self.archive
            .entries()
            .iter()
            .map(|entry| entry.name.as_str())
            .filter(|name| is_dex_name(name))
            .map(str::to_string)
            .collect()
    }

    /// Swaps in a replacement for the entry of the same name.
    pub fn replace_entry(&mut self, entry: ArchiveEntry) -> Result<ArchiveEntry> {
        self.archive.replace(entry)
    }

    /// Checks for the marks a previous protection run leaves behind.
    pub fn protection_status(&self) -> ProtectionStatus {
        if let Some(chunk) = self.table.as_ref().and_then(ResourceTable::first_placeholder) {
            let text = read_fixed_length_string(&chunk.header_extra);
            if text == PROTECTOR_SIGNATURE {
                return ProtectionStatus::Protected {
                    reason: format!("resource table carries attribution chunk '{text}'"),
                };
            }
        }
        let leading = self.manifest.leading_unknown_count();
        if leading > 0 {
            return ProtectionStatus::Protected {
                reason: format!("manifest starts with {leading} opaque chunk(s)"),
            };
        }
        ProtectionStatus::Clean
    }

    /// Re-encodes the manifest and table into their archive entries.
    pub fn sync_entries(&mut self) -> Result<()> {
        let manifest = self.manifest.to_bytes()?;
        self.replace_data(MANIFEST_PATH, manifest)?;
        if let Some(table) = &self.table {
            let bytes = table.to_bytes()?;
            self.replace_data(TABLE_PATH, bytes)?;
        }
        Ok(())
    }

    fn replace_data(&mut self, path: &str, data: Vec<u8>) -> Result<()> {
        let entry = self
            .archive
            .get_mut(path)
            .ok_or_else(|| Error::NoSuchEntry(path.to_string()))?;
        entry.data = data;
        Ok(())
    }

    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        self.sync_entries()?;
        let uncompressed = &self.uncompressed;
        self.archive
            .to_bytes(|entry| uncompressed.contains(&entry.name))
    }

    /// Writes the package with entries in their original order.
    pub fn write_apk(&mut self, path: &Path) -> Result<()> {
        let order: Vec<usize> = (0..self.archive.len()).collect();
        self.write_ordered(path, &order)
    }

    /// Writes the package with the physical entry order shuffled.
    pub fn write_apk_scrambled<R: Rng>(&mut self, path: &Path, rng: &mut R) -> Result<()> {
        let mut order: Vec<usize> = (0..self.archive.len()).collect();
        order.shuffle(rng);
        self.write_ordered(path, &order)
    }

    fn write_ordered(&mut self, path: &Path, order: &[usize]) -> Result<()> {
        self.sync_entries()?;
        let file = File::create(path)?;
        let uncompressed = &self.uncompressed;
        self.archive
            .write(file, order, |entry| uncompressed.contains(&entry.name))?;
        debug!("wrote {} entries to {}", order.len(), path.display());
        Ok(())
    }

    /// Releases the package.
    pub fn close(self) {
        debug!("closed package with {} entries", self.archive.len());
    }
}

fn is_dex_name(name: &str) -> bool {
    name.strip_prefix("classes")
        .and_then(|rest| rest.strip_suffix(".dex"))
        .is_some_and(|index| index.chars().all(|c| c.is_ascii_digit()))
}
