//! Core results and error types

use thiserror::Error;

/// Core error type encompassing all package model and codec errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A chunk header declares a size that does not fit the enclosing data.
    #[error("chunk at offset {offset} is truncated: {msg}")]
    TruncatedChunk {
        /// Absolute offset of the chunk header.
        offset: usize,
        /// What was being read when the data ran out.
        msg: String,
    },

    /// A chunk of an unexpected type was found where a specific one is required.
    #[error("unexpected chunk type 0x{found:04x} at offset {offset}, expected 0x{expected:04x}")]
    UnexpectedChunk {
        /// Absolute offset of the chunk header.
        offset: usize,
        /// Chunk type that was required.
        expected: u16,
        /// Chunk type that was found.
        found: u16,
    },

    /// A string pool could not be decoded or encoded.
    #[error("malformed string pool: {0}")]
    MalformedStringPool(String),

    /// A binary XML document is structurally inconsistent.
    #[error("malformed binary xml: {0}")]
    MalformedXml(String),

    /// A resource table is structurally inconsistent.
    #[error("malformed resource table: {0}")]
    MalformedTable(String),

    /// A bytecode container could not be parsed or re-encoded.
    #[error("malformed dex: {0}")]
    MalformedDex(String),

    /// A string reference points outside the string pool.
    #[error("string reference {index} out of range (pool has {len} strings)")]
    StringOutOfRange {
        /// The offending index.
        index: u32,
        /// Number of strings in the pool.
        len: usize,
    },

    /// A derived offset or size no longer fits its on-disk field.
    #[error("{field} overflow: {value}")]
    FieldOverflow {
        /// Name of the field being encoded.
        field: &'static str,
        /// Value that did not fit.
        value: usize,
    },

    /// The package has no AndroidManifest.xml entry.
    #[error("package has no AndroidManifest.xml")]
    MissingManifest,

    /// The package has no resources.arsc entry.
    #[error("package has no resources.arsc")]
    MissingTable,

    /// An archive entry name was expected but not present.
    #[error("no such entry: {0}")]
    NoSuchEntry(String),

    /// Renaming an entry would overwrite another entry.
    #[error("path already exists in package: {0}")]
    PathCollision(String),

    /// Zip container failure.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Failed to read file at the specified path.
    #[error("could not read file '{path}': {source}")]
    FileRead {
        /// The path to the file that could not be read.
        path: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Generic IO failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid hexadecimal in seed.
    #[error("invalid hexadecimal in seed")]
    InvalidSeedHex,

    /// Invalid seed length.
    #[error("invalid seed length: expected 64 hex chars, got {0}")]
    InvalidSeedLength(usize),
}

/// Core result type
pub type Result<T> = std::result::Result<T, Error>;
