pub mod confuser;
pub mod cyclic;
pub mod dex;
pub mod dictionary;
pub mod directory;
pub mod file_name;
pub mod manifest;
pub mod options;
pub mod protector;
pub mod signer;
pub mod table;

mod rename;

use std::path::PathBuf;
use thiserror::Error;

pub use confuser::{ConfuseContext, Confuser, PathChange, Stage, StageReport};
pub use options::{KeepTypes, ProtectorOptions, SignOptions};
pub use protector::{ProtectOutcome, ProtectReport, Protector};

/// Transform error type encompassing all pipeline errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Package model or codec operation failed.
    #[error("package operation failed: {0}")]
    Core(#[from] veil_core::Error),

    /// The input package does not exist or is not a file.
    #[error("input package not found: {}", .0.display())]
    InputMissing(PathBuf),

    /// The output exists and overwriting was not requested.
    #[error("output already exists (use force to overwrite): {}", .0.display())]
    OutputExists(PathBuf),

    /// A dictionary file could not be read.
    #[error("could not read dictionary '{}': {source}", path.display())]
    DictionaryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A dictionary has no usable tokens.
    #[error("dictionary '{0}' has no entries")]
    DictionaryEmpty(String),

    /// Option values are inconsistent.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// A JSON configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// Generic IO failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transform result type
pub type Result<T> = std::result::Result<T, Error>;
