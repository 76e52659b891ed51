use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use veil_core::Seed;

/// Keep-type entry that exempts every resource type.
pub const ALL_TYPES: &str = "all-types";

/// Keep types applied when the caller names none.
pub const DEFAULT_KEEP_TYPES: &[&str] = &["font"];

const OUTPUT_SUFFIX: &str = "_protected.apk";
const DEFAULT_SIGNER_JAR: &str = "libs/apksigner.jar";

/// Resource type names exempt from renaming and path confusion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeepTypes(BTreeSet<String>);

impl KeepTypes {
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(types.into_iter().map(Into::into).collect())
    }

    pub fn insert(&mut self, type_name: impl Into<String>) {
        self.0.insert(type_name.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keeps_all(&self) -> bool {
        self.0.contains(ALL_TYPES)
    }

    /// True when `type_name` is kept explicitly or via [`ALL_TYPES`].
    pub fn contains(&self, type_name: &str) -> bool {
        self.keeps_all() || self.0.contains(type_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Fills in [`DEFAULT_KEEP_TYPES`] if nothing was given.
    pub fn apply_defaults(&mut self) {
        if self.0.is_empty() {
            self.0.extend(DEFAULT_KEEP_TYPES.iter().map(|s| s.to_string()));
        }
    }
}

/// External signing tool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignOptions {
    pub enabled: bool,
    /// Path to the `apksigner` jar.
    pub signer_jar: PathBuf,
    pub keystore: Option<PathBuf>,
    pub keystore_password: Option<String>,
    pub key_password: Option<String>,
    pub key_alias: Option<String>,
}

impl Default for SignOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            signer_jar: PathBuf::from(DEFAULT_SIGNER_JAR),
            keystore: None,
            keystore_password: None,
            key_password: None,
            key_alias: None,
        }
    }
}

/// Options for one protection run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectorOptions {
    pub input: PathBuf,
    /// Defaults to `<input stem>_protected.apk` beside the input.
    pub output: Option<PathBuf>,
    pub force: bool,
    pub skip_manifest: bool,
    pub confuse_zip: bool,
    pub keep_types: KeepTypes,
    pub dir_name_dictionary: Option<PathBuf>,
    pub file_name_dictionary: Option<PathBuf>,
    /// Bytecode confusion level, 0 disables it.
    pub dex_level: u32,
    /// Random when absent.
    pub seed: Option<Seed>,
    pub sign: SignOptions,
}

impl ProtectorOptions {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            ..Self::default()
        }
    }

    /// Reads options from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// The output path, derived from the input when not set.
    pub fn output_path(&self) -> PathBuf {
        if let Some(output) = &self.output {
            return output.clone();
        }
        let stem = self
            .input
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "out".to_string());
        self.input.with_file_name(format!("{stem}{OUTPUT_SUFFIX}"))
    }

    /// Checks inputs and fills in defaults. Nothing is mutated on disk.
    pub fn validate(&mut self) -> Result<()> {
        if !self.input.is_file() {
            return Err(Error::InputMissing(self.input.clone()));
        }
        let output = self.output_path();
        if output == self.input {
            return Err(Error::InvalidOptions(
                "output path must differ from input".into(),
            ));
        }
        if output.exists() && !self.force {
            return Err(Error::OutputExists(output));
        }
        self.output = Some(output);
        self.keep_types.apply_defaults();

        if self.sign.enabled && self.sign.keystore.is_none() {
            return Err(Error::InvalidOptions(
                "signing requires a keystore".into(),
            ));
        }
        Ok(())
    }
}
