//! Replacement-name dictionaries for the path confusers.

use crate::cyclic::CyclicIterator;
use crate::{Error, Result};
use std::path::Path;

const BUILTIN_DIR_NAMES: &str = include_str!("../assets/dir_names.txt");
const BUILTIN_FILE_NAMES: &str = include_str!("../assets/file_names.txt");

/// Ordered, non-empty list of replacement tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dictionary {
    tokens: Vec<String>,
}

impl Dictionary {
    /// Splits newline-delimited text, trimming each line and dropping blanks.
    pub fn parse(text: &str, source: &str) -> Result<Self> {
        let tokens: Vec<String> = text
            .split('\n')
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        if tokens.is_empty() {
            return Err(Error::DictionaryEmpty(source.to_string()));
        }
        Ok(Self { tokens })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::DictionaryRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, &path.display().to_string())
    }

    /// Loads `path` when given, otherwise the built-in directory names.
    pub fn directory_names(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Self::parse(BUILTIN_DIR_NAMES, "built-in directory names"),
        }
    }

    /// Loads `path` when given, otherwise the built-in file names.
    pub fn file_names(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Self::parse(BUILTIN_FILE_NAMES, "built-in file names"),
        }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn into_iterator(self) -> Result<CyclicIterator> {
        CyclicIterator::new(self.tokens)
    }
}
