//! Shared plumbing for the confusion stages.

use crate::Result;
use crate::dex::TaskSummary;
use crate::options::ProtectorOptions;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::debug;
use veil_core::ApkModule;

/// The five confusion stages, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Manifest,
    Directory,
    FileName,
    Table,
    Dex,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Manifest,
        Stage::Directory,
        Stage::FileName,
        Stage::Table,
        Stage::Dex,
    ];

    /// Prefix used on every log line the stage emits.
    pub fn tag(self) -> &'static str {
        match self {
            Stage::Manifest => "ManifestConfuser",
            Stage::Directory => "DirectoryConfuser",
            Stage::FileName => "FileNameConfuser",
            Stage::Table => "TableConfuser",
            Stage::Dex => "DexConfuser",
        }
    }
}

/// One accepted entry rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathChange {
    pub old: String,
    pub new: String,
    pub stage: Stage,
}

/// What a stage did to the package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    /// Set when the stage made no attempt (disabled or nothing to work on).
    pub skipped: bool,
    /// Stage-specific count of changed sites (elements, paths, type names or
    /// bytecode containers).
    pub changes: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<TaskSummary>,
}

impl StageReport {
    pub fn skipped(stage: Stage) -> Self {
        Self {
            stage,
            skipped: true,
            changes: 0,
            tasks: Vec::new(),
        }
    }

    pub fn changed(stage: Stage, changes: usize) -> Self {
        Self {
            stage,
            skipped: false,
            changes,
            tasks: Vec::new(),
        }
    }
}

/// Per-run state lent to each stage for the duration of its call.
#[derive(Debug)]
pub struct ConfuseContext<'a> {
    pub options: &'a ProtectorOptions,
    pub rng: &'a mut StdRng,
    path_changes: Vec<PathChange>,
}

impl<'a> ConfuseContext<'a> {
    pub fn new(options: &'a ProtectorOptions, rng: &'a mut StdRng) -> Self {
        Self {
            options,
            rng,
            path_changes: Vec::new(),
        }
    }

    pub fn is_keep_type(&self, type_name: &str) -> bool {
        self.options.keep_types.contains(type_name)
    }

    /// Records a committed rename.
    pub fn on_path_changed(&mut self, stage: Stage, old: String, new: String) {
        debug!("{}: '{}' -> '{}'", stage.tag(), old, new);
        self.path_changes.push(PathChange { old, new, stage });
    }

    pub fn path_changes(&self) -> &[PathChange] {
        &self.path_changes
    }

    pub fn into_path_changes(self) -> Vec<PathChange> {
        self.path_changes
    }
}

/// A confusion stage.
pub trait Confuser {
    fn stage(&self) -> Stage;

    /// Mutates the package in place and leaves every touched structure
    /// refreshed.
    fn confuse(&mut self, module: &mut ApkModule, ctx: &mut ConfuseContext<'_>)
    -> Result<StageReport>;
}
