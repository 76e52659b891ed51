//! Level-gated bytecode confusion.

pub mod debug_info;
pub mod source_file;

use crate::Result;
use crate::confuser::{ConfuseContext, Confuser, Stage, StageReport};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use veil_core::ApkModule;
use veil_core::dex::{DexClass, DexFile};

pub use debug_info::DebugInfoStripper;
pub use source_file::SourceFileStripper;

/// Sites a task touched over a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub task: String,
    pub sites: usize,
}

/// A per-class bytecode transform.
pub trait DexTask: std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Lowest confusion level at which the task runs.
    fn min_level(&self) -> u32;

    fn is_enabled(&self, level: u32) -> bool {
        level >= self.min_level()
    }

    /// Applies the task to one class, returning whether anything changed.
    fn apply(&mut self, class: &mut DexClass, rng: &mut StdRng) -> Result<bool>;

    fn summary(&self) -> TaskSummary;
}

/// Runs every enabled [`DexTask`] over every class of every container.
#[derive(Debug)]
pub struct DexConfuser {
    tasks: Vec<Box<dyn DexTask>>,
}

impl Default for DexConfuser {
    fn default() -> Self {
        Self::with_tasks(vec![
            Box::new(SourceFileStripper::default()),
            Box::new(DebugInfoStripper::default()),
        ])
    }
}

impl DexConfuser {
    pub fn with_tasks(tasks: Vec<Box<dyn DexTask>>) -> Self {
        Self { tasks }
    }

    pub fn is_enabled(&self, level: u32) -> bool {
        level > 0 && self.tasks.iter().any(|task| task.is_enabled(level))
    }

    fn confuse_container(&mut self, dex: &mut DexFile, level: u32, rng: &mut StdRng) -> Result<bool> {
        let mut changed = false;
        for class in dex.classes_mut() {
            for task in self.tasks.iter_mut().filter(|task| task.is_enabled(level)) {
                changed |= task.apply(class, rng)?;
            }
        }
        Ok(changed)
    }
}

impl Confuser for DexConfuser {
    fn stage(&self) -> Stage {
        Stage::Dex
    }

    fn confuse(
        &mut self,
        module: &mut ApkModule,
        ctx: &mut ConfuseContext<'_>,
    ) -> Result<StageReport> {
        let tag = self.stage().tag();
        let level = ctx.options.dex_level;
        if !self.is_enabled(level) {
            info!("{tag}: Disabled (level {level})");
            return Ok(StageReport::skipped(Stage::Dex));
        }

        let names = module.list_dex_files();
        if names.is_empty() {
            info!("{tag}: Dex files not found");
            return Ok(StageReport::skipped(Stage::Dex));
        }
        info!("{tag}: Confusing {} dex file(s) at level {level} ...", names.len());

        let mut modified = 0;
        for name in names {
            let Some(entry) = module.entry(&name).cloned() else {
                continue;
            };
            let mut dex = DexFile::read(entry.data.clone())?;
            if !self.confuse_container(&mut dex, level, ctx.rng)? {
                debug!("{tag}: {name} unchanged");
                continue;
            }

            dex.refresh();
            dex.shrink()?;
            dex.refresh_full()?;
            module.replace_entry(entry.with_data(dex.into_bytes()))?;
            debug!("{tag}: rewrote {name}");
            modified += 1;
        }

        let tasks: Vec<TaskSummary> = self
            .tasks
            .iter()
            .filter(|task| task.is_enabled(level))
            .map(|task| task.summary())
            .collect();
        for summary in &tasks {
            info!("{tag}: {} touched {} site(s)", summary.task, summary.sites);
        }

        Ok(StageReport {
            stage: Stage::Dex,
            skipped: false,
            changes: modified,
            tasks,
        })
    }
}
