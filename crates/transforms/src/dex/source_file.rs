use super::{DexTask, TaskSummary};
use crate::Result;
use rand::rngs::StdRng;
use veil_core::dex::{DexClass, NO_INDEX};

/// Drops the source file name recorded on each class.
#[derive(Debug, Default)]
pub struct SourceFileStripper {
    sites: usize,
}

impl DexTask for SourceFileStripper {
    fn name(&self) -> &'static str {
        "SourceFileStripper"
    }

    fn min_level(&self) -> u32 {
        1
    }

    fn apply(&mut self, class: &mut DexClass, _rng: &mut StdRng) -> Result<bool> {
        if class.source_file_idx == NO_INDEX {
            return Ok(false);
        }
        class.source_file_idx = NO_INDEX;
        self.sites += 1;
        Ok(true)
    }

    fn summary(&self) -> TaskSummary {
        TaskSummary {
            task: self.name().to_string(),
            sites: self.sites,
        }
    }
}
