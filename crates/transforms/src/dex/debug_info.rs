use super::{DexTask, TaskSummary};
use crate::Result;
use rand::rngs::StdRng;
use veil_core::dex::DexClass;

/// Detaches debug info (line tables, local names) from every code item.
///
/// The debug info items stay in the file, unreferenced.
#[derive(Debug, Default)]
pub struct DebugInfoStripper {
    sites: usize,
}

impl DexTask for DebugInfoStripper {
    fn name(&self) -> &'static str {
        "DebugInfoStripper"
    }

    fn min_level(&self) -> u32 {
        2
    }

    fn apply(&mut self, class: &mut DexClass, _rng: &mut StdRng) -> Result<bool> {
        let mut changed = false;
        for code in class.code_items.iter_mut().filter(|code| code.debug_info_off != 0) {
            code.debug_info_off = 0;
            self.sites += 1;
            changed = true;
        }
        Ok(changed)
    }

    fn summary(&self) -> TaskSummary {
        TaskSummary {
            task: self.name().to_string(),
            sites: self.sites,
        }
    }
}
