use crate::Result;
use crate::confuser::{ConfuseContext, Confuser, Stage, StageReport};
use crate::cyclic::CyclicIterator;
use crate::dictionary::Dictionary;
use crate::rename::{confuse_paths, replace_directory};
use tracing::info;
use veil_core::ApkModule;

/// Moves resource files into directories named from a dictionary.
#[derive(Debug)]
pub struct DirectoryConfuser {
    names: CyclicIterator,
}

impl DirectoryConfuser {
    pub fn new(dictionary: Dictionary) -> Result<Self> {
        Ok(Self {
            names: dictionary.into_iterator()?,
        })
    }
}

impl Confuser for DirectoryConfuser {
    fn stage(&self) -> Stage {
        Stage::Directory
    }

    fn confuse(
        &mut self,
        module: &mut ApkModule,
        ctx: &mut ConfuseContext<'_>,
    ) -> Result<StageReport> {
        let tag = self.stage().tag();
        info!("{tag}: Confusing ...");
        let renamed = confuse_paths(module, ctx, Stage::Directory, &mut self.names, replace_directory)?;
        info!("{tag}: renamed {renamed} path(s)");
        Ok(StageReport::changed(Stage::Directory, renamed))
    }
}
