use crate::Result;
use crate::confuser::{ConfuseContext, Confuser, Stage, StageReport};
use crate::cyclic::CyclicIterator;
use crate::dictionary::Dictionary;
use crate::rename::{confuse_paths, replace_file_name};
use tracing::info;
use veil_core::ApkModule;

/// Renames resource files' base names, keeping their extensions.
#[derive(Debug)]
pub struct FileNameConfuser {
    names: CyclicIterator,
}

impl FileNameConfuser {
    pub fn new(dictionary: Dictionary) -> Result<Self> {
        Ok(Self {
            names: dictionary.into_iterator()?,
        })
    }
}

impl Confuser for FileNameConfuser {
    fn stage(&self) -> Stage {
        Stage::FileName
    }

    fn confuse(
        &mut self,
        module: &mut ApkModule,
        ctx: &mut ConfuseContext<'_>,
    ) -> Result<StageReport> {
        let tag = self.stage().tag();
        info!("{tag}: Confusing ...");
        let renamed = confuse_paths(module, ctx, Stage::FileName, &mut self.names, replace_file_name)?;
        info!("{tag}: renamed {renamed} file(s)");
        Ok(StageReport::changed(Stage::FileName, renamed))
    }
}
