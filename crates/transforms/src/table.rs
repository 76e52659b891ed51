use crate::Result;
use crate::confuser::{ConfuseContext, Confuser, Stage, StageReport};
use crate::options::KeepTypes;
use tracing::{debug, info};
use veil_core::ApkModule;
use veil_core::apk::{CODEC_SIGNATURE, PROTECTOR_SIGNATURE, SIGNATURE_FIELD_LEN};
use veil_core::table::{UnknownChunk, fixed_length_string};

/// Injects the attribution chunk into the resource table and swaps type names.
#[derive(Debug, Default)]
pub struct TableConfuser;

impl Confuser for TableConfuser {
    fn stage(&self) -> Stage {
        Stage::Table
    }

    fn confuse(
        &mut self,
        module: &mut ApkModule,
        ctx: &mut ConfuseContext<'_>,
    ) -> Result<StageReport> {
        let tag = self.stage().tag();
        if !module.has_table() {
            info!("{tag}: Skip, package has no resource table");
            return Ok(StageReport::skipped(Stage::Table));
        }
        info!("{tag}: Confusing ...");

        let table = module.table_mut()?;
        table.set_first_placeholder(attribution_chunk());
        table.refresh()?;

        let keep = &ctx.options.keep_types;
        if keep.keeps_all() {
            info!("{tag}: Skip type names");
            return Ok(StageReport::changed(Stage::Table, 0));
        }

        info!("{tag}: Type names ...");
        let mut renamed = 0;
        for package in table.packages_mut() {
            let names: Vec<String> = package.type_strings.iter().map(str::to_string).collect();
            let planned = plan_type_renames(&names, keep);
            for (index, (old, new)) in names.iter().zip(&planned).enumerate() {
                if old == new {
                    continue;
                }
                package.type_strings.set(index as u32, new.as_str())?;
                debug!("{tag}: '{old}' -> '{new}'");
                renamed += 1;
            }
        }
        table.refresh()?;
        Ok(StageReport::changed(Stage::Table, renamed))
    }
}

/// The unknown chunk carrying the attribution text.
pub fn attribution_chunk() -> UnknownChunk {
    UnknownChunk::new(
        fixed_length_string(PROTECTOR_SIGNATURE, SIGNATURE_FIELD_LEN),
        fixed_length_string(CODEC_SIGNATURE, SIGNATURE_FIELD_LEN),
    )
}

/// Fixed substitution applied to type names, identity otherwise.
pub fn substitute(type_name: &str) -> &str {
    match type_name {
        "attr" => "style",
        "style" => "plurals",
        "id" => "attr",
        "mipmap" => "id",
        other => other,
    }
}

/// Final name for each type in `names`.
///
/// Kept types never change and a substitution targeting a kept name falls
/// back to the original. Any rename whose result equals another type's final
/// name is reverted, repeatedly, so distinct types never share a name.
pub fn plan_type_renames(names: &[String], keep: &KeepTypes) -> Vec<String> {
    let mut planned: Vec<String> = names
        .iter()
        .map(|name| {
            if keep.contains(name) {
                return name.clone();
            }
            let target = substitute(name);
            if keep.contains(target) {
                name.clone()
            } else {
                target.to_string()
            }
        })
        .collect();

    loop {
        let mut reverted = false;
        for index in 0..planned.len() {
            if planned[index] == names[index] {
                continue;
            }
            let clash = planned
                .iter()
                .enumerate()
                .any(|(other, name)| other != index && *name == planned[index]);
            if clash {
                planned[index] = names[index].clone();
                reverted = true;
            }
        }
        if !reverted {
            return planned;
        }
    }
}
