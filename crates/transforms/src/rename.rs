//! Collision-free resource path renaming shared by the path confusers.

use crate::Result;
use crate::confuser::{ConfuseContext, Stage};
use crate::cyclic::CyclicIterator;
use tracing::debug;
use veil_core::{ApkModule, EntryMethod, PathIndex};

/// Renames every non-kept resource file, returning how many moved.
///
/// `rewrite` builds a candidate path from the current path and a token.
pub(crate) fn confuse_paths(
    module: &mut ApkModule,
    ctx: &mut ConfuseContext<'_>,
    stage: Stage,
    names: &mut CyclicIterator,
    rewrite: impl Fn(&str, &str) -> String,
) -> Result<usize> {
    let mut renamed = 0;
    for mut file in module.list_res_files()? {
        let keep = file
            .pick_one_type()
            .is_none_or(|type_name| ctx.is_keep_type(type_name));
        if keep {
            continue;
        }

        let old = file.path().to_string();
        let Some(new) = find_free_path(module.path_index(), names, |token| rewrite(&old, token))
        else {
            debug!("{}: no free name for '{}'", stage.tag(), old);
            continue;
        };

        if module.entry_method(&old) == Some(EntryMethod::Stored) {
            module.uncompressed_files_mut().replace_path(&old, &new);
        }
        module.set_res_file_path(&mut file, &new)?;
        ctx.on_path_changed(stage, old, new);
        renamed += 1;
    }
    Ok(renamed)
}

/// Draws candidates until one is absent from `index` or one full cycle of
/// the dictionary has been tried.
fn find_free_path(
    index: &PathIndex,
    names: &mut CyclicIterator,
    build: impl Fn(&str) -> String,
) -> Option<String> {
    names.reset_cycle_count();
    loop {
        let candidate = build(names.next_token());
        if !index.contains(&candidate) {
            return Some(candidate);
        }
        if names.cycle_count() > 0 {
            return None;
        }
    }
}

/// Moves `path`'s file into a `dir` subdirectory of the directory holding it.
///
/// Root-level files gain `dir` as their directory; an empty `dir` leaves the
/// path as it is rather than adding a separator.
pub fn replace_directory(path: &str, dir: &str) -> String {
    let (parent, name) = match path.rfind('/') {
        Some(slash) => path.split_at(slash + 1),
        None => ("", path),
    };
    if dir.is_empty() {
        format!("{parent}{name}")
    } else {
        format!("{parent}{dir}/{name}")
    }
}

/// Extension kept by file renames. `.9.png` counts as one extension and a
/// name without one gets a bare `.`.
pub fn file_extension(file_name: &str) -> &str {
    if file_name.ends_with(".9.png") {
        return &file_name[file_name.len() - ".9.png".len()..];
    }
    match file_name.rfind('.') {
        Some(dot) => &file_name[dot..],
        None => ".",
    }
}

/// Replaces the base name of `path`'s file with `name`, keeping its
/// directory and extension.
pub fn replace_file_name(path: &str, name: &str) -> String {
    let (dir, file) = match path.rfind('/') {
        Some(slash) => path.split_at(slash + 1),
        None => ("", path),
    };
    format!("{dir}{name}{}", file_extension(file))
}
