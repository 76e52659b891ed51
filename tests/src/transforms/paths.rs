use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::BTreeSet;
use veil_transform::dictionary::Dictionary;
use veil_transform::directory::DirectoryConfuser;
use veil_transform::file_name::FileNameConfuser;
use veil_transform::{ConfuseContext, Confuser, KeepTypes, ProtectorOptions, Stage};
use veil_tests::{SAMPLE_RESOURCES, SAMPLE_TYPES, init_tracing, module};

fn options(keep: &[&str]) -> ProtectorOptions {
    let mut options = ProtectorOptions::new("app.apk");
    options.keep_types = KeepTypes::new(keep.iter().copied());
    options
}

fn dictionary(tokens: &str) -> Dictionary {
    Dictionary::parse(tokens, "test").unwrap()
}

#[test]
fn test_single_token_directory_relocates_without_collision() {
    init_tracing();
    let resources = [
        ("drawable", "res/drawable/icon.png"),
        ("drawable", "res/drawable-hdpi/icon.png"),
    ];
    let mut module = module(&["drawable"], &resources);
    let options = options(&[]);
    let mut rng = StdRng::seed_from_u64(1);
    let mut ctx = ConfuseContext::new(&options, &mut rng);

    let mut confuser = DirectoryConfuser::new(dictionary("a")).unwrap();
    let report = confuser.confuse(&mut module, &mut ctx).unwrap();

    assert_eq!(report.stage, Stage::Directory);
    assert_eq!(report.changes, 2);
    assert!(module.contains_file_path("res/drawable/a/icon.png"));
    assert!(module.contains_file_path("res/drawable-hdpi/a/icon.png"));
    assert!(!module.contains_file_path("res/drawable/icon.png"));
    assert!(!module.contains_file_path("res/drawable-hdpi/icon.png"));

    let changes: Vec<(&str, &str)> = ctx
        .path_changes()
        .iter()
        .map(|change| (change.old.as_str(), change.new.as_str()))
        .collect();
    assert_eq!(
        changes,
        vec![
            ("res/drawable/icon.png", "res/drawable/a/icon.png"),
            ("res/drawable-hdpi/icon.png", "res/drawable-hdpi/a/icon.png"),
        ]
    );
}

#[test]
fn test_directory_collision_keeps_original_path() {
    let resources = [
        ("drawable", "res/drawable/icon.png"),
        ("drawable", "res/drawable/a/icon.png"),
    ];
    let mut module = module(&["drawable"], &resources);
    let options = options(&[]);
    let mut rng = StdRng::seed_from_u64(7);
    let mut ctx = ConfuseContext::new(&options, &mut rng);

    let mut confuser = DirectoryConfuser::new(dictionary("a")).unwrap();
    let report = confuser.confuse(&mut module, &mut ctx).unwrap();

    // the first file's only candidate is taken by the second file
    assert_eq!(report.changes, 1);
    assert!(module.contains_file_path("res/drawable/icon.png"));
    assert!(module.contains_file_path("res/drawable/a/a/icon.png"));
    assert!(!module.contains_file_path("res/drawable/a/icon.png"));
}

#[test]
fn test_directory_confusion_respects_keep_types() {
    let mut module = module(SAMPLE_TYPES, SAMPLE_RESOURCES);
    let options = options(&["layout", "font"]);
    let mut rng = StdRng::seed_from_u64(2);
    let mut ctx = ConfuseContext::new(&options, &mut rng);

    let mut confuser = DirectoryConfuser::new(Dictionary::directory_names(None).unwrap()).unwrap();
    let report = confuser.confuse(&mut module, &mut ctx).unwrap();
    assert_eq!(report.changes, 3);

    assert!(module.contains_file_path("res/layout/main.xml"));
    assert!(module.contains_file_path("res/font/body.ttf"));
    for change in ctx.path_changes() {
        assert!(change.old.starts_with("res/drawable"));
        let parent = &change.old[..change.old.rfind('/').unwrap()];
        assert!(change.new.starts_with(&format!("{parent}/")), "{} left {parent}", change.new);
        assert_eq!(
            change.old.rsplit('/').next(),
            change.new.rsplit('/').next(),
            "base names survive a directory rename"
        );
        assert!(module.contains_file_path(&change.new));
    }

    // every view agrees on the new layout
    let files = module.list_res_files().unwrap();
    assert_eq!(files.len(), SAMPLE_RESOURCES.len());
    let unique: BTreeSet<&str> = module.entry_names().collect();
    assert_eq!(unique.len(), module.path_index().len());
    for file in &files {
        assert!(module.entry(file.path()).is_some(), "{} has no entry", file.path());
    }
}

#[test]
fn test_stored_entries_follow_their_rename() {
    let mut module = module(SAMPLE_TYPES, SAMPLE_RESOURCES);
    let options = options(&["font"]);
    let mut rng = StdRng::seed_from_u64(3);
    let mut ctx = ConfuseContext::new(&options, &mut rng);

    let mut confuser = DirectoryConfuser::new(dictionary("p\nq\nr\ns")).unwrap();
    confuser.confuse(&mut module, &mut ctx).unwrap();

    for change in ctx.path_changes() {
        let stored = change.new.ends_with(".png");
        assert_eq!(module.uncompressed_files().contains(&change.new), stored);
        assert!(!module.uncompressed_files().contains(&change.old));
    }
}

#[test]
fn test_file_names_keep_directory_and_extension() {
    let mut module = module(SAMPLE_TYPES, SAMPLE_RESOURCES);
    let options = options(&["font"]);
    let mut rng = StdRng::seed_from_u64(4);
    let mut ctx = ConfuseContext::new(&options, &mut rng);

    let mut confuser = FileNameConfuser::new(dictionary("x\ny\nz")).unwrap();
    let report = confuser.confuse(&mut module, &mut ctx).unwrap();
    assert_eq!(report.stage, Stage::FileName);
    assert_eq!(report.changes, 4);

    let renamed: Vec<(&str, &str)> = ctx
        .path_changes()
        .iter()
        .map(|change| (change.old.as_str(), change.new.as_str()))
        .collect();
    assert_eq!(
        renamed,
        vec![
            ("res/drawable/icon.png", "res/drawable/x.png"),
            ("res/drawable-hdpi/icon.png", "res/drawable-hdpi/y.png"),
            ("res/drawable/frame.9.png", "res/drawable/z.9.png"),
            ("res/layout/main.xml", "res/layout/x.xml"),
        ]
    );
    assert!(module.contains_file_path("res/font/body.ttf"));
}

#[test]
fn test_exhausted_dictionary_leaves_files_in_place() {
    let resources = [
        ("drawable", "res/drawable/icon.png"),
        ("drawable", "res/drawable/logo.png"),
    ];
    let mut module = module(&["drawable"], &resources);
    let options = options(&[]);
    let mut rng = StdRng::seed_from_u64(5);
    let mut ctx = ConfuseContext::new(&options, &mut rng);

    // the only token rebuilds a path that already exists
    let mut confuser = FileNameConfuser::new(dictionary("logo")).unwrap();
    let report = confuser.confuse(&mut module, &mut ctx).unwrap();

    assert_eq!(report.changes, 0);
    assert!(module.contains_file_path("res/drawable/icon.png"));
    assert!(module.contains_file_path("res/drawable/logo.png"));
}

#[test]
fn test_keep_all_types_moves_nothing() {
    let mut module = module(SAMPLE_TYPES, SAMPLE_RESOURCES);
    let options = options(&["all-types"]);
    let mut rng = StdRng::seed_from_u64(6);
    let mut ctx = ConfuseContext::new(&options, &mut rng);

    let mut directories = DirectoryConfuser::new(dictionary("a\nb")).unwrap();
    let mut files = FileNameConfuser::new(dictionary("c\nd")).unwrap();
    directories.confuse(&mut module, &mut ctx).unwrap();
    files.confuse(&mut module, &mut ctx).unwrap();
    assert!(ctx.path_changes().is_empty());
}

#[test]
fn test_directory_then_file_names_stay_unique() {
    init_tracing();
    let resources = [
        ("drawable", "res/drawable/icon.png"),
        ("drawable", "res/drawable/a/icon.png"),
        ("drawable", "res/drawable/logo.png"),
        ("layout", "res/layout/main.xml"),
        ("font", "res/font/body.ttf"),
    ];
    let types = ["drawable", "layout", "font"];
    let mut module = module(&types, &resources);
    let options = options(&["layout", "font"]);
    let mut rng = StdRng::seed_from_u64(8);
    let mut ctx = ConfuseContext::new(&options, &mut rng);

    let mut directories = DirectoryConfuser::new(dictionary("a")).unwrap();
    let report = directories.confuse(&mut module, &mut ctx).unwrap();
    assert_eq!(report.changes, 2);
    assert!(module.contains_file_path("res/drawable/icon.png"));

    // both tokens rebuild names already present in the drawable tree
    let mut files = FileNameConfuser::new(dictionary("icon\nlogo")).unwrap();
    files.confuse(&mut module, &mut ctx).unwrap();

    assert!(module.contains_file_path("res/layout/main.xml"));
    assert!(module.contains_file_path("res/font/body.ttf"));
    for change in ctx.path_changes() {
        assert!(change.old.starts_with("res/drawable/"), "kept type moved: {}", change.old);
        assert_ne!(change.old, change.new);
    }

    let names: Vec<&str> = module.entry_names().collect();
    let unique: BTreeSet<&str> = names.iter().copied().collect();
    assert_eq!(unique.len(), names.len(), "duplicate entry paths: {names:?}");
    assert_eq!(unique.len(), module.path_index().len());

    let res_files = module.list_res_files().unwrap();
    assert_eq!(res_files.len(), resources.len());
    let res_paths: BTreeSet<&str> = res_files.iter().map(|file| file.path()).collect();
    assert_eq!(res_paths.len(), resources.len());
    for path in res_paths {
        assert!(module.path_index().contains(path), "{path} has no entry");
    }
}
