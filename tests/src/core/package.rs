use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::BTreeSet;
use veil_core::apk::{PROTECTOR_SIGNATURE, SIGNATURE_FIELD_LEN, TABLE_PATH};
use veil_core::archive::Archive;
use veil_core::table::{UnknownChunk, fixed_length_string};
use veil_core::{ApkModule, ArchiveEntry, EntryMethod, Error, ProtectionStatus, check_protection};
use veil_tests::{DEX_PATH, SAMPLE_RESOURCES, SAMPLE_TYPES, init_tracing, module, write_apk};

#[test]
fn test_load_indexes_package() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = write_apk(dir.path(), "app.apk", SAMPLE_TYPES, SAMPLE_RESOURCES);

    let module = ApkModule::load(&path).unwrap();
    assert_eq!(module.source(), Some(path.as_path()));
    assert!(module.has_table());
    assert_eq!(module.path_index().len(), 3 + SAMPLE_RESOURCES.len());
    assert!(module.contains_file_path("res/drawable/frame.9.png"));
    assert!(module.uncompressed_files().contains("res/drawable/icon.png"));
    assert!(module.uncompressed_files().contains(TABLE_PATH));
    assert!(!module.uncompressed_files().contains("res/layout/main.xml"));
    assert_eq!(module.list_dex_files(), vec![DEX_PATH.to_string()]);

    let files = module.list_res_files().unwrap();
    let listed: Vec<(&str, Option<&str>)> = files
        .iter()
        .map(|file| (file.path(), file.pick_one_type()))
        .collect();
    assert_eq!(
        listed,
        vec![
            ("res/drawable/icon.png", Some("drawable")),
            ("res/drawable-hdpi/icon.png", Some("drawable")),
            ("res/drawable/frame.9.png", Some("drawable")),
            ("res/layout/main.xml", Some("layout")),
            ("res/font/body.ttf", Some("font")),
        ]
    );
}

#[test]
fn test_write_then_load_keeps_content() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_apk(dir.path(), "app.apk", SAMPLE_TYPES, SAMPLE_RESOURCES);
    let out = dir.path().join("copy.apk");

    let mut module = ApkModule::load(&path).unwrap();
    module.write_apk(&out).unwrap();
    let reloaded = ApkModule::load(&out).unwrap();

    assert_eq!(reloaded.manifest(), module.manifest());
    assert_eq!(reloaded.table().unwrap(), module.table().unwrap());
    assert_eq!(
        Archive::open(&out).unwrap(),
        Archive::open(&path).unwrap(),
        "an untouched package must survive a write unchanged"
    );
}

#[test]
fn test_scrambled_write_keeps_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_apk(dir.path(), "app.apk", SAMPLE_TYPES, SAMPLE_RESOURCES);
    let out = dir.path().join("scrambled.apk");

    let mut module = ApkModule::load(&path).unwrap();
    let mut rng = StdRng::seed_from_u64(7);
    module.write_apk_scrambled(&out, &mut rng).unwrap();

    let original = Archive::open(&path).unwrap();
    let scrambled = Archive::open(&out).unwrap();
    let as_set = |archive: &Archive| -> BTreeSet<(String, Vec<u8>, bool)> {
        archive
            .entries()
            .iter()
            .map(|e| (e.name.clone(), e.data.clone(), e.method == EntryMethod::Stored))
            .collect()
    };
    assert_eq!(as_set(&scrambled), as_set(&original));
}

#[test]
fn test_protection_marks() {
    let mut clean = module(SAMPLE_TYPES, SAMPLE_RESOURCES);
    assert_eq!(clean.protection_status(), ProtectionStatus::Clean);

    clean.manifest_mut().insert_unknown(0, vec![0; 8]);
    assert!(clean.protection_status().is_protected());

    let mut attributed = module(SAMPLE_TYPES, SAMPLE_RESOURCES);
    let table = attributed.table_mut().unwrap();
    table.set_first_placeholder(UnknownChunk::new(
        fixed_length_string(PROTECTOR_SIGNATURE, SIGNATURE_FIELD_LEN),
        Vec::new(),
    ));
    table.refresh().unwrap();
    assert!(matches!(
        attributed.protection_status(),
        ProtectionStatus::Protected { reason } if reason.contains(PROTECTOR_SIGNATURE)
    ));

    // an unrelated placeholder is not a mark
    let mut foreign = module(SAMPLE_TYPES, SAMPLE_RESOURCES);
    foreign
        .table_mut()
        .unwrap()
        .set_first_placeholder(UnknownChunk::new(fixed_length_string("other", 64), Vec::new()));
    assert_eq!(foreign.protection_status(), ProtectionStatus::Clean);
}

#[test]
fn test_check_protection_reads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_apk(dir.path(), "app.apk", SAMPLE_TYPES, SAMPLE_RESOURCES);
    assert_eq!(check_protection(&path).unwrap(), ProtectionStatus::Clean);

    let missing = dir.path().join("missing.apk");
    assert!(matches!(check_protection(&missing), Err(Error::FileRead { .. })));
}

#[test]
fn test_res_file_move_updates_every_view() {
    let mut module = module(SAMPLE_TYPES, SAMPLE_RESOURCES);
    let mut files = module.list_res_files().unwrap();
    let icon = &mut files[0];

    module.set_res_file_path(icon, "res/x/icon.png").unwrap();
    assert_eq!(icon.path(), "res/x/icon.png");
    assert!(module.contains_file_path("res/x/icon.png"));
    assert!(!module.contains_file_path("res/drawable/icon.png"));
    assert!(module.entry("res/x/icon.png").is_some());
    assert!(
        module
            .table()
            .unwrap()
            .string_pool
            .iter()
            .any(|value| value == "res/x/icon.png")
    );

    let layout = &mut files[3];
    assert!(matches!(
        module.set_res_file_path(layout, "res/x/icon.png"),
        Err(Error::PathCollision(_))
    ));
    assert_eq!(layout.path(), "res/layout/main.xml");
}

#[test]
fn test_missing_manifest_is_rejected() {
    let entries = vec![ArchiveEntry::new(DEX_PATH, vec![0; 4], EntryMethod::Deflated)];
    assert!(matches!(
        ApkModule::from_entries(entries),
        Err(Error::MissingManifest)
    ));
}
