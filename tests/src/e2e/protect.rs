use std::collections::BTreeSet;
use std::path::Path;
use veil_core::archive::Archive;
use veil_core::dex::{DexFile, NO_INDEX};
use veil_core::{ApkModule, Seed};
use veil_transform::protector::ProtectState;
use veil_transform::signer::{NoopSigner, SignOutcome};
use veil_transform::{Error, ProtectOutcome, ProtectReport, Protector, ProtectorOptions, Stage};
use veil_tests::{DEX_PATH, SAMPLE_RESOURCES, SAMPLE_TYPES, init_tracing, write_apk};

const SEED: &str = "0x00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";

fn options(input: &Path) -> ProtectorOptions {
    let mut options = ProtectorOptions::new(input);
    options.seed = Some(Seed::from_hex(SEED).unwrap());
    options.dex_level = 5;
    options
}

fn protect(options: ProtectorOptions) -> ProtectReport {
    match Protector::new(options)
        .with_signer(Box::new(NoopSigner))
        .run()
        .unwrap()
    {
        ProtectOutcome::Protected(report) => report,
        ProtectOutcome::AlreadyProtected { reason } => panic!("unexpected skip: {reason}"),
    }
}

#[test]
fn test_protect_writes_marked_package() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let input = write_apk(dir.path(), "app.apk", SAMPLE_TYPES, SAMPLE_RESOURCES);

    let report = protect(options(&input));
    assert_eq!(report.output, dir.path().join("app_protected.apk"));
    assert_eq!(report.state, ProtectState::Written);
    assert_eq!(report.seed, SEED);
    assert_eq!(report.sign, SignOutcome::Skipped);
    let stages: Vec<Stage> = report.stages.iter().map(|stage| stage.stage).collect();
    assert_eq!(stages, Stage::ALL.to_vec());

    let output = ApkModule::load(&report.output).unwrap();
    assert!(output.protection_status().is_protected());
    assert_eq!(output.manifest().leading_unknown_count(), 2);
    assert_eq!(output.path_index().len(), ApkModule::load(&input).unwrap().path_index().len());

    // fonts are kept by default
    assert!(output.contains_file_path("res/font/body.ttf"));
    assert!(!report.renames.is_empty());
    for file in output.list_res_files().unwrap() {
        assert!(output.entry(file.path()).is_some());
    }

    let dex = DexFile::read(output.entry(DEX_PATH).unwrap().data.clone()).unwrap();
    assert_eq!(dex.classes()[0].source_file_idx, NO_INDEX);
}

#[test]
fn test_second_run_reports_already_protected() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_apk(dir.path(), "app.apk", SAMPLE_TYPES, SAMPLE_RESOURCES);
    let first = protect(options(&input));

    let again = Protector::new(options(&first.output))
        .with_signer(Box::new(NoopSigner))
        .run()
        .unwrap();
    assert!(matches!(again, ProtectOutcome::AlreadyProtected { .. }));
    assert!(!dir.path().join("app_protected_protected.apk").exists());
}

#[test]
fn test_same_seed_same_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_apk(dir.path(), "app.apk", SAMPLE_TYPES, SAMPLE_RESOURCES);

    let mut first = options(&input);
    first.output = Some(dir.path().join("one.apk"));
    let mut second = options(&input);
    second.output = Some(dir.path().join("two.apk"));

    let one = protect(first);
    let two = protect(second);
    assert_eq!(one.renames, two.renames);
    assert_eq!(one.stages, two.stages);
    assert_eq!(
        Archive::open(&one.output).unwrap(),
        Archive::open(&two.output).unwrap()
    );
}

#[test]
fn test_zip_scrambling_keeps_content() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_apk(dir.path(), "app.apk", SAMPLE_TYPES, SAMPLE_RESOURCES);

    let mut plain = options(&input);
    plain.output = Some(dir.path().join("plain.apk"));
    let mut scrambled = options(&input);
    scrambled.output = Some(dir.path().join("scrambled.apk"));
    scrambled.confuse_zip = true;

    let plain = protect(plain);
    let scrambled = protect(scrambled);
    let content = |path: &Path| -> BTreeSet<(String, Vec<u8>)> {
        Archive::open(path)
            .unwrap()
            .entries()
            .iter()
            .map(|entry| (entry.name.clone(), entry.data.clone()))
            .collect()
    };
    assert_eq!(content(&plain.output), content(&scrambled.output));
}

#[test]
fn test_existing_output_needs_force() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_apk(dir.path(), "app.apk", SAMPLE_TYPES, SAMPLE_RESOURCES);
    let output = dir.path().join("app_protected.apk");
    std::fs::write(&output, b"stale").unwrap();

    let refused = Protector::new(options(&input)).run();
    assert!(matches!(refused, Err(Error::OutputExists(_))));
    assert_eq!(std::fs::read(&output).unwrap(), b"stale");

    let mut forced = options(&input);
    forced.force = true;
    let report = protect(forced);
    assert!(ApkModule::load(&report.output).is_ok());
}

#[test]
fn test_input_and_option_errors() {
    let dir = tempfile::tempdir().unwrap();
    let missing = Protector::new(options(&dir.path().join("missing.apk"))).run();
    assert!(matches!(missing, Err(Error::InputMissing(_))));

    let input = write_apk(dir.path(), "app.apk", SAMPLE_TYPES, SAMPLE_RESOURCES);
    let mut unsigned = options(&input);
    unsigned.sign.enabled = true;
    let refused = Protector::new(unsigned).run();
    assert!(matches!(refused, Err(Error::InvalidOptions(_))));

    let mut bad_dictionary = options(&input);
    bad_dictionary.dir_name_dictionary = Some(dir.path().join("nope.txt"));
    let refused = Protector::new(bad_dictionary).run();
    assert!(matches!(refused, Err(Error::DictionaryRead { .. })));
    assert!(!dir.path().join("app_protected.apk").exists());
}

#[test]
fn test_missing_signer_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_apk(dir.path(), "app.apk", SAMPLE_TYPES, SAMPLE_RESOURCES);
    let mut options = options(&input);
    options.sign.enabled = true;
    options.sign.keystore = Some(dir.path().join("release.jks"));
    options.sign.signer_jar = dir.path().join("missing-apksigner.jar");

    let ProtectOutcome::Protected(report) = Protector::new(options).run().unwrap() else {
        panic!("fresh input must be protected");
    };
    assert!(matches!(report.sign, SignOutcome::ToolUnavailable { .. }));
    assert_eq!(report.state, ProtectState::Written);
    assert!(report.output.exists());

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["sign"]["status"], "tool_unavailable");
    assert_eq!(json["stages"][0]["stage"], "manifest");
}
