use rand::SeedableRng;
use rand::rngs::StdRng;
use veil_core::ApkModule;
use veil_core::dex::{DexFile, NO_INDEX};
use veil_transform::dex::{DexConfuser, SourceFileStripper};
use veil_transform::{ConfuseContext, Confuser, ProtectorOptions, StageReport};
use veil_tests::{
    DEX_PATH, SAMPLE_RESOURCES, SAMPLE_TYPES, dex, entries, init_tracing, module, proto_parameters,
};

fn run(module: &mut ApkModule, confuser: &mut DexConfuser, level: u32) -> StageReport {
    let mut options = ProtectorOptions::new("app.apk");
    options.dex_level = level;
    let mut rng = StdRng::seed_from_u64(11);
    let mut ctx = ConfuseContext::new(&options, &mut rng);
    confuser.confuse(module, &mut ctx).unwrap()
}

fn container(module: &ApkModule) -> DexFile {
    DexFile::read(module.entry(DEX_PATH).unwrap().data.clone()).unwrap()
}

#[test]
fn test_level_zero_leaves_bytecode_alone() {
    init_tracing();
    let mut module = module(SAMPLE_TYPES, SAMPLE_RESOURCES);
    let report = run(&mut module, &mut DexConfuser::default(), 0);

    assert!(report.skipped);
    assert_eq!(report.changes, 0);
    assert_eq!(module.entry(DEX_PATH).unwrap().data, dex());
}

#[test]
fn test_full_level_rewrites_container() {
    init_tracing();
    let mut module = module(SAMPLE_TYPES, SAMPLE_RESOURCES);
    let report = run(&mut module, &mut DexConfuser::default(), 5);

    assert!(!report.skipped);
    assert_eq!(report.changes, 1);
    assert_eq!(report.tasks.len(), 2);
    for task in &report.tasks {
        assert!(task.sites > 0, "{} touched nothing", task.task);
    }

    let rewritten = container(&module);
    let class = &rewritten.classes()[0];
    assert_eq!(class.source_file_idx, NO_INDEX);
    assert_eq!(class.code_items[0].debug_info_off, 0);
    assert_eq!(rewritten.declared_size(), rewritten.as_bytes().len());

    // checksum and signature are already current
    let mut resealed = rewritten.clone();
    resealed.refresh_full().unwrap();
    assert_eq!(resealed.as_bytes(), rewritten.as_bytes());
    assert_ne!(rewritten.as_bytes(), dex().as_slice());
}

#[test]
fn test_level_one_only_strips_source_names() {
    let mut module = module(SAMPLE_TYPES, SAMPLE_RESOURCES);
    let report = run(&mut module, &mut DexConfuser::default(), 1);

    assert_eq!(report.changes, 1);
    let names: Vec<&str> = report.tasks.iter().map(|task| task.task.as_str()).collect();
    assert_eq!(names, vec!["SourceFileStripper"]);

    let rewritten = container(&module);
    let class = &rewritten.classes()[0];
    assert_eq!(class.source_file_idx, NO_INDEX);
    assert_eq!(class.code_items[0].debug_info_off, 0x1234);
}

#[test]
fn test_shared_type_list_survives_every_level() {
    init_tracing();
    let (list_off, before) = proto_parameters(&dex());
    for level in 1..=5 {
        let mut module = module(SAMPLE_TYPES, SAMPLE_RESOURCES);
        run(&mut module, &mut DexConfuser::default(), level);

        let rewritten = module.entry(DEX_PATH).unwrap().data.clone();
        let (after_off, after) = proto_parameters(&rewritten);
        assert_eq!(after_off, list_off, "level {level} moved the type_list");
        assert_eq!(after, before, "level {level} rewrote the shared type_list");
    }
}

#[test]
fn test_unchanged_container_is_not_rewritten() {
    let mut module = module(SAMPLE_TYPES, SAMPLE_RESOURCES);
    let mut confuser = DexConfuser::with_tasks(vec![Box::new(SourceFileStripper::default())]);
    run(&mut module, &mut confuser, 1);
    let once = module.entry(DEX_PATH).unwrap().data.clone();

    // nothing left to strip on a second pass
    let report = run(&mut module, &mut confuser, 1);
    assert_eq!(report.changes, 0);
    assert_eq!(module.entry(DEX_PATH).unwrap().data, once);
}

#[test]
fn test_package_without_bytecode_is_skipped() {
    let without_dex: Vec<_> = entries(SAMPLE_TYPES, SAMPLE_RESOURCES)
        .into_iter()
        .filter(|entry| entry.name != DEX_PATH)
        .collect();
    let mut module = ApkModule::from_entries(without_dex).unwrap();
    let report = run(&mut module, &mut DexConfuser::default(), 5);
    assert!(report.skipped);
    assert!(module.list_dex_files().is_empty());
}
