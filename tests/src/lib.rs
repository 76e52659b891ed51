//! Synthetic packages shared by the integration tests.
//!
//! Everything here is built from scratch with the `veil-core` codecs, so the
//! suites never depend on a real APK on disk.

use std::path::{Path, PathBuf};
use veil_core::apk::{MANIFEST_PATH, TABLE_PATH};
use veil_core::archive::Archive;
use veil_core::chunk::{align_to_four, get_u32, put_u32, write_u16, write_u32};
use veil_core::dex::write_uleb128;
use veil_core::string_pool::StringPool;
use veil_core::table::{ResourceTable, TablePackage};
use veil_core::xml::{NO_REF, XmlAttribute, XmlDocument, XmlElement, XmlNamespace, XmlNode};
use veil_core::{ApkModule, ArchiveEntry, EntryMethod};

pub const DEX_PATH: &str = "classes.dex";

/// Installs the same plain-text subscriber the CLI uses. Safe to call from
/// every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .without_time()
        .try_init();
}

/// `<manifest><application android:debuggable="true"/><uses-permission/></manifest>`
/// inside an `android` namespace.
pub fn manifest() -> XmlDocument {
    let mut pool = StringPool::new(false);
    let android = pool.append("android");
    let uri = pool.append("http://schemas.android.com/apk/res/android");
    let manifest = pool.append("manifest");
    let application = pool.append("application");
    let permission = pool.append("uses-permission");
    let debuggable = pool.append("debuggable");

    let namespace = XmlNamespace {
        line: 1,
        comment: NO_REF,
        prefix: android,
        uri,
    };
    let mut root = XmlElement::new(manifest);
    let mut app = XmlElement::new(application);
    app.push_attribute(XmlAttribute::boolean(debuggable, true));
    root.children.push(XmlNode::Element(app));
    root.children.push(XmlNode::Element(XmlElement::new(permission)));

    let mut doc = XmlDocument::new(pool);
    doc.nodes.push(XmlNode::StartNamespace(namespace.clone()));
    doc.nodes.push(XmlNode::Element(root));
    doc.nodes.push(XmlNode::EndNamespace(namespace));
    doc
}

/// A single-package table declaring `types` (ids follow slice order) with
/// one string value per `(type, path)` resource.
///
/// Resource types missing from `types` are appended after it.
pub fn table(types: &[&str], resources: &[(&str, &str)]) -> ResourceTable {
    let mut type_names: Vec<&str> = types.to_vec();
    for (type_name, _) in resources {
        if !type_names.contains(type_name) {
            type_names.push(type_name);
        }
    }

    let mut pool = StringPool::new(true);
    let mut package = TablePackage::new(0x7f, "com.example.app");
    for name in &type_names {
        package.type_strings.append(*name);
    }

    for (index, type_name) in type_names.iter().enumerate() {
        let mut entries = Vec::new();
        for (key, (_, path)) in resources
            .iter()
            .enumerate()
            .filter(|(_, (owner, _))| owner == type_name)
        {
            let key = package.key_strings.append(format!("res_{key}"));
            let value = pool.index_of(path).unwrap_or_else(|| pool.append(*path));
            entries.push((key, value));
        }
        if !entries.is_empty() {
            package
                .push_string_type(index as u8 + 1, &entries)
                .expect("fixture table type");
        }
    }

    let mut table = ResourceTable::new(pool);
    table.push_package(package);
    table
}

/// One class `LFoo;` from `Foo.java` implementing `LBar;` and `LBaz;`, with a
/// single method whose code item carries debug info.
///
/// The interface `type_list` is shared with the parameters of the only
/// prototype, `(LBar;LBaz;)V`, the way `dx` deduplicates identical lists.
pub fn dex() -> Vec<u8> {
    const HEADER_SIZE: usize = 0x70;
    const CLASS_DEF_SIZE: usize = 32;
    const PROTO_ID_SIZE: usize = 12;
    let strings = ["LBar;", "LBaz;", "LFoo;", "Foo.java", "V", "VLL"];
    let types = [0u32, 1, 2, 4];
    let string_ids_off = HEADER_SIZE;
    let type_ids_off = string_ids_off + strings.len() * 4;
    let proto_ids_off = type_ids_off + types.len() * 4;
    let class_defs_off = proto_ids_off + PROTO_ID_SIZE;

    let mut data = vec![0u8; class_defs_off + CLASS_DEF_SIZE];
    let mut string_offsets = Vec::new();
    for s in strings {
        string_offsets.push(data.len() as u32);
        write_uleb128(&mut data, s.len() as u32);
        data.extend_from_slice(s.as_bytes());
        data.push(0);
    }
    align_to_four(&mut data);

    let type_list_off = data.len();
    write_u32(&mut data, 2);
    write_u16(&mut data, 0);
    write_u16(&mut data, 1);
    align_to_four(&mut data);

    let code_off = data.len();
    for half in [1u16, 1, 0, 0] {
        write_u16(&mut data, half);
    }
    write_u32(&mut data, 0x1234);
    write_u32(&mut data, 1);
    write_u16(&mut data, 0x000e);
    write_u16(&mut data, 0);

    let class_data_off = data.len();
    for value in [0, 0, 1, 0, 0, 0x10001, code_off as u32] {
        write_uleb128(&mut data, value);
    }
    align_to_four(&mut data);

    data[..8].copy_from_slice(b"dex\n035\0");
    let file_size = data.len() as u32;
    put_u32(&mut data, 32, file_size);
    put_u32(&mut data, 36, HEADER_SIZE as u32);
    put_u32(&mut data, 56, strings.len() as u32);
    put_u32(&mut data, 60, string_ids_off as u32);
    put_u32(&mut data, 64, types.len() as u32);
    put_u32(&mut data, 68, type_ids_off as u32);
    put_u32(&mut data, 72, 1);
    put_u32(&mut data, 76, proto_ids_off as u32);
    put_u32(&mut data, 96, 1);
    put_u32(&mut data, 100, class_defs_off as u32);
    for (i, offset) in string_offsets.iter().enumerate() {
        put_u32(&mut data, string_ids_off + i * 4, *offset);
    }
    for (i, descriptor) in types.iter().enumerate() {
        put_u32(&mut data, type_ids_off + i * 4, *descriptor);
    }
    put_u32(&mut data, proto_ids_off, 5);
    put_u32(&mut data, proto_ids_off + 4, 3);
    put_u32(&mut data, proto_ids_off + 8, type_list_off as u32);
    put_u32(&mut data, class_defs_off, 2);
    put_u32(&mut data, class_defs_off + 12, type_list_off as u32);
    put_u32(&mut data, class_defs_off + 16, 3);
    put_u32(&mut data, class_defs_off + 24, class_data_off as u32);
    data
}

/// Offset and bytes of the `type_list` the fixture's prototype points at.
pub fn proto_parameters(dex: &[u8]) -> (usize, Vec<u8>) {
    let proto_ids_off = get_u32(dex, 76) as usize;
    let list = get_u32(dex, proto_ids_off + 8) as usize;
    let count = get_u32(dex, list) as usize;
    (list, dex[list..list + 4 + count * 2].to_vec())
}

/// Archive entries of a package holding the fixture manifest, a table over
/// `resources`, one bytecode container and a file per resource.
///
/// `.png` and `.so` files are stored, everything else deflated.
pub fn entries(types: &[&str], resources: &[(&str, &str)]) -> Vec<ArchiveEntry> {
    let mut entries = vec![
        ArchiveEntry::new(
            MANIFEST_PATH,
            manifest().to_bytes().expect("fixture manifest"),
            EntryMethod::Deflated,
        ),
        ArchiveEntry::new(
            TABLE_PATH,
            table(types, resources).to_bytes().expect("fixture table"),
            EntryMethod::Stored,
        ),
        ArchiveEntry::new(DEX_PATH, dex(), EntryMethod::Deflated),
    ];
    for (index, (_, path)) in resources.iter().enumerate() {
        if entries.iter().any(|entry| entry.name == *path) {
            continue;
        }
        let method = if path.ends_with(".png") || path.ends_with(".so") {
            EntryMethod::Stored
        } else {
            EntryMethod::Deflated
        };
        entries.push(ArchiveEntry::new(*path, vec![index as u8; 48], method));
    }
    entries
}

pub fn module(types: &[&str], resources: &[(&str, &str)]) -> ApkModule {
    ApkModule::from_entries(entries(types, resources)).expect("fixture module")
}

/// Writes the fixture package to `dir/name` and returns its path.
pub fn write_apk(dir: &Path, name: &str, types: &[&str], resources: &[(&str, &str)]) -> PathBuf {
    let path = dir.join(name);
    let bytes = Archive::from_entries(entries(types, resources))
        .to_bytes(|entry| entry.method == EntryMethod::Stored)
        .expect("fixture archive");
    std::fs::write(&path, bytes).expect("fixture write");
    path
}

/// A small package touching every stage: three drawables (one nine-patch),
/// a layout, a font and a style-typed value.
pub const SAMPLE_TYPES: &[&str] = &["attr", "drawable", "layout", "font", "style"];
pub const SAMPLE_RESOURCES: &[(&str, &str)] = &[
    ("drawable", "res/drawable/icon.png"),
    ("drawable", "res/drawable-hdpi/icon.png"),
    ("drawable", "res/drawable/frame.9.png"),
    ("layout", "res/layout/main.xml"),
    ("font", "res/font/body.ttf"),
];
