pub mod apk;
pub mod archive;
pub mod chunk;
pub mod dex;
pub mod result;
pub mod seed;
pub mod string_pool;
pub mod table;
pub mod xml;

pub use apk::{ApkModule, PathIndex, ProtectionStatus, ResFile, UncompressedFiles};
pub use archive::{ArchiveEntry, EntryMethod};
pub use result::{Error, Result};
pub use seed::Seed;

/// Loads a package and reports whether a previous protection run marked it.
///
/// This is a convenience for callers that only need the check and not the
/// decoded package.
///
/// # Example
/// ```rust,ignore
/// match check_protection(Path::new("app.apk"))? {
///     ProtectionStatus::Protected { reason } => println!("protected: {reason}"),
///     ProtectionStatus::Clean => println!("clean"),
/// }
/// ```
pub fn check_protection(path: &std::path::Path) -> Result<ProtectionStatus> {
    let module = ApkModule::load(path)?;
    let status = module.protection_status();
    module.close();
    Ok(status)
}
