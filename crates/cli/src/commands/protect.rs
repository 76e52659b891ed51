//! Module for the `protect` subcommand, which runs the confusion pipeline from
//! `veil-transform` over a package and writes the protected copy.

use crate::commands::ProtectError;
use clap::Args;
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use veil_core::seed::Seed;
use veil_transform::protector::{ProtectOutcome, Protector};
use veil_transform::ProtectorOptions;

/// Arguments for the `protect` subcommand.
///
/// Flags override values loaded with `--config`.
#[derive(Args)]
pub struct ProtectArgs {
    /// Input package (.apk).
    pub input: Option<PathBuf>,
    /// Output package, defaults to `<input>_protected.apk`.
    #[arg(long, short)]
    output: Option<PathBuf>,
    /// Overwrite an existing output.
    #[arg(long, short)]
    force: bool,
    /// JSON file with protector options.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Leave AndroidManifest.xml untouched.
    #[arg(long)]
    skip_manifest: bool,
    /// Shuffle the physical order of archive entries.
    #[arg(long)]
    confuse_zip: bool,
    /// Resource type to leave untouched (repeatable, `all-types` keeps all).
    #[arg(long = "keep-type", value_name = "TYPE")]
    keep_types: Vec<String>,
    /// Newline-separated directory name dictionary.
    #[arg(long, value_name = "PATH")]
    dic_dir_names: Option<PathBuf>,
    /// Newline-separated file name dictionary.
    #[arg(long, value_name = "PATH")]
    dic_file_names: Option<PathBuf>,
    /// Bytecode confusion level (0 disables).
    #[arg(long)]
    dex_level: Option<u32>,
    /// Hex seed for a reproducible run.
    #[arg(long)]
    seed: Option<String>,
    /// Sign the output with apksigner.
    #[arg(long)]
    sign: bool,
    /// Path to apksigner.jar.
    #[arg(long, value_name = "PATH")]
    signer_jar: Option<PathBuf>,
    /// Keystore used for signing.
    #[arg(long, value_name = "PATH")]
    keystore: Option<PathBuf>,
    /// Keystore password.
    #[arg(long)]
    ks_pass: Option<String>,
    /// Key password.
    #[arg(long)]
    key_pass: Option<String>,
    /// Key alias.
    #[arg(long)]
    key_alias: Option<String>,
    /// Path to emit the run report as JSON.
    #[arg(long, value_name = "PATH")]
    emit: Option<PathBuf>,
}

impl ProtectArgs {
    /// Merges the config file (if any) with command line flags.
    pub fn into_options(self) -> Result<(ProtectorOptions, Option<PathBuf>), ProtectError> {
        let mut options = match &self.config {
            Some(path) => ProtectorOptions::from_json_file(path)?,
            None => ProtectorOptions::default(),
        };

        if let Some(input) = self.input {
            options.input = input;
        }
        if options.input.as_os_str().is_empty() {
            return Err(ProtectError::MissingInput);
        }
        if self.output.is_some() {
            options.output = self.output;
        }
        options.force |= self.force;
        options.skip_manifest |= self.skip_manifest;
        options.confuse_zip |= self.confuse_zip;
        for keep in self.keep_types {
            options.keep_types.insert(keep);
        }
        if self.dic_dir_names.is_some() {
            options.dir_name_dictionary = self.dic_dir_names;
        }
        if self.dic_file_names.is_some() {
            options.file_name_dictionary = self.dic_file_names;
        }
        if let Some(level) = self.dex_level {
            options.dex_level = level;
        }
        if let Some(seed) = self.seed {
            options.seed = Some(Seed::from_hex(&seed)?);
        }

        let sign = &mut options.sign;
        sign.enabled |= self.sign;
        if let Some(jar) = self.signer_jar {
            sign.signer_jar = jar;
        }
        if self.keystore.is_some() {
            sign.keystore = self.keystore;
        }
        if self.ks_pass.is_some() {
            sign.keystore_password = self.ks_pass;
        }
        if self.key_pass.is_some() {
            sign.key_password = self.key_pass;
        }
        if self.key_alias.is_some() {
            sign.key_alias = self.key_alias;
        }

        Ok((options, self.emit))
    }
}

/// Executes the `protect` subcommand.
impl super::Command for ProtectArgs {
    fn execute(self) -> Result<(), Box<dyn Error>> {
        let (options, emit) = self.into_options()?;

        match Protector::new(options).run()? {
            ProtectOutcome::AlreadyProtected { reason } => {
                println!("Already protected: {reason}");
            }
            ProtectOutcome::Protected(report) => {
                if let Some(path) = emit.as_ref() {
                    fs::write(path, serde_json::to_string_pretty(&report)?)?;
                    println!("Wrote protect report to {}", path.display());
                }
                println!("{}", report.output.display());
            }
        }
        Ok(())
    }
}
