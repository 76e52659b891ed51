//! The protection pipeline.
//!
//! A run walks a fixed sequence of states:
//!
//! ```text
//! Loaded -> ManifestDone -> DirectoryDone -> FileNameDone -> TableDone
//!        -> DexDone -> Written -> Signed
//! ```
//!
//! A package that already carries protection marks stops at
//! `AlreadyProtected` right after loading, before anything is mutated.

use crate::confuser::{ConfuseContext, Confuser, PathChange, StageReport};
use crate::dex::DexConfuser;
use crate::dictionary::Dictionary;
use crate::directory::DirectoryConfuser;
use crate::file_name::FileNameConfuser;
use crate::manifest::ManifestConfuser;
use crate::options::ProtectorOptions;
use crate::signer::{ApkSignerTool, SignOutcome, Signer};
use crate::table::TableConfuser;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};
use veil_core::{ApkModule, ProtectionStatus, Seed};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectState {
    Loaded,
    ManifestDone,
    DirectoryDone,
    FileNameDone,
    TableDone,
    DexDone,
    Written,
    Signed,
    AlreadyProtected,
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectReport {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Hex seed that reproduces this run.
    pub seed: String,
    pub state: ProtectState,
    pub stages: Vec<StageReport>,
    pub renames: Vec<PathChange>,
    pub sign: SignOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtectOutcome {
    /// The input was left alone because a previous run already protected it.
    AlreadyProtected { reason: String },
    Protected(ProtectReport),
}

/// Runs the five confusers over one package and writes the result.
#[derive(Debug)]
pub struct Protector {
    options: ProtectorOptions,
    signer: Box<dyn Signer>,
    dex: DexConfuser,
}

impl Protector {
    pub fn new(options: ProtectorOptions) -> Self {
        Self {
            options,
            signer: Box::new(ApkSignerTool::default()),
            dex: DexConfuser::default(),
        }
    }

    pub fn with_signer(mut self, signer: Box<dyn Signer>) -> Self {
        self.signer = signer;
        self
    }

    pub fn with_dex_confuser(mut self, dex: DexConfuser) -> Self {
        self.dex = dex;
        self
    }

    pub fn options(&self) -> &ProtectorOptions {
        &self.options
    }

    pub fn run(mut self) -> Result<ProtectOutcome> {
        self.options.validate()?;
        let options = &self.options;
        let output = options.output_path();

        // input-level failures surface before anything is touched
        let mut directory =
            DirectoryConfuser::new(Dictionary::directory_names(options.dir_name_dictionary.as_deref())?)?;
        let mut file_name =
            FileNameConfuser::new(Dictionary::file_names(options.file_name_dictionary.as_deref())?)?;

        if output.exists() {
            debug!("removing previous output {}", output.display());
            std::fs::remove_file(&output)?;
        }

        let mut module = ApkModule::load(&options.input)?;
        let mut state = ProtectState::Loaded;

        if let ProtectionStatus::Protected { reason } = module.protection_status() {
            info!("{}", options.input.display());
            info!("{reason}");
            module.close();
            advance(&mut state, ProtectState::AlreadyProtected);
            return Ok(ProtectOutcome::AlreadyProtected { reason });
        }

        let seed = options.seed.clone().unwrap_or_else(Seed::generate);
        info!("seed {}", seed.to_hex());
        let mut rng = seed.create_deterministic_rng();
        let mut ctx = ConfuseContext::new(options, &mut rng);

        let mut stages = Vec::with_capacity(5);
        stages.push(ManifestConfuser.confuse(&mut module, &mut ctx)?);
        advance(&mut state, ProtectState::ManifestDone);
        stages.push(directory.confuse(&mut module, &mut ctx)?);
        advance(&mut state, ProtectState::DirectoryDone);
        stages.push(file_name.confuse(&mut module, &mut ctx)?);
        advance(&mut state, ProtectState::FileNameDone);
        stages.push(TableConfuser.confuse(&mut module, &mut ctx)?);
        advance(&mut state, ProtectState::TableDone);
        stages.push(self.dex.confuse(&mut module, &mut ctx)?);
        advance(&mut state, ProtectState::DexDone);

        let renames = ctx.into_path_changes();
        if module.has_table() {
            module.table_mut()?.refresh()?;
        }

        info!("Writing apk ...");
        if options.confuse_zip {
            info!("Confusing zip structure ...");
            module.write_apk_scrambled(&output, &mut rng)?;
        } else {
            module.write_apk(&output)?;
        }
        module.close();
        advance(&mut state, ProtectState::Written);
        info!("Saved to: {}", output.display());

        let sign = if options.sign.enabled {
            self.signer.sign(&output, &options.sign)
        } else {
            SignOutcome::Skipped
        };
        if matches!(sign, SignOutcome::Signed { .. }) {
            advance(&mut state, ProtectState::Signed);
        }

        Ok(ProtectOutcome::Protected(ProtectReport {
            input: options.input.clone(),
            output,
            seed: seed.to_hex(),
            state,
            stages,
            renames,
            sign,
        }))
    }
}

fn advance(state: &mut ProtectState, next: ProtectState) {
    debug!("state {:?} -> {:?}", state, next);
    *state = next;
}
