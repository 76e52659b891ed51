//! Module for the `check` subcommand, which reports whether a package already
//! carries the marks of a protection run.

use clap::Args;
use std::error::Error;
use std::path::PathBuf;
use veil_core::{ProtectionStatus, check_protection};

/// Arguments for the `check` subcommand.
#[derive(Args)]
pub struct CheckArgs {
    /// Package to inspect.
    pub input: PathBuf,
}

impl super::Command for CheckArgs {
    fn execute(self) -> Result<(), Box<dyn Error>> {
        match check_protection(&self.input)? {
            ProtectionStatus::Protected { reason } => {
                println!("{}: protected ({reason})", self.input.display());
            }
            ProtectionStatus::Clean => println!("{}: not protected", self.input.display()),
        }
        Ok(())
    }
}
