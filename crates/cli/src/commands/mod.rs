use clap::Subcommand;

pub mod check;
pub mod protect;

use thiserror::Error;

/// Errors raised while turning arguments into protector options.
#[derive(Debug, Error)]
pub enum ProtectError {
    /// Neither the command line nor the config file named an input.
    #[error("no input package given")]
    MissingInput,
    /// The seed is not 64 hex characters.
    #[error("invalid seed: {0}")]
    Seed(#[from] veil_core::Error),
    /// The config file could not be loaded.
    #[error("invalid options: {0}")]
    Options(#[from] veil_transform::Error),
}

/// CLI subcommands for Veil.
#[derive(Subcommand)]
pub enum Cmd {
    /// Protect a package against static analysis and repackaging tools.
    Protect(protect::ProtectArgs),
    /// Report whether a package was already protected.
    Check(check::CheckArgs),
}

/// Trait for executing CLI subcommands.
pub trait Command {
    /// Executes the subcommand.
    ///
    /// # Returns
    /// A `Result` indicating success or an error if execution fails.
    fn execute(self) -> Result<(), Box<dyn std::error::Error>>;
}

impl Command for Cmd {
    fn execute(self) -> Result<(), Box<dyn std::error::Error>> {
        match self {
            Cmd::Protect(args) => args.execute(),
            Cmd::Check(args) => args.execute(),
        }
    }
}
