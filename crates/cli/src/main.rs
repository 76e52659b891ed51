use clap::Parser;
use veil_cli::commands::{Cmd, Command};

/// Veil CLI
///
/// Veil hardens Android application packages against static analysis and
/// repackaging tools: it confuses the binary manifest, resource paths,
/// resource type names and bytecode metadata while keeping the package
/// installable.
#[derive(Parser)]
#[command(name = "veil")]
#[command(about = "Veil: APK protector")]
struct Cli {
    /// Log at debug level.
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Cmd,
}

/// Runs the Veil CLI with the provided arguments.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(false)
        .without_time()
        .init();

    cli.command.execute()
}
