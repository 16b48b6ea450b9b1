// Desktop/tooling crate: unwrap/expect/panic acceptable in non-embedded code.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod cargo;
mod check;
mod pack;
mod test;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "BMV31T001 updater development tasks", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the driver builds for the embedded target and the host
    Check,
    /// Run all tests (unit, integration, and doc)
    Test {
        /// Run only unit tests
        #[arg(long)]
        unit: bool,
        /// Run only integration tests
        #[arg(long)]
        integration: bool,
    },
    /// Turn an audio image into the framed update stream sent over the serial link
    PackAudio {
        /// Raw audio image to write into the module's flash
        #[arg(long)]
        input: std::path::PathBuf,
        /// Output file receiving the encoded frame stream
        #[arg(long)]
        output: std::path::PathBuf,
        /// Payload bytes per data frame (1..=255)
        #[arg(long, default_value_t = pack::DEFAULT_CHUNK)]
        chunk: u8,
        /// Skip the chip erase command after the SPI switch
        #[arg(long)]
        no_erase: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check => check::run(),
        Commands::Test { unit, integration } => test::run(unit, integration),
        Commands::PackAudio {
            input,
            output,
            chunk,
            no_erase,
        } => pack::run(&input, &output, chunk, !no_erase),
    }
}
