//! video-pages - turn a recording of paper pages into PDF documents
//!
//! Command-line interface for the page extraction pipeline.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod commands;

use commands::probe::ProbeCommand;
use commands::process::ProcessCommand;

#[derive(Parser)]
#[command(
    name = "video-pages",
    version,
    about = "Extract document pages from a video of paper pages",
    long_about = "Samples sharp, well-exposed frames from a video (or a directory of page images),\n\
                  finds and rectifies the page in each frame, drops near-duplicate pages,\n\
                  recognizes their text and writes two PDFs:\n  \
                  - original.pdf: the page images\n  \
                  - digital.pdf: the recognized text",
    after_help = "EXAMPLES:\n  \
                  # Process a recording\n  \
                  video-pages process lecture.mp4 -o ./out\n\n  \
                  # A directory of photos, keeping the rectified pages\n  \
                  video-pages process ./photos -o ./out --keep-pages\n\n  \
                  # Inspect the sampling stride for a file\n  \
                  video-pages probe lecture.mp4\n\n  \
                  # Start a configuration file from the defaults\n  \
                  video-pages default-config > pages.yaml"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline and print the job result as JSON
    Process(ProcessCommand),

    /// Show the source kind, frame rate and sampling stride
    Probe(ProbeCommand),

    /// Print the default configuration as YAML
    DefaultConfig,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // stdout carries the JSON result, logs go to stderr
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match cli.command {
        Commands::Process(cmd) => {
            let success = cmd.execute()?;
            Ok(if success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Commands::Probe(cmd) => cmd.execute().map(|()| ExitCode::SUCCESS),
        Commands::DefaultConfig => commands::default_config::execute().map(|()| ExitCode::SUCCESS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_process_arguments() {
        let cli = Cli::try_parse_from([
            "video-pages",
            "process",
            "clip.mp4",
            "-o",
            "out",
            "--keep-pages",
            "--on-ocr-failure",
            "abort",
            "--threads",
            "2",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Process(_)));
    }

    #[test]
    fn test_rejects_unknown_policy() {
        assert!(Cli::try_parse_from(["video-pages", "process", "clip.mp4", "--on-ocr-failure", "retry"]).is_err());
    }
}
