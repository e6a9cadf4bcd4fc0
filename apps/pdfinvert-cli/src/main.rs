//! pdfinvert binary
//!
//! Inverts the colors of a PDF while keeping text and vector art sharp.

use anyhow::Context;
use clap::Parser;
use pdfinvert_core::{invert_with_options, InputFile, InvertOptions};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "pdfinvert")]
#[command(about = "Invert colors in the provided document.")]
struct Args {
    /// The PDF file to invert
    #[arg(required_unless_present_any = ["version", "authors"])]
    input_file: Option<PathBuf>,

    /// The path for the output PDF file. If not provided, saved as '[input]_inverted.pdf'.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write streams uncompressed
    #[arg(long)]
    no_compress: bool,

    /// Print a JSON summary instead of the success message
    #[arg(long)]
    json: bool,

    /// Show the application's version and exit.
    #[arg(short = 'v', long)]
    version: bool,

    /// Show the application's authors and exit.
    #[arg(short, long)]
    authors: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if args.version {
        println!("pdfinvert {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }
    if args.authors {
        println!("{}", env!("CARGO_PKG_AUTHORS"));
        return ExitCode::SUCCESS;
    }

    // Progress goes to stderr so `--json` output stays clean.
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let input_path = args.input_file.context("no input file given")?;
    let input = InputFile::open(&input_path)?;

    let output = match args.output {
        Some(path) => absolute(&path)?,
        None => input.default_inverted_path(),
    };
    let options = InvertOptions {
        compress: !args.no_compress,
    };

    tracing::info!("Inverting '{}'", input.path().display());
    let summary = invert_with_options(input.content(), &output, &options)
        .with_context(|| format!("An error occurred while inverting '{}'", input.path().display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "Successfully created inverted PDF: '{}' ({} pages)",
            output.display(),
            summary.page_count
        );
    }
    Ok(())
}

fn absolute(path: &Path) -> anyhow::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("cannot determine current directory")?;
    Ok(cwd.join(path))
}
