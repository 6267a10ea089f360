//! Command-line interface for comic archive extraction.
//!
//! This CLI tool probes, lists, extracts and packs comic book archives
//! from the command line, driving the extraction engine the same way a
//! reader application would.

use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use tracing::info;

use cbx_unpack::{archive_info, list_entries, EntryOutcome, Extractor, Packer};

#[derive(Parser)]
#[command(name = "cbx")]
#[command(version, about = "Probe, list, extract and pack comic book archives", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe archive metadata
    Info {
        /// Archive file to probe
        archive: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the files inside an archive
    List {
        /// Archive file to list
        archive: PathBuf,
    },

    /// Extract an archive into a directory
    Extract {
        /// Archive file to extract
        archive: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },

    /// Pack images into a ZIP comic archive
    Pack {
        /// Page images, in reading order
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Output archive path
        #[arg(short, long)]
        out: PathBuf,

        /// Base name for generated page names, defaults to the output stem
        #[arg(short, long)]
        name: Option<String>,

        /// Extra files stored under their own names
        #[arg(short, long)]
        extra: Vec<PathBuf>,
    },
}

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Info { archive, json } => handle_info(archive, json),
        Commands::List { archive } => handle_list(archive),
        Commands::Extract { archive, out } => handle_extract(archive, out),
        Commands::Pack {
            images,
            out,
            name,
            extra,
        } => handle_pack(images, out, name, extra),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Filename pattern for files that count as comic pages.
fn page_filter() -> Result<Regex, regex::Error> {
    Regex::new(r"(?i)\.(jpe?g|png|gif|bmp|tiff?)$")
}

fn handle_info(archive: PathBuf, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let info = archive_info(&archive, &page_filter()?)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("Format: {}", info.kind);
        println!("Pages:  {}", info.pages);
        println!("Size:   {} bytes", info.size);
    }
    Ok(())
}

fn handle_list(archive: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    for name in list_entries(&archive)? {
        println!("{}", name);
    }
    Ok(())
}

fn handle_extract(archive: PathBuf, out: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = Extractor::setup(&archive, &out)?;
    let files = session.get_files();
    info!(entries = files.len(), kind = %session.kind(), "extracting");

    let stop_requested = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop_requested);
    ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))?;

    session.extract();
    let handle = session.wait_handle();

    let bar = ProgressBar::new(files.len() as u64);
    bar.set_style(ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")?);

    for name in &files {
        loop {
            if stop_requested.load(Ordering::Relaxed) {
                session.stop();
                bar.abandon_with_message("stopped");
                return Ok(());
            }
            if handle.wait_timeout(name, Duration::from_millis(200)) || handle.is_finished() {
                break;
            }
        }
        bar.inc(1);
    }
    bar.finish_with_message("done");

    let failed: Vec<&String> = files
        .iter()
        .filter(|name| matches!(session.entry_outcome(name), Some(EntryOutcome::Failed)))
        .collect();
    if !failed.is_empty() {
        eprintln!("{} entries could not be extracted:", failed.len());
        for name in failed {
            eprintln!("  {}", name);
        }
        return Err("extraction finished with failures".into());
    }
    Ok(())
}

fn handle_pack(
    images: Vec<PathBuf>,
    out: PathBuf,
    name: Option<String>,
    extra: Vec<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let base_name = match name {
        Some(name) => name,
        None => out
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive".to_string()),
    };
    let pages = images.len();

    let mut packer = Packer::new(images, extra, &out, base_name);
    packer.pack();
    if !packer.wait() {
        return Err(format!("failed to pack {}", out.display()).into());
    }
    println!("Packed {} pages into {}", pages, out.display());
    Ok(())
}
