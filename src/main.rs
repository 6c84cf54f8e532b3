//! Main entry point for the netzip CLI application.
//!
//! This binary extracts files from remote ZIP archives addressed by HTTP
//! URL, fetching only the byte ranges each entry occupies.

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;

use netzip::{BodyRetriever, Cli, CodecRegistry, DirectoryParser, HttpRangeFetcher, ZipEntry};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let fetcher = Arc::new(HttpRangeFetcher::new(cli.url.clone()).await?);
    let transferred_before = fetcher.transferred_bytes();

    let index = DirectoryParser::new(Arc::clone(&fetcher)).read_index().await?;

    // List mode: display archive contents and exit.
    if cli.list || cli.verbose {
        list_files(&index.entries, cli.verbose);
        return Ok(());
    }

    tokio::fs::create_dir_all(&cli.dest).await?;

    let retriever = BodyRetriever::new(Arc::clone(&fetcher), CodecRegistry::new())
        .partitions(cli.partitions)
        .workers(cli.workers)
        .flatten(cli.junk_paths);

    let results = retriever
        .retrieve_all(&index.entries, Path::new(&cli.dest))
        .await;

    // Report every outcome; the exit status carries the first failure.
    let mut first_error = None;
    for result in results {
        match result {
            Ok(entry) => {
                if !cli.is_quiet() && !entry.is_directory() {
                    println!("  extracted: {}", entry.name);
                }
            }
            Err(e) => {
                eprintln!("error: {e}");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    if !cli.is_quiet() {
        let transferred = fetcher.transferred_bytes() - transferred_before;
        eprintln!("\nTotal bytes transferred: {}", format_size(transferred));
    }

    match first_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

/// List files in the ZIP archive.
///
/// Supports two output formats:
/// - Simple format (`-l`): just file names, one per line
/// - Verbose format (`-v`): table with sizes, compression ratio, and
///   timestamps
fn list_files(entries: &[ZipEntry], verbose: bool) {
    if !verbose {
        for entry in entries {
            println!("{}", entry.name);
        }
        return;
    }

    println!(
        "{:>10}  {:>10}  {:>5}  {:>10}  {:>5}  Name",
        "Length", "Size", "Cmpr", "Date", "Time"
    );
    println!("{}", "-".repeat(70));

    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for entry in entries {
        let (year, month, day) = entry.modified_date_parts();
        let (hour, minute, _second) = entry.modified_time_parts();

        println!(
            "{:>10}  {:>10}  {}  {:04}-{:02}-{:02}  {:02}:{:02}  {}",
            entry.uncompressed_size,
            entry.compressed_size,
            ratio(entry.compressed_size, entry.uncompressed_size),
            year,
            month,
            day,
            hour,
            minute,
            entry.name
        );

        if !entry.is_directory() {
            total_uncompressed += entry.uncompressed_size;
            total_compressed += entry.compressed_size;
            file_count += 1;
        }
    }

    println!("{}", "-".repeat(70));
    println!(
        "{:>10}  {:>10}  {}  {:>21}  {} files",
        total_uncompressed,
        total_compressed,
        ratio(total_compressed, total_uncompressed),
        "",
        file_count
    );
}

/// Compression ratio as percentage saved.
fn ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed > 0 {
        format!("{:>4}%", 100 - (compressed * 100 / uncompressed))
    } else {
        "  0%".to_string()
    }
}

/// Format a byte size into a human-readable string.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
