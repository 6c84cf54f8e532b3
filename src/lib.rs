//! # netzip
//!
//! Extract files from remote ZIP archives over HTTP using Range requests.
//!
//! This library retrieves selected contents of a ZIP archive hosted at a
//! remote URL without downloading the archive in full. The end-of-central-
//! directory trailer, optional zip64 records, and central directory are
//! parsed from small ranged fetches; each entry's compressed payload is
//! then fetched in concurrent partitions and expanded locally.
//!
//! ## Features
//!
//! - List and extract ZIP archives from HTTP/HTTPS URLs via Range requests
//! - Support for ZIP64 format (archives larger than 4GB)
//! - STORED and DEFLATE compression methods, extensible codec registry
//! - Concurrent partitioned payload download with byte-exact reassembly
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use netzip::{BodyRetriever, CodecRegistry, DirectoryParser, HttpRangeFetcher};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Probe the remote archive and decode its central directory.
//!     let fetcher = Arc::new(HttpRangeFetcher::new("https://example.com/archive.zip".to_string()).await?);
//!     let index = DirectoryParser::new(Arc::clone(&fetcher)).read_index().await?;
//!     for entry in &index.entries {
//!         println!("{}", entry.name);
//!     }
//!
//!     // Retrieve every entry into ./out.
//!     let retriever = BodyRetriever::new(fetcher, CodecRegistry::new());
//!     for result in retriever.retrieve_all(&index.entries, Path::new("out")).await {
//!         result?;
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod fetch;
pub mod zip;

pub use cli::Cli;
pub use error::{Error, Result};
pub use fetch::{HttpRangeFetcher, RangeFetch};
pub use zip::{
    ArchiveIndex, BodyRetriever, CodecRegistry, CompressionMethod, Decompressor, DirectoryParser,
    ZipEntry,
};
