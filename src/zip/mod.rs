//! ZIP archive parsing and retrieval.
//!
//! This module reads ZIP archives through ranged fetches, supporting both
//! standard ZIP format and ZIP64 extensions for large archives.
//!
//! ## Architecture
//!
//! The module is organized into five components:
//!
//! - [`cursor`]: bounds-checked little-endian decoding over byte windows
//! - [`structures`]: data structures for ZIP format elements (EOCD, zip64
//!   records, directory entries)
//! - [`parser`]: locating and decoding the central directory
//! - [`retriever`]: partitioned payload retrieval and persistence
//! - [`codec`]: the compression method registry
//!
//! ## ZIP format overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central directory with metadata for all files
//! 3. End of central directory (EOCD) record at the end
//!
//! The EOCD is read first (from the end of the resource), then the central
//! directory, which allows listing files without reading the rest of the
//! archive. Each payload is then addressable by offset, so extraction of
//! one entry costs only the byte ranges that entry occupies.
//!
//! ## Supported features
//!
//! - Standard ZIP format (PKZIP APPNOTE 6.3.x compatible)
//! - ZIP64 extensions for archives > 4GB
//! - STORED (no compression) method
//! - DEFLATE compression method, plus caller-registered codecs
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support

mod codec;
mod cursor;
mod parser;
mod retriever;
mod structures;

pub use codec::{CodecRegistry, Decompressor};
pub use cursor::ByteCursor;
pub use parser::DirectoryParser;
pub use retriever::{BodyRetriever, DEFAULT_PARTITIONS, DEFAULT_WORKERS};
pub use structures::*;
