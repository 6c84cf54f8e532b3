//! Compression method dispatch.
//!
//! A [`CodecRegistry`] maps ZIP method numbers to [`Decompressor`]
//! implementations. The registry is built once, before any retrieval
//! starts; extending it needs `&mut self`, so a registry shared behind an
//! `Arc` is frozen and lookups never race a registration.

use std::collections::HashMap;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use flate2::read::DeflateDecoder;

use crate::error::{Error, Result};

use super::structures::ZipEntry;

/// Expands one compressed payload stream.
pub trait Decompressor: Send + Sync {
    /// Copy `input` to `output`, expanding as needed. Returns the number
    /// of bytes written.
    fn expand(&self, input: &mut dyn Read, output: &mut dyn Write) -> io::Result<u64>;
}

/// Method 0: payload bytes pass through unchanged.
struct Stored;

impl Decompressor for Stored {
    fn expand(&self, input: &mut dyn Read, output: &mut dyn Write) -> io::Result<u64> {
        io::copy(input, output)
    }
}

/// Method 8: raw DEFLATE stream.
struct Deflated;

impl Decompressor for Deflated {
    fn expand(&self, input: &mut dyn Read, output: &mut dyn Write) -> io::Result<u64> {
        io::copy(&mut DeflateDecoder::new(input), output)
    }
}

/// Table of method number to decompressor.
pub struct CodecRegistry {
    table: HashMap<u16, Box<dyn Decompressor>>,
}

impl CodecRegistry {
    /// Registry pre-populated with Stored (0) and Deflate (8).
    pub fn new() -> Self {
        let mut registry = Self {
            table: HashMap::new(),
        };
        registry.register(0, Box::new(Stored));
        registry.register(8, Box::new(Deflated));
        registry
    }

    /// Register a decompressor for a method number, replacing any
    /// previous one. Requires exclusive access; a registry already shared
    /// with workers can no longer change.
    pub fn register(&mut self, method: u16, codec: Box<dyn Decompressor>) {
        self.table.insert(method, codec);
    }

    pub fn get(&self, method: u16) -> Option<&dyn Decompressor> {
        self.table.get(&method).map(|c| c.as_ref())
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Writer adapter tracking CRC32 and byte count of everything written.
struct CrcWriter<W: Write> {
    inner: W,
    hasher: crc32fast::Hasher,
    written: u64,
}

impl<W: Write> CrcWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: crc32fast::Hasher::new(),
            written: 0,
        }
    }

    fn crc32(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    fn written(&self) -> u64 {
        self.written
    }
}

impl<W: Write> Write for CrcWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Expand `entry`'s on-disk payload at `path` in place.
///
/// The compressed bytes are read bounded to the entry's compressed size,
/// expanded into a temporary file in the same directory, verified against
/// the directory's declared size and CRC32, and atomically renamed over
/// the compressed file. A reader holding the old file open keeps seeing
/// consistent bytes; on any failure the compressed file is untouched.
pub(crate) async fn expand_payload(
    registry: &Arc<CodecRegistry>,
    entry: &ZipEntry,
    path: &Path,
) -> Result<()> {
    let method = entry.method.as_u16();
    let registry = Arc::clone(registry);
    let path = path.to_path_buf();
    let compressed_size = entry.compressed_size;
    let uncompressed_size = entry.uncompressed_size;
    let expected_crc = entry.crc32;

    tokio::task::spawn_blocking(move || -> Result<()> {
        let codec = registry.get(method).ok_or(Error::Algorithm { method })?;

        let input = std::fs::File::open(&path)?;
        let mut bounded = input.take(compressed_size);

        let parent = path.parent().unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;

        let mut out = CrcWriter::new(BufWriter::new(tmp.as_file_mut()));
        codec.expand(&mut bounded, &mut out)?;
        out.flush()?;
        let written = out.written();
        let actual_crc = out.crc32();
        drop(out);

        if written != uncompressed_size {
            return Err(Error::SizeMismatch {
                expected: uncompressed_size,
                actual: written,
            });
        }
        if actual_crc != expected_crc {
            return Err(Error::ChecksumMismatch {
                expected: expected_crc,
                actual: actual_crc,
            });
        }

        tmp.persist(&path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    })
    .await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::structures::CompressionMethod;
    use flate2::Compression;
    use flate2::write::DeflateEncoder;
    use std::io::Cursor;

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn entry_for(method: u16, data: &[u8], compressed_len: u64) -> ZipEntry {
        ZipEntry {
            name: "payload.bin".to_string(),
            comment: String::new(),
            non_utf8: false,
            flags: 0,
            method: CompressionMethod::from_u16(method),
            modified_time: 0,
            modified_date: 0,
            crc32: crc32fast::hash(data),
            compressed_size: compressed_len,
            uncompressed_size: data.len() as u64,
            extra: Vec::new(),
            external_attrs: 0,
            header_offset: 0,
            local_path: None,
        }
    }

    #[test]
    fn stored_codec_is_identity() {
        let codec = Stored;
        let mut out = Vec::new();
        let n = codec
            .expand(&mut Cursor::new(b"unchanged".to_vec()), &mut out)
            .unwrap();
        assert_eq!(n, 9);
        assert_eq!(out, b"unchanged");
    }

    #[test]
    fn deflate_codec_roundtrips() {
        let original = b"netzip netzip netzip netzip netzip";
        let compressed = deflate(original);
        let codec = Deflated;
        let mut out = Vec::new();
        codec
            .expand(&mut Cursor::new(compressed), &mut out)
            .unwrap();
        assert_eq!(out, original);
    }

    #[test]
    fn unknown_method_has_no_codec() {
        let registry = CodecRegistry::new();
        assert!(registry.get(0).is_some());
        assert!(registry.get(8).is_some());
        assert!(registry.get(12).is_none());
    }

    #[tokio::test]
    async fn expand_replaces_compressed_file_and_verifies_crc() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        let original: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        let compressed = deflate(&original);
        std::fs::write(&path, &compressed).unwrap();

        let registry = Arc::new(CodecRegistry::new());
        let entry = entry_for(8, &original, compressed.len() as u64);
        expand_payload(&registry, &entry, &path).await.unwrap();

        let expanded = std::fs::read(&path).unwrap();
        assert_eq!(expanded, original);
    }

    #[tokio::test]
    async fn corrupt_declared_crc_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        let original = b"checksummed content".to_vec();
        let compressed = deflate(&original);
        std::fs::write(&path, &compressed).unwrap();

        let registry = Arc::new(CodecRegistry::new());
        let mut entry = entry_for(8, &original, compressed.len() as u64);
        entry.crc32 ^= 0xDEAD_BEEF;

        let err = expand_payload(&registry, &entry, &path)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { .. }));
        // The compressed bytes were not clobbered.
        assert_eq!(std::fs::read(&path).unwrap(), compressed);
    }

    #[tokio::test]
    async fn unregistered_method_leaves_payload_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weird.bin");
        std::fs::write(&path, b"opaque bytes").unwrap();

        let registry = Arc::new(CodecRegistry::new());
        let entry = entry_for(14, b"opaque bytes", 12);

        let err = expand_payload(&registry, &entry, &path)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Algorithm { method: 14 }));
        assert_eq!(std::fs::read(&path).unwrap(), b"opaque bytes");
    }
}
