//! Central directory parsing.
//!
//! This module bootstraps an archive from its tail, reading structures
//! through any source that implements the [`RangeFetch`] trait.
//!
//! ## Parsing strategy
//!
//! ZIP archives are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) in the resource's tail
//! 2. If the EOCD carries zip64 sentinels, apply the zip64 end record
//! 3. Fetch the central directory window and decode every entry
//!
//! Only the tail window, the zip64 records, and the directory window are
//! ever requested, so listing a multi-gigabyte remote archive costs a few
//! small range fetches.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::fetch::RangeFetch;

use super::cursor::ByteCursor;
use super::structures::*;

/// Decoder for the archive's central directory.
///
/// Generic over the fetcher so tests can drive it from an in-memory
/// resource while production code uses ranged HTTP.
pub struct DirectoryParser<F: RangeFetch> {
    fetcher: Arc<F>,
    /// Total size of the remote resource in bytes.
    size: u64,
}

impl<F: RangeFetch> DirectoryParser<F> {
    pub fn new(fetcher: Arc<F>) -> Self {
        let size = fetcher.size();
        Self { fetcher, size }
    }

    /// Locate and decode the End of Central Directory record.
    ///
    /// Handles both the common case (no archive comment, EOCD flush with
    /// the end) and commented archives, where the tail window grows to the
    /// maximum comment bound and is scanned backward for the signature.
    ///
    /// Returns the record and its absolute offset in the resource.
    pub async fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        if self.size < DIRECTORY_END_LEN as u64 {
            return Err(Error::Format {
                offset: 0,
                reason: "resource too small to hold a zip trailer",
            });
        }

        // Fast path: EOCD with an empty comment sits exactly at the end.
        let tail_offset = self.size - DIRECTORY_END_LEN as u64;
        let tail = self.fetcher.fetch_range(tail_offset, self.size - 1).await?;
        if tail.len() == DIRECTORY_END_LEN
            && tail[0..4] == DIRECTORY_END_SIGNATURE.to_le_bytes()
            && tail[20..22] == [0, 0]
        {
            let eocd = EndOfCentralDirectory::decode(&tail)
                .map_err(|e| reanchor(e, tail_offset))?;
            return Ok((eocd, tail_offset));
        }

        // The EOCD is earlier, pushed back by an archive comment. Widen the
        // window to the largest possible comment and scan backward.
        let window = (MAX_COMMENT_LEN + DIRECTORY_END_LEN) as u64;
        let window = window.min(self.size);
        let start = self.size - window;
        let block = self.fetcher.fetch_range(start, self.size - 1).await?;

        match locate_signature(&block) {
            Some(i) => {
                let offset = start + i as u64;
                let eocd = EndOfCentralDirectory::decode(&block[i..])
                    .map_err(|e| reanchor(e, offset))?;
                Ok((eocd, offset))
            }
            None => Err(Error::Format {
                offset: self.size,
                reason: "end of central directory not found",
            }),
        }
    }

    /// Read the zip64 end record reachable from the locator that sits
    /// immediately before the EOCD.
    ///
    /// Called only when [`EndOfCentralDirectory::needs_zip64`] reports a
    /// sentinel; the directory offsets must not be trusted before the
    /// override has been applied.
    async fn read_zip64_end(&self, eocd_offset: u64) -> Result<Zip64EndOfCentralDirectory> {
        if eocd_offset < ZIP64_LOCATOR_LEN as u64 {
            return Err(Error::Format {
                offset: eocd_offset,
                reason: "zip64 sentinel with no room for a locator",
            });
        }

        let locator_offset = eocd_offset - ZIP64_LOCATOR_LEN as u64;
        let buf = self
            .fetcher
            .fetch_range(locator_offset, eocd_offset - 1)
            .await?;
        let locator = Zip64Locator::decode(&buf).map_err(|e| reanchor(e, locator_offset))?;

        if locator.disk_with_zip64_end != 0 || locator.total_disks != 1 {
            return Err(Error::Format {
                offset: locator_offset,
                reason: "multi-disk zip64 archive",
            });
        }

        let end_offset = locator.zip64_end_offset;
        let buf = self
            .fetcher
            .fetch_range(end_offset, end_offset + ZIP64_END_LEN as u64 - 1)
            .await?;
        Zip64EndOfCentralDirectory::decode(&buf).map_err(|e| reanchor(e, end_offset))
    }

    /// Decode the archive's full central directory.
    ///
    /// One ranged fetch covers the whole directory window; entries come
    /// back in directory order.
    pub async fn read_index(&self) -> Result<ArchiveIndex> {
        let (eocd, eocd_offset) = self.find_eocd().await?;

        let (directory_records, directory_size, directory_offset) = if eocd.needs_zip64() {
            let end64 = self.read_zip64_end(eocd_offset).await?;
            (
                end64.directory_records,
                end64.directory_size,
                end64.directory_offset,
            )
        } else {
            (
                eocd.directory_records,
                eocd.directory_size,
                eocd.directory_offset,
            )
        };

        // A corrupt trailer must not drive allocation: the resource cannot
        // hold more entries than minimum-size local headers fit in it.
        if directory_records > self.size / LOCAL_HEADER_LEN as u64 {
            return Err(Error::Bounds {
                records: directory_records,
                size: self.size,
            });
        }
        let directory_end = directory_offset
            .checked_add(directory_size)
            .ok_or(Error::Format {
                offset: directory_offset,
                reason: "central directory span overflows",
            })?;
        if directory_end > self.size {
            return Err(Error::Format {
                offset: directory_offset,
                reason: "central directory extends past end of resource",
            });
        }

        let directory = if directory_size == 0 {
            Vec::new()
        } else {
            self.fetcher
                .fetch_range(directory_offset, directory_end - 1)
                .await?
        };

        let mut entries: Vec<ZipEntry> = Vec::with_capacity(directory_records as usize);
        let mut cursor = ByteCursor::new(&directory);
        loop {
            if cursor.remaining() == 0 && entries.len() as u64 == directory_records {
                break;
            }
            let at = directory_offset + (directory.len() - cursor.remaining()) as u64;
            match parse_entry(&mut cursor, at) {
                Ok(entry) => entries.push(entry),
                // A mismatch exactly after the declared record count is the
                // normal end of the directory; at any other position the
                // directory is corrupt and the error carries its offset.
                Err(Error::Format { .. }) | Err(Error::UnexpectedEof { .. })
                    if entries.len() as u64 == directory_records =>
                {
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(ArchiveIndex {
            entries,
            comment: String::from_utf8_lossy(&eocd.comment).into_owned(),
        })
    }
}

/// Re-anchor a decode error at the record's absolute resource offset.
fn reanchor(err: Error, at: u64) -> Error {
    match err {
        Error::Format { reason, .. } => Error::Format { offset: at, reason },
        e => e,
    }
}

/// Backward scan of a tail block for the EOCD signature.
///
/// A candidate is accepted only if its comment-length field is consistent
/// with the bytes remaining after it, which rejects false positives where
/// comment bytes happen to contain the 4-byte pattern.
fn locate_signature(block: &[u8]) -> Option<usize> {
    if block.len() < DIRECTORY_END_LEN {
        return None;
    }
    let signature = DIRECTORY_END_SIGNATURE.to_le_bytes();
    for i in (0..=block.len() - DIRECTORY_END_LEN).rev() {
        if block[i..i + 4] == signature {
            let n = u16::from_le_bytes([
                block[i + DIRECTORY_END_LEN - 2],
                block[i + DIRECTORY_END_LEN - 1],
            ]) as usize;
            if i + DIRECTORY_END_LEN + n <= block.len() {
                return Some(i);
            }
        }
    }
    None
}

/// Decode one central directory file header at the cursor.
///
/// `at` is the record's absolute offset in the resource, used only for
/// error reporting.
fn parse_entry(cursor: &mut ByteCursor<'_>, at: u64) -> Result<ZipEntry> {
    let signature = cursor.u32()?;
    if signature != DIRECTORY_HEADER_SIGNATURE {
        return Err(Error::Format {
            offset: at,
            reason: "central directory header signature mismatch",
        });
    }

    let _creator_version = cursor.u16()?;
    let _reader_version = cursor.u16()?;
    let flags = cursor.u16()?;
    let method = cursor.u16()?;
    let modified_time = cursor.u16()?;
    let modified_date = cursor.u16()?;
    let crc32 = cursor.u32()?;
    let mut compressed_size = cursor.u32()? as u64;
    let mut uncompressed_size = cursor.u32()? as u64;
    let name_len = cursor.u16()? as usize;
    let extra_len = cursor.u16()? as usize;
    let comment_len = cursor.u16()? as usize;
    cursor.skip(4)?; // start disk number and internal attributes
    let external_attrs = cursor.u32()?;
    let mut header_offset = cursor.u32()? as u64;

    let name = cursor.bytes(name_len)?;
    let extra = cursor.bytes(extra_len)?;
    let comment = cursor.bytes(comment_len)?;

    // Zip64 extended information: each 64-bit value is present only when
    // the corresponding 32-bit header field carries the sentinel.
    let mut fields = ByteCursor::new(extra);
    while fields.remaining() >= 4 {
        let id = fields.u16()?;
        let len = fields.u16()? as usize;
        if len > fields.remaining() {
            break;
        }
        let mut field = fields.sub(len)?;
        if id == ZIP64_EXTRA_ID {
            if uncompressed_size == 0xFFFF_FFFF && field.remaining() >= 8 {
                uncompressed_size = field.u64()?;
            }
            if compressed_size == 0xFFFF_FFFF && field.remaining() >= 8 {
                compressed_size = field.u64()?;
            }
            if header_offset == 0xFFFF_FFFF && field.remaining() >= 8 {
                header_offset = field.u64()?;
            }
        }
    }

    let non_utf8 = detect_encoding(name, comment, flags);

    Ok(ZipEntry {
        name: String::from_utf8_lossy(name).into_owned(),
        comment: String::from_utf8_lossy(comment).into_owned(),
        non_utf8,
        flags,
        method: CompressionMethod::from_u16(method),
        modified_time,
        modified_date,
        crc32,
        compressed_size,
        uncompressed_size,
        extra: extra.to_vec(),
        external_attrs,
        header_offset,
        local_path: None,
    })
}

/// Decide an entry's NonUTF8 flag from its raw name and comment bytes
/// plus general-purpose flag bit 11.
pub(crate) fn detect_encoding(name: &[u8], comment: &[u8], flags: u16) -> bool {
    let (name_valid, name_require) = detect_utf8(name);
    let (comment_valid, comment_require) = detect_utf8(comment);
    if !name_valid || !comment_valid {
        // Definitely not UTF-8.
        true
    } else if !name_require && !comment_require {
        // Only single-byte runes that overlap with UTF-8.
        false
    } else {
        // Could be UTF-8 or a legacy multi-byte encoding such as GBK or
        // Shift-JIS; the distinction is undecidable, so trust the flag.
        flags & UTF8_FLAG == 0
    }
}

/// `valid` is UTF-8 validity; `require` reports any rune outside the
/// 7-bit range shared by the common legacy encodings. 0x5C and 0x7E are
/// excluded from that range since EUC-KR and Shift-JIS reassign them.
fn detect_utf8(bytes: &[u8]) -> (bool, bool) {
    let Ok(s) = std::str::from_utf8(bytes) else {
        return (false, false);
    };
    let mut require = false;
    for c in s.chars() {
        if c < '\u{20}' || c > '\u{7d}' || c == '\u{5c}' {
            require = true;
        }
    }
    (true, require)
}
