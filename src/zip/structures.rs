use std::path::PathBuf;

use crate::error::{Error, Result};

use super::cursor::ByteCursor;

/// Local file header: 30 bytes + filename + extra.
pub const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;
pub const LOCAL_HEADER_LEN: usize = 30;

/// Central directory file header: 46 bytes + filename + extra + comment.
pub const DIRECTORY_HEADER_SIGNATURE: u32 = 0x0201_4b50;
pub const DIRECTORY_HEADER_LEN: usize = 46;

/// End of central directory: 22 bytes + comment.
pub const DIRECTORY_END_SIGNATURE: u32 = 0x0605_4b50;
pub const DIRECTORY_END_LEN: usize = 22;

pub const ZIP64_LOCATOR_SIGNATURE: u32 = 0x0706_4b50;
pub const ZIP64_LOCATOR_LEN: usize = 20;

pub const ZIP64_END_SIGNATURE: u32 = 0x0606_4b50;
pub const ZIP64_END_LEN: usize = 56;

/// Maximum ZIP comment size allowed by the format.
pub const MAX_COMMENT_LEN: usize = 65535;

/// Zip64 extended information extra field id.
pub const ZIP64_EXTRA_ID: u16 = 0x0001;

/// General purpose flag bit 11: filename and comment are UTF-8.
pub const UTF8_FLAG: u16 = 0x0800;

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// End of Central Directory record.
///
/// Count, size, and offset fields are normalized to 64 bits so a zip64
/// override can replace them transparently.
#[derive(Debug)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_directory: u16,
    pub records_this_disk: u64,
    pub directory_records: u64,
    pub directory_size: u64,
    pub directory_offset: u64,
    pub comment: Vec<u8>,
}

impl EndOfCentralDirectory {
    /// Decode the fixed 22-byte layout plus trailing comment.
    ///
    /// `data` must start at the signature. The comment is bounded by the
    /// bytes actually present; a declared length beyond that is an error.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(data);
        let signature = cursor.u32()?;
        if signature != DIRECTORY_END_SIGNATURE {
            return Err(Error::Format {
                offset: 0,
                reason: "end of central directory signature mismatch",
            });
        }

        let disk_number = cursor.u16()?;
        let disk_with_directory = cursor.u16()?;
        let records_this_disk = cursor.u16()? as u64;
        let directory_records = cursor.u16()? as u64;
        let directory_size = cursor.u32()? as u64;
        let directory_offset = cursor.u32()? as u64;
        let comment_len = cursor.u16()? as usize;

        if comment_len > cursor.remaining() {
            return Err(Error::InvalidComment {
                declared: comment_len,
                available: cursor.remaining(),
            });
        }
        let comment = cursor.bytes(comment_len)?.to_vec();

        Ok(Self {
            disk_number,
            disk_with_directory,
            records_this_disk,
            directory_records,
            directory_size,
            directory_offset,
            comment,
        })
    }

    /// True when any bootstrap field carries its 16/32-bit sentinel
    /// maximum and the real value lives in the zip64 end record.
    pub fn needs_zip64(&self) -> bool {
        self.directory_records == 0xFFFF
            || self.directory_size == 0xFFFF_FFFF
            || self.directory_offset == 0xFFFF_FFFF
    }
}

/// Zip64 end of central directory locator - 20 bytes
pub struct Zip64Locator {
    pub disk_with_zip64_end: u32,
    pub zip64_end_offset: u64,
    pub total_disks: u32,
}

impl Zip64Locator {
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(data);
        let signature = cursor.u32()?;
        if signature != ZIP64_LOCATOR_SIGNATURE {
            return Err(Error::Format {
                offset: 0,
                reason: "zip64 locator signature mismatch",
            });
        }
        Ok(Self {
            disk_with_zip64_end: cursor.u32()?,
            zip64_end_offset: cursor.u64()?,
            total_disks: cursor.u32()?,
        })
    }
}

/// Zip64 end of central directory record - 56 bytes minimum
pub struct Zip64EndOfCentralDirectory {
    pub record_size: u64,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub disk_with_directory: u32,
    pub records_this_disk: u64,
    pub directory_records: u64,
    pub directory_size: u64,
    pub directory_offset: u64,
}

impl Zip64EndOfCentralDirectory {
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(data);
        let signature = cursor.u32()?;
        if signature != ZIP64_END_SIGNATURE {
            return Err(Error::Format {
                offset: 0,
                reason: "zip64 end of central directory signature mismatch",
            });
        }
        Ok(Self {
            record_size: cursor.u64()?,
            version_made_by: cursor.u16()?,
            version_needed: cursor.u16()?,
            disk_number: cursor.u32()?,
            disk_with_directory: cursor.u32()?,
            records_this_disk: cursor.u64()?,
            directory_records: cursor.u64()?,
            directory_size: cursor.u64()?,
            directory_offset: cursor.u64()?,
        })
    }
}

/// One entry decoded from the central directory.
#[derive(Debug, Clone)]
pub struct ZipEntry {
    pub name: String,
    pub comment: String,
    /// Name/comment use an encoding other than UTF-8.
    pub non_utf8: bool,
    pub flags: u16,
    pub method: CompressionMethod,
    /// Legacy MS-DOS modification time.
    pub modified_time: u16,
    /// Legacy MS-DOS modification date.
    pub modified_date: u16,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub extra: Vec<u8>,
    pub external_attrs: u32,
    /// Absolute byte offset of this entry's local file header.
    pub header_offset: u64,
    /// Destination written during retrieval; `None` until then.
    pub local_path: Option<PathBuf>,
}

impl ZipEntry {
    pub fn is_directory(&self) -> bool {
        self.name.ends_with('/')
    }

    /// Parse modification date to (year, month, day)
    pub fn modified_date_parts(&self) -> (u16, u8, u8) {
        let day = (self.modified_date & 0x1F) as u8;
        let month = ((self.modified_date >> 5) & 0x0F) as u8;
        let year = ((self.modified_date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn modified_time_parts(&self) -> (u8, u8, u8) {
        let second = ((self.modified_time & 0x1F) * 2) as u8;
        let minute = ((self.modified_time >> 5) & 0x3F) as u8;
        let hour = ((self.modified_time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }
}

/// The decoded central directory of one archive: entries in directory
/// order plus the archive-level comment.
#[derive(Debug)]
pub struct ArchiveIndex {
    pub entries: Vec<ZipEntry>,
    pub comment: String,
}
