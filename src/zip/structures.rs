//! Fixed-size ZIP records.
//!
//! Every record can be encoded into its little-endian wire form and decoded
//! back. The writer only ever produces the store method, with sizes and CRC
//! deferred to a trailing data descriptor.

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::io::Cursor;

use anyhow::{Result, bail};

use super::time::DosDateTime;

pub const LFH_SIGNATURE: u32 = 0x04034b50;
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x08074b50;
pub const CDFH_SIGNATURE: u32 = 0x02014b50;
pub const EOCD_SIGNATURE: u32 = 0x06054b50;

/// Version needed to extract: 2.0.
pub const VERSION_NEEDED: u16 = 20;
/// Version made by: Unix host, APPNOTE 2.1.
pub const VERSION_MADE_BY: u16 = 0x0315;

/// General purpose bit 3: CRC and sizes follow the data in a descriptor.
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;
/// General purpose bit 11: the entry name is UTF-8.
pub const FLAG_UTF8: u16 = 0x0800;

/// Regular file, rw-r--r--.
pub const REGULAR_FILE_MODE: u32 = 0o100644;

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

/// Flags for a streamed entry: the descriptor bit always, UTF-8 on request.
pub fn entry_flags(is_utf8: bool) -> u16 {
    if is_utf8 {
        FLAG_DATA_DESCRIPTOR | FLAG_UTF8
    } else {
        FLAG_DATA_DESCRIPTOR
    }
}

fn check_signature(data: &[u8], size: usize, signature: u32, what: &str) -> Result<()> {
    if data.len() < size || LittleEndian::read_u32(&data[0..4]) != signature {
        bail!("Invalid {}", what);
    }
    Ok(())
}

/// Local File Header (LFH) - 30 bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub modified: DosDateTime,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name_length: u16,
    pub extra_field_length: u16,
}

impl LocalFileHeader {
    pub const SIZE: usize = 30;

    /// Header for an entry whose CRC and sizes are not known yet. They are
    /// written as zero and carried by the trailing [`DataDescriptor`].
    pub fn streamed(flags: u16, modified: DosDateTime, file_name_length: u16) -> Self {
        Self {
            version_needed: VERSION_NEEDED,
            flags: flags | FLAG_DATA_DESCRIPTOR,
            compression_method: CompressionMethod::Stored,
            modified,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            file_name_length,
            extra_field_length: 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        LittleEndian::write_u32(&mut buf[0..], LFH_SIGNATURE);
        LittleEndian::write_u16(&mut buf[4..], self.version_needed);
        LittleEndian::write_u16(&mut buf[6..], self.flags);
        LittleEndian::write_u16(&mut buf[8..], self.compression_method.as_u16());
        LittleEndian::write_u16(&mut buf[10..], self.modified.time);
        LittleEndian::write_u16(&mut buf[12..], self.modified.date);
        LittleEndian::write_u32(&mut buf[14..], self.crc32);
        LittleEndian::write_u32(&mut buf[18..], self.compressed_size);
        LittleEndian::write_u32(&mut buf[22..], self.uncompressed_size);
        LittleEndian::write_u16(&mut buf[26..], self.file_name_length);
        LittleEndian::write_u16(&mut buf[28..], self.extra_field_length);
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        check_signature(data, Self::SIZE, LFH_SIGNATURE, "Local File Header")?;
        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            version_needed: cursor.read_u16::<LittleEndian>()?,
            flags: cursor.read_u16::<LittleEndian>()?,
            compression_method: CompressionMethod::from_u16(cursor.read_u16::<LittleEndian>()?),
            modified: DosDateTime {
                time: cursor.read_u16::<LittleEndian>()?,
                date: cursor.read_u16::<LittleEndian>()?,
            },
            crc32: cursor.read_u32::<LittleEndian>()?,
            compressed_size: cursor.read_u32::<LittleEndian>()?,
            uncompressed_size: cursor.read_u32::<LittleEndian>()?,
            file_name_length: cursor.read_u16::<LittleEndian>()?,
            extra_field_length: cursor.read_u16::<LittleEndian>()?,
        })
    }
}

/// Data descriptor - 16 bytes, signature included
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
}

impl DataDescriptor {
    pub const SIZE: usize = 16;

    /// Descriptor for stored data, where both sizes are equal.
    pub fn stored(crc32: u32, size: u32) -> Self {
        Self {
            crc32,
            compressed_size: size,
            uncompressed_size: size,
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        LittleEndian::write_u32(&mut buf[0..], DATA_DESCRIPTOR_SIGNATURE);
        LittleEndian::write_u32(&mut buf[4..], self.crc32);
        LittleEndian::write_u32(&mut buf[8..], self.compressed_size);
        LittleEndian::write_u32(&mut buf[12..], self.uncompressed_size);
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        check_signature(data, Self::SIZE, DATA_DESCRIPTOR_SIGNATURE, "Data Descriptor")?;
        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            crc32: cursor.read_u32::<LittleEndian>()?,
            compressed_size: cursor.read_u32::<LittleEndian>()?,
            uncompressed_size: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

/// Central Directory File Header (CDFH) - 46 bytes, name not included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralDirectoryHeader {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub modified: DosDateTime,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name_length: u16,
    pub extra_field_length: u16,
    pub file_comment_length: u16,
    pub disk_number_start: u16,
    pub internal_attrs: u16,
    pub external_attrs: u32,
    pub lfh_offset: u32,
}

impl CentralDirectoryHeader {
    pub const SIZE: usize = 46;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        LittleEndian::write_u32(&mut buf[0..], CDFH_SIGNATURE);
        LittleEndian::write_u16(&mut buf[4..], self.version_made_by);
        LittleEndian::write_u16(&mut buf[6..], self.version_needed);
        LittleEndian::write_u16(&mut buf[8..], self.flags);
        LittleEndian::write_u16(&mut buf[10..], self.compression_method.as_u16());
        LittleEndian::write_u16(&mut buf[12..], self.modified.time);
        LittleEndian::write_u16(&mut buf[14..], self.modified.date);
        LittleEndian::write_u32(&mut buf[16..], self.crc32);
        LittleEndian::write_u32(&mut buf[20..], self.compressed_size);
        LittleEndian::write_u32(&mut buf[24..], self.uncompressed_size);
        LittleEndian::write_u16(&mut buf[28..], self.file_name_length);
        LittleEndian::write_u16(&mut buf[30..], self.extra_field_length);
        LittleEndian::write_u16(&mut buf[32..], self.file_comment_length);
        LittleEndian::write_u16(&mut buf[34..], self.disk_number_start);
        LittleEndian::write_u16(&mut buf[36..], self.internal_attrs);
        LittleEndian::write_u32(&mut buf[38..], self.external_attrs);
        LittleEndian::write_u32(&mut buf[42..], self.lfh_offset);
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        check_signature(data, Self::SIZE, CDFH_SIGNATURE, "Central Directory File Header")?;
        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            version_made_by: cursor.read_u16::<LittleEndian>()?,
            version_needed: cursor.read_u16::<LittleEndian>()?,
            flags: cursor.read_u16::<LittleEndian>()?,
            compression_method: CompressionMethod::from_u16(cursor.read_u16::<LittleEndian>()?),
            modified: DosDateTime {
                time: cursor.read_u16::<LittleEndian>()?,
                date: cursor.read_u16::<LittleEndian>()?,
            },
            crc32: cursor.read_u32::<LittleEndian>()?,
            compressed_size: cursor.read_u32::<LittleEndian>()?,
            uncompressed_size: cursor.read_u32::<LittleEndian>()?,
            file_name_length: cursor.read_u16::<LittleEndian>()?,
            extra_field_length: cursor.read_u16::<LittleEndian>()?,
            file_comment_length: cursor.read_u16::<LittleEndian>()?,
            disk_number_start: cursor.read_u16::<LittleEndian>()?,
            internal_attrs: cursor.read_u16::<LittleEndian>()?,
            external_attrs: cursor.read_u32::<LittleEndian>()?,
            lfh_offset: cursor.read_u32::<LittleEndian>()?,
        })
    }

    /// Unix mode bits stored in the high half of the external attributes.
    pub fn unix_mode(&self) -> u32 {
        self.external_attrs >> 16
    }
}

/// End of Central Directory (EOCD) - 22 bytes minimum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIZE: usize = 22;

    /// Single-disk EOCD without a comment.
    pub fn new(entries: u16, cd_size: u32, cd_offset: u32) -> Self {
        Self {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: entries,
            total_entries: entries,
            cd_size,
            cd_offset,
            comment_len: 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        LittleEndian::write_u32(&mut buf[0..], EOCD_SIGNATURE);
        LittleEndian::write_u16(&mut buf[4..], self.disk_number);
        LittleEndian::write_u16(&mut buf[6..], self.disk_with_cd);
        LittleEndian::write_u16(&mut buf[8..], self.disk_entries);
        LittleEndian::write_u16(&mut buf[10..], self.total_entries);
        LittleEndian::write_u32(&mut buf[12..], self.cd_size);
        LittleEndian::write_u32(&mut buf[16..], self.cd_offset);
        LittleEndian::write_u16(&mut buf[20..], self.comment_len);
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        check_signature(data, Self::SIZE, EOCD_SIGNATURE, "End of Central Directory")?;
        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_number: cursor.read_u16::<LittleEndian>()?,
            disk_with_cd: cursor.read_u16::<LittleEndian>()?,
            disk_entries: cursor.read_u16::<LittleEndian>()?,
            total_entries: cursor.read_u16::<LittleEndian>()?,
            cd_size: cursor.read_u32::<LittleEndian>()?,
            cd_offset: cursor.read_u32::<LittleEndian>()?,
            comment_len: cursor.read_u16::<LittleEndian>()?,
        })
    }
}
