//! Per-entry encoding.
//!
//! An entry is written in two phases: a local header with zeroed CRC and
//! sizes goes out first, the content is passed through while being
//! checksummed, and a data descriptor carrying the final values closes the
//! entry. Nothing is buffered beyond the chunk in flight.

use std::borrow::Cow;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::io::ByteSource;

use super::crc::Crc32;
use super::input::{InputDescriptor, normalize};
use super::metadata;
use super::structures::{
    CentralDirectoryHeader, CompressionMethod, DataDescriptor, LocalFileHeader, REGULAR_FILE_MODE,
    VERSION_MADE_BY, VERSION_NEEDED, entry_flags,
};
use super::time::DosDateTime;

/// An entry ready to be streamed.
#[derive(Debug)]
pub struct NormalizedEntry {
    pub name: Bytes,
    pub modified: DateTime<Utc>,
    pub source: ByteSource,
    pub is_utf8: bool,
    /// Known only when the source reports it up front.
    pub declared_size: Option<u64>,
}

impl NormalizedEntry {
    /// Normalize a descriptor and resolve its metadata. No content is read.
    pub fn resolve(descriptor: InputDescriptor, buffers_are_utf8: Option<bool>) -> Result<Self> {
        let InputDescriptor {
            input,
            name,
            modified,
            size,
        } = descriptor;

        let normalized = normalize(input, modified.as_ref())?;
        let resolved = metadata::resolve(&normalized.origin, name, size, buffers_are_utf8)?;

        Ok(Self {
            name: resolved.name.into(),
            modified: normalized.modified,
            source: normalized.source,
            is_utf8: resolved.is_utf8,
            declared_size: resolved.declared_size,
        })
    }

    pub fn display_name(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }
}

/// Central directory data for one entry, known once its content is done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralDirectoryRecord {
    pub name: Bytes,
    pub modified: DosDateTime,
    pub flags: u16,
    pub crc32: u32,
    pub size: u32,
    pub lfh_offset: u64,
}

impl CentralDirectoryRecord {
    pub fn header(&self) -> Result<CentralDirectoryHeader> {
        let lfh_offset = u32::try_from(self.lfh_offset)
            .map_err(|_| Error::ArchiveTooLarge("local header offset beyond 4 GiB"))?;

        Ok(CentralDirectoryHeader {
            version_made_by: VERSION_MADE_BY,
            version_needed: VERSION_NEEDED,
            flags: self.flags,
            compression_method: CompressionMethod::Stored,
            modified: self.modified,
            crc32: self.crc32,
            compressed_size: self.size,
            uncompressed_size: self.size,
            file_name_length: self.name.len() as u16,
            extra_field_length: 0,
            file_comment_length: 0,
            disk_number_start: 0,
            internal_attrs: 0,
            external_attrs: REGULAR_FILE_MODE << 16,
            lfh_offset,
        })
    }

    /// Header followed by the name.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(CentralDirectoryHeader::SIZE + self.name.len());
        buf.extend_from_slice(&self.header()?.to_bytes());
        buf.extend_from_slice(&self.name);
        Ok(buf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Header,
    Name,
    Content,
    Descriptor,
    Done,
}

/// Streams one entry: local header, name, content, data descriptor.
#[derive(Debug)]
pub struct EntryEncoder {
    name: Bytes,
    modified: DosDateTime,
    flags: u16,
    source: ByteSource,
    crc: Crc32,
    lfh_offset: u64,
    phase: Phase,
}

impl EntryEncoder {
    /// `lfh_offset` is the number of archive bytes emitted before this entry.
    pub fn new(entry: NormalizedEntry, lfh_offset: u64) -> Result<Self> {
        metadata::check_name_len(&entry.name)?;

        Ok(Self {
            modified: DosDateTime::from_utc(&entry.modified),
            flags: entry_flags(entry.is_utf8),
            name: entry.name,
            source: entry.source,
            crc: Crc32::new(),
            lfh_offset,
            phase: Phase::Header,
        })
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Next chunk of this entry's output, or `None` after the descriptor.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        loop {
            match self.phase {
                Phase::Header => {
                    self.phase = Phase::Name;
                    let header =
                        LocalFileHeader::streamed(self.flags, self.modified, self.name.len() as u16);
                    return Ok(Some(Bytes::copy_from_slice(&header.to_bytes())));
                }
                Phase::Name => {
                    self.phase = Phase::Content;
                    return Ok(Some(self.name.clone()));
                }
                Phase::Content => match self.source.read_chunk().await {
                    Ok(Some(chunk)) if chunk.is_empty() => continue,
                    Ok(Some(chunk)) => {
                        self.crc.update(&chunk);
                        if self.crc.amount() > u32::MAX as u64 {
                            self.phase = Phase::Done;
                            self.source.cancel().await;
                            return Err(Error::EntryTooLarge {
                                name: String::from_utf8_lossy(&self.name).into_owned(),
                                size: self.crc.amount(),
                            });
                        }
                        return Ok(Some(chunk));
                    }
                    Ok(None) => self.phase = Phase::Descriptor,
                    Err(e) => {
                        self.phase = Phase::Done;
                        return Err(Error::Upstream(e));
                    }
                },
                Phase::Descriptor => {
                    self.phase = Phase::Done;
                    let descriptor =
                        DataDescriptor::stored(self.crc.finalize(), self.crc.amount() as u32);
                    return Ok(Some(Bytes::copy_from_slice(&descriptor.to_bytes())));
                }
                Phase::Done => return Ok(None),
            }
        }
    }

    /// Abandon the entry, cancelling its byte source.
    pub async fn cancel(&mut self) {
        self.phase = Phase::Done;
        self.source.cancel().await;
    }

    /// The central directory record for a fully streamed entry.
    pub fn finish(self) -> CentralDirectoryRecord {
        debug_assert!(self.is_done());
        CentralDirectoryRecord {
            modified: self.modified,
            flags: self.flags,
            crc32: self.crc.finalize(),
            size: self.crc.amount() as u32,
            lfh_offset: self.lfh_offset,
            name: self.name,
        }
    }
}
