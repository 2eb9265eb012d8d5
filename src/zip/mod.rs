//! Streaming ZIP archive encoding.
//!
//! This module turns a sequence of input descriptors into a ZIP archive
//! produced chunk by chunk, without holding more than one chunk of any entry
//! in memory.
//!
//! ## Architecture
//!
//! - [`input`]: caller-facing descriptors and their normalization into a
//!   modification time plus a lazy byte source
//! - [`metadata`]: entry names, declared sizes and the UTF-8 flag
//! - [`crc`]: the running CRC-32 digest
//! - [`entry`]: per-entry encoding (local header, content, data descriptor)
//! - [`archive`]: assembly of entries, central directory and EOCD
//! - [`structures`]: fixed-size ZIP records
//! - [`time`]: MS-DOS timestamps and caller-supplied modification times
//!
//! ## Archive Layout
//!
//! Every entry is written as:
//! 1. Local file header with general purpose bit 3 set and zero CRC/sizes
//! 2. Entry name
//! 3. Content, stored without compression
//! 4. Data descriptor with the real CRC and sizes
//!
//! followed by one central directory record per entry and the End of Central
//! Directory record.
//!
//! ## Limitations
//!
//! - STORED method only
//! - No ZIP64: entries and offsets must fit in 32 bits, at most 65535 entries
//! - No extra fields or comments

pub mod archive;
pub mod crc;
pub mod entry;
pub mod input;
pub mod metadata;
pub mod structures;
pub mod time;

pub use archive::{ArchiveOptions, ZipResponse, ZipStream, download_zip};
pub use entry::{CentralDirectoryRecord, EntryEncoder, NormalizedEntry};
pub use input::{FileHandle, Input, InputDescriptor, ResponseHandle};
pub use metadata::{EntryMetadata, EntryName, predict_length};
pub use time::{DosDateTime, ModTime};
