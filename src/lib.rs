//! # streamzip
//!
//! A streaming ZIP archive encoder for local files, in-memory buffers and
//! HTTP responses.
//!
//! Archives are produced chunk by chunk as the consumer pulls them. Each
//! entry's CRC and size are computed while its bytes flow through and are
//! written in a trailing data descriptor, so no entry is ever buffered whole
//! and every source is read exactly once.
//!
//! ## Features
//!
//! - Entries from bytes, text, files, HTTP responses or any stream of chunks
//! - Lazily fetched remote files, downloaded one at a time as the archive
//!   needs them
//! - Exact `Content-Length` prediction from entry names and sizes
//! - Following `Link: rel="next"` pagination for JSON file indexes
//!
//! ## Example
//!
//! ```no_run
//! use streamzip::{download_zip, ArchiveOptions, InputDescriptor};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let descriptors = futures::stream::iter(vec![
//!         Ok(InputDescriptor::new("hi").name("hello.txt")),
//!         Ok(InputDescriptor::new(vec![0u8; 1024]).name("data/zeros.bin")),
//!     ]);
//!
//!     let response = download_zip(descriptors, ArchiveOptions::default())?;
//!     let mut file = tokio::fs::File::create("archive.zip").await?;
//!     response.write_to(&mut file).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod io;
pub mod zip;

pub use cli::Cli;
pub use error::{Error, Result};
pub use io::{ByteSource, ReadChunk, RemoteFile, lazy_fetch};
pub use zip::{
    ArchiveOptions, EntryMetadata, EntryName, FileHandle, Input, InputDescriptor, ModTime,
    ResponseHandle, ZipResponse, ZipStream, download_zip, predict_length,
};
