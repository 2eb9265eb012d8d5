//! Error type shared by the archive pipeline.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every way building an archive can fail.
///
/// All of them surface through the archive stream. Bytes already handed to
/// the consumer before the failure are not retracted.
#[derive(Debug, Error)]
pub enum Error {
    /// The entry name was missing, empty, or made only of `/`.
    #[error("The file must have a name.")]
    MissingName,

    #[error("Invalid modification date: {0:?}")]
    InvalidModTime(String),

    #[error("Unsupported input format: {0}")]
    UnsupportedInput(String),

    #[error("entry {name} is too large for a non-ZIP64 archive ({size} bytes)")]
    EntryTooLarge { name: String, size: u64 },

    #[error("archive exceeds non-ZIP64 limits: {0}")]
    ArchiveTooLarge(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A byte source or descriptor stream failed mid-read.
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}
