//! Caller-facing input descriptors and their normalization into a
//! modification time plus a lazy byte source.

use std::path::Path;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, LAST_MODIFIED};
use tokio::fs::File;
use tracing::debug;

use crate::error::{Error, Result};
use crate::io::{ByteSource, LocalFileReader, ResponseBody};

use super::metadata::EntryName;
use super::time::{ModTime, parse_http_date};

/// An open file together with the metadata it reports about itself.
#[derive(Debug)]
pub struct FileHandle {
    file: File,
    name: String,
    modified: Option<DateTime<Utc>>,
    size: u64,
}

impl FileHandle {
    pub fn new(file: File, name: impl Into<String>, modified: Option<DateTime<Utc>>, size: u64) -> Self {
        Self {
            file,
            name: name.into(),
            modified,
            size,
        }
    }

    /// Open a regular file. Its base name becomes the default entry name.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).await?;
        let metadata = file.metadata().await?;

        if !metadata.is_file() {
            return Err(Error::UnsupportedInput(format!(
                "{} is not a regular file",
                path.display()
            )));
        }

        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let modified = metadata.modified().ok().map(DateTime::<Utc>::from);

        Ok(Self::new(file, name, modified, metadata.len()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.modified
    }
}

/// An HTTP response: its headers, the URL it came from, and its body.
#[derive(Debug)]
pub struct ResponseHandle {
    url: Option<String>,
    headers: HeaderMap,
    body: ByteSource,
}

impl ResponseHandle {
    pub fn new(headers: HeaderMap, body: ByteSource) -> Self {
        Self {
            url: None,
            headers,
            body,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }
}

impl From<reqwest::Response> for ResponseHandle {
    fn from(response: reqwest::Response) -> Self {
        let url = response.url().to_string();
        let headers = response.headers().clone();
        Self::new(headers, ByteSource::new(ResponseBody::new(response))).with_url(url)
    }
}

/// The content of one archive entry.
#[derive(Debug)]
pub enum Input {
    Bytes(Bytes),
    /// Stored as UTF-8.
    Text(String),
    File(FileHandle),
    Response(ResponseHandle),
    /// Chunks produced incrementally; the size is unknown up front.
    Stream(ByteSource),
}

impl From<Bytes> for Input {
    fn from(data: Bytes) -> Self {
        Input::Bytes(data)
    }
}

impl From<Vec<u8>> for Input {
    fn from(data: Vec<u8>) -> Self {
        Input::Bytes(data.into())
    }
}

impl From<&'static [u8]> for Input {
    fn from(data: &'static [u8]) -> Self {
        Input::Bytes(Bytes::from_static(data))
    }
}

impl From<String> for Input {
    fn from(text: String) -> Self {
        Input::Text(text)
    }
}

impl From<&str> for Input {
    fn from(text: &str) -> Self {
        Input::Text(text.to_string())
    }
}

impl From<FileHandle> for Input {
    fn from(handle: FileHandle) -> Self {
        Input::File(handle)
    }
}

impl From<ResponseHandle> for Input {
    fn from(handle: ResponseHandle) -> Self {
        Input::Response(handle)
    }
}

impl From<ByteSource> for Input {
    fn from(source: ByteSource) -> Self {
        Input::Stream(source)
    }
}

/// One entry as described by the caller, before normalization.
///
/// ```
/// use streamzip::InputDescriptor;
///
/// let descriptor = InputDescriptor::new("hi")
///     .name("hello.txt")
///     .modified("2023-07-26T10:00:00Z");
/// ```
#[derive(Debug)]
pub struct InputDescriptor {
    pub(crate) input: Input,
    pub(crate) name: Option<EntryName>,
    pub(crate) modified: Option<ModTime>,
    pub(crate) size: Option<u64>,
}

impl InputDescriptor {
    pub fn new(input: impl Into<Input>) -> Self {
        Self {
            input: input.into(),
            name: None,
            modified: None,
            size: None,
        }
    }

    /// Explicit entry name, taking precedence over any name the input carries.
    pub fn name(mut self, name: impl Into<EntryName>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Explicit modification time. It is validated during normalization.
    pub fn modified(mut self, modified: impl Into<ModTime>) -> Self {
        self.modified = Some(modified.into());
        self
    }

    /// Expected content length for sources that cannot report it themselves.
    pub fn size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}

/// What the resolver may still learn about an input once its bytes have
/// been split off.
#[derive(Debug)]
pub(crate) enum Origin {
    Memory { len: u64 },
    File { name: String, size: u64 },
    Response { headers: HeaderMap, url: Option<String> },
    Stream,
}

#[derive(Debug)]
pub(crate) struct Normalized {
    pub modified: DateTime<Utc>,
    pub source: ByteSource,
    pub origin: Origin,
}

/// Split an input into its modification time and a byte source. No bytes are
/// read here.
pub(crate) fn normalize(input: Input, modified: Option<&ModTime>) -> Result<Normalized> {
    let explicit = modified.map(ModTime::resolve).transpose()?;

    let normalized = match input {
        Input::Bytes(data) => Normalized {
            modified: explicit.unwrap_or_else(Utc::now),
            origin: Origin::Memory {
                len: data.len() as u64,
            },
            source: ByteSource::from_bytes(data),
        },
        Input::Text(text) => Normalized {
            modified: explicit.unwrap_or_else(Utc::now),
            origin: Origin::Memory {
                len: text.len() as u64,
            },
            source: ByteSource::from_bytes(text.into_bytes()),
        },
        Input::File(handle) => Normalized {
            modified: explicit.or(handle.modified).unwrap_or_else(Utc::now),
            origin: Origin::File {
                name: handle.name,
                size: handle.size,
            },
            source: ByteSource::new(LocalFileReader::new(handle.file)),
        },
        Input::Response(handle) => {
            let modified = explicit
                .or_else(|| last_modified(&handle.headers))
                .unwrap_or_else(Utc::now);
            Normalized {
                modified,
                origin: Origin::Response {
                    headers: handle.headers,
                    url: handle.url,
                },
                source: handle.body,
            }
        }
        Input::Stream(source) => Normalized {
            modified: explicit.unwrap_or_else(Utc::now),
            origin: Origin::Stream,
            source,
        },
    };

    Ok(normalized)
}

fn last_modified(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    let value = headers.get(LAST_MODIFIED)?.to_str().ok()?;
    let parsed = parse_http_date(value);
    if parsed.is_none() {
        debug!(value, "ignoring unparseable Last-Modified header");
    }
    parsed
}
