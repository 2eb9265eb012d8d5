//! Archive assembly.
//!
//! [`ZipStream`] is pull-driven: each call to [`ZipStream::next_chunk`]
//! produces at most one chunk and reads at most one chunk from the current
//! entry's source, so the consumer's pace is the only thing driving reads.
//! Entries are streamed strictly one after another. The next descriptor is
//! not even requested until the previous entry's data descriptor has been
//! handed out, which keeps every local header offset equal to the number of
//! bytes emitted before it.
//!
//! Output is streamed, not buffered. When a source fails midway, the chunks
//! already returned stay returned: the consumer sees a partial archive
//! followed by the error, and the stream ends.

use std::mem;
use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, HeaderValue};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::error::{Error, Result};

use super::entry::{CentralDirectoryRecord, EntryEncoder, NormalizedEntry};
use super::input::InputDescriptor;
use super::metadata::{EntryMetadata, predict_length};
use super::structures::EndOfCentralDirectory;

type DescriptorStream = Pin<Box<dyn Stream<Item = anyhow::Result<InputDescriptor>> + Send>>;

/// Archive-wide settings.
#[derive(Debug, Clone, Default)]
pub struct ArchiveOptions {
    /// Total archive length, when the caller already knows it.
    pub length: Option<u64>,
    /// Names and sizes of every entry, for computing the exact length.
    pub metadata: Option<Vec<EntryMetadata>>,
    /// Overrides the UTF-8 detection for names given as raw bytes.
    pub buffers_are_utf8: Option<bool>,
}

impl ArchiveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn length(mut self, length: u64) -> Self {
        self.length = Some(length);
        self
    }

    pub fn metadata(mut self, metadata: Vec<EntryMetadata>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn buffers_are_utf8(mut self, utf8: bool) -> Self {
        self.buffers_are_utf8 = Some(utf8);
        self
    }

    /// Exact archive length if the options allow computing it.
    pub fn content_length(&self) -> Result<Option<u64>> {
        if let Some(metadata) = &self.metadata {
            return predict_length(metadata).map(Some);
        }
        Ok(self.length.filter(|&length| length > 0))
    }
}

enum State {
    Entries,
    Entry(Box<EntryEncoder>),
    CentralDirectory(usize),
    End,
    Done,
}

/// A ZIP archive produced lazily, one chunk at a time.
pub struct ZipStream {
    descriptors: DescriptorStream,
    buffers_are_utf8: Option<bool>,
    state: State,
    offset: u64,
    records: Vec<CentralDirectoryRecord>,
    cd_offset: u64,
    cd_size: u64,
}

impl ZipStream {
    /// Build an archive from a lazy stream of descriptors, such as the one
    /// returned by [`lazy_fetch`](crate::io::lazy_fetch).
    pub fn new<S>(descriptors: S, options: &ArchiveOptions) -> Self
    where
        S: Stream<Item = anyhow::Result<InputDescriptor>> + Send + 'static,
    {
        Self {
            descriptors: Box::pin(descriptors),
            buffers_are_utf8: options.buffers_are_utf8,
            state: State::Entries,
            offset: 0,
            records: Vec::new(),
            cd_offset: 0,
            cd_size: 0,
        }
    }

    /// Build an archive from descriptors that are already at hand.
    pub fn from_descriptors<I>(descriptors: I, options: &ArchiveOptions) -> Self
    where
        I: IntoIterator<Item = InputDescriptor>,
        I::IntoIter: Send + 'static,
    {
        Self::new(futures::stream::iter(descriptors.into_iter().map(Ok)), options)
    }

    /// Archive bytes handed out so far.
    pub fn bytes_emitted(&self) -> u64 {
        self.offset
    }

    /// Next chunk of the archive, or `None` once the end of central directory
    /// record has been emitted. After an error the stream is finished.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        let result = self.advance().await;
        if result.is_err() {
            if let State::Entry(encoder) = &mut self.state {
                encoder.cancel().await;
            }
            self.state = State::Done;
        }
        result
    }

    async fn advance(&mut self) -> Result<Option<Bytes>> {
        loop {
            match &mut self.state {
                State::Entries => match self.descriptors.next().await {
                    Some(descriptor) => {
                        let entry = NormalizedEntry::resolve(descriptor?, self.buffers_are_utf8)?;
                        debug!(
                            name = %entry.display_name(),
                            offset = self.offset,
                            declared_size = ?entry.declared_size,
                            "streaming entry"
                        );
                        self.state = State::Entry(Box::new(EntryEncoder::new(entry, self.offset)?));
                    }
                    None => {
                        if self.records.len() > u16::MAX as usize {
                            return Err(Error::ArchiveTooLarge("more than 65535 entries"));
                        }
                        if self.offset > u32::MAX as u64 {
                            return Err(Error::ArchiveTooLarge("central directory beyond 4 GiB"));
                        }
                        self.cd_offset = self.offset;
                        self.state = State::CentralDirectory(0);
                    }
                },
                State::Entry(encoder) => match encoder.next_chunk().await? {
                    Some(chunk) => {
                        self.offset += chunk.len() as u64;
                        return Ok(Some(chunk));
                    }
                    None => {
                        if let State::Entry(encoder) = mem::replace(&mut self.state, State::Entries) {
                            let record = encoder.finish();
                            debug!(
                                name = %String::from_utf8_lossy(&record.name),
                                size = record.size,
                                crc32 = record.crc32,
                                "finished entry"
                            );
                            self.records.push(record);
                        }
                    }
                },
                State::CentralDirectory(index) => {
                    let index = *index;
                    match self.records.get(index) {
                        Some(record) => {
                            let chunk = Bytes::from(record.to_bytes()?);
                            trace!(index, len = chunk.len(), "central directory record");
                            self.cd_size += chunk.len() as u64;
                            self.offset += chunk.len() as u64;
                            self.state = State::CentralDirectory(index + 1);
                            return Ok(Some(chunk));
                        }
                        None => self.state = State::End,
                    }
                }
                State::End => {
                    let cd_size = u32::try_from(self.cd_size)
                        .map_err(|_| Error::ArchiveTooLarge("central directory larger than 4 GiB"))?;
                    let eocd = EndOfCentralDirectory::new(
                        self.records.len() as u16,
                        cd_size,
                        self.cd_offset as u32,
                    );
                    let chunk = Bytes::copy_from_slice(&eocd.to_bytes());
                    self.offset += chunk.len() as u64;
                    self.state = State::Done;
                    debug!(
                        entries = self.records.len(),
                        total = self.offset,
                        "archive complete"
                    );
                    return Ok(Some(chunk));
                }
                State::Done => return Ok(None),
            }
        }
    }

    /// Abandon the archive. The current entry's source is cancelled and any
    /// error raised while doing so is swallowed.
    pub async fn cancel(&mut self) {
        if let State::Entry(encoder) = &mut self.state {
            encoder.cancel().await;
        }
        self.state = State::Done;
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes>> + Send + 'static {
        futures::stream::try_unfold(self, |mut zip| async move {
            Ok(zip.next_chunk().await?.map(|chunk| (chunk, zip)))
        })
    }
}

/// The archive paired with the headers of a download response.
pub struct ZipResponse {
    headers: HeaderMap,
    body: ZipStream,
}

impl ZipResponse {
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes>> + Send + 'static {
        self.body.into_stream()
    }

    /// Body for an outgoing request, e.g. uploading the archive.
    pub fn into_reqwest_body(self) -> reqwest::Body {
        reqwest::Body::wrap_stream(self.body.into_stream())
    }

    /// Collect the whole archive in memory.
    pub async fn bytes(self) -> Result<Vec<u8>> {
        let mut body = self.body;
        let mut out = Vec::new();
        while let Some(chunk) = body.next_chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    /// Stream the archive into a writer, returning the number of bytes
    /// written.
    pub async fn write_to<W: AsyncWrite + Unpin>(self, writer: &mut W) -> Result<u64> {
        let mut body = self.body;
        while let Some(chunk) = body.next_chunk().await? {
            writer.write_all(&chunk).await?;
        }
        writer.flush().await?;
        Ok(body.bytes_emitted())
    }
}

/// Build a downloadable archive from a stream of descriptors.
///
/// `Content-Length` is only set when the options carry an explicit length or
/// per-entry metadata; the archive is valid either way.
pub fn download_zip<S>(descriptors: S, options: ArchiveOptions) -> Result<ZipResponse>
where
    S: Stream<Item = anyhow::Result<InputDescriptor>> + Send + 'static,
{
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/zip"));
    headers.insert(CONTENT_DISPOSITION, HeaderValue::from_static("attachment"));
    if let Some(length) = options.content_length()? {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    }

    Ok(ZipResponse {
        headers,
        body: ZipStream::new(descriptors, &options),
    })
}
