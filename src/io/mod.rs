mod http;
mod local;
mod memory;
#[cfg(test)]
pub(crate) mod test_server;

pub use http::{
    RemoteFile, ResponseBody, fetch, fetch_paginated, http_client, lazy_fetch, next_link,
};
pub use local::LocalFileReader;
pub use memory::{MemoryReader, StreamReader};

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use tracing::warn;

/// Trait for pulling an entry's content one chunk at a time
#[async_trait]
pub trait ReadChunk: Send {
    /// Read the next chunk, or `None` once the source is exhausted
    async fn read_chunk(&mut self) -> Result<Option<Bytes>>;

    /// Abandon the source, releasing any in-flight read
    async fn cancel(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A lazy, single-pass sequence of byte chunks.
///
/// Once the underlying reader reports the end of its data (or fails, or is
/// cancelled) it is dropped, so any further read yields `None`. A source can
/// never be restarted.
pub struct ByteSource {
    reader: Option<Box<dyn ReadChunk>>,
}

impl ByteSource {
    pub fn new<R: ReadChunk + 'static>(reader: R) -> Self {
        Self {
            reader: Some(Box::new(reader)),
        }
    }

    /// Wrap an in-memory buffer. It is yielded as a single chunk.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self::new(MemoryReader::new(data.into()))
    }

    /// Wrap any stream of byte chunks (the async-iterable input).
    pub fn from_stream<S, B, E>(stream: S) -> Self
    where
        S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
        B: Into<Bytes> + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        Self::new(StreamReader::new(stream))
    }

    /// An already exhausted source.
    pub fn empty() -> Self {
        Self { reader: None }
    }

    pub fn is_exhausted(&self) -> bool {
        self.reader.is_none()
    }

    pub async fn read_chunk(&mut self) -> Result<Option<Bytes>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        match reader.read_chunk().await {
            Ok(Some(chunk)) => Ok(Some(chunk)),
            Ok(None) => {
                self.reader = None;
                Ok(None)
            }
            Err(e) => {
                self.reader = None;
                Err(e)
            }
        }
    }

    /// Best-effort cancellation. Errors raised while unwinding are logged and
    /// swallowed.
    pub async fn cancel(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            if let Err(e) = reader.cancel().await {
                warn!("ignoring error while cancelling byte source: {e:#}");
            }
        }
    }
}

impl std::fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteSource")
            .field("exhausted", &self.is_exhausted())
            .finish()
    }
}
