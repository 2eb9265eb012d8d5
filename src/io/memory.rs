use std::pin::Pin;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};

use super::ReadChunk;

/// In-memory buffer, yielded whole as one chunk
pub struct MemoryReader {
    data: Option<Bytes>,
}

impl MemoryReader {
    pub fn new(data: Bytes) -> Self {
        Self { data: Some(data) }
    }
}

#[async_trait]
impl ReadChunk for MemoryReader {
    async fn read_chunk(&mut self) -> Result<Option<Bytes>> {
        Ok(self.data.take())
    }
}

type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Adapter over an arbitrary stream of chunks
pub struct StreamReader {
    stream: ChunkStream,
}

impl StreamReader {
    pub fn new<S, B, E>(stream: S) -> Self
    where
        S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
        B: Into<Bytes> + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        Self {
            stream: Box::pin(stream.map(|item| -> Result<Bytes> {
                item.map(Into::into).map_err(Into::into)
            })),
        }
    }
}

#[async_trait]
impl ReadChunk for StreamReader {
    async fn read_chunk(&mut self) -> Result<Option<Bytes>> {
        self.stream.next().await.transpose()
    }
}
