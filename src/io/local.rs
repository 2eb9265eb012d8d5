use super::ReadChunk;
use anyhow::Result;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Size of each chunk pulled from a local file.
const CHUNK_SIZE: usize = 64 * 1024;

/// Local file reader yielding the file's content in fixed-size chunks
pub struct LocalFileReader {
    file: File,
    chunk_size: usize,
}

impl LocalFileReader {
    pub fn new(file: File) -> Self {
        Self {
            file,
            chunk_size: CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

#[async_trait]
impl ReadChunk for LocalFileReader {
    async fn read_chunk(&mut self) -> Result<Option<Bytes>> {
        let mut buf = BytesMut::zeroed(self.chunk_size);
        let n = self.file.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }

        buf.truncate(n);
        Ok(Some(buf.freeze()))
    }
}
