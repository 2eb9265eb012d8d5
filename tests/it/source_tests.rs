use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use futures::StreamExt;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, HeaderMap, HeaderValue, LAST_MODIFIED};
use streamzip::zip::DosDateTime;
use streamzip::zip::structures::{CentralDirectoryHeader, EndOfCentralDirectory};
use streamzip::{
    ArchiveOptions, ByteSource, Error, InputDescriptor, ReadChunk, ResponseHandle, ZipStream,
};

use crate::read_back;

/// Records every read in a shared log.
struct Logged {
    label: &'static str,
    chunks: Vec<&'static [u8]>,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ReadChunk for Logged {
    async fn read_chunk(&mut self) -> Result<Option<Bytes>> {
        self.log.lock().unwrap().push(format!("{}:read", self.label));
        if self.chunks.is_empty() {
            return Ok(None);
        }
        Ok(Some(Bytes::from_static(self.chunks.remove(0))))
    }

    async fn cancel(&mut self) -> Result<()> {
        self.log.lock().unwrap().push(format!("{}:cancel", self.label));
        Ok(())
    }
}

fn logged(label: &'static str, chunks: Vec<&'static [u8]>, log: &Arc<Mutex<Vec<String>>>) -> ByteSource {
    ByteSource::new(Logged {
        label,
        chunks,
        log: log.clone(),
    })
}

async fn drain(mut zip: ZipStream) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(chunk) = zip.next_chunk().await.unwrap() {
        out.extend_from_slice(&chunk);
    }
    out
}

#[tokio::test]
async fn entries_are_read_one_after_another() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let requested = Arc::new(AtomicUsize::new(0));

    let sources = vec![
        InputDescriptor::new(logged("a", vec![&b"aa"[..], &b"aa"[..]], &log)).name("a"),
        InputDescriptor::new(logged("b", vec![&b"bb"[..]], &log)).name("b"),
    ];
    let descriptors = futures::stream::iter(sources).map({
        let requested = requested.clone();
        move |descriptor| {
            requested.fetch_add(1, Ordering::SeqCst);
            Ok(descriptor)
        }
    });
    let mut zip = ZipStream::new(descriptors, &ArchiveOptions::default());

    // header, name, two content chunks and the descriptor of "a"
    for _ in 0..5 {
        zip.next_chunk().await.unwrap().unwrap();
        log.lock().unwrap().push("emitted".to_string());
    }
    assert_eq!(requested.load(Ordering::SeqCst), 1);
    assert!(!log.lock().unwrap().iter().any(|e| e.starts_with("b:")));

    while zip.next_chunk().await.unwrap().is_some() {}
    assert_eq!(requested.load(Ordering::SeqCst), 2);

    let log = log.lock().unwrap();
    let a_done = log.iter().rposition(|e| e == "a:read").unwrap();
    let b_first = log.iter().position(|e| e == "b:read").unwrap();
    assert!(a_done < b_first);
    // a's descriptor went out before b was touched
    assert_eq!(log[b_first - 1], "emitted");
}

#[tokio::test]
async fn chunks_are_pulled_not_pushed() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut zip = ZipStream::from_descriptors(
        vec![InputDescriptor::new(logged("a", vec![&b"1"[..], &b"2"[..], &b"3"[..]], &log)).name("a")],
        &ArchiveOptions::default(),
    );

    zip.next_chunk().await.unwrap();
    zip.next_chunk().await.unwrap();
    assert!(log.lock().unwrap().is_empty());

    assert_eq!(zip.next_chunk().await.unwrap().unwrap(), &b"1"[..]);
    assert_eq!(log.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn cancel_reaches_current_source() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut zip = ZipStream::from_descriptors(
        vec![
            InputDescriptor::new(logged("a", vec![&b"1"[..], &b"2"[..]], &log)).name("a"),
            InputDescriptor::new(logged("b", vec![&b"3"[..]], &log)).name("b"),
        ],
        &ArchiveOptions::default(),
    );

    for _ in 0..3 {
        zip.next_chunk().await.unwrap();
    }
    zip.cancel().await;

    assert_eq!(*log.lock().unwrap(), vec!["a:read", "a:cancel"]);
    assert!(zip.next_chunk().await.unwrap().is_none());
}

#[tokio::test]
async fn failing_source_cancels_nothing_else() {
    let chunks = futures::stream::iter(vec![
        Ok(Bytes::from_static(b"partial")),
        Err(std::io::Error::other("connection reset")),
    ]);
    let mut zip = ZipStream::from_descriptors(
        vec![
            InputDescriptor::new(ByteSource::from_stream(chunks)).name("broken"),
            InputDescriptor::new("never").name("after"),
        ],
        &ArchiveOptions::default(),
    );

    let mut emitted = Vec::new();
    let err = loop {
        match zip.next_chunk().await {
            Ok(Some(chunk)) => emitted.extend_from_slice(&chunk),
            Ok(None) => panic!("archive completed despite failing source"),
            Err(e) => break e,
        }
    };

    assert!(matches!(err, Error::Upstream(_)));
    assert!(err.to_string().contains("connection reset"));
    assert!(emitted.ends_with(b"partial"));
    assert!(zip.next_chunk().await.unwrap().is_none());
}

#[tokio::test]
async fn response_metadata() {
    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_static("attachment; filename*=UTF-8''r%C3%A9sum%C3%A9.pdf"),
    );
    headers.insert(CONTENT_LENGTH, HeaderValue::from_static("4"));
    headers.insert(
        LAST_MODIFIED,
        HeaderValue::from_static("Wed, 26 Jul 2023 10:00:00 GMT"),
    );
    let named = ResponseHandle::new(headers, ByteSource::from_bytes(&b"%PDF"[..]))
        .with_url("https://lms.example/files/1/download");

    let unnamed = ResponseHandle::new(HeaderMap::new(), ByteSource::from_bytes(&b"body"[..]))
        .with_url("https://lms.example/files/My%20Notes.txt?verifier=abc");

    let zip = ZipStream::from_descriptors(
        vec![InputDescriptor::new(named), InputDescriptor::new(unnamed)],
        &ArchiveOptions::default(),
    );
    let bytes = drain(zip).await;

    assert_eq!(
        read_back(&bytes),
        vec![
            ("résumé.pdf".to_string(), b"%PDF".to_vec()),
            ("My Notes.txt".to_string(), b"body".to_vec()),
        ]
    );

    let eocd = EndOfCentralDirectory::from_bytes(&bytes[bytes.len() - 22..]).unwrap();
    let first = CentralDirectoryHeader::from_bytes(&bytes[eocd.cd_offset as usize..]).unwrap();
    let last_modified = Utc.with_ymd_and_hms(2023, 7, 26, 10, 0, 0).unwrap();
    assert_eq!(first.modified, DosDateTime::from_utc(&last_modified));
}

#[tokio::test]
async fn nameless_response_is_rejected() {
    let handle = ResponseHandle::new(HeaderMap::new(), ByteSource::from_bytes(&b"x"[..]));
    let mut zip = ZipStream::from_descriptors(vec![InputDescriptor::new(handle)], &ArchiveOptions::default());
    let err = zip.next_chunk().await.unwrap_err();
    assert_eq!(err.to_string(), "The file must have a name.");
}

#[tokio::test]
async fn local_file_in_small_chunks() {
    use streamzip::FileHandle;
    use streamzip::io::LocalFileReader;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big.bin");
    let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
    std::fs::write(&path, &data).unwrap();

    let handle = FileHandle::open(&path).await.unwrap();
    assert_eq!(handle.name(), "big.bin");
    assert_eq!(handle.size(), 10_000);

    let file = tokio::fs::File::open(&path).await.unwrap();
    let chunked = ByteSource::new(LocalFileReader::new(file).with_chunk_size(333));

    let zip = ZipStream::from_descriptors(
        vec![
            InputDescriptor::new(handle),
            InputDescriptor::new(chunked).name("copy.bin"),
        ],
        &ArchiveOptions::default(),
    );
    let bytes = drain(zip).await;
    assert_eq!(
        read_back(&bytes),
        vec![("big.bin".to_string(), data.clone()), ("copy.bin".to_string(), data)]
    );
}

#[tokio::test]
async fn directory_is_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let err = streamzip::FileHandle::open(dir.path()).await.unwrap_err();
    assert!(matches!(err, Error::UnsupportedInput(_)));
}
