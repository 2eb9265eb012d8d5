use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, LINK};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use super::ReadChunk;
use crate::zip::{InputDescriptor, ResponseHandle};
use anyhow::{Context, Result, bail};

/// Number of attempts made to open a remote file before giving up.
const MAX_RETRY: u32 = 10;

/// Build the HTTP client used for remote inputs, optionally authenticated
/// with a bearer token.
pub fn http_client(token: Option<&str>) -> Result<Client> {
    let mut headers = HeaderMap::new();
    if let Some(token) = token {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .context("bearer token is not a valid header value")?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    Ok(Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .default_headers(headers)
        .build()?)
}

/// Body of an HTTP response, read chunk by chunk as the archive pulls it
pub struct ResponseBody {
    response: Option<Response>,
}

impl ResponseBody {
    pub fn new(response: Response) -> Self {
        Self {
            response: Some(response),
        }
    }
}

#[async_trait]
impl ReadChunk for ResponseBody {
    async fn read_chunk(&mut self) -> Result<Option<Bytes>> {
        let Some(response) = self.response.as_mut() else {
            return Ok(None);
        };

        let chunk = response
            .chunk()
            .await
            .with_context(|| format!("failed reading body of {}", response.url()))?;
        if chunk.is_none() {
            self.response = None;
        }
        Ok(chunk)
    }

    async fn cancel(&mut self) -> Result<()> {
        // Dropping the response closes the connection.
        self.response = None;
        Ok(())
    }
}

/// A file to fetch over HTTP and store in the archive.
///
/// Without a name, the entry is named from the response's
/// `Content-Disposition` header or URL.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(from = "RemoteFileRecord")]
pub struct RemoteFile {
    pub name: Option<String>,
    pub url: String,
    pub size: Option<u64>,
}

/// An index entry as served. File APIs commonly send `display_name` and
/// `filename` side by side.
#[derive(Deserialize)]
struct RemoteFileRecord {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    filename: Option<String>,
    url: String,
    #[serde(default)]
    size: Option<u64>,
}

impl From<RemoteFileRecord> for RemoteFile {
    fn from(record: RemoteFileRecord) -> Self {
        let name = [record.name, record.display_name, record.filename]
            .into_iter()
            .flatten()
            .find(|name| !name.is_empty());

        Self {
            name,
            url: record.url,
            size: record.size,
        }
    }
}

impl RemoteFile {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            name: None,
            url: url.into(),
            size: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Open a remote file and describe it as an archive entry. The body is not
/// read yet.
pub async fn fetch(client: &Client, file: RemoteFile) -> Result<InputDescriptor> {
    let response = get_with_retry(client, &file.url).await?;
    let mut descriptor = InputDescriptor::new(ResponseHandle::from(response));
    if let Some(name) = file.name {
        descriptor = descriptor.name(name);
    }
    if let Some(size) = file.size {
        descriptor = descriptor.size(size);
    }
    Ok(descriptor)
}

/// Turn a list of remote files into a lazy descriptor stream.
///
/// A request is only sent when the stream is polled for the next descriptor,
/// so files are downloaded strictly one after another as the archive
/// consumes them.
pub fn lazy_fetch(
    client: Client,
    files: Vec<RemoteFile>,
) -> impl Stream<Item = Result<InputDescriptor>> + Send + 'static {
    futures::stream::iter(files).then(move |file| {
        let client = client.clone();
        async move { fetch(&client, file).await }
    })
}

/// Send a GET request, retrying connection failures and timeouts.
///
/// Only the request is retried; once the response is handed out its body is
/// read exactly once.
async fn get_with_retry(client: &Client, url: &str) -> Result<Response> {
    let mut retry_count = 0;

    loop {
        match client.get(url).send().await {
            Ok(resp) => {
                if !resp.status().is_success() {
                    bail!("HTTP request for {} failed with status: {}", url, resp.status());
                }
                debug!(url, status = %resp.status(), "opened remote file");
                return Ok(resp);
            }
            Err(e) if e.is_timeout() || e.is_connect() => {
                retry_count += 1;
                if retry_count >= MAX_RETRY {
                    bail!("Max retries exceeded for {}", url);
                }
                warn!("Connection error, retry {}/{}: {}", retry_count, MAX_RETRY, e);
                tokio::time::sleep(Duration::from_millis(500 * retry_count as u64)).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Extract the `rel="next"` target from a `Link` header.
pub fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|link| {
        let mut parts = link.split(';');
        let target = parts.next()?.trim();
        let target = target.strip_prefix('<')?.strip_suffix('>')?;
        parts
            .any(|param| {
                let param = param.trim();
                param == r#"rel="next""# || param == "rel=next"
            })
            .then(|| target.to_string())
    })
}

/// Fetch every page of a paginated JSON array endpoint, following `Link`
/// headers, and concatenate the results.
pub async fn fetch_paginated<T: DeserializeOwned>(client: &Client, url: &str) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut next = Some(url.to_string());

    while let Some(page_url) = next.take() {
        let resp = get_with_retry(client, &page_url).await?;
        next = resp
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(next_link)
            .filter(|next_url| *next_url != page_url);

        let body = resp.bytes().await?;
        let page: Vec<T> = serde_json::from_slice(&body)
            .with_context(|| format!("{} did not return a JSON array", page_url))?;
        debug!(url = %page_url, items = page.len(), "fetched page");
        items.extend(page);
    }

    Ok(items)
}
