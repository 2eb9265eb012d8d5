//! Entry names, declared sizes and the UTF-8 flag.

use percent_encoding::percent_decode_str;
use reqwest::Url;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, HeaderMap};

use crate::error::{Error, Result};

use super::input::Origin;
use super::structures::{CentralDirectoryHeader, DataDescriptor, EndOfCentralDirectory, LocalFileHeader};

/// An entry name as the caller supplied it.
///
/// Text names are always flagged as UTF-8. Raw byte names are probed unless
/// the archive options say otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryName {
    Text(String),
    Raw(Vec<u8>),
}

impl EntryName {
    fn into_parts(self) -> (Vec<u8>, bool) {
        match self {
            EntryName::Text(text) => (text.into_bytes(), true),
            EntryName::Raw(bytes) => (bytes, false),
        }
    }
}

impl From<&str> for EntryName {
    fn from(name: &str) -> Self {
        EntryName::Text(name.to_string())
    }
}

impl From<String> for EntryName {
    fn from(name: String) -> Self {
        EntryName::Text(name)
    }
}

impl From<Vec<u8>> for EntryName {
    fn from(name: Vec<u8>) -> Self {
        EntryName::Raw(name)
    }
}

impl From<&[u8]> for EntryName {
    fn from(name: &[u8]) -> Self {
        EntryName::Raw(name.to_vec())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Resolved {
    pub name: Vec<u8>,
    pub declared_size: Option<u64>,
    pub is_utf8: bool,
}

/// Work out the stored name, the best-effort size and the UTF-8 flag.
///
/// Name precedence: explicit name, the file handle's own name, the
/// `Content-Disposition` filename, then the last segment of the response URL.
pub(crate) fn resolve(
    origin: &Origin,
    name: Option<EntryName>,
    size: Option<u64>,
    buffers_are_utf8: Option<bool>,
) -> Result<Resolved> {
    let (name, is_text) = match name {
        Some(name) => name.into_parts(),
        None => (derived_name(origin).ok_or(Error::MissingName)?.into_bytes(), true),
    };
    let name = validate_name(name)?;

    let is_utf8 = is_text || buffers_are_utf8.unwrap_or_else(|| std::str::from_utf8(&name).is_ok());

    let declared_size = match origin {
        Origin::Memory { len } => Some(*len),
        Origin::File { size, .. } => Some(*size),
        Origin::Response { headers, .. } => size.or_else(|| content_length(headers)),
        Origin::Stream => size,
    };

    Ok(Resolved {
        name,
        declared_size,
        is_utf8,
    })
}

fn derived_name(origin: &Origin) -> Option<String> {
    match origin {
        Origin::File { name, .. } => Some(name.clone()),
        Origin::Response { headers, url } => headers
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(content_disposition_filename)
            .or_else(|| url.as_deref().and_then(url_file_name)),
        Origin::Memory { .. } | Origin::Stream => None,
    }
}

/// Strip trailing `/` separators. A name that is empty, or nothing but
/// separators, is rejected.
pub fn validate_name(mut name: Vec<u8>) -> Result<Vec<u8>> {
    if name.iter().all(|&b| b == b'/') {
        return Err(Error::MissingName);
    }

    while name.last() == Some(&b'/') {
        name.pop();
    }
    Ok(name)
}

/// Extract the filename from a `Content-Disposition` header value.
///
/// An RFC 5987 `filename*` parameter wins over a plain `filename`. Both are
/// percent-decoded. Quoted values may contain `;` and `,`.
pub fn content_disposition_filename(value: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for (key, raw) in disposition_params(value) {
        match key.to_ascii_lowercase().as_str() {
            "filename*" => {
                // charset'language'percent-encoded-value
                let encoded = raw.splitn(3, '\'').nth(2).unwrap_or(raw.as_str());
                extended = Some(decode(encoded));
            }
            "filename" => plain = Some(decode(&raw)),
            _ => {}
        }
    }

    extended.or(plain).filter(|name| !name.is_empty())
}

/// Split the parameters following the disposition type into key/value
/// pairs. Double-quoted values are unquoted and backslash escapes resolved.
fn disposition_params(value: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut chars = value.chars().peekable();

    // disposition type
    while chars.next_if(|&c| c != ';').is_some() {}

    while chars.next().is_some() {
        let mut key = String::new();
        while let Some(c) = chars.next_if(|&c| c != '=' && c != ';') {
            key.push(c);
        }
        if chars.next_if_eq(&'=').is_none() {
            continue;
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let mut raw = String::new();
        if chars.next_if_eq(&'"').is_some() {
            while let Some(c) = chars.next() {
                match c {
                    '"' => break,
                    '\\' => raw.extend(chars.next()),
                    c => raw.push(c),
                }
            }
            while chars.next_if(|&c| c != ';').is_some() {}
        } else {
            while let Some(c) = chars.next_if(|&c| c != ';') {
                raw.push(c);
            }
            raw = raw.trim().trim_matches('\'').to_string();
        }

        params.push((key.trim().to_string(), raw));
    }

    params
}

/// Last non-empty path segment of a URL, percent-decoded.
pub fn url_file_name(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    Some(decode(segment))
}

fn decode(value: &str) -> String {
    percent_decode_str(value).decode_utf8_lossy().into_owned()
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}

/// Name and size of an entry, known before the archive is streamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMetadata {
    pub name: EntryName,
    pub size: u64,
}

impl EntryMetadata {
    pub fn new(name: impl Into<EntryName>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

/// Exact byte length of the archive that the given entries will produce.
///
/// ```
/// use streamzip::{EntryMetadata, predict_length};
///
/// let length = predict_length(&[
///     EntryMetadata::new("file1.txt", 6),
///     EntryMetadata::new("file2.txt", 6),
/// ])
/// .unwrap();
/// assert_eq!(length, 254);
/// ```
pub fn predict_length(entries: &[EntryMetadata]) -> Result<u64> {
    const PER_ENTRY: u64 =
        (LocalFileHeader::SIZE + DataDescriptor::SIZE + CentralDirectoryHeader::SIZE) as u64;

    let mut length = EndOfCentralDirectory::SIZE as u64;
    for entry in entries {
        let (name, _) = entry.name.clone().into_parts();
        let name = validate_name(name)?;
        check_name_len(&name)?;
        if entry.size > u32::MAX as u64 {
            return Err(Error::EntryTooLarge {
                name: String::from_utf8_lossy(&name).into_owned(),
                size: entry.size,
            });
        }
        length += PER_ENTRY + 2 * name.len() as u64 + entry.size;
    }
    Ok(length)
}

/// Names are stored with a 16-bit length.
pub(crate) fn check_name_len(name: &[u8]) -> Result<()> {
    if name.len() > u16::MAX as usize {
        return Err(Error::ArchiveTooLarge("entry name longer than 65535 bytes"));
    }
    Ok(())
}
