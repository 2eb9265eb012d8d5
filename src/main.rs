//! Main entry point for the streamzip CLI application.
//!
//! This binary streams local files and HTTP downloads into a ZIP archive
//! written to a file or to stdout.

use anyhow::{Context, Result, bail};
use clap::Parser;
use futures::StreamExt;
use reqwest::Client;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use streamzip::cli::{InputArg, Source};
use streamzip::io::{fetch, fetch_paginated, http_client};
use streamzip::{
    ArchiveOptions, Cli, EntryMetadata, FileHandle, InputDescriptor, RemoteFile, download_zip,
    lazy_fetch, predict_length,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level())),
        )
        .with_writer(std::io::stderr)
        .init();

    let inputs = cli.input_args()?;
    let client = http_client(cli.token.as_deref())?;

    let indexed = match &cli.index {
        Some(url) => {
            let files: Vec<RemoteFile> = fetch_paginated(&client, url).await?;
            info!(url = %url, files = files.len(), "fetched file index");
            files
        }
        None => Vec::new(),
    };

    if inputs.is_empty() && indexed.is_empty() {
        bail!("nothing to archive: pass at least one input or --index");
    }

    if cli.size {
        let metadata = collect_metadata(&inputs, &indexed).await?;
        println!("{}", predict_length(&metadata)?);
        return Ok(());
    }

    let quiet = cli.is_quiet();
    let descriptors = futures::stream::iter(inputs)
        .then({
            let client = client.clone();
            move |input| open_input(client.clone(), input, quiet)
        })
        .chain(lazy_fetch(client, indexed));

    let response = download_zip(descriptors, ArchiveOptions::default())?;

    let written = if cli.is_stdout() {
        response.write_to(&mut tokio::io::stdout()).await?
    } else {
        let mut file = tokio::fs::File::create(&cli.output)
            .await
            .with_context(|| format!("cannot create {}", cli.output))?;
        match response.write_to(&mut file).await {
            Ok(written) => written,
            Err(e) => {
                drop(file);
                if let Err(rm) = tokio::fs::remove_file(&cli.output).await {
                    debug!("could not remove partial archive: {rm}");
                }
                return Err(e.into());
            }
        }
    };

    if !quiet && !cli.is_stdout() {
        eprintln!("\nWrote {} to {}", format_size(written), cli.output);
    }

    Ok(())
}

/// Open one positional input as an archive entry.
async fn open_input(client: Client, input: InputArg, quiet: bool) -> Result<InputDescriptor> {
    let InputArg { name, source } = input;

    let descriptor = match source {
        Source::Local(path) => {
            if !quiet {
                eprintln!("  adding: {}", path.display());
            }
            let handle = FileHandle::open(&path)
                .await
                .with_context(|| format!("cannot open {}", path.display()))?;
            InputDescriptor::new(handle)
        }
        Source::Remote(url) => {
            if !quiet {
                eprintln!("  fetching: {url}");
            }
            fetch(&client, RemoteFile::new(url)).await?
        }
    };

    Ok(match name {
        Some(name) => descriptor.name(name),
        None => descriptor,
    })
}

/// Names and sizes of every input, for `--size`. Fails if any size is only
/// known once the download starts.
async fn collect_metadata(inputs: &[InputArg], indexed: &[RemoteFile]) -> Result<Vec<EntryMetadata>> {
    let mut metadata = Vec::with_capacity(inputs.len() + indexed.len());

    for input in inputs {
        match &input.source {
            Source::Local(path) => {
                let handle = FileHandle::open(path)
                    .await
                    .with_context(|| format!("cannot open {}", path.display()))?;
                let name = input.name.clone().unwrap_or_else(|| handle.name().to_string());
                metadata.push(EntryMetadata::new(name, handle.size()));
            }
            Source::Remote(url) => bail!("size of {url} is not known before downloading it"),
        }
    }

    for file in indexed {
        match (&file.name, file.size) {
            (Some(name), Some(size)) => metadata.push(EntryMetadata::new(name.as_str(), size)),
            _ => bail!("index entry {} has no name or size", file.url),
        }
    }

    Ok(metadata)
}

/// Format a byte size into a human-readable string.
///
/// Automatically selects the appropriate unit (bytes, KB, MB, GB)
/// based on the size magnitude.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
