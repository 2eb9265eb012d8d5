use std::path::{Path, PathBuf};

use clap::Parser;

use crate::error::{Error, Result};

#[derive(Parser, Debug)]
#[command(name = "streamzip")]
#[command(version)]
#[command(about = "Stream local files and HTTP downloads into a ZIP archive", long_about = None)]
#[command(after_help = "Examples:\n  \
  streamzip notes.txt photo.jpg                   store two files in archive.zip\n  \
  streamzip -o - report.pdf=https://x.org/r | wc  stream a download, renamed, to stdout\n  \
  streamzip -i https://lms.example/api/files      archive every file listed by an index\n  \
  streamzip --size notes.txt photo.jpg            print the archive size without writing it")]
pub struct Cli {
    /// Local files or HTTP URLs to store, optionally as NAME=SOURCE
    #[arg(value_name = "INPUTS")]
    pub inputs: Vec<String>,

    /// Write the archive to FILE ('-' for stdout)
    #[arg(short = 'o', long, value_name = "FILE", default_value = "archive.zip")]
    pub output: String,

    /// Paginated JSON index of remote files to append
    #[arg(short = 'i', long, value_name = "URL")]
    pub index: Option<String>,

    /// Bearer token sent with every HTTP request
    #[arg(long, value_name = "TOKEN")]
    pub token: Option<String>,

    /// Print the exact archive size and exit
    #[arg(long)]
    pub size: bool,

    /// More log output (-vv => debug, -vvv => trace)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

/// Where an input's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Local(PathBuf),
    Remote(String),
}

/// One positional input, with the entry name it was given, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputArg {
    pub name: Option<String>,
    pub source: Source,
}

impl Cli {
    pub fn is_stdout(&self) -> bool {
        self.output == "-"
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet > 0
    }

    /// Default tracing filter for the `-v`/`-q` counts.
    pub fn log_level(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (q, _) if q > 1 => "off",
            (1, _) => "error",
            (_, 0) => "warn",
            (_, 1) => "info",
            (_, 2) => "debug",
            _ => "trace",
        }
    }

    pub fn input_args(&self) -> Result<Vec<InputArg>> {
        self.inputs.iter().map(|arg| parse_input(arg)).collect()
    }
}

pub fn is_http_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Parse `SOURCE` or `NAME=SOURCE`.
///
/// An argument naming an existing path is always a plain source, so local
/// files with `=` in their name need no escaping.
pub fn parse_input(arg: &str) -> Result<InputArg> {
    let (name, source) = match arg.split_once('=') {
        Some((name, source)) if !name.is_empty() && !name.contains("://") && !Path::new(arg).exists() => {
            (Some(name.to_string()), source)
        }
        _ => (None, arg),
    };

    let source = if is_http_url(source) {
        Source::Remote(source.to_string())
    } else if source.contains("://") {
        return Err(Error::UnsupportedInput(format!(
            "{source}: only local files and http(s) URLs can be archived"
        )));
    } else {
        Source::Local(PathBuf::from(source))
    };

    Ok(InputArg { name, source })
}
