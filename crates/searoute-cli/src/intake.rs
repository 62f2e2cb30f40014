//! Newline-delimited JSON request intake.
//!
//! Each non-blank line is one calculation request. Lines that are not valid
//! JSON cannot be attributed to a task and are surfaced as
//! [`Incoming::Garbled`] so the caller can count and log them.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::io::{stdin, AsyncBufReadExt, AsyncRead, BufReader, Lines};

/// Where requests are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestSource {
    Stdin,
    File(PathBuf),
}

impl RequestSource {
    /// `None` or `-` means stdin.
    pub fn from_arg(path: Option<PathBuf>) -> Self {
        match path {
            Some(path) if path.as_os_str() != "-" => RequestSource::File(path),
            _ => RequestSource::Stdin,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Payload(Value),
    Garbled { line_number: usize, reason: String },
}

pub struct RequestReader<R> {
    lines: Lines<BufReader<R>>,
    line_number: usize,
}

impl<R: AsyncRead + Unpin> RequestReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            line_number: 0,
        }
    }

    /// Next request, or `Ok(None)` at end of input.
    pub async fn next(&mut self) -> Result<Option<Incoming>> {
        loop {
            let Some(line) = self
                .lines
                .next_line()
                .await
                .context("failed to read request stream")?
            else {
                return Ok(None);
            };
            self.line_number += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return Ok(Some(match serde_json::from_str(trimmed) {
                Ok(value) => Incoming::Payload(value),
                Err(error) => Incoming::Garbled {
                    line_number: self.line_number,
                    reason: error.to_string(),
                },
            }));
        }
    }
}

pub type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;

/// Open a reader for `source`.
pub async fn open(source: &RequestSource) -> Result<RequestReader<BoxedReader>> {
    let reader: BoxedReader = match source {
        RequestSource::Stdin => Box::new(stdin()),
        RequestSource::File(path) => Box::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open request file {}", path.display()))?,
        ),
    };
    Ok(RequestReader::new(reader))
}
