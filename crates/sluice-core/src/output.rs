//! Report output as JSON or JSON Lines.
//!
//! The resize command writes one record per saved image. JSON emits a single
//! array; JSONL emits one object per line so large runs can be streamed and
//! grepped.

use serde::Serialize;
use std::fmt;
use std::io::{self, Write};

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Single JSON array
    #[default]
    Json,
    /// One JSON object per line (newline-delimited JSON)
    JsonLines,
}

impl OutputFormat {
    /// Parse format from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "jsonl" | "jsonlines" | "ndjson" => Some(Self::JsonLines),
            _ => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::JsonLines => f.write_str("jsonl"),
        }
    }
}

/// Serializes records to an underlying writer.
pub struct OutputWriter<W: Write> {
    writer: W,
    format: OutputFormat,
    pretty: bool,
    items_written: usize,
}

impl<W: Write> OutputWriter<W> {
    /// `pretty` only affects [`OutputFormat::Json`]; JSONL is always one
    /// compact object per line.
    pub fn new(writer: W, format: OutputFormat, pretty: bool) -> Self {
        Self {
            writer,
            format,
            pretty,
            items_written: 0,
        }
    }

    fn write_value<T: Serialize + ?Sized>(&mut self, value: &T, pretty: bool) -> io::Result<()> {
        if pretty {
            serde_json::to_writer_pretty(&mut self.writer, value)
        } else {
            serde_json::to_writer(&mut self.writer, value)
        }
        .map_err(io::Error::other)?;
        writeln!(self.writer)
    }

    /// Write a single record as one JSON document (or one JSONL line).
    pub fn write<T: Serialize>(&mut self, item: &T) -> io::Result<()> {
        let pretty = self.pretty && self.format == OutputFormat::Json;
        self.write_value(item, pretty)?;
        self.items_written += 1;
        Ok(())
    }

    /// Write a batch: a JSON array, or one line per record.
    pub fn write_all<T: Serialize>(&mut self, items: &[T]) -> io::Result<()> {
        match self.format {
            OutputFormat::Json => {
                let pretty = self.pretty;
                self.write_value(items, pretty)?;
                self.items_written += items.len();
            }
            OutputFormat::JsonLines => {
                for item in items {
                    self.write(item)?;
                }
            }
        }
        Ok(())
    }

    pub fn items_written(&self) -> usize {
        self.items_written
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Consume the writer and return the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}
