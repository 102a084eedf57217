//! Replayable message sources.
//!
//! Listeners normally receive messages from a live transport. For tests,
//! benchmarks and offline analysis the same stream can be replayed from a
//! [`MessageSource`]: an in-memory [`VecSource`] or a captured
//! [`JsonLinesSource`] with one [`ReplayRecord`] per line.
//!
//! # Example
//!
//! ```ignore
//! use mamda_orderbook::source::{JsonLinesSource, MessageSource};
//!
//! let source = JsonLinesSource::open("capture/IBM.jsonl")?;
//! for record in source.records()? {
//!     let record = record?;
//!     listener.on_msg(&sub, &record.message, record.msg_type)?;
//! }
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, Lines, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BookError, Result};
use crate::message::Message;
use crate::subscription::BookSubscription;
use crate::types::MsgType;

/// Information about where replayed messages come from.
#[derive(Debug, Clone, Default)]
pub struct SourceMetadata {
    /// Instrument symbol, if known
    pub symbol: Option<String>,

    pub file_path: Option<PathBuf>,

    /// Where the capture came from (e.g. "memory", "jsonl")
    pub provider: Option<String>,

    pub estimated_messages: Option<u64>,

    /// File size in bytes
    pub file_size: Option<u64>,
}

impl SourceMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn with_file_path(mut self, path: impl AsRef<Path>) -> Self {
        self.file_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_estimated_messages(mut self, count: u64) -> Self {
        self.estimated_messages = Some(count);
        self
    }

    /// Metadata for a capture file. The symbol is taken from the file
    /// name up to the first `_` or `.` (`IBM_2024-01-02.jsonl` → `IBM`).
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let mut metadata = Self::new().with_file_path(path);

        if let Ok(meta) = std::fs::metadata(path) {
            metadata.file_size = Some(meta.len());
        }

        if let Some(stem) = path.file_name().and_then(|n| n.to_str()) {
            let symbol = stem.split(['_', '.']).next().unwrap_or(stem);
            if !symbol.is_empty() {
                metadata.symbol = Some(symbol.to_string());
            }
        }
        metadata
    }
}

/// One captured message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayRecord {
    pub msg_type: MsgType,

    /// Subscription the message arrived on; replay tools fall back to a
    /// default subscription when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<BookSubscription>,

    pub message: Message,
}

impl ReplayRecord {
    pub fn new(msg_type: MsgType, message: Message) -> Self {
        Self {
            msg_type,
            subscription: None,
            message,
        }
    }

    pub fn with_subscription(mut self, sub: BookSubscription) -> Self {
        self.subscription = Some(sub);
        self
    }
}

/// A stream of captured messages.
pub trait MessageSource {
    /// Iterator over records. Items are fallible because decoding may
    /// fail part way through a capture.
    type RecordIter: Iterator<Item = Result<ReplayRecord>>;

    /// Consume the source and iterate over its records.
    fn records(self) -> Result<Self::RecordIter>;

    fn metadata(&self) -> &SourceMetadata;
}

/// In-memory source.
pub struct VecSource {
    records: Vec<ReplayRecord>,
    metadata: SourceMetadata,
}

impl VecSource {
    pub fn new(records: Vec<ReplayRecord>) -> Self {
        Self {
            metadata: SourceMetadata::new()
                .with_provider("memory")
                .with_estimated_messages(records.len() as u64),
            records,
        }
    }

    pub fn with_metadata(mut self, metadata: SourceMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

impl MessageSource for VecSource {
    type RecordIter = std::iter::Map<std::vec::IntoIter<ReplayRecord>, fn(ReplayRecord) -> Result<ReplayRecord>>;

    fn records(self) -> Result<Self::RecordIter> {
        Ok(self.records.into_iter().map(Ok as fn(ReplayRecord) -> Result<ReplayRecord>))
    }

    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }
}

/// JSON-lines capture: one [`ReplayRecord`] per line. Blank lines and
/// lines starting with `#` are skipped.
pub struct JsonLinesSource<R: BufRead> {
    reader: R,
    metadata: SourceMetadata,
}

impl JsonLinesSource<BufReader<File>> {
    /// Open a capture file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            BookError::generic(format!("failed to open {}: {e}", path.display()))
        })?;
        let metadata = SourceMetadata::from_path(path).with_provider("jsonl");
        log::info!("Opened capture {}", path.display());
        Ok(Self {
            reader: BufReader::new(file),
            metadata,
        })
    }
}

impl<R: BufRead> JsonLinesSource<R> {
    /// Read records from any buffered reader.
    pub fn from_reader(reader: R) -> Self {
        Self {
            reader,
            metadata: SourceMetadata::new().with_provider("jsonl"),
        }
    }

    pub fn with_metadata(mut self, metadata: SourceMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

impl<R: BufRead> MessageSource for JsonLinesSource<R> {
    type RecordIter = JsonLinesIter<R>;

    fn records(self) -> Result<Self::RecordIter> {
        Ok(JsonLinesIter {
            lines: self.reader.lines(),
            line_no: 0,
        })
    }

    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }
}

/// Iterator returned by [`JsonLinesSource::records`].
pub struct JsonLinesIter<R> {
    lines: Lines<R>,
    line_no: usize,
}

impl<R: BufRead> Iterator for JsonLinesIter<R> {
    type Item = Result<ReplayRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_no += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            return Some(serde_json::from_str(trimmed).map_err(|e| {
                BookError::data_format(format!("line {}: {e}", self.line_no))
            }));
        }
    }
}

/// Write records as JSON lines.
pub fn write_json_lines<'a, W: Write>(
    mut writer: W,
    records: impl IntoIterator<Item = &'a ReplayRecord>,
) -> Result<usize> {
    let mut count = 0;
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::FieldValue;
    use std::io::Cursor;

    fn records() -> Vec<ReplayRecord> {
        vec![
            ReplayRecord::new(MsgType::Initial, Message::new().with(10, FieldValue::I64(1)))
                .with_subscription(BookSubscription::new("SRC", "IBM")),
            ReplayRecord::new(MsgType::Update, Message::new().with(10, FieldValue::I64(2))),
        ]
    }

    #[test]
    fn test_vec_source() {
        let source = VecSource::new(records());
        assert_eq!(source.metadata().estimated_messages, Some(2));
        let replayed: Vec<_> = source.records().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(replayed, records());
    }

    #[test]
    fn test_json_lines_through_writer() {
        let mut buf = Vec::new();
        assert_eq!(write_json_lines(&mut buf, &records()).unwrap(), 2);

        let source = JsonLinesSource::from_reader(Cursor::new(buf));
        let replayed: Vec<_> = source.records().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(replayed, records());
        assert_eq!(replayed[1].subscription, None);
    }

    #[test]
    fn test_json_lines_skips_comments_and_reports_line() {
        let text = "# capture\n\n{not json}\n";
        let source = JsonLinesSource::from_reader(Cursor::new(text));
        let mut iter = source.records().unwrap();

        let err = iter.next().unwrap().unwrap_err();
        assert!(err.to_string().contains("line 3"));
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_metadata_from_path() {
        let metadata = SourceMetadata::from_path("/tmp/does-not-exist/IBM_2024-01-02.jsonl");
        assert_eq!(metadata.symbol.as_deref(), Some("IBM"));
        assert_eq!(metadata.file_size, None);
    }
}
