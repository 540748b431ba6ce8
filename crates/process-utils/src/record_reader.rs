//! Delimited record reader for media tool output.
//!
//! ffmpeg redraws its status line with a bare `\r`, so records end at either
//! `\r` or `\n`. A tool that never emits a delimiter cannot grow the buffer
//! past the configured cap; the excess of an oversized record is discarded.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::debug;

/// Longest record kept by [`ToolOutputReader::new`].
const DEFAULT_MAX_RECORD_LEN: usize = 64 * 1024;

fn is_delimiter(b: &u8) -> bool {
    matches!(b, b'\n' | b'\r')
}

/// Splits a child's output stream into records.
///
/// Both read methods are cancel-safe: a partial record stays buffered and is
/// completed by the next call.
pub struct ToolOutputReader<R> {
    inner: BufReader<R>,
    record: Vec<u8>,
    max_len: usize,
    truncated: bool,
}

impl<R> ToolOutputReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self::with_max_len(reader, DEFAULT_MAX_RECORD_LEN)
    }

    pub fn with_max_len(reader: R, max_len: usize) -> Self {
        Self {
            inner: BufReader::new(reader),
            record: Vec::new(),
            max_len: max_len.max(1),
            truncated: false,
        }
    }

    /// Next non-empty raw record without its delimiter; `None` at end of stream.
    pub async fn next_bytes(&mut self) -> io::Result<Option<Vec<u8>>> {
        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                return Ok(self.take_record());
            }

            match available.iter().position(is_delimiter) {
                Some(end) => {
                    append_capped(
                        &mut self.record,
                        &mut self.truncated,
                        self.max_len,
                        &available[..end],
                    );
                    self.inner.consume(end + 1);
                    if let Some(record) = self.take_record() {
                        return Ok(Some(record));
                    }
                }
                None => {
                    let len = available.len();
                    append_capped(&mut self.record, &mut self.truncated, self.max_len, available);
                    self.inner.consume(len);
                }
            }
        }
    }

    /// Next record as trimmed text. Blank records are skipped and invalid
    /// UTF-8 is replaced.
    pub async fn next_record(&mut self) -> io::Result<Option<String>> {
        while let Some(bytes) = self.next_bytes().await? {
            let text = String::from_utf8_lossy(&bytes);
            let text = text.trim();
            if !text.is_empty() {
                return Ok(Some(text.to_string()));
            }
        }
        Ok(None)
    }

    fn take_record(&mut self) -> Option<Vec<u8>> {
        self.truncated = false;
        if self.record.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.record))
        }
    }
}

fn append_capped(record: &mut Vec<u8>, truncated: &mut bool, max_len: usize, bytes: &[u8]) {
    let room = max_len.saturating_sub(record.len());
    if bytes.len() > room && !*truncated {
        *truncated = true;
        debug!(max_len, "Output record too long, truncating");
    }
    record.extend_from_slice(&bytes[..bytes.len().min(room)]);
}
