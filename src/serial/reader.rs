//! Newline framing over any async byte stream
//!
//! The serial device and the tests both feed this reader; it knows nothing
//! about ports or telemetry, only lines.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Result of reading one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    /// A complete line without its terminator. `lossy` is set when invalid
    /// UTF-8 had to be replaced.
    Line { text: String, lossy: bool },
    /// A line longer than the limit; `len` bytes were discarded
    Oversized { len: usize },
    /// The underlying stream is exhausted
    Eof,
}

/// Reads newline-terminated lines with an upper bound on line length
#[derive(Debug)]
pub struct LineFrameReader<R> {
    reader: R,
    max_frame_bytes: usize,
    buf: Vec<u8>,
}

impl<R> LineFrameReader<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(reader: R, max_frame_bytes: usize) -> Self {
        Self {
            reader,
            max_frame_bytes,
            buf: Vec::new(),
        }
    }

    /// Read the next line
    ///
    /// A final line without a trailing newline is returned as a line before
    /// [`LineRead::Eof`].
    pub async fn read_line(&mut self) -> std::io::Result<LineRead> {
        self.buf.clear();
        let mut oversized = false;
        let mut discarded = 0usize;

        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                if self.buf.is_empty() && !oversized {
                    return Ok(LineRead::Eof);
                }
                break;
            }

            let (chunk_len, found_newline) = match available.iter().position(|b| *b == b'\n') {
                Some(index) => (index + 1, true),
                None => (available.len(), false),
            };

            if !oversized {
                let content_len = self.buf.len() + chunk_len - usize::from(found_newline);
                if content_len > self.max_frame_bytes {
                    oversized = true;
                    discarded = self.buf.len();
                    self.buf.clear();
                } else {
                    self.buf.extend_from_slice(&available[..chunk_len]);
                }
            }
            if oversized {
                discarded += chunk_len;
            }

            self.reader.consume(chunk_len);
            if found_newline {
                break;
            }
        }

        if oversized {
            return Ok(LineRead::Oversized { len: discarded });
        }

        while matches!(self.buf.last(), Some(b'\n' | b'\r')) {
            self.buf.pop();
        }

        let bytes = std::mem::take(&mut self.buf);
        Ok(match String::from_utf8(bytes) {
            Ok(text) => LineRead::Line { text, lossy: false },
            Err(e) => LineRead::Line {
                text: String::from_utf8_lossy(e.as_bytes()).into_owned(),
                lossy: true,
            },
        })
    }
}
