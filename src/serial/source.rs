//! Frame sources: the serial device and the telemetry filter in front of it

use super::reader::{LineFrameReader, LineRead};
use crate::config::SerialSection;
use crate::error::SourceError;
use crate::observability::MetricsCollector;
use crate::protocol::RawFrame;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, BufReader};
use tokio_serial::{DataBits, FlowControl, Parity, SerialStream, StopBits};
use tracing::{debug, info, warn};

/// Fixed line settings of the radio link: 115200 baud, 8N1
pub const BAUD_RATE: u32 = 115_200;

/// A lazy sequence of telemetry frames
///
/// Diagnostic and blank lines never come out of `next_frame`.
#[async_trait]
pub trait FrameSource: Send {
    /// Human-readable name of the source for logs
    fn name(&self) -> String;

    /// Open (or reopen) the underlying device
    async fn open(&mut self) -> Result<(), SourceError>;

    /// Wait for the next telemetry frame; `Ok(None)` means end of stream
    async fn next_frame(&mut self) -> Result<Option<RawFrame>, SourceError>;

    /// Release the underlying device; safe to call more than once
    async fn close(&mut self);
}

/// Read lines until one carries telemetry
///
/// Diagnostic (`*`), blank and oversized lines are logged, counted and
/// skipped. Returns `Ok(None)` at end of stream.
pub async fn next_telemetry_frame<R>(
    reader: &mut LineFrameReader<R>,
    metrics: &MetricsCollector,
    source_name: &str,
) -> std::io::Result<Option<RawFrame>>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        match reader.read_line().await? {
            LineRead::Eof => return Ok(None),
            LineRead::Oversized { len } => {
                metrics.oversized_frame_discarded();
                warn!(source = %source_name, len, "Discarding oversized frame");
            }
            LineRead::Line { text, lossy } => {
                let frame = RawFrame::new(text);
                if frame.is_blank() {
                    continue;
                }
                metrics.frame_read();
                if frame.is_diagnostic() {
                    metrics.diagnostic_frame_skipped();
                    debug!(source = %source_name, frame = %frame, "Diagnostic output");
                    continue;
                }
                if lossy {
                    warn!(source = %source_name, frame = %frame, "Frame contained invalid UTF-8");
                }
                return Ok(Some(frame));
            }
        }
    }
}

/// Frame source backed by a serial device
pub struct SerialFrameSource {
    device: PathBuf,
    max_frame_bytes: usize,
    reader: Option<LineFrameReader<BufReader<SerialStream>>>,
    metrics: Arc<MetricsCollector>,
}

impl SerialFrameSource {
    pub fn new(config: &SerialSection, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            device: config.device.clone(),
            max_frame_bytes: config.max_frame_bytes,
            reader: None,
            metrics,
        }
    }

    fn device_name(&self) -> String {
        self.device.to_string_lossy().into_owned()
    }

    fn io_error(&self, error: std::io::Error) -> SourceError {
        SourceError::io(self.device_name(), error)
    }
}

#[async_trait]
impl FrameSource for SerialFrameSource {
    fn name(&self) -> String {
        self.device_name()
    }

    async fn open(&mut self) -> Result<(), SourceError> {
        // Drop any previous handle before reopening the same device.
        self.reader = None;

        let builder = tokio_serial::new(self.device_name(), BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None);
        let stream = SerialStream::open(&builder).map_err(|e| self.io_error(e.into()))?;

        self.reader = Some(LineFrameReader::new(
            BufReader::new(stream),
            self.max_frame_bytes,
        ));
        info!(device = %self.device_name(), baud = BAUD_RATE, "Serial device opened (8N1)");
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<RawFrame>, SourceError> {
        let name = self.device_name();
        let reader = self.reader.as_mut().ok_or(SourceError::NotOpen)?;

        match next_telemetry_frame(reader, &self.metrics, &name).await {
            Ok(Some(frame)) => Ok(Some(frame)),
            // A serial port never ends on its own; EOF means the device went away.
            Ok(None) => {
                self.reader = None;
                Err(self.io_error(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "serial device closed",
                )))
            }
            Err(e) => {
                self.reader = None;
                Err(self.io_error(e))
            }
        }
    }

    async fn close(&mut self) {
        if self.reader.take().is_some() {
            info!(device = %self.device_name(), "Serial device closed");
        }
    }
}
