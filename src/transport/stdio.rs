//! Newline-delimited JSON framing over async byte streams.
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::node::Message;

pub struct LineReader<R> {
    reader: R,
    // bytes of the current line; survives a cancelled `next_line`
    pending: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::new(),
        }
    }

    /// Next non-blank line, or None at EOF. Lines that are not UTF-8 are
    /// skipped; only read failures are errors.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            let read = self.reader.read_until(b'\n', &mut self.pending).await?;
            if read == 0 && self.pending.is_empty() {
                return Ok(None);
            }
            let raw = std::mem::take(&mut self.pending);
            let line = match String::from_utf8(raw) {
                Ok(line) => line,
                Err(e) => {
                    warn!("Skipping line that is not UTF-8: {}", e.utf8_error());
                    continue;
                }
            };
            let line = line.trim();
            if !line.is_empty() {
                return Ok(Some(line.to_string()));
            }
        }
    }
}

/// Write every envelope from `outbound` as one JSON line until the
/// channel closes.
pub async fn write_loop<W: AsyncWrite + Unpin>(
    mut outbound: mpsc::Receiver<Message>,
    mut writer: W,
) -> Result<()> {
    while let Some(message) = outbound.recv().await {
        let mut line = match message.to_line() {
            Ok(line) => line,
            Err(e) => {
                warn!("Dropping unserializable envelope to {}: {}", message.dest, e);
                continue;
            }
        };
        debug!("Sending {}", line);
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}
