//! Length-prefixed frame codec for the duplex socket binding
//!
//! Every frame is a 4-byte big-endian payload length followed by the
//! payload itself. The reader accumulates until the full frame is in hand
//! (a text command may span any number of TCP segments) and enforces a
//! maximum payload size up front, before allocating.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("Frame of {len} bytes exceeds maximum of {max}")]
    TooLarge { len: usize, max: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads length-prefixed frames off a byte stream.
pub struct FrameReader<R> {
    reader: R,
    max_frame: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, max_frame: usize) -> Self {
        Self { reader, max_frame }
    }

    /// Read the next frame payload. `Ok(None)` means the peer closed the
    /// connection at a frame boundary (or mid-header, which we treat the
    /// same way).
    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let mut header = [0u8; 4];
        match self.reader.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_be_bytes(header) as usize;
        if len > self.max_frame {
            return Err(FrameError::TooLarge {
                len,
                max: self.max_frame,
            });
        }

        let mut payload = vec![0u8; len];
        self.reader.read_exact(&mut payload).await?;
        Ok(Some(payload))
    }
}

/// Write one frame: length header then payload.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> std::io::Result<()> {
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}
