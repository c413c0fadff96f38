//! Duplex-socket transport binding
//!
//! A single long-lived TCP connection carries a small command protocol over
//! length-prefixed frames (see [`frame`]):
//!
//! - `bind:<stream id>` — attach the connection to an existing stream; a
//!   failed bind clears any previous binding
//! - `data:<bytes>` — inline chunk, prefix stripped, forwarded hash-less
//! - `close` — end the session
//! - anything else — raw binary chunk, forwarded as-is
//!
//! Chunks received while unbound are rejected with an advisory reply and
//! never reach the pipeline. The engine does not auto-finalize when the
//! connection drops; abandoned streams age out through the idle timeout.

pub mod frame;

use std::sync::Arc;

use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};

use crate::upload::{UploadError, UploadService, UploadStream};

use frame::{write_frame, FrameError, FrameReader};

const BIND_PREFIX: &[u8] = b"bind:";
const DATA_PREFIX: &[u8] = b"data:";
const CLOSE_COMMAND: &[u8] = b"close";

/// Accept loop. One task per connection; connections are independent and
/// only contend on the registry's key space.
pub async fn serve(listener: TcpListener, service: UploadService, max_frame: usize) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tracing::debug!(peer = %peer, "Socket connection accepted");
                let service = service.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, service, max_frame).await {
                        tracing::warn!(peer = %peer, error = %e, "Socket connection error");
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to accept socket connection");
            }
        }
    }
}

enum Binding {
    Unbound,
    Bound(Arc<UploadStream>),
}

async fn handle_connection(
    stream: TcpStream,
    service: UploadService,
    max_frame: usize,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut frames = FrameReader::new(read_half, max_frame);
    let mut binding = Binding::Unbound;

    loop {
        let payload = match frames.read_frame().await {
            Ok(Some(payload)) => payload,
            Ok(None) => break,
            Err(FrameError::TooLarge { len, max }) => {
                tracing::debug!(len, max, "Closing connection on oversized frame");
                write_frame(&mut write_half, b"err:frame-too-large").await?;
                break;
            }
            Err(FrameError::Io(e)) => return Err(e),
        };

        if let Some(id) = payload.strip_prefix(BIND_PREFIX) {
            binding = bind(&service, id, &mut write_half).await?;
        } else if payload == CLOSE_COMMAND {
            write_frame(&mut write_half, b"ok:close").await?;
            break;
        } else {
            // inline-data command or raw binary chunk; same pipeline path
            let chunk = payload.strip_prefix(DATA_PREFIX).unwrap_or(&payload);
            binding = append(&service, binding, chunk, &mut write_half).await?;
        }
    }

    Ok(())
}

async fn bind(
    service: &UploadService,
    id: &[u8],
    write_half: &mut OwnedWriteHalf,
) -> std::io::Result<Binding> {
    let stream_id = String::from_utf8_lossy(id);
    match service.registry().lookup(&stream_id).await {
        Some(record) => {
            tracing::debug!(stream_id = %record.stream_id, "Connection bound to stream");
            write_frame(write_half, b"ok:bound").await?;
            Ok(Binding::Bound(record))
        }
        None => {
            write_frame(write_half, b"err:stream-not-found").await?;
            Ok(Binding::Unbound)
        }
    }
}

async fn append(
    service: &UploadService,
    binding: Binding,
    chunk: &[u8],
    write_half: &mut OwnedWriteHalf,
) -> std::io::Result<Binding> {
    let record = match binding {
        Binding::Unbound => {
            write_frame(write_half, b"err:unbound").await?;
            return Ok(Binding::Unbound);
        }
        Binding::Bound(record) => record,
    };

    match service.append_chunk(&record, chunk, None).await {
        Ok(_) => {
            write_frame(write_half, b"ok:data").await?;
            Ok(Binding::Bound(record))
        }
        Err(UploadError::StreamNotFound(id)) => {
            // stream evicted mid-connection; drop the binding
            tracing::debug!(stream_id = %id, "Bound stream disappeared");
            write_frame(write_half, b"err:stream-not-found").await?;
            Ok(Binding::Unbound)
        }
        Err(e) => {
            tracing::error!(stream_id = %record.stream_id, error = %e, "Chunk append failed");
            write_frame(write_half, b"err:internal").await?;
            Ok(Binding::Bound(record))
        }
    }
}
