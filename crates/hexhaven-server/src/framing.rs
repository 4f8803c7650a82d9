// Length-delimited message framing over TCP.
//
// Wire format: a 4-byte big-endian length prefix followed by the payload.
// The functions here move raw bytes only; callers handle JSON encoding.
//
// `MAX_FRAME_SIZE` bounds the allocation a length prefix can request. A board
// snapshot is the largest message the game sends and sits far below it.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum allowed frame payload (1 MiB).
pub const MAX_FRAME_SIZE: u32 = 1024 * 1024;

/// Write one frame and flush it.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let len = payload.len();
    if len > MAX_FRAME_SIZE as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame too large: {len} bytes (max {MAX_FRAME_SIZE})"),
        ));
    }
    writer.write_all(&(len as u32).to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame.
///
/// Returns `UnexpectedEof` if the stream closes before or during a frame and
/// `InvalidData` if the length exceeds `MAX_FRAME_SIZE`.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Vec<u8>> {
    let len = reader.read_u32().await?;
    if len > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {len} bytes (max {MAX_FRAME_SIZE})"),
        ));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}
