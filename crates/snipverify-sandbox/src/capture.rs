//! Bounded stream capture
//!
//! Snippets can print without limit. Readers keep the first `limit` bytes
//! and keep draining the rest so the child never blocks on a full pipe.

use snipverify_core::CapturedOutput;
use tokio::io::{AsyncRead, AsyncReadExt};

const CHUNK: usize = 8 * 1024;

/// Read `reader` to EOF, keeping at most `limit` bytes
///
/// # Errors
/// Propagates read errors from the underlying stream
pub async fn read_bounded<R>(mut reader: R, limit: usize) -> std::io::Result<CapturedOutput>
where
    R: AsyncRead + Unpin,
{
    let mut kept = Vec::with_capacity(limit.min(CHUNK));
    let mut buf = [0u8; CHUNK];
    let mut truncated = false;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(kept.len());
        if room >= n {
            kept.extend_from_slice(&buf[..n]);
        } else {
            kept.extend_from_slice(&buf[..room]);
            truncated = true;
        }
    }

    Ok(CapturedOutput::from_bounded(&kept, truncated))
}

/// Capture an optional child pipe; a missing pipe yields empty output
pub(crate) async fn read_pipe<R>(pipe: Option<R>, limit: usize) -> std::io::Result<CapturedOutput>
where
    R: AsyncRead + Unpin,
{
    match pipe {
        Some(reader) => read_bounded(reader, limit).await,
        None => Ok(CapturedOutput::default()),
    }
}
