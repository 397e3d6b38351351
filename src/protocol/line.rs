//! Bounded request line reading.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

#[derive(Debug, Error)]
pub enum LineError {
    #[error("read failed: {0}")]
    Io(#[from] io::Error),
    #[error("request line exceeds {limit} bytes")]
    TooLong { limit: usize },
}

/// Read one request line and strip its `\n` / `\r\n` terminator.
///
/// Returns `Ok(None)` on a clean end-of-stream. A final line without a
/// terminator is still returned as a request. At most `max_len + 2` bytes
/// are buffered, so a client that never sends a newline cannot grow the
/// buffer past the limit. Invalid UTF-8 is replaced, not rejected.
pub async fn read_request_line<R>(
    reader: &mut R,
    max_len: usize,
) -> Result<Option<String>, LineError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let limit = (max_len as u64).saturating_add(2);
    let n = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Ok(None);
    }

    let mut content: &[u8] = &buf;
    if let Some(rest) = content.strip_suffix(b"\n") {
        content = rest.strip_suffix(b"\r").unwrap_or(rest);
    }
    if content.len() > max_len {
        return Err(LineError::TooLong { limit: max_len });
    }

    Ok(Some(String::from_utf8_lossy(content).into_owned()))
}
