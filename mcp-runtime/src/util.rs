use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// How a client frames its messages. Replies mirror the framing of the
/// request they answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Framing {
    /// One JSON document per line.
    Lines,
    /// LSP-style `Content-Length` header block followed by the body.
    ContentLength,
}

#[derive(Debug)]
pub(crate) struct Frame {
    pub payload: Result<Value, String>,
    pub framing: Framing,
}

impl Frame {
    fn rejected(detail: impl Into<String>, framing: Framing) -> Self {
        Self {
            payload: Err(detail.into()),
            framing,
        }
    }
}

/// Reads the next message, detecting its framing from the first non-blank
/// line. `Ok(None)` on EOF. Malformed input (bad JSON, bad headers, invalid
/// UTF-8, oversized bodies) still yields a frame so the caller can answer
/// with an error and keep serving; `Err` is reserved for I/O failures.
pub(crate) async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, String>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let Some(raw) = read_raw_line(reader).await? else {
            return Ok(None);
        };
        let Ok(line) = String::from_utf8(raw) else {
            return Ok(Some(Frame::rejected("MCP input is not valid UTF-8", Framing::Lines)));
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let length = match content_length(trimmed) {
            None => {
                return Ok(Some(Frame {
                    payload: serde_json::from_str(trimmed).map_err(|e| e.to_string()),
                    framing: Framing::Lines,
                }));
            }
            Some(Err(detail)) => {
                read_remaining_headers(reader).await?;
                return Ok(Some(Frame::rejected(detail, Framing::ContentLength)));
            }
            Some(Ok(length)) => length,
        };

        read_remaining_headers(reader).await?;
        if length > MAX_FRAME_BYTES {
            discard(reader, length).await?;
            return Ok(Some(Frame::rejected(
                format!("MCP frame of {length} bytes exceeds limit of {MAX_FRAME_BYTES}"),
                Framing::ContentLength,
            )));
        }
        let mut body = vec![0u8; length];
        reader
            .read_exact(&mut body)
            .await
            .map_err(|e| format!("Failed reading MCP body: {e}"))?;
        return Ok(Some(Frame {
            payload: serde_json::from_slice(&body).map_err(|e| e.to_string()),
            framing: Framing::ContentLength,
        }));
    }
}

/// Raw bytes up to and including the next newline; `None` on EOF.
async fn read_raw_line<R>(reader: &mut R) -> Result<Option<Vec<u8>>, String>
where
    R: AsyncBufRead + Unpin,
{
    let mut raw = Vec::new();
    let bytes = reader
        .read_until(b'\n', &mut raw)
        .await
        .map_err(|e| format!("Failed reading MCP input: {e}"))?;
    Ok((bytes > 0).then_some(raw))
}

fn content_length(line: &str) -> Option<Result<usize, String>> {
    let (name, value) = line.split_once(':')?;
    if !name.trim().eq_ignore_ascii_case("content-length") {
        return None;
    }
    Some(
        value
            .trim()
            .parse::<usize>()
            .map_err(|e| format!("Invalid Content-Length header: {e}")),
    )
}

async fn read_remaining_headers<R>(reader: &mut R) -> Result<(), String>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let Some(raw) = read_raw_line(reader).await? else {
            return Err("Unexpected EOF while reading MCP headers".to_string());
        };
        if raw == b"\r\n" || raw == b"\n" {
            return Ok(());
        }
    }
}

/// Skips a body the server refuses to buffer.
async fn discard<R>(reader: &mut R, length: usize) -> Result<(), String>
where
    R: AsyncBufRead + Unpin,
{
    let mut body = (&mut *reader).take(length as u64);
    let skipped = tokio::io::copy(&mut body, &mut tokio::io::sink())
        .await
        .map_err(|e| format!("Failed skipping MCP body: {e}"))?;
    if skipped < length as u64 {
        return Err("Unexpected EOF while skipping MCP body".to_string());
    }
    Ok(())
}

pub(crate) async fn write_frame<W>(
    writer: &mut W,
    value: &Value,
    framing: Framing,
) -> Result<(), String>
where
    W: AsyncWrite + Unpin,
{
    let body =
        serde_json::to_vec(value).map_err(|e| format!("Failed to encode MCP JSON: {e}"))?;
    match framing {
        Framing::Lines => {
            writer
                .write_all(&body)
                .await
                .map_err(|e| format!("Failed writing MCP body: {e}"))?;
            writer
                .write_all(b"\n")
                .await
                .map_err(|e| format!("Failed writing MCP body: {e}"))?;
        }
        Framing::ContentLength => {
            let header = format!(
                "Content-Length: {}\r\nContent-Type: application/json\r\n\r\n",
                body.len()
            );
            writer
                .write_all(header.as_bytes())
                .await
                .map_err(|e| format!("Failed writing MCP headers: {e}"))?;
            writer
                .write_all(&body)
                .await
                .map_err(|e| format!("Failed writing MCP body: {e}"))?;
        }
    }
    writer
        .flush()
        .await
        .map_err(|e| format!("Failed flushing MCP output: {e}"))
}

pub fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
