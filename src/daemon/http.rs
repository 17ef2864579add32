//! Minimal HTTP/1.1 framing over the daemon's Unix stream.
//!
//! Each connection carries exactly one POST request and one response.
//! Only what the daemon protocol needs is implemented: a request line,
//! `Content-Length`, and a JSON body.

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on frame bodies. Tool results larger than this are a bug
/// upstream, not a use case.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

pub async fn write_request<W>(writer: &mut W, body: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let head = format!(
        "POST / HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    writer.write_all(head.as_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_request<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    if line.is_empty() {
        bail!("connection closed before request line");
    }
    let method = line.split_whitespace().next().unwrap_or_default().to_string();
    if method != "POST" {
        bail!("unsupported method '{method}'");
    }
    let content_length = read_headers(reader).await?;
    read_body(reader, content_length).await
}

pub async fn write_response<W>(writer: &mut W, status: u16, body: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        500 => "Internal Server Error",
        _ => "Unknown",
    };
    let head = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    writer.write_all(head.as_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_response<R>(reader: &mut R) -> Result<(u16, Vec<u8>)>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    if line.is_empty() {
        bail!("connection closed before status line");
    }
    let status: u16 = line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .with_context(|| format!("malformed status line: {}", line.trim_end()))?;
    let content_length = read_headers(reader).await?;
    let body = read_body(reader, content_length).await?;
    Ok((status, body))
}

async fn read_headers<R>(reader: &mut R) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await?;
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        if let Some((name, value)) = trimmed.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value
                    .trim()
                    .parse()
                    .with_context(|| format!("bad content-length: {}", value.trim()))?;
            }
        }
    }
    if content_length > MAX_BODY_BYTES {
        bail!("frame body too large: {content_length} bytes");
    }
    Ok(content_length)
}

async fn read_body<R>(reader: &mut R, content_length: usize) -> Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_request_roundtrip() {
        let (client, server) = tokio::io::duplex(4096);
        let (_server_read, mut client_write) = tokio::io::split(client);
        let (server_read, _unused) = tokio::io::split(server);

        write_request(&mut client_write, br#"{"method":"list"}"#)
            .await
            .unwrap();

        let mut reader = BufReader::new(server_read);
        let body = read_request(&mut reader).await.unwrap();
        assert_eq!(body, br#"{"method":"list"}"#);
    }

    #[tokio::test]
    async fn test_response_roundtrip() {
        let (client, server) = tokio::io::duplex(4096);
        let (client_read, _unused) = tokio::io::split(client);
        let (_server_read, mut server_write) = tokio::io::split(server);

        write_response(&mut server_write, 400, br#"{"error":"invalid JSON"}"#)
            .await
            .unwrap();

        let mut reader = BufReader::new(client_read);
        let (status, body) = read_response(&mut reader).await.unwrap();
        assert_eq!(status, 400);
        assert_eq!(body, br#"{"error":"invalid JSON"}"#);
    }

    #[tokio::test]
    async fn test_rejects_non_post() {
        let (client, server) = tokio::io::duplex(4096);
        let (_server_read, mut client_write) = tokio::io::split(client);
        let (server_read, _unused) = tokio::io::split(server);

        client_write
            .write_all(b"GET / HTTP/1.1\r\n\r\n")
            .await
            .unwrap();
        client_write.flush().await.unwrap();

        let mut reader = BufReader::new(server_read);
        let err = read_request(&mut reader).await.unwrap_err();
        assert!(err.to_string().contains("unsupported method"));
    }

    #[tokio::test]
    async fn test_empty_body_allowed() {
        let (client, server) = tokio::io::duplex(4096);
        let (_server_read, mut client_write) = tokio::io::split(client);
        let (server_read, _unused) = tokio::io::split(server);

        write_request(&mut client_write, b"").await.unwrap();

        let mut reader = BufReader::new(server_read);
        let body = read_request(&mut reader).await.unwrap();
        assert!(body.is_empty());
    }
}
