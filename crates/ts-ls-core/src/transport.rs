//! `Content-Length`-framed JSON-RPC transport (component H).
//!
//! Framing is implemented directly over any `AsyncRead + AsyncWrite` pair
//! rather than delegated to a prebuilt LSP framework, since the bespoke
//! JSON-Patch partial-result protocol this server speaks does not match
//! what such a framework expects from a handler.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::{CoreError, CoreResult};

/// An abstract duplex message channel: read one framed message body at a
/// time, write one framed message body at a time. `Ok(None)` from
/// [`Self::read_message`] signals clean EOF.
#[async_trait]
pub trait MessageTransport: Send {
    async fn read_message(&mut self) -> CoreResult<Option<Vec<u8>>>;
    async fn write_message(&mut self, body: &[u8]) -> CoreResult<()>;
}

/// A [`MessageTransport`] over any `AsyncRead`/`AsyncWrite` pair, parsing
/// and emitting `Content-Length: <n>\r\n\r\n<n bytes>` framing.
pub struct FramedTransport<R, W> {
    reader: BufReader<R>,
    writer: W,
}

impl<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> FramedTransport<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        FramedTransport {
            reader: BufReader::new(reader),
            writer,
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send, W: AsyncWrite + Unpin + Send> MessageTransport for FramedTransport<R, W> {
    async fn read_message(&mut self) -> CoreResult<Option<Vec<u8>>> {
        let mut content_length: Option<usize> = None;
        loop {
            let mut line = String::new();
            let bytes_read = self
                .reader
                .read_line(&mut line)
                .await
                .map_err(|e| CoreError::IoFailed(e.to_string()))?;
            if bytes_read == 0 {
                return Ok(None);
            }
            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.is_empty() {
                break;
            }
            if let Some(value) = trimmed
                .split_once(':')
                .filter(|(name, _)| name.eq_ignore_ascii_case("Content-Length"))
                .map(|(_, value)| value.trim())
            {
                content_length = value
                    .parse()
                    .map_err(|_| CoreError::IoFailed(format!("malformed Content-Length: {value}")))?;
            }
        }
        let len = content_length.ok_or_else(|| CoreError::IoFailed("missing Content-Length header".to_string()))?;
        let mut body = vec![0u8; len];
        self.reader
            .read_exact(&mut body)
            .await
            .map_err(|e| CoreError::IoFailed(e.to_string()))?;
        Ok(Some(body))
    }

    async fn write_message(&mut self, body: &[u8]) -> CoreResult<()> {
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        self.writer
            .write_all(header.as_bytes())
            .await
            .map_err(|e| CoreError::IoFailed(e.to_string()))?;
        self.writer.write_all(body).await.map_err(|e| CoreError::IoFailed(e.to_string()))?;
        self.writer.flush().await.map_err(|e| CoreError::IoFailed(e.to_string()))?;
        Ok(())
    }
}

/// The default transport: standard input/output.
pub type StdioTransport = FramedTransport<tokio::io::Stdin, tokio::io::Stdout>;

pub fn stdio() -> StdioTransport {
    FramedTransport::new(tokio::io::stdin(), tokio::io::stdout())
}
