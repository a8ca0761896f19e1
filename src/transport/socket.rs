use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use super::{with_deadline, Endpoint, Transport};
use crate::error::{PluginError, Result};

/// How the answer to a socket request is delimited.
#[derive(Debug, Clone, Copy)]
pub enum ReadMode {
    /// The peer closes the connection after answering.
    ToEof,
    /// The answer ends with the first line (line ending excluded) for which
    /// the predicate holds.
    UntilLine(fn(&[u8]) -> bool),
}

/// Write one request to a stream socket and read back the answer.
pub struct SocketSource {
    endpoint: Endpoint,
    request: Vec<u8>,
    mode: ReadMode,
    timeout: Duration,
}

impl SocketSource {
    pub fn new(endpoint: Endpoint, request: impl Into<Vec<u8>>, mode: ReadMode, timeout: Duration) -> Self {
        Self {
            endpoint,
            request: request.into(),
            mode,
            timeout,
        }
    }

    async fn exchange(&self) -> Result<Vec<u8>> {
        let target = self.endpoint.to_string();
        match &self.endpoint {
            Endpoint::Tcp(addr) => {
                let stream = TcpStream::connect(addr)
                    .await
                    .map_err(|e| PluginError::connection(&target, e))?;
                converse(stream, &self.request, self.mode, &target).await
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                let stream = tokio::net::UnixStream::connect(path)
                    .await
                    .map_err(|e| PluginError::connection(&target, e))?;
                converse(stream, &self.request, self.mode, &target).await
            }
            #[cfg(not(unix))]
            Endpoint::Unix(_) => Err(PluginError::Config(
                "unix sockets are not supported on this platform".to_string(),
            )),
        }
    }
}

#[async_trait]
impl Transport for SocketSource {
    fn target(&self) -> String {
        self.endpoint.to_string()
    }

    async fn fetch(&self) -> Result<Vec<u8>> {
        tracing::debug!(endpoint = %self.endpoint, "sending socket request");
        let target = self.endpoint.to_string();
        let body = with_deadline(&target, self.timeout, self.exchange()).await?;
        tracing::debug!(bytes = body.len(), "socket answer received");
        Ok(body)
    }
}

/// Writes `request`, then reads according to `mode`.
pub async fn converse<S>(stream: S, request: &[u8], mode: ReadMode, target: &str) -> Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let io_err = |e: std::io::Error| PluginError::connection(target, e);

    let mut stream = BufReader::new(stream);
    stream.get_mut().write_all(request).await.map_err(io_err)?;
    stream.get_mut().flush().await.map_err(io_err)?;

    let mut body = Vec::new();
    match mode {
        ReadMode::ToEof => {
            stream.read_to_end(&mut body).await.map_err(io_err)?;
        }
        ReadMode::UntilLine(is_last) => loop {
            let start = body.len();
            let n = stream.read_until(b'\n', &mut body).await.map_err(io_err)?;
            if n == 0 {
                return Err(PluginError::Format(
                    "connection closed before the closing line".to_string(),
                ));
            }
            if is_last(trim_line_end(&body[start..])) {
                break;
            }
        },
    }
    Ok(body)
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
