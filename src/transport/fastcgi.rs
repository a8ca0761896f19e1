//! Minimal FastCGI responder client, enough to read a status page straight
//! from a PHP-FPM pool without a web server in front of it.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use super::{with_deadline, Endpoint, Transport};
use crate::error::{PluginError, Result};

const VERSION: u8 = 1;
const BEGIN_REQUEST: u8 = 1;
const END_REQUEST: u8 = 3;
const PARAMS: u8 = 4;
const STDIN: u8 = 5;
const STDOUT: u8 = 6;
const STDERR: u8 = 7;

const ROLE_RESPONDER: u16 = 1;
const REQUEST_ID: u16 = 1;
const MAX_CONTENT: usize = 0xffff;

pub struct FastCgiSource {
    endpoint: Endpoint,
    script: String,
    query: String,
    timeout: Duration,
}

impl FastCgiSource {
    pub fn new(endpoint: Endpoint, script: impl Into<String>, query: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint,
            script: script.into(),
            query: query.into(),
            timeout,
        }
    }

    fn params(&self) -> Vec<(&str, &str)> {
        vec![
            ("GATEWAY_INTERFACE", "CGI/1.1"),
            ("SERVER_SOFTWARE", "rsvcmetrics"),
            ("SERVER_PROTOCOL", "HTTP/1.1"),
            ("REQUEST_METHOD", "GET"),
            ("REMOTE_ADDR", "127.0.0.1"),
            ("SCRIPT_FILENAME", self.script.as_str()),
            ("SCRIPT_NAME", self.script.as_str()),
            ("REQUEST_URI", self.script.as_str()),
            ("QUERY_STRING", self.query.as_str()),
        ]
    }

    async fn exchange(&self) -> Result<Vec<u8>> {
        let target = self.target();
        let request = encode_request(&self.params());
        let output = match &self.endpoint {
            Endpoint::Tcp(addr) => {
                let stream = TcpStream::connect(addr)
                    .await
                    .map_err(|e| PluginError::connection(&target, e))?;
                roundtrip(stream, &request, &target).await?
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                let stream = tokio::net::UnixStream::connect(path)
                    .await
                    .map_err(|e| PluginError::connection(&target, e))?;
                roundtrip(stream, &request, &target).await?
            }
            #[cfg(not(unix))]
            Endpoint::Unix(_) => {
                return Err(PluginError::Config(
                    "unix sockets are not supported on this platform".to_string(),
                ))
            }
        };
        split_cgi_response(&output, &target)
    }
}

#[async_trait]
impl Transport for FastCgiSource {
    fn target(&self) -> String {
        format!("{}{}", self.endpoint, self.script)
    }

    async fn fetch(&self) -> Result<Vec<u8>> {
        tracing::debug!(endpoint = %self.endpoint, script = %self.script, "sending FastCGI request");
        with_deadline(&self.target(), self.timeout, self.exchange()).await
    }
}

fn record(kind: u8, content: &[u8], out: &mut Vec<u8>) {
    let padding = (8 - content.len() % 8) % 8;
    out.push(VERSION);
    out.push(kind);
    out.extend_from_slice(&REQUEST_ID.to_be_bytes());
    out.extend_from_slice(&(content.len() as u16).to_be_bytes());
    out.push(padding as u8);
    out.push(0);
    out.extend_from_slice(content);
    out.extend(std::iter::repeat(0).take(padding));
}

fn encode_length(len: usize, out: &mut Vec<u8>) {
    if len < 0x80 {
        out.push(len as u8);
    } else {
        out.extend_from_slice(&((len as u32) | 0x8000_0000).to_be_bytes());
    }
}

/// Name-value pairs in the FastCGI `PARAMS` encoding.
pub fn encode_params(params: &[(&str, &str)]) -> Vec<u8> {
    let mut buf = Vec::new();
    for (name, value) in params {
        encode_length(name.len(), &mut buf);
        encode_length(value.len(), &mut buf);
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(value.as_bytes());
    }
    buf
}

/// Full request: begin record, params stream, empty stdin.
pub fn encode_request(params: &[(&str, &str)]) -> Vec<u8> {
    let mut out = Vec::new();

    let mut begin = Vec::with_capacity(8);
    begin.extend_from_slice(&ROLE_RESPONDER.to_be_bytes());
    begin.extend_from_slice(&[0; 6]);
    record(BEGIN_REQUEST, &begin, &mut out);

    for chunk in encode_params(params).chunks(MAX_CONTENT) {
        record(PARAMS, chunk, &mut out);
    }
    record(PARAMS, &[], &mut out);
    record(STDIN, &[], &mut out);
    out
}

async fn roundtrip<S>(mut stream: S, request: &[u8], target: &str) -> Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let io_err = |e: std::io::Error| PluginError::connection(target, e);
    stream.write_all(request).await.map_err(io_err)?;
    stream.flush().await.map_err(io_err)?;

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    loop {
        let mut header = [0u8; 8];
        stream.read_exact(&mut header).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                PluginError::Format("FastCGI stream ended before END_REQUEST".to_string())
            } else {
                io_err(e)
            }
        })?;

        let kind = header[1];
        let len = u16::from_be_bytes([header[4], header[5]]) as usize;
        let padding = header[6] as usize;
        let mut content = vec![0u8; len + padding];
        stream.read_exact(&mut content).await.map_err(io_err)?;
        content.truncate(len);

        match kind {
            STDOUT => stdout.extend_from_slice(&content),
            STDERR => stderr.extend_from_slice(&content),
            END_REQUEST => break,
            other => tracing::debug!(record = other, "ignoring FastCGI record"),
        }
    }

    if !stderr.is_empty() {
        tracing::warn!(stderr = %String::from_utf8_lossy(&stderr).trim(), "FastCGI application wrote to stderr");
    }
    Ok(stdout)
}

/// Separates CGI headers from the body and checks the `Status` header.
pub fn split_cgi_response(output: &[u8], target: &str) -> Result<Vec<u8>> {
    // whichever blank line comes first ends the headers
    let crlf = find_subslice(output, b"\r\n\r\n").map(|i| (i, 4));
    let lf = find_subslice(output, b"\n\n").map(|i| (i, 2));
    let (at, len) = match (crlf, lf) {
        (Some(a), Some(b)) => a.min(b),
        (Some(found), None) | (None, Some(found)) => found,
        (None, None) => {
            return Err(PluginError::Format(
                "FastCGI response has no header terminator".to_string(),
            ))
        }
    };
    let (head, body) = (&output[..at], &output[at + len..]);

    let head = String::from_utf8_lossy(head);
    for line in head.lines() {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("status") {
            let status = value.trim();
            if !status.starts_with('2') {
                return Err(PluginError::protocol(target, status, body));
            }
        }
    }
    Ok(body.to_vec())
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
