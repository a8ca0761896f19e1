//! One-shot request/response clients for the supported target protocols.

pub mod fastcgi;
pub mod http;
pub mod socket;

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{PluginError, Result};

/// A single bounded request against a metric source.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable target, used in diagnostics.
    fn target(&self) -> String;

    async fn fetch(&self) -> Result<Vec<u8>>;
}

/// Where a socket-based transport connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp(String),
    Unix(PathBuf),
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp://{addr}"),
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// Runs `fut`, failing with [`PluginError::Timeout`] once `after` elapses.
pub async fn with_deadline<T, F>(target: &str, after: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(PluginError::Timeout {
            target: target.to_string(),
            after,
        }),
    }
}
