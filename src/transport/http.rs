use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::Transport;
use crate::error::{PluginError, Result};

const USER_AGENT: &str = concat!("rsvcmetrics/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: Option<String>,
}

/// Plain HTTP(S) GET of a status page.
pub struct HttpSource {
    client: Client,
    url: String,
    auth: Option<BasicAuth>,
    timeout: Duration,
}

impl HttpSource {
    pub fn new(
        url: impl Into<String>,
        auth: Option<BasicAuth>,
        insecure: bool,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .danger_accept_invalid_certs(insecure)
            .build()
            .map_err(|e| PluginError::Config(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
            auth,
            timeout,
        })
    }

    fn map_error(&self, e: reqwest::Error) -> PluginError {
        if e.is_timeout() {
            PluginError::Timeout {
                target: self.url.clone(),
                after: self.timeout,
            }
        } else if e.is_builder() {
            PluginError::Config(format!("invalid url '{}': {e}", self.url))
        } else {
            PluginError::connection(&self.url, e)
        }
    }
}

#[async_trait]
impl Transport for HttpSource {
    fn target(&self) -> String {
        self.url.clone()
    }

    async fn fetch(&self) -> Result<Vec<u8>> {
        let mut request = self.client.get(&self.url);
        if let Some(auth) = &self.auth {
            request = request.basic_auth(&auth.username, auth.password.as_ref());
        }

        tracing::debug!(url = %self.url, "requesting status page");
        let response = request.send().await.map_err(|e| self.map_error(e))?;
        let status = response.status();
        let body = response.bytes().await.map_err(|e| self.map_error(e))?;

        if !status.is_success() {
            return Err(PluginError::protocol(&self.url, status, &body));
        }

        tracing::debug!(bytes = body.len(), "status page received");
        Ok(body.to_vec())
    }
}
