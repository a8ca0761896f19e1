use std::path::PathBuf;
use std::time::Duration;

/// Every way a single plugin invocation can fail.
///
/// All variants are terminal: the run stops, nothing is written to stdout and
/// the process exits non-zero.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("cannot reach {target}: {reason}")]
    Connection { target: String, reason: String },

    #[error("no response from {target} within {after:?}")]
    Timeout { target: String, after: Duration },

    #[error("{target} answered {status}: {body}")]
    Protocol {
        target: String,
        status: String,
        body: String,
    },

    #[error("malformed payload: {0}")]
    Format(String),

    #[error("cannot extract '{metric}': {reason}")]
    Extraction { metric: String, reason: String },

    #[error("scratch file {}: {source}", path.display())]
    State {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write metrics: {0}")]
    Output(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PluginError>;

/// Longest response body excerpt carried by [`PluginError::Protocol`].
pub const BODY_EXCERPT_LEN: usize = 256;

impl PluginError {
    pub fn exit_code(&self) -> u8 {
        match self {
            PluginError::Config(_) => 2,
            _ => 1,
        }
    }

    pub fn connection(target: impl Into<String>, reason: impl ToString) -> Self {
        PluginError::Connection {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn protocol(target: impl Into<String>, status: impl ToString, body: &[u8]) -> Self {
        PluginError::Protocol {
            target: target.into(),
            status: status.to_string(),
            body: excerpt(body),
        }
    }
}

/// Lossy, whitespace-trimmed prefix of a response body, cut on a char boundary.
pub fn excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.len() <= BODY_EXCERPT_LEN {
        return text.to_string();
    }
    let mut end = BODY_EXCERPT_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
