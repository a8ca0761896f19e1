//! Previous-observation record kept between invocations.
//!
//! The scratch file is versioned JSON. Anything unreadable, from a missing
//! file to a future format, is treated as "no previous observation" so a
//! damaged file costs one interval of rates rather than a failed run.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::collectors::MetricValue;
use crate::error::{PluginError, Result};

const FORMAT_VERSION: u32 = 1;

/// Environment variable the host agent uses to point plugins at a work dir.
pub const WORKDIR_ENV: &str = "MACKEREL_PLUGIN_WORKDIR";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub value: MetricValue,
    pub timestamp: i64,
}

pub type Observations = HashMap<String, Observation>;

#[derive(Serialize, Deserialize)]
struct ScratchFormat {
    version: u32,
    observations: Observations,
}

#[derive(Debug, Clone)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location for `name`: the agent's work dir if set, else the
    /// OS temp dir.
    pub fn for_plugin(name: &str) -> Self {
        let dir = std::env::var_os(WORKDIR_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);
        Self::new(dir.join(file_name(name)))
    }

    #[cfg(test)]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn load(&self) -> Option<Observations> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "cannot read scratch file");
                return None;
            }
        };

        match serde_json::from_str::<ScratchFormat>(&raw) {
            Ok(file) if file.version == FORMAT_VERSION => Some(file.observations),
            Ok(file) => {
                tracing::warn!(path = %self.path.display(), version = file.version, "ignoring scratch file with unknown version");
                None
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring corrupt scratch file");
                None
            }
        }
    }

    /// Replaces the stored record; written to a sibling temp file and renamed
    /// into place so readers never see a half-written file.
    pub fn save(&self, observations: &Observations) -> Result<()> {
        let state_err = |source: std::io::Error| PluginError::State {
            path: self.path.clone(),
            source,
        };

        let body = serde_json::to_vec(&ScratchFormat {
            version: FORMAT_VERSION,
            observations: observations.clone(),
        })
        .map_err(|e| state_err(e.into()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(state_err)?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut file = fs::File::create(&tmp).map_err(state_err)?;
        file.write_all(&body).map_err(state_err)?;
        file.sync_all().map_err(state_err)?;
        fs::rename(&tmp, &self.path).map_err(state_err)?;

        tracing::debug!(path = %self.path.display(), count = observations.len(), "scratch file saved");
        Ok(())
    }
}

/// `rsvcmetrics-<name>` with anything outside `[A-Za-z0-9._-]` replaced.
pub fn file_name(name: &str) -> String {
    let clean: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    format!("rsvcmetrics-{clean}")
}
