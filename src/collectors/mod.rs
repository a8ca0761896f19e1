pub mod elasticsearch;
pub mod haproxy;
pub mod memcached;
pub mod php_fpm;

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::schema::Schema;

// A single observed value. Untagged so integers stay exact on disk; `Uint`
// comes first because an f64 would also accept them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Uint(u64),
    Float(f64),
}

impl MetricValue {
    pub fn as_f64(self) -> f64 {
        match self {
            MetricValue::Float(v) => v,
            MetricValue::Uint(v) => v as f64,
        }
    }

    pub fn is_finite(self) -> bool {
        match self {
            MetricValue::Float(v) => v.is_finite(),
            MetricValue::Uint(_) => true,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Float(v) => write!(f, "{v:.6}"),
            MetricValue::Uint(v) => write!(f, "{v}"),
        }
    }
}

/// Metric name to value, produced fresh on every run.
pub type Samples = HashMap<String, MetricValue>;

/// A target-specific metric source.
///
/// The shared pipeline (configuration, rate conversion, emission) lives
/// elsewhere; a collector only knows how to reach its target once and how to
/// turn the answer into [`Samples`] whose names appear in [`Collector::schema`].
#[async_trait]
pub trait Collector: Send + Sync {
    type Payload: Send;

    fn name(&self) -> &str;

    /// Identity used to name the scratch file, e.g. `haproxy-localhost-80`.
    fn scratch_name(&self) -> String {
        self.name().to_string()
    }

    fn schema(&self) -> Schema;

    async fn fetch(&self) -> Result<Self::Payload>;

    fn extract(&self, payload: Self::Payload) -> Result<Samples>;
}
