use async_trait::async_trait;
use serde::Deserialize;

use super::{Collector, MetricValue, Samples};
use crate::config::{PhpFpmConfig, PhpFpmSource};
use crate::error::{PluginError, Result};
use crate::schema::{Graph, MetricDef, Schema, Unit};
use crate::transport::fastcgi::FastCgiSource;
use crate::transport::http::HttpSource;
use crate::transport::Transport;

/// The pool status page (`?json`). Fields not reported are left out.
#[derive(Deserialize, Debug, Default, PartialEq)]
pub struct PoolStatus {
    pub pool: String,
    #[serde(rename = "process manager")]
    pub process_manager: String,
    #[serde(rename = "start since", default)]
    pub start_since: u64,
    #[serde(rename = "accepted conn", default)]
    pub accepted_conn: u64,
    #[serde(rename = "listen queue")]
    pub listen_queue: u64,
    #[serde(rename = "max listen queue")]
    pub max_listen_queue: u64,
    #[serde(rename = "listen queue len")]
    pub listen_queue_len: u64,
    #[serde(rename = "idle processes")]
    pub idle_processes: u64,
    #[serde(rename = "active processes")]
    pub active_processes: u64,
    #[serde(rename = "total processes")]
    pub total_processes: u64,
    #[serde(rename = "max active processes")]
    pub max_active_processes: u64,
    #[serde(rename = "max children reached")]
    pub max_children_reached: u64,
    #[serde(rename = "slow requests")]
    pub slow_requests: u64,
}

pub struct PhpFpmCollector {
    transport: Box<dyn Transport>,
    label_prefix: String,
}

impl PhpFpmCollector {
    pub fn new(config: PhpFpmConfig) -> Result<Self> {
        let timeout = config.common.timeout;
        let transport: Box<dyn Transport> = match config.source {
            PhpFpmSource::Http { url } => Box::new(HttpSource::new(url, None, false, timeout)?),
            PhpFpmSource::FastCgi { endpoint, script, query } => {
                Box::new(FastCgiSource::new(endpoint, script, query, timeout))
            }
        };
        Ok(Self {
            transport,
            label_prefix: config.common.label_prefix,
        })
    }
}

#[async_trait]
impl Collector for PhpFpmCollector {
    type Payload = PoolStatus;

    fn name(&self) -> &str {
        "php-fpm"
    }

    fn schema(&self) -> Schema {
        let label = &self.label_prefix;
        Schema::new(vec![
            Graph::new(
                "processes",
                format!("{label} Processes"),
                Unit::Integer,
                &[
                    MetricDef::gauge("total_processes", "Total Processes"),
                    MetricDef::gauge("active_processes", "Active Processes"),
                    MetricDef::gauge("idle_processes", "Idle Processes"),
                ],
            ),
            Graph::new(
                "max_active_processes",
                format!("{label} Max Active Processes"),
                Unit::Integer,
                &[MetricDef::gauge("max_active_processes", "Max Active Processes")],
            ),
            Graph::new(
                "max_children_reached",
                format!("{label} Max Children Reached"),
                Unit::Integer,
                &[MetricDef::gauge("max_children_reached", "Max Children Reached")],
            ),
            Graph::new(
                "queue",
                format!("{label} Queue"),
                Unit::Integer,
                &[
                    MetricDef::gauge("listen_queue", "Listen Queue"),
                    MetricDef::gauge("listen_queue_len", "Listen Queue Len"),
                ],
            ),
            Graph::new(
                "max_listen_queue",
                format!("{label} Max Listen Queue"),
                Unit::Integer,
                &[MetricDef::gauge("max_listen_queue", "Max Listen Queue")],
            ),
            Graph::new(
                "slow_requests",
                format!("{label} Slow Requests"),
                Unit::Integer,
                &[MetricDef::gauge("slow_requests", "Slow Requests")],
            ),
        ])
    }

    async fn fetch(&self) -> Result<PoolStatus> {
        let body = self.transport.fetch().await?;
        let status: PoolStatus = serde_json::from_slice(&body)
            .map_err(|e| PluginError::Format(format!("pool status is not the expected JSON: {e}")))?;
        tracing::debug!(pool = %status.pool, manager = %status.process_manager, "pool status received");
        Ok(status)
    }

    fn extract(&self, status: PoolStatus) -> Result<Samples> {
        let values = [
            ("total_processes", status.total_processes),
            ("active_processes", status.active_processes),
            ("idle_processes", status.idle_processes),
            ("max_active_processes", status.max_active_processes),
            ("max_children_reached", status.max_children_reached),
            ("listen_queue", status.listen_queue),
            ("listen_queue_len", status.listen_queue_len),
            ("max_listen_queue", status.max_listen_queue),
            ("slow_requests", status.slow_requests),
        ];
        Ok(values
            .into_iter()
            .map(|(name, v)| (name.to_string(), MetricValue::Uint(v)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PhpFpmArgs;
    use crate::schema::tests::assert_unique_names;

    const STATUS_JSON: &str = r#"{"pool":"www","process manager":"dynamic","start time":1700000000,"start since":3600,"accepted conn":1234,"listen queue":0,"max listen queue":2,"listen queue len":128,"idle processes":4,"active processes":1,"total processes":5,"max active processes":3,"max children reached":0,"slow requests":7}"#;

    fn collector() -> PhpFpmCollector {
        PhpFpmCollector::new(PhpFpmArgs::default().resolve().unwrap()).unwrap()
    }

    #[test]
    fn test_status_decodes_and_extracts() {
        let status: PoolStatus = serde_json::from_str(STATUS_JSON).unwrap();
        assert_eq!(status.pool, "www");
        assert_eq!(status.accepted_conn, 1234);

        let collector = collector();
        let samples = collector.extract(status).unwrap();
        assert_eq!(samples.len(), 9);
        assert_eq!(samples["total_processes"], MetricValue::Uint(5));
        assert_eq!(samples["listen_queue_len"], MetricValue::Uint(128));
        assert_eq!(samples["slow_requests"], MetricValue::Uint(7));

        let schema = collector.schema();
        assert_unique_names(&schema);
        for name in samples.keys() {
            assert!(schema.get(name).is_some(), "{name} missing from schema");
        }
        assert_eq!(schema.names().len(), samples.len());
    }

    #[test]
    fn test_schema_has_no_counters() {
        let schema = collector().schema();
        assert!(!schema.has_counters());
        assert_eq!(schema.graphs[0].label, "PHP-FPM Processes");
    }

    #[test]
    fn test_incomplete_status_is_rejected() {
        let partial = r#"{"pool":"www","process manager":"static"}"#;
        assert!(serde_json::from_str::<PoolStatus>(partial).is_err());
    }
}
