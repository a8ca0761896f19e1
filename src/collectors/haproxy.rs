use async_trait::async_trait;

use super::{Collector, Samples};
use crate::config::{HaproxyConfig, HaproxySource};
use crate::error::{PluginError, Result};
use crate::extract::table::{self, TableSpec};
use crate::schema::{Graph, MetricDef, Schema, Unit};
use crate::transport::http::HttpSource;
use crate::transport::socket::{ReadMode, SocketSource};
use crate::transport::{Endpoint, Transport};

/// Columns of HAProxy's `show stat` CSV that feed the totals.
const STATS_TABLE: TableSpec = TableSpec {
    role_column: 1, // svname
    role: "BACKEND",
    min_columns: 60,
    sums: &[
        ("sessions", 7),          // stot
        ("bytes_in", 8),          // bin
        ("bytes_out", 9),         // bout
        ("connection_errors", 13), // econ
    ],
};

pub struct HaproxyCollector {
    transport: Box<dyn Transport>,
    scratch_name: String,
    label_prefix: String,
}

impl HaproxyCollector {
    pub fn new(config: HaproxyConfig) -> Result<Self> {
        let scratch_name = config.scratch_name();
        let timeout = config.common.timeout;
        let transport: Box<dyn Transport> = match config.source {
            HaproxySource::Http { uri, auth, insecure } => {
                Box::new(HttpSource::new(format!("{uri};csv;norefresh"), auth, insecure, timeout)?)
            }
            HaproxySource::Socket(path) => Box::new(SocketSource::new(
                Endpoint::Unix(path),
                "show stat\n",
                ReadMode::ToEof,
                timeout,
            )),
        };

        Ok(Self {
            transport,
            scratch_name,
            label_prefix: config.common.label_prefix,
        })
    }
}

#[async_trait]
impl Collector for HaproxyCollector {
    type Payload = Vec<u8>;

    fn name(&self) -> &str {
        "haproxy"
    }

    fn scratch_name(&self) -> String {
        self.scratch_name.clone()
    }

    fn schema(&self) -> Schema {
        let label = &self.label_prefix;
        Schema::new(vec![
            Graph::new(
                "total.sessions",
                format!("{label} Total Sessions"),
                Unit::Integer,
                &[MetricDef::counter("sessions", "Sessions")],
            ),
            Graph::new(
                "total.bytes",
                format!("{label} Total Bytes"),
                Unit::Integer,
                &[
                    MetricDef::counter("bytes_in", "Bytes In"),
                    MetricDef::counter("bytes_out", "Bytes Out"),
                ],
            ),
            Graph::new(
                "total.connection_errors",
                format!("{label} Total Connection Errors"),
                Unit::Integer,
                &[MetricDef::counter("connection_errors", "Connection Errors")],
            ),
        ])
    }

    async fn fetch(&self) -> Result<Vec<u8>> {
        self.transport.fetch().await
    }

    fn extract(&self, payload: Vec<u8>) -> Result<Samples> {
        let body = String::from_utf8(payload)
            .map_err(|_| PluginError::Format("stats are not valid UTF-8".to_string()))?;
        table::sum_rows(&body, &STATS_TABLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::MetricValue;
    use crate::config::HaproxyArgs;
    use crate::schema::tests::assert_unique_names;

    /// A `show stat` line with `svname` and the summed columns filled in.
    fn stat_row(pxname: &str, svname: &str, stot: u64, bin: u64, bout: u64, econ: &str) -> String {
        let mut cols = vec![String::new(); 62];
        cols[0] = pxname.to_string();
        cols[1] = svname.to_string();
        cols[7] = stot.to_string();
        cols[8] = bin.to_string();
        cols[9] = bout.to_string();
        cols[13] = econ.to_string();
        cols.join(",")
    }

    fn collector() -> HaproxyCollector {
        HaproxyCollector::new(HaproxyArgs::default().resolve().unwrap()).unwrap()
    }

    #[test]
    fn test_backend_rows_are_totalled() {
        let mut header = vec!["# pxname".to_string(), "svname".to_string()];
        header.resize(62, "x".to_string());
        let csv = [
            header.join(","),
            stat_row("http-in", "FRONTEND", 999, 9999, 9999, ""),
            stat_row("app", "web1", 7, 70, 140, "0"),
            stat_row("app", "BACKEND", 10, 100, 200, "1"),
            String::new(),
        ]
        .join("\n");

        let samples = collector().extract(csv.into_bytes()).unwrap();
        assert_eq!(samples.len(), 4);
        assert_eq!(samples["sessions"], MetricValue::Float(10.0));
        assert_eq!(samples["bytes_in"], MetricValue::Float(100.0));
        assert_eq!(samples["bytes_out"], MetricValue::Float(200.0));
        assert_eq!(samples["connection_errors"], MetricValue::Float(1.0));
    }

    #[test]
    fn test_wrong_endpoint_output_is_rejected() {
        let html = b"<html><body>Statistics Report</body></html>\n".to_vec();
        assert!(matches!(collector().extract(html), Err(PluginError::Format(_))));
    }

    #[test]
    fn test_schema_covers_extracted_names() {
        let collector = collector();
        let schema = collector.schema();
        assert_unique_names(&schema);
        let mut names = schema.names();
        names.sort_unstable();
        let mut sums: Vec<_> = STATS_TABLE.sums.iter().map(|(n, _)| *n).collect();
        sums.sort_unstable();
        assert_eq!(names, sums);
        assert!(schema.graphs[0].label.starts_with("HAProxy"));
        assert_eq!(collector.scratch_name(), "haproxy-localhost-80");
    }
}
