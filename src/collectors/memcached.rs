use async_trait::async_trait;

use super::{Collector, Samples};
use crate::config::MemcachedConfig;
use crate::error::{PluginError, Result};
use crate::extract::fields;
use crate::schema::{Graph, MetricDef, Schema, Unit};
use crate::transport::socket::{ReadMode, SocketSource};
use crate::transport::Transport;

/// `ERROR`, `CLIENT_ERROR <msg>` or `SERVER_ERROR <msg>`.
fn is_error_reply(line: &[u8]) -> bool {
    let word = line.split(|b| *b == b' ').next().unwrap_or_default();
    word.ends_with(b"ERROR")
}

/// A `stats` answer ends at `END`, or right away when the server refuses it.
fn is_last_line(line: &[u8]) -> bool {
    line == b"END" || is_error_reply(line)
}

pub struct MemcachedCollector {
    transport: SocketSource,
    scratch_name: String,
    label_prefix: String,
}

impl MemcachedCollector {
    pub fn new(config: MemcachedConfig) -> Self {
        let scratch_name = config.scratch_name();
        Self {
            transport: SocketSource::new(config.endpoint, "stats\r\n", ReadMode::UntilLine(is_last_line), config.common.timeout),
            scratch_name,
            label_prefix: config.common.label_prefix,
        }
    }
}

#[async_trait]
impl Collector for MemcachedCollector {
    type Payload = String;

    fn name(&self) -> &str {
        "memcached"
    }

    fn scratch_name(&self) -> String {
        self.scratch_name.clone()
    }

    fn schema(&self) -> Schema {
        let label = &self.label_prefix;
        Schema::new(vec![
            Graph::new(
                "connections",
                format!("{label} Connections"),
                Unit::Integer,
                &[MetricDef::gauge("curr_connections", "Connections")],
            ),
            Graph::new(
                "cmd",
                format!("{label} Command"),
                Unit::Integer,
                &[
                    MetricDef::counter("cmd_get", "Get"),
                    MetricDef::counter("cmd_set", "Set"),
                    MetricDef::counter("cmd_flush", "Flush"),
                    MetricDef::counter("cmd_touch", "Touch"),
                ],
            ),
            Graph::new(
                "hitmiss",
                format!("{label} Hits/Misses"),
                Unit::Integer,
                &[
                    MetricDef::counter("get_hits", "Get Hits"),
                    MetricDef::counter("get_misses", "Get Misses"),
                    MetricDef::counter("delete_hits", "Delete Hits"),
                    MetricDef::counter("delete_misses", "Delete Misses"),
                ],
            ),
            Graph::new(
                "evictions",
                format!("{label} Evictions"),
                Unit::Integer,
                &[MetricDef::counter("evictions", "Evictions")],
            ),
            Graph::new(
                "unfetched",
                format!("{label} Unfetched"),
                Unit::Integer,
                &[
                    MetricDef::counter("expired_unfetched", "Expired unfetched"),
                    MetricDef::counter("evicted_unfetched", "Evicted unfetched"),
                ],
            ),
            Graph::new(
                "rusage",
                format!("{label} Resource Usage"),
                Unit::Float,
                &[
                    MetricDef::counter("rusage_user", "User"),
                    MetricDef::counter("rusage_system", "System"),
                ],
            ),
            Graph::new(
                "bytes",
                format!("{label} Traffics"),
                Unit::Bytes,
                &[
                    MetricDef::counter("bytes_read", "Read"),
                    MetricDef::counter("bytes_written", "Write"),
                ],
            ),
            Graph::new(
                "capacity",
                format!("{label} Capacity"),
                Unit::Bytes,
                &[
                    MetricDef::gauge("limit_maxbytes", "Total"),
                    MetricDef::gauge("bytes", "Used"),
                ],
            ),
            Graph::new(
                "items",
                format!("{label} Items"),
                Unit::Integer,
                &[MetricDef::gauge("curr_items", "Current Items")],
            ),
        ])
    }

    async fn fetch(&self) -> Result<String> {
        let body = self.transport.fetch().await?;
        let text = String::from_utf8(body)
            .map_err(|_| PluginError::Format("stats are not valid UTF-8".to_string()))?;
        let first = text.lines().next().unwrap_or_default().trim();
        if is_error_reply(first.as_bytes()) {
            return Err(PluginError::protocol(self.transport.target(), first, text.as_bytes()));
        }
        Ok(text)
    }

    fn extract(&self, payload: String) -> Result<Samples> {
        let parsed = fields::parse_tagged(&payload, "STAT", "END");
        fields::select(&parsed, &self.schema().names())
    }
}
