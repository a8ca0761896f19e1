use async_trait::async_trait;
use serde_json::Value;

use super::{Collector, Samples};
use crate::config::ElasticsearchConfig;
use crate::error::{PluginError, Result};
use crate::extract::path::{self, MetricPath, MissingPolicy};
use crate::schema::{Graph, MetricDef, Schema, Unit};
use crate::transport::http::HttpSource;
use crate::transport::Transport;

/// Node stats locations. Entries marked "7.x" have disappeared from newer
/// releases and are the usual reason to run with `--suppress-missing-error`.
const NODE_STATS_PATHS: &[MetricPath] = &[
    MetricPath::new("http_opened", &["http", "total_opened"]),
    MetricPath::new("total_indexing_index", &["indices", "indexing", "index_total"]),
    MetricPath::new("total_indexing_delete", &["indices", "indexing", "delete_total"]),
    MetricPath::new("total_get", &["indices", "get", "total"]),
    MetricPath::new("total_search_query", &["indices", "search", "query_total"]),
    MetricPath::new("total_search_fetch", &["indices", "search", "fetch_total"]),
    MetricPath::new("total_merges", &["indices", "merges", "total"]),
    MetricPath::new("total_refresh", &["indices", "refresh", "total"]),
    MetricPath::new("total_flush", &["indices", "flush", "total"]),
    MetricPath::new("total_warmer", &["indices", "warmer", "total"]),
    MetricPath::new("total_percolate", &["indices", "percolate", "total"]), // gone in 7.x
    MetricPath::new("total_suggest", &["indices", "suggest", "total"]),     // gone in 7.x
    MetricPath::new("docs_count", &["indices", "docs", "count"]),
    MetricPath::new("docs_deleted", &["indices", "docs", "deleted"]),
    MetricPath::new("fielddata_size", &["indices", "fielddata", "memory_size_in_bytes"]),
    MetricPath::new("filter_cache_size", &["indices", "filter_cache", "memory_size_in_bytes"]), // gone in 7.x
    MetricPath::new("segments_size", &["indices", "segments", "memory_in_bytes"]),
    MetricPath::new("segments_index_writer_size", &["indices", "segments", "index_writer_memory_in_bytes"]),
    MetricPath::new("segments_version_map_size", &["indices", "segments", "version_map_memory_in_bytes"]),
    MetricPath::new("segments_fixed_bit_set_size", &["indices", "segments", "fixed_bit_set_memory_in_bytes"]),
    MetricPath::new("evictions_fielddata", &["indices", "fielddata", "evictions"]),
    MetricPath::new("evictions_filter_cache", &["indices", "filter_cache", "evictions"]), // gone in 7.x
    MetricPath::new("heap_used", &["jvm", "mem", "heap_used_in_bytes"]),
    MetricPath::new("heap_max", &["jvm", "mem", "heap_max_in_bytes"]),
    MetricPath::new("threads_generic", &["thread_pool", "generic", "threads"]),
    MetricPath::new("threads_index", &["thread_pool", "index", "threads"]), // gone in 7.x
    MetricPath::new("threads_snapshot_data", &["thread_pool", "snapshot_data", "threads"]), // gone in 7.x
    MetricPath::new("threads_get", &["thread_pool", "get", "threads"]),
    MetricPath::new("threads_bench", &["thread_pool", "bench", "threads"]), // gone in 7.x
    MetricPath::new("threads_snapshot", &["thread_pool", "snapshot", "threads"]),
    MetricPath::new("threads_merge", &["thread_pool", "merge", "threads"]), // gone in 7.x
    MetricPath::new("threads_suggest", &["thread_pool", "suggest", "threads"]), // gone in 7.x
    MetricPath::new("threads_bulk", &["thread_pool", "bulk", "threads"]), // gone in 7.x
    MetricPath::new("threads_optimize", &["thread_pool", "optimize", "threads"]), // gone in 7.x
    MetricPath::new("threads_warmer", &["thread_pool", "warmer", "threads"]),
    MetricPath::new("threads_flush", &["thread_pool", "flush", "threads"]),
    MetricPath::new("threads_search", &["thread_pool", "search", "threads"]),
    MetricPath::new("threads_percolate", &["thread_pool", "percolate", "threads"]), // gone in 7.x
    MetricPath::new("threads_refresh", &["thread_pool", "refresh", "threads"]),
    MetricPath::new("threads_management", &["thread_pool", "management", "threads"]),
    MetricPath::new("threads_fetch_shard_started", &["thread_pool", "fetch_shard_started", "threads"]),
    MetricPath::new("threads_fetch_shard_store", &["thread_pool", "fetch_shard_store", "threads"]),
    MetricPath::new("threads_listener", &["thread_pool", "listener", "threads"]), // gone in 8.x
    MetricPath::new("count_rx", &["transport", "rx_count"]),
    MetricPath::new("count_tx", &["transport", "tx_count"]),
    MetricPath::new("open_file_descriptors", &["process", "open_file_descriptors"]),
    MetricPath::new("compilations", &["script", "compilations"]),
    MetricPath::new("cache_evictions", &["script", "cache_evictions"]),
    MetricPath::new("compilation_limit_triggered", &["script", "compilation_limit_triggered"]),
];

pub struct ElasticsearchCollector {
    transport: HttpSource,
    paths: Vec<MetricPath>,
    policy: MissingPolicy,
    scratch_name: String,
    label_prefix: String,
}

impl ElasticsearchCollector {
    pub fn new(config: ElasticsearchConfig) -> Result<Self> {
        let url = format!("{}/_nodes/_local/stats", config.uri);
        let transport = HttpSource::new(url, config.auth, config.insecure, config.common.timeout)?;
        let policy = if config.suppress_missing_error {
            MissingPolicy::Suppress
        } else {
            MissingPolicy::Fail
        };

        Ok(Self {
            transport,
            paths: NODE_STATS_PATHS.to_vec(),
            policy,
            scratch_name: format!("elasticsearch-{}-{}", config.host, config.port),
            label_prefix: config.common.label_prefix,
        })
    }
}

/// The stats object of the single node in a `_nodes/_local/stats` answer.
fn local_node(root: &Value) -> Result<&Value> {
    let nodes = root
        .get("nodes")
        .and_then(Value::as_object)
        .ok_or_else(|| PluginError::Format("no 'nodes' object in node stats".to_string()))?;

    let mut iter = nodes.values();
    match (iter.next(), iter.next()) {
        (Some(node), None) if node.is_object() => Ok(node),
        (Some(_), None) => Err(PluginError::Format("node stats entry is not an object".to_string())),
        (None, _) => Err(PluginError::Format("no node found in node stats".to_string())),
        (Some(_), Some(_)) => Err(PluginError::Format(format!(
            "multiple nodes found ({}), expected only the local node",
            nodes.len()
        ))),
    }
}

#[async_trait]
impl Collector for ElasticsearchCollector {
    type Payload = Value;

    fn name(&self) -> &str {
        "elasticsearch"
    }

    fn scratch_name(&self) -> String {
        self.scratch_name.clone()
    }

    fn schema(&self) -> Schema {
        let label = &self.label_prefix;
        Schema::new(vec![
            Graph::new("http", format!("{label} HTTP"), Unit::Integer, &[MetricDef::counter("http_opened", "Opened")]),
            Graph::new(
                "indices",
                format!("{label} Indices"),
                Unit::Integer,
                &[
                    MetricDef::counter("total_indexing_index", "Indexing-Index").stacked(),
                    MetricDef::counter("total_indexing_delete", "Indexing-Delete").stacked(),
                    MetricDef::counter("total_get", "Get").stacked(),
                    MetricDef::counter("total_search_query", "Search-Query").stacked(),
                    MetricDef::counter("total_search_fetch", "Search-fetch").stacked(),
                    MetricDef::counter("total_merges", "Merges").stacked(),
                    MetricDef::counter("total_refresh", "Refresh").stacked(),
                    MetricDef::counter("total_flush", "Flush").stacked(),
                    MetricDef::counter("total_warmer", "Warmer").stacked(),
                    MetricDef::counter("total_percolate", "Percolate").stacked(),
                    MetricDef::counter("total_suggest", "Suggest").stacked(),
                ],
            ),
            Graph::new(
                "indices.docs",
                format!("{label} Indices Docs"),
                Unit::Integer,
                &[
                    MetricDef::gauge("docs_count", "Count").stacked(),
                    MetricDef::gauge("docs_deleted", "Deleted").stacked(),
                ],
            ),
            Graph::new(
                "indices.memory_size",
                format!("{label} Indices Memory Size"),
                Unit::Bytes,
                &[
                    MetricDef::gauge("fielddata_size", "Fielddata").stacked(),
                    MetricDef::gauge("filter_cache_size", "Filter Cache").stacked(),
                    MetricDef::gauge("segments_size", "Lucene Segments").stacked(),
                    MetricDef::gauge("segments_index_writer_size", "Lucene Segments Index Writer").stacked(),
                    MetricDef::gauge("segments_version_map_size", "Lucene Segments Version Map").stacked(),
                    MetricDef::gauge("segments_fixed_bit_set_size", "Lucene Segments Fixed Bit Set").stacked(),
                ],
            ),
            Graph::new(
                "indices.evictions",
                format!("{label} Indices Evictions"),
                Unit::Integer,
                &[
                    MetricDef::counter("evictions_fielddata", "Fielddata"),
                    MetricDef::counter("evictions_filter_cache", "Filter Cache"),
                ],
            ),
            Graph::new(
                "jvm.heap",
                format!("{label} JVM Heap Mem"),
                Unit::Bytes,
                &[MetricDef::gauge("heap_used", "Used"), MetricDef::gauge("heap_max", "Max")],
            ),
            Graph::new(
                "thread_pool.threads",
                format!("{label} Thread-Pool Threads"),
                Unit::Integer,
                &[
                    MetricDef::gauge("threads_generic", "Generic").stacked(),
                    MetricDef::gauge("threads_index", "Index").stacked(),
                    MetricDef::gauge("threads_snapshot_data", "Snapshot Data").stacked(),
                    MetricDef::gauge("threads_get", "Get").stacked(),
                    MetricDef::gauge("threads_bench", "Bench").stacked(),
                    MetricDef::gauge("threads_snapshot", "Snapshot").stacked(),
                    MetricDef::gauge("threads_merge", "Merge").stacked(),
                    MetricDef::gauge("threads_suggest", "Suggest").stacked(),
                    MetricDef::gauge("threads_bulk", "Bulk").stacked(),
                    MetricDef::gauge("threads_optimize", "Optimize").stacked(),
                    MetricDef::gauge("threads_warmer", "Warmer").stacked(),
                    MetricDef::gauge("threads_flush", "Flush").stacked(),
                    MetricDef::gauge("threads_search", "Search").stacked(),
                    MetricDef::gauge("threads_percolate", "Percolate").stacked(),
                    MetricDef::gauge("threads_refresh", "Refresh").stacked(),
                    MetricDef::gauge("threads_management", "Management").stacked(),
                    MetricDef::gauge("threads_fetch_shard_started", "Fetch Shard Started").stacked(),
                    MetricDef::gauge("threads_fetch_shard_store", "Fetch Shard Store").stacked(),
                    MetricDef::gauge("threads_listener", "Listener").stacked(),
                ],
            ),
            Graph::new(
                "transport.count",
                format!("{label} Transport Count"),
                Unit::Integer,
                &[MetricDef::counter("count_rx", "RX"), MetricDef::counter("count_tx", "TX")],
            ),
            Graph::new(
                "process",
                format!("{label} Process"),
                Unit::Integer,
                &[MetricDef::gauge("open_file_descriptors", "Open File Descriptors")],
            ),
            Graph::new(
                "script",
                format!("{label} Script"),
                Unit::Integer,
                &[
                    MetricDef::counter("compilations", "Compilations"),
                    MetricDef::counter("cache_evictions", "Cache Evictions"),
                    MetricDef::counter("compilation_limit_triggered", "Compilation Limit Triggered"),
                ],
            ),
        ])
    }

    async fn fetch(&self) -> Result<Value> {
        let body = self.transport.fetch().await?;
        serde_json::from_slice(&body)
            .map_err(|e| PluginError::Format(format!("node stats are not valid JSON: {e}")))
    }

    fn extract(&self, payload: Value) -> Result<Samples> {
        let node = local_node(&payload)?;
        path::extract(node, &self.paths, self.policy)
    }
}
