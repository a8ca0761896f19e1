use serde_json::Value;

use crate::collectors::{MetricValue, Samples};
use crate::error::{PluginError, Result};

/// Where a metric lives inside a nested JSON document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricPath {
    pub name: &'static str,
    pub keys: &'static [&'static str],
}

impl MetricPath {
    pub const fn new(name: &'static str, keys: &'static [&'static str]) -> Self {
        Self { name, keys }
    }
}

/// What to do when a declared path cannot be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingPolicy {
    /// Abort the extraction with [`PluginError::Extraction`].
    #[default]
    Fail,
    /// Skip the metric and keep going; the gap is logged at debug level.
    Suppress,
}

/// Follows `keys` from `root` down to a numeric leaf.
pub fn walk(root: &Value, keys: &[&str]) -> std::result::Result<f64, String> {
    let Some((leaf, branch)) = keys.split_last() else {
        return Err("empty path".to_string());
    };

    let mut node = root;
    for key in branch {
        node = match node.get(*key) {
            Some(next) if next.is_object() => next,
            Some(_) => return Err(format!("'{key}' is not an object")),
            None => return Err(format!("'{key}' not found")),
        };
    }

    match node.get(*leaf) {
        Some(value) => value
            .as_f64()
            .ok_or_else(|| format!("'{leaf}' is not a number")),
        None => Err(format!("'{leaf}' not found")),
    }
}

/// Resolves every path against `root`.
pub fn extract(root: &Value, paths: &[MetricPath], policy: MissingPolicy) -> Result<Samples> {
    let mut samples = Samples::with_capacity(paths.len());
    for path in paths {
        match walk(root, path.keys) {
            Ok(value) => {
                samples.insert(path.name.to_string(), MetricValue::Float(value));
            }
            Err(reason) => match policy {
                MissingPolicy::Fail => {
                    return Err(PluginError::Extraction {
                        metric: path.name.to_string(),
                        reason,
                    })
                }
                MissingPolicy::Suppress => {
                    tracing::debug!(metric = path.name, %reason, "skipping missing metric");
                }
            },
        }
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "jvm": { "mem": { "heap_used_in_bytes": 1024, "heap_max_in_bytes": 4096.5 } },
            "process": { "open_file_descriptors": 12 },
            "thread_pool": "disabled",
            "script": { "compilations": "many" }
        })
    }

    #[test]
    fn test_walk_reaches_numeric_leaves() {
        let root = doc();
        assert_eq!(walk(&root, &["jvm", "mem", "heap_used_in_bytes"]), Ok(1024.0));
        assert_eq!(walk(&root, &["jvm", "mem", "heap_max_in_bytes"]), Ok(4096.5));
        assert_eq!(walk(&root, &["process", "open_file_descriptors"]), Ok(12.0));
    }

    #[test]
    fn test_walk_failures() {
        let root = doc();
        assert!(walk(&root, &["indices", "docs", "count"]).unwrap_err().contains("not found"));
        assert!(walk(&root, &["thread_pool", "get", "threads"])
            .unwrap_err()
            .contains("not an object"));
        assert!(walk(&root, &["script", "compilations"])
            .unwrap_err()
            .contains("not a number"));
        assert!(walk(&root, &["jvm", "mem", "nope"]).is_err());
        assert!(walk(&root, &[]).is_err());
    }

    const PATHS: &[MetricPath] = &[
        MetricPath::new("heap_used", &["jvm", "mem", "heap_used_in_bytes"]),
        MetricPath::new("docs_count", &["indices", "docs", "count"]),
        MetricPath::new("open_file_descriptors", &["process", "open_file_descriptors"]),
    ];

    #[test]
    fn test_fail_policy_aborts_on_first_gap() {
        let err = extract(&doc(), PATHS, MissingPolicy::Fail).unwrap_err();
        match err {
            PluginError::Extraction { metric, .. } => assert_eq!(metric, "docs_count"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_suppress_policy_keeps_present_metrics() {
        let samples = extract(&doc(), PATHS, MissingPolicy::Suppress).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples["heap_used"], MetricValue::Float(1024.0));
        assert_eq!(samples["open_file_descriptors"], MetricValue::Float(12.0));
        assert!(!samples.contains_key("docs_count"));
    }
}
