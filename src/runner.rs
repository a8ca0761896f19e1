use std::io::Write;

use crate::collectors::Collector;
use crate::config::Common;
use crate::error::Result;
use crate::exporters::{meta, text};
use crate::rate;
use crate::state::ScratchFile;

/// One invocation of a plugin: fetch, extract, convert counters, print.
///
/// With `meta` set only the graph definitions are written and the target is
/// never contacted.
pub async fn run<C, W>(collector: &C, common: &Common, out: &mut W, now: i64, meta: bool) -> Result<()>
where
    C: Collector,
    W: Write,
{
    let schema = collector.schema();
    if meta {
        return meta::write_definitions(out, &common.prefix, &schema);
    }

    let payload = collector.fetch().await?;
    let samples = collector.extract(payload)?;
    tracing::debug!(plugin = collector.name(), count = samples.len(), "samples extracted");

    if !schema.has_counters() {
        return text::write_samples(out, &common.prefix, &schema, &samples, now);
    }

    let scratch = match &common.tempfile {
        Some(path) => ScratchFile::new(path),
        None => ScratchFile::for_plugin(&collector.scratch_name()),
    };
    let previous = scratch.load();
    let adjusted = rate::apply(&schema, previous.as_ref(), &samples, now);

    // Persist first: a failed save must not leave half an emission behind.
    scratch.save(&rate::snapshot(&schema, &samples, now))?;
    text::write_samples(out, &common.prefix, &schema, &adjusted, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::{MetricValue, Samples};
    use crate::error::PluginError;
    use crate::schema::{Graph, MetricDef, Schema, Unit};
    use async_trait::async_trait;
    use std::time::Duration;

    struct Fixed {
        samples: Option<Samples>,
        counters: bool,
    }

    impl Fixed {
        fn new(pairs: &[(&str, MetricValue)], counters: bool) -> Self {
            let samples = pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect();
            Self {
                samples: Some(samples),
                counters,
            }
        }
    }

    #[async_trait]
    impl Collector for Fixed {
        type Payload = Samples;

        fn name(&self) -> &str {
            "fixed"
        }

        fn schema(&self) -> Schema {
            let requests = if self.counters {
                MetricDef::counter("requests", "Requests")
            } else {
                MetricDef::gauge("requests", "Requests")
            };
            Schema::new(vec![Graph::new(
                "load",
                "Fixed Load".to_string(),
                Unit::Integer,
                &[requests, MetricDef::gauge("workers", "Workers")],
            )])
        }

        async fn fetch(&self) -> Result<Samples> {
            self.samples
                .clone()
                .ok_or_else(|| PluginError::protocol("http://fixed", "500 Internal Server Error", b""))
        }

        fn extract(&self, payload: Samples) -> Result<Samples> {
            Ok(payload)
        }
    }

    fn common(tempfile: Option<std::path::PathBuf>) -> Common {
        Common {
            prefix: "fixed".to_string(),
            label_prefix: "Fixed".to_string(),
            timeout: Duration::from_secs(5),
            tempfile,
        }
    }

    async fn run_to_string(collector: &Fixed, common: &Common, now: i64) -> Result<String> {
        let mut out = Vec::new();
        run(collector, common, &mut out, now, false).await?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn test_counters_need_two_runs() {
        let dir = tempfile::tempdir().unwrap();
        let common = common(Some(dir.path().join("scratch")));

        let first = Fixed::new(&[("requests", MetricValue::Uint(100)), ("workers", MetricValue::Uint(4))], true);
        let out = run_to_string(&first, &common, 1_000).await.unwrap();
        assert_eq!(out, "fixed.load.workers\t4\t1000\n");
        assert!(dir.path().join("scratch").exists());

        let second = Fixed::new(&[("requests", MetricValue::Uint(160)), ("workers", MetricValue::Uint(5))], true);
        let out = run_to_string(&second, &common, 1_060).await.unwrap();
        assert_eq!(out, "fixed.load.requests\t1.000000\t1060\nfixed.load.workers\t5\t1060\n");
    }

    #[tokio::test]
    async fn test_failed_fetch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let common = common(Some(dir.path().join("scratch")));
        let broken = Fixed {
            samples: None,
            counters: true,
        };

        let mut out = Vec::new();
        let err = run(&broken, &common, &mut out, 1_000, false).await.unwrap_err();
        assert!(matches!(err, PluginError::Protocol { .. }));
        assert!(out.is_empty());
        assert!(!dir.path().join("scratch").exists());
    }

    #[tokio::test]
    async fn test_unwritable_scratch_file_blocks_output() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the scratch directory should be.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let common = common(Some(blocker.join("scratch")));

        let collector = Fixed::new(&[("requests", MetricValue::Uint(1)), ("workers", MetricValue::Uint(1))], true);
        let mut out = Vec::new();
        let err = run(&collector, &common, &mut out, 1_000, false).await.unwrap_err();
        assert!(matches!(err, PluginError::State { .. }));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_gauges_skip_the_scratch_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scratch");
        let collector = Fixed::new(&[("requests", MetricValue::Uint(7))], false);

        let out = run_to_string(&collector, &common(Some(path.clone())), 1_000).await.unwrap();
        assert_eq!(out, "fixed.load.requests\t7\t1000\n");
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_meta_mode_skips_fetch() {
        let broken = Fixed {
            samples: None,
            counters: true,
        };
        let mut out = Vec::new();
        run(&broken, &common(None), &mut out, 1_000, true).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("# mackerel-agent-plugin\n"));
        assert!(text.contains("\"fixed.load\""));
    }
}
