mod collectors;
mod config;
mod error;
mod exporters;
mod extract;
mod rate;
mod runner;
mod schema;
mod state;
mod transport;

use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::collectors::elasticsearch::ElasticsearchCollector;
use crate::collectors::haproxy::HaproxyCollector;
use crate::collectors::memcached::MemcachedCollector;
use crate::collectors::php_fpm::PhpFpmCollector;
use crate::config::{ElasticsearchArgs, FileConfig, HaproxyArgs, MemcachedArgs, PhpFpmArgs};
use crate::error::Result;
use crate::exporters::meta;

/// One-shot metric plugins for HAProxy, Elasticsearch, PHP-FPM and memcached.
#[derive(Parser, Debug)]
#[command(name = "rsvcmetrics", version, about)]
struct Cli {
    /// TOML file with per-plugin defaults
    #[arg(long, global = true, env = "RSVCMETRICS_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    plugin: Plugin,
}

#[derive(Subcommand, Debug)]
enum Plugin {
    /// Backend totals from the HAProxy stats CSV
    Haproxy(HaproxyArgs),
    /// Local node stats from Elasticsearch
    Elasticsearch(ElasticsearchArgs),
    /// Pool status from PHP-FPM
    PhpFpm(PhpFpmArgs),
    /// Server stats from memcached
    Memcached(MemcachedArgs),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // stdout carries the metrics, so logs go to stderr (default: warn).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .without_time()
        .init();

    let cli = Cli::parse();

    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn execute(cli: Cli) -> Result<()> {
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let meta = meta::requested();
    let now = chrono::Utc::now().timestamp();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match cli.plugin {
        Plugin::Haproxy(args) => {
            let config = args.merge(file.haproxy).resolve()?;
            let common = config.common.clone();
            let collector = HaproxyCollector::new(config)?;
            runner::run(&collector, &common, &mut out, now, meta).await?;
        }
        Plugin::Elasticsearch(args) => {
            let config = args.merge(file.elasticsearch).resolve()?;
            let common = config.common.clone();
            let collector = ElasticsearchCollector::new(config)?;
            runner::run(&collector, &common, &mut out, now, meta).await?;
        }
        Plugin::PhpFpm(args) => {
            let config = args.merge(file.php_fpm).resolve()?;
            let common = config.common.clone();
            let collector = PhpFpmCollector::new(config)?;
            runner::run(&collector, &common, &mut out, now, meta).await?;
        }
        Plugin::Memcached(args) => {
            let config = args.merge(file.memcached).resolve()?;
            let common = config.common.clone();
            let collector = MemcachedCollector::new(config);
            runner::run(&collector, &common, &mut out, now, meta).await?;
        }
    }

    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_subcommand_flags_parse() {
        let cli = Cli::try_parse_from([
            "rsvcmetrics",
            "php-fpm",
            "--url",
            "http://pool/status?json",
            "--fcgi",
            "--metric-key-prefix",
            "pool-a",
        ])
        .unwrap();
        match cli.plugin {
            Plugin::PhpFpm(args) => {
                assert_eq!(args.fcgi, Some(true));
                assert_eq!(args.common.metric_key_prefix.as_deref(), Some("pool-a"));
            }
            other => panic!("unexpected plugin: {other:?}"),
        }

        let cli = Cli::try_parse_from([
            "rsvcmetrics",
            "elasticsearch",
            "--suppress-missing-error=false",
            "--config",
            "/etc/rsvcmetrics.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/rsvcmetrics.toml")));
        match cli.plugin {
            Plugin::Elasticsearch(args) => assert_eq!(args.suppress_missing_error, Some(false)),
            other => panic!("unexpected plugin: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_plugin_is_a_usage_error() {
        let err = Cli::try_parse_from(["rsvcmetrics", "redis"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
