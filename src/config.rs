//! Command-line and config-file settings for every plugin.
//!
//! Each plugin's flags double as its `[table]` in the optional TOML file, so
//! both share one struct with every field optional. Resolution is explicit
//! flag first, then file value, then the built-in default, and ends in an
//! immutable `*Config` value.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use reqwest::Url;
use serde::Deserialize;

use crate::error::{PluginError, Result};
use crate::transport::http::BasicAuth;
use crate::transport::Endpoint;

fn default_timeout() -> u64 {
    5
}

#[derive(Args, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct CommonArgs {
    /// Metric key prefix
    #[arg(long)]
    pub metric_key_prefix: Option<String>,
    /// Metric label prefix
    #[arg(long)]
    pub metric_label_prefix: Option<String>,
    /// Seconds to wait for the target [default: 5]
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
    /// Scratch file used to compute rates between runs
    #[arg(long, value_name = "PATH")]
    pub tempfile: Option<PathBuf>,
}

/// Settings every plugin shares once resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Common {
    pub prefix: String,
    pub label_prefix: String,
    pub timeout: Duration,
    pub tempfile: Option<PathBuf>,
}

impl CommonArgs {
    fn merge(self, file: CommonArgs) -> Self {
        Self {
            metric_key_prefix: self.metric_key_prefix.or(file.metric_key_prefix),
            metric_label_prefix: self.metric_label_prefix.or(file.metric_label_prefix),
            timeout: self.timeout.or(file.timeout),
            tempfile: self.tempfile.or(file.tempfile),
        }
    }

    /// `name` is the default key prefix, `display` the label used with it.
    fn resolve(self, name: &str, display: &str) -> Result<Common> {
        let prefix = self.metric_key_prefix.unwrap_or_else(|| name.to_string());
        let label_prefix = match self.metric_label_prefix.filter(|l| !l.is_empty()) {
            Some(label) => label,
            None if prefix == name => display.to_string(),
            None => title_case(&prefix),
        };

        let timeout = self.timeout.unwrap_or_else(default_timeout);
        if timeout == 0 {
            return Err(PluginError::Config("timeout must be at least 1 second".to_string()));
        }

        Ok(Common {
            prefix,
            label_prefix,
            timeout: Duration::from_secs(timeout),
            tempfile: self.tempfile,
        })
    }
}

/// Upper-cases the first letter of every word, words being split on any
/// non-alphanumeric character: `php-fpm` becomes `Php-Fpm`.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut boundary = true;
    for c in s.chars() {
        if boundary {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        boundary = !c.is_alphanumeric();
    }
    out
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// haproxy

#[derive(Args, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct HaproxyArgs {
    /// Stats page URI; overrides scheme, host, port and path
    #[arg(long)]
    pub uri: Option<String>,
    /// [default: http]
    #[arg(long)]
    pub scheme: Option<String>,
    /// [default: localhost]
    #[arg(long)]
    pub host: Option<String>,
    /// [default: 80]
    #[arg(long)]
    pub port: Option<u16>,
    /// [default: /]
    #[arg(long)]
    pub path: Option<String>,
    /// Username for basic auth
    #[arg(long)]
    pub username: Option<String>,
    /// Password for basic auth
    #[arg(long)]
    pub password: Option<String>,
    /// Skip TLS certificate verification
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub insecure: Option<bool>,
    /// Read stats from this unix socket instead of HTTP
    #[arg(long, value_name = "PATH")]
    pub socket: Option<PathBuf>,
    #[command(flatten)]
    #[serde(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HaproxySource {
    Http {
        uri: String,
        auth: Option<BasicAuth>,
        insecure: bool,
    },
    Socket(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HaproxyConfig {
    pub source: HaproxySource,
    pub common: Common,
}

impl HaproxyArgs {
    pub fn merge(self, file: HaproxyArgs) -> Self {
        Self {
            uri: self.uri.or(file.uri),
            scheme: self.scheme.or(file.scheme),
            host: self.host.or(file.host),
            port: self.port.or(file.port),
            path: self.path.or(file.path),
            username: self.username.or(file.username),
            password: self.password.or(file.password),
            insecure: self.insecure.or(file.insecure),
            socket: self.socket.or(file.socket),
            common: self.common.merge(file.common),
        }
    }

    pub fn resolve(self) -> Result<HaproxyConfig> {
        let common = self.common.resolve("haproxy", "HAProxy")?;

        let source = match self.socket {
            Some(socket) => HaproxySource::Socket(socket),
            None => {
                let uri = match non_empty(self.uri) {
                    Some(uri) => uri,
                    None => format!(
                        "{}://{}:{}{}",
                        self.scheme.as_deref().unwrap_or("http"),
                        self.host.as_deref().unwrap_or("localhost"),
                        self.port.unwrap_or(80),
                        self.path.as_deref().unwrap_or("/"),
                    ),
                };
                // normalised so a bare `http://host:port` gains its `/`
                let uri = parse_url(&uri)?.to_string();
                let auth = non_empty(self.username).map(|username| BasicAuth {
                    username,
                    password: self.password,
                });
                HaproxySource::Http {
                    uri,
                    auth,
                    insecure: self.insecure.unwrap_or(false),
                }
            }
        };

        Ok(HaproxyConfig { source, common })
    }
}

impl HaproxyConfig {
    pub fn scratch_name(&self) -> String {
        match &self.source {
            HaproxySource::Http { uri, .. } => format!("haproxy-{}", url_identity(uri)),
            HaproxySource::Socket(path) => format!("haproxy-{}", path.display()),
        }
    }
}

// ---------------------------------------------------------------------------
// elasticsearch

#[derive(Args, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct ElasticsearchArgs {
    /// [default: http]
    #[arg(long)]
    pub scheme: Option<String>,
    /// [default: localhost]
    #[arg(long)]
    pub host: Option<String>,
    /// [default: 9200]
    #[arg(long)]
    pub port: Option<u16>,
    /// Basic auth user
    #[arg(long)]
    pub user: Option<String>,
    /// Basic auth password
    #[arg(long)]
    pub password: Option<String>,
    /// Skip TLS certificate verification
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub insecure: Option<bool>,
    /// Report the metrics that exist instead of failing when some are missing
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub suppress_missing_error: Option<bool>,
    #[command(flatten)]
    #[serde(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElasticsearchConfig {
    pub uri: String,
    pub host: String,
    pub port: u16,
    pub auth: Option<BasicAuth>,
    pub insecure: bool,
    pub suppress_missing_error: bool,
    pub common: Common,
}

impl ElasticsearchArgs {
    pub fn merge(self, file: ElasticsearchArgs) -> Self {
        Self {
            scheme: self.scheme.or(file.scheme),
            host: self.host.or(file.host),
            port: self.port.or(file.port),
            user: self.user.or(file.user),
            password: self.password.or(file.password),
            insecure: self.insecure.or(file.insecure),
            suppress_missing_error: self.suppress_missing_error.or(file.suppress_missing_error),
            common: self.common.merge(file.common),
        }
    }

    pub fn resolve(self) -> Result<ElasticsearchConfig> {
        let common = self.common.resolve("elasticsearch", "Elasticsearch")?;
        let scheme = self.scheme.unwrap_or_else(|| "http".to_string());
        let host = self.host.unwrap_or_else(|| "localhost".to_string());
        let port = self.port.unwrap_or(9200);
        let uri = format!("{scheme}://{host}:{port}");
        parse_url(&uri)?;

        // Both halves are required, unlike haproxy.
        let auth = match (non_empty(self.user), non_empty(self.password)) {
            (Some(username), Some(password)) => Some(BasicAuth {
                username,
                password: Some(password),
            }),
            _ => None,
        };

        Ok(ElasticsearchConfig {
            uri,
            host,
            port,
            auth,
            insecure: self.insecure.unwrap_or(false),
            suppress_missing_error: self.suppress_missing_error.unwrap_or(false),
            common,
        })
    }
}

// ---------------------------------------------------------------------------
// php-fpm

#[derive(Args, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct PhpFpmArgs {
    /// Status page URL [default: http://localhost/status?json]
    #[arg(long)]
    pub url: Option<String>,
    /// Talk FastCGI straight to the pool at the URL's host:port
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub fcgi: Option<bool>,
    /// FastCGI unix socket; implies --fcgi
    #[arg(long, value_name = "PATH")]
    pub socket: Option<PathBuf>,
    #[command(flatten)]
    #[serde(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PhpFpmSource {
    Http { url: String },
    FastCgi { endpoint: Endpoint, script: String, query: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhpFpmConfig {
    pub source: PhpFpmSource,
    pub common: Common,
}

const PHP_FPM_FCGI_PORT: u16 = 9000;

impl PhpFpmArgs {
    pub fn merge(self, file: PhpFpmArgs) -> Self {
        Self {
            url: self.url.or(file.url),
            fcgi: self.fcgi.or(file.fcgi),
            socket: self.socket.or(file.socket),
            common: self.common.merge(file.common),
        }
    }

    pub fn resolve(self) -> Result<PhpFpmConfig> {
        let common = self.common.resolve("php-fpm", "PHP-FPM")?;
        let url = non_empty(self.url).unwrap_or_else(|| "http://localhost/status?json".to_string());
        let parsed = parse_url(&url)?;

        let fcgi = self.fcgi.unwrap_or(false) || self.socket.is_some();
        let source = if fcgi {
            let endpoint = match self.socket {
                Some(path) => Endpoint::Unix(path),
                None => {
                    let host = parsed.host_str().unwrap_or("localhost");
                    Endpoint::Tcp(format!("{host}:{}", parsed.port().unwrap_or(PHP_FPM_FCGI_PORT)))
                }
            };
            PhpFpmSource::FastCgi {
                endpoint,
                script: parsed.path().to_string(),
                query: parsed.query().unwrap_or_default().to_string(),
            }
        } else {
            PhpFpmSource::Http { url }
        };

        Ok(PhpFpmConfig { source, common })
    }
}

// ---------------------------------------------------------------------------
// memcached

#[derive(Args, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct MemcachedArgs {
    /// [default: localhost]
    #[arg(long)]
    pub host: Option<String>,
    /// [default: 11211]
    #[arg(long)]
    pub port: Option<u16>,
    /// Connect to this unix socket instead of TCP
    #[arg(long, value_name = "PATH")]
    pub socket: Option<PathBuf>,
    #[command(flatten)]
    #[serde(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemcachedConfig {
    pub endpoint: Endpoint,
    pub common: Common,
}

impl MemcachedArgs {
    pub fn merge(self, file: MemcachedArgs) -> Self {
        Self {
            host: self.host.or(file.host),
            port: self.port.or(file.port),
            socket: self.socket.or(file.socket),
            common: self.common.merge(file.common),
        }
    }

    pub fn resolve(self) -> Result<MemcachedConfig> {
        let common = self.common.resolve("memcached", "Memcached")?;
        let endpoint = match self.socket {
            Some(path) => Endpoint::Unix(path),
            None => Endpoint::Tcp(format!(
                "{}:{}",
                self.host.as_deref().unwrap_or("localhost"),
                self.port.unwrap_or(11211)
            )),
        };
        Ok(MemcachedConfig { endpoint, common })
    }
}

impl MemcachedConfig {
    pub fn scratch_name(&self) -> String {
        match &self.endpoint {
            Endpoint::Tcp(addr) => format!("memcached-{}", addr.replace(':', "-")),
            Endpoint::Unix(path) => format!("memcached-{}", path.display()),
        }
    }
}

// ---------------------------------------------------------------------------
// config file

/// Optional TOML file with one table per plugin, keyed like the flags.
///
/// ```toml
/// [haproxy]
/// socket = "/run/haproxy/admin.sock"
///
/// [elasticsearch]
/// host = "es01"
/// suppress-missing-error = true
/// ```
#[derive(Deserialize, Debug, Default, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct FileConfig {
    pub haproxy: HaproxyArgs,
    pub elasticsearch: ElasticsearchArgs,
    pub php_fpm: PhpFpmArgs,
    pub memcached: MemcachedArgs,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PluginError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::parse(&content).map_err(|e| match e {
            PluginError::Config(msg) => PluginError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| PluginError::Config(e.message().to_string()))
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| PluginError::Config(format!("invalid url '{raw}': {e}")))
}

/// `host-port` for a URL, used to keep scratch files per target apart.
fn url_identity(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(url) => format!(
            "{}-{}",
            url.host_str().unwrap_or("localhost"),
            url.port_or_known_default().unwrap_or(80)
        ),
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("elasticsearch"), "Elasticsearch");
        assert_eq!(title_case("php-fpm"), "Php-Fpm");
        assert_eq!(title_case("my cluster.es"), "My Cluster.Es");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn test_common_defaults_and_label_rules() {
        let common = CommonArgs::default().resolve("php-fpm", "PHP-FPM").unwrap();
        assert_eq!(common.prefix, "php-fpm");
        assert_eq!(common.label_prefix, "PHP-FPM");
        assert_eq!(common.timeout, Duration::from_secs(5));
        assert_eq!(common.tempfile, None);

        let custom = CommonArgs {
            metric_key_prefix: Some("pool-a".into()),
            ..Default::default()
        };
        assert_eq!(custom.resolve("php-fpm", "PHP-FPM").unwrap().label_prefix, "Pool-A");

        let explicit = CommonArgs {
            metric_key_prefix: Some("pool-a".into()),
            metric_label_prefix: Some("Pool A".into()),
            ..Default::default()
        };
        assert_eq!(explicit.resolve("php-fpm", "PHP-FPM").unwrap().label_prefix, "Pool A");
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let args = CommonArgs {
            timeout: Some(0),
            ..Default::default()
        };
        assert!(matches!(args.resolve("x", "X"), Err(PluginError::Config(_))));
    }

    #[test]
    fn test_flags_override_file_values() {
        let file = FileConfig::parse(
            r#"
            [haproxy]
            host = "lb01"
            port = 8080
            timeout = 9
            metric-key-prefix = "edge"
            "#,
        )
        .unwrap();

        let cli = HaproxyArgs {
            port: Some(9000),
            ..Default::default()
        };
        let config = cli.merge(file.haproxy).resolve().unwrap();
        match &config.source {
            HaproxySource::Http { uri, auth, insecure } => {
                assert_eq!(uri, "http://lb01:9000/");
                assert!(auth.is_none());
                assert!(!insecure);
            }
            other => panic!("unexpected source: {other:?}"),
        }
        assert_eq!(config.common.timeout, Duration::from_secs(9));
        assert_eq!(config.common.prefix, "edge");
        assert_eq!(config.scratch_name(), "haproxy-lb01-9000");
    }

    #[test]
    fn test_haproxy_uri_socket_and_auth() {
        let args = HaproxyArgs {
            uri: Some("https://lb.example.com/stats".into()),
            username: Some("admin".into()),
            ..Default::default()
        };
        let config = args.resolve().unwrap();
        assert_eq!(config.scratch_name(), "haproxy-lb.example.com-443");
        match config.source {
            HaproxySource::Http { uri, auth, .. } => {
                assert_eq!(uri, "https://lb.example.com/stats");
                assert_eq!(auth.map(|a| a.username), Some("admin".to_string()));
            }
            other => panic!("unexpected source: {other:?}"),
        }

        let bare = HaproxyArgs {
            uri: Some("http://127.0.0.1:8404".into()),
            ..Default::default()
        }
        .resolve()
        .unwrap();
        assert!(matches!(bare.source, HaproxySource::Http { uri, .. } if uri == "http://127.0.0.1:8404/"));

        let socket = HaproxyArgs {
            socket: Some("/run/haproxy.sock".into()),
            ..Default::default()
        }
        .resolve()
        .unwrap();
        assert_eq!(socket.source, HaproxySource::Socket("/run/haproxy.sock".into()));

        let bad = HaproxyArgs {
            uri: Some("not a url".into()),
            ..Default::default()
        };
        assert!(matches!(bad.resolve(), Err(PluginError::Config(_))));
    }

    #[test]
    fn test_elasticsearch_auth_needs_both_halves() {
        let only_user = ElasticsearchArgs {
            user: Some("elastic".into()),
            ..Default::default()
        }
        .resolve()
        .unwrap();
        assert!(only_user.auth.is_none());
        assert_eq!(only_user.uri, "http://localhost:9200");
        assert!(!only_user.suppress_missing_error);

        let both = ElasticsearchArgs {
            user: Some("elastic".into()),
            password: Some("changeme".into()),
            suppress_missing_error: Some(true),
            ..Default::default()
        }
        .resolve()
        .unwrap();
        assert!(both.auth.is_some());
        assert!(both.suppress_missing_error);
        assert_eq!(both.common.label_prefix, "Elasticsearch");
    }

    #[test]
    fn test_php_fpm_sources() {
        let http = PhpFpmArgs::default().resolve().unwrap();
        assert_eq!(
            http.source,
            PhpFpmSource::Http {
                url: "http://localhost/status?json".into()
            }
        );

        let tcp = PhpFpmArgs {
            url: Some("http://127.0.0.1/fpm-status?json&full".into()),
            fcgi: Some(true),
            ..Default::default()
        }
        .resolve()
        .unwrap();
        assert_eq!(
            tcp.source,
            PhpFpmSource::FastCgi {
                endpoint: Endpoint::Tcp("127.0.0.1:9000".into()),
                script: "/fpm-status".into(),
                query: "json&full".into(),
            }
        );

        let unix = PhpFpmArgs {
            socket: Some("/run/php/fpm.sock".into()),
            ..Default::default()
        }
        .resolve()
        .unwrap();
        assert!(matches!(
            unix.source,
            PhpFpmSource::FastCgi { endpoint: Endpoint::Unix(_), .. }
        ));
    }

    #[test]
    fn test_memcached_endpoint() {
        let config = MemcachedArgs::default().resolve().unwrap();
        assert_eq!(config.endpoint, Endpoint::Tcp("localhost:11211".into()));
        assert_eq!(config.scratch_name(), "memcached-localhost-11211");
    }

    #[test]
    fn test_file_config_tables() {
        let file = FileConfig::parse(
            r#"
            [php-fpm]
            url = "http://pool/status?json"
            fcgi = true

            [memcached]
            socket = "/run/memcached.sock"
            "#,
        )
        .unwrap();
        assert_eq!(file.php_fpm.fcgi, Some(true));
        assert_eq!(file.memcached.socket, Some(PathBuf::from("/run/memcached.sock")));
        assert_eq!(file.haproxy, HaproxyArgs::default());

        assert!(matches!(FileConfig::parse("[haproxy]\nport = \"x\""), Err(PluginError::Config(_))));
    }
}
