//! Command line parser
//!
//! Every option can also be set from the environment, which is how
//! the exporter is usually configured when it runs in a container.
use clap::Parser;
use regex::Regex;
use std::convert::Infallible;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Optional behaviour of the management API the exporter may rely on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// The server accepts `sort=` to skip sorting list replies
    pub no_sort: bool,
    /// The server can reply in the Erlang external term format
    pub bert: bool,
}

impl FromStr for Capabilities {
    type Err = Infallible;

    /// Comma separated capability names. Unknown names are ignored
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let mut caps = Capabilities::default();
        for name in raw.split(',').map(str::trim) {
            match name {
                "no_sort" => caps.no_sort = true,
                "bert" => caps.bert = true,
                _ => {}
            }
        }
        Ok(caps)
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [(self.no_sort, "no_sort"), (self.bert, "bert")]
            .into_iter()
            .filter_map(|(on, name)| on.then_some(name))
            .collect();
        f.write_str(&names.join(","))
    }
}

/// How log lines are written
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable text
    Tty,
    /// One JSON object per line
    Json,
}

/// Accept only `http` and `https` management URLs
fn parse_rabbit_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url),
        _ => Err("Rabbit URL must start with http:// or https://".to_string()),
    }
}

/// Credentials for the management API. A `*-file` option takes
/// precedence over the plain value
#[derive(Clone, Debug, clap::Args)]
pub struct Credentials {
    /// User name for the management API
    #[clap(long, env = "RABBIT_USER", default_value = "guest")]
    pub rabbit_user: String,

    /// File holding the user name
    #[clap(long, env = "RABBIT_USER_FILE")]
    pub rabbit_user_file: Option<PathBuf>,

    /// Password for the management API
    #[clap(long, env = "RABBIT_PASSWORD", default_value = "guest", hide_env_values = true)]
    pub rabbit_password: String,

    /// File holding the password
    #[clap(long, env = "RABBIT_PASSWORD_FILE")]
    pub rabbit_password_file: Option<PathBuf>,
}

/// Read a secret from `file`, without surrounding whitespace
fn read_secret(file: &Path) -> std::io::Result<String> {
    Ok(std::fs::read_to_string(file)?.trim().to_string())
}

impl Credentials {
    /// The user name to log in with
    pub fn username(&self) -> std::io::Result<String> {
        match &self.rabbit_user_file {
            Some(file) => read_secret(file),
            None => Ok(self.rabbit_user.clone()),
        }
    }

    /// The password to log in with
    pub fn password(&self) -> std::io::Result<String> {
        match &self.rabbit_password_file {
            Some(file) => read_secret(file),
            None => Ok(self.rabbit_password.clone()),
        }
    }
}

/// Options controlling TLS connections to the management API
#[derive(Clone, Debug, clap::Args)]
pub struct TlsArgs {
    /// PEM formatted CA certificate to trust in addition to the
    /// system roots
    #[clap(long, env = "CAFILE")]
    pub ca_file: Option<PathBuf>,

    /// PEM formatted client certificate to present to the management
    /// API
    #[clap(long, env = "CERTFILE", requires = "key_file")]
    pub cert_file: Option<PathBuf>,

    /// PEM formatted private key of the client certificate
    #[clap(long, env = "KEYFILE", requires = "cert_file")]
    pub key_file: Option<PathBuf>,

    /// Do not verify the server certificate
    #[clap(
        long,
        env = "SKIPVERIFY",
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    pub skip_verify: bool,
}

/// Which vhosts and queues the queue exporter reports
#[derive(Clone, Debug, clap::Args)]
pub struct QueueFilters {
    /// Only report queues whose name matches
    #[clap(long, env = "INCLUDE_QUEUES", default_value = ".*", value_parser = Regex::new)]
    pub include_queues: Regex,

    /// Do not report queues whose name matches
    #[clap(long, env = "SKIP_QUEUES", default_value = "^$", value_parser = Regex::new)]
    pub skip_queues: Regex,

    /// Only report queues in vhosts that match
    #[clap(long, env = "INCLUDE_VHOST", default_value = ".*", value_parser = Regex::new)]
    pub include_vhost: Regex,

    /// Do not report queues in vhosts that match
    #[clap(long, env = "SKIP_VHOST", default_value = "^$", value_parser = Regex::new)]
    pub skip_vhost: Regex,
}

impl QueueFilters {
    /// Whether the queue `name` in `vhost` passes all filters
    pub fn matches(&self, vhost: &str, name: &str) -> bool {
        self.include_vhost.is_match(vhost)
            && !self.skip_vhost.is_match(vhost)
            && self.include_queues.is_match(name)
            && !self.skip_queues.is_match(name)
    }
}

/// Prometheus exporter for the `RabbitMQ` management API
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Config {
    /// Base URL of the management API
    #[clap(long, env = "RABBIT_URL", default_value = "http://127.0.0.1:15672", value_parser = parse_rabbit_url)]
    pub rabbit_url: Url,

    /// Management API credentials
    #[clap(flatten)]
    pub credentials: Credentials,

    /// TLS options for the management API
    #[clap(flatten)]
    pub tls: TlsArgs,

    /// Queue filters
    #[clap(flatten)]
    pub filters: QueueFilters,

    /// Address to serve metrics on
    #[clap(long, env = "PUBLISH_ADDR", default_value = "0.0.0.0")]
    pub publish_addr: IpAddr,

    /// Port to serve metrics on
    #[clap(long, env = "PUBLISH_PORT", default_value_t = 9419)]
    pub publish_port: u16,

    /// Format of log output. The level is set with `RUST_LOG`
    #[clap(long, env = "OUTPUT_FORMAT", value_enum, ignore_case = true, default_value_t = LogFormat::Tty)]
    pub log_format: LogFormat,

    /// Source keys of metrics not to export, such as
    /// `message_stats.publish`
    #[clap(long, env = "EXCLUDE_METRICS", value_delimiter = ',')]
    pub exclude_metrics: Vec<String>,

    /// Management API features to use. Known values are `no_sort` and
    /// `bert`
    #[clap(long, env = "RABBIT_CAPABILITIES", default_value = "no_sort,bert")]
    pub rabbit_capabilities: Capabilities,

    /// Exporters to run in addition to `overview`
    #[clap(
        long,
        env = "RABBIT_EXPORTERS",
        value_delimiter = ',',
        default_value = "exchange,node,overview,queue"
    )]
    pub exporters: Vec<String>,

    /// Timeout of one management API request, in seconds
    #[clap(long, env = "RABBIT_TIMEOUT", default_value_t = 30)]
    pub timeout: u64,

    /// Skip the queue exporter when the cluster has more queues than
    /// this. 0 means no limit
    #[clap(long, env = "MAX_QUEUES", default_value_t = 0)]
    pub max_queues: usize,

    /// Fetch this URL and exit with 0 if it answers 200, 1 otherwise.
    /// Used as a container health check
    #[clap(long)]
    pub check_url: Option<Url>,
}

impl Config {
    /// Address the metrics server listens on
    pub fn publish_socket(&self) -> SocketAddr {
        SocketAddr::new(self.publish_addr, self.publish_port)
    }

    /// Management API request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Whether metrics from source `key` should be exported
    pub fn is_excluded(&self, key: &str) -> bool {
        self.exclude_metrics.iter().any(|excluded| excluded == key)
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use clap::Parser;

    /// A configuration parsed from `args`, ignoring the environment
    /// for the options given
    pub(crate) fn config(args: &[&str]) -> Config {
        Config::parse_from(std::iter::once("rabbitmq-exporter").chain(args.iter().copied()))
    }

    #[test]
    fn capabilities() {
        let caps: Capabilities = "bert, no_sort,compression".parse().unwrap();
        assert_eq!(caps, Capabilities { no_sort: true, bert: true });
        assert_eq!(caps.to_string(), "no_sort,bert");

        let caps: Capabilities = "unknown".parse().unwrap();
        assert_eq!(caps, Capabilities::default());
        assert_eq!(caps.to_string(), "");
    }

    #[test]
    fn client_certificate_needs_a_key() {
        let parse = |args: &[&str]| {
            Config::try_parse_from(std::iter::once("rabbitmq-exporter").chain(args.iter().copied()))
        };
        assert!(parse(&["--cert-file=client.pem"]).is_err());
        assert!(parse(&["--key-file=client-key.pem"]).is_err());
        let config = parse(&["--cert-file=client.pem", "--key-file=client-key.pem"]).unwrap();
        assert_eq!(config.tls.cert_file, Some(PathBuf::from("client.pem")));
        assert_eq!(config.tls.key_file, Some(PathBuf::from("client-key.pem")));
    }

    #[test]
    fn rabbit_url_scheme() {
        assert!(parse_rabbit_url("https://rabbit.example:15671").is_ok());
        assert!(parse_rabbit_url("amqp://rabbit.example").is_err());
        assert!(parse_rabbit_url("rabbit.example:15672").is_err());
    }

    #[test]
    fn parse_options() {
        let config = config(&[
            "--rabbit-url=https://rabbit:15671/",
            "--publish-port=9000",
            "--log-format=JSON",
            "--exclude-metrics=message_stats.publish,disk_reads",
            "--rabbit-capabilities=no_sort",
            "--exporters=queue,connections",
            "--skip-queues=^amq\\.",
            "--max-queues=10",
            "--skip-verify",
        ]);
        assert_eq!(config.rabbit_url.as_str(), "https://rabbit:15671/");
        assert_eq!(config.publish_port, 9000);
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(config.is_excluded("disk_reads"));
        assert!(!config.is_excluded("disk_writes"));
        assert_eq!(config.rabbit_capabilities, Capabilities { no_sort: true, bert: false });
        assert_eq!(config.exporters, vec!["queue", "connections"]);
        assert_eq!(config.max_queues, 10);
        assert!(config.tls.skip_verify);
        assert!(!config.filters.matches("/", "amq.gen-123"));
        assert!(config.filters.matches("/", "orders"));
    }

    #[test]
    fn queue_filters() {
        let config = config(&["--include-vhost=^prod", "--skip-vhost=^prod-test$", "--include-queues=^q"]);
        assert!(config.filters.matches("prod", "q1"));
        assert!(!config.filters.matches("prod-test", "q1"));
        assert!(!config.filters.matches("dev", "q1"));
        assert!(!config.filters.matches("prod", "other"));
    }

    #[test]
    fn secrets_from_files() -> eyre::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let user = dir.path().join("user");
        std::fs::write(&user, "monitoring\n")?;
        let config = config(&[
            "--rabbit-user=ignored",
            &format!("--rabbit-user-file={}", user.display()),
            "--rabbit-password=secret",
        ]);
        assert_eq!(config.credentials.username()?, "monitoring");
        assert_eq!(config.credentials.password()?, "secret");

        let missing = config_with_password_file(&dir.path().join("missing"));
        assert!(missing.credentials.password().is_err());
        Ok(())
    }

    /// A configuration whose password is read from `file`
    fn config_with_password_file(file: &Path) -> Config {
        config(&[&format!("--rabbit-password-file={}", file.display())])
    }
}
