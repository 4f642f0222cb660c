//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "diretta";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PUBLIC_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_CMS_ENDPOINT: &str = "https://graphql.datocms.com/";
const DEFAULT_CMS_LISTEN_ENDPOINT: &str = "https://graphql-listen.datocms.com/graphql";
const DEFAULT_FEED_LIMIT: u32 = 10;
const DEFAULT_TIMESTAMP_REFRESH_SECS: u64 = 30;
const DEFAULT_TRANSITION_MS: u64 = 1200;

/// Command-line arguments for the Diretta binary.
#[derive(Debug, Parser)]
#[command(name = "diretta", version, about = "Diretta live blog server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "DIRETTA_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the Diretta HTTP service.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the public listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the public listener port.
    #[arg(long = "server-public-port", value_name = "PORT")]
    pub public_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the CMS GraphQL endpoint.
    #[arg(long = "cms-endpoint", value_name = "URL")]
    pub cms_endpoint: Option<String>,

    /// Override the CMS real-time listen endpoint.
    #[arg(long = "cms-listen-endpoint", value_name = "URL")]
    pub cms_listen_endpoint: Option<String>,

    /// Override the number of posts requested per feed query.
    #[arg(long = "feed-limit", value_name = "COUNT")]
    pub feed_limit: Option<u32>,

    /// Override the relative-timestamp refresh cadence.
    #[arg(long = "feed-timestamp-refresh-seconds", value_name = "SECONDS")]
    pub feed_timestamp_refresh_seconds: Option<u64>,

    /// Override the enter/exit transition duration for post cards.
    #[arg(long = "feed-transition-ms", value_name = "MILLIS")]
    pub feed_transition_ms: Option<u64>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub cms: CmsSettings,
    pub feed: FeedSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub public_addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

/// CMS connectivity. The token authenticates both the page-side fetch and
/// the live channel; it is a single shared credential by design.
#[derive(Debug, Clone)]
pub struct CmsSettings {
    pub endpoint: Url,
    pub listen_endpoint: Url,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub limit: NonZeroU32,
    pub timestamp_refresh: Duration,
    pub transition_ms: u64,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("DIRETTA").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    cms: RawCmsSettings,
    feed: RawFeedSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.public_port {
            self.server.public_port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(endpoint) = overrides.cms_endpoint.as_ref() {
            self.cms.endpoint = Some(endpoint.clone());
        }
        if let Some(endpoint) = overrides.cms_listen_endpoint.as_ref() {
            self.cms.listen_endpoint = Some(endpoint.clone());
        }
        if let Some(limit) = overrides.feed_limit {
            self.feed.limit = Some(limit);
        }
        if let Some(seconds) = overrides.feed_timestamp_refresh_seconds {
            self.feed.timestamp_refresh_seconds = Some(seconds);
        }
        if let Some(millis) = overrides.feed_transition_ms {
            self.feed.transition_ms = Some(millis);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            cms,
            feed,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let cms = build_cms_settings(cms)?;
        let feed = build_feed_settings(feed)?;

        Ok(Self {
            server,
            logging,
            cms,
            feed,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let public_port = server.public_port.unwrap_or(DEFAULT_PUBLIC_PORT);
    if public_port == 0 {
        return Err(LoadError::invalid(
            "server.public_port",
            "port must be greater than zero",
        ));
    }

    let public_addr = parse_socket_addr(&host, public_port)
        .map_err(|reason| LoadError::invalid("server.public_addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        public_addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cms_settings(cms: RawCmsSettings) -> Result<CmsSettings, LoadError> {
    let endpoint = parse_endpoint(
        cms.endpoint.as_deref().unwrap_or(DEFAULT_CMS_ENDPOINT),
        "cms.endpoint",
    )?;
    let listen_endpoint = parse_endpoint(
        cms.listen_endpoint
            .as_deref()
            .unwrap_or(DEFAULT_CMS_LISTEN_ENDPOINT),
        "cms.listen_endpoint",
    )?;

    let token = cms
        .token
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            LoadError::invalid(
                "cms.token",
                "an API token is required (set DIRETTA__CMS__TOKEN or cms.token)",
            )
        })?;

    Ok(CmsSettings {
        endpoint,
        listen_endpoint,
        token,
    })
}

fn build_feed_settings(feed: RawFeedSettings) -> Result<FeedSettings, LoadError> {
    let limit_value = feed.limit.unwrap_or(DEFAULT_FEED_LIMIT);
    let limit = NonZeroU32::new(limit_value)
        .ok_or_else(|| LoadError::invalid("feed.limit", "must be greater than zero"))?;

    let refresh_secs = feed
        .timestamp_refresh_seconds
        .unwrap_or(DEFAULT_TIMESTAMP_REFRESH_SECS);
    if refresh_secs == 0 {
        return Err(LoadError::invalid(
            "feed.timestamp_refresh_seconds",
            "must be greater than zero",
        ));
    }

    Ok(FeedSettings {
        limit,
        timestamp_refresh: Duration::from_secs(refresh_secs),
        transition_ms: feed.transition_ms.unwrap_or(DEFAULT_TRANSITION_MS),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    public_port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCmsSettings {
    endpoint: Option<String>,
    listen_endpoint: Option<String>,
    token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFeedSettings {
    limit: Option<u32>,
    timestamp_refresh_seconds: Option<u64>,
    transition_ms: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn parse_endpoint(value: &str, key: &'static str) -> Result<Url, LoadError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LoadError::invalid(key, "endpoint must not be empty"));
    }
    Url::parse(trimmed).map_err(|err| LoadError::invalid(key, format!("invalid URL: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_with_token() -> RawSettings {
        let mut raw = RawSettings::default();
        raw.cms.token = Some("demo-token".to_string());
        raw
    }

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = raw_with_token();
        raw.server.public_port = Some(4000);
        raw.logging.level = Some("info".to_string());

        let overrides = ServeOverrides {
            public_port: Some(4321),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.server.public_addr.port(), 4321);
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    }

    #[test]
    fn missing_token_is_a_startup_error() {
        let raw = RawSettings::default();
        let error = Settings::from_raw(raw).expect_err("token is required");
        assert!(matches!(
            error,
            LoadError::Invalid {
                key: "cms.token",
                ..
            }
        ));
    }

    #[test]
    fn feed_limit_defaults_to_ten() {
        let settings = Settings::from_raw(raw_with_token()).expect("valid settings");
        assert_eq!(settings.feed.limit.get(), 10);
        assert_eq!(settings.feed.timestamp_refresh, Duration::from_secs(30));
        assert_eq!(settings.feed.transition_ms, 1200);
    }

    #[test]
    fn zero_feed_limit_is_rejected() {
        let mut raw = raw_with_token();
        raw.feed.limit = Some(0);
        let error = Settings::from_raw(raw).expect_err("zero limit rejected");
        assert!(matches!(
            error,
            LoadError::Invalid {
                key: "feed.limit",
                ..
            }
        ));
    }

    #[test]
    fn invalid_cms_endpoint_is_rejected() {
        let mut raw = raw_with_token();
        raw.cms.endpoint = Some("not a url".to_string());
        let error = Settings::from_raw(raw).expect_err("invalid endpoint rejected");
        assert!(matches!(
            error,
            LoadError::Invalid {
                key: "cms.endpoint",
                ..
            }
        ));
    }

    #[test]
    fn cli_json_logging_enforces_format() {
        let mut raw = raw_with_token();
        let overrides = ServeOverrides {
            log_json: Some(true),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert!(matches!(settings.logging.format, LogFormat::Json));
    }

    #[test]
    fn default_to_serve_command() {
        let args = CliArgs::parse_from(["diretta"]);
        let command = args
            .command
            .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
        assert!(matches!(command, Command::Serve(_)));
    }

    #[test]
    fn parse_serve_overrides() {
        let args = CliArgs::parse_from([
            "diretta",
            "serve",
            "--server-host",
            "0.0.0.0",
            "--cms-endpoint",
            "https://graphql.example.com/",
            "--feed-limit",
            "5",
        ]);

        match args.command.expect("serve command") {
            Command::Serve(serve) => {
                assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
                assert_eq!(
                    serve.overrides.cms_endpoint.as_deref(),
                    Some("https://graphql.example.com/")
                );
                assert_eq!(serve.overrides.feed_limit, Some(5));
            }
        }
    }
}
