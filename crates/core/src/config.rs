use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;

use crate::types::LogLevel;

/// Root pipeline configuration. Loaded from an optional TOML file named by
/// `LOGSTREAM_CONFIG`, overridden by environment variables with the prefix
/// `LOGSTREAM__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub profile: Profile,
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub flush: FlushConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub alerting: AlertingConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    /// Explicit sinks. When empty the profile defaults apply.
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

/// Deployment profile; selects the default sink set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    #[default]
    Development,
    Production,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BufferConfig {
    /// Hard capacity; exceeding it discards the oldest entries.
    #[serde(default = "default_buffer_capacity")]
    pub capacity: usize,
    /// Number of most recent entries kept after an overflow.
    #[serde(default = "default_buffer_retain")]
    pub retain: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlushConfig {
    #[serde(default = "default_flush_interval_ms")]
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_recent_errors_cap")]
    pub recent_errors_cap: usize,
    #[serde(default = "default_recent_errors_retain")]
    pub recent_errors_retain: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertingConfig {
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default)]
    pub email_gateway_url: Option<String>,
    #[serde(default)]
    pub sms_gateway_url: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Analytics window parameters. All durations are in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_bucket_count")]
    pub bucket_count: usize,
    #[serde(default = "default_hot_issue_limit")]
    pub hot_issue_limit: usize,
    #[serde(default = "default_login_marker")]
    pub login_marker: String,
}

// ─── Sinks ──────────────────────────────────────────────────────────────

/// A configured delivery destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_min_level")]
    pub min_level: LogLevel,
    #[serde(flatten)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputConfig {
    Console(ConsoleOutput),
    File(FileOutput),
    SearchIndex(SearchIndexOutput),
    Aggregator(AggregatorOutput),
    Webhook(WebhookOutput),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    Console,
    File,
    SearchIndex,
    Aggregator,
    Webhook,
}

impl SinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SinkKind::Console => "console",
            SinkKind::File => "file",
            SinkKind::SearchIndex => "search_index",
            SinkKind::Aggregator => "aggregator",
            SinkKind::Webhook => "webhook",
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl OutputConfig {
    pub fn kind(&self) -> SinkKind {
        match self {
            OutputConfig::Console(_) => SinkKind::Console,
            OutputConfig::File(_) => SinkKind::File,
            OutputConfig::SearchIndex(_) => SinkKind::SearchIndex,
            OutputConfig::Aggregator(_) => SinkKind::Aggregator,
            OutputConfig::Webhook(_) => SinkKind::Webhook,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleOutput {
    #[serde(default = "default_true")]
    pub colorize: bool,
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    #[default]
    Json,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileOutput {
    #[serde(default = "default_log_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub format: FileFormat,
    #[serde(default = "default_max_file_size")]
    pub max_size_bytes: u64,
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchIndexOutput {
    pub url: String,
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_request_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatorOutput {
    pub url: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookOutput {
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_request_timeout_ms")]
    pub timeout_ms: u64,
}

impl SinkConfig {
    pub fn new(output: OutputConfig, min_level: LogLevel) -> Self {
        Self {
            enabled: true,
            min_level,
            output,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn kind(&self) -> SinkKind {
        self.output.kind()
    }

    /// Default sink set for a deployment profile.
    pub fn defaults_for(profile: Profile) -> Vec<SinkConfig> {
        match profile {
            Profile::Development => vec![SinkConfig::new(
                OutputConfig::Console(ConsoleOutput {
                    colorize: true,
                    json: false,
                }),
                LogLevel::Debug,
            )],
            Profile::Production => vec![
                SinkConfig::new(
                    OutputConfig::Console(ConsoleOutput {
                        colorize: false,
                        json: true,
                    }),
                    LogLevel::Warn,
                ),
                SinkConfig::new(
                    OutputConfig::File(FileOutput {
                        path: default_log_path(),
                        format: FileFormat::Json,
                        max_size_bytes: default_max_file_size(),
                        max_files: default_max_files(),
                    }),
                    LogLevel::Info,
                ),
            ],
        }
    }
}

// Default functions
fn default_service_name() -> String {
    "logstream".to_string()
}
fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
fn default_buffer_capacity() -> usize {
    10_000
}
fn default_buffer_retain() -> usize {
    5_000
}
fn default_flush_interval_ms() -> u64 {
    1000
}
fn default_recent_errors_cap() -> usize {
    100
}
fn default_recent_errors_retain() -> usize {
    50
}
fn default_cooldown_secs() -> u64 {
    300
}
fn default_request_timeout_ms() -> u64 {
    5000
}
fn default_window_secs() -> u64 {
    3600
}
fn default_bucket_count() -> usize {
    12
}
fn default_hot_issue_limit() -> usize {
    10
}
fn default_login_marker() -> String {
    "login".to_string()
}
fn default_true() -> bool {
    true
}
fn default_min_level() -> LogLevel {
    LogLevel::Info
}
fn default_log_path() -> PathBuf {
    PathBuf::from("logs/app.log")
}
fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}
fn default_max_files() -> usize {
    5
}
fn default_index() -> String {
    "logs".to_string()
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: default_buffer_capacity(),
            retain: default_buffer_retain(),
        }
    }
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_flush_interval_ms(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            recent_errors_cap: default_recent_errors_cap(),
            recent_errors_retain: default_recent_errors_retain(),
        }
    }
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
            email_gateway_url: None,
            sms_gateway_url: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            bucket_count: default_bucket_count(),
            hot_issue_limit: default_hot_issue_limit(),
            login_marker: default_login_marker(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            version: default_version(),
            profile: Profile::default(),
            buffer: BufferConfig::default(),
            flush: FlushConfig::default(),
            metrics: MetricsConfig::default(),
            alerting: AlertingConfig::default(),
            analytics: AnalyticsConfig::default(),
            sinks: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional config file and the environment.
    pub fn load() -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        if let Ok(path) = std::env::var("LOGSTREAM_CONFIG") {
            builder = builder.add_source(config::File::with_name(&path).required(false));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("LOGSTREAM")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(","),
            )
            .build()?;
        config.try_deserialize()
    }

    /// Parse configuration from a TOML document.
    pub fn from_toml(source: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    /// The configured sinks, or the profile defaults when none are given.
    pub fn effective_sinks(&self) -> Vec<SinkConfig> {
        if self.sinks.is_empty() {
            SinkConfig::defaults_for(self.profile)
        } else {
            self.sinks.clone()
        }
    }
}
