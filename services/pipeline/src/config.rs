use crate::store::Namespace;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "BLOG_CONFIG";

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration shared by the worker and the analytics service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Document store configuration
    pub mongo: MongoConfig,
    /// Queue configuration
    pub redis: RedisConfig,
    /// HTTP API configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// Ingestion worker configuration
    #[serde(default)]
    pub worker: WorkerConfig,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,
    /// Prometheus exporter port, disabled when unset
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

/// MongoDB configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    /// Connection URI
    pub uri: String,
    /// Database holding both collections
    #[serde(default = "default_database")]
    pub database: String,
    /// Collection new posts are written to
    #[serde(default = "default_posts_collection")]
    pub posts_collection: String,
    /// Collection view records are read from
    #[serde(default = "default_views_collection")]
    pub views_collection: String,
    /// Application name reported to the server
    #[serde(default)]
    pub app_name: Option<String>,
    /// Server selection / connect timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// Redis configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Connection URI
    pub uri: String,
    /// List key new posts are pushed to
    #[serde(default = "default_queue")]
    pub queue: String,
}

/// API configuration for the analytics endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins (empty = any)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Retry policy for queue failures in the ingestion worker
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Give up on the queue after failing for this long
    #[serde(default = "default_backoff_max_elapsed_secs")]
    pub backoff_max_elapsed_secs: u64,
    /// Longest single pop; shutdown is noticed between pops
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

// Default value functions
fn default_service_name() -> String {
    "blog".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_database() -> String {
    "blog".to_string()
}

fn default_posts_collection() -> String {
    "posts".to_string()
}

fn default_views_collection() -> String {
    "views".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_queue() -> String {
    "queue:new-post".to_string()
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8081
}

fn default_true() -> bool {
    true
}

fn default_backoff_initial_ms() -> u64 {
    100
}

fn default_backoff_max_ms() -> u64 {
    5_000
}

fn default_backoff_max_elapsed_secs() -> u64 {
    60
}

fn default_poll_timeout_secs() -> u64 {
    1
}

impl Config {
    /// Load configuration from config files and environment
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/blog").required(false))
            .add_source(config::File::with_name("/etc/blog/blog").required(false));

        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(config::File::with_name(&path).required(true));
        }

        // BLOG__MONGO__URI -> mongo.uri
        let builder = builder.add_source(
            config::Environment::with_prefix("BLOG")
                .separator("__")
                .try_parsing(true),
        );

        Self::finish(builder)
    }

    /// Parse configuration from an in-memory YAML document
    pub fn from_yaml(source: &str) -> Result<Self, ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Yaml));

        Self::finish(builder)
    }

    fn finish(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would only fail later at connect time
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("mongo.uri", &self.mongo.uri),
            ("mongo.database", &self.mongo.database),
            ("mongo.posts_collection", &self.mongo.posts_collection),
            ("mongo.views_collection", &self.mongo.views_collection),
            ("redis.uri", &self.redis.uri),
            ("redis.queue", &self.redis.queue),
        ];

        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{key} must not be empty")));
            }
        }

        // A zero timeout would make BLPOP block forever
        if self.worker.poll_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "worker.poll_timeout_secs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

impl MongoConfig {
    pub fn posts_namespace(&self) -> Namespace {
        Namespace::new(&self.database, &self.posts_collection)
    }

    pub fn views_namespace(&self) -> Namespace {
        Namespace::new(&self.database, &self.views_collection)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl WorkerConfig {
    pub fn backoff_initial(&self) -> Duration {
        Duration::from_millis(self.backoff_initial_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    pub fn backoff_max_elapsed(&self) -> Duration {
        Duration::from_secs(self.backoff_max_elapsed_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics_port: None,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            backoff_max_elapsed_secs: default_backoff_max_elapsed_secs(),
            poll_timeout_secs: default_poll_timeout_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
mongo:
  uri: mongodb://localhost:27017
redis:
  uri: redis://localhost:6379
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();

        assert_eq!(config.mongo.database, "blog");
        assert_eq!(config.mongo.posts_namespace().to_string(), "blog.posts");
        assert_eq!(config.mongo.views_namespace().to_string(), "blog.views");
        assert_eq!(config.redis.queue, "queue:new-post");
        assert_eq!(config.api.port, 8081);
        assert_eq!(config.service.log_format, LogFormat::Json);
        assert!(config.service.metrics_port.is_none());
        assert_eq!(config.worker.backoff_max_elapsed(), Duration::from_secs(60));
        assert_eq!(config.worker.poll_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_overrides_are_applied() {
        let yaml = r#"
service:
  name: db-worker
  log_format: pretty
  metrics_port: 9100
mongo:
  uri: mongodb://db:27017
  database: press
  views_collection: hits
redis:
  uri: redis://cache:6379
  queue: queue:posts
api:
  port: 9000
  cors_origins: ["http://localhost:3000"]
"#;
        let config = Config::from_yaml(yaml).unwrap();

        assert_eq!(config.service.name, "db-worker");
        assert_eq!(config.service.log_format, LogFormat::Pretty);
        assert_eq!(config.service.metrics_port, Some(9100));
        assert_eq!(config.mongo.views_namespace().to_string(), "press.hits");
        assert_eq!(config.redis.queue, "queue:posts");
        assert_eq!(config.api.port, 9000);
        assert_eq!(config.api.cors_origins.len(), 1);
    }

    #[test]
    fn test_missing_section_is_rejected() {
        let yaml = "mongo:\n  uri: mongodb://localhost:27017\n";
        assert!(matches!(Config::from_yaml(yaml), Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_empty_uri_is_rejected() {
        let yaml = "mongo:\n  uri: \"\"\nredis:\n  uri: redis://localhost\n";
        match Config::from_yaml(yaml) {
            Err(ConfigError::Invalid(msg)) => assert!(msg.contains("mongo.uri")),
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_poll_timeout_is_rejected() {
        let yaml = format!("{MINIMAL}worker:\n  poll_timeout_secs: 0\n");
        match Config::from_yaml(&yaml) {
            Err(ConfigError::Invalid(msg)) => assert!(msg.contains("poll_timeout_secs")),
            other => panic!("expected invalid config, got {other:?}"),
        }
    }
}
