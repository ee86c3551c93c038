//! Configuration loading and validation for the self-check server

use selfcheck::{FailureHook, ReportFormat, SelfCheck};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError};

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV: &str = "SELFCHECK_CONFIG";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file {0} not found")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub checks: CheckSettings,

    #[serde(default)]
    pub alerting: AlertingSettings,

    #[serde(default)]
    pub metrics: MetricsSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

impl Validate for Config {
    fn validate(&self) -> Result<(), validator::ValidationErrors> {
        self.server.validate()?;
        self.checks.validate()?;
        self.alerting.validate()?;
        self.metrics.validate()?;
        Ok(())
    }
}

/// Listener and routing settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServerSettings {
    #[validate(custom = "validate_listen_addr")]
    pub listen_addr: String,

    #[validate(custom = "validate_route_path")]
    pub health_path: String,
}

/// Checks source, probe timeout and report format
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_checks_source"))]
pub struct CheckSettings {
    /// Path to the checks file
    pub file: Option<PathBuf>,

    /// Checks text, used instead of a file
    pub inline: Option<String>,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_timeout")]
    pub timeout: Duration,

    pub format: ReportFormat,

    pub user_agent: Option<String>,
}

/// Failure alerting settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AlertingSettings {
    /// Webhook receiving failure batches as JSON; failures are only logged when unset
    #[validate(url)]
    pub webhook_url: Option<String>,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_batch_delay")]
    pub batch_delay: Duration,

    #[validate(range(min = 1, max = 1000))]
    pub max_batch: usize,

    #[validate(range(min = 1, max = 100000))]
    pub channel_size: usize,
}

/// Prometheus endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MetricsSettings {
    pub enabled: bool,

    #[validate(custom = "validate_route_path")]
    pub path: String,
}

/// Logging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: Option<String>,
    pub format: Option<String>,
}

/// OpenTelemetry export settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    pub enabled: bool,
    pub service_name: String,
    pub otlp_endpoint: String,
}

// Default implementations

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            health_path: "/healthcheck".to_string(),
        }
    }
}

impl Default for CheckSettings {
    fn default() -> Self {
        Self {
            file: Some(PathBuf::from("healthchecks.txt")),
            inline: None,
            timeout: selfcheck::engine::DEFAULT_TIMEOUT,
            format: ReportFormat::Html,
            user_agent: None,
        }
    }
}

impl Default for AlertingSettings {
    fn default() -> Self {
        Self {
            webhook_url: None,
            batch_delay: Duration::from_secs(1),
            max_batch: 20,
            channel_size: 100,
        }
    }
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/metrics".to_string(),
        }
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: "selfcheck-server".to_string(),
            otlp_endpoint: "http://localhost:4317".to_string(),
        }
    }
}

// Custom validators

fn validate_listen_addr(addr: &str) -> Result<(), ValidationError> {
    addr.trim()
        .parse::<SocketAddr>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("listen_addr_invalid"))
}

fn validate_route_path(path: &str) -> Result<(), ValidationError> {
    if !path.starts_with('/') || path.contains(char::is_whitespace) {
        return Err(ValidationError::new("route_path_invalid"));
    }
    Ok(())
}

fn validate_timeout(timeout: &Duration) -> Result<(), ValidationError> {
    let millis = timeout.as_millis();
    if millis < 1 || millis > 60_000 {
        return Err(ValidationError::new("timeout_out_of_range"));
    }
    Ok(())
}

fn validate_batch_delay(delay: &Duration) -> Result<(), ValidationError> {
    let millis = delay.as_millis();
    if millis < 1 || millis > 60_000 {
        return Err(ValidationError::new("batch_delay_out_of_range"));
    }
    Ok(())
}

fn validate_checks_source(checks: &CheckSettings) -> Result<(), ValidationError> {
    match (&checks.file, &checks.inline) {
        (None, None) => Err(ValidationError::new("checks_source_missing")),
        (Some(_), Some(_)) => Err(ValidationError::new("checks_source_ambiguous")),
        _ => Ok(()),
    }
}

// Configuration loading implementation

impl Config {
    /// Load configuration from `$SELFCHECK_CONFIG` or the default search paths
    pub fn load() -> Result<Self, ConfigError> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            let path = PathBuf::from(path);
            if !path.is_file() {
                return Err(ConfigError::FileNotFound(path));
            }
            tracing::info!("Loading configuration from: {}", path.display());
            return Self::load_from_file(&path);
        }

        match Self::find_config_file() {
            Some(path) => {
                tracing::info!("Loading configuration from: {}", path.display());
                Self::load_from_file(&path)
            }
            None => {
                tracing::info!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate YAML
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/selfcheck/selfcheck.yaml")];

        if let Some(home_path) = Self::home_config_path() {
            paths.push(home_path);
        }

        paths.push(PathBuf::from("./selfcheck.yaml"));

        paths.into_iter().find(|p: &PathBuf| p.exists() && p.is_file())
    }

    /// Get home directory config path
    fn home_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/selfcheck/selfcheck.yaml"))
    }

    /// Listen address, validated at load time
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server.listen_addr.trim().parse().map_err(|_| {
            let mut errors = validator::ValidationErrors::new();
            errors.add("listen_addr", ValidationError::new("listen_addr_invalid"));
            ConfigError::ValidationError(errors)
        })
    }

    /// Build the engine, loading the checks source
    pub fn build_engine(&self, on_failure: Arc<dyn FailureHook>) -> common::Result<SelfCheck> {
        let mut builder = SelfCheck::builder()
            .timeout(self.checks.timeout)
            .format(self.checks.format)
            .on_failure_arc(on_failure);

        if let Some(file) = &self.checks.file {
            builder = builder.checks_file(file);
        }
        if let Some(inline) = &self.checks.inline {
            builder = builder.checks(inline.as_str());
        }
        if let Some(user_agent) = &self.checks.user_agent {
            builder = builder.user_agent(user_agent.as_str());
        }

        Ok(builder.build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use selfcheck::NoopHook;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.checks.timeout, Duration::from_secs(3));
        assert_eq!(config.checks.format, ReportFormat::Html);
    }

    #[test]
    fn test_valid_yaml_parsing() {
        let yaml = r#"
server:
  listen_addr: "0.0.0.0:9000"
  health_path: "/_health"

checks:
  file: "/etc/selfcheck/checks.txt"
  timeout: 1500ms
  format: json

alerting:
  webhook_url: "https://alerts.example.com/hooks/selfcheck"
  batch_delay: 250ms
  max_batch: 5

metrics:
  enabled: false
"#;

        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.server.health_path, "/_health");
        assert_eq!(config.listen_addr().unwrap(), "0.0.0.0:9000".parse().unwrap());
        assert_eq!(config.checks.timeout, Duration::from_millis(1500));
        assert_eq!(config.checks.format, ReportFormat::Json);
        assert_eq!(config.alerting.max_batch, 5);
        assert!(!config.metrics.enabled);
        // untouched sections keep their defaults
        assert_eq!(config.alerting.channel_size, 100);
        assert_eq!(config.metrics.path, "/metrics");
    }

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let config = Config::from_yaml("logging:\n  level: debug\n").unwrap();
        assert_eq!(config.server.listen_addr, "127.0.0.1:8080");
        assert_eq!(config.checks.file, Some(PathBuf::from("healthchecks.txt")));
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_missing_checks_source_is_rejected() {
        let yaml = r#"
checks:
  file: null
"#;
        assert!(matches!(
            Config::from_yaml(yaml),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_both_checks_sources_are_rejected() {
        let yaml = r#"
checks:
  file: "checks.txt"
  inline: "/status"
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_invalid_timeout() {
        assert!(Config::from_yaml("checks:\n  timeout: 0ms\n").is_err());
        assert!(Config::from_yaml("checks:\n  timeout: 2m\n").is_err());
    }

    #[test]
    fn test_invalid_format() {
        assert!(matches!(
            Config::from_yaml("checks:\n  format: xml\n"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_invalid_webhook_url() {
        assert!(Config::from_yaml("alerting:\n  webhook_url: \"not a url\"\n").is_err());
    }

    #[test]
    fn test_invalid_batch_size() {
        assert!(Config::from_yaml("alerting:\n  max_batch: 0\n").is_err());
        assert!(Config::from_yaml("alerting:\n  max_batch: 5000\n").is_err());
    }

    #[test]
    fn test_route_path_validation() {
        assert!(validate_route_path("/healthcheck").is_ok());
        assert!(validate_route_path("healthcheck").is_err());
        assert!(validate_route_path("/health check").is_err());
    }

    #[test]
    fn test_listen_addr_validation() {
        assert!(validate_listen_addr("127.0.0.1:8080").is_ok());
        assert!(validate_listen_addr("[::]:80").is_ok());
        assert!(validate_listen_addr("localhost").is_err());
    }

    #[test]
    fn test_build_engine_from_inline_checks() {
        let yaml = r#"
checks:
  file: null
  inline: |
    /status 200 OK
    /ping pong
  timeout: 2s
"#;
        let config = Config::from_yaml(yaml).unwrap();
        let engine = config.build_engine(Arc::new(NoopHook)).unwrap();

        assert_eq!(engine.registry().len(), 2);
        assert_eq!(engine.timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_build_engine_missing_file_fails() {
        let yaml = r#"
checks:
  file: "/nonexistent/selfcheck/checks.txt"
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert!(matches!(
            config.build_engine(Arc::new(NoopHook)),
            Err(common::Error::Checks(_))
        ));
    }

    #[test]
    fn test_build_engine_invalid_checks_line_fails() {
        let yaml = r#"
checks:
  file: null
  inline: "gopher://old.example/"
"#;
        let config = Config::from_yaml(yaml).unwrap();
        let err = config.build_engine(Arc::new(NoopHook)).unwrap_err();
        assert!(matches!(err, common::Error::Checks(_)));
        assert!(err.to_string().contains("gopher"));
    }
}
