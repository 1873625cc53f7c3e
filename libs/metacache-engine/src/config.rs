use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::EngineError;

/// Root configuration. Every field has a default, so an empty file is valid.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetacacheConfig {
    /// HTTP API port.
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Upstream log settings.
    #[serde(default)]
    pub kafka: KafkaConfig,
}

fn default_api_port() -> u16 {
    8084
}

impl Default for MetacacheConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            kafka: KafkaConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KafkaConfig {
    #[serde(default = "default_brokers")]
    pub brokers: Vec<String>,
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Fetch long-poll wait.
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: i32,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_brokers() -> Vec<String> {
    vec!["localhost:9092".to_string()]
}
fn default_topic() -> String {
    "metadata".to_string()
}
fn default_max_wait_ms() -> i32 {
    500
}
fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: default_brokers(),
            topic: default_topic(),
            max_wait_ms: default_max_wait_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl KafkaConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// A config file format, chosen by file extension.
pub trait ConfigParser: Send + Sync {
    fn extensions(&self) -> &[&str];

    fn parse(&self, content: &str) -> Result<MetacacheConfig, EngineError>;
}

/// Built-in TOML format.
pub struct TomlParser;

impl ConfigParser for TomlParser {
    fn extensions(&self) -> &[&str] {
        &["toml"]
    }

    fn parse(&self, content: &str) -> Result<MetacacheConfig, EngineError> {
        MetacacheConfig::parse(content)
    }
}

impl MetacacheConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, EngineError> {
        let parsers: [&dyn ConfigParser; 1] = [&TomlParser];
        Self::load_with(path, &parsers)
    }

    /// Load configuration, picking the parser that claims the file extension.
    pub fn load_with(path: &str, parsers: &[&dyn ConfigParser]) -> Result<Self, EngineError> {
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let parser = parsers
            .iter()
            .find(|p| p.extensions().contains(&ext))
            .ok_or_else(|| EngineError::Config(format!("{path}: unsupported config format '{ext}'")))?;

        let content =
            std::fs::read_to_string(path).map_err(|e| EngineError::Config(format!("{path}: {e}")))?;
        parser.parse(&content).map_err(|e| e.with_context(path))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, EngineError> {
        toml::from_str(toml_str).map_err(|e| EngineError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = MetacacheConfig::parse("").unwrap();
        assert_eq!(config, MetacacheConfig::default());
        assert_eq!(config.api_port, 8084);
        assert_eq!(config.kafka.brokers, vec!["localhost:9092".to_string()]);
        assert_eq!(config.kafka.topic, "metadata");
    }

    #[test]
    fn parses_partial_kafka_section() {
        let config = MetacacheConfig::parse(
            r#"
            api_port = 9000

            [kafka]
            brokers = ["kafka-1:9092", "kafka-2:9092"]
            "#,
        )
        .unwrap();
        assert_eq!(config.api_port, 9000);
        assert_eq!(config.kafka.brokers.len(), 2);
        assert_eq!(config.kafka.topic, "metadata");
        assert_eq!(config.kafka.connect_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            MetacacheConfig::parse("api_port = \"high\""),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn unknown_extension_is_config_error() {
        let err = MetacacheConfig::load("metacache.yaml").unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }

    #[test]
    fn missing_file_is_config_error_with_path() {
        let path = std::env::temp_dir().join(format!("metacache-absent-{}.toml", std::process::id()));
        let path = path.to_str().unwrap();
        let err = MetacacheConfig::load(path).unwrap_err();
        assert!(matches!(err, EngineError::Config(ref msg) if msg.starts_with(path)));
    }

    #[test]
    fn parse_error_carries_file_context() {
        let err = EngineError::Config("bad value".to_string()).with_context("metacache.toml");
        assert_eq!(err.to_string(), "config error: metacache.toml: bad value");
    }

    #[test]
    fn loads_toml_file() {
        let path = std::env::temp_dir().join(format!("metacache-config-{}.toml", std::process::id()));
        std::fs::write(&path, "[kafka]\ntopic = \"users\"\n").unwrap();
        let config = MetacacheConfig::load(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.kafka.topic, "users");
    }
}
