//! Configuration management for nozzle.
//!
//! This module provides configuration handling with:
//! - YAML file support
//! - Environment variable and CLI overrides (applied by the CLI)
//! - Validation and defaults

use crate::core::types::StreamKey;
use crate::core::{NozzleError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Complete configuration for nozzle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upstream firehose and ingest buffer
    pub firehose: FirehoseConfig,
    /// Harvest cycle
    pub harvest: HarvestConfig,
    /// Capacity accumulator
    pub capacity: CapacityConfig,
    /// Log message filters
    pub logmessage: LogMessageConfig,
    /// Event type labels used for export tagging
    pub event_types: EventTypeConfig,
    /// Entity attribute naming
    pub attributes: AttributeConfig,
    /// This agent's identity
    pub agent: AgentConfig,
    /// Default export credentials
    pub export: ExportConfig,
    /// Health endpoint
    pub health: HealthConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Debug mode
    #[serde(skip)]
    pub debug: bool,
}

/// Firehose configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FirehoseConfig {
    /// Subscription (shard) identifier, exported as `agent.subscription`
    pub subscription_id: String,
    /// `host:port` of the envelope stream
    pub upstream_address: String,
    /// Ingest buffer capacity in envelopes
    pub buffer_capacity: usize,
    /// Seconds of upstream silence before the connection is restarted
    pub restart_threshold_secs: u64,
    /// Enabled envelope types, `|` or `,` separated
    pub enabled_envelope_types: String,
}

/// Harvest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Interval between drain-and-export passes
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

/// Capacity accumulator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityConfig {
    pub enabled: bool,
    /// Minutes without an update before a cell's capacity state is evicted
    pub entity_age_mins: u64,
}

/// Include/exclude filters for log messages
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogMessageConfig {
    /// Exact source types to include
    pub source_include: Vec<String>,
    /// Exact source types to exclude
    pub source_exclude: Vec<String>,
    /// Message substrings to include
    pub message_include: Vec<String>,
    /// Message substrings to exclude
    pub message_exclude: Vec<String>,
}

/// Export event type labels
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventTypeConfig {
    pub container: String,
    pub value: String,
    pub counter: String,
    pub log: String,
    pub http: String,
    pub capacity: String,
}

/// Entity attribute naming
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeConfig {
    /// Prefix for platform attributes, e.g. `pcf.origin`
    pub prefix: String,
    /// Platform system domain
    pub domain: String,
    /// Additional unprefixed attribute name carrying the domain
    pub domain_alias: String,
}

/// Agent identity attributes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub instance_index: i64,
    pub ip: String,
}

/// Default export credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub insert_key: String,
    pub account_id: String,
    pub region: String,
}

/// Health endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub enabled: bool,
    pub port: u16,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
}

/// Log levels
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            firehose: FirehoseConfig::default(),
            harvest: HarvestConfig::default(),
            capacity: CapacityConfig::default(),
            logmessage: LogMessageConfig::default(),
            event_types: EventTypeConfig::default(),
            attributes: AttributeConfig::default(),
            agent: AgentConfig::default(),
            export: ExportConfig::default(),
            health: HealthConfig::default(),
            logging: LoggingConfig::default(),
            debug: false,
        }
    }
}

impl Default for FirehoseConfig {
    fn default() -> Self {
        FirehoseConfig {
            subscription_id: "newrelic-firehose".to_string(),
            upstream_address: "127.0.0.1:8082".to_string(),
            buffer_capacity: 8192,
            restart_threshold_secs: 15,
            enabled_envelope_types: "ContainerMetric|CounterEvent|HttpStartStop|LogMessage|ValueMetric"
                .to_string(),
        }
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        HarvestConfig {
            interval: Duration::from_secs(59),
        }
    }
}

impl Default for CapacityConfig {
    fn default() -> Self {
        CapacityConfig {
            enabled: true,
            entity_age_mins: 5,
        }
    }
}

impl Default for EventTypeConfig {
    fn default() -> Self {
        EventTypeConfig {
            container: "PCFContainerMetric".to_string(),
            value: "PCFValueMetric".to_string(),
            counter: "PCFCounterEvent".to_string(),
            log: "PCFLogMessage".to_string(),
            http: "PCFHttpStartStop".to_string(),
            capacity: "PCFCapacity".to_string(),
        }
    }
}

impl Default for AttributeConfig {
    fn default() -> Self {
        AttributeConfig {
            prefix: "pcf".to_string(),
            domain: String::new(),
            domain_alias: "bosh.domain".to_string(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            insert_key: String::new(),
            account_id: String::new(),
            region: "US".to_string(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        HealthConfig {
            enabled: true,
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.firehose.buffer_capacity == 0 {
            return Err(NozzleError::config("buffer_capacity must be greater than 0"));
        }

        if self.firehose.restart_threshold_secs == 0 {
            return Err(NozzleError::config("restart_threshold_secs must be greater than 0"));
        }

        if self.harvest.interval.is_zero() {
            return Err(NozzleError::config("harvest interval must be greater than 0"));
        }

        if self.capacity.entity_age_mins == 0 {
            return Err(NozzleError::config("entity_age_mins must be greater than 0"));
        }

        if self.enabled_streams()?.is_empty() {
            return Err(NozzleError::config("at least one envelope type must be enabled"));
        }

        Ok(())
    }

    /// Parse the enabled envelope types into routing keys.
    pub fn enabled_streams(&self) -> Result<BTreeSet<StreamKey>> {
        self.firehose
            .enabled_envelope_types
            .split(|c| c == '|' || c == ',')
            .filter(|name| !name.trim().is_empty())
            .map(StreamKey::from_config_name)
            .collect()
    }

    /// Entity age after which capacity state is evicted.
    pub fn capacity_entity_age(&self) -> Duration {
        Duration::from_secs(self.capacity.entity_age_mins.saturating_mul(60))
    }

    /// Prefixed platform attribute name, e.g. `pcf.origin`.
    pub fn attribute_name(&self, name: &str) -> String {
        if self.attributes.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.attributes.prefix, name)
        }
    }
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Configuration builder for programmatic construction
pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
        }
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)
            .map_err(|e| NozzleError::config(format!("Failed to parse YAML config: {}", e)))?;
        Ok(self)
    }

    /// Set the subscription identifier
    pub fn subscription_id(mut self, id: impl Into<String>) -> Self {
        self.config.firehose.subscription_id = id.into();
        self
    }

    /// Set the default insert key
    pub fn insert_key(mut self, key: impl Into<String>) -> Self {
        self.config.export.insert_key = key.into();
        self
    }

    /// Set the default account id
    pub fn account_id(mut self, id: impl Into<String>) -> Self {
        self.config.export.account_id = id.into();
        self
    }

    /// Set the upstream address
    pub fn upstream_address(mut self, address: impl Into<String>) -> Self {
        self.config.firehose.upstream_address = address.into();
        self
    }

    /// Set the ingest buffer capacity
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.firehose.buffer_capacity = capacity;
        self
    }

    /// Set the stall restart threshold
    pub fn restart_threshold_secs(mut self, secs: u64) -> Self {
        self.config.firehose.restart_threshold_secs = secs;
        self
    }

    /// Set the enabled envelope types
    pub fn enabled_envelope_types(mut self, types: impl Into<String>) -> Self {
        self.config.firehose.enabled_envelope_types = types.into();
        self
    }

    /// Set the harvest interval
    pub fn harvest_interval(mut self, interval: Duration) -> Self {
        self.config.harvest.interval = interval;
        self
    }

    /// Set the health port
    pub fn health_port(mut self, port: u16) -> Self {
        self.config.health.port = port;
        self
    }

    /// Set debug mode
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
