//! Command-line interface for nozzle.
//!
//! Every flag can also be set through a `NOZZLE_*` environment variable.
//! Values given either way override the YAML config file.

use crate::application::Application;
use crate::core::config::ConfigBuilder;
use crate::core::{Config, NozzleError, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Lossy aggregation nozzle for platform firehose telemetry.
#[derive(Parser, Debug, Default)]
#[command(name = "nozzle")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (default: ~/.config/nozzle/config.yaml)
    #[arg(short, long, env = "NOZZLE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Upstream envelope stream, host:port
    #[arg(long, env = "NOZZLE_UPSTREAM")]
    pub upstream: Option<String>,

    /// Subscription identifier exported with every event
    #[arg(long, env = "NOZZLE_SUBSCRIPTION_ID")]
    pub subscription_id: Option<String>,

    /// Ingest buffer capacity in envelopes
    #[arg(long, env = "NOZZLE_BUFFER_CAPACITY")]
    pub buffer_capacity: Option<usize>,

    /// Seconds of upstream silence before reconnecting
    #[arg(long, env = "NOZZLE_RESTART_THRESHOLD")]
    pub restart_threshold: Option<u64>,

    /// Seconds between harvests
    #[arg(long, env = "NOZZLE_HARVEST_INTERVAL")]
    pub harvest_interval: Option<u64>,

    /// Enabled envelope types, e.g. "ValueMetric|CounterEvent"
    #[arg(long, env = "NOZZLE_ENABLED_ENVELOPE_TYPES")]
    pub envelope_types: Option<String>,

    /// Health endpoint port
    #[arg(long, env = "NOZZLE_HEALTH_PORT")]
    pub health_port: Option<u16>,

    /// Default export insert key
    #[arg(long, env = "NOZZLE_INSERT_KEY", hide_env_values = true)]
    pub insert_key: Option<String>,

    /// Default export account id
    #[arg(long, env = "NOZZLE_ACCOUNT_ID")]
    pub account_id: Option<String>,

    /// Log level or filter directive, e.g. "warn" or "nozzle_lib=debug"
    #[arg(long, env = "NOZZLE_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Enable debug logging
    #[arg(short, long, env = "NOZZLE_DEBUG")]
    pub debug: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub check_config: bool,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Default config file location.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("nozzle").join("config.yaml"))
    }

    /// Load configuration with proper precedence:
    /// 1. CLI arguments and environment variables
    /// 2. Config file
    /// 3. Defaults
    pub async fn load_config(&self) -> Result<Config> {
        let mut builder = ConfigBuilder::new();

        let config_path = match &self.config {
            Some(path) => Some(path.clone()),
            None => Self::default_config_path().filter(|path| path.exists()),
        };

        if let Some(path) = config_path {
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => {
                    builder = builder.from_yaml(&content)?;
                    tracing::info!("Loaded configuration from: {:?}", path);
                },
                Err(e) if self.config.is_some() => {
                    return Err(NozzleError::config(format!("Failed to read config file {:?}: {}", path, e)));
                },
                Err(_) => {
                    tracing::debug!("No config file found at {:?}, using defaults", path);
                },
            }
        }

        self.apply_overrides(builder).build()
    }

    fn apply_overrides(&self, mut builder: ConfigBuilder) -> ConfigBuilder {
        if let Some(upstream) = &self.upstream {
            builder = builder.upstream_address(upstream);
        }
        if let Some(id) = &self.subscription_id {
            builder = builder.subscription_id(id);
        }
        if let Some(capacity) = self.buffer_capacity {
            builder = builder.buffer_capacity(capacity);
        }
        if let Some(secs) = self.restart_threshold {
            builder = builder.restart_threshold_secs(secs);
        }
        if let Some(secs) = self.harvest_interval {
            builder = builder.harvest_interval(Duration::from_secs(secs));
        }
        if let Some(types) = &self.envelope_types {
            builder = builder.enabled_envelope_types(types);
        }
        if let Some(port) = self.health_port {
            builder = builder.health_port(port);
        }
        if let Some(key) = &self.insert_key {
            builder = builder.insert_key(key);
        }
        if let Some(id) = &self.account_id {
            builder = builder.account_id(id);
        }
        builder.debug(self.debug)
    }

    /// Filter directive used when `RUST_LOG` is unset: `--debug`, then
    /// `--log-level`, then the configured level.
    pub fn log_filter(&self, config: &Config) -> String {
        if self.debug {
            return "debug".to_string();
        }
        self.log_level
            .clone()
            .unwrap_or_else(|| config.logging.level.as_str().to_string())
    }

    /// Install the global subscriber.
    pub fn init_logging(&self, config: &Config) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let level = self.log_filter(config);
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(self.debug)
                    .compact(),
            )
            .try_init()
            .map_err(|e| NozzleError::config(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }
}

/// Execute the nozzle.
pub async fn execute(cli: Cli) -> Result<()> {
    let config = cli.load_config().await?;
    cli.init_logging(&config)?;

    if cli.check_config {
        println!("Configuration is valid!");
        println!("  Upstream: {}", config.firehose.upstream_address);
        println!("  Subscription: {}", config.firehose.subscription_id);
        println!("  Envelope types: {}", config.firehose.enabled_envelope_types);
        println!("  Buffer capacity: {}", config.firehose.buffer_capacity);
        println!("  Harvest interval: {:?}", config.harvest.interval);
        return Ok(());
    }

    Application::new(config)?.run().await
}
