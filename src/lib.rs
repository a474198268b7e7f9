//! nozzle - lossy near-real-time aggregation for platform firehose telemetry.
//!
//! Envelopes arrive from an upstream stream into a bounded ingest buffer that
//! drops the oldest entry when full. A single router classifies each envelope
//! and feeds the accumulators interested in its kind. On every harvest tick
//! the accumulators are drained and each aggregated metric is finalized and
//! exported with the credentials of the tenant it belongs to.
//!
//! # Architecture
//!
//! - `receiver`: upstream transport and the ingest buffer
//! - `router`: single-worker dispatch and stall detection
//! - `accumulators`: per-kind aggregation into entities and metrics
//! - `metrics`: attribute sets, metrics, entities and their registries
//! - `harvester`: periodic drain and export
//! - `export`: per-credential clients and event sinks
//! - `core`: configuration, errors, envelope model
//!
//! # Example
//!
//! ```no_run
//! use nozzle_lib::core::Config;
//! use nozzle_lib::Application;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let app = Application::new(config)?;
//!     app.run().await?;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod accumulators;
pub mod application;
pub mod cli;
pub mod core;
pub mod export;
pub mod harvester;
pub mod health;
pub mod metadata;
pub mod metrics;
pub mod receiver;
pub mod router;

pub use crate::application::Application;
pub use crate::core::{Config, Result};
