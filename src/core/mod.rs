//! Core domain types for nozzle.
//!
//! Envelopes, configuration, errors, identity strings and the shared
//! application context that every accumulator is built from.

pub mod config;
pub mod context;
pub mod error;
pub mod retry;
pub mod types;
pub mod uid;

pub use config::{Config, ConfigBuilder};
pub use context::AppContext;
pub use error::{NozzleError, Result};
pub use types::{Envelope, Message, StreamKey};
pub use uid::Uid;
