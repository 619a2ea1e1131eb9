//! # relay-telemetry
//!
//! Structured logging for the relay.
//!
//! Components only ever log through `tracing` macros; which subscriber
//! receives those events is decided by the caller. The binary installs a
//! global one via [`init_telemetry`]; tests install a scoped subscriber with
//! a [`CaptureLayer`] and inspect the [`LogBuffer`].

#![deny(unsafe_code)]

mod capture;

pub use capture::{CaptureLayer, CapturedEvent, LogBuffer};

use std::fmt;
use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Stdout log format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, multi-field lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(TelemetryError::UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => f.write_str("pretty"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// Telemetry initialisation errors.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// `logging.format` was neither `pretty` nor `json`.
    #[error("unknown log format: {0}")]
    UnknownFormat(String),
    /// A global subscriber was already installed.
    #[error("failed to install subscriber: {0}")]
    Init(String),
}

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default filter directive (e.g. `info`, `relay_server=debug`). `RUST_LOG` wins.
    pub level: String,
    /// Stdout format.
    pub format: LogFormat,
    /// Number of warn+ events kept in memory.
    pub capture_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO.to_string().to_lowercase(),
            format: LogFormat::Pretty,
            capture_capacity: 256,
        }
    }
}

/// Handle to the installed telemetry.
pub struct TelemetryGuard {
    logs: LogBuffer,
}

impl TelemetryGuard {
    /// Recently captured warn+ events.
    pub fn logs(&self) -> &LogBuffer {
        &self.logs
    }
}

/// Install the global subscriber. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let fmt_layer = match config.format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(true)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .boxed(),
    };

    let logs = LogBuffer::new(config.capture_capacity);

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(env_filter))
        .with(CaptureLayer::new(logs.clone()))
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))?;

    Ok(TelemetryGuard { logs })
}
