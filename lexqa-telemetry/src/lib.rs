//! # lexqa-telemetry
//!
//! Logging setup shared by the lexqa binaries, plus [`SpanCapture`] for
//! asserting on pipeline spans in tests.
//!
//! ```rust,no_run
//! lexqa_telemetry::init_telemetry("lexqa").expect("telemetry");
//! tracing::info!("ready");
//! ```
//!
//! The filter comes from `RUST_LOG` and defaults to `info`. Output goes to
//! stderr so command output on stdout stays clean.

pub mod capture;

pub use capture::{CaptureLayer, CapturedSpan, SpanCapture};

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber was already installed.
    #[error("failed to initialize telemetry: {0}")]
    Init(String),
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install human-readable logging as the global subscriber.
///
/// # Errors
///
/// Returns [`TelemetryError::Init`] if a global subscriber is already set.
pub fn init_telemetry(service_name: &str) -> Result<(), TelemetryError> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))?;
    tracing::debug!(service.name = service_name, "telemetry initialized");
    Ok(())
}

/// Install JSON-lines logging as the global subscriber.
///
/// Each line carries the current span and its parents, which is what log
/// shippers expect.
pub fn init_json_telemetry(service_name: &str) -> Result<(), TelemetryError> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))?;
    tracing::debug!(service.name = service_name, "telemetry initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_initialization_fails_cleanly() {
        let _ = init_telemetry("test");
        assert!(matches!(init_json_telemetry("test"), Err(TelemetryError::Init(_))));
    }
}
