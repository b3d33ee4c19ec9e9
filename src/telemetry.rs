use anyhow::Result;
use clap::ValueEnum;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Structured JSON lines
    #[default]
    Json,
    /// Human readable output
    Pretty,
}

/// Initialize structured logging. `RUST_LOG` overrides the default `info` level.
///
/// Logs go to stderr so stdout stays free for the line bus.
pub fn init_telemetry(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(std::io::stderr),
            )
            .with(filter)
            .try_init()?,
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .with(filter)
            .try_init()?,
    }

    tracing::info!(format = ?format, "Workstation telemetry initialized");
    Ok(())
}

/// Generate a correlation ID for linking the events of one run
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Create the span a station's control loop runs inside
pub fn create_station_span(station_id: &str, correlation_id: &str) -> tracing::Span {
    tracing::info_span!(
        "station",
        station.id = station_id,
        correlation.id = correlation_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_ids_are_unique() {
        let a = generate_correlation_id();
        let b = generate_correlation_id();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }
}
