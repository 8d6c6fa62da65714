//! Observability infrastructure for Cadence.
//!
//! Structured logging with consistent spans. This module provides
//! initialization helpers, span constructors, and a redaction wrapper for
//! participant identifiers.

use std::fmt;
use std::sync::Once;

use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

impl LogFormat {
    /// Parses a format name (`json` or `pretty`), case-insensitively.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("json") {
            Some(Self::Json)
        } else if name.eq_ignore_ascii_case("pretty") {
            Some(Self::Pretty)
        } else {
            None
        }
    }
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `cadence_flow=debug`)
///
/// # Example
///
/// ```rust
/// use cadence_core::observability::{init_logging, LogFormat};
///
/// init_logging(LogFormat::Pretty);
/// ```
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_fmt::layer().json())
                    .try_init();
            }
            LogFormat::Pretty => {
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_fmt::layer().pretty())
                    .try_init();
            }
        }
    });
}

/// Creates a span for schedule operations with standard fields.
///
/// The health code is recorded in redacted form.
///
/// # Example
///
/// ```rust
/// use cadence_core::observability::schedule_span;
///
/// let span = schedule_span("get_scheduled_activities", "asthma", "healthcode-123");
/// let _guard = span.enter();
/// // ... compute the participant's schedule
/// ```
#[must_use]
pub fn schedule_span(operation: &str, study: &str, health_code: &str) -> Span {
    tracing::info_span!(
        "schedule",
        op = operation,
        study = study,
        participant = %Redacted(health_code),
    )
}

/// Display wrapper that hides all but a short prefix of a sensitive value.
///
/// ```rust
/// use cadence_core::observability::Redacted;
///
/// assert_eq!(Redacted("healthcode-123").to_string(), "heal…");
/// ```
#[derive(Clone, Copy)]
pub struct Redacted<T>(pub T);

impl<T: AsRef<str>> fmt::Display for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.0.as_ref();
        let prefix: String = value.chars().take(4).collect();
        if prefix.len() == value.len() {
            write!(f, "****")
        } else {
            write!(f, "{prefix}…")
        }
    }
}

impl<T: AsRef<str>> fmt::Debug for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
