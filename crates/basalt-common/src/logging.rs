//! Logging init/shutdown, adapted from the teacher's
//! `crates/common/src/logging.rs`. The OpenTelemetry export path is
//! dropped — this workspace has no telemetry display surface (spec §1,
//! explicitly out of scope) — but the stdout `tracing-subscriber` layer is
//! kept exactly as the teacher configures it.

use tracing::info;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

pub struct LoggerConfig {
    whoami: String,
}

impl LoggerConfig {
    pub fn new(whoami: impl Into<String>) -> Self {
        Self {
            whoami: whoami.into(),
        }
    }
}

/// Initializes the logging subsystem. Safe to call once per process; a
/// second call is a no-op (the global subscriber can only be set once).
pub fn init(config: LoggerConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt().compact().with_env_filter(filter).finish();

    // `try_init` rather than `init` so a second call in tests doesn't panic.
    let _ = subscriber.try_init();

    info!(whoami = %config.whoami, "logging started");
}

pub fn finalize() {
    info!("shutting down logging");
}
