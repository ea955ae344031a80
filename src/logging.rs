//! Tracing subscriber setup.
//!
//! `RUST_LOG` takes precedence over the configured level, so a single run can
//! be made more verbose without editing the config file. Logs go to stderr;
//! stdout is left to command output.

use crate::config::LoggingConfig;
use tracing::Subscriber;
use tracing_subscriber::EnvFilter;

/// Build the subscriber described by `config` without installing it.
pub fn subscriber(config: &LoggingConfig) -> Box<dyn Subscriber + Send + Sync> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    if config.json {
        Box::new(builder.json().finish())
    } else {
        Box::new(builder.finish())
    }
}

/// Install the global subscriber.
///
/// Returns `false` if a subscriber was already installed; the existing one
/// is kept.
pub fn init(config: &LoggingConfig) -> bool {
    tracing::subscriber::set_global_default(subscriber(config)).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_subscriber_handles_span_fields() {
        let config = LoggingConfig {
            level: "trace".into(),
            json: true,
        };
        tracing::subscriber::with_default(subscriber(&config), || {
            let span = tracing::info_span!("remote_camera", camera = "cam00");
            let _entered = span.enter();
            tracing::debug!(timeout_s = 6.0, "Waiting for readout");
        });
    }
}
