//! Tracing configuration for the tagpub CLI
//!
//! Logs go to stderr so that stdout carries only command output (the run
//! report in `--json` mode). Every line of a process shares one correlation id.

use std::io;
pub use tracing::Level;
use tracing::Subscriber;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Environment variable selecting the log format when `--json` is not given.
pub const LOG_FORMAT_ENV: &str = "TAGPUB_LOG_FORMAT";

/// Log line layout on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Multi-line, one field per line
    Pretty,
    /// One line per event (default)
    Compact,
    /// One JSON object per event, with the span list
    Json,
    /// Compact plus file, line and thread ids
    Dev,
}

impl TracingFormat {
    /// `--json` wins; otherwise the env value if it names a format; else compact.
    pub fn select(json: bool, env_value: Option<&str>) -> Self {
        if json {
            return Self::Json;
        }
        env_value
            .and_then(|value| value.parse().ok())
            .unwrap_or(Self::Compact)
    }
}

impl std::str::FromStr for TracingFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            "dev" => Ok(Self::Dev),
            _ => Err(format!("Unknown tracing format: {s}")),
        }
    }
}

/// `--level` values.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    /// Default
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub format: TracingFormat,
    pub level: Level,
    /// Explicit filter directives; `RUST_LOG` and then `level` apply when unset.
    pub filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            format: TracingFormat::Compact,
            level: Level::INFO,
            filter: None,
        }
    }
}

static CORRELATION_ID: std::sync::OnceLock<Uuid> = std::sync::OnceLock::new();

/// Correlation id shared by every span of this process.
pub fn correlation_id() -> Uuid {
    *CORRELATION_ID.get_or_init(Uuid::new_v4)
}

fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    format!("tagpub={level},tagpub_release={level},tagpub_github={level}")
}

/// Builds the stderr subscriber for `config` without installing it.
pub fn build_subscriber(
    config: &TracingConfig,
) -> miette::Result<Box<dyn Subscriber + Send + Sync>> {
    let env_filter = match &config.filter {
        Some(filter) => EnvFilter::try_new(filter),
        None => EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(default_directives(config.level))),
    }
    .map_err(|e| miette::miette!("Failed to create tracing filter: {e}"))?;

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.format {
        TracingFormat::Pretty => Box::new(registry.with(layer.pretty().with_target(true))),
        TracingFormat::Compact => Box::new(registry.with(layer.compact().with_target(false))),
        TracingFormat::Json => Box::new(
            registry.with(layer.json().with_current_span(true).with_span_list(true)),
        ),
        TracingFormat::Dev => Box::new(
            registry.with(
                layer
                    .compact()
                    .with_file(true)
                    .with_line_number(true)
                    .with_thread_ids(true),
            ),
        ),
    };
    Ok(subscriber)
}

/// Installs the subscriber for `config` as the global default.
pub fn init_tracing(config: TracingConfig) -> miette::Result<()> {
    build_subscriber(&config)?
        .try_init()
        .map_err(|e| miette::miette!("Failed to install tracing subscriber: {e}"))?;

    tracing::debug!(
        correlation_id = %correlation_id(),
        version = env!("CARGO_PKG_VERSION"),
        format = ?config.format,
        "Tracing initialized for tagpub CLI"
    );

    Ok(())
}

/// Span wrapping one command execution.
#[macro_export]
macro_rules! command_span {
    ($command:expr) => {
        ::tracing::info_span!(
            "command",
            command = %$command,
            correlation_id = %$crate::tracing::correlation_id(),
            start_time = %chrono::Utc::now().to_rfc3339(),
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!("pretty".parse(), Ok(TracingFormat::Pretty));
        assert_eq!("COMPACT".parse(), Ok(TracingFormat::Compact));
        assert_eq!(" json ".parse(), Ok(TracingFormat::Json));
        assert_eq!("Dev".parse(), Ok(TracingFormat::Dev));
        assert!("invalid".parse::<TracingFormat>().is_err());
    }

    #[test]
    fn test_format_selection() {
        assert_eq!(TracingFormat::select(true, Some("dev")), TracingFormat::Json);
        assert_eq!(TracingFormat::select(false, Some("dev")), TracingFormat::Dev);
        assert_eq!(
            TracingFormat::select(false, Some("pretty")),
            TracingFormat::Pretty
        );
        assert_eq!(
            TracingFormat::select(false, Some("fancy")),
            TracingFormat::Compact
        );
        assert_eq!(TracingFormat::select(false, None), TracingFormat::Compact);
    }

    #[test]
    fn test_every_format_builds_a_working_subscriber() {
        for format in [
            TracingFormat::Pretty,
            TracingFormat::Compact,
            TracingFormat::Json,
            TracingFormat::Dev,
        ] {
            let config = TracingConfig {
                format,
                filter: Some("tagpub=trace".to_string()),
                ..Default::default()
            };
            let subscriber = build_subscriber(&config).unwrap();
            tracing::subscriber::with_default(subscriber, || {
                let span = command_span!("test");
                let _entered = span.enter();
                tracing::info!(?format, "subscriber smoke event");
            });
        }
    }

    #[test]
    fn test_invalid_filter_is_reported() {
        let config = TracingConfig {
            filter: Some("tagpub=notalevel".to_string()),
            ..Default::default()
        };
        let err = build_subscriber(&config).err().unwrap();
        assert!(err.to_string().contains("tracing filter"));
    }

    #[test]
    fn test_correlation_id_consistency() {
        assert_eq!(correlation_id(), correlation_id());
    }

    #[test]
    fn test_default_directives_cover_workspace_crates() {
        let directives = default_directives(Level::DEBUG);
        assert!(directives.contains("tagpub=debug"));
        assert!(directives.contains("tagpub_release=debug"));
        assert!(directives.contains("tagpub_github=debug"));
    }
}
