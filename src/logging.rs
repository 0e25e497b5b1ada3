//! Diagnostics for serve.
//!
//! Only diagnostics travel through `tracing` (accept failures, pipe errors,
//! poll errors); they land on stderr so the supervisor's stdout stays a
//! clean protocol stream. Level and format arrive through the CLI — clap
//! reads `SERVE_LOG_LEVEL` and `SERVE_LOG_FORMAT` itself — while a full
//! filter expression in `SERVE_LOG` (or `RUST_LOG`) overrides the plain
//! level.

use clap::ValueEnum;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Verbosity of diagnostics. The default of `warn` keeps the supervisor
/// quiet unless something needs operator attention.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    #[value(alias = "warning")]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

/// Shape of diagnostic lines.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

/// Resolve the effective filter. An explicit `SERVE_LOG` or `RUST_LOG`
/// expression beats the CLI level; an unparsable one is reported and
/// skipped rather than silently swallowed.
fn resolve_filter(level: LogLevel) -> EnvFilter {
    for key in ["SERVE_LOG", "RUST_LOG"] {
        let Ok(spec) = std::env::var(key) else {
            continue;
        };
        match EnvFilter::try_new(&spec) {
            Ok(filter) => return filter,
            Err(err) => eprintln!("ignoring {key}={spec}: {err}"),
        }
    }
    EnvFilter::new(level.directive())
}

/// Install the global subscriber. Idempotent: a second call (as happens
/// under the test harness) leaves the first subscriber in place.
pub fn init(level: LogLevel, format: LogFormat) {
    let stderr = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(resolve_filter(level));
    let outcome = match format {
        LogFormat::Pretty => registry.with(stderr).try_init(),
        LogFormat::Compact => registry.with(stderr.compact()).try_init(),
        LogFormat::Json => registry.with(stderr.json()).try_init(),
    };
    let _ = outcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directives_match_the_cli_spellings() {
        for level in LogLevel::value_variants() {
            let name = level.to_possible_value().unwrap().get_name().to_string();
            assert_eq!(level.directive(), name);
        }
    }

    #[test]
    fn test_value_enum_accepts_aliases_and_rejects_garbage() {
        assert_eq!(LogLevel::from_str("debug", true), Ok(LogLevel::Debug));
        assert_eq!(LogLevel::from_str("warning", true), Ok(LogLevel::Warn));
        assert!(LogLevel::from_str("loud", true).is_err());
        assert_eq!(LogFormat::from_str("json", true), Ok(LogFormat::Json));
        assert!(LogFormat::from_str("xml", true).is_err());
    }

    #[test]
    fn test_resolve_filter_never_panics() {
        let _ = resolve_filter(LogLevel::Warn);
        let _ = resolve_filter(LogLevel::Trace);
    }
}
