// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Logging and tracing initialization.
//!
//! Logs go to stderr so command output on stdout stays machine readable.

use cora_config::{LogFormat, LogLevel};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// =============================================================================
// Logging Initialization
// =============================================================================

/// Initializes the logging subsystem.
///
/// `RUST_LOG` takes precedence over `level` when it is set.
///
/// # Example
///
/// ```ignore
/// use cora_bin::logging::init_logging;
/// use cora_config::{LogFormat, LogLevel};
///
/// init_logging(LogLevel::Info, LogFormat::Text);
/// ```
pub fn init_logging(level: LogLevel, format: LogFormat) {
    let env_filter = build_filter(level);

    match format {
        LogFormat::Text => init_text_logging(env_filter),
        LogFormat::Json => init_json_logging(env_filter),
        LogFormat::Compact => init_compact_logging(env_filter),
    }
}

/// Filter for `level`, with the protocol stack held at `warn` unless
/// tracing everything.
fn build_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directives = match level {
            LogLevel::Trace => level.as_str().to_string(),
            _ => format!("{},opcua=warn", level.as_str()),
        };
        EnvFilter::new(directives)
    })
}

fn init_text_logging(filter: EnvFilter) {
    let is_terminal = std::io::IsTerminal::is_terminal(&std::io::stderr());

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(is_terminal),
        )
        .try_init();
}

/// JSON lines for log shippers.
fn init_json_logging(filter: EnvFilter) {
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_current_span(true)
                .with_span_list(true),
        )
        .try_init();
}

fn init_compact_logging(filter: EnvFilter) {
    let is_terminal = std::io::IsTerminal::is_terminal(&std::io::stderr());

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(is_terminal),
        )
        .try_init();
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_quiets_protocol_stack() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let debug = build_filter(LogLevel::Debug).to_string();
        assert!(debug.contains("opcua=warn"));
        assert!(debug.contains("debug"));
        assert!(!build_filter(LogLevel::Trace).to_string().contains("opcua"));
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_logging(LogLevel::Warn, LogFormat::Compact);
        init_logging(LogLevel::Debug, LogFormat::Json);
    }
}
