// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI argument parsing and command definitions.
//!
//! - `status`: Connection and machine summary (default)
//! - `query`: One-shot record query, printed as JSON
//! - `watch`: Live values until Ctrl+C
//! - `validate`: Validate configuration file
//! - `version`: Show version information

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use cora_config::{LogFormat, LogLevel};

// =============================================================================
// Main CLI Structure
// =============================================================================

/// Cora - CoraMeasure machine data over OPC UA
///
/// Connects to the PackTag tree of a CODESYS controller and reads alarms,
/// production counters, pallet and state information.
#[derive(Parser, Debug)]
#[command(
    name = "cora",
    author = "Sylvex <contact@sylvex.io>",
    version = crate::VERSION,
    about = "CoraMeasure machine data over OPC UA",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "cora.yaml",
        env = "CORA_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long, global = true)]
    pub log_level: Option<LogLevel>,

    /// Log format (text, compact, json); overrides the config file
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands for the Cora CLI.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Show connection and machine status
    ///
    /// This is the default command when no subcommand is specified.
    Status(StatusArgs),

    /// Query records from the PackTag tree
    ///
    /// Connects once, reads the requested records and prints them as JSON.
    Query(QueryArgs),

    /// Print live values until interrupted
    ///
    /// Keeps the session alive, reconnects in the background and replays
    /// the monitors on every new session.
    Watch(WatchArgs),

    /// Validate the configuration file
    Validate(ValidateArgs),

    /// Show detailed version information
    Version,
}

// =============================================================================
// Command Arguments
// =============================================================================

/// Arguments for the `status` command.
#[derive(Args, Debug, Default, Clone)]
pub struct StatusArgs {
    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for the `query` command.
#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// Records to read
    pub kind: QueryKind,

    /// Single-line JSON instead of pretty printed
    #[arg(long)]
    pub compact: bool,
}

/// Arguments for the `watch` command.
#[derive(Args, Debug, Default, Clone)]
pub struct WatchArgs {
    /// Also watch the ingredient id of every product slot
    #[arg(long)]
    pub products: bool,
}

/// Arguments for the `validate` command.
#[derive(Args, Debug, Default, Clone)]
pub struct ValidateArgs {
    /// Show parsed configuration after validation
    #[arg(short, long)]
    pub show_config: bool,

    /// Output format for validation results
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

// =============================================================================
// Enums
// =============================================================================

/// Record families readable with `query`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum QueryKind {
    /// Active alarms
    Alarms,
    /// Alarm history
    AlarmHistory,
    /// Processed product counters
    Processed,
    /// Consumed (measured) product counters
    Consumed,
    /// Defective product counters
    Defects,
    /// Pallet parameters
    Pallet,
    /// Stop reason
    StopReason,
    /// Controller clock
    PlcTime,
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for programmatic parsing
    Json,
}

// =============================================================================
// Helper Methods
// =============================================================================

impl Cli {
    /// Parse CLI arguments from the command line.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the effective command, defaulting to `Status` if none specified.
    pub fn effective_command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or_else(|| Commands::Status(StatusArgs::default()))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command() {
        let cli = Cli::parse_from(["cora"]);
        assert!(cli.command.is_none());
        assert!(matches!(cli.effective_command(), Commands::Status(_)));
    }

    #[test]
    fn test_query_kinds() {
        let cli = Cli::parse_from(["cora", "query", "alarm-history"]);
        match cli.command {
            Some(Commands::Query(args)) => assert_eq!(args.kind, QueryKind::AlarmHistory),
            other => panic!("Expected Query command, got {other:?}"),
        }

        let cli = Cli::parse_from(["cora", "query", "plc-time", "--compact"]);
        match cli.command {
            Some(Commands::Query(args)) => {
                assert_eq!(args.kind, QueryKind::PlcTime);
                assert!(args.compact);
            }
            other => panic!("Expected Query command, got {other:?}"),
        }

        assert!(Cli::try_parse_from(["cora", "query", "recipes"]).is_err());
    }

    #[test]
    fn test_watch_products() {
        let cli = Cli::parse_from(["cora", "watch", "--products"]);
        assert!(matches!(cli.command, Some(Commands::Watch(WatchArgs { products: true }))));
    }

    #[test]
    fn test_config_path() {
        let cli = Cli::parse_from(["cora", "-c", "/etc/cora/cora.toml", "validate"]);
        assert_eq!(cli.config, PathBuf::from("/etc/cora/cora.toml"));
    }

    #[test]
    fn test_log_overrides() {
        let cli = Cli::parse_from(["cora", "-l", "debug", "--log-format", "json"]);
        assert_eq!(cli.log_level, Some(LogLevel::Debug));
        assert_eq!(cli.log_format, Some(LogFormat::Json));

        let cli = Cli::parse_from(["cora"]);
        assert_eq!(cli.log_level, None);
        assert!(Cli::try_parse_from(["cora", "-l", "loud"]).is_err());
    }

    #[test]
    fn test_status_format() {
        let cli = Cli::parse_from(["cora", "status", "-f", "json"]);
        match cli.command {
            Some(Commands::Status(args)) => assert_eq!(args.format, OutputFormat::Json),
            other => panic!("Expected Status command, got {other:?}"),
        }
    }
}
