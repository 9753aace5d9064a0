// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `validate` command.

use cora_config::CoraConfig;

use crate::cli::{Cli, OutputFormat, ValidateArgs};
use crate::error::{BinError, BinResult};
use crate::runtime::load_config;

/// Non-fatal observations about a valid configuration.
pub(crate) fn warnings(config: &CoraConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.reconnect.manual_timeout <= config.reconnect.manual_delay {
        warnings.push("reconnect.manual_timeout leaves room for a single attempt".to_string());
    }
    if config.monitoring.ingredient_sampling > config.monitoring.default_sampling {
        warnings.push("ingredients are sampled slower than ordinary monitors".to_string());
    }
    if config.connection.request_timeout > config.connection.connect_timeout {
        warnings.push("connection.request_timeout exceeds connection.connect_timeout".to_string());
    }

    warnings
}

/// Executes the `validate` command.
pub fn validate(cli: &Cli, args: ValidateArgs) -> BinResult<()> {
    let config_path = &cli.config;
    let config = load_config(cli)
        .map_err(|e| BinError::config(format!("Configuration validation failed: {}", e)))?;
    let warnings = warnings(&config);

    match args.format {
        OutputFormat::Text => {
            println!("✓ Configuration is valid: {}", config_path.display());
            println!();
            println!("Summary:");
            println!("  Endpoint:         {}", config.connection.endpoint);
            println!("  Admin root:       {}", config.nodes.admin_root);
            println!("  Status root:      {}", config.nodes.status_root);
            println!("  Product slots:    {}", config.nodes.product_slots);
            println!(
                "  Reconnect:        every {}",
                humantime::format_duration(config.reconnect.auto_interval)
            );

            if !warnings.is_empty() {
                println!();
                println!("Warnings:");
                for warning in &warnings {
                    println!("  ⚠ {}", warning);
                }
            }

            if args.show_config {
                println!();
                println!("Parsed configuration:");
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "valid": true,
                "config_path": config_path.display().to_string(),
                "summary": {
                    "endpoint": config.connection.endpoint,
                    "product_slots": config.nodes.product_slots,
                },
                "warnings": warnings,
                "config": if args.show_config { Some(&config) } else { None },
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_defaults_have_no_warnings() {
        let config = CoraConfig::for_endpoint("opc.tcp://plc:4840");
        assert!(warnings(&config).is_empty());
    }

    #[test]
    fn test_tight_manual_timeout_warns() {
        let mut config = CoraConfig::for_endpoint("opc.tcp://plc:4840");
        config.reconnect.manual_timeout = Duration::from_secs(1);
        let warnings = warnings(&config);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("manual_timeout"));
    }
}
