// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration, logging and service setup shared by the commands.

use std::sync::Arc;

use cora_config::{ConfigLoader, CoraConfig};
use cora_opcua::{MachineService, OpcUaTransport};
use tracing::info;

use crate::cli::Cli;
use crate::error::{BinError, BinResult};
use crate::logging::init_logging;

/// Loads the configuration named on the command line.
pub fn load_config(cli: &Cli) -> BinResult<CoraConfig> {
    ConfigLoader::new()
        .load(&cli.config)
        .map_err(|e| BinError::from(e).with_context(format!("loading {}", cli.config.display())))
}

/// Starts logging with the command line taking precedence over the file.
pub fn init_logging_for(cli: &Cli, config: Option<&CoraConfig>) {
    let logging = config.map(|c| c.logging.clone()).unwrap_or_default();
    init_logging(
        cli.log_level.unwrap_or(logging.level),
        cli.log_format.unwrap_or(logging.format),
    );
}

/// Builds the service on the production transport.
#[cfg(feature = "real-transport")]
pub fn build_service(config: &CoraConfig) -> BinResult<Arc<MachineService>> {
    service_on(Arc::new(cora_opcua::RealOpcUaTransport::new()), config)
}

/// Without the `real-transport` feature there is nothing to talk to.
#[cfg(not(feature = "real-transport"))]
pub fn build_service(_config: &CoraConfig) -> BinResult<Arc<MachineService>> {
    Err(BinError::config(
        "built without an OPC UA transport; rebuild with `--features real-transport`",
    ))
}

/// Builds the service on `transport`.
pub fn service_on(transport: Arc<dyn OpcUaTransport>, config: &CoraConfig) -> BinResult<Arc<MachineService>> {
    info!(
        endpoint = %config.connection.endpoint,
        transport = %transport.display_name(),
        "Creating machine service"
    );
    Ok(MachineService::new(transport, config.service_config())?)
}

/// Starts `service` and fails when the controller cannot be reached.
pub async fn connect(service: &MachineService) -> BinResult<()> {
    if service.start().await {
        Ok(())
    } else {
        Err(BinError::connection(format!(
            "controller at {} is unreachable",
            service.config().connection.endpoint
        )))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn test_load_config_reports_path() {
        let cli = Cli::parse_from(["cora", "-c", "/nonexistent/cora.yaml"]);
        let err = load_config(&cli).unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("/nonexistent/cora.yaml"));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::with_suffix(".yaml").unwrap();
        writeln!(file, "connection:\n  endpoint: \"opc.tcp://10.0.39.14:4840\"").unwrap();

        let path = file.path().to_string_lossy().to_string();
        let cli = Cli::parse_from(["cora", "-c", path.as_str()]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.connection.endpoint, "opc.tcp://10.0.39.14:4840");
    }

    #[cfg(not(feature = "real-transport"))]
    #[test]
    fn test_build_service_needs_transport() {
        let config = CoraConfig::for_endpoint("opc.tcp://plc:4840");
        assert_eq!(build_service(&config).unwrap_err().exit_code(), 1);
    }
}
