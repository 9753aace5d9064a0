// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # cora-config
//!
//! Configuration management for the Cora OPC UA client.
//!
//! ## Features
//!
//! - **Schema Definition**: one file section per engine concern, validated as a whole
//! - **Multi-Format Support**: YAML, TOML, and JSON configuration files
//! - **Environment Overrides**: override the endpoint, log level and reconnect interval
//!
//! ## Quick Start
//!
//! ```no_run
//! use cora_config::loader::load_config;
//!
//! let config = load_config("cora.yaml").unwrap();
//! println!("Endpoint: {}", config.connection.endpoint);
//! ```
//!
//! ## Configuration Schema
//!
//! - `connection` - OPC UA endpoint, timeouts and trust
//! - `nodes` - PackTag Admin and Status roots
//! - `monitoring` - sampling, queueing and the display time zone
//! - `reconnect` - background and manual reconnect timing
//! - `logging` - Logging configuration
//!
//! ## Environment Variables
//!
//! ```text
//! CORA_ENDPOINT=opc.tcp://10.0.39.14:4840
//! CORA_LOG_LEVEL=debug
//! CORA_RECONNECT_INTERVAL=10s
//! ```
//!
//! Values in config files can reference environment variables:
//!
//! ```yaml
//! connection:
//!   endpoint: "${PLC_ENDPOINT:opc.tcp://10.0.39.14:4840}"
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod error;
pub mod loader;
pub mod schema;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, load_config_str, ConfigFormat, ConfigLoader};
pub use schema::{CoraConfig, LogFormat, LogLevel, LoggingConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

// =============================================================================
// Prelude
// =============================================================================

/// Convenience re-exports for common use cases.
pub mod prelude {
    pub use crate::error::{ConfigError, ConfigResult};
    pub use crate::loader::{load_config, ConfigLoader};
    pub use crate::schema::{CoraConfig, LogFormat, LogLevel};
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "cora-config");
    }

    #[test]
    fn test_prelude_imports() {
        use prelude::*;
        let config = CoraConfig::for_endpoint("opc.tcp://plc:4840");
        assert_eq!(config.logging.level, LogLevel::Info);
    }
}
