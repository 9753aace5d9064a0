// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # cora-bin
//!
//! The `cora` command line client.
//!
//! ## Architecture
//!
//! ```text
//!                    ┌─────────────┐
//!                    │   main.rs   │
//!                    └──────┬──────┘
//!                    ┌──────▼──────┐
//!                    │   cli.rs    │
//!                    └──────┬──────┘
//!               ┌───────────┼───────────┐
//!               ▼           ▼           ▼
//!        ┌──────────┐ ┌──────────┐ ┌──────────┐
//!        │ commands │ │ runtime  │ │ logging  │
//!        └────┬─────┘ └────┬─────┘ └──────────┘
//!             │            │
//!             │     ┌──────▼──────┐
//!             │     │ cora-config │
//!             │     └─────────────┘
//!        ┌────▼───────┐
//!        │ cora-opcua │  MachineService
//!        └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Connection and machine summary (default command)
//! cora -c /etc/cora/cora.yaml
//!
//! # Records as JSON
//! cora query alarms
//! cora query plc-time --compact
//!
//! # Live values until Ctrl+C
//! cora watch --products
//!
//! # Validate configuration
//! cora validate --show-config
//! ```
//!
//! The networked commands need the `real-transport` feature.

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod shutdown;

// =============================================================================
// Re-exports
// =============================================================================

pub use cli::{Cli, Commands};
pub use error::{BinError, BinResult};
pub use logging::init_logging;
pub use shutdown::ShutdownCoordinator;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
