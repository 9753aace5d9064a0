// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI command implementations.
//!
//! - `status`: Connection and machine summary
//! - `query`: Records as JSON
//! - `watch`: Live values until interrupted
//! - `validate`: Validate configuration file
//! - `version`: Show version information

mod query;
mod status;
mod validate;
mod version;
mod watch;

pub use query::{query, records};
pub use status::{status, StatusReport};
pub use validate::validate;
pub use version::version;
pub use watch::watch;

use crate::cli::{Cli, Commands};
use crate::error::BinResult;
use crate::runtime::{build_service, init_logging_for, load_config};

/// Executes the appropriate command based on CLI arguments.
pub async fn execute(cli: Cli) -> BinResult<()> {
    match cli.effective_command() {
        Commands::Version => version::version(&cli),
        Commands::Validate(args) => {
            init_logging_for(&cli, None);
            validate::validate(&cli, args)
        }
        Commands::Status(args) => {
            let config = load_config(&cli)?;
            init_logging_for(&cli, Some(&config));
            status::status(build_service(&config)?, args).await
        }
        Commands::Query(args) => {
            let config = load_config(&cli)?;
            init_logging_for(&cli, Some(&config));
            query::query(build_service(&config)?, args).await
        }
        Commands::Watch(args) => {
            let config = load_config(&cli)?;
            init_logging_for(&cli, Some(&config));
            watch::watch(build_service(&config)?, args).await
        }
    }
}
