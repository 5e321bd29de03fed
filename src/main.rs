//! authcalc-server: authenticated lcm / parentheses / caesar server.
//!
//! Usage: `authcalc-server <users_file> [port] [--config FILE] [--verbose]`

use authcalc::config::{Config, ConfigError, DEFAULT_PORT};
use authcalc::runtime;
use authcalc::users::UserDirectory;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // Load configuration
    let config = match Config::load() {
        Ok(config) => config,
        // Usage errors exit 1 like any other bad argument; --help exits 0.
        Err(ConfigError::Args(e)) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Some(ref rejected) = config.rejected_port {
        warn!(port = %rejected, "Invalid port number. Using default port {}.", DEFAULT_PORT);
    }

    let users = match UserDirectory::load(&config.users_file) {
        Ok(users) => users,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        host = %config.host,
        port = config.port,
        users = users.len(),
        users_file = %config.users_file.display(),
        verbose = config.verbose,
        "Starting authcalc server"
    );

    match runtime::run(&config, users) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}
