//! Pre-fork HTTP/1.1 server
//!
//! One listening socket, N worker processes accepting on it. Every request
//! gets the same small HTML page and the connection is closed.
//!
//! Usage:
//!     ./target/release/prefork-httpd [-w 4] [-p 8080] [-H localhost] [-d]
//!
//! Benchmark:
//!     wrk -t4 -c100 -d10s http://127.0.0.1:8080/
//!
//! SIGINT or SIGTERM stops the supervisor, which SIGTERMs every worker.

mod cli;
mod logging;

use std::process::ExitCode;

use clap::Parser;

use prefork_core::{CannedResponse, ServerConfig, ServerResult};
use prefork_runtime::Supervisor;

use crate::cli::Cli;
use crate::logging::LogConfig;

fn main() -> ExitCode {
    let config = Cli::parse().apply(ServerConfig::from_env());
    logging::init(LogConfig::for_server(config.debug).with_env_overrides());
    config.log();

    match serve(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "server stopped");
            ExitCode::FAILURE
        }
    }
}

fn serve(config: ServerConfig) -> ServerResult<()> {
    let handler = CannedResponse::new(config.read_limit);
    let mut supervisor = Supervisor::new(config, handler)?;
    supervisor.run()
}
