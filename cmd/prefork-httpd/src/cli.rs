//! Command line arguments.

use clap::Parser;

use prefork_core::ServerConfig;

/// Run a pre-fork worker HTTP server.
///
/// Flags override `PREFORK_*` environment variables, which override defaults.
#[derive(Parser, Debug)]
#[command(name = "prefork-httpd", version, about)]
pub struct Cli {
    /// The number of worker processes to run
    #[arg(short = 'w', long, alias = "worker_count", value_name = "WORKER_COUNT")]
    pub worker_count: Option<usize>,

    /// The port to listen for requests on
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Host name or IPv4 address to bind
    #[arg(short = 'H', long, value_name = "HOST")]
    pub host: Option<String>,

    /// Pending-connection backlog shared by all workers
    #[arg(short, long, value_name = "BACKLOG")]
    pub backlog: Option<u32>,

    /// If set enables debug level logs
    #[arg(short, long)]
    pub debug: bool,
}

impl Cli {
    /// Layer the flags that were given on top of `base`.
    pub fn apply(self, base: ServerConfig) -> ServerConfig {
        let mut config = base;
        if let Some(n) = self.worker_count {
            config = config.worker_count(n);
        }
        if let Some(port) = self.port {
            config = config.port(port);
        }
        if let Some(host) = self.host {
            config = config.host(host);
        }
        if let Some(backlog) = self.backlog {
            config = config.backlog(backlog);
        }
        if self.debug {
            config = config.debug(true);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults_untouched_without_flags() {
        let cli = Cli::try_parse_from(["prefork-httpd"]).unwrap();
        assert_eq!(cli.apply(ServerConfig::new()), ServerConfig::new());
    }

    #[test]
    fn test_flags_override_base() {
        let cli = Cli::try_parse_from([
            "prefork-httpd", "-w", "4", "-p", "9000", "-H", "127.0.0.1", "-b", "64", "-d",
        ])
        .unwrap();
        let config = cli.apply(ServerConfig::new());
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.backlog, 64);
        assert!(config.debug);
    }

    #[test]
    fn test_long_flags() {
        let cli = Cli::try_parse_from(["prefork-httpd", "--worker-count", "2", "--port", "8081"])
            .unwrap();
        assert_eq!(cli.worker_count, Some(2));
        assert_eq!(cli.port, Some(8081));
        assert!(!cli.debug);
    }

    #[test]
    fn test_rejects_out_of_range_port() {
        assert!(Cli::try_parse_from(["prefork-httpd", "-p", "70000"]).is_err());
    }
}
