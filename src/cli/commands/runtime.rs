use clap::{Arg, ArgMatches, Command};
use std::time::Duration;

pub const ARG_REQUEST_TIMEOUT: &str = "request-timeout";
pub const ARG_SHUTDOWN_TIMEOUT: &str = "shutdown-timeout";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_REQUEST_TIMEOUT)
                .long("request-timeout")
                .help("Per-request deadline in seconds, applied to every store call")
                .env("TESSERA_REQUEST_TIMEOUT")
                .default_value("10")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_SHUTDOWN_TIMEOUT)
                .long("shutdown-timeout")
                .help("Grace period in seconds for in-flight requests on shutdown")
                .env("TESSERA_SHUTDOWN_TIMEOUT")
                .default_value("10")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub request_timeout: Duration,
    pub shutdown_timeout: Duration,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let secs = |id: &str, default: u64| {
            Duration::from_secs(matches.get_one::<u64>(id).copied().unwrap_or(default))
        };
        Self {
            request_timeout: secs(ARG_REQUEST_TIMEOUT, 10),
            shutdown_timeout: secs(ARG_SHUTDOWN_TIMEOUT, 10),
        }
    }
}
