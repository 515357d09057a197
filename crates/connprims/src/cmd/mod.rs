use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use connprims::transport::Endpoint;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod probe;
pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run an echo server that handshakes every connection.
    Serve(ServeArgs),
    /// Send one command through a keepalive, reconnecting client and print the reply.
    Send(SendArgs),
    /// Handshake with a server and report what it negotiated.
    Probe(ProbeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Probe(args) => probe::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Endpoint to bind: a socket path, unix:///path, host:port or tcp://host:port.
    pub endpoint: Endpoint,
    /// Connection info presented to every client.
    #[arg(long, env = "CONNPRIMS_INFO")]
    pub info: String,
    /// Maximum command size pushed to clients. Zero or less means unlimited.
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub max_command_size: i64,
    /// Deadline for each handshake write (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub handshake_timeout: String,
    /// Exit after serving N connections to completion.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Endpoint to connect to.
    pub endpoint: Endpoint,
    /// Connection info the server must present.
    #[arg(long, env = "CONNPRIMS_INFO")]
    pub info: String,
    /// Sequence number for the command. Zero is reserved for pings.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    pub seq: u64,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Deadline for the handshake, the send and the reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    /// Idle time before the first keepalive ping.
    #[arg(long, default_value = "3s")]
    pub keepalive_time: String,
    /// Interval between keepalive pings.
    #[arg(long, default_value = "1s")]
    pub keepalive_intvl: String,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Endpoint to connect to.
    pub endpoint: Endpoint,
    /// Connection info the server must present. Without it, the server's info is
    /// reported but not checked.
    #[arg(long, env = "CONNPRIMS_INFO")]
    pub info: Option<String>,
    /// Deadline for the handshake and the ping (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration(" 3 ").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert_eq!(parse_duration("0s").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("bad").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
        assert!(parse_duration("5m").is_err());
    }
}
