use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use hgipc_client::{Client, ClientConfig, ReconnectPolicy, Variant};

use crate::exit::{client_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod call;
pub mod info;
pub mod listen;
pub mod log_level;
pub mod vars;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Invoke an arbitrary hub method and print its result.
    Call(CallArgs),
    /// Read a system variable.
    Get(GetArgs),
    /// Create or overwrite a system variable.
    Set(SetArgs),
    /// Delete a system variable.
    Delete(DeleteArgs),
    /// List all system variables.
    Vars,
    /// List the ids of all devices known to the hub.
    Devices,
    /// Show or change the hub log level.
    LogLevel(LogLevelArgs),
    /// Print hub events as they arrive.
    Listen(ListenArgs),
    /// Check the hub connection and print peer metadata.
    Info,
    /// Show version information.
    Version(VersionArgs),
}

/// Connection settings shared by all commands that talk to the hub.
#[derive(Debug, Clone)]
pub struct Session {
    pub socket: PathBuf,
    pub timeout: Duration,
    pub format: OutputFormat,
}

impl Session {
    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(&self.socket)
            .with_connect_timeout(self.timeout)
            .with_call_timeout(Some(self.timeout))
    }

    /// One-shot connection that does not reconnect.
    pub fn connect(&self) -> CliResult<Client> {
        Client::connect(self.config().with_reconnect(ReconnectPolicy::disabled()))
            .map_err(|err| client_error("connect failed", err))
    }
}

pub fn run(command: Command, session: &Session) -> CliResult<i32> {
    match command {
        Command::Call(args) => call::run(args, session),
        Command::Get(args) => vars::get(args, session),
        Command::Set(args) => vars::set(args, session),
        Command::Delete(args) => vars::delete(args, session),
        Command::Vars => vars::list(session),
        Command::Devices => call::devices(session),
        Command::LogLevel(args) => log_level::run(args, session),
        Command::Listen(args) => listen::run(args, session),
        Command::Info => info::run(session),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Method name, e.g. `listDevices`.
    pub method: String,
    /// Parameters as a JSON array; a single non-array value is sent as the
    /// only parameter.
    #[arg(long, short = 'p', value_name = "JSON")]
    pub params: Option<String>,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    pub name: String,
}

#[derive(Args, Debug)]
pub struct SetArgs {
    pub name: String,
    /// New value as JSON.
    #[arg(value_name = "JSON")]
    pub value: String,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    pub name: String,
}

#[derive(Args, Debug)]
pub struct LogLevelArgs {
    /// New level (0-10). Omit to print the current one.
    #[arg(value_parser = clap::value_parser!(i64).range(0..=10))]
    pub level: Option<i64>,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Exit after printing N events.
    #[arg(long)]
    pub count: Option<usize>,
    /// Only print events for these peer ids (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub peers: Option<Vec<u64>>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_json(label: &str, input: &str) -> CliResult<Variant> {
    let json: serde_json::Value = serde_json::from_str(input)
        .map_err(|err| CliError::new(USAGE, format!("{label} is not valid JSON: {err}")))?;
    Variant::try_from(json).map_err(|err| CliError::new(USAGE, format!("{label}: {err}")))
}

/// Parse `5s`, `500ms` or a bare number of seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("duration must not be empty".to_string());
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| format!("invalid duration value: {input}"))?;
    if value == 0 {
        return Err("duration must be greater than zero".to_string());
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
