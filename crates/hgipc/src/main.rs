mod cmd;
mod exit;
mod logging;
mod output;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use hgipc_client::DEFAULT_SOCKET_PATH;

use crate::cmd::{parse_duration, Command, Session};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "hgipc", version, about = "Command-line client for the hub IPC socket")]
struct Cli {
    /// Hub socket path.
    #[arg(
        long,
        short = 's',
        value_name = "PATH",
        env = "HGIPC_SOCKET",
        default_value = DEFAULT_SOCKET_PATH,
        global = true
    )]
    socket: PathBuf,

    /// Connect and call timeout (e.g. 5s, 500ms).
    #[arg(long, value_name = "DURATION", default_value = "5s", value_parser = parse_duration, global = true)]
    timeout: Duration,

    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let session = Session {
        socket: cli.socket,
        timeout: cli.timeout,
        format: cli.format.unwrap_or_else(OutputFormat::default_for_stdout),
    };
    let result = cmd::run(cli.command, &session);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}
