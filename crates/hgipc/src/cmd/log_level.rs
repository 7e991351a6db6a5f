use hgipc_client::Variant;

use crate::cmd::{LogLevelArgs, Session};
use crate::exit::{client_error, CliResult, SUCCESS};
use crate::output::print_value;

pub fn run(args: LogLevelArgs, session: &Session) -> CliResult<i32> {
    let client = session.connect()?;
    let level = match args.level {
        Some(level) => client.set_log_level(level),
        None => client.log_level(),
    }
    .map_err(|err| client_error("logLevel failed", err))?;
    print_value(&Variant::Integer(level), session.format);
    Ok(SUCCESS)
}
