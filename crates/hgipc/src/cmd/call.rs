use hgipc_client::Variant;
use serde::Serialize;
use tracing::debug;

use crate::cmd::{parse_json, CallArgs, Session};
use crate::exit::{client_error, CliResult, SUCCESS};
use crate::output::{print_json, print_value, OutputFormat};

pub fn run(args: CallArgs, session: &Session) -> CliResult<i32> {
    let params = match &args.params {
        Some(json) => call_params(parse_json("--params", json)?),
        None => Vec::new(),
    };

    let client = session.connect()?;
    debug!(method = %args.method, params = params.len(), "calling hub");
    let result = client
        .call(&args.method, params)
        .map_err(|err| client_error(&format!("{} failed", args.method), err))?;
    print_value(&result, session.format);
    Ok(SUCCESS)
}

/// A JSON array is the parameter list; any other value is the only parameter.
fn call_params(value: Variant) -> Vec<Variant> {
    match value {
        Variant::Array(items) => items,
        Variant::Void => Vec::new(),
        other => vec![other],
    }
}

#[derive(Serialize)]
struct DevicesOutput {
    devices: Vec<u64>,
}

pub fn devices(session: &Session) -> CliResult<i32> {
    let client = session.connect()?;
    let devices = client
        .list_device_ids()
        .map_err(|err| client_error("listDevices failed", err))?;

    match session.format {
        OutputFormat::Json => print_json(&DevicesOutput { devices }, false),
        OutputFormat::Pretty => print_json(&DevicesOutput { devices }, true),
        OutputFormat::Table | OutputFormat::Raw => {
            for id in devices {
                println!("{id}");
            }
        }
    }
    Ok(SUCCESS)
}
