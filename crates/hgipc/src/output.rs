use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use hgipc_client::{Event, Variant};
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T, pretty: bool) {
    let text = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    println!("{}", text.unwrap_or_else(|_| "null".to_string()));
}

/// Print a call result.
pub fn print_value(value: &Variant, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&Value::from(value), false),
        OutputFormat::Pretty => print_json(&Value::from(value), true),
        OutputFormat::Table => {
            let mut table = new_table();
            match value {
                Variant::Struct(entries) => {
                    table.set_header(vec!["KEY", "TYPE", "VALUE"]);
                    for (key, item) in entries {
                        table.add_row(vec![cell(key), item.kind().to_string(), cell(item)]);
                    }
                }
                Variant::Array(items) => {
                    table.set_header(vec!["INDEX", "TYPE", "VALUE"]);
                    for (index, item) in items.iter().enumerate() {
                        table.add_row(vec![index.to_string(), item.kind().to_string(), cell(item)]);
                    }
                }
                scalar => {
                    table
                        .set_header(vec!["TYPE", "VALUE"])
                        .add_row(vec![scalar.kind().to_string(), cell(scalar)]);
                }
            }
            println!("{table}");
        }
        OutputFormat::Raw => match value {
            Variant::Binary(bytes) => print_raw(bytes),
            other => println!("{}", cell(other)),
        },
    }
}

pub fn print_variables(vars: &[(String, Variant)], format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Pretty => {
            let map: serde_json::Map<String, Value> = vars
                .iter()
                .map(|(name, value)| (name.clone(), Value::from(value)))
                .collect();
            print_json(&map, matches!(format, OutputFormat::Pretty));
        }
        OutputFormat::Table => {
            let mut table = new_table();
            table.set_header(vec!["NAME", "TYPE", "VALUE"]);
            for (name, value) in vars {
                table.add_row(vec![name.clone(), value.kind().to_string(), cell(value)]);
            }
            println!("{table}");
        }
        OutputFormat::Raw => {
            for (name, value) in vars {
                println!("{name}={}", cell(value));
            }
        }
    }
}

#[derive(Serialize)]
struct EventOutput<'a> {
    source: Option<&'a str>,
    peer_id: u64,
    channel: i32,
    variable: &'a str,
    value: Value,
    timestamp: String,
}

pub fn print_event(event: &Event, format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Pretty => {
            let out = EventOutput {
                source: event.source.as_deref(),
                peer_id: event.peer_id,
                channel: event.channel,
                variable: &event.variable,
                value: Value::from(&event.value),
                timestamp: now_unix_seconds(),
            };
            print_json(&out, matches!(format, OutputFormat::Pretty));
        }
        OutputFormat::Table => {
            let mut table = new_table();
            table
                .set_header(vec!["PEER", "CHANNEL", "VARIABLE", "VALUE"])
                .add_row(vec![
                    event.peer_id.to_string(),
                    event.channel.to_string(),
                    event.variable.clone(),
                    cell(&event.value),
                ]);
            println!("{table}");
        }
        OutputFormat::Raw => {
            println!(
                "{}.{}.{}={}",
                event.peer_id,
                event.channel,
                event.variable,
                cell(&event.value)
            );
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// One-line rendering: strings bare, everything else as compact JSON.
fn cell(value: &Variant) -> String {
    match value {
        Variant::String(text) => text.clone(),
        Variant::Binary(bytes) => format!("<binary {} bytes>", bytes.len()),
        other => Value::from(other).to_string(),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
