use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use testgear_wire::{Kind, Value};

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

#[derive(Serialize)]
struct ProvidersOutput<'a> {
    providers: &'a [String],
}

#[derive(Serialize)]
struct PropertyOutput<'a> {
    name: &'a str,
    kind: &'a str,
}

#[derive(Serialize)]
struct PropertiesOutput<'a> {
    provider: &'a str,
    properties: Vec<PropertyOutput<'a>>,
}

#[derive(Serialize)]
struct ValueOutput<'a> {
    name: &'a str,
    kind: &'a str,
    value: serde_json::Value,
}

#[derive(Serialize)]
struct StatusOutput<'a> {
    name: &'a str,
    status: i32,
}

#[derive(Serialize)]
struct TextOutput<'a> {
    name: &'a str,
    description: &'a str,
}

#[derive(Serialize)]
struct AckOutput<'a> {
    action: &'a str,
    name: &'a str,
    ok: bool,
}

fn print_json<T: Serialize>(out: &T) {
    println!(
        "{}",
        serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
    );
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

/// Loaded provider names, in load order.
pub fn print_providers(providers: &[String], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ProvidersOutput { providers }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["PROVIDER"]);
            for name in providers {
                table.add_row(vec![name.as_str()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for name in providers {
                println!("{name}");
            }
        }
    }
}

pub fn print_properties(provider: &str, properties: &[(String, Kind)], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&PropertiesOutput {
            provider,
            properties: properties
                .iter()
                .map(|(name, kind)| PropertyOutput {
                    name,
                    kind: kind.as_str(),
                })
                .collect(),
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["NAME", "KIND"]);
            for (name, kind) in properties {
                table.add_row(vec![name.as_str(), kind.as_str()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for (name, kind) in properties {
                println!("{provider}.{name} ({kind})");
            }
        }
        OutputFormat::Raw => {
            for (name, kind) in properties {
                println!("{name}:{kind}");
            }
        }
    }
}

pub fn print_value(name: &str, value: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ValueOutput {
            name,
            kind: value.kind().as_str(),
            value: json_value(value),
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["NAME", "KIND", "VALUE"]);
            table.add_row(vec![
                name.to_string(),
                value.kind().to_string(),
                display_value(value),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("{name} ({}) = {}", value.kind(), display_value(value));
        }
        OutputFormat::Raw => match value {
            Value::Data(bytes) => print_raw(bytes),
            other => println!("{other}"),
        },
    }
}

pub fn print_status(name: &str, status: i32, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&StatusOutput { name, status }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["COMMAND", "STATUS"]);
            table.add_row(vec![name.to_string(), status.to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{name} returned {status}"),
        OutputFormat::Raw => println!("{status}"),
    }
}

pub fn print_description(name: &str, description: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&TextOutput { name, description }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["NAME", "DESCRIPTION"]);
            table.add_row(vec![name, description]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => println!("{description}"),
    }
}

pub fn print_ack(action: &str, name: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&AckOutput {
            action,
            name,
            ok: true,
        }),
        OutputFormat::Table | OutputFormat::Pretty => println!("{action} {name}: ok"),
        OutputFormat::Raw => {}
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn json_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Char(v) => (*v).into(),
        Value::Short(v) => (*v).into(),
        Value::Int(v) => (*v).into(),
        Value::Long(v) => (*v).into(),
        Value::Float(v) => serde_json::Number::from_f64(f64::from(*v))
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Double(v) => serde_json::Number::from_f64(*v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(v) => v.as_str().into(),
        Value::Data(bytes) => hex(bytes).into(),
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Data(bytes) if bytes.is_empty() => "<empty>".to_string(),
        Value::Data(bytes) => hex(bytes),
        other => other.to_string(),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
