//! Command-line parsing.

use std::path::PathBuf;

use anyhow::{Context, bail};
use serde_json::Value;

#[derive(Debug, Default, PartialEq)]
pub struct ProbeArgs {
    pub host: Option<String>,
    pub config: Option<PathBuf>,
    pub origin: Option<String>,
    pub msg_type: Option<String>,
    pub fields: Vec<(String, Value)>,
    pub timeout_ms: Option<u64>,
    pub watch: bool,
    pub events: Vec<String>,
}

#[derive(Debug, PartialEq)]
pub enum Command {
    Run(ProbeArgs),
    Help,
    Version,
}

pub fn print_usage() {
    eprintln!("Usage: hostlink-probe [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --host <ID>          Native host name (overrides the config file)");
    eprintln!("  --config <PATH>      TOML client configuration");
    eprintln!("  --origin <ORIGIN>    Extension origin checked against allowed_origins");
    eprintln!("  --type <TYPE>        Send one request of this type and print the response");
    eprintln!("  --field <KEY=VALUE>  Request field; VALUE is parsed as JSON, else a string");
    eprintln!("  --timeout <MS>       Request timeout in milliseconds");
    eprintln!("  --watch              Print events until Ctrl-C");
    eprintln!("  --event <NAME>       Extra push message type to print while watching");
    eprintln!("  --version            Print version and exit");
    eprintln!("  --help               Print this help message");
}

pub fn parse(args: impl IntoIterator<Item = String>) -> anyhow::Result<Command> {
    let mut out = ProbeArgs::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let mut value = |name: &str| {
            args.next()
                .with_context(|| format!("{name} requires a value"))
        };
        match arg.as_str() {
            "--help" | "-h" => return Ok(Command::Help),
            "--version" => return Ok(Command::Version),
            "--host" => out.host = Some(value("--host")?),
            "--config" => out.config = Some(PathBuf::from(value("--config")?)),
            "--origin" => out.origin = Some(value("--origin")?),
            "--type" => out.msg_type = Some(value("--type")?),
            "--field" => out.fields.push(parse_field(&value("--field")?)?),
            "--timeout" => {
                let raw = value("--timeout")?;
                let ms = raw
                    .parse()
                    .with_context(|| format!("invalid --timeout {raw:?}"))?;
                out.timeout_ms = Some(ms);
            }
            "--watch" => out.watch = true,
            "--event" => out.events.push(value("--event")?),
            other => bail!("unknown option: {other}"),
        }
    }

    if out.host.is_none() && out.config.is_none() {
        bail!("either --host or --config is required");
    }
    if !out.fields.is_empty() && out.msg_type.is_none() {
        bail!("--field needs --type");
    }
    Ok(Command::Run(out))
}

fn parse_field(raw: &str) -> anyhow::Result<(String, Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("invalid --field {raw:?}, expected KEY=VALUE");
    };
    if key.is_empty() {
        bail!("invalid --field {raw:?}, empty key");
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
