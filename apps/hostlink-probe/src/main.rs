//! hostlink-probe: connect to a native messaging host, send one request,
//! and optionally watch the events it pushes.

mod args;

use std::time::Duration;

use anyhow::{Context, bail};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hostlink_connection::types::{
    EVENT_CONNECT, EVENT_DISCONNECT, EVENT_PROGRESS, EVENT_RECONNECT, EVENT_RECONNECT_FAILED,
};
use hostlink_connection::{ClientConfig, ClientEvent, NativeHostTransport, RpcClient};
use hostlink_protocol::Message;

use args::{Command, ProbeArgs};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = match args::parse(std::env::args().skip(1)) {
        Ok(Command::Run(args)) => args,
        Ok(Command::Help) => {
            args::print_usage();
            return Ok(());
        }
        Ok(Command::Version) => {
            println!("hostlink-probe {VERSION}");
            return Ok(());
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            args::print_usage();
            std::process::exit(2);
        }
    };

    // Logs go to stderr; stdout carries JSON only.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    run(args).await
}

async fn run(args: ProbeArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };
    if let Some(host) = args.host {
        config.host_id = host;
    }
    if let Some(origin) = args.origin {
        config.transport.origin = Some(origin);
    }

    let client = RpcClient::native(config).context("invalid client configuration")?;
    info!(host = %client.config().host_id, version = VERSION, "probing native host");

    if args.watch {
        watch_events(&client, &args.events);
    }

    if !client.connect().await {
        bail!(
            "could not connect to {}: {}",
            client.config().host_id,
            client.last_error().unwrap_or_else(|| "unknown error".into())
        );
    }

    if let Some(msg_type) = args.msg_type {
        let msg = args
            .fields
            .into_iter()
            .fold(Message::new(msg_type), |msg, (key, value)| msg.with_field(key, value));
        let response = match args.timeout_ms {
            Some(ms) => {
                client
                    .send_message_with_timeout(msg, Duration::from_millis(ms))
                    .await?
            }
            None => client.send_message(msg).await?,
        };
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else if !args.watch {
        let health = client.health();
        println!(
            "{}",
            json!({
                "host": client.config().host_id,
                "state": format!("{:?}", health.state),
                "lastSuccessAt": health.last_success_at,
            })
        );
    }

    if args.watch {
        info!("watching events, press Ctrl-C to stop");
        tokio::signal::ctrl_c().await?;
    }

    client.disconnect();
    Ok(())
}

fn watch_events(client: &RpcClient<NativeHostTransport>, extra: &[String]) {
    let names = [
        EVENT_CONNECT,
        EVENT_DISCONNECT,
        EVENT_RECONNECT,
        EVENT_RECONNECT_FAILED,
        EVENT_PROGRESS,
    ];
    for name in names.iter().copied().chain(extra.iter().map(String::as_str)) {
        client.add_event_listener(name, print_event);
    }
}

fn print_event(event: &ClientEvent) {
    let line = match event {
        ClientEvent::Progress(msg) | ClientEvent::Push(msg) => json!({
            "event": event.name(),
            "message": msg,
        }),
        ClientEvent::Disconnect { intentional } => json!({
            "event": event.name(),
            "intentional": intentional,
        }),
        ClientEvent::Reconnect { attempts } | ClientEvent::ReconnectFailed { attempts } => json!({
            "event": event.name(),
            "attempts": attempts,
        }),
        ClientEvent::Connect => json!({ "event": event.name() }),
    };
    println!("{line}");
}
