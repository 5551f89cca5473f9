//! Chat and feed hub server
//!
//! Run with: cargo run --example hub_server -- [OPTIONS]
//!
//! Options:
//!   --addr HOST:PORT       listen address (default 0.0.0.0:3000)
//!   --feed-interval SECS   seconds between feed payloads (default 5)
//!   --feed-budget SECS     seconds a feed subscription lasts (default 60)
//!   --no-echo              chat senders do not receive their own messages
//!
//! Chat, from two or more terminals:
//!   websocat ws://127.0.0.1:3000/ws
//!
//! Feed:
//!   websocat ws://127.0.0.1:3000/ws/subscribe/order-book

use std::net::SocketAddr;
use std::time::Duration;

use wshub::{HubConfig, HubServer, SenderPolicy, ServerConfig};

const USAGE: &str = "\
usage: hub_server [--addr HOST:PORT] [--feed-interval SECS] [--feed-budget SECS] [--no-echo]";

fn build_config(mut args: impl Iterator<Item = String>) -> Result<ServerConfig, String> {
    let mut server = ServerConfig::default();
    let mut hub = HubConfig::default();

    while let Some(flag) = args.next() {
        let mut value = |name: &str| args.next().ok_or_else(|| format!("{} needs a value", name));

        match flag.as_str() {
            "--addr" => {
                let raw = value("--addr")?;
                let addr: SocketAddr = raw
                    .parse()
                    .map_err(|_| format!("'{}' is not a HOST:PORT address", raw))?;
                server = server.bind(addr);
            }
            "--feed-interval" => hub = hub.feed_interval(seconds(&value("--feed-interval")?)?),
            "--feed-budget" => hub = hub.feed_budget(seconds(&value("--feed-budget")?)?),
            "--no-echo" => hub = hub.sender_policy(SenderPolicy::Exclude),
            other => return Err(format!("unknown option '{}'", other)),
        }
    }

    let config = server.hub(hub);
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn seconds(raw: &str) -> Result<Duration, String> {
    raw.parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
        .ok_or_else(|| format!("'{}' is not a number of seconds", raw))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = match build_config(args.into_iter()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("hub_server: {}", e);
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wshub=debug".parse()?)
                .add_directive("hub_server=debug".parse()?),
        )
        .init();

    tracing::info!(
        addr = %config.bind_addr,
        chat = %config.chat_path,
        feed = %config.feed_path,
        feed_interval = ?config.hub.feed_job.interval,
        feed_budget = ?config.hub.feed_job.budget,
        "Starting hub"
    );

    let server = HubServer::new(config);
    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    let stats = server.hub().stats().snapshot();
    tracing::info!(
        chat_connections = stats.chat_connections,
        feed_connections = stats.feed_connections,
        messages = stats.messages_received,
        feed_ticks = stats.feed_ticks,
        uptime = ?stats.uptime,
        "Hub stopped"
    );

    Ok(())
}
