//! link-cli: talk to ledger nodes from the terminal.
//!
//! ## Usage
//!
//! ```bash
//! # Discover peers through the configured node finder
//! link-cli --config link.toml discover
//!
//! # Ask one node about itself
//! link-cli --node wss://node.example/rpc node-info
//!
//! # Print the first 10 atoms matching a query
//! link-cli --node wss://node.example/rpc atoms '{"address": "..."}' --limit 10
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use link_telemetry::{init_logging, TelemetryConfig};
use node_client::{Atom, AtomQuery, ClientConfig, NodeClient, RpcChannel};
use serde_json::Value;
use tracing::debug;

/// Ledger node command-line client
#[derive(Parser, Debug)]
#[command(name = "link-cli")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Node WebSocket endpoint
    #[arg(long, global = true, default_value = "ws://localhost:8080/rpc")]
    node: String,

    /// TOML client configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Find peers via the node finder and the seed's live peers
    Discover,
    /// Show what the node reports about itself
    NodeInfo,
    /// List the node's live peers
    LivePeers,
    /// Stream atoms matching a JSON query
    Atoms {
        /// Query object, e.g. '{"address": "..."}'
        query: String,
        /// Stop after this many atoms
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// Submit an atom read from a JSON file and follow it
    Submit {
        /// File holding the atom payload
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut telemetry = TelemetryConfig::from_env();
    if args.verbose {
        telemetry = telemetry.with_level("debug");
    }
    init_logging(&telemetry).context("failed to initialize logging")?;

    let config = match &args.config {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => ClientConfig::default(),
    };
    let client = NodeClient::new(config).context("invalid client configuration")?;

    match args.command {
        Command::Discover => discover(&client).await,
        Command::NodeInfo => {
            let info = channel(&client, &args.node)?.get_self().await?;
            print_json(&serde_json::to_value(info)?)
        }
        Command::LivePeers => {
            let peers = channel(&client, &args.node)?.get_live_peers().await?;
            for peer in peers {
                println!("{}", peer.ip);
            }
            Ok(())
        }
        Command::Atoms { query, limit } => {
            let query: Value = serde_json::from_str(&query).context("query is not valid JSON")?;
            stream_atoms(&channel(&client, &args.node)?, AtomQuery::new(query), limit).await
        }
        Command::Submit { file } => submit(&channel(&client, &args.node)?, &file).await,
    }
}

fn channel(client: &NodeClient, node: &str) -> Result<RpcChannel> {
    client
        .channel_for(node)
        .with_context(|| format!("bad node endpoint {}", node))
}

async fn discover(client: &NodeClient) -> Result<()> {
    let peers = client
        .find_peers()
        .await
        .context("discovery needs discovery.node_finder_url in --config")?;
    for peer in peers {
        match peer.endpoint() {
            Ok(endpoint) => println!("{}", endpoint),
            Err(_) => println!("{}", peer),
        }
    }
    Ok(())
}

async fn stream_atoms(channel: &RpcChannel, query: AtomQuery, limit: usize) -> Result<()> {
    let mut atoms = channel.get_atoms(query);
    let mut printed = 0;
    while printed < limit {
        match atoms.next().await {
            Some(atom) => {
                let atom = atom.context("atom stream failed")?;
                debug!(received_at_ms = atom.received_at_ms, "Atom received");
                print_json(&atom.payload)?;
                printed += 1;
            }
            None => break,
        }
    }
    Ok(())
}

async fn submit(channel: &RpcChannel, file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let payload: Value = serde_json::from_str(&raw).context("atom file is not valid JSON")?;
    let Some(atom) = Atom::from_payload(payload) else {
        bail!("atom payload has no hid");
    };

    let mut updates = channel.submit_atom(atom);
    let mut stored = false;
    while let Some(update) = updates.next().await {
        match &update.message {
            Some(message) => println!("{} {}: {}", update.atom_id, update.state, message),
            None => println!("{} {}", update.atom_id, update.state),
        }
        stored = update.state == node_client::AtomSubmissionState::Stored;
    }
    if !stored {
        bail!("atom was not stored");
    }
    Ok(())
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
