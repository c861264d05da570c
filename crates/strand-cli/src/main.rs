//! STRAND protocol CLI.
//!
//! A thin bootstrap binary over `strand-core::Node`: start a listener,
//! dial a peer, inspect status, or mint a new pre-shared seed.

mod config;
mod progress;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

use config::Config;
use progress::{format_bytes, WaitSpinner};
use strand_core::node::NodeIdentity;
use strand_core::{Node, NodeConfig};

/// STRAND - peer-to-peer secure transport with pre-shared-seed authentication
#[derive(Parser)]
#[command(name = "strand")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, default_value = "~/.config/strand/config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen for incoming handshakes and hold established sessions open
    Listen,

    /// Dial a peer and establish a session
    Connect {
        /// Peer address, e.g. 203.0.113.5:40000
        #[arg(required = true)]
        addr: SocketAddr,

        /// Peer's 32-byte node id, hex-encoded
        #[arg(required = true)]
        peer_node_id: String,
    },

    /// Show the resolved configuration
    Status,

    /// Generate a new pre-shared seed for out-of-band distribution
    Keygen {
        /// Output file for the shared seed (defaults to the configured path)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(if cli.verbose { "debug" } else { "info" })
        .init();

    let config_path = PathBuf::from(shellexpand_home(&cli.config));
    let config = if config_path.exists() {
        Config::load(&config_path)?
    } else if config_path == Config::default_path() {
        Config::load_or_default()?
    } else {
        Config::load(&config_path)?
    };

    config.validate()?;

    match cli.command {
        Commands::Listen => listen(&config).await?,
        Commands::Connect { addr, peer_node_id } => connect(addr, peer_node_id, &config).await?,
        Commands::Status => show_status(&config).await?,
        Commands::Keygen { output } => generate_shared_seed(output, &config)?,
    }

    Ok(())
}

fn shellexpand_home(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).to_string_lossy().into_owned();
        }
    }
    path.to_string()
}

fn node_config(config: &Config) -> anyhow::Result<NodeConfig> {
    let listen_addr = config.parse_listen_addr()?;
    let shared_seed = config.load_shared_seed()?;
    let node_id = config
        .parse_node_id()?
        .unwrap_or_else(|| NodeIdentity::random().node_id());
    Ok(NodeConfig::new(listen_addr, shared_seed, node_id))
}

/// Start a node and hold it open for inbound handshakes until interrupted.
async fn listen(config: &Config) -> anyhow::Result<()> {
    let node = Node::new(node_config(config)?);
    node.start().await?;

    println!("node id:    {}", hex::encode(node.node_id()));
    println!("listening:  {}", node.listen_addr().await?);
    println!("\nwaiting for peers (Ctrl+C to stop)...");

    let accept_node = node.clone();
    let accept_task = tokio::spawn(async move {
        loop {
            match accept_node.accept().await {
                Ok(session_id) => println!("session established: {}", hex::encode(session_id)),
                Err(_) => break,
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    println!("\nshutting down...");
    node.stop().await?;
    accept_task.abort();

    Ok(())
}

/// Dial a peer and hold the resulting session open until interrupted.
async fn connect(addr: SocketAddr, peer_node_id_hex: String, config: &Config) -> anyhow::Result<()> {
    let peer_node_id: [u8; 32] = hex::decode(&peer_node_id_hex)?
        .try_into()
        .map_err(|_| anyhow::anyhow!("peer node id must be exactly 32 bytes"))?;

    let node = Node::new(node_config(config)?);
    node.start().await?;

    let spinner = WaitSpinner::start(format!("handshaking with {addr}..."));
    let session_id = match node.connect(addr, peer_node_id).await {
        Ok(id) => id,
        Err(e) => {
            spinner.fail(format!("handshake failed: {e}"));
            node.stop().await?;
            return Err(e.into());
        }
    };
    spinner.succeed(format!("session established: {}", hex::encode(session_id)));

    println!("\nsession active (Ctrl+C to close)...");
    tokio::signal::ctrl_c().await?;
    println!("\nclosing session...");
    node.stop().await?;

    Ok(())
}

/// Print the resolved configuration.
async fn show_status(config: &Config) -> anyhow::Result<()> {
    println!("STRAND CLI");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("configuration:");
    println!("  listen:      {}", config.network.listen_addr);
    println!(
        "  shared seed: {}",
        config.node.shared_seed_file.display()
    );
    match config.parse_node_id()? {
        Some(id) => println!("  node id:     {} (configured)", hex::encode(id)),
        None => println!("  node id:     (generated fresh on each start)"),
    }
    println!("  log level:   {}", config.logging.level);

    if let Ok(seed) = config.load_shared_seed() {
        println!("\nshared seed: {} available", format_bytes(seed.len() as u64));
    } else {
        println!("\nshared seed: not found at configured path (run `strand keygen` first)");
    }

    Ok(())
}

/// Generate a fresh pre-shared seed and write it to disk.
fn generate_shared_seed(output: Option<String>, config: &Config) -> anyhow::Result<()> {
    let seed = strand_crypto::random::random_32()?;

    let output_path = output
        .map(PathBuf::from)
        .unwrap_or_else(|| config.node.shared_seed_file.clone());

    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&output_path, seed)?;

    println!("generated a new {}-byte shared seed", seed.len());
    println!("saved to: {}", output_path.display());
    println!("\nshare this file with your peer out of band -- it authenticates every handshake.");

    Ok(())
}
