//! `cluster-client`: command-line access to a cluster through the balancer.
//!
//! ```text
//! cluster-client --endpoints 10.0.0.1:2379,10.0.0.2:2379 get foo
//! cluster-client --config client.toml watch
//! ```

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;

use cluster_client::config::{load_config, ClientConfig};
use cluster_client::lifecycle::signals::wait_for_shutdown;
use cluster_client::observability::{logging, metrics};
use cluster_client::{BalancerEvent, Client, RequestContext};

#[derive(Parser)]
#[command(name = "cluster-client")]
#[command(about = "Talk to a key-value cluster through a failover-aware client", long_about = None)]
struct Cli {
    /// Comma-separated member addresses; overrides the config file.
    #[arg(short, long, value_delimiter = ',')]
    endpoints: Vec<String>,

    /// TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dial timeout in milliseconds.
    #[arg(long)]
    dial_timeout_ms: Option<u64>,

    /// Refuse members running an old cluster version.
    #[arg(long)]
    reject_old_cluster: bool,

    /// Serve reads from any member without leader confirmation.
    #[arg(long)]
    serializable: bool,

    /// Per-command timeout in milliseconds.
    #[arg(long, default_value_t = 5000)]
    command_timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read a key
    Get { key: String },
    /// Write a key
    Put { key: String, value: String },
    /// Delete a key
    Del { key: String },
    /// Show the status of every configured member
    Status,
    /// Stay connected, follow the config file and print balancer events
    Watch,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = build_config(&cli)?;

    logging::init(Some(config.observability.log_level.as_str()));
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    tracing::debug!(
        endpoints = ?config.endpoints,
        dial_timeout_ms = config.dial_timeout().as_millis() as u64,
        reject_old_cluster = config.reject_old_cluster,
        "Configuration loaded"
    );

    let client = Client::new(config).await?;
    let ctx = RequestContext::with_timeout(Duration::from_millis(cli.command_timeout_ms));

    let output = match cli.command {
        Commands::Get { key } => {
            let kv = client.get(&ctx, &key, cli.serializable).await?;
            json!({ "key": key, "kv": kv })
        }
        Commands::Put { key, value } => {
            let revision = client.put(&ctx, &key, &value).await?;
            json!({ "key": key, "revision": revision })
        }
        Commands::Del { key } => {
            let deleted = client.delete(&ctx, &key).await?;
            json!({ "key": key, "deleted": deleted })
        }
        Commands::Status => status_report(&client).await?,
        Commands::Watch => {
            watch(&client, cli.config.as_deref()).await?;
            Value::Null
        }
    };

    if !output.is_null() {
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    client.close();
    Ok(())
}

/// Config file (if any) overlaid with command-line flags.
fn build_config(cli: &Cli) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ClientConfig::default(),
    };

    if !cli.endpoints.is_empty() {
        config.endpoints = cli.endpoints.clone();
    }
    if let Some(ms) = cli.dial_timeout_ms {
        config.dial_timeout_ms = ms;
    }
    if cli.reject_old_cluster {
        config.reject_old_cluster = true;
    }
    Ok(config)
}

async fn status_report(client: &Client) -> Result<Value, Box<dyn std::error::Error>> {
    let members = client
        .member_statuses()
        .await?
        .into_iter()
        .map(|member| match member.status {
            Ok(status) => json!({
                "endpoint": member.endpoint,
                "health": member.health.to_string(),
                "status": status,
            }),
            Err(e) => json!({
                "endpoint": member.endpoint,
                "health": member.health.to_string(),
                "error": e.to_string(),
            }),
        })
        .collect::<Vec<_>>();

    Ok(json!({
        "active": client.active_endpoint(),
        "members": members,
    }))
}

async fn watch(client: &Client, config_path: Option<&std::path::Path>) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        client.watch_config(path)?;
    }

    let mut events = client.subscribe();
    println!("watching {:?} (active: {:?})", client.endpoints(), client.active_endpoint());

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            event = events.recv() => match event {
                Ok(BalancerEvent::Closed) => break,
                Ok(event) => println!("{}", describe(&event)),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event stream lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

fn describe(event: &BalancerEvent) -> String {
    match event {
        BalancerEvent::Connected { endpoint } => format!("connected to {}", endpoint),
        BalancerEvent::Failover { from, reason } => format!("failover from {}: {}", from, reason),
        BalancerEvent::EndpointsReplaced { added, removed } => {
            format!("endpoints replaced (added {:?}, removed {:?})", added, removed)
        }
        BalancerEvent::Exhausted { error } => format!("all endpoints failed: {}", error),
        BalancerEvent::Closed => "closed".to_string(),
    }
}
