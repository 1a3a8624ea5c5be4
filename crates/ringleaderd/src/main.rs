//! `ringleaderd`, the ringleader daemon.
//!
//! One binary runs either role. A master owns the membership, renders a new
//! ring version for every accepted change and pushes it to its slaves; a
//! slave stores whatever its master pushes and reports its state.
//!
//! # Usage
//!
//! ```text
//! ringleaderd init -d /var/lib/ringleader           # write an empty version-1 ring
//! ringleaderd start -c ringleader.toml              # run the role from [node] role
//! ringleaderd master -c ringleader.toml             # serve RingMgr
//! ringleaderd master --slave 10.0.0.2:8444 --slave 10.0.0.3:8444
//! ringleaderd slave -l 0.0.0.0:8444 -d ./slave1     # serve RingDist
//! ringleaderd status 10.0.0.2:8444                  # one slave's version and health
//! ringleaderd cluster 10.0.0.1:8443                 # every slave, via the master
//! ringleaderd revert 10.0.0.1:8443 41               # make version 41 current again
//! ringleaderd sync 10.0.0.1:8443                    # re-push to drifted slaves
//! ```

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ringleader_cluster::{
    AdmissionFilters, DistributionClient, DistributionConfig, RingDist, RingMgr, RingService,
};
use ringleader_net::{RingDistClient, RingMgrClient, TcpTransport, serve};
use ringleader_ring::PostcardCodec;
use ringleader_store::{FileBlobStore, RingStore};
use ringleader_types::{RingStatus, StatusRequest};
use tokio::net::TcpListener;
use tracing::info;

use config::{CliConfig, Role};

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "ringleaderd", version, about = "Ring membership master and replica daemon")]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true, env = "RINGLEADER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the role named by `node.role` in the config file.
    Start {
        #[command(flatten)]
        node: NodeArgs,
    },

    /// Run as the master (RingMgr).
    Master {
        #[command(flatten)]
        node: NodeArgs,

        /// Slave endpoint to distribute rings to. Can be repeated.
        #[arg(short, long)]
        slave: Vec<String>,

        /// CIDR range node addresses must fall in. Can be repeated.
        #[arg(long)]
        net_filter: Vec<String>,

        /// Tier nodes must carry. Can be repeated.
        #[arg(long)]
        tier_filter: Vec<String>,
    },

    /// Run as a slave (RingDist).
    Slave {
        #[command(flatten)]
        node: NodeArgs,
    },

    /// Write an empty version-1 ring into the ring directory.
    Init {
        /// Override the ring directory.
        #[arg(short = 'd', long)]
        ring_dir: Option<PathBuf>,

        /// Replica count recorded in the ring.
        #[arg(long)]
        replicas: Option<u8>,

        /// Vnodes for a node of base capacity.
        #[arg(long)]
        vnodes_per_node: Option<u16>,
    },

    /// Show one slave's version, ring and builder health.
    Status {
        /// Slave address (`host:port`).
        addr: String,
    },

    /// Show every slave's status as seen by the master.
    Cluster {
        /// Master address (`host:port`).
        addr: String,
    },

    /// Make a retained version current on the master and all slaves.
    Revert {
        /// Master address (`host:port`).
        addr: String,
        version: u64,
    },

    /// Re-push the current ring to slaves whose version differs.
    Sync {
        /// Master address (`host:port`).
        addr: String,
    },
}

#[derive(clap::Args)]
struct NodeArgs {
    /// Override the ring directory.
    #[arg(short = 'd', long)]
    ring_dir: Option<PathBuf>,

    /// Override the listen address (e.g. "127.0.0.1:8444").
    #[arg(short, long)]
    listen_addr: Option<String>,
}

impl NodeArgs {
    fn apply(self, config: &mut CliConfig) {
        if let Some(dir) = self.ring_dir {
            config.node.ring_dir = dir;
        }
        if let Some(addr) = self.listen_addr {
            config.node.listen_addr = addr;
        }
    }
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CliConfig::load(cli.config.as_deref()).context("failed to load config")?;

    setup_tracing(&config.log.level);

    match cli.command {
        Commands::Start { node } => {
            node.apply(&mut config);
            match config.node.role {
                Role::Master => cmd_master(config).await,
                Role::Slave => cmd_slave(config).await,
            }
        }
        Commands::Master {
            node,
            slave,
            net_filter,
            tier_filter,
        } => {
            // CLI args override config file values.
            node.apply(&mut config);
            config.node.role = Role::Master;
            if !slave.is_empty() {
                config.master.slaves = slave;
            }
            if !net_filter.is_empty() {
                config.master.net_filter = net_filter;
            }
            if !tier_filter.is_empty() {
                config.master.tier_filter = tier_filter;
            }
            cmd_master(config).await
        }
        Commands::Slave { node } => {
            node.apply(&mut config);
            config.node.role = Role::Slave;
            cmd_slave(config).await
        }
        Commands::Init {
            ring_dir,
            replicas,
            vnodes_per_node,
        } => {
            if let Some(dir) = ring_dir {
                config.node.ring_dir = dir;
            }
            if let Some(r) = replicas {
                config.master.replicas = r;
            }
            if let Some(v) = vnodes_per_node {
                config.master.vnodes_per_node = v;
            }
            cmd_init(&config).await
        }
        Commands::Status { addr } => cmd_status(&addr).await,
        Commands::Cluster { addr } => cmd_cluster(&addr).await,
        Commands::Revert { addr, version } => {
            let status = RingMgrClient::new(addr).revert_ring(version).await?;
            print_ring_status(&status)
        }
        Commands::Sync { addr } => {
            let status = RingMgrClient::new(addr).sync_slaves().await?;
            print_ring_status(&status)
        }
    }
}

/// Initialize the `tracing` subscriber with the given level filter.
///
/// Respects `RUST_LOG` env var if set, otherwise uses the config value.
fn setup_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn open_store(config: &CliConfig) -> Result<Arc<RingStore>> {
    let blobs = FileBlobStore::new(&config.node.ring_dir).with_context(|| {
        format!(
            "failed to open ring directory {}",
            config.node.ring_dir.display()
        )
    })?;
    Ok(Arc::new(RingStore::new(
        Arc::new(blobs),
        Arc::new(PostcardCodec),
        config.node.retain_versions,
    )))
}

/// Serve `service` on the configured address until Ctrl-C.
async fn serve_until_shutdown(config: &CliConfig, service: RingService) -> Result<()> {
    let listener = TcpListener::bind(&config.node.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.node.listen_addr))?;

    tokio::select! {
        result = serve(listener, Arc::new(service)) => {
            result.context("listener failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
    }
    Ok(())
}

// -----------------------------------------------------------------------
// ringleaderd master
// -----------------------------------------------------------------------

async fn cmd_master(config: CliConfig) -> Result<()> {
    config.validate()?;
    info!(
        ring_dir = %config.node.ring_dir.display(),
        listen_addr = %config.node.listen_addr,
        slaves = config.master.slaves.len(),
        "starting ringleader master"
    );

    let filters = AdmissionFilters::parse(&config.master.net_filter, &config.master.tier_filter)
        .context("invalid admission filters")?;
    let store = open_store(&config)?;
    let timeout = config.slave_timeout();
    let dist = Arc::new(DistributionClient::new(
        DistributionConfig {
            slaves: config.master.slaves.clone(),
            timeout,
        },
        Arc::new(TcpTransport::new().with_connect_timeout(timeout)),
    ));

    let mgr = Arc::new(
        RingMgr::start(store, Arc::new(filters), dist)
            .await
            .context("master startup failed")?,
    );
    info!(version = mgr.version().await, "master ready");

    let result = serve_until_shutdown(&config, RingService::Master(mgr.clone())).await;
    mgr.shutdown();
    result
}

// -----------------------------------------------------------------------
// ringleaderd slave
// -----------------------------------------------------------------------

async fn cmd_slave(config: CliConfig) -> Result<()> {
    config.validate()?;
    info!(
        ring_dir = %config.node.ring_dir.display(),
        listen_addr = %config.node.listen_addr,
        "starting ringleader slave"
    );

    let store = open_store(&config)?;
    let dist = RingDist::open(store)
        .await
        .context("failed to open slave ring directory")?;
    info!(version = dist.version().await, "slave ready");

    serve_until_shutdown(&config, RingService::Slave(Arc::new(dist))).await
}

// -----------------------------------------------------------------------
// ringleaderd init
// -----------------------------------------------------------------------

async fn cmd_init(config: &CliConfig) -> Result<()> {
    config.validate()?;
    let store = open_store(config)?;
    let version = RingMgr::init_store(
        &store,
        config.master.replicas,
        config.master.vnodes_per_node,
    )
    .await
    .context("failed to initialize ring directory")?;
    println!(
        "ring directory {} at version {version}",
        config.node.ring_dir.display()
    );
    Ok(())
}

// -----------------------------------------------------------------------
// Operator commands
// -----------------------------------------------------------------------

async fn cmd_status(addr: &str) -> Result<()> {
    let status = TcpTransport::new()
        .status(
            addr,
            StatusRequest {
                ring: true,
                builder: true,
            },
        )
        .await
        .with_context(|| format!("failed to query {addr}"))?;

    println!("Slave {addr}");
    println!("  version: {}", status.version);
    println!("  master:  {}", display_or_none(&status.master));
    println!("  ring:    {}", status.ringstats);
    println!("  builder: {}", status.builderstats);
    Ok(())
}

async fn cmd_cluster(addr: &str) -> Result<()> {
    let client = RingMgrClient::new(addr);
    let master = client.get_version().await?;
    let reports = client.cluster_status().await?;

    println!("Master {addr} at version {}", master.version);
    println!("Slaves: {}", reports.len());
    for report in &reports {
        match &report.status {
            Ok(s) if s.version == master.version => {
                println!("  {} version={} in sync", report.slave, s.version);
            }
            Ok(s) => println!("  {} version={} DRIFTED", report.slave, s.version),
            Err(e) => println!("  {} unreachable: {e}", report.slave),
        }
    }
    Ok(())
}

fn print_ring_status(status: &RingStatus) -> Result<()> {
    println!(
        "version {}: {}",
        status.version,
        display_or_none(&status.msg)
    );
    for slave in &status.slaves {
        if slave.accepted() {
            println!("  {} ok", slave.slave);
        } else {
            println!("  {} failed: {}", slave.slave, slave.error);
        }
    }
    anyhow::ensure!(status.status, "operation did not succeed");
    Ok(())
}

fn display_or_none(s: &str) -> &str {
    if s.is_empty() { "-" } else { s }
}
