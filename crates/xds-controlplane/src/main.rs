//! `xds-controlplane` binary.
//!
//! Serves the Aggregated Discovery Service from an in-memory store, seeded
//! from the configuration file, and optionally the debug HTTP API.
//!
//! ```bash
//! xds-controlplane --config controlplane.toml --delta --debug-addr 127.0.0.1:9901
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use xds_controlplane::config::ControlPlaneConfig;
use xds_controlplane::prelude::*;
use xds_controlplane::seed_cache;

/// xDS control plane.
#[derive(Debug, Parser)]
#[command(name = "xds-controlplane", version, about)]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// gRPC listen address.
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Serve incremental (delta) streams.
    #[arg(long)]
    delta: bool,

    /// Serve the debug API on this address.
    #[arg(long)]
    debug_addr: Option<SocketAddr>,

    /// Accept streams from nodes with no resources in the store.
    #[arg(long)]
    allow_unknown_nodes: bool,

    /// Identifier attached to every response.
    #[arg(long)]
    control_plane_id: Option<String>,
}

impl Args {
    fn load_config(&self) -> anyhow::Result<ControlPlaneConfig> {
        let mut config = match &self.config {
            Some(path) => ControlPlaneConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ControlPlaneConfig::default(),
        };

        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if self.delta {
            config.server.enable_delta = true;
        }
        if let Some(addr) = self.debug_addr {
            config.debug_api.enabled = true;
            config.debug_api.addr = addr;
        }
        if self.allow_unknown_nodes {
            config.server.require_known_node = false;
        }
        if let Some(id) = &self.control_plane_id {
            config.server.control_plane_id = Some(id.clone());
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.load_config()?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    info!("{}", xds_controlplane::version::version_string());

    let cache = Arc::new(ShardedCache::new());
    seed_cache(&cache, &config.resources).context("seeding store")?;

    let server = XdsServerBuilder::from_config(config.server_config())
        .cache(Arc::clone(&cache))
        .build()
        .context("building server")?;

    info!(
        listen = %config.listen,
        sotw = server.config().enable_sotw,
        delta = server.config().enable_delta,
        debug_api = ?server.config().debug_api.enabled.then_some(server.config().debug_api.addr),
        "control plane ready"
    );

    server.serve(config.listen).await.context("serving")?;
    Ok(())
}
