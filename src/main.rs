//! OGC Secure Proxy
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────────────┐
//!                    │                      OGC SECURE PROXY                         │
//!                    │                                                              │
//!   Client request   │  ┌────────┐   ┌──────────┐   ┌─────────┐   ┌─────────────┐   │
//!   ─────────────────┼─▶│  http  │──▶│   ogc    │──▶│ policy  │──▶│   spatial   │   │
//!                    │  │ server │   │normalize │   │authorize│   │  evaluate   │   │
//!                    │  └────────┘   └──────────┘   └────┬────┘   └──────┬──────┘   │
//!                    │                                   │ snapshot      │          │
//!                    │                              ┌────┴─────┐   ┌─────▼──────┐   │
//!                    │                              │catalogue │   │  upstream  │───┼──▶ Origin
//!                    │                              │ source   │   │  dispatch  │◀──┼─── WMS/WFS/CSW
//!                    │                              └──────────┘   └─────┬──────┘   │
//!   Client response  │  ┌──────────────────────────────────────┐        │          │
//!   ◀────────────────┼──│ response: camouflage, count, masking │◀───────┘          │
//!                    │  └──────────────────────────────────────┘                   │
//!                    │                                                              │
//!                    │  audit queue → worker → sink     admin API     metrics       │
//!                    └──────────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;

use ogc_secure_proxy::config::{load_config, ProxyConfig};
use ogc_secure_proxy::lifecycle;
use ogc_secure_proxy::observability::logging;

#[derive(Parser)]
#[command(name = "ogc-secure-proxy", version, about = "Access-controlled proxy for OGC web services")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?args.config,
        bind_address = %config.listener.bind_address,
        "ogc-secure-proxy starting"
    );

    lifecycle::start(config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
