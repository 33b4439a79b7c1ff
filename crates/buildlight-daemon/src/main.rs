//! Buildlight Daemon - Main entry point
//!
//! Drives USB build lights from the build API and optionally serves a small
//! status API.

mod api;
mod auth;
mod config;
mod server;
mod state;

use anyhow::{Context, Result};
use buildlight_core::{BuildBindings, Generation};
use buildlight_sync::{BuildApi, DeviceRegistry, Reconciler};
use buildlight_usb::{BlinkStickTransport, DeviceTransport, VirtualTransport};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "buildlight")]
#[command(about = "Shows CI build status on USB indicator lights")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "buildlight.toml")]
    config: PathBuf,

    /// Bind address for the status API (overrides web.bind)
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Use a virtual device with this identity instead of USB hardware (repeatable)
    #[arg(long = "virtual", value_name = "IDENTITY")]
    virtual_devices: Vec<String>,

    /// List attached devices and their bindings, then exit
    #[arg(long)]
    list: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Buildlight v{}", env!("CARGO_PKG_VERSION"));

    let mut config = config::load_config(&args.config)?;

    if let Some(bind) = args.bind {
        match config.web.as_mut() {
            Some(web) => web.bind = bind,
            None => warn!("--bind given but no [web] section is configured, status API stays off"),
        }
    }

    info!(
        api = %config.api.address,
        devices = config.devices.len(),
        policy = ?config.sync.on_exhausted,
        "Configuration loaded"
    );

    if args.virtual_devices.is_empty() {
        run(Arc::new(BlinkStickTransport::new()), config, args.list).await
    } else {
        info!(devices = ?args.virtual_devices, "Using virtual devices");
        let transport = VirtualTransport::with_devices(args.virtual_devices);
        run(Arc::new(transport), config, args.list).await
    }
}

async fn run<T: DeviceTransport>(transport: Arc<T>, config: Config, list: bool) -> Result<()> {
    let bindings = Arc::new(config.bindings());

    if list {
        return list_devices(transport, &bindings).await;
    }

    let source = BuildApi::new(config.api.address.clone(), config.request_timeout())
        .context("Failed to create build API client")?;
    let mut reconciler = Reconciler::new(transport, bindings, Arc::new(source), config.to_settings());

    if let Some(web) = config.web.clone() {
        let state = state::AppState::new(reconciler.board(), web);
        tokio::spawn(async move {
            if let Err(e) = server::run(state).await {
                error!(error = %e, "Status API failed");
            }
        });
    }

    tokio::select! {
        result = reconciler.run() => result.context("Build light engine stopped")?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    Ok(())
}

/// Single enumeration mode
async fn list_devices<T: DeviceTransport>(transport: Arc<T>, bindings: &BuildBindings) -> Result<()> {
    let registry = DeviceRegistry::new(transport);
    let enumeration = registry.enumerate(Generation::default()).await;

    println!("Found {} devices:", enumeration.devices.len());
    for device in enumeration.devices {
        let Some(identity) = device.identity else {
            println!("  - slot {}: identity unreadable", device.slot);
            continue;
        };
        match bindings.resolve(&identity) {
            Some(build) => println!("  - {} -> {}", identity, build),
            None => println!("  - {} (no build configured)", identity),
        }
    }

    Ok(())
}
