//! dnspoison - Entry point.
//!
//! Loads the configuration, prepares every configured interface and runs one
//! capture loop per interface on the blocking pool. Ctrl-C deletes all
//! interfaces; each loop exits at its next captured frame.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use dnspoison::config::Config;
use dnspoison::network::PnetSource;
use dnspoison::registry::Registry;

/// How long in-flight forged replies get once the loops are released.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

async fn run() -> Result<()> {
    let config_path = std::env::var("CONFIG_PATH")
        .map(Cow::Owned)
        .unwrap_or(Cow::Borrowed("config.toml"));
    let config = Config::load(&*config_path).context("Failed to load configuration")?;

    // Initialize metrics (must be done early, before any metrics are recorded)
    dnspoison::metrics::init(&config.metrics).context("Failed to initialize metrics")?;
    if config.metrics.enabled {
        info!("Metrics enabled on {}", config.metrics.listen);
    }

    let resolvers = Arc::new(
        config
            .resolver_exemptions()
            .context("Failed to parse exempt resolvers")?,
    );
    let domains = Arc::new(config.domain_exemptions());

    info!("Starting dnspoison...");
    info!("Injection mode: {:?}", config.injection.mode);
    info!("Sentinel address: {}", config.injection.sentinel);
    info!("Exempt resolvers: {}", config.exempt_resolvers.len());
    info!("Exempt domains: {}", config.exempt_domains.len());

    let registry = Arc::new(Registry::new(
        PnetSource,
        config.injection.clone(),
        Handle::current(),
    ));

    for name in &config.interfaces {
        registry
            .prepare(name)
            .with_context(|| format!("Failed to prepare interface {name}"))?;
    }

    let mut loops = JoinSet::new();
    for name in config.interfaces.iter().cloned() {
        let registry = Arc::clone(&registry);
        let resolvers = Arc::clone(&resolvers);
        let domains = Arc::clone(&domains);
        loops.spawn_blocking(move || {
            if let Err(err) = registry.run(&name, &*resolvers, &*domains) {
                error!(interface = %name, "capture loop failed: {err}");
            }
        });
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down...");
        }
        _ = wait_all(&mut loops) => {
            warn!("All capture loops ended");
        }
    }

    registry.clear();

    // Loops blocked on a quiet interface only return at their next frame,
    // so don't hold the process open for them.
    loops.detach_all();
    info!("Shutdown complete.");

    Ok(())
}

async fn wait_all(loops: &mut JoinSet<()>) {
    while let Some(result) = loops.join_next().await {
        if let Err(err) = result {
            error!("Capture task failed: {err}");
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;
    let result = runtime.block_on(run());
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}
