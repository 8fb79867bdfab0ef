//! Metrics initialization for Prometheus exporter.
//!
//! Counter names recorded by the classifier live here so the exporter and
//! the recording sites agree on them.

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::MetricsConfig;
use crate::error::{Error, Result};

/// Forged responses dispatched, labelled by interface and query type.
pub const FORGED_TOTAL: &str = "dnspoison_forged_total";
/// A queries passed through because the domain is whitelisted.
pub const BYPASSED_TOTAL: &str = "dnspoison_bypassed_total";
/// Responses carrying a loopback A answer.
pub const POISON_DETECTED_TOTAL: &str = "dnspoison_poison_detected_total";
/// Domains added to a whitelist.
pub const WHITELIST_LEARNED_TOTAL: &str = "dnspoison_whitelist_learned_total";
/// Domains removed from a whitelist.
pub const WHITELIST_FORGOTTEN_TOTAL: &str = "dnspoison_whitelist_forgotten_total";

/// Initialize the metrics system based on configuration.
///
/// When metrics are enabled, this starts an HTTP server that exposes
/// a `/metrics` endpoint for Prometheus to scrape. Must be called from
/// within a tokio runtime.
///
/// When metrics are disabled, this is a no-op. The `metrics` crate
/// handles unregistered metrics gracefully (they become no-ops).
pub fn init(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(config.listen)
        .install()
        .map_err(|e| Error::Metrics(e.to_string()))?;

    Ok(())
}
