//! Configuration loading and validation.

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use ipnetwork::Ipv4Network;
use serde::Deserialize;

use crate::dns::{DomainSet, NetworkSet};
use crate::error::{ConfigError, Result};

/// Main configuration for the dnspoison daemon.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Interfaces to monitor. Each one gets its own whitelist.
    pub interfaces: Vec<String>,

    /// Resolver addresses or CIDR ranges whose traffic is never inspected
    /// (e.g. a trusted upstream reached through a tunnel).
    #[serde(default)]
    pub exempt_resolvers: Vec<String>,

    /// Domains that are always passed through.
    /// Supports exact matches ("example.com") and wildcards ("*.example.com").
    #[serde(default)]
    pub exempt_domains: Vec<String>,

    /// How forged responses are built and sent.
    #[serde(default)]
    pub injection: InjectionConfig,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transmit strategy for forged responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InjectionMode {
    /// UDP socket bound to the impersonated resolver's address and port.
    #[default]
    Socket,
    /// Raw Ethernet frame written to the monitored interface.
    Link,
}

/// Settings for the response injector.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InjectionConfig {
    #[serde(default)]
    pub mode: InjectionMode,

    /// Address placed in every forged A answer.
    #[serde(default = "default_sentinel")]
    pub sentinel: Ipv4Addr,

    /// Upper bound for a single socket injection, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl InjectionConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            mode: InjectionMode::default(),
            sentinel: default_sentinel(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Metrics exporter settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

const fn default_sentinel() -> Ipv4Addr {
    Ipv4Addr::new(1, 2, 3, 4)
}

const fn default_timeout_secs() -> u64 {
    30
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9090))
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Build the resolver exemption matcher.
    pub fn resolver_exemptions(&self) -> Result<NetworkSet> {
        let networks = self
            .exempt_resolvers
            .iter()
            .map(|value| parse_network(value))
            .collect::<Result<Vec<_>>>()?;
        Ok(NetworkSet::new(networks))
    }

    /// Build the domain exemption matcher.
    pub fn domain_exemptions(&self) -> DomainSet {
        DomainSet::new(&self.exempt_domains)
    }

    fn validate(&self) -> Result<()> {
        if self.interfaces.is_empty() {
            return Err(ConfigError::Validation("at least one interface is required".into()).into());
        }

        let mut seen = HashSet::new();
        for name in &self.interfaces {
            if name.is_empty() {
                return Err(ConfigError::Validation("empty interface name".into()).into());
            }
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::Validation(format!("duplicate interface: {name}")).into());
            }
        }

        let sentinel = self.injection.sentinel;
        if sentinel.is_loopback() || sentinel.is_unspecified() {
            return Err(ConfigError::Validation(format!(
                "injection.sentinel must be routable, got {sentinel}"
            ))
            .into());
        }

        if self.injection.timeout_secs == 0 {
            return Err(ConfigError::Validation("injection.timeout_secs must be > 0".into()).into());
        }

        for value in &self.exempt_resolvers {
            parse_network(value)?;
        }

        for pattern in &self.exempt_domains {
            if pattern.is_empty() {
                return Err(ConfigError::Validation("empty exempt domain pattern".into()).into());
            }
            if pattern.starts_with("*.") && pattern.len() <= 2 {
                return Err(ConfigError::Validation(format!(
                    "invalid wildcard pattern: {pattern}"
                ))
                .into());
            }
        }

        Ok(())
    }
}

fn parse_network(value: &str) -> Result<Ipv4Network> {
    let network = value
        .parse::<Ipv4Network>()
        .map_err(|e| ConfigError::InvalidResolver {
            value: value.to_string(),
            reason: e.to_string(),
        })?;
    Ok(network)
}
