//! Exemption matchers consulted by the capture loop.
//!
//! Traffic to or from an exempt resolver, and questions for an exempt
//! domain, are passed through without inspection.

use std::collections::HashSet;
use std::net::Ipv4Addr;

use hickory_proto::rr::Name;
use ipnetwork::Ipv4Network;

/// Matches resolver addresses whose traffic must not be inspected.
pub trait IpMatcher: Send + Sync {
    fn matches(&self, addr: Ipv4Addr) -> bool;
}

/// Matches domains that must always be passed through.
pub trait DomainMatcher: Send + Sync {
    fn matches(&self, name: &Name) -> bool;
}

/// A set of IPv4 networks. Bare addresses are treated as /32.
#[derive(Debug, Clone, Default)]
pub struct NetworkSet {
    networks: Vec<Ipv4Network>,
}

impl NetworkSet {
    pub fn new<I>(networks: I) -> Self
    where
        I: IntoIterator<Item = Ipv4Network>,
    {
        Self {
            networks: networks.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }
}

impl IpMatcher for NetworkSet {
    #[inline]
    fn matches(&self, addr: Ipv4Addr) -> bool {
        self.networks.iter().any(|network| network.contains(addr))
    }
}

/// A compiled domain list for exemption lookups.
///
/// Patterns are pre-processed at construction time to avoid
/// string allocations during the hot path.
#[derive(Debug, Clone, Default)]
pub struct DomainSet {
    /// Exact domain matches (stored lowercase, without trailing dot).
    exact: HashSet<String>,
    /// Wildcard suffixes (the part after "*", e.g., ".lan").
    wildcard_suffixes: Vec<String>,
}

impl DomainSet {
    /// Create a new domain set from a list of patterns.
    ///
    /// Patterns can be:
    /// - Exact matches: "example.com"
    /// - Wildcard matches: "*.example.com" (matches any subdomain)
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut exact = HashSet::new();
        let mut wildcard_suffixes = Vec::new();

        for pattern in patterns {
            let pattern = pattern.as_ref().to_lowercase();
            let pattern = pattern.trim_end_matches('.');

            if let Some(suffix) = pattern.strip_prefix('*') {
                wildcard_suffixes.push(suffix.to_string());
            } else {
                exact.insert(pattern.to_string());
            }
        }

        Self {
            exact,
            wildcard_suffixes,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.wildcard_suffixes.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.exact.len() + self.wildcard_suffixes.len()
    }
}

impl DomainMatcher for DomainSet {
    fn matches(&self, name: &Name) -> bool {
        if self.is_empty() {
            return false;
        }

        let name_str = name.to_utf8().to_lowercase();
        let name_str = name_str.trim_end_matches('.');

        if self.exact.contains(name_str) {
            return true;
        }

        self.wildcard_suffixes
            .iter()
            .any(|suffix| name_str.ends_with(suffix.as_str()))
    }
}
