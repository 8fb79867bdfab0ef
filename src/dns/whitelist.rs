//! Per-interface set of domains confirmed not to be poisoned.
//!
//! The lock is owned by the cache: `check` only ever takes the shared lock,
//! and `add`/`remove` probe under the shared lock first so that repeated
//! observations of an already-settled domain never contend for the
//! exclusive lock.

use std::collections::HashSet;

use hickory_proto::rr::Name;
use parking_lot::RwLock;

/// Canonical whitelist key: lower-cased, fully-qualified ASCII name.
pub fn fqdn_key(name: &Name) -> String {
    let mut name = name.to_lowercase();
    name.set_fqdn(true);
    name.to_ascii()
}

/// Domains last observed resolving to a genuine, non-loopback address.
#[derive(Debug, Default)]
pub struct WhitelistCache {
    domains: RwLock<HashSet<String>>,
}

impl WhitelistCache {
    /// Create a new empty whitelist.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether a domain is whitelisted.
    #[inline]
    pub fn check(&self, name: &Name) -> bool {
        self.domains.read().contains(&fqdn_key(name))
    }

    /// Whitelist a domain. Returns `true` if it was not present before.
    pub fn add(&self, name: &Name) -> bool {
        let key = fqdn_key(name);
        if self.domains.read().contains(&key) {
            return false;
        }
        self.domains.write().insert(key)
    }

    /// Drop a domain from the whitelist. Returns `true` if it was present.
    pub fn remove(&self, name: &Name) -> bool {
        let key = fqdn_key(name);
        if !self.domains.read().contains(&key) {
            return false;
        }
        self.domains.write().remove(&key)
    }

    /// Number of whitelisted domains.
    pub fn len(&self) -> usize {
        self.domains.read().len()
    }

    /// Check if the whitelist is empty.
    pub fn is_empty(&self) -> bool {
        self.domains.read().is_empty()
    }

    /// Snapshot of the whitelisted keys, sorted.
    pub fn domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self.domains.read().iter().cloned().collect();
        domains.sort_unstable();
        domains
    }
}
