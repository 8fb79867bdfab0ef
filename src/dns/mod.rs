//! DNS-related modules.

pub mod classifier;
pub mod forge;
pub mod matcher;
pub mod whitelist;

pub use classifier::{AnswerEntry, AnswerSummary, Classifier, DnsPacket, Verdict};
pub use forge::forge_response;
pub use matcher::{DomainMatcher, DomainSet, IpMatcher, NetworkSet};
pub use whitelist::{WhitelistCache, fqdn_key};
