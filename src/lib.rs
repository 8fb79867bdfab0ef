//! dnspoison - turn DNS poisoning into a redirection primitive.
//!
//! An adversary that injects forged DNS answers (typically `127.0.0.1`) makes
//! resolution through it unreliable. This crate watches DNS traffic on one or
//! more interfaces and answers outbound A queries itself with a routable
//! sentinel address, so the client's next connection transits a gateway that
//! can complete it. Domains whose genuine answers are observed come back
//! clean are learned into a per-interface whitelist and left alone until a
//! loopback answer for them shows up again.
//!
//! # Architecture
//!
//! - [`registry`]: per-interface lifecycle (prepare, run, delete)
//! - [`monitor`]: the capture loop and its frame filters
//! - [`dns`]: classification, forged responses, whitelist, exemption matchers
//! - [`network`]: frame capture/transmit and response injection
//! - [`config`], [`metrics`], [`error`]: process wiring
//!
//! # Testing
//!
//! Capture, transmit and injection sit behind traits so the whole pipeline
//! can be driven with in-memory frames:
//!
//! ```rust
//! use dnspoison::dns::{DomainMatcher, DomainSet, WhitelistCache};
//! use hickory_proto::rr::Name;
//!
//! let exempt = DomainSet::new(["*.lan"]);
//! assert!(exempt.matches(&"printer.lan".parse::<Name>().unwrap()));
//!
//! let whitelist = WhitelistCache::new();
//! let name: Name = "example.com".parse().unwrap();
//! assert!(whitelist.add(&name));
//! assert!(whitelist.check(&"EXAMPLE.com.".parse().unwrap()));
//! ```

pub mod config;
pub mod dns;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod network;
pub mod registry;

pub use config::Config;
pub use error::{Error, Result};
pub use registry::Registry;
