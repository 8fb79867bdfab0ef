//! Poison / learn / pass decisions for inspected DNS packets.
//!
//! Queries are answered with a forged response unless the domain is already
//! known to resolve cleanly. Responses are scanned for loopback A answers,
//! which is how the interfering party signals a poisoned domain: those
//! domains are dropped from the whitelist, domains answered with genuine
//! addresses are added to it.

use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;

use hickory_proto::op::{Message, MessageType, Query};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use tracing::{debug, info};

use super::forge::forge_response;
use super::whitelist::WhitelistCache;
use crate::metrics::{
    BYPASSED_TOTAL, FORGED_TOTAL, POISON_DETECTED_TOTAL, WHITELIST_FORGOTTEN_TOTAL,
    WHITELIST_LEARNED_TOTAL,
};
use crate::network::{FlowInfo, ForgedReply, Injector};

/// A DNS message that survived the capture loop's filters.
#[derive(Debug, Clone)]
pub struct DnsPacket {
    pub flow: FlowInfo,
    pub message: Message,
    /// The first question of `message`, the only one consulted.
    pub question: Query,
}

/// Outcome of classifying one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// A query for a whitelisted domain, left alone.
    Bypassed,
    /// A query answered with a forged response.
    Forged,
    /// A response that added its domain to the whitelist.
    Learned,
    /// A poisoned response that removed its domain from the whitelist.
    Forgotten,
    /// A response that did not change the whitelist.
    Unchanged,
}

/// One diagnostic entry of a response's answer section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerEntry {
    Cname(Name),
    A(Ipv4Addr),
}

/// CNAME targets and A addresses of a response, in answer order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerSummary {
    entries: Vec<AnswerEntry>,
}

impl AnswerSummary {
    pub fn from_answers(answers: &[Record]) -> Self {
        let entries = answers
            .iter()
            .filter_map(|record| match record.data() {
                RData::CNAME(cname) => Some(AnswerEntry::Cname(cname.0.clone())),
                RData::A(a) => Some(AnswerEntry::A(a.0)),
                _ => None,
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[AnswerEntry] {
        &self.entries
    }

    pub fn addresses(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.entries.iter().filter_map(|entry| match entry {
            AnswerEntry::A(addr) => Some(*addr),
            AnswerEntry::Cname(_) => None,
        })
    }

    /// Any A answer equal to `127.0.0.1`.
    pub fn is_poisoned(&self) -> bool {
        self.addresses().any(|addr| addr == Ipv4Addr::LOCALHOST)
    }
}

impl fmt::Display for AnswerSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return f.write_str("(empty)");
        }
        f.write_str("[")?;
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match entry {
                AnswerEntry::Cname(name) => {
                    write!(f, "CNAME:{}", name.to_utf8().trim_end_matches('.'))?;
                }
                AnswerEntry::A(addr) => write!(f, "A:{addr}")?,
            }
        }
        f.write_str("]")
    }
}

/// Decision engine for one interface.
///
/// Classification happens on the capture loop's thread, in arrival order.
/// Only injection leaves that thread: [`Injector::inject`] returns before the
/// forged reply is sent.
pub struct Classifier<I: Injector> {
    interface: String,
    whitelist: Arc<WhitelistCache>,
    injector: I,
    sentinel: Ipv4Addr,
}

impl<I: Injector> Classifier<I> {
    pub fn new(
        interface: impl Into<String>,
        whitelist: Arc<WhitelistCache>,
        injector: I,
        sentinel: Ipv4Addr,
    ) -> Self {
        Self {
            interface: interface.into(),
            whitelist,
            injector,
            sentinel,
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn whitelist(&self) -> &Arc<WhitelistCache> {
        &self.whitelist
    }

    pub fn injector(&self) -> &I {
        &self.injector
    }

    pub fn classify(&self, packet: DnsPacket) -> Verdict {
        if packet.message.message_type() == MessageType::Response {
            self.on_response(&packet)
        } else {
            self.on_query(packet)
        }
    }

    fn on_query(&self, packet: DnsPacket) -> Verdict {
        let DnsPacket {
            flow,
            message,
            question,
        } = packet;
        let query_type = question.query_type();

        if query_type == RecordType::A {
            if self.whitelist.check(question.name()) {
                metrics::counter!(BYPASSED_TOTAL, "interface" => self.interface.clone())
                    .increment(1);
                debug!(
                    interface = %self.interface,
                    flow = %flow,
                    domain = %question.name(),
                    "whitelisted, passing through"
                );
                return Verdict::Bypassed;
            }
            info!(
                interface = %self.interface,
                flow = %flow,
                domain = %question.name(),
                "answering with sentinel"
            );
        } else {
            debug!(
                interface = %self.interface,
                flow = %flow,
                domain = %question.name(),
                "answering {query_type} with empty response"
            );
        }

        metrics::counter!(
            FORGED_TOTAL,
            "interface" => self.interface.clone(),
            "qtype" => query_type.to_string()
        )
        .increment(1);

        let response = forge_response(&message, self.sentinel);
        self.injector.inject(ForgedReply { response, flow });
        Verdict::Forged
    }

    fn on_response(&self, packet: &DnsPacket) -> Verdict {
        let domain = packet.question.name();
        let summary = AnswerSummary::from_answers(packet.message.answers());

        debug!(
            interface = %self.interface,
            flow = %packet.flow,
            domain = %domain,
            answers = %summary,
            "response observed"
        );

        if summary.is_poisoned() {
            metrics::counter!(POISON_DETECTED_TOTAL, "interface" => self.interface.clone())
                .increment(1);
            if self.whitelist.remove(domain) {
                metrics::counter!(WHITELIST_FORGOTTEN_TOTAL, "interface" => self.interface.clone())
                    .increment(1);
                info!(
                    interface = %self.interface,
                    domain = %domain,
                    answers = %summary,
                    "poisoned answer observed, removed from whitelist"
                );
                return Verdict::Forgotten;
            }
            return Verdict::Unchanged;
        }

        if self.whitelist.add(domain) {
            metrics::counter!(WHITELIST_LEARNED_TOTAL, "interface" => self.interface.clone())
                .increment(1);
            info!(
                interface = %self.interface,
                domain = %domain,
                answers = %summary,
                "genuine answer observed, added to whitelist"
            );
            return Verdict::Learned;
        }

        Verdict::Unchanged
    }
}
