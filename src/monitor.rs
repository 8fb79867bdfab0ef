//! Per-interface capture loop.
//!
//! Frames are read, filtered down to the DNS traffic worth inspecting and
//! handed to the [`Classifier`] one at a time, in arrival order. The loop
//! checks its cancellation flag once per delivered frame, so a cancelled
//! loop exits when the next frame arrives; a read that is already blocked is
//! not interrupted.

use std::sync::atomic::{AtomicBool, Ordering};

use hickory_proto::op::Message;
use hickory_proto::rr::{DNSClass, RecordType};
use hickory_proto::serialize::binary::BinDecodable;
use tracing::{info, trace};

use crate::dns::{Classifier, DnsPacket, DomainMatcher, IpMatcher};
use crate::network::{Injector, PacketCapture, extract_dns_segment};

/// Exemption lists consulted before classification.
pub struct Exemptions<'a, M: IpMatcher, D: DomainMatcher> {
    pub resolvers: &'a M,
    pub domains: &'a D,
}

impl<M: IpMatcher, D: DomainMatcher> Clone for Exemptions<'_, M, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: IpMatcher, D: DomainMatcher> Copy for Exemptions<'_, M, D> {}

/// Why a capture loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Cancelled,
    SourceEnded,
}

/// Turn a raw frame into a classifiable packet, or drop it.
///
/// Drops, in order: non-transport frames, ports other than 53, non-IPv4,
/// exempt resolver on either side, undecodable payloads, messages whose
/// first question is not an IN A/AAAA question, and exempt domains.
pub fn inspect_frame<M, D>(frame: &[u8], exemptions: Exemptions<'_, M, D>) -> Option<DnsPacket>
where
    M: IpMatcher,
    D: DomainMatcher,
{
    let (flow, payload) = extract_dns_segment(frame)?;

    if exemptions.resolvers.matches(flow.source_ip) || exemptions.resolvers.matches(flow.dest_ip)
    {
        trace!(flow = %flow, "exempt resolver");
        return None;
    }

    let message = match Message::from_bytes(&payload) {
        Ok(message) => message,
        Err(err) => {
            trace!(flow = %flow, "undecodable DNS payload: {err}");
            return None;
        }
    };

    // Queries carry a single question in practice; only the first is consulted.
    let question = message.queries().first()?.clone();
    if !matches!(question.query_type(), RecordType::A | RecordType::AAAA)
        || question.query_class() != DNSClass::IN
    {
        return None;
    }

    if exemptions.domains.matches(question.name()) {
        trace!(flow = %flow, domain = %question.name(), "exempt domain");
        return None;
    }

    Some(DnsPacket {
        flow,
        message,
        question,
    })
}

/// Run the capture loop until cancelled or until the capture ends.
pub fn run_capture_loop<C, I, M, D>(
    mut capture: C,
    cancelled: &AtomicBool,
    exemptions: Exemptions<'_, M, D>,
    classifier: &Classifier<I>,
) -> LoopExit
where
    C: PacketCapture,
    I: Injector,
    M: IpMatcher,
    D: DomainMatcher,
{
    let interface = classifier.interface();

    while let Some(frame) = capture.next_packet() {
        if cancelled.load(Ordering::SeqCst) {
            info!(interface, "capture loop cancelled");
            return LoopExit::Cancelled;
        }

        if let Some(packet) = inspect_frame(&frame, exemptions) {
            classifier.classify(packet);
        }
    }

    info!(interface, "capture source ended");
    LoopExit::SourceEnded
}
