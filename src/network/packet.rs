//! Frame construction for link-layer injection.
//!
//! Builds complete Ethernet/IPv4/UDP frames with proper checksums,
//! addressed from the queried resolver back to the querier.

use hickory_proto::op::Message;
use hickory_proto::serialize::binary::BinEncodable;
use pnet::packet::ethernet::{EtherTypes, MutableEthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{self, MutableIpv4Packet};
use pnet::packet::udp::{self, MutableUdpPacket, UdpPacket};

use super::capture::FlowInfo;
use crate::error::{Error, NetworkError, Result};

/// Ethernet header size in bytes.
const ETHERNET_HEADER_SIZE: usize = 14;
/// IPv4 header size in bytes (without options).
const IPV4_HEADER_SIZE: usize = 20;
/// UDP header size in bytes.
const UDP_HEADER_SIZE: usize = 8;
/// Hop limit of injected datagrams.
const DEFAULT_IP_TTL: u8 = 64;

/// Builder for forged DNS response frames.
#[derive(Debug, Clone, Copy)]
pub struct PacketBuilder {
    ip_ttl: u8,
}

impl Default for PacketBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketBuilder {
    pub const fn new() -> Self {
        Self {
            ip_ttl: DEFAULT_IP_TTL,
        }
    }

    /// Build a complete Ethernet frame for a DNS response.
    ///
    /// `flow` is the original query's addressing; source and destination
    /// are swapped so the frame appears to come from the resolver.
    pub fn build_response(&self, response: &Message, flow: &FlowInfo) -> Result<Vec<u8>> {
        let dns_bytes = response
            .to_bytes()
            .map_err(|e| Error::Protocol(e.to_string()))?;

        let udp_len = UDP_HEADER_SIZE + dns_bytes.len();
        let ipv4_len = IPV4_HEADER_SIZE + udp_len;
        let oversized = || {
            NetworkError::PacketConstruction(format!(
                "DNS response of {} bytes does not fit in one IPv4 datagram",
                dns_bytes.len()
            ))
        };
        let ipv4_total = u16::try_from(ipv4_len).map_err(|_| oversized())?;
        let udp_total = u16::try_from(udp_len).map_err(|_| oversized())?;
        let mut frame = vec![0u8; ETHERNET_HEADER_SIZE + ipv4_len];

        let udp_start = ETHERNET_HEADER_SIZE + IPV4_HEADER_SIZE;
        {
            let mut udp = MutableUdpPacket::new(&mut frame[udp_start..]).ok_or_else(|| {
                NetworkError::PacketConstruction("UDP packet creation failed".into())
            })?;
            udp.set_source(flow.dest_port);
            udp.set_destination(flow.source_port);
            udp.set_length(udp_total);
            udp.set_payload(&dns_bytes);
            // Checksum will be set after we have the IP header
        }

        {
            let mut ip = MutableIpv4Packet::new(&mut frame[ETHERNET_HEADER_SIZE..]).ok_or_else(
                || NetworkError::PacketConstruction("IPv4 packet creation failed".into()),
            )?;
            ip.set_version(4);
            ip.set_header_length(5);
            ip.set_total_length(ipv4_total);
            ip.set_ttl(self.ip_ttl);
            ip.set_next_level_protocol(IpNextHeaderProtocols::Udp);
            ip.set_source(flow.dest_ip);
            ip.set_destination(flow.source_ip);
            ip.set_checksum(ipv4::checksum(&ip.to_immutable()));
        }

        let checksum = {
            let datagram = UdpPacket::new(&frame[udp_start..])
                .ok_or_else(|| NetworkError::PacketConstruction("UDP checksum failed".into()))?;
            udp::ipv4_checksum(&datagram, &flow.dest_ip, &flow.source_ip)
        };
        MutableUdpPacket::new(&mut frame[udp_start..])
            .ok_or_else(|| NetworkError::PacketConstruction("UDP checksum failed".into()))?
            .set_checksum(checksum);

        {
            let mut ethernet = MutableEthernetPacket::new(&mut frame).ok_or_else(|| {
                NetworkError::PacketConstruction("Ethernet frame creation failed".into())
            })?;
            ethernet.set_destination(flow.source_mac);
            ethernet.set_source(flow.dest_mac);
            ethernet.set_ethertype(EtherTypes::Ipv4);
        }

        Ok(frame)
    }
}
