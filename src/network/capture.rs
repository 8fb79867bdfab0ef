//! Packet capture abstraction.
//!
//! Provides a trait-based abstraction over frame capture and transmission to
//! enable:
//! - Testing without real network interfaces
//! - Different capture backends

use std::fmt;
use std::io;
use std::net::Ipv4Addr;
use std::thread;
use std::time::Duration;

use pnet::datalink::{self, Channel, DataLinkReceiver, DataLinkSender, NetworkInterface};
use pnet::packet::Packet;
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::tcp::TcpPacket;
use pnet::packet::udp::UdpPacket;
use pnet::util::MacAddr;
use tracing::{trace, warn};

use crate::error::{NetworkError, Result};

/// Well-known DNS port.
pub const DNS_PORT: u16 = 53;

/// First pause after a failed capture read; doubled on each further failure.
const MIN_READ_BACKOFF: Duration = Duration::from_millis(5);
const MAX_READ_BACKOFF: Duration = Duration::from_secs(1);

/// Transport protocol carrying a captured segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    Udp,
    Tcp,
}

/// Addressing of a captured IPv4 segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowInfo {
    pub source_mac: MacAddr,
    pub dest_mac: MacAddr,
    pub source_ip: Ipv4Addr,
    pub dest_ip: Ipv4Addr,
    pub source_port: u16,
    pub dest_port: u16,
    pub transport: Transport,
}

impl FlowInfo {
    /// Addressing of a UDP datagram.
    pub fn udp(
        source_mac: MacAddr,
        dest_mac: MacAddr,
        (source_ip, source_port): (Ipv4Addr, u16),
        (dest_ip, dest_port): (Ipv4Addr, u16),
    ) -> Self {
        Self {
            source_mac,
            dest_mac,
            source_ip,
            dest_ip,
            source_port,
            dest_port,
            transport: Transport::Udp,
        }
    }
}

impl fmt::Display for FlowInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.source_ip, self.source_port, self.dest_ip, self.dest_port
        )
    }
}

/// Trait for packet capture implementations.
pub trait PacketCapture: Send {
    /// Receive the next frame, blocking until one arrives.
    /// Returns None if the capture has ended.
    fn next_packet(&mut self) -> Option<Vec<u8>>;
}

/// Trait for packet sending implementations.
pub trait PacketSender: Send {
    /// Send a frame.
    fn send(&mut self, packet: &[u8]) -> Result<()>;
}

/// Opens the capture/transmit pair of a named interface.
pub trait FrameSource: Send + Sync {
    type Capture: PacketCapture + 'static;
    type Sender: PacketSender + 'static;

    fn open(&self, interface: &str) -> Result<(Self::Capture, Self::Sender)>;
}

/// Find a network interface by name.
pub fn find_interface(name: &str) -> Result<NetworkInterface> {
    datalink::interfaces()
        .into_iter()
        .find(|iface| iface.name == name)
        .ok_or_else(|| NetworkError::NoInterface(name.to_string()).into())
}

/// Production frame source using pnet datalink channels.
#[derive(Debug, Clone, Copy, Default)]
pub struct PnetSource;

impl FrameSource for PnetSource {
    type Capture = PnetCapture;
    type Sender = PnetSender;

    fn open(&self, interface: &str) -> Result<(PnetCapture, PnetSender)> {
        let interface = find_interface(interface)?;
        PnetCapture::new(&interface)
    }
}

/// Production packet capture using pnet.
pub struct PnetCapture {
    rx: Box<dyn DataLinkReceiver>,
}

impl PnetCapture {
    /// Create a new capture for the given interface.
    pub fn new(interface: &NetworkInterface) -> Result<(Self, PnetSender)> {
        let (tx, rx) = match datalink::channel(interface, datalink::Config::default()) {
            Ok(Channel::Ethernet(tx, rx)) => (tx, rx),
            Ok(_) => return Err(NetworkError::UnsupportedChannel.into()),
            Err(e) => return Err(NetworkError::ChannelOpen(e.to_string()).into()),
        };

        Ok((Self { rx }, PnetSender { tx }))
    }
}

impl PacketCapture for PnetCapture {
    /// Read errors are retried; only a closed channel ends the capture.
    fn next_packet(&mut self) -> Option<Vec<u8>> {
        let mut backoff = MIN_READ_BACKOFF;
        loop {
            let err = match self.rx.next() {
                Ok(frame) => return Some(frame.to_vec()),
                Err(err) => err,
            };
            match err.kind() {
                io::ErrorKind::Interrupted
                | io::ErrorKind::WouldBlock
                | io::ErrorKind::TimedOut => {
                    trace!("capture read interrupted: {err}");
                }
                io::ErrorKind::UnexpectedEof
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::NotConnected => {
                    warn!("capture channel closed: {err}");
                    return None;
                }
                _ => {
                    warn!("capture read failed, retrying in {backoff:?}: {err}");
                    thread::sleep(backoff);
                    backoff = (backoff * 2).min(MAX_READ_BACKOFF);
                }
            }
        }
    }
}

/// Production packet sender using pnet.
pub struct PnetSender {
    tx: Box<dyn DataLinkSender>,
}

impl PacketSender for PnetSender {
    fn send(&mut self, packet: &[u8]) -> Result<()> {
        self.tx
            .send_to(packet, None)
            .ok_or_else(|| NetworkError::SendFailed("send returned None".into()))?
            .map_err(|e| NetworkError::SendFailed(e.to_string()))?;
        Ok(())
    }
}

/// Extract a DNS segment from an Ethernet frame.
///
/// Returns None if:
/// - The frame carries no UDP or TCP segment
/// - Neither port is 53
/// - The network layer is not IPv4 (IPv6 is out of scope)
pub fn extract_dns_segment(frame: &[u8]) -> Option<(FlowInfo, Vec<u8>)> {
    let ethernet = EthernetPacket::new(frame)?;
    if ethernet.get_ethertype() != EtherTypes::Ipv4 {
        return None;
    }

    let ipv4 = Ipv4Packet::new(ethernet.payload())?;
    let (transport, source_port, dest_port, payload) = match ipv4.get_next_level_protocol() {
        IpNextHeaderProtocols::Udp => {
            let udp = UdpPacket::new(ipv4.payload())?;
            (
                Transport::Udp,
                udp.get_source(),
                udp.get_destination(),
                udp.payload().to_vec(),
            )
        }
        IpNextHeaderProtocols::Tcp => {
            let tcp = TcpPacket::new(ipv4.payload())?;
            (
                Transport::Tcp,
                tcp.get_source(),
                tcp.get_destination(),
                tcp.payload().to_vec(),
            )
        }
        _ => return None,
    };

    if source_port != DNS_PORT && dest_port != DNS_PORT {
        return None;
    }

    let flow = FlowInfo {
        source_mac: ethernet.get_source(),
        dest_mac: ethernet.get_destination(),
        source_ip: ipv4.get_source(),
        dest_ip: ipv4.get_destination(),
        source_port,
        dest_port,
        transport,
    };

    Some((flow, payload))
}
