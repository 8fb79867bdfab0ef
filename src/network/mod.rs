//! Frame capture, frame construction and forged response injection.

pub mod capture;
pub mod inject;
mod packet;

pub use capture::{
    DNS_PORT, FlowInfo, FrameSource, PacketCapture, PacketSender, PnetCapture, PnetSender,
    PnetSource, Transport, extract_dns_segment, find_interface,
};
pub use inject::{FrameInjector, ForgedReply, Injector, SocketInjector};
pub use packet::PacketBuilder;
