//! Forged response injection.
//!
//! Injection is fire-and-forget: [`Injector::inject`] spawns a task and
//! returns immediately, so the capture loop never waits on a socket or a
//! transmitter. Replies are unordered with respect to each other and to the
//! loop, and failures are logged and dropped. A lost reply only means the
//! client's next query goes through the same decision again.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hickory_proto::op::Message;
use hickory_proto::serialize::binary::BinEncodable;
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tracing::debug;

use super::capture::{FlowInfo, PacketSender};
use super::packet::PacketBuilder;
use crate::error::{Error, Result};

/// A forged response and the addressing of the query it answers.
#[derive(Debug, Clone)]
pub struct ForgedReply {
    pub response: Message,
    pub flow: FlowInfo,
}

/// Dispatches forged replies without waiting for them to be sent.
pub trait Injector: Send + Sync + 'static {
    fn inject(&self, reply: ForgedReply);
}

/// Sends forged replies from a UDP socket bound to the resolver's own
/// address and port.
///
/// Every reply gets a fresh socket with `SO_REUSEADDR`/`SO_REUSEPORT` so any
/// number of them can share the resolver's tuple at once.
#[derive(Clone)]
pub struct SocketInjector {
    runtime: Handle,
    timeout: Duration,
}

impl SocketInjector {
    pub const fn new(runtime: Handle, timeout: Duration) -> Self {
        Self { runtime, timeout }
    }
}

impl Injector for SocketInjector {
    fn inject(&self, reply: ForgedReply) {
        let timeout = self.timeout;
        self.runtime.spawn(async move {
            let ForgedReply { response, flow } = reply;
            let local = SocketAddr::from((flow.dest_ip, flow.dest_port));
            let peer = SocketAddr::from((flow.source_ip, flow.source_port));
            match tokio::time::timeout(timeout, send_from(&response, local, peer)).await {
                Ok(Ok(())) => debug!(%local, %peer, id = response.id(), "forged reply sent"),
                Ok(Err(err)) => debug!(%local, %peer, "forged reply dropped: {err}"),
                Err(_) => debug!(%local, %peer, "forged reply timed out"),
            }
        });
    }
}

/// Send one datagram from `local` to `peer` and close the socket.
pub async fn send_from(response: &Message, local: SocketAddr, peer: SocketAddr) -> Result<()> {
    let bytes = response
        .to_bytes()
        .map_err(|e| Error::Protocol(e.to_string()))?;

    let socket = bind_reusable(local)?;
    socket.connect(peer).await?;
    socket.send(&bytes).await?;
    Ok(())
}

fn bind_reusable(local: SocketAddr) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.bind(&local.into())?;
    socket.set_nonblocking(true)?;
    let std_socket: std::net::UdpSocket = socket.into();
    Ok(UdpSocket::from_std(std_socket)?)
}

/// Writes forged replies as raw frames through the interface's transmitter.
pub struct FrameInjector<S: PacketSender> {
    runtime: Handle,
    sender: Arc<Mutex<S>>,
    builder: PacketBuilder,
}

impl<S: PacketSender> FrameInjector<S> {
    pub fn new(runtime: Handle, sender: S) -> Self {
        Self {
            runtime,
            sender: Arc::new(Mutex::new(sender)),
            builder: PacketBuilder::new(),
        }
    }
}

impl<S: PacketSender + 'static> Injector for FrameInjector<S> {
    fn inject(&self, reply: ForgedReply) {
        let sender = Arc::clone(&self.sender);
        let builder = self.builder;
        self.runtime.spawn(async move {
            let result = builder
                .build_response(&reply.response, &reply.flow)
                .and_then(|frame| sender.lock().send(&frame));
            match result {
                Ok(()) => debug!(flow = %reply.flow, id = reply.response.id(), "forged frame sent"),
                Err(err) => debug!(flow = %reply.flow, "forged frame dropped: {err}"),
            }
        });
    }
}
