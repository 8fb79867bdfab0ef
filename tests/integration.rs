//! Integration tests for configuration loading and the interface registry.
//!
//! These drive the public API with in-memory frame sources.

use std::collections::HashMap;
use std::io::Write;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use dnspoison::config::{Config, InjectionConfig, InjectionMode};
use dnspoison::dns::{DomainMatcher, DomainSet, IpMatcher, NetworkSet};
use dnspoison::error::{ConfigError, Error, NetworkError, RegistryError};
use dnspoison::network::{FlowInfo, FrameSource, PacketBuilder, PacketCapture, PacketSender};
use dnspoison::registry::Registry;
use hickory_proto::op::{Message, MessageType, Query};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{Name, RData, Record, RecordType};
use parking_lot::Mutex;
use pnet::util::MacAddr;
use tempfile::NamedTempFile;
use tokio::runtime::Handle;

const CLIENT: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 100);
const RESOLVER: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 53);

/// Capture fed from a channel; ends when every sender is dropped.
struct TestCapture {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl PacketCapture for TestCapture {
    fn next_packet(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().ok()
    }
}

#[derive(Clone, Default)]
struct TestSender {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl PacketSender for TestSender {
    fn send(&mut self, packet: &[u8]) -> dnspoison::Result<()> {
        self.sent.lock().push(packet.to_vec());
        Ok(())
    }
}

/// Hands out one channel-backed capture per interface name.
#[derive(Default)]
struct TestSource {
    captures: Mutex<HashMap<String, TestCapture>>,
}

impl TestSource {
    fn add(&self, name: &str) -> mpsc::Sender<Vec<u8>> {
        let (tx, rx) = mpsc::channel();
        self.captures
            .lock()
            .insert(name.to_string(), TestCapture { rx });
        tx
    }
}

impl FrameSource for TestSource {
    type Capture = TestCapture;
    type Sender = TestSender;

    fn open(&self, interface: &str) -> dnspoison::Result<(TestCapture, TestSender)> {
        let capture = self
            .captures
            .lock()
            .remove(interface)
            .ok_or_else(|| NetworkError::NoInterface(interface.to_string()))?;
        Ok((capture, TestSender::default()))
    }
}

/// Frame from `from` to `to`. The builder swaps addressing, so the flow is
/// given reversed.
fn frame(message: &Message, from: (Ipv4Addr, u16), to: (Ipv4Addr, u16)) -> Vec<u8> {
    let flow = FlowInfo::udp(
        MacAddr::new(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff),
        MacAddr::new(0x11, 0x22, 0x33, 0x44, 0x55, 0x66),
        to,
        from,
    );
    PacketBuilder::new().build_response(message, &flow).unwrap()
}

fn query(domain: &str, id: u16) -> Message {
    let mut message = Message::new();
    message.set_id(id).add_query(Query::query(
        Name::from_str(domain).unwrap(),
        RecordType::A,
    ));
    message
}

fn response(domain: &str, addr: Ipv4Addr) -> Message {
    let name = Name::from_str(domain).unwrap();
    let mut message = Message::new();
    message
        .set_id(1)
        .set_message_type(MessageType::Response)
        .add_query(Query::query(name.clone(), RecordType::A))
        .add_answer(Record::from_rdata(name, 300, RData::A(A(addr))));
    message
}

fn response_frame(domain: &str, addr: Ipv4Addr) -> Vec<u8> {
    frame(&response(domain, addr), (RESOLVER, 53), (CLIENT, 40000))
}

fn injection(mode: InjectionMode) -> InjectionConfig {
    InjectionConfig {
        mode,
        sentinel: Ipv4Addr::new(1, 2, 3, 4),
        timeout_secs: 5,
    }
}

#[test]
fn test_load_config_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
interfaces = ["eth0", "wlan0"]
exempt_resolvers = ["10.8.0.1", "172.16.0.0/12"]
exempt_domains = ["*.lan", "intranet.example"]

[injection]
mode = "link"
sentinel = "198.51.100.7"
timeout_secs = 10

[metrics]
enabled = false
"#
    )
    .unwrap();

    let config = Config::load(file.path()).unwrap();

    assert_eq!(config.interfaces, vec!["eth0", "wlan0"]);
    assert_eq!(config.injection.mode, InjectionMode::Link);
    assert_eq!(config.injection.sentinel, Ipv4Addr::new(198, 51, 100, 7));
    assert_eq!(config.injection.timeout(), Duration::from_secs(10));

    let resolvers = config.resolver_exemptions().unwrap();
    assert!(resolvers.matches(Ipv4Addr::new(10, 8, 0, 1)));
    assert!(resolvers.matches(Ipv4Addr::new(172, 20, 1, 1)));
    assert!(!resolvers.matches(Ipv4Addr::new(8, 8, 8, 8)));

    let domains = config.domain_exemptions();
    assert!(domains.matches(&Name::from_str("nas.lan.").unwrap()));
    assert!(domains.matches(&Name::from_str("Intranet.Example.").unwrap()));
    assert!(!domains.matches(&Name::from_str("example.com.").unwrap()));
}

#[test]
fn test_missing_config_file() {
    let err = Config::load("/nonexistent/dnspoison.toml").unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::ReadFile(_))));
}

#[test]
fn test_invalid_resolver_rejected_at_load() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, r#"interfaces = ["eth0"]"#).unwrap();
    writeln!(file, r#"exempt_resolvers = ["not-an-ip"]"#).unwrap();

    let err = Config::load(file.path()).unwrap_err();
    assert!(matches!(
        err,
        Error::Config(ConfigError::InvalidResolver { ref value, .. }) if value == "not-an-ip"
    ));
}

#[tokio::test]
async fn test_registry_lifecycle() {
    let source = TestSource::default();
    let _eth0 = source.add("eth0");
    let _eth1 = source.add("eth1");
    let registry = Registry::new(source, injection(InjectionMode::Link), Handle::current());

    registry.prepare("eth0").unwrap();
    registry.prepare("eth1").unwrap();
    assert!(matches!(
        registry.prepare("eth0"),
        Err(Error::Registry(RegistryError::AlreadyExists(_)))
    ));
    assert!(matches!(
        registry.prepare("eth9"),
        Err(Error::Network(NetworkError::NoInterface(_)))
    ));

    let mut names = registry.list_handles();
    names.sort();
    assert_eq!(names, vec!["eth0", "eth1"]);

    registry.delete_handles("eth0").unwrap();
    assert!(matches!(
        registry.delete_handles("eth0"),
        Err(Error::Registry(RegistryError::NotFound(_)))
    ));

    registry.clear();
    assert!(registry.list_handles().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_whitelist_learning_through_run() {
    let source = TestSource::default();
    let frames = source.add("eth0");
    let registry = Arc::new(Registry::new(
        source,
        injection(InjectionMode::Link),
        Handle::current(),
    ));
    registry.prepare("eth0").unwrap();
    let whitelist = registry.whitelist("eth0").unwrap();

    frames
        .send(response_frame("clean.example.", Ipv4Addr::new(93, 184, 216, 34)))
        .unwrap();
    frames
        .send(response_frame("poisoned.example.", Ipv4Addr::new(93, 184, 216, 35)))
        .unwrap();
    frames
        .send(response_frame("poisoned.example.", Ipv4Addr::LOCALHOST))
        .unwrap();
    drop(frames);

    let worker = Arc::clone(&registry);
    tokio::task::spawn_blocking(move || {
        worker.run("eth0", &NetworkSet::default(), &DomainSet::default())
    })
    .await
    .unwrap()
    .unwrap();

    assert!(whitelist.check(&Name::from_str("clean.example.").unwrap()));
    assert!(!whitelist.check(&Name::from_str("poisoned.example.").unwrap()));
    assert_eq!(whitelist.domains(), vec!["clean.example.".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_exemptions_skip_learning() {
    let source = TestSource::default();
    let frames = source.add("eth0");
    let registry = Arc::new(Registry::new(
        source,
        injection(InjectionMode::Link),
        Handle::current(),
    ));
    registry.prepare("eth0").unwrap();

    frames
        .send(response_frame("nas.lan.", Ipv4Addr::new(10, 0, 0, 2)))
        .unwrap();
    frames
        .send(frame(
            &response("via-tunnel.example.", Ipv4Addr::new(93, 184, 216, 34)),
            (Ipv4Addr::new(10, 8, 0, 1), 53),
            (CLIENT, 40000),
        ))
        .unwrap();
    drop(frames);

    let resolvers = NetworkSet::new(["10.8.0.0/24".parse().unwrap()]);
    let domains = DomainSet::new(["*.lan"]);
    let worker = Arc::clone(&registry);
    tokio::task::spawn_blocking(move || worker.run("eth0", &resolvers, &domains))
        .await
        .unwrap()
        .unwrap();

    assert!(registry.whitelist("eth0").unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_forged_reply_reaches_querier_over_socket() {
    let querier = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let querier_addr = querier.local_addr().unwrap();
    let resolver_addr = std::net::UdpSocket::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();

    let source = TestSource::default();
    let frames = source.add("lo");
    let registry = Arc::new(Registry::new(
        source,
        injection(InjectionMode::Socket),
        Handle::current(),
    ));
    registry.prepare("lo").unwrap();

    frames
        .send(frame(
            &query("blocked.example.", 0x5150),
            (Ipv4Addr::LOCALHOST, querier_addr.port()),
            (Ipv4Addr::LOCALHOST, resolver_addr.port()),
        ))
        .unwrap();
    drop(frames);

    let worker = Arc::clone(&registry);
    tokio::task::spawn_blocking(move || {
        worker.run("lo", &NetworkSet::default(), &DomainSet::default())
    })
    .await
    .unwrap()
    .unwrap();

    let mut buf = [0u8; 512];
    let (len, from) = tokio::time::timeout(Duration::from_secs(5), querier.recv_from(&mut buf))
        .await
        .expect("no forged reply received")
        .unwrap();

    assert_eq!(from, resolver_addr);
    let reply = Message::from_vec(&buf[..len]).unwrap();
    assert_eq!(reply.id(), 0x5150);
    assert_eq!(reply.message_type(), MessageType::Response);
    assert_eq!(reply.answers().len(), 1);
    assert_eq!(reply.answers()[0].ttl(), 0);
    match reply.answers()[0].data() {
        RData::A(a) => assert_eq!(a.0, Ipv4Addr::new(1, 2, 3, 4)),
        other => panic!("Expected A record, got {other:?}"),
    }
}
