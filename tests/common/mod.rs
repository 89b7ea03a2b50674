#![allow(dead_code)]

use dns_watcher::collectors::{
    ChannelSourceFactory, PacketFeed, PacketSource, PacketSourceFactory, RawPacket, SourceEvent,
};
use dns_watcher::config::MonitorConfig;
use dns_watcher::{CoreState, MonitorApi, SourceError};
use hickory_proto::op::{Message, Query};
use hickory_proto::rr::{Name, RecordType};
use hickory_proto::serialize::binary::BinEncodable;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Ethernet/IPv4/UDP frame carrying a DNS query for `domain` from `source` to port 53.
pub fn dns_frame(source: Ipv4Addr, domain: &str) -> RawPacket {
    let mut query = Query::new();
    query.set_name(Name::from_str(domain).unwrap());
    query.set_query_type(RecordType::A);
    let mut message = Message::new();
    message.set_id(0x2a2a);
    message.add_query(query);
    let payload = message.to_bytes().unwrap();

    let mut segment = Vec::new();
    segment.extend_from_slice(&53000u16.to_be_bytes());
    segment.extend_from_slice(&53u16.to_be_bytes());
    segment.extend_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
    segment.extend_from_slice(&[0, 0]);
    segment.extend_from_slice(&payload);

    let mut frame = vec![0u8; 12];
    frame.extend_from_slice(&[0x08, 0x00]);
    frame.extend_from_slice(&[0x45, 0]);
    frame.extend_from_slice(&((20 + segment.len()) as u16).to_be_bytes());
    frame.extend_from_slice(&[0, 0, 0, 0, 64, 17, 0, 0]);
    frame.extend_from_slice(&source.octets());
    frame.extend_from_slice(&Ipv4Addr::new(192, 168, 1, 1).octets());
    frame.extend_from_slice(&segment);
    RawPacket::new(frame)
}

/// Wraps a [`ChannelSourceFactory`] and records every open and live source.
pub struct TrackingFactory {
    inner: ChannelSourceFactory,
    active: Arc<AtomicUsize>,
    opened: Arc<Mutex<Vec<String>>>,
}

impl TrackingFactory {
    pub fn new(interfaces: &[&str]) -> (Self, PacketFeed) {
        let (inner, feed) = ChannelSourceFactory::new(64, POLL_INTERVAL);
        let inner = inner.with_interfaces(interfaces.iter().copied());
        let factory = Self {
            inner,
            active: Arc::new(AtomicUsize::new(0)),
            opened: Arc::new(Mutex::new(Vec::new())),
        };
        (factory, feed)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

impl PacketSourceFactory for TrackingFactory {
    fn open(&self, interface: &str) -> Result<Box<dyn PacketSource>, SourceError> {
        self.opened.lock().unwrap().push(interface.to_string());
        let inner = self.inner.open(interface)?;
        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TrackedSource {
            inner,
            active: Arc::clone(&self.active),
        }))
    }

    fn interfaces(&self) -> Vec<String> {
        self.inner.interfaces()
    }
}

struct TrackedSource {
    inner: Box<dyn PacketSource>,
    active: Arc<AtomicUsize>,
}

impl PacketSource for TrackedSource {
    fn next_event(&mut self) -> Result<SourceEvent, SourceError> {
        self.inner.next_event()
    }
}

impl Drop for TrackedSource {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn test_config() -> MonitorConfig {
    MonitorConfig {
        poll_interval_ms: 10,
        stop_timeout_ms: 2000,
        max_restart_attempts: 0,
        ..MonitorConfig::default()
    }
}

pub fn api_with(config: MonitorConfig, factory: Arc<dyn PacketSourceFactory>) -> MonitorApi {
    let core = CoreState::new(config, factory).unwrap();
    MonitorApi::new(Arc::new(core))
}

/// Polls `condition` for up to three seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
