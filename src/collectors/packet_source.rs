//! Packet source abstraction.
//!
//! The capture loop only depends on [`PacketSourceFactory`] and [`PacketSource`],
//! which keeps it testable without privileges or real interfaces:
//! - [`PnetSourceFactory`] reads Ethernet frames through `pnet::datalink`
//! - [`ChannelSourceFactory`] is fed frames through a bounded channel

use log::{debug, info, warn};
use pnet::datalink::{self, Channel::Ethernet, DataLinkReceiver, NetworkInterface};
use pnet::packet::Packet;
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::udp::UdpPacket;
use std::collections::BTreeSet;
use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::error::SourceError;

/// UDP port DNS traffic is captured on.
pub const DNS_PORT: u16 = 53;

/// A captured link-layer frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    pub data: Vec<u8>,
    /// Length of the frame on the wire, which can exceed `data.len()` when truncated
    pub wire_len: usize,
}

impl RawPacket {
    pub fn new(data: Vec<u8>) -> Self {
        let wire_len = data.len();
        Self { data, wire_len }
    }
}

/// Outcome of one poll of a packet source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    Packet(RawPacket),
    /// The poll window elapsed without a packet
    Idle,
    /// The source has no more packets to deliver
    Closed,
}

/// Blocking packet feed bound to one interface.
pub trait PacketSource: Send {
    /// Waits at most one poll window for the next packet.
    fn next_event(&mut self) -> Result<SourceEvent, SourceError>;
}

/// Opens packet sources; shared by every capture session.
pub trait PacketSourceFactory: Send + Sync {
    fn open(&self, interface: &str) -> Result<Box<dyn PacketSource>, SourceError>;

    /// Names of interfaces this factory can capture on.
    fn interfaces(&self) -> Vec<String>;
}

/// Keeps only UDP frames with port 53 on either side.
pub fn is_dns_udp_frame(frame: &[u8]) -> bool {
    let Some(ethernet) = EthernetPacket::new(frame) else {
        return false;
    };

    match ethernet.get_ethertype() {
        EtherTypes::Ipv4 => Ipv4Packet::new(ethernet.payload())
            .filter(|ip| ip.get_next_level_protocol() == IpNextHeaderProtocols::Udp)
            .is_some_and(|ip| udp_touches_dns_port(ip.payload())),
        EtherTypes::Ipv6 => Ipv6Packet::new(ethernet.payload())
            .filter(|ip| ip.get_next_header() == IpNextHeaderProtocols::Udp)
            .is_some_and(|ip| udp_touches_dns_port(ip.payload())),
        _ => false,
    }
}

fn udp_touches_dns_port(segment: &[u8]) -> bool {
    UdpPacket::new(segment)
        .is_some_and(|udp| udp.get_source() == DNS_PORT || udp.get_destination() == DNS_PORT)
}

/// Captures from real interfaces through `pnet::datalink`.
#[derive(Debug, Clone)]
pub struct PnetSourceFactory {
    read_timeout: Duration,
}

impl PnetSourceFactory {
    pub fn new(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }

    fn find_interface(name: &str) -> Option<NetworkInterface> {
        datalink::interfaces()
            .into_iter()
            .find(|iface| iface.name == name)
    }
}

impl PacketSourceFactory for PnetSourceFactory {
    fn open(&self, interface: &str) -> Result<Box<dyn PacketSource>, SourceError> {
        let iface = Self::find_interface(interface)
            .ok_or_else(|| SourceError::InterfaceNotFound(interface.to_string()))?;

        let config = datalink::Config {
            read_timeout: Some(self.read_timeout),
            ..Default::default()
        };

        let rx = match datalink::channel(&iface, config) {
            Ok(Ethernet(_tx, rx)) => rx,
            Ok(_) => return Err(SourceError::UnsupportedChannel),
            Err(e) => return Err(SourceError::from_open(e)),
        };

        info!("Opened datalink channel on {} (udp port {DNS_PORT})", iface.name);
        Ok(Box::new(PnetPacketSource { rx }))
    }

    fn interfaces(&self) -> Vec<String> {
        match if_addrs::get_if_addrs() {
            Ok(addrs) => addrs
                .into_iter()
                .map(|iface| iface.name)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
            Err(e) => {
                warn!("Failed to enumerate interface addresses: {e}, falling back to datalink");
                datalink::interfaces().into_iter().map(|iface| iface.name).collect()
            }
        }
    }
}

pub struct PnetPacketSource {
    rx: Box<dyn DataLinkReceiver>,
}

impl PacketSource for PnetPacketSource {
    fn next_event(&mut self) -> Result<SourceEvent, SourceError> {
        match self.rx.next() {
            Ok(frame) if is_dns_udp_frame(frame) => Ok(SourceEvent::Packet(RawPacket::new(frame.to_vec()))),
            Ok(_) => Ok(SourceEvent::Idle),
            Err(e) if matches!(
                e.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ) => Ok(SourceEvent::Idle),
            Err(e) => Err(SourceError::Receive(e)),
        }
    }
}

/// Sending half handed to whatever produces frames for a [`ChannelSourceFactory`].
#[derive(Debug, Clone)]
pub struct PacketFeed {
    sender: SyncSender<RawPacket>,
}

impl PacketFeed {
    /// Queues a frame, dropping it when the buffer is full or the capture is gone.
    pub fn push(&self, packet: RawPacket) -> bool {
        match self.sender.try_send(packet) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("Packet feed full, dropping frame");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Queues a frame, waiting for buffer space.
    pub fn send(&self, packet: RawPacket) -> bool {
        self.sender.send(packet).is_ok()
    }
}

/// Factory whose sessions read frames pushed through a bounded channel.
///
/// Frames pushed while no session is open stay buffered for the next one.
#[derive(Debug)]
pub struct ChannelSourceFactory {
    receiver: Arc<Mutex<Receiver<RawPacket>>>,
    poll_interval: Duration,
    interface_names: Vec<String>,
}

impl ChannelSourceFactory {
    pub fn new(capacity: usize, poll_interval: Duration) -> (Self, PacketFeed) {
        let (sender, receiver) = mpsc::sync_channel(capacity);
        let factory = Self {
            receiver: Arc::new(Mutex::new(receiver)),
            poll_interval,
            interface_names: Vec::new(),
        };
        (factory, PacketFeed { sender })
    }

    /// Restricts `open` to the given interface names.
    pub fn with_interfaces<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interface_names = names.into_iter().map(Into::into).collect();
        self
    }
}

impl PacketSourceFactory for ChannelSourceFactory {
    fn open(&self, interface: &str) -> Result<Box<dyn PacketSource>, SourceError> {
        if !self.interface_names.is_empty() && !self.interface_names.iter().any(|n| n == interface) {
            return Err(SourceError::InterfaceNotFound(interface.to_string()));
        }

        Ok(Box::new(ChannelPacketSource {
            receiver: Arc::clone(&self.receiver),
            poll_interval: self.poll_interval,
        }))
    }

    fn interfaces(&self) -> Vec<String> {
        self.interface_names.clone()
    }
}

pub struct ChannelPacketSource {
    receiver: Arc<Mutex<Receiver<RawPacket>>>,
    poll_interval: Duration,
}

impl PacketSource for ChannelPacketSource {
    fn next_event(&mut self) -> Result<SourceEvent, SourceError> {
        let receiver = self.receiver.lock().unwrap_or_else(PoisonError::into_inner);
        match receiver.recv_timeout(self.poll_interval) {
            Ok(packet) => Ok(SourceEvent::Packet(packet)),
            Err(RecvTimeoutError::Timeout) => Ok(SourceEvent::Idle),
            Err(RecvTimeoutError::Disconnected) => Ok(SourceEvent::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn udp_frame(source_port: u16, dest_port: u16) -> Vec<u8> {
        let mut frame = vec![0u8; 14 + 20 + 8];
        frame[12] = 0x08; // ethertype IPv4
        frame[14] = 0x45; // version 4, ihl 5
        frame[16..18].copy_from_slice(&28u16.to_be_bytes());
        frame[23] = 17; // udp
        frame[34..36].copy_from_slice(&source_port.to_be_bytes());
        frame[36..38].copy_from_slice(&dest_port.to_be_bytes());
        frame[38..40].copy_from_slice(&8u16.to_be_bytes());
        frame
    }

    #[test]
    fn test_dns_frame_filter() {
        assert!(is_dns_udp_frame(&udp_frame(40000, 53)));
        assert!(is_dns_udp_frame(&udp_frame(53, 40000)));
        assert!(!is_dns_udp_frame(&udp_frame(40000, 443)));
        assert!(!is_dns_udp_frame(&[0u8; 10]));

        let mut tcp = udp_frame(40000, 53);
        tcp[23] = 6;
        assert!(!is_dns_udp_frame(&tcp));
    }

    #[test]
    fn test_channel_source_delivers_then_idles_then_closes() {
        let (factory, feed) = ChannelSourceFactory::new(4, Duration::from_millis(10));
        let mut source = factory.open("eth0").unwrap();

        assert!(feed.push(RawPacket::new(vec![1, 2, 3])));
        assert_eq!(
            source.next_event().unwrap(),
            SourceEvent::Packet(RawPacket::new(vec![1, 2, 3]))
        );
        assert_eq!(source.next_event().unwrap(), SourceEvent::Idle);

        drop(feed);
        assert_eq!(source.next_event().unwrap(), SourceEvent::Closed);
    }

    #[test]
    fn test_channel_factory_rejects_unknown_interface() {
        let (factory, _feed) = ChannelSourceFactory::new(1, Duration::from_millis(10));
        let factory = factory.with_interfaces(["eth0"]);

        assert!(factory.open("eth0").is_ok());
        assert!(matches!(
            factory.open("wlan9"),
            Err(SourceError::InterfaceNotFound(name)) if name == "wlan9"
        ));
        assert_eq!(factory.interfaces(), vec!["eth0".to_string()]);
    }

    #[test]
    fn test_full_feed_drops() {
        let (_factory, feed) = ChannelSourceFactory::new(1, Duration::from_millis(10));
        assert!(feed.push(RawPacket::new(vec![1])));
        assert!(!feed.push(RawPacket::new(vec![2])));
    }
}
