//! Turns captured frames into log entries.
//!
//! Extraction never fails loudly: every frame yields an [`Extraction`], and
//! frames that are not DNS questions carry a [`RejectReason`] the capture loop
//! logs and skips.

use chrono::{DateTime, Local};
use hickory_proto::op::Message;
use hickory_proto::serialize::binary::BinDecodable;
use pnet::packet::Packet;
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::udp::UdpPacket;
use std::fmt;
use std::net::IpAddr;

use crate::collectors::packet_source::{DNS_PORT, RawPacket};
use crate::models::{protocol_name, LogEntry};

/// An accepted frame: the entry to record plus context that is not part of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub entry: LogEntry,
    pub destination_ip: Option<IpAddr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Too short for an Ethernet header
    Truncated,
    /// Neither IPv4 nor IPv6, or the IP header is malformed
    NoNetworkLayer,
    NotUdp,
    NotDnsPort,
    MalformedDns,
    NoQuestion,
    EmptyDomain,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            RejectReason::Truncated => "truncated frame",
            RejectReason::NoNetworkLayer => "no network layer",
            RejectReason::NotUdp => "not udp",
            RejectReason::NotDnsPort => "not on the dns port",
            RejectReason::MalformedDns => "malformed dns message",
            RejectReason::NoQuestion => "dns message without question",
            RejectReason::EmptyDomain => "empty query name",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Accepted(Observation),
    Rejected(RejectReason),
}

impl Extraction {
    pub fn accepted(self) -> Option<Observation> {
        match self {
            Extraction::Accepted(observation) => Some(observation),
            Extraction::Rejected(_) => None,
        }
    }
}

struct NetworkLayer<'a> {
    source: IpAddr,
    destination: IpAddr,
    protocol: u8,
    payload: &'a [u8],
}

/// Extracts an entry stamped with the current local time.
pub fn extract(packet: &RawPacket) -> Extraction {
    extract_at(packet, Local::now())
}

pub fn extract_at(packet: &RawPacket, captured_at: DateTime<Local>) -> Extraction {
    let Some(ethernet) = EthernetPacket::new(&packet.data) else {
        return Extraction::Rejected(RejectReason::Truncated);
    };

    let network = match network_layer(&ethernet) {
        Ok(network) => network,
        Err(reason) => return Extraction::Rejected(reason),
    };

    if network.protocol != IpNextHeaderProtocols::Udp.0 {
        return Extraction::Rejected(RejectReason::NotUdp);
    }
    let Some(udp) = UdpPacket::new(network.payload) else {
        return Extraction::Rejected(RejectReason::NotUdp);
    };
    if udp.get_source() != DNS_PORT && udp.get_destination() != DNS_PORT {
        return Extraction::Rejected(RejectReason::NotDnsPort);
    }

    let domain = match query_name(udp.payload()) {
        Ok(domain) => domain,
        Err(reason) => return Extraction::Rejected(reason),
    };

    let entry = LogEntry::new(
        network.source.to_string(),
        domain,
        protocol_name(network.protocol),
        packet.wire_len as u64,
        captured_at,
    );

    Extraction::Accepted(Observation {
        entry,
        destination_ip: Some(network.destination),
    })
}

fn network_layer<'a>(ethernet: &'a EthernetPacket<'a>) -> Result<NetworkLayer<'a>, RejectReason> {
    match ethernet.get_ethertype() {
        EtherTypes::Ipv4 => {
            let ip = Ipv4Packet::new(ethernet.payload()).ok_or(RejectReason::NoNetworkLayer)?;
            let header_len = usize::from(ip.get_header_length()) * 4;
            let total_len = usize::from(ip.get_total_length()).min(ethernet.payload().len());
            if header_len < 20 || total_len < header_len {
                return Err(RejectReason::NoNetworkLayer);
            }
            Ok(NetworkLayer {
                source: IpAddr::V4(ip.get_source()),
                destination: IpAddr::V4(ip.get_destination()),
                protocol: ip.get_next_level_protocol().0,
                payload: &ethernet.payload()[header_len..total_len],
            })
        }
        EtherTypes::Ipv6 => {
            let ip = Ipv6Packet::new(ethernet.payload()).ok_or(RejectReason::NoNetworkLayer)?;
            let end = (40 + usize::from(ip.get_payload_length())).min(ethernet.payload().len());
            Ok(NetworkLayer {
                source: IpAddr::V6(ip.get_source()),
                destination: IpAddr::V6(ip.get_destination()),
                protocol: ip.get_next_header().0,
                payload: &ethernet.payload()[40..end],
            })
        }
        _ => Err(RejectReason::NoNetworkLayer),
    }
}

/// First question name of a DNS message, without the trailing dot.
fn query_name(payload: &[u8]) -> Result<String, RejectReason> {
    let message = Message::from_bytes(payload).map_err(|_| RejectReason::MalformedDns)?;
    let query = message.queries().first().ok_or(RejectReason::NoQuestion)?;

    let name = query.name().to_utf8();
    let domain = name.trim_end_matches('.');
    if domain.is_empty() {
        return Err(RejectReason::EmptyDomain);
    }
    Ok(domain.to_string())
}
