//! Frame classification
//!
//! Walks one captured frame through Ethernet, IPv4/IPv6 and TCP/UDP and
//! decides whether it carries application data worth handing upward.
//! Anything that cannot be parsed is a skip, never an error: a raw capture
//! sees all sorts of noise and none of it should stop the receive loop.
//!
//! SYN segments without data are dropped on purpose. Senders open with a
//! bare SYN so stateful middleboxes see a normal handshake start, then send
//! the real message as PSH+ACK. A bare SYN from an unrelated client on the
//! same port looks identical and is dropped the same way.

use crate::protocol::ethernet::Frame;
use crate::protocol::ipv4::Ipv4Header;
use crate::protocol::ipv6::Ipv6Header;
use crate::protocol::tcp::TcpHeader;
use crate::protocol::udp::UdpHeader;
use crate::protocol::{EtherType, IpProtocol};
use crate::Result;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Outcome of inspecting a single frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification<'a> {
    /// Frame carries data; `payload` borrows the capture buffer
    Deliver { payload: &'a [u8], addr: SocketAddr },
    /// Nothing to hand upward; read the next frame
    Skip(SkipReason),
}

/// Why a frame was not delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// A header failed its bounds or version checks
    Malformed,
    /// EtherType is neither IPv4 nor IPv6
    NoNetworkLayer,
    /// Part of a fragmented datagram; no fragment holds the whole message
    Fragment,
    /// Upper layer is not TCP or UDP
    NoTransportLayer,
    /// SYN with no data
    HandshakeProbe,
    /// Valid segment with nothing after the transport header
    NoPayload,
}

impl SkipReason {
    pub const ALL: [SkipReason; 6] = [
        SkipReason::Malformed,
        SkipReason::NoNetworkLayer,
        SkipReason::Fragment,
        SkipReason::NoTransportLayer,
        SkipReason::HandshakeProbe,
        SkipReason::NoPayload,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Malformed => "malformed",
            SkipReason::NoNetworkLayer => "no_network_layer",
            SkipReason::Fragment => "fragment",
            SkipReason::NoTransportLayer => "no_transport_layer",
            SkipReason::HandshakeProbe => "handshake_probe",
            SkipReason::NoPayload => "no_payload",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

enum Network<'a> {
    Ipv4(Ipv4Header<'a>),
    Ipv6(Ipv6Header<'a>),
    Unknown,
}

enum Transport<'a> {
    Tcp(TcpHeader<'a>),
    Udp(UdpHeader<'a>),
    Unknown,
}

/// Classify one raw Ethernet frame.
///
/// Pure function of its input; the returned payload borrows `frame`.
pub fn classify(frame: &[u8]) -> Classification<'_> {
    match try_classify(frame) {
        Ok(classification) => classification,
        Err(_) => Classification::Skip(SkipReason::Malformed),
    }
}

fn try_classify(frame: &[u8]) -> Result<Classification<'_>> {
    let frame = Frame::parse(frame)?;

    let (src_ip, protocol, segment) = match network_layer(&frame)? {
        Network::Ipv4(ip) => {
            if ip.is_fragment() {
                return Ok(Classification::Skip(SkipReason::Fragment));
            }
            (IpAddr::V4(ip.src_addr()), ip.protocol(), ip.payload())
        }
        Network::Ipv6(ip) => {
            let upper = ip.upper_layer()?;
            if upper.fragment {
                return Ok(Classification::Skip(SkipReason::Fragment));
            }
            (IpAddr::V6(ip.src_addr()), upper.protocol, upper.data)
        }
        Network::Unknown => return Ok(Classification::Skip(SkipReason::NoNetworkLayer)),
    };

    let outcome = match transport_layer(protocol, segment)? {
        Transport::Tcp(tcp) => {
            let payload = tcp.payload();
            if tcp.flags().syn && payload.is_empty() {
                Classification::Skip(SkipReason::HandshakeProbe)
            } else {
                deliver(payload, SocketAddr::new(src_ip, tcp.src_port()))
            }
        }
        Transport::Udp(udp) => deliver(udp.payload(), SocketAddr::new(src_ip, udp.src_port())),
        Transport::Unknown => Classification::Skip(SkipReason::NoTransportLayer),
    };

    Ok(outcome)
}

fn network_layer<'a>(frame: &Frame<'a>) -> Result<Network<'a>> {
    Ok(match EtherType::from_u16(frame.ethertype()) {
        Some(EtherType::Ipv4) => Network::Ipv4(Ipv4Header::parse(frame.payload())?),
        Some(EtherType::Ipv6) => Network::Ipv6(Ipv6Header::parse(frame.payload())?),
        // Stacked tags and everything else
        Some(EtherType::Vlan) | None => Network::Unknown,
    })
}

fn transport_layer(protocol: u8, segment: &[u8]) -> Result<Transport<'_>> {
    Ok(match IpProtocol::from_u8(protocol) {
        Some(IpProtocol::Tcp) => Transport::Tcp(TcpHeader::parse(segment)?),
        Some(IpProtocol::Udp) => Transport::Udp(UdpHeader::parse(segment)?),
        _ => Transport::Unknown,
    })
}

fn deliver(payload: &[u8], addr: SocketAddr) -> Classification<'_> {
    if payload.is_empty() {
        Classification::Skip(SkipReason::NoPayload)
    } else {
        Classification::Deliver { payload, addr }
    }
}
