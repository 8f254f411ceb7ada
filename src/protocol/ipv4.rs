//! IPv4 protocol - RFC 791

use crate::{Error, Result};
use std::net::Ipv4Addr;

/// Minimum IPv4 header size (without options)
pub const MIN_HEADER_SIZE: usize = 20;

/// Parsed IPv4 header (zero-copy reference)
///
/// The payload is cut at Total Length so link-layer padding never leaks
/// into the transport layer.
#[derive(Debug)]
pub struct Ipv4Header<'a> {
    buffer: &'a [u8],
    header_len: usize,
    packet_len: usize,
}

impl<'a> Ipv4Header<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < MIN_HEADER_SIZE {
            return Err(Error::Parse("IPv4 header too short".into()));
        }

        let version = buffer[0] >> 4;
        if version != 4 {
            return Err(Error::Parse("not an IPv4 packet".into()));
        }

        let header_len = ((buffer[0] & 0x0F) as usize) * 4;
        if header_len < MIN_HEADER_SIZE {
            return Err(Error::Parse("IPv4 IHL too small".into()));
        }

        if buffer.len() < header_len {
            return Err(Error::Parse("IPv4 header truncated".into()));
        }

        // Total Length 0 shows up on segmentation-offloaded captures; trust
        // the captured length then. A length past the capture is truncation.
        let total_length = u16::from_be_bytes([buffer[2], buffer[3]]) as usize;
        let packet_len = if total_length == 0 {
            buffer.len()
        } else if total_length < header_len {
            return Err(Error::Parse("IPv4 total length shorter than header".into()));
        } else {
            total_length.min(buffer.len())
        };

        Ok(Self {
            buffer,
            header_len,
            packet_len,
        })
    }

    fn flags(&self) -> u8 {
        self.buffer[6] >> 5
    }

    /// Fragment offset in 8-byte units
    pub fn fragment_offset(&self) -> u16 {
        u16::from_be_bytes([self.buffer[6] & 0x1F, self.buffer[7]])
    }

    pub fn protocol(&self) -> u8 {
        self.buffer[9]
    }

    pub fn src_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(
            self.buffer[12],
            self.buffer[13],
            self.buffer[14],
            self.buffer[15],
        )
    }

    /// Bytes after the header, up to Total Length
    pub fn payload(&self) -> &'a [u8] {
        &self.buffer[self.header_len..self.packet_len]
    }

    /// More Fragments flag
    pub fn more_fragments(&self) -> bool {
        (self.flags() & flags::MF) != 0
    }

    /// Any piece of a fragmented datagram, first one included. The first
    /// fragment has a transport header but only part of its payload.
    pub fn is_fragment(&self) -> bool {
        self.more_fragments() || self.fragment_offset() > 0
    }
}

/// Fragment flags
pub mod flags {
    /// More Fragments
    pub const MF: u8 = 0b001;
}

/// Calculate IPv4 header checksum
pub fn checksum(header: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    for i in (0..header.len()).step_by(2) {
        let word = if i + 1 < header.len() {
            u16::from_be_bytes([header[i], header[i + 1]])
        } else {
            u16::from_be_bytes([header[i], 0])
        };
        sum = sum.wrapping_add(word as u32);
    }

    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !(sum as u16)
}

/// Builder for constructing IPv4 packets
#[derive(Debug, Clone)]
pub struct Ipv4Builder {
    identification: u16,
    dont_fragment: bool,
    more_fragments: bool,
    fragment_offset: u16,
    ttl: u8,
    protocol: u8,
    src_addr: Ipv4Addr,
    dst_addr: Ipv4Addr,
    payload: Vec<u8>,
}

impl Ipv4Builder {
    pub fn new() -> Self {
        Self {
            identification: 0,
            dont_fragment: true,
            more_fragments: false,
            fragment_offset: 0,
            ttl: 64,
            protocol: 0,
            src_addr: Ipv4Addr::UNSPECIFIED,
            dst_addr: Ipv4Addr::UNSPECIFIED,
            payload: Vec::new(),
        }
    }

    pub fn identification(mut self, id: u16) -> Self {
        self.identification = id;
        self
    }

    pub fn more_fragments(mut self, mf: bool) -> Self {
        self.more_fragments = mf;
        if mf {
            self.dont_fragment = false;
        }
        self
    }

    /// Fragment offset in 8-byte units
    pub fn fragment_offset(mut self, offset: u16) -> Self {
        self.fragment_offset = offset & 0x1FFF;
        if offset > 0 {
            self.dont_fragment = false;
        }
        self
    }

    pub fn ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn protocol(mut self, protocol: u8) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn src_addr(mut self, addr: Ipv4Addr) -> Self {
        self.src_addr = addr;
        self
    }

    pub fn dst_addr(mut self, addr: Ipv4Addr) -> Self {
        self.dst_addr = addr;
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn build(self) -> Vec<u8> {
        let total_length = (MIN_HEADER_SIZE + self.payload.len()) as u16;
        let mut buffer = vec![0u8; MIN_HEADER_SIZE + self.payload.len()];

        // Version (4) + IHL (5 = 20 bytes, no options)
        buffer[0] = 0x45;
        buffer[2..4].copy_from_slice(&total_length.to_be_bytes());
        buffer[4..6].copy_from_slice(&self.identification.to_be_bytes());

        let mut flags_frag = self.fragment_offset;
        if self.dont_fragment {
            flags_frag |= 0x4000;
        }
        if self.more_fragments {
            flags_frag |= 0x2000;
        }
        buffer[6..8].copy_from_slice(&flags_frag.to_be_bytes());

        buffer[8] = self.ttl;
        buffer[9] = self.protocol;
        buffer[12..16].copy_from_slice(&self.src_addr.octets());
        buffer[16..20].copy_from_slice(&self.dst_addr.octets());
        buffer[MIN_HEADER_SIZE..].copy_from_slice(&self.payload);

        let sum = checksum(&buffer[..MIN_HEADER_SIZE]);
        buffer[10..12].copy_from_slice(&sum.to_be_bytes());

        buffer
    }
}

impl Default for Ipv4Builder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_simple_packet() -> Vec<u8> {
        // IPv4 packet: src=192.168.1.1, dst=192.168.1.2, TTL=64, TCP
        let mut pkt = vec![
            0x45, // Version=4, IHL=5
            0x00, // DSCP=0, ECN=0
            0x00, 0x1c, // Total length = 28
            0x00, 0x00, // Identification
            0x40, 0x00, // Flags=DF, Fragment offset=0
            0x40, // TTL=64
            0x06, // Protocol=TCP
            0x00, 0x00, // Checksum (placeholder)
            192, 168, 1, 1, // Source
            192, 168, 1, 2, // Destination
            // Payload (8 bytes)
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08,
        ];
        let sum = checksum(&pkt[..20]);
        pkt[10..12].copy_from_slice(&sum.to_be_bytes());
        pkt
    }

    #[test]
    fn test_parse_simple() {
        let data = make_simple_packet();
        let hdr = Ipv4Header::parse(&data).unwrap();

        assert_eq!(hdr.protocol(), 6);
        assert_eq!(hdr.src_addr(), Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(hdr.payload().len(), 8);
        assert!(!hdr.is_fragment());
        assert_eq!(checksum(&data[..20]), 0);
    }

    #[test]
    fn test_parse_too_short() {
        let short = vec![0u8; 19];
        assert!(Ipv4Header::parse(&short).is_err());
    }

    #[test]
    fn test_parse_wrong_version() {
        let mut data = make_simple_packet();
        data[0] = 0x65;
        assert!(Ipv4Header::parse(&data).is_err());
    }

    #[test]
    fn test_parse_truncated_header() {
        let mut data = make_simple_packet();
        data[0] = 0x4F; // IHL=15 (60 bytes)
        assert!(Ipv4Header::parse(&data).is_err());
    }

    #[test]
    fn test_parse_ihl_below_minimum() {
        let mut data = make_simple_packet();
        data[0] = 0x44; // IHL=4 (16 bytes)
        assert!(Ipv4Header::parse(&data).is_err());
    }

    #[test]
    fn test_payload_excludes_trailing_padding() {
        let mut data = make_simple_packet();
        data.extend_from_slice(&[0u8; 6]);

        let hdr = Ipv4Header::parse(&data).unwrap();
        assert_eq!(hdr.payload(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_total_length_past_capture_is_truncated() {
        let mut data = make_simple_packet();
        data[2..4].copy_from_slice(&1500u16.to_be_bytes());

        let hdr = Ipv4Header::parse(&data).unwrap();
        assert_eq!(hdr.payload().len(), 8);
    }

    #[test]
    fn test_zero_total_length_uses_capture() {
        let mut data = make_simple_packet();
        data[2] = 0;
        data[3] = 0;

        let hdr = Ipv4Header::parse(&data).unwrap();
        assert_eq!(hdr.payload().len(), 8);
    }

    #[test]
    fn test_total_length_shorter_than_header() {
        let mut data = make_simple_packet();
        data[2..4].copy_from_slice(&10u16.to_be_bytes());
        assert!(Ipv4Header::parse(&data).is_err());
    }

    #[test]
    fn test_builder_fragment_fields() {
        let pkt = Ipv4Builder::new()
            .protocol(6)
            .more_fragments(true)
            .fragment_offset(185)
            .build();

        let hdr = Ipv4Header::parse(&pkt).unwrap();
        assert!(hdr.more_fragments());
        assert!(hdr.is_fragment());
        assert_eq!(hdr.fragment_offset(), 185);
        assert_eq!(checksum(&pkt[..20]), 0);
    }

    #[test]
    fn test_first_fragment_is_fragment() {
        let pkt = Ipv4Builder::new().protocol(6).more_fragments(true).build();

        let hdr = Ipv4Header::parse(&pkt).unwrap();
        assert_eq!(hdr.fragment_offset(), 0);
        assert!(hdr.is_fragment());
    }

    #[test]
    fn test_last_fragment_is_fragment() {
        let pkt = Ipv4Builder::new().protocol(6).fragment_offset(185).build();

        let hdr = Ipv4Header::parse(&pkt).unwrap();
        assert!(!hdr.more_fragments());
        assert!(hdr.is_fragment());
    }

    #[test]
    fn test_builder_roundtrip_fields() {
        let pkt = Ipv4Builder::new()
            .src_addr(Ipv4Addr::new(10, 0, 0, 1))
            .dst_addr(Ipv4Addr::new(10, 0, 0, 2))
            .identification(0x1234)
            .ttl(32)
            .protocol(17)
            .payload(b"abc")
            .build();

        let hdr = Ipv4Header::parse(&pkt).unwrap();
        assert_eq!(hdr.src_addr(), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(&pkt[16..20], &[10, 0, 0, 2]);
        assert_eq!(&pkt[4..6], &0x1234u16.to_be_bytes());
        assert_eq!(pkt[8], 32);
        assert_eq!(hdr.protocol(), 17);
        assert_eq!(hdr.payload(), b"abc");
        assert!(!hdr.is_fragment());
    }

    #[test]
    fn test_checksum_odd_length() {
        // Should not panic on odd input
        let _ = checksum(&[0x45, 0x00, 0x01]);
    }
}
