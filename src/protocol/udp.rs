//! UDP protocol - RFC 768

use crate::{Error, Result};

/// UDP header size (fixed)
pub const HEADER_SIZE: usize = 8;

/// Parsed UDP header (zero-copy reference)
#[derive(Debug)]
pub struct UdpHeader<'a> {
    buffer: &'a [u8],
    datagram_len: usize,
}

impl<'a> UdpHeader<'a> {
    /// Parse UDP header from buffer
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::Parse("UDP header too short".into()));
        }

        // Length 0 is how IPv6 jumbograms and offloaded captures show up
        let length = u16::from_be_bytes([buffer[4], buffer[5]]) as usize;
        let datagram_len = if length == 0 {
            buffer.len()
        } else if length < HEADER_SIZE {
            return Err(Error::Parse("UDP length shorter than header".into()));
        } else {
            length.min(buffer.len())
        };

        Ok(Self {
            buffer,
            datagram_len,
        })
    }

    /// Source port (offset 0-1)
    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes([self.buffer[0], self.buffer[1]])
    }

    /// Datagram data, bounded by the Length field
    pub fn payload(&self) -> &'a [u8] {
        &self.buffer[HEADER_SIZE..self.datagram_len]
    }
}

/// UDP datagram builder (checksum left zero, which IPv4 allows)
#[derive(Debug, Clone, Default)]
pub struct UdpBuilder {
    src_port: u16,
    dst_port: u16,
    payload: Vec<u8>,
}

impl UdpBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn src_port(mut self, port: u16) -> Self {
        self.src_port = port;
        self
    }

    pub fn dst_port(mut self, port: u16) -> Self {
        self.dst_port = port;
        self
    }

    pub fn payload(mut self, data: &[u8]) -> Self {
        self.payload = data.to_vec();
        self
    }

    pub fn build(self) -> Vec<u8> {
        let length = (HEADER_SIZE + self.payload.len()) as u16;
        let mut buffer = vec![0u8; HEADER_SIZE + self.payload.len()];

        buffer[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        buffer[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        buffer[4..6].copy_from_slice(&length.to_be_bytes());
        buffer[HEADER_SIZE..].copy_from_slice(&self.payload);

        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_udp_datagram() -> Vec<u8> {
        // src_port=12345, dst_port=53, length=12, payload="test"
        vec![
            0x30, 0x39, // src_port = 12345
            0x00, 0x35, // dst_port = 53
            0x00, 0x0c, // length = 12 (8 header + 4 data)
            0x00, 0x00, // checksum (not computed)
            b't', b'e', b's', b't',
        ]
    }

    #[test]
    fn test_udp_header_parse() {
        let dgram = make_udp_datagram();
        let hdr = UdpHeader::parse(&dgram).unwrap();

        assert_eq!(hdr.src_port(), 12345);
        assert_eq!(hdr.payload(), b"test");
    }

    #[test]
    fn test_udp_header_parse_too_short() {
        assert!(UdpHeader::parse(&[0u8; 7]).is_err());
    }

    #[test]
    fn test_udp_length_below_header() {
        let mut dgram = make_udp_datagram();
        dgram[5] = 0x04;
        assert!(UdpHeader::parse(&dgram).is_err());
    }

    #[test]
    fn test_udp_payload_bounded_by_length() {
        let mut dgram = make_udp_datagram();
        dgram.extend_from_slice(&[0, 0, 0]);

        let hdr = UdpHeader::parse(&dgram).unwrap();
        assert_eq!(hdr.payload(), b"test");
    }

    #[test]
    fn test_udp_zero_length_uses_capture() {
        let mut dgram = make_udp_datagram();
        dgram[4] = 0;
        dgram[5] = 0;

        let hdr = UdpHeader::parse(&dgram).unwrap();
        assert_eq!(hdr.payload(), b"test");
    }

    #[test]
    fn test_builder_matches_hand_built() {
        let dgram = UdpBuilder::new()
            .src_port(12345)
            .dst_port(53)
            .payload(b"test")
            .build();
        assert_eq!(dgram, make_udp_datagram());
    }
}
