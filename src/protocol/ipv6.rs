//! IPv6 protocol - RFC 8200

use super::IpProtocol;
use crate::{Error, Result};
use std::net::Ipv6Addr;

/// IPv6 header size (fixed, unlike IPv4)
pub const HEADER_SIZE: usize = 40;

/// Fragment extension header size (fixed)
pub const FRAGMENT_HEADER_SIZE: usize = 8;

/// Parsed IPv6 header (zero-copy reference)
#[derive(Debug)]
pub struct Ipv6Header<'a> {
    buffer: &'a [u8],
    packet_len: usize,
}

/// Where the extension-header chain ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpperLayer<'a> {
    /// Protocol number of the first non-extension header
    pub protocol: u8,
    /// Bytes starting at that header
    pub data: &'a [u8],
    /// Set when a Fragment header was crossed that splits the datagram
    /// (non-zero offset or M flag). Atomic fragments leave it clear.
    pub fragment: bool,
}

impl<'a> Ipv6Header<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::Parse("IPv6 header too short".into()));
        }

        let version = buffer[0] >> 4;
        if version != 6 {
            return Err(Error::Parse("not an IPv6 packet".into()));
        }

        // Payload Length 0 means a jumbogram (or offload); use what we have
        let payload_length = u16::from_be_bytes([buffer[4], buffer[5]]) as usize;
        let packet_len = if payload_length == 0 {
            buffer.len()
        } else {
            (HEADER_SIZE + payload_length).min(buffer.len())
        };

        Ok(Self { buffer, packet_len })
    }

    /// Next Header (protocol or first extension header)
    pub fn next_header(&self) -> u8 {
        self.buffer[6]
    }

    pub fn src_addr(&self) -> Ipv6Addr {
        addr_at(self.buffer, 8)
    }

    /// Payload after the fixed header, bounded by Payload Length
    pub fn payload(&self) -> &'a [u8] {
        &self.buffer[HEADER_SIZE..self.packet_len]
    }

    /// Skip Hop-by-Hop, Routing, Destination Options and Fragment headers
    /// and return the first upper-layer header.
    pub fn upper_layer(&self) -> Result<UpperLayer<'a>> {
        let mut protocol = self.next_header();
        let mut data = self.payload();
        let mut fragment = false;

        while let Some(ext) = IpProtocol::from_u8(protocol).filter(|p| p.is_ipv6_extension()) {
            if data.len() < 8 {
                return Err(Error::Parse("IPv6 extension header truncated".into()));
            }

            let ext_len = if ext == IpProtocol::Fragment {
                let field = u16::from_be_bytes([data[2], data[3]]);
                let (offset, more) = (field >> 3, field & 1 != 0);
                fragment |= offset > 0 || more;
                FRAGMENT_HEADER_SIZE
            } else {
                (data[1] as usize + 1) * 8
            };

            if data.len() < ext_len {
                return Err(Error::Parse("IPv6 extension header truncated".into()));
            }

            protocol = data[0];
            data = &data[ext_len..];
        }

        Ok(UpperLayer {
            protocol,
            data,
            fragment,
        })
    }
}

fn addr_at(buffer: &[u8], offset: usize) -> Ipv6Addr {
    let mut octets = [0u8; 16];
    octets.copy_from_slice(&buffer[offset..offset + 16]);
    Ipv6Addr::from(octets)
}

/// Builder for constructing IPv6 packets
#[derive(Debug, Clone)]
pub struct Ipv6Builder {
    traffic_class: u8,
    flow_label: u32,
    next_header: u8,
    hop_limit: u8,
    src_addr: Ipv6Addr,
    dst_addr: Ipv6Addr,
    payload: Vec<u8>,
}

impl Ipv6Builder {
    pub fn new() -> Self {
        Self {
            traffic_class: 0,
            flow_label: 0,
            next_header: IpProtocol::NoNextHeader as u8,
            hop_limit: 64,
            src_addr: Ipv6Addr::UNSPECIFIED,
            dst_addr: Ipv6Addr::UNSPECIFIED,
            payload: Vec::new(),
        }
    }

    pub fn traffic_class(mut self, tc: u8) -> Self {
        self.traffic_class = tc;
        self
    }

    pub fn flow_label(mut self, fl: u32) -> Self {
        self.flow_label = fl & 0xFFFFF;
        self
    }

    pub fn next_header(mut self, nh: u8) -> Self {
        self.next_header = nh;
        self
    }

    pub fn hop_limit(mut self, hl: u8) -> Self {
        self.hop_limit = hl;
        self
    }

    pub fn src_addr(mut self, addr: Ipv6Addr) -> Self {
        self.src_addr = addr;
        self
    }

    pub fn dst_addr(mut self, addr: Ipv6Addr) -> Self {
        self.dst_addr = addr;
        self
    }

    /// Payload, including any extension headers the caller prepends
    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn build(self) -> Vec<u8> {
        let payload_length = self.payload.len() as u16;
        let mut buffer = vec![0u8; HEADER_SIZE + self.payload.len()];

        buffer[0] = 0x60 | (self.traffic_class >> 4);
        buffer[1] = ((self.traffic_class & 0x0F) << 4) | ((self.flow_label >> 16) as u8 & 0x0F);
        buffer[2] = (self.flow_label >> 8) as u8;
        buffer[3] = self.flow_label as u8;
        buffer[4..6].copy_from_slice(&payload_length.to_be_bytes());
        buffer[6] = self.next_header;
        buffer[7] = self.hop_limit;
        buffer[8..24].copy_from_slice(&self.src_addr.octets());
        buffer[24..40].copy_from_slice(&self.dst_addr.octets());
        buffer[HEADER_SIZE..].copy_from_slice(&self.payload);

        buffer
    }
}

impl Default for Ipv6Builder {
    fn default() -> Self {
        Self::new()
    }
}
