//! Ethernet II framing, with optional 802.1Q tag

use super::{EtherType, MacAddr, VlanTag};
use crate::{Error, Result};

/// Ethernet header size without a VLAN tag
pub const HEADER_SIZE: usize = 14;
/// Ethernet header size with one VLAN tag
pub const VLAN_HEADER_SIZE: usize = 18;
/// Minimum frame size on the wire (without FCS); shorter frames get padded
pub const MIN_FRAME_SIZE: usize = 60;
/// Maximum frame size (without FCS, with VLAN tag)
pub const MAX_FRAME_SIZE: usize = 1522;

/// Parsed Ethernet frame (zero-copy reference)
#[derive(Debug)]
pub struct Frame<'a> {
    buffer: &'a [u8],
    ethertype: u16,
    payload_offset: usize,
}

impl<'a> Frame<'a> {
    /// Parse an Ethernet frame from a buffer
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::Parse("frame too short".into()));
        }

        let outer = u16::from_be_bytes([buffer[12], buffer[13]]);

        if outer != EtherType::Vlan as u16 {
            return Ok(Self {
                buffer,
                ethertype: outer,
                payload_offset: HEADER_SIZE,
            });
        }

        if buffer.len() < VLAN_HEADER_SIZE {
            return Err(Error::Parse("VLAN frame too short".into()));
        }

        Ok(Self {
            buffer,
            ethertype: u16::from_be_bytes([buffer[16], buffer[17]]),
            payload_offset: VLAN_HEADER_SIZE,
        })
    }

    /// EtherType of the payload (the inner one for tagged frames)
    pub fn ethertype(&self) -> u16 {
        self.ethertype
    }

    /// Everything after the link header, including any trailing padding
    pub fn payload(&self) -> &'a [u8] {
        &self.buffer[self.payload_offset..]
    }
}

/// Builder for constructing Ethernet frames
pub struct FrameBuilder {
    buffer: Vec<u8>,
    pad: bool,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_FRAME_SIZE),
            pad: false,
        }
    }

    pub fn dst_mac(mut self, mac: MacAddr) -> Self {
        self.buffer.extend_from_slice(&mac.0);
        self
    }

    pub fn src_mac(mut self, mac: MacAddr) -> Self {
        self.buffer.extend_from_slice(&mac.0);
        self
    }

    pub fn vlan_tag(mut self, tag: VlanTag) -> Self {
        self.buffer
            .extend_from_slice(&(EtherType::Vlan as u16).to_be_bytes());
        self.buffer.extend_from_slice(&tag.to_bytes());
        self
    }

    pub fn ethertype(mut self, ethertype: u16) -> Self {
        self.buffer.extend_from_slice(&ethertype.to_be_bytes());
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.buffer.extend_from_slice(payload);
        self
    }

    /// Zero-pad the frame to the 60-byte wire minimum, as a NIC would
    pub fn pad_to_minimum(mut self) -> Self {
        self.pad = true;
        self
    }

    pub fn build(mut self) -> Vec<u8> {
        if self.pad && self.buffer.len() < MIN_FRAME_SIZE {
            self.buffer.resize(MIN_FRAME_SIZE, 0);
        }
        self.buffer
    }
}

impl Default for FrameBuilder {
    fn default() -> Self {
        Self::new()
    }
}
