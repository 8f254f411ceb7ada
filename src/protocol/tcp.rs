//! TCP protocol - RFC 9293
//!
//! Header view used to pull the source port, flags and segment data.

use crate::{Error, Result};

/// Minimum TCP header size (without options)
pub const MIN_HEADER_SIZE: usize = 20;

/// TCP flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFlags {
    pub fin: bool,
    pub syn: bool,
    pub rst: bool,
    pub psh: bool,
    pub ack: bool,
    pub urg: bool,
    pub ece: bool,
    pub cwr: bool,
}

impl TcpFlags {
    pub const SYN: TcpFlags = TcpFlags {
        fin: false,
        syn: true,
        rst: false,
        psh: false,
        ack: false,
        urg: false,
        ece: false,
        cwr: false,
    };

    pub const PSH_ACK: TcpFlags = TcpFlags {
        fin: false,
        syn: false,
        rst: false,
        psh: true,
        ack: true,
        urg: false,
        ece: false,
        cwr: false,
    };

    /// Parse flags from the 13th byte of TCP header
    pub fn from_byte(byte: u8) -> Self {
        Self {
            fin: (byte & 0x01) != 0,
            syn: (byte & 0x02) != 0,
            rst: (byte & 0x04) != 0,
            psh: (byte & 0x08) != 0,
            ack: (byte & 0x10) != 0,
            urg: (byte & 0x20) != 0,
            ece: (byte & 0x40) != 0,
            cwr: (byte & 0x80) != 0,
        }
    }

    pub fn to_byte(&self) -> u8 {
        [
            self.fin, self.syn, self.rst, self.psh, self.ack, self.urg, self.ece, self.cwr,
        ]
        .iter()
        .enumerate()
        .fold(0u8, |byte, (bit, &set)| byte | ((set as u8) << bit))
    }
}

/// Parsed TCP header (zero-copy reference)
#[derive(Debug)]
pub struct TcpHeader<'a> {
    buffer: &'a [u8],
    header_len: usize,
}

impl<'a> TcpHeader<'a> {
    /// Parse TCP header from buffer
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < MIN_HEADER_SIZE {
            return Err(Error::Parse("TCP header too short".into()));
        }

        let header_len = ((buffer[12] >> 4) as usize) * 4;

        if header_len < MIN_HEADER_SIZE {
            return Err(Error::Parse("TCP data offset too small".into()));
        }

        if buffer.len() < header_len {
            return Err(Error::Parse("TCP header truncated".into()));
        }

        Ok(Self { buffer, header_len })
    }

    /// Source port (offset 0-1)
    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes([self.buffer[0], self.buffer[1]])
    }

    pub fn flags(&self) -> TcpFlags {
        TcpFlags::from_byte(self.buffer[13])
    }

    /// Segment data after the header and options
    pub fn payload(&self) -> &'a [u8] {
        &self.buffer[self.header_len..]
    }
}

/// Builder for TCP segments (checksum left zero)
#[derive(Debug, Clone, Default)]
pub struct TcpBuilder {
    src_port: u16,
    dst_port: u16,
    seq_num: u32,
    ack_num: u32,
    flags: TcpFlags,
    window: u16,
    options: Vec<u8>,
    payload: Vec<u8>,
}

impl TcpBuilder {
    pub fn new() -> Self {
        Self {
            window: 64240,
            ..Default::default()
        }
    }

    pub fn src_port(mut self, port: u16) -> Self {
        self.src_port = port;
        self
    }

    pub fn dst_port(mut self, port: u16) -> Self {
        self.dst_port = port;
        self
    }

    pub fn seq_num(mut self, seq: u32) -> Self {
        self.seq_num = seq;
        self
    }

    pub fn ack_num(mut self, ack: u32) -> Self {
        self.ack_num = ack;
        self
    }

    pub fn flags(mut self, flags: TcpFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Raw option bytes, zero-padded to a 4-byte boundary on build
    pub fn options(mut self, options: &[u8]) -> Self {
        self.options = options.to_vec();
        self
    }

    pub fn payload(mut self, data: &[u8]) -> Self {
        self.payload = data.to_vec();
        self
    }

    pub fn build(self) -> Vec<u8> {
        let options_len = self.options.len().div_ceil(4) * 4;
        let header_len = MIN_HEADER_SIZE + options_len;
        let mut buffer = vec![0u8; header_len + self.payload.len()];

        buffer[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        buffer[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        buffer[4..8].copy_from_slice(&self.seq_num.to_be_bytes());
        buffer[8..12].copy_from_slice(&self.ack_num.to_be_bytes());
        buffer[12] = ((header_len / 4) as u8) << 4;
        buffer[13] = self.flags.to_byte();
        buffer[14..16].copy_from_slice(&self.window.to_be_bytes());
        buffer[MIN_HEADER_SIZE..MIN_HEADER_SIZE + self.options.len()]
            .copy_from_slice(&self.options);
        buffer[header_len..].copy_from_slice(&self.payload);

        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_tcp_segment() -> Vec<u8> {
        // src_port=12345, dst_port=80, seq=1, ack=0, flags=SYN
        vec![
            0x30, 0x39, // src_port = 12345
            0x00, 0x50, // dst_port = 80
            0x00, 0x00, 0x00, 0x01, // seq = 1
            0x00, 0x00, 0x00, 0x00, // ack = 0
            0x50, // data_offset = 5 (20 bytes), reserved = 0
            0x02, // flags = SYN
            0x72, 0x10, // window = 29200
            0x00, 0x00, // checksum
            0x00, 0x00, // urgent_ptr = 0
        ]
    }

    #[test]
    fn test_tcp_flags_from_byte() {
        let flags = TcpFlags::from_byte(0x02);
        assert!(flags.syn);
        assert!(!flags.ack);

        let flags = TcpFlags::from_byte(0x18);
        assert!(flags.psh);
        assert!(flags.ack);
        assert!(!flags.syn);
    }

    #[test]
    fn test_tcp_flags_to_byte() {
        assert_eq!(TcpFlags::SYN.to_byte(), 0x02);
        assert_eq!(TcpFlags::PSH_ACK.to_byte(), 0x18);
        assert_eq!(TcpFlags::from_byte(0xff).to_byte(), 0xff);
    }

    #[test]
    fn test_tcp_header_parse() {
        let seg = make_tcp_segment();
        let hdr = TcpHeader::parse(&seg).unwrap();

        assert_eq!(hdr.src_port(), 12345);
        assert!(hdr.flags().syn);
        assert!(hdr.payload().is_empty());
    }

    #[test]
    fn test_tcp_header_parse_too_short() {
        assert!(TcpHeader::parse(&[0u8; 19]).is_err());
    }

    #[test]
    fn test_tcp_header_parse_bad_offset() {
        let mut seg = make_tcp_segment();
        seg[12] = 0x10; // data_offset = 1
        assert!(TcpHeader::parse(&seg).is_err());
    }

    #[test]
    fn test_tcp_header_options_truncated() {
        let mut seg = make_tcp_segment();
        seg[12] = 0x60; // data_offset = 6, but no option bytes follow
        assert!(TcpHeader::parse(&seg).is_err());
    }

    #[test]
    fn test_tcp_with_payload() {
        let mut seg = make_tcp_segment();
        seg.extend_from_slice(b"GET / HTTP/1.1\r\n");

        let hdr = TcpHeader::parse(&seg).unwrap();
        assert_eq!(hdr.payload(), b"GET / HTTP/1.1\r\n");
    }

    #[test]
    fn test_builder_with_options_skips_them_in_payload() {
        // MSS option (4 bytes) + one NOP padded to 8
        let seg = TcpBuilder::new()
            .src_port(40000)
            .dst_port(9000)
            .flags(TcpFlags::PSH_ACK)
            .options(&[0x02, 0x04, 0x05, 0xb4, 0x01])
            .payload(b"data")
            .build();

        let hdr = TcpHeader::parse(&seg).unwrap();
        assert_eq!(seg[12] >> 4, 7);
        assert_eq!(hdr.src_port(), 40000);
        assert_eq!(&seg[2..4], &9000u16.to_be_bytes());
        assert_eq!(hdr.flags(), TcpFlags::PSH_ACK);
        assert_eq!(hdr.payload(), b"data");
    }
}
