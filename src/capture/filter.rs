//! Capture filter expressions
//!
//! Only one shape of expression is understood, `"<tcp|udp> and dst port N"`,
//! which is also valid pcap filter syntax. It compiles to the same classic
//! BPF program libpcap emits for Ethernet links, so the kernel and the
//! in-process interpreter agree on what passes.

use super::bpf::{self, Program};
use crate::protocol::{ethernet, EtherType, IpProtocol};
use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Largest snapshot length libpcap accepts; also what tcpdump uses by default
pub const MAX_SNAPLEN: u32 = 262_144;

/// Transport protocol named in a filter expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterProtocol {
    Tcp,
    Udp,
}

impl FilterProtocol {
    fn number(self) -> u32 {
        match self {
            FilterProtocol::Tcp => IpProtocol::Tcp as u32,
            FilterProtocol::Udp => IpProtocol::Udp as u32,
        }
    }
}

impl fmt::Display for FilterProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterProtocol::Tcp => f.write_str("tcp"),
            FilterProtocol::Udp => f.write_str("udp"),
        }
    }
}

/// `<protocol> and dst port <port>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFilter {
    pub protocol: FilterProtocol,
    pub dst_port: u16,
}

impl CaptureFilter {
    pub fn new(protocol: FilterProtocol, dst_port: u16) -> Self {
        Self { protocol, dst_port }
    }

    /// The filter a receive session installs
    pub fn tcp_dst_port(dst_port: u16) -> Self {
        Self::new(FilterProtocol::Tcp, dst_port)
    }

    /// Compile for DLT_EN10MB (untagged Ethernet).
    ///
    /// IPv6 is matched on the fixed header's Next Header only, and IPv4
    /// non-first fragments are rejected since they carry no ports.
    pub fn compile(&self, snaplen: u32) -> Program {
        const ETHERTYPE: u32 = 12;
        const L3: u32 = ethernet::HEADER_SIZE as u32;
        const IPV6_NEXT_HEADER: u32 = L3 + 6;
        const IPV6_DST_PORT: u32 = L3 + 40 + 2;
        const IPV4_PROTOCOL: u32 = L3 + 9;
        const IPV4_FRAGMENT: u32 = L3 + 6;

        let proto = self.protocol.number();
        let port = self.dst_port as u32;

        use bpf::*;
        Program::new(vec![
            /* 0 */ Instruction::stmt(BPF_LD | BPF_H | BPF_ABS, ETHERTYPE),
            /* 1 */ Instruction::jump(BPF_JMP | BPF_JEQ | BPF_K, EtherType::Ipv6 as u32, 0, 4),
            /* 2 */ Instruction::stmt(BPF_LD | BPF_B | BPF_ABS, IPV6_NEXT_HEADER),
            /* 3 */ Instruction::jump(BPF_JMP | BPF_JEQ | BPF_K, proto, 0, 11),
            /* 4 */ Instruction::stmt(BPF_LD | BPF_H | BPF_ABS, IPV6_DST_PORT),
            /* 5 */ Instruction::jump(BPF_JMP | BPF_JEQ | BPF_K, port, 8, 9),
            /* 6 */ Instruction::jump(BPF_JMP | BPF_JEQ | BPF_K, EtherType::Ipv4 as u32, 0, 8),
            /* 7 */ Instruction::stmt(BPF_LD | BPF_B | BPF_ABS, IPV4_PROTOCOL),
            /* 8 */ Instruction::jump(BPF_JMP | BPF_JEQ | BPF_K, proto, 0, 6),
            /* 9 */ Instruction::stmt(BPF_LD | BPF_H | BPF_ABS, IPV4_FRAGMENT),
            /* 10 */ Instruction::jump(BPF_JMP | BPF_JSET | BPF_K, 0x1fff, 4, 0),
            /* 11 */ Instruction::stmt(BPF_LDX | BPF_B | BPF_MSH, L3),
            /* 12 */ Instruction::stmt(BPF_LD | BPF_H | BPF_IND, L3 + 2),
            /* 13 */ Instruction::jump(BPF_JMP | BPF_JEQ | BPF_K, port, 0, 1),
            /* 14 */ Instruction::stmt(BPF_RET | BPF_K, snaplen),
            /* 15 */ Instruction::stmt(BPF_RET | BPF_K, 0),
        ])
    }
}

impl fmt::Display for CaptureFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} and dst port {}", self.protocol, self.dst_port)
    }
}

impl FromStr for CaptureFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let unsupported = || Error::Filter(format!("unsupported filter expression {:?}", s));

        let words: Vec<&str> = s.split_whitespace().collect();
        let [proto, "and", "dst", "port", port] = words.as_slice() else {
            return Err(unsupported());
        };

        let protocol = match *proto {
            "tcp" => FilterProtocol::Tcp,
            "udp" => FilterProtocol::Udp,
            _ => return Err(unsupported()),
        };

        let dst_port = port
            .parse::<u16>()
            .map_err(|_| Error::Filter(format!("invalid port {:?} in filter", port)))?;

        Ok(Self { protocol, dst_port })
    }
}
